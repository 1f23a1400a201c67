use std::io::Cursor;

use crate::identification::domain::montage_builder::MontageEncoder;
use crate::shared::frame::Frame;
use crate::shared::SendError;

/// Encodes montages as PNG.
#[derive(Default)]
pub struct PngMontageEncoder;

impl PngMontageEncoder {
    pub fn new() -> Self {
        Self
    }
}

impl MontageEncoder for PngMontageEncoder {
    fn encode(&self, montage: &Frame) -> Result<Vec<u8>, SendError> {
        let img = montage.to_rgb_image()?;
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png)?;
        Ok(buf.into_inner())
    }
}
