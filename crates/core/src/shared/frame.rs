use ndarray::{s, ArrayView3};

use super::bounding_box::PixelRect;

/// A decoded frame or crop: contiguous RGB bytes in row-major order.
///
/// `index` is the source frame number for decoded frames and 0 for crops.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    index: usize,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8, index: usize) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            channels,
            index,
        }
    }

    pub fn from_rgb_image(img: image::RgbImage, index: usize) -> Self {
        let (width, height) = img.dimensions();
        Self::new(img.into_raw(), width, height, 3, index)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(self.shape(), &self.data)
            .expect("Frame data length must match dimensions")
    }

    /// Copies the pixels inside `rect` into a new frame.
    ///
    /// The rect is clamped to the frame, so a rect outside the frame yields
    /// an empty crop rather than panicking.
    pub fn crop(&self, rect: &PixelRect) -> Frame {
        let x1 = rect.x1.min(self.width) as usize;
        let y1 = rect.y1.min(self.height) as usize;
        let x2 = (rect.x2.min(self.width) as usize).max(x1);
        let y2 = (rect.y2.min(self.height) as usize).max(y1);

        let view = self.as_ndarray();
        let region = view.slice(s![y1..y2, x1..x2, ..]);
        let data: Vec<u8> = region.iter().copied().collect();

        Frame::new(
            data,
            (x2 - x1) as u32,
            (y2 - y1) as u32,
            self.channels,
            0,
        )
    }

    /// Resizes to exactly `width` x `height` with a triangle filter.
    pub fn resized(&self, width: u32, height: u32) -> Result<Frame, &'static str> {
        let img = self.to_rgb_image()?;
        let resized =
            image::imageops::resize(&img, width, height, image::imageops::FilterType::Triangle);
        Ok(Frame::from_rgb_image(resized, self.index))
    }

    pub fn to_rgb_image(&self) -> Result<image::RgbImage, &'static str> {
        if self.channels != 3 {
            return Err("Only 3-channel frames convert to RGB images");
        }
        image::RgbImage::from_raw(self.width, self.height, self.data.clone())
            .ok_or("Failed to create image from frame data")
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 4x3 frame whose R channel encodes `row * 10 + col`.
    fn gradient_frame() -> Frame {
        let (w, h) = (4u32, 3u32);
        let mut data = Vec::new();
        for row in 0..h {
            for col in 0..w {
                data.extend_from_slice(&[(row * 10 + col) as u8, 0, 0]);
            }
        }
        Frame::new(data, w, h, 3, 7)
    }

    #[test]
    fn test_construction_and_accessors() {
        let data = vec![0u8; 12];
        let frame = Frame::new(data.clone(), 2, 2, 3, 5);
        assert_eq!(frame.width(), 2);
        assert_eq!(frame.height(), 2);
        assert_eq!(frame.channels(), 3);
        assert_eq!(frame.index(), 5);
        assert_eq!(frame.data(), &data[..]);
    }

    #[test]
    #[should_panic(expected = "data length must equal width * height * channels")]
    fn test_mismatched_data_length_panics_in_debug() {
        Frame::new(vec![0u8; 10], 2, 2, 3, 0);
    }

    #[test]
    fn test_as_ndarray_shape() {
        let frame = Frame::new(vec![0u8; 24], 4, 2, 3, 0);
        assert_eq!(frame.as_ndarray().shape(), &[2, 4, 3]);
    }

    #[test]
    fn test_crop_copies_region() {
        let frame = gradient_frame();
        let crop = frame.crop(&PixelRect::new(1, 1, 3, 3));
        assert_eq!(crop.width(), 2);
        assert_eq!(crop.height(), 2);
        let arr = crop.as_ndarray();
        assert_eq!(arr[[0, 0, 0]], 11);
        assert_eq!(arr[[0, 1, 0]], 12);
        assert_eq!(arr[[1, 0, 0]], 21);
        assert_eq!(arr[[1, 1, 0]], 22);
    }

    #[test]
    fn test_crop_clamps_to_frame() {
        let frame = gradient_frame();
        let crop = frame.crop(&PixelRect::new(2, 1, 100, 100));
        assert_eq!((crop.width(), crop.height()), (2, 2));
    }

    #[test]
    fn test_crop_outside_frame_is_empty() {
        let frame = gradient_frame();
        let crop = frame.crop(&PixelRect::new(10, 10, 20, 20));
        assert!(crop.is_empty());
        assert!(crop.data().is_empty());
    }

    #[test]
    fn test_resized_dimensions() {
        let frame = Frame::new(vec![200u8; 10 * 6 * 3], 10, 6, 3, 0);
        let resized = frame.resized(4, 4).unwrap();
        assert_eq!((resized.width(), resized.height()), (4, 4));
        assert_eq!(resized.as_ndarray()[[2, 2, 0]], 200);
    }

    #[test]
    fn test_rgb_image_roundtrip() {
        let frame = gradient_frame();
        let img = frame.to_rgb_image().unwrap();
        assert_eq!(Frame::from_rgb_image(img, 7), frame);
    }

    #[test]
    fn test_to_rgb_image_rejects_gray() {
        let frame = Frame::new(vec![0u8; 4], 2, 2, 1, 0);
        assert!(frame.to_rgb_image().is_err());
    }
}
