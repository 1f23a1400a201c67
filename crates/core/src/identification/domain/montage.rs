use thiserror::Error;

use crate::shared::face_record::FaceId;
use crate::shared::frame::Frame;
use crate::shared::SendError;

#[derive(Error, Debug)]
pub enum MontageError {
    #[error("montage needs at least one column and a non-zero block size")]
    InvalidGrid,
    #[error("montage of {width}x{height} is below the {min}px minimum")]
    TooSmall { width: u32, height: u32, min: u32 },
    #[error("failed to place crop {face_id}: {reason}")]
    Placement { face_id: FaceId, reason: &'static str },
    #[error("failed to encode montage: {0}")]
    Encode(#[source] SendError),
}

/// Grid layout of one montage, enough to map a pixel back to a face id.
///
/// Cells are `block_size` squares filled left-to-right, top-to-bottom from
/// cell (0, 0) in ascending face id order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MontageGeometry {
    pub columns: u32,
    pub rows: u32,
    pub block_size: u32,
    pub face_ids: Vec<FaceId>,
}

impl MontageGeometry {
    pub fn new(columns: u32, block_size: u32, face_ids: Vec<FaceId>) -> Self {
        let columns = columns.max(1);
        let rows = (face_ids.len() as u32).div_ceil(columns);
        Self {
            columns,
            rows,
            block_size,
            face_ids,
        }
    }

    pub fn width(&self) -> u32 {
        self.columns * self.block_size
    }

    pub fn height(&self) -> u32 {
        self.rows * self.block_size
    }

    pub fn len(&self) -> usize {
        self.face_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.face_ids.is_empty()
    }

    /// Top-left pixel of the `index`-th cell.
    pub fn cell_origin(&self, index: usize) -> (u32, u32) {
        let index = index as u32;
        (
            index % self.columns * self.block_size,
            index / self.columns * self.block_size,
        )
    }

    /// Face id in grid cell (`gx`, `gy`), or `None` outside the populated
    /// cells.
    pub fn face_id_at(&self, gx: i64, gy: i64) -> Option<FaceId> {
        if gx < 0 || gx >= self.columns as i64 || gy < 0 {
            return None;
        }
        let index = gy * self.columns as i64 + gx;
        usize::try_from(index)
            .ok()
            .and_then(|i| self.face_ids.get(i).copied())
    }
}

/// Paints `crops` into a black canvas laid out by `geometry`, resizing each
/// crop to fill its cell.
pub fn compose(
    crops: &[(FaceId, Frame)],
    geometry: &MontageGeometry,
) -> Result<Frame, MontageError> {
    if geometry.block_size == 0 {
        return Err(MontageError::InvalidGrid);
    }
    let mut canvas = image::RgbImage::new(geometry.width(), geometry.height());
    let block = geometry.block_size;

    for (index, (face_id, crop)) in crops.iter().enumerate() {
        let placement = |reason| MontageError::Placement {
            face_id: *face_id,
            reason,
        };
        if crop.is_empty() {
            return Err(placement("empty crop"));
        }
        let cell = if crop.width() == block && crop.height() == block {
            crop.to_rgb_image().map_err(placement)?
        } else {
            crop.resized(block, block)
                .and_then(|f| f.to_rgb_image())
                .map_err(placement)?
        };
        let (x, y) = geometry.cell_origin(index);
        image::imageops::replace(&mut canvas, &cell, x as i64, y as i64);
    }

    Ok(Frame::from_rgb_image(canvas, 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(value: u8, size: u32) -> Frame {
        Frame::new(vec![value; (size * size * 3) as usize], size, size, 3, 0)
    }

    #[test]
    fn test_geometry_rows_round_up() {
        let g = MontageGeometry::new(4, 100, (0..9).collect());
        assert_eq!(g.rows, 3);
        assert_eq!((g.width(), g.height()), (400, 300));
    }

    #[test]
    fn test_cell_origin_is_row_major() {
        let g = MontageGeometry::new(3, 50, (0..7).collect());
        assert_eq!(g.cell_origin(0), (0, 0));
        assert_eq!(g.cell_origin(2), (100, 0));
        assert_eq!(g.cell_origin(4), (50, 50));
        assert_eq!(g.cell_origin(6), (0, 100));
    }

    #[test]
    fn test_face_id_at_rejects_padding_and_outside() {
        let g = MontageGeometry::new(3, 50, vec![10, 11, 12, 13]);
        assert_eq!(g.face_id_at(0, 0), Some(10));
        assert_eq!(g.face_id_at(0, 1), Some(13));
        assert_eq!(g.face_id_at(1, 1), None);
        assert_eq!(g.face_id_at(3, 0), None);
        assert_eq!(g.face_id_at(-1, 0), None);
        assert_eq!(g.face_id_at(0, -1), None);
    }

    #[test]
    fn test_compose_places_crops_in_cells() {
        let crops: Vec<(FaceId, Frame)> = vec![(0, solid(10, 8)), (1, solid(20, 4)), (2, solid(30, 16))];
        let g = MontageGeometry::new(2, 8, vec![0, 1, 2]);
        let montage = compose(&crops, &g).unwrap();

        assert_eq!((montage.width(), montage.height()), (16, 16));
        let px = montage.as_ndarray();
        assert_eq!(px[[4, 4, 0]], 10);
        assert_eq!(px[[4, 12, 0]], 20);
        assert_eq!(px[[12, 4, 0]], 30);
        // Unused last cell stays black.
        assert_eq!(px[[12, 12, 0]], 0);
    }

    #[test]
    fn test_compose_rejects_empty_crop() {
        let crops = vec![(7, Frame::new(Vec::new(), 0, 0, 3, 0))];
        let g = MontageGeometry::new(1, 8, vec![7]);
        assert!(matches!(
            compose(&crops, &g),
            Err(MontageError::Placement { face_id: 7, .. })
        ));
    }
}
