use crate::identification::domain::montage::{compose, MontageError, MontageGeometry};
use crate::shared::constants::{MAX_PAYLOAD_BYTES, MIN_PAYLOAD_DIMENSION};
use crate::shared::face_record::FaceId;
use crate::shared::frame::Frame;
use crate::shared::SendError;

/// Encodes a composed montage into the bytes sent to the service.
pub trait MontageEncoder: Send + Sync {
    fn encode(&self, montage: &Frame) -> Result<Vec<u8>, SendError>;
}

/// An encoded montage and the geometry needed to decode its results.
#[derive(Clone, Debug, PartialEq)]
pub struct Montage {
    pub geometry: MontageGeometry,
    pub bytes: Vec<u8>,
}

/// Packs runs of crops into fixed-grid montages.
pub struct MontageBuilder<'a> {
    columns: u32,
    block_size: u32,
    max_bytes: usize,
    encoder: &'a dyn MontageEncoder,
}

impl<'a> MontageBuilder<'a> {
    pub fn new(columns: u32, block_size: u32, encoder: &'a dyn MontageEncoder) -> Self {
        Self {
            columns,
            block_size,
            max_bytes: MAX_PAYLOAD_BYTES,
            encoder,
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// Builds one montage from `crops`, which must be in ascending face id
    /// order.
    ///
    /// If the encoded montage reaches the size cap, the crops are split once
    /// into two contiguous halves and two montages are built instead. The
    /// halves are not split again even if one still exceeds the cap.
    pub fn build(&self, crops: &[(FaceId, Frame)]) -> Result<Vec<Montage>, MontageError> {
        if crops.is_empty() {
            return Ok(Vec::new());
        }

        let whole = self.build_one(crops)?;
        if whole.bytes.len() < self.max_bytes {
            return Ok(vec![whole]);
        }

        let mid = crops.len() / 2;
        log::debug!(
            "Montage of {} crops is {} bytes; splitting at {mid}",
            crops.len(),
            whole.bytes.len()
        );
        let (first, second) = crops.split_at(mid);
        let mut montages = Vec::with_capacity(2);
        for half in [first, second] {
            if !half.is_empty() {
                montages.push(self.build_one(half)?);
            }
        }
        Ok(montages)
    }

    fn build_one(&self, crops: &[(FaceId, Frame)]) -> Result<Montage, MontageError> {
        if self.columns == 0 || self.block_size == 0 {
            return Err(MontageError::InvalidGrid);
        }
        let geometry = MontageGeometry::new(
            self.columns,
            self.block_size,
            crops.iter().map(|(id, _)| *id).collect(),
        );
        if geometry.width() < MIN_PAYLOAD_DIMENSION || geometry.height() < MIN_PAYLOAD_DIMENSION {
            return Err(MontageError::TooSmall {
                width: geometry.width(),
                height: geometry.height(),
                min: MIN_PAYLOAD_DIMENSION,
            });
        }

        let image = compose(crops, &geometry)?;
        let bytes = self.encoder.encode(&image).map_err(MontageError::Encode)?;
        Ok(Montage { geometry, bytes })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;

    const MIB: usize = 1024 * 1024;

    /// Reports a fixed payload size per montage row and records the
    /// montage sizes it was asked to encode.
    pub(crate) struct SizedEncoder {
        pub bytes_per_row: usize,
        pub block_size: u32,
        pub seen: Mutex<Vec<(u32, u32)>>,
    }

    impl SizedEncoder {
        pub(crate) fn new(bytes_per_row: usize, block_size: u32) -> Self {
            Self {
                bytes_per_row,
                block_size,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    impl MontageEncoder for SizedEncoder {
        fn encode(&self, montage: &Frame) -> Result<Vec<u8>, SendError> {
            self.seen
                .lock()
                .map_err(|e| e.to_string())?
                .push((montage.width(), montage.height()));
            let rows = (montage.height() / self.block_size) as usize;
            Ok(vec![0u8; rows * self.bytes_per_row])
        }
    }

    pub(crate) fn crops(ids: std::ops::Range<FaceId>) -> Vec<(FaceId, Frame)> {
        ids.map(|id| (id, Frame::new(vec![id as u8; 4 * 4 * 3], 4, 4, 3, 0)))
            .collect()
    }

    #[test]
    fn test_small_montage_is_not_split() {
        let encoder = SizedEncoder::new(1024, 60);
        let builder = MontageBuilder::new(4, 60, &encoder);
        let montages = builder.build(&crops(0..20)).unwrap();

        assert_eq!(montages.len(), 1);
        assert_eq!(montages[0].geometry.face_ids, (0..20).collect::<Vec<_>>());
        assert_eq!(montages[0].geometry.rows, 5);
    }

    #[test]
    fn test_oversized_montage_splits_into_two_halves() {
        // 20 crops on a 4x5 grid encode to 6 MiB; each 3-row half to 3.6 MiB.
        let encoder = SizedEncoder::new(6 * MIB / 5, 60);
        let builder = MontageBuilder::new(4, 60, &encoder);
        let montages = builder.build(&crops(0..20)).unwrap();

        assert_eq!(montages.len(), 2);
        assert_eq!(montages[0].geometry.face_ids, (0..10).collect::<Vec<_>>());
        assert_eq!(montages[1].geometry.face_ids, (10..20).collect::<Vec<_>>());
        assert!(montages.iter().all(|m| m.bytes.len() < MAX_PAYLOAD_BYTES));
        assert_eq!(
            *encoder.seen.lock().unwrap(),
            vec![(240, 300), (240, 180), (240, 180)]
        );
    }

    #[test]
    fn test_split_happens_only_once() {
        // Every row is over the cap, so even the halves stay oversized.
        let encoder = SizedEncoder::new(6 * MIB, 60);
        let builder = MontageBuilder::new(4, 60, &encoder);
        let montages = builder.build(&crops(0..20)).unwrap();

        assert_eq!(montages.len(), 2);
        assert!(montages.iter().all(|m| m.bytes.len() >= MAX_PAYLOAD_BYTES));
    }

    #[test]
    fn test_split_threshold_is_inclusive() {
        let encoder = SizedEncoder::new(100, 60);
        let builder = MontageBuilder::new(2, 60, &encoder).with_max_bytes(200);
        // 4 crops on 2 columns -> 2 rows -> exactly 200 bytes -> split.
        assert_eq!(builder.build(&crops(0..4)).unwrap().len(), 2);
        // 2 crops -> 1 row -> 100 bytes -> kept whole.
        assert_eq!(builder.build(&crops(0..2)).unwrap().len(), 1);
    }

    #[test]
    fn test_single_oversized_crop_yields_one_montage() {
        let encoder = SizedEncoder::new(100, 60);
        let builder = MontageBuilder::new(2, 60, &encoder).with_max_bytes(10);
        let montages = builder.build(&crops(0..1)).unwrap();
        assert_eq!(montages.len(), 1);
        assert_eq!(montages[0].geometry.face_ids, vec![0]);
    }

    #[test]
    fn test_empty_input_builds_nothing() {
        let encoder = SizedEncoder::new(100, 60);
        assert!(MontageBuilder::new(2, 60, &encoder).build(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_montage_below_service_minimum_is_rejected() {
        let encoder = SizedEncoder::new(100, 20);
        let builder = MontageBuilder::new(10, 20, &encoder);
        assert!(matches!(
            builder.build(&crops(0..3)),
            Err(MontageError::TooSmall { height: 20, .. })
        ));
    }
}
