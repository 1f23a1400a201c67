use std::path::{Path, PathBuf};
use std::time::Instant;

use thiserror::Error;

use crate::identification::domain::identification_decoder::decode;
use crate::identification::domain::identification_label::IdentificationLabel;
use crate::identification::domain::montage::MontageError;
use crate::identification::domain::montage_builder::{MontageBuilder, MontageEncoder};
use crate::identification::domain::recognition_service::{RecognitionError, RecognitionService};
use crate::identification::domain::retrying_client::{RetryPolicy, RetryingServiceClient};
use crate::pipeline::infrastructure::bounded_worker_pool::BoundedWorkerPool;
use crate::pipeline::pipeline_logger::format_hmmss;
use crate::shared::constants::{
    DEFAULT_BLOCK_SIZE, DEFAULT_MONTAGE_COLUMNS, DEFAULT_MONTAGE_ROWS, MAX_IN_FLIGHT_CALLS,
    MAX_VIDEO_WORKERS,
};
use crate::shared::face_record::FaceId;
use crate::storage::artifact_store::{ArtifactStore, StoreError};

#[derive(Clone, Debug, PartialEq)]
pub struct IdentifyFacesConfig {
    pub force: bool,
    pub columns: u32,
    pub rows: u32,
    pub block_size: u32,
    /// Ceiling on recognition calls in flight across all videos.
    pub max_in_flight: usize,
    pub retry: RetryPolicy,
}

impl Default for IdentifyFacesConfig {
    fn default() -> Self {
        Self {
            force: false,
            columns: DEFAULT_MONTAGE_COLUMNS,
            rows: DEFAULT_MONTAGE_ROWS,
            block_size: DEFAULT_BLOCK_SIZE,
            max_in_flight: MAX_IN_FLIGHT_CALLS,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct IdentificationReport {
    /// Video name and number of labels written.
    pub identified: Vec<(String, usize)>,
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
}

#[derive(Error, Debug)]
pub enum ChunkError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Montage(#[from] MontageError),
    #[error(transparent)]
    Recognition(#[from] RecognitionError),
}

enum VideoOutcome {
    Identified(usize),
    Failed,
}

/// Identifies persisted face crops through montage calls to a recognition
/// service.
///
/// Videos run on a small pool; within a video, chunks of `columns x rows`
/// crops run concurrently and are drained in chunk order. A failed chunk
/// only loses its own labels.
pub struct IdentifyFacesUseCase {
    service: Box<dyn RecognitionService>,
    encoder: Box<dyn MontageEncoder>,
    config: IdentifyFacesConfig,
}

impl IdentifyFacesUseCase {
    pub fn new(
        service: Box<dyn RecognitionService>,
        encoder: Box<dyn MontageEncoder>,
        config: IdentifyFacesConfig,
    ) -> Self {
        Self {
            service,
            encoder,
            config,
        }
    }

    /// Identifies every video directory under `input_root`, writing
    /// `identities.json` under `output_root/<video>/`.
    pub fn execute(
        &self,
        input_root: &Path,
        output_root: &Path,
    ) -> Result<IdentificationReport, StoreError> {
        let mut report = IdentificationReport::default();

        let mut pending = Vec::new();
        for source in ArtifactStore::discover(input_root)? {
            let name = source.name();
            let target = ArtifactStore::new(output_root.join(&name));
            if !source.has_crops() {
                log::info!(
                    "Skipping face identification for video '{name}': no crops directory found."
                );
                report.skipped.push(name);
            } else if !self.config.force && target.has_identities() {
                log::info!(
                    "Skipping face identification for video '{name}': identities already exist."
                );
                report.skipped.push(name);
            } else {
                pending.push((source, target));
            }
        }
        if pending.is_empty() {
            log::info!("All videos have existing face identities.");
            return Ok(report);
        }

        let video_pool = BoundedWorkerPool::new("identify", pending.len().min(MAX_VIDEO_WORKERS));
        let chunk_threads = (self.config.max_in_flight / video_pool.workers()).max(1);
        log::info!(
            "Identifying faces in {} videos ({} at a time, {chunk_threads} calls each)",
            pending.len(),
            video_pool.workers()
        );

        let start = Instant::now();
        let names: Vec<String> = pending.iter().map(|(source, _)| source.name()).collect();
        let outcomes = video_pool.run(pending, |(source, target)| {
            self.identify_video(&source, &target, chunk_threads)
        });

        for (name, outcome) in names.into_iter().zip(outcomes) {
            match outcome {
                Some(VideoOutcome::Identified(count)) => report.identified.push((name, count)),
                Some(VideoOutcome::Failed) | None => report.failed.push(name),
            }
        }
        log::info!(
            "Done identifying faces. {} elapsed",
            format_hmmss(start.elapsed())
        );
        Ok(report)
    }

    fn identify_video(
        &self,
        source: &ArtifactStore,
        target: &ArtifactStore,
        chunk_threads: usize,
    ) -> VideoOutcome {
        let name = source.name();
        let crops = match source.list_crops() {
            Ok(crops) => crops,
            Err(e) => {
                log::error!("Cannot list crops for '{name}': {e}");
                return VideoOutcome::Failed;
            }
        };

        let chunk_len = (self.config.columns * self.config.rows).max(1) as usize;
        let chunks: Vec<(usize, Vec<(FaceId, PathBuf)>)> = crops
            .chunks(chunk_len)
            .map(<[_]>::to_vec)
            .enumerate()
            .collect();

        let pool = BoundedWorkerPool::new(&format!("identify-{name}"), chunk_threads);
        let results = pool.run(chunks, |(index, chunk)| {
            self.identify_chunk(&chunk).map_err(|e| (index, e))
        });

        let mut labels = Vec::new();
        for result in results {
            match result {
                Some(Ok(chunk_labels)) => labels.extend(chunk_labels),
                Some(Err((index, e))) => {
                    log::error!("Chunk {index} of '{name}' failed: {e}")
                }
                None => log::error!("A chunk of '{name}' panicked"),
            }
        }

        match target.save_identities(&labels) {
            Ok(()) => {
                log::info!("Saved {} identities for '{name}'", labels.len());
                VideoOutcome::Identified(labels.len())
            }
            Err(e) => {
                log::error!("Failed to save identities for '{name}': {e}");
                VideoOutcome::Failed
            }
        }
    }

    /// Loads one chunk of crops and returns the labels its montage(s) yield.
    pub fn identify_chunk(
        &self,
        crop_paths: &[(FaceId, PathBuf)],
    ) -> Result<Vec<IdentificationLabel>, ChunkError> {
        let crops = crop_paths
            .iter()
            .map(|(id, path)| Ok((*id, ArtifactStore::load_crop(path)?)))
            .collect::<Result<Vec<_>, StoreError>>()?;

        let builder = MontageBuilder::new(
            self.config.columns,
            self.config.block_size,
            &*self.encoder,
        );
        let client = RetryingServiceClient::new(&*self.service, self.config.retry);

        let mut labels = Vec::new();
        for montage in builder.build(&crops)? {
            let response = client.call(&montage.bytes)?;
            labels.extend(decode(&response, &montage.geometry));
        }
        Ok(labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use tempfile::TempDir;

    use crate::identification::domain::recognition_service::{
        RecognitionResponse, RecognizedFace, ServiceBox,
    };
    use crate::identification::infrastructure::png_montage_encoder::PngMontageEncoder;
    use crate::shared::frame::Frame;

    const BLOCK: u32 = 60;

    /// Names the face in the first cell of every montage "Ada". Montages
    /// exactly `fail_height` pixels tall are rejected.
    struct FirstCellService {
        fail_height: Option<u32>,
        calls: AtomicUsize,
    }

    impl FirstCellService {
        fn new(fail_height: Option<u32>) -> Self {
            Self {
                fail_height,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl RecognitionService for FirstCellService {
        fn recognize(&self, image: &[u8]) -> Result<RecognitionResponse, RecognitionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let img = image::load_from_memory(image)
                .map_err(|e| RecognitionError::Fatal(e.to_string()))?;
            let (w, h) = (img.width() as f64, img.height() as f64);
            if self.fail_height == Some(img.height()) {
                return Err(RecognitionError::Fatal("rejected".to_string()));
            }
            let side = 10.0;
            let corner = BLOCK as f64 / 2.0 - side / 2.0;
            Ok(RecognitionResponse {
                recognized: vec![RecognizedFace {
                    name: "Ada".to_string(),
                    confidence: 99.0,
                    bbox: ServiceBox::new(corner / w, corner / h, side / w, side / h),
                }],
                unrecognized: Vec::new(),
            })
        }
    }

    fn config() -> IdentifyFacesConfig {
        IdentifyFacesConfig {
            force: false,
            columns: 2,
            rows: 2,
            block_size: BLOCK,
            max_in_flight: 4,
            retry: RetryPolicy {
                max_attempts: 2,
                base_delay: Duration::ZERO,
            },
        }
    }

    fn write_crops(root: &Path, video: &str, ids: std::ops::Range<FaceId>) {
        let crops: Vec<(FaceId, Frame)> = ids
            .map(|id| (id, Frame::new(vec![id as u8 * 20; 8 * 8 * 3], 8, 8, 3, 0)))
            .collect();
        ArtifactStore::new(root.join(video))
            .save_crops(&crops)
            .unwrap();
    }

    fn use_case(service: FirstCellService, config: IdentifyFacesConfig) -> IdentifyFacesUseCase {
        IdentifyFacesUseCase::new(
            Box::new(service),
            Box::new(PngMontageEncoder::new()),
            config,
        )
    }

    fn label(face_id: FaceId) -> IdentificationLabel {
        IdentificationLabel {
            face_id,
            name: "Ada".to_string(),
            confidence: 99.0,
        }
    }

    #[test]
    fn test_each_chunk_labels_its_own_faces() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        // Five crops in 2x2 chunks: [0..4) and [4..5).
        write_crops(input.path(), "clip", 0..5);

        let report = use_case(FirstCellService::new(None), config())
            .execute(input.path(), output.path())
            .unwrap();
        assert_eq!(report.identified, vec![("clip".to_string(), 2)]);

        let identities = ArtifactStore::new(output.path().join("clip"))
            .load_identities()
            .unwrap();
        assert_eq!(identities, vec![label(0), label(4)]);
    }

    #[test]
    fn test_failed_chunk_loses_only_its_labels() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        write_crops(input.path(), "clip", 0..5);

        // The trailing chunk holds one crop, so its montage is one row tall.
        let report = use_case(FirstCellService::new(Some(BLOCK)), config())
            .execute(input.path(), output.path())
            .unwrap();
        assert_eq!(report.identified, vec![("clip".to_string(), 1)]);

        let identities = ArtifactStore::new(output.path().join("clip"))
            .load_identities()
            .unwrap();
        assert_eq!(identities, vec![label(0)]);
    }

    #[test]
    fn test_every_video_is_identified() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        write_crops(input.path(), "a", 0..3);
        write_crops(input.path(), "b", 0..9);
        write_crops(input.path(), "c", 0..1);

        let report = use_case(FirstCellService::new(None), config())
            .execute(input.path(), output.path())
            .unwrap();
        assert_eq!(
            report.identified,
            vec![
                ("a".to_string(), 1),
                ("b".to_string(), 3),
                ("c".to_string(), 1)
            ]
        );
    }

    #[test]
    fn test_video_without_crops_is_skipped() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        std::fs::create_dir(input.path().join("empty")).unwrap();

        let report = use_case(FirstCellService::new(None), config())
            .execute(input.path(), output.path())
            .unwrap();
        assert_eq!(report.skipped, vec!["empty"]);
        assert!(!output.path().join("empty").exists());
    }

    #[test]
    fn test_existing_identities_are_kept_unless_forced() {
        let input = TempDir::new().unwrap();
        let output = TempDir::new().unwrap();
        write_crops(input.path(), "clip", 0..2);
        let target = ArtifactStore::new(output.path().join("clip"));
        target.save_identities(&[]).unwrap();

        let service = FirstCellService::new(None);
        let uc = use_case(service, config());
        let report = uc.execute(input.path(), output.path()).unwrap();
        assert_eq!(report.skipped, vec!["clip"]);
        assert!(target.load_identities().unwrap().is_empty());

        let forced = use_case(
            FirstCellService::new(None),
            IdentifyFacesConfig {
                force: true,
                ..config()
            },
        );
        forced.execute(input.path(), output.path()).unwrap();
        assert_eq!(target.load_identities().unwrap(), vec![label(0)]);
    }

    #[test]
    fn test_montage_below_minimum_size_fails_the_chunk() {
        let input = TempDir::new().unwrap();
        write_crops(input.path(), "clip", 0..1);
        let crops = ArtifactStore::new(input.path().join("clip"))
            .list_crops()
            .unwrap();

        let uc = use_case(
            FirstCellService::new(None),
            IdentifyFacesConfig {
                block_size: 20,
                ..config()
            },
        );
        assert!(matches!(
            uc.identify_chunk(&crops),
            Err(ChunkError::Montage(MontageError::TooSmall { .. }))
        ));
    }

    #[test]
    fn test_missing_input_root_is_an_error() {
        let output = TempDir::new().unwrap();
        let uc = use_case(FirstCellService::new(None), config());
        assert!(uc
            .execute(&output.path().join("missing"), output.path())
            .is_err());
    }
}
