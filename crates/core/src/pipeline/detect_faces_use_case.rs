use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::detection::domain::face_detector::FaceDetector;
use crate::detection::domain::face_embedder::FaceEmbedder;
use crate::pipeline::frame_batch_processor::{FrameBatchProcessor, FrameFaces};
use crate::pipeline::pipeline_executor::{PartitionExecutor, PartitionTask};
use crate::pipeline::pipeline_logger::{format_hmmss, PipelineLogger};
use crate::pipeline::result_merger::{MergedFaces, ResultMerger};
use crate::sampling::time_sampler::TimeSampler;
use crate::shared::constants::DEFAULT_INTERVAL_SECS;
use crate::shared::video_metadata::VideoMetadata;
use crate::shared::SendError;
use crate::storage::artifact_store::{ArtifactStore, DetectionComponent, StoreError};
use crate::video::domain::frame_source::FrameSourceFactory;

#[derive(Clone, Debug, PartialEq)]
pub struct DetectFacesConfig {
    pub interval_secs: u32,
    pub workers: usize,
    /// First ingest: skip the existing-output check.
    pub init_run: bool,
    pub force_rerun: bool,
    /// Outputs neither written nor required by the existing-output check.
    pub disabled: Vec<DetectionComponent>,
}

impl Default for DetectFacesConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_INTERVAL_SECS,
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            init_run: false,
            force_rerun: false,
            disabled: Vec::new(),
        }
    }
}

/// Per-video outcome of a detection run, by video name.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetectionReport {
    pub processed: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
}

/// Orchestrates detection, embedding and cropping for a list of videos.
///
/// Each video is sampled, split across parallel workers, merged in time
/// order and persisted only when the merge is consistent. A failing video
/// never stops the others.
pub struct DetectFacesUseCase {
    source_factory: Box<FrameSourceFactory>,
    detector: Box<dyn FaceDetector>,
    embedder: Box<dyn FaceEmbedder>,
    executor: Box<dyn PartitionExecutor>,
    logger: Box<dyn PipelineLogger>,
    config: DetectFacesConfig,
}

struct PendingVideo {
    path: PathBuf,
    store: ArtifactStore,
    metadata: VideoMetadata,
}

impl DetectFacesUseCase {
    pub fn new(
        source_factory: Box<FrameSourceFactory>,
        detector: Box<dyn FaceDetector>,
        embedder: Box<dyn FaceEmbedder>,
        executor: Box<dyn PartitionExecutor>,
        logger: Box<dyn PipelineLogger>,
        config: DetectFacesConfig,
    ) -> Self {
        Self {
            source_factory,
            detector,
            embedder,
            executor,
            logger,
            config,
        }
    }

    pub fn execute(&mut self, videos: &[PathBuf], output_root: &Path) -> DetectionReport {
        let mut report = DetectionReport::default();

        let mut candidates = Vec::new();
        for path in videos {
            let store = ArtifactStore::for_video(output_root, path);
            let complete = store.has_detection_output(&self.config.disabled);
            if !self.config.init_run && !self.config.force_rerun && complete {
                self.logger
                    .info(&format!("Skipping {}: outputs already exist", store.name()));
                report.skipped.push(store.name());
            } else {
                candidates.push((path.clone(), store));
            }
        }
        if candidates.is_empty() {
            self.logger.info("All videos have existing outputs.");
            return report;
        }

        self.logger.info(&format!(
            "Collecting metadata for {} videos",
            candidates.len()
        ));
        let mut pending = Vec::with_capacity(candidates.len());
        for (path, store) in candidates {
            match self.read_metadata(&path) {
                Ok(metadata) => pending.push(PendingVideo {
                    path,
                    store,
                    metadata,
                }),
                Err(e) => {
                    log::error!("Cannot open {}: {e}", path.display());
                    report.failed.push(store.name());
                }
            }
        }

        let total_slots: usize = pending
            .iter()
            .map(|v| TimeSampler::new(&v.metadata, self.config.interval_secs).slot_count())
            .sum();
        let mut done_slots = 0;
        let start = Instant::now();

        for video in &pending {
            let pct = if total_slots > 0 {
                done_slots as f64 / total_slots as f64 * 100.0
            } else {
                0.0
            };
            self.logger.info(&format!(
                "Processing video: {} ({pct:.1} % done, {} elapsed)",
                video.metadata.name,
                format_hmmss(start.elapsed())
            ));
            self.logger.progress(done_slots, total_slots);

            let sampler = TimeSampler::new(&video.metadata, self.config.interval_secs);
            let detect_start = Instant::now();
            let partitions = self.run_partitions(&video.path, &sampler);
            self.logger
                .timing("detect", detect_start.elapsed().as_secs_f64() * 1000.0);

            let merged = match ResultMerger::merge(partitions, sampler.slot_count()) {
                Ok(merged) => merged,
                Err(e) => {
                    self.logger.info(&format!(
                        "There was an error decoding video '{}'. Skipping. ({e})",
                        video.metadata.name
                    ));
                    report.failed.push(video.store.name());
                    continue;
                }
            };

            let persist_start = Instant::now();
            if let Err(e) = self.persist(video, &merged) {
                log::error!("Failed to save outputs for {}: {e}", video.metadata.name);
                report.failed.push(video.store.name());
                continue;
            }
            self.logger
                .timing("persist", persist_start.elapsed().as_secs_f64() * 1000.0);
            self.logger.metric("faces", merged.len() as f64);

            done_slots += sampler.slot_count();
            report.processed.push(video.store.name());
        }

        self.logger.progress(done_slots, total_slots);
        self.logger.info(&format!(
            "Processed {} videos in {}",
            pending.len(),
            format_hmmss(start.elapsed())
        ));
        self.logger.summary();
        report
    }

    fn read_metadata(&self, path: &Path) -> Result<VideoMetadata, SendError> {
        let mut source = (self.source_factory)();
        let metadata = source.open(path);
        source.close();
        metadata
    }

    fn run_partitions(
        &self,
        path: &Path,
        sampler: &TimeSampler,
    ) -> Vec<Vec<FrameFaces>> {
        let processor = FrameBatchProcessor::new(sampler, &*self.detector, &*self.embedder);
        let processor = &processor;
        let factory = &*self.source_factory;

        let tasks: Vec<PartitionTask> = sampler
            .partition(self.config.workers)
            .into_iter()
            .map(|range| {
                Box::new(move || {
                    if range.is_empty() {
                        return Vec::new();
                    }
                    let mut source = factory();
                    if let Err(e) = source.open(path) {
                        log::warn!("Worker failed to open {}: {e}", path.display());
                        return Vec::new();
                    }
                    let out = processor.process(&mut *source, range);
                    source.close();
                    out
                }) as PartitionTask
            })
            .collect();

        self.executor.run_all(tasks)
    }

    /// Writes into a staging directory and moves it into place only when
    /// every artifact was written.
    fn persist(&self, video: &PendingVideo, merged: &MergedFaces) -> Result<(), StoreError> {
        let staged = video.store.stage()?;
        match self.write_artifacts(&staged, &video.metadata, merged) {
            Ok(()) => video.store.commit(staged),
            Err(e) => {
                staged.discard();
                Err(e)
            }
        }
    }

    fn write_artifacts(
        &self,
        store: &ArtifactStore,
        metadata: &VideoMetadata,
        merged: &MergedFaces,
    ) -> Result<(), StoreError> {
        let name = &metadata.name;
        let enabled = |c: DetectionComponent| !self.config.disabled.contains(&c);

        log::info!("Saving metadata for {name}");
        store.save_metadata(metadata)?;
        if enabled(DetectionComponent::FaceDetection) {
            log::info!("Saving bboxes for {name}");
            store.save_bboxes(&merged.records)?;
        }
        if enabled(DetectionComponent::FaceEmbedding) {
            log::info!("Saving embeddings for {name}");
            store.save_embeddings(&merged.embeddings)?;
        }
        if enabled(DetectionComponent::FaceCrops) {
            log::info!("Saving crops for {name}");
            store.save_crops(&merged.crops)?;
        }
        Ok(())
    }
}
