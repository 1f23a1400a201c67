use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Args, Parser, Subcommand, ValueEnum};

use face_ingest_core::detection::infrastructure::model_resolver::{ModelResolver, ProgressFn};
use face_ingest_core::detection::infrastructure::onnx_arcface_embedder::OnnxArcFaceEmbedder;
use face_ingest_core::detection::infrastructure::onnx_yolo_detector::{
    OnnxYoloDetector, DEFAULT_CONFIDENCE,
};
use face_ingest_core::identification::infrastructure::http_recognition_service::HttpRecognitionService;
use face_ingest_core::identification::infrastructure::png_montage_encoder::PngMontageEncoder;
use face_ingest_core::pipeline::detect_faces_use_case::{DetectFacesConfig, DetectFacesUseCase};
use face_ingest_core::pipeline::identify_faces_use_case::{
    IdentifyFacesConfig, IdentifyFacesUseCase,
};
use face_ingest_core::pipeline::infrastructure::threaded_partition_executor::ThreadedPartitionExecutor;
use face_ingest_core::pipeline::pipeline_logger::StdoutPipelineLogger;
use face_ingest_core::shared::constants::{
    DEFAULT_BLOCK_SIZE, DEFAULT_INTERVAL_SECS, DEFAULT_MONTAGE_COLUMNS, DEFAULT_MONTAGE_ROWS,
    MAX_IN_FLIGHT_CALLS, VIDEO_EXTENSIONS,
};
use face_ingest_core::storage::artifact_store::DetectionComponent;
use face_ingest_core::video::domain::frame_source::FrameSource;
use face_ingest_core::video::infrastructure::ffmpeg_frame_source::FfmpegFrameSource;

/// Face detection and identification for video archives.
#[derive(Parser)]
#[command(name = "face-ingest")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Detect, embed and crop faces in time-sampled frames.
    Detect(DetectArgs),
    /// Identify saved face crops through the recognition service.
    Identify(IdentifyArgs),
}

#[derive(Args)]
struct DetectArgs {
    /// Video file, or a text file listing one video path per line.
    input: PathBuf,

    /// Output directory; one subdirectory per video.
    output: PathBuf,

    /// Seconds between sampled frames.
    #[arg(long, default_value_t = DEFAULT_INTERVAL_SECS)]
    interval: u32,

    /// First ingest: do not check for existing outputs.
    #[arg(long)]
    init_run: bool,

    /// Redo videos that already have outputs.
    #[arg(long)]
    force_rerun: bool,

    /// Parallel workers per video (default: available cores).
    #[arg(long)]
    workers: Option<usize>,

    /// Face detection confidence threshold (0.0-1.0).
    #[arg(long, default_value_t = DEFAULT_CONFIDENCE)]
    confidence: f64,

    /// Directory searched for model files before downloading.
    #[arg(long)]
    models_dir: Option<PathBuf>,

    /// Outputs to leave out; they are also not required for a video to
    /// count as done.
    #[arg(short, long, value_enum, num_args = 1..)]
    disable: Vec<DisabledComponent>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "snake_case")]
enum DisabledComponent {
    FaceDetection,
    FaceEmbedding,
    FaceCrops,
}

impl From<DisabledComponent> for DetectionComponent {
    fn from(component: DisabledComponent) -> Self {
        match component {
            DisabledComponent::FaceDetection => DetectionComponent::FaceDetection,
            DisabledComponent::FaceEmbedding => DetectionComponent::FaceEmbedding,
            DisabledComponent::FaceCrops => DetectionComponent::FaceCrops,
        }
    }
}

#[derive(Args)]
struct IdentifyArgs {
    /// Directory holding one detection output directory per video.
    input: PathBuf,

    /// Output directory for identities.
    output: PathBuf,

    /// Overwrite existing identities.
    #[arg(short, long)]
    force: bool,

    /// Montage columns.
    #[arg(long, default_value_t = DEFAULT_MONTAGE_COLUMNS)]
    columns: u32,

    /// Montage rows.
    #[arg(long, default_value_t = DEFAULT_MONTAGE_ROWS)]
    rows: u32,

    /// Montage cell size in pixels.
    #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE)]
    block_size: u32,

    /// Ceiling on concurrent recognition calls.
    #[arg(long, default_value_t = MAX_IN_FLIGHT_CALLS)]
    max_in_flight: usize,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    match Cli::parse().command {
        Command::Detect(args) => run_detect(&args),
        Command::Identify(args) => run_identify(&args),
    }
}

fn run_detect(args: &DetectArgs) -> Result<(), Box<dyn std::error::Error>> {
    validate_detect(args)?;
    let videos = read_video_list(&args.input)?;
    if videos.is_empty() {
        return Err(format!("No videos listed in {}", args.input.display()).into());
    }

    let resolver = ModelResolver::with_user_cache(args.models_dir.clone())?;
    let models = resolver.detection_models(|model| Some(download_progress(model.label)))?;

    let mut use_case = DetectFacesUseCase::new(
        Box::new(|| Box::new(FfmpegFrameSource::new()) as Box<dyn FrameSource>),
        Box::new(OnnxYoloDetector::new(&models.detector, args.confidence)?),
        Box::new(OnnxArcFaceEmbedder::new(&models.embedder)?),
        Box::new(ThreadedPartitionExecutor::new()),
        Box::new(StdoutPipelineLogger::new()),
        detect_config(args),
    );
    let report = use_case.execute(&videos, &args.output);
    log::info!(
        "Detection finished: {} processed, {} skipped, {} failed",
        report.processed.len(),
        report.skipped.len(),
        report.failed.len()
    );
    for name in &report.failed {
        log::warn!("No detection output for '{name}'");
    }
    Ok(())
}

fn run_identify(args: &IdentifyArgs) -> Result<(), Box<dyn std::error::Error>> {
    validate_identify(args)?;

    let service = match HttpRecognitionService::from_env() {
        Ok(service) => service,
        Err(e) => {
            log::warn!("{e}. Skipping face identification.");
            return Ok(());
        }
    };

    let config = IdentifyFacesConfig {
        force: args.force,
        columns: args.columns,
        rows: args.rows,
        block_size: args.block_size,
        max_in_flight: args.max_in_flight,
        ..IdentifyFacesConfig::default()
    };
    let use_case = IdentifyFacesUseCase::new(
        Box::new(service),
        Box::new(PngMontageEncoder::new()),
        config,
    );
    let report = use_case.execute(&args.input, &args.output)?;
    let labels: usize = report.identified.iter().map(|(_, n)| n).sum();
    log::info!(
        "Identification finished: {labels} labels across {} videos, {} skipped, {} failed",
        report.identified.len(),
        report.skipped.len(),
        report.failed.len()
    );
    Ok(())
}

fn validate_detect(args: &DetectArgs) -> Result<(), Box<dyn std::error::Error>> {
    if !args.input.exists() {
        return Err(format!("Input file not found: {}", args.input.display()).into());
    }
    if args.interval == 0 {
        return Err("Interval must be at least 1 second".into());
    }
    if args.workers == Some(0) {
        return Err("Workers must be at least 1".into());
    }
    if !(0.0..=1.0).contains(&args.confidence) {
        return Err(format!(
            "Confidence must be between 0.0 and 1.0, got {}",
            args.confidence
        )
        .into());
    }
    Ok(())
}

fn detect_config(args: &DetectArgs) -> DetectFacesConfig {
    let mut config = DetectFacesConfig {
        interval_secs: args.interval,
        init_run: args.init_run,
        force_rerun: args.force_rerun,
        disabled: args.disable.iter().map(|&c| c.into()).collect(),
        ..DetectFacesConfig::default()
    };
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    config
}

fn validate_identify(args: &IdentifyArgs) -> Result<(), Box<dyn std::error::Error>> {
    if !args.input.is_dir() {
        return Err(format!("Input directory not found: {}", args.input.display()).into());
    }
    if args.columns == 0 || args.rows == 0 {
        return Err(format!(
            "Montage grid must be at least 1x1, got {}x{}",
            args.columns, args.rows
        )
        .into());
    }
    if args.block_size == 0 {
        return Err("Block size must be positive".into());
    }
    if args.max_in_flight == 0 {
        return Err("Max in-flight calls must be at least 1".into());
    }
    Ok(())
}

fn is_video(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| VIDEO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// A video file yields itself; anything else is read as a list of paths.
fn read_video_list(input: &Path) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
    if is_video(input) {
        return Ok(vec![input.to_path_buf()]);
    }
    let contents = fs::read_to_string(input)
        .map_err(|e| format!("Cannot read video list {}: {e}", input.display()))?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .collect())
}

fn download_progress(label: &'static str) -> ProgressFn {
    Box::new(move |downloaded, total| {
        if total > 0 {
            let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
            eprint!("\rDownloading {label} model... {pct}%");
        } else {
            eprint!("\rDownloading {label} model... {downloaded} bytes");
        }
        if total > 0 && downloaded >= total {
            eprintln!();
        }
    })
}
