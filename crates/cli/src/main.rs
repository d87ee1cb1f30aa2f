use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};

use faceinator_core::capture::domain::frame_source::FrameSource;
use faceinator_core::capture::infrastructure::ffmpeg_camera::FfmpegCamera;
use faceinator_core::capture::infrastructure::image_sequence_source::ImageSequenceSource;
use faceinator_core::control::domain::control_state::SharedControlState;
use faceinator_core::control::domain::status_reporter::{BusIdentity, StatusReporter};
use faceinator_core::control::infrastructure::console_bus::{
    parse_console_line, ConsoleBus, ConsoleInput,
};
use faceinator_core::detection::domain::detection_filter::DetectionFilter;
use faceinator_core::detection::domain::face_detector::FaceDetector;
use faceinator_core::detection::infrastructure::onnx_yolo_detector::OnnxYoloDetector;
use faceinator_core::generation::domain::prompt::styles_from_config;
use faceinator_core::generation::domain::retry::RetryPolicy;
use faceinator_core::generation::infrastructure::http_result_store::HttpResultStore;
use faceinator_core::generation::infrastructure::replicate_backend::ReplicateBackend;
use faceinator_core::generation::infrastructure::replicate_client::ReplicateClient;
use faceinator_core::generation::infrastructure::replicate_describer::ReplicateDescriber;
use faceinator_core::handoff::handoff_dir::HandoffDir;
use faceinator_core::handoff::handoff_file_sink::HandoffFileSink;
use faceinator_core::pipeline::capture_logger::LogCaptureLogger;
use faceinator_core::pipeline::capture_orchestrator::{CaptureOrchestrator, CaptureWorker};
use faceinator_core::pipeline::done_flag_watcher::DoneFlagWatcher;
use faceinator_core::pipeline::game_state_coordinator::GameStateCoordinator;
use faceinator_core::pipeline::generation_dispatcher::{
    spawn_generation_worker, GenerationDispatcher,
};
use faceinator_core::pipeline::handoff_watcher::HandoffWatcher;
use faceinator_core::pipeline::session_sink::{ChannelSessionSink, SessionSink};
use faceinator_core::quality::domain::quality_gate::QualityGate;
use faceinator_core::shared::config::AppConfig;
use faceinator_core::shared::constants::{YOLO_MODEL_NAME, YOLO_MODEL_URL};
use faceinator_core::shared::model_resolver;
use faceinator_core::shared::region::DEFAULT_IOU_THRESHOLD;

/// Photo booth face capture and portrait generation.
#[derive(Parser)]
#[command(name = "faceinator", version)]
struct Cli {
    /// JSON config file (default: <config dir>/Faceinator/config.json).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Capture and generate in one process, driven from the console.
    Run,
    /// Capture only; finished rounds go to the handoff directory.
    Capture,
    /// Generate only; waits for rounds in the handoff directory.
    Generate,
}

/// Settings that take precedence over the config file.
#[derive(Args)]
struct Overrides {
    /// Camera device, video file or stream URL.
    #[arg(long, global = true)]
    camera: Option<String>,

    /// ffmpeg input format for the camera (e.g. v4l2).
    #[arg(long, global = true)]
    camera_format: Option<String>,

    /// Read frames from a directory of images instead of a camera.
    #[arg(long, global = true)]
    frames: Option<PathBuf>,

    /// Face detection confidence threshold (0.0-1.0).
    #[arg(long, global = true)]
    confidence: Option<f64>,

    /// Crops scoring at or below this Laplacian variance are blurry.
    #[arg(long, global = true)]
    blur_threshold: Option<f64>,

    /// Detector model file; downloaded to the cache when omitted.
    #[arg(long, global = true)]
    model: Option<PathBuf>,

    /// Sender name on the bus.
    #[arg(long, global = true)]
    identity: Option<String>,

    /// Directory for the two-process handoff files.
    #[arg(long, global = true)]
    handoff_dir: Option<PathBuf>,

    /// Where generated pictures are saved.
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let mut config = AppConfig::load_or_default(cli.config.as_deref())?;
    apply_overrides(&mut config, &cli.overrides);
    config.validate()?;

    match cli.command {
        Command::Run => run_single_process(&config, &cli.overrides),
        Command::Capture => run_capture_process(&config, &cli.overrides),
        Command::Generate => run_generation_process(&config),
    }
}

fn apply_overrides(config: &mut AppConfig, o: &Overrides) {
    if let Some(camera) = &o.camera {
        config.camera = camera.clone();
    }
    if let Some(format) = &o.camera_format {
        config.camera_format = Some(format.clone());
    }
    if let Some(confidence) = o.confidence {
        config.confidence = confidence;
    }
    if let Some(threshold) = o.blur_threshold {
        config.blur_threshold = threshold;
    }
    if let Some(identity) = &o.identity {
        config.identity = identity.clone();
    }
    if let Some(dir) = &o.handoff_dir {
        config.handoff_dir = dir.clone();
    }
    if let Some(dir) = &o.output_dir {
        config.output_dir = dir.clone();
    }
}

fn run_single_process(
    config: &AppConfig,
    overrides: &Overrides,
) -> Result<(), Box<dyn std::error::Error>> {
    let state = SharedControlState::new();
    let reporter = console_reporter(config);

    let dispatcher = build_dispatcher(config)?;
    let (sink, jobs) = ChannelSessionSink::pair();
    let generation = spawn_generation_worker(
        dispatcher,
        jobs,
        state.clone(),
        reporter.clone(),
        None,
    );

    let worker = build_capture_worker(config, overrides, reporter.clone(), Box::new(sink))?;
    let mut orchestrator = CaptureOrchestrator::new(state.clone(), worker);
    orchestrator.start();

    let coordinator = GameStateCoordinator::new(state, reporter);
    coordinator.on_connect();
    console_loop(&coordinator, &config.control_topic)?;
    coordinator.on_disconnect();

    // Dropping the orchestrator drops the job sender, which ends the worker
    drop(orchestrator);
    if generation.join().is_err() {
        return Err("generation worker panicked".into());
    }
    Ok(())
}

fn run_capture_process(
    config: &AppConfig,
    overrides: &Overrides,
) -> Result<(), Box<dyn std::error::Error>> {
    let dir = HandoffDir::new(&config.handoff_dir);
    dir.create()?;
    dir.reset_flags()?;

    let state = SharedControlState::new();
    let reporter = console_reporter(config);

    let sink = HandoffFileSink::new(dir.clone());
    let worker = build_capture_worker(config, overrides, reporter.clone(), Box::new(sink))?;
    let mut orchestrator = CaptureOrchestrator::new(state.clone(), worker);
    orchestrator.start();

    let polling = Arc::new(AtomicBool::new(true));
    let watcher = DoneFlagWatcher::new(dir.clone(), state.clone(), reporter.clone())
        .spawn(config.poll_interval(), polling.clone());

    let coordinator = GameStateCoordinator::new(state, reporter).with_reset_hook(move || {
        if let Err(e) = dir.reset_flags() {
            log::warn!("Could not clear handoff files: {e}");
        }
    });
    coordinator.on_connect();
    console_loop(&coordinator, &config.control_topic)?;
    coordinator.on_disconnect();

    orchestrator.stop();
    polling.store(false, Ordering::Relaxed);
    if watcher.join().is_err() {
        return Err("handoff watcher panicked".into());
    }
    Ok(())
}

fn run_generation_process(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let dir = HandoffDir::new(&config.handoff_dir);
    dir.create()?;
    let dispatcher = build_dispatcher(config)?;
    let mut watcher = HandoffWatcher::new(dir, dispatcher, config.poll_interval());
    watcher.run(&AtomicBool::new(true));
    Ok(())
}

fn console_reporter(config: &AppConfig) -> StatusReporter {
    StatusReporter::new(Arc::new(ConsoleBus::stdout()), BusIdentity::from_config(config))
}

/// Feeds stdin lines to the coordinator until `exit`, `quit` or end of input.
fn console_loop(
    coordinator: &GameStateCoordinator,
    control_topic: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    eprintln!("Enter a number of players, `reset`, a JSON message, or `exit`.");
    for line in std::io::stdin().lock().lines() {
        match parse_console_line(&line?, control_topic) {
            ConsoleInput::Quit => break,
            ConsoleInput::Skip => {}
            ConsoleInput::Messages(messages) => {
                for message in messages {
                    coordinator.on_message(message.as_bytes());
                }
            }
        }
    }
    Ok(())
}

fn build_capture_worker(
    config: &AppConfig,
    overrides: &Overrides,
    reporter: StatusReporter,
    sink: Box<dyn SessionSink>,
) -> Result<CaptureWorker, Box<dyn std::error::Error>> {
    Ok(CaptureWorker::new(
        build_source(config, overrides.frames.as_deref()),
        build_detector(overrides.model.as_deref())?,
        DetectionFilter::new(config.confidence, config.padding, DEFAULT_IOU_THRESHOLD),
        QualityGate::new(config.blur_threshold),
        reporter,
        sink,
        Box::new(LogCaptureLogger::new()),
    ))
}

fn build_source(config: &AppConfig, frames: Option<&Path>) -> Box<dyn FrameSource> {
    match frames {
        Some(dir) => Box::new(ImageSequenceSource::new(dir)),
        None => Box::new(FfmpegCamera::new(
            config.camera.clone(),
            config.camera_format.clone(),
        )),
    }
}

fn build_detector(model: Option<&Path>) -> Result<Box<dyn FaceDetector>, Box<dyn std::error::Error>> {
    log::info!("Resolving model: {YOLO_MODEL_NAME}");
    let model_path = model_resolver::resolve(
        YOLO_MODEL_NAME,
        YOLO_MODEL_URL,
        model,
        &model_resolver::model_cache_dir()?,
        Some(Box::new(download_progress)),
    )?;
    eprintln!();
    Ok(Box::new(OnnxYoloDetector::new(&model_path)?))
}

fn build_dispatcher(config: &AppConfig) -> Result<GenerationDispatcher, Box<dyn std::error::Error>> {
    let client = ReplicateClient::from_env(&config.replicate_base_url, config.poll_interval())?;
    let store = HttpResultStore::new(&config.output_dir, config.overlay_path.as_deref())?;

    Ok(GenerationDispatcher::new(
        Box::new(ReplicateDescriber::new(
            client.clone(),
            config.describer_version.clone(),
        )),
        Box::new(ReplicateBackend::new(client)),
        styles_from_config(&config.styles),
        RetryPolicy::new(config.max_attempts, config.retry_delay()),
    )
    .with_store(Box::new(store)))
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading face detection model... {pct}%");
    } else {
        eprint!("\rDownloading face detection model... {downloaded} bytes");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::try_parse_from([
            "faceinator",
            "run",
            "--camera",
            "/dev/video2",
            "--blur-threshold",
            "80",
            "--identity",
            "booth-2",
        ])
        .unwrap();
        let mut config = AppConfig::default();

        apply_overrides(&mut config, &cli.overrides);

        assert_eq!(config.camera, "/dev/video2");
        assert_eq!(config.blur_threshold, 80.0);
        assert_eq!(config.identity, "booth-2");
        assert_eq!(config.confidence, AppConfig::default().confidence);
    }

    #[test]
    fn test_subcommand_is_required() {
        assert!(Cli::try_parse_from(["faceinator"]).is_err());
    }
}
