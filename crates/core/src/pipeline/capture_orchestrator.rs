use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Instant;

use crate::capture::domain::frame_source::FrameSource;
use crate::control::domain::bus_message::RoundStatus;
use crate::control::domain::control_state::{QualityStep, SharedControlState};
use crate::control::domain::status_reporter::StatusReporter;
use crate::detection::domain::detection_filter::DetectionFilter;
use crate::detection::domain::face_detector::FaceDetector;
use crate::pipeline::capture_logger::CaptureLogger;
use crate::pipeline::session_sink::SessionSink;
use crate::quality::domain::quality_gate::QualityGate;
use crate::shared::frame::Frame;

/// Liveness of the capture thread.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CaptureHealth {
    Stopped,
    Running,
    /// The frame source could not be opened or stopped delivering frames.
    CameraFailed(String),
}

/// What one frame did to the round.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum FrameOutcome {
    /// No round is capturing; detection was skipped.
    Idle,
    DetectorError,
    NoFaces,
    /// The round changed while detection ran; crops were dropped.
    Discarded,
    Accepted(usize),
    Recapture { index: usize, score: f64 },
    Dispatched(u64),
    DispatchFailed(u64),
}

/// Everything the capture thread owns.
pub struct CaptureWorker {
    source: Box<dyn FrameSource>,
    detector: Box<dyn FaceDetector>,
    filter: DetectionFilter,
    gate: QualityGate,
    reporter: StatusReporter,
    sink: Box<dyn SessionSink>,
    logger: Box<dyn CaptureLogger>,
    /// Round the logger is gathering statistics for.
    open_round: Option<u64>,
}

impl CaptureWorker {
    pub fn new(
        source: Box<dyn FrameSource>,
        detector: Box<dyn FaceDetector>,
        filter: DetectionFilter,
        gate: QualityGate,
        reporter: StatusReporter,
        sink: Box<dyn SessionSink>,
        logger: Box<dyn CaptureLogger>,
    ) -> Self {
        Self {
            source,
            detector,
            filter,
            gate,
            reporter,
            sink,
            logger,
            open_round: None,
        }
    }

    fn close_round(&mut self, round: u64) {
        self.logger.round_finished(round);
        self.open_round = None;
    }

    /// Runs one frame through detection, the session and the quality gate.
    ///
    /// The control lock is not held while the detector runs. Crops are
    /// tagged with the round they were detected for, so a reset in between
    /// makes them stale instead of leaking into the next round.
    pub fn process_frame(&mut self, state: &SharedControlState, frame: &Frame) -> FrameOutcome {
        let request = state.lock().capture_request();
        if let Some(open) = self.open_round {
            if request.map(|r| r.round) != Some(open) {
                // Reset or aborted since the last frame
                self.close_round(open);
            }
        }
        let Some(request) = request else {
            return FrameOutcome::Idle;
        };
        self.open_round = Some(request.round);

        let t0 = Instant::now();
        let detections = match self.detector.detect(frame) {
            Ok(d) => d,
            Err(e) => {
                log::warn!("Detection failed on frame {}: {e}", frame.index());
                self.logger.count("detector_errors");
                return FrameOutcome::DetectorError;
            }
        };
        let candidates = self
            .filter
            .apply(detections, frame.width(), frame.height());
        self.logger
            .timing("detect", t0.elapsed().as_secs_f64() * 1000.0);
        self.logger
            .metric("faces_per_frame", candidates.len() as f64);

        let crops: Vec<_> = candidates
            .into_iter()
            .filter_map(|d| {
                frame
                    .crop(&d.region)
                    .map(|crop| (crop, d.region, d.confidence))
            })
            .take(request.remaining)
            .collect();
        if crops.is_empty() {
            return FrameOutcome::NoFaces;
        }

        let mut guard = state.lock();
        let accepted = match guard.accept_faces(request.round, crops) {
            Ok(outcome) if !outcome.complete => return FrameOutcome::Accepted(outcome.accepted),
            Ok(outcome) => outcome.accepted,
            Err(e) => {
                log::info!("Dropping crops from frame {}: {e}", frame.index());
                self.logger.count("stale_results");
                return FrameOutcome::Discarded;
            }
        };
        log::debug!("Round {} complete after {accepted} more faces", request.round);

        let t0 = Instant::now();
        let step = guard.evaluate_quality(&self.gate);
        drop(guard);
        self.logger
            .timing("quality", t0.elapsed().as_secs_f64() * 1000.0);

        match step {
            Ok(QualityStep::Recapture { index, score }) => {
                log::info!(
                    "Face {index} too blurry ({score:.1} <= {:.1}), recapturing",
                    self.gate.threshold()
                );
                self.logger.count("quality_rejections");
                self.close_round(request.round);
                FrameOutcome::Recapture { index, score }
            }
            Ok(QualityStep::Dispatch(job)) => {
                let round = job.round;
                for face in &job.faces {
                    if let Some(score) = face.sharpness {
                        self.logger.metric("sharpness", score);
                    }
                }
                self.close_round(round);
                self.reporter.round_status(RoundStatus::Generating);
                log::info!("Round {round}: {} faces sent to generation", job.faces.len());

                match self.sink.submit(job) {
                    Ok(()) => FrameOutcome::Dispatched(round),
                    Err(e) => {
                        log::error!("Round {round} could not be handed to generation: {e}");
                        state.lock().reset();
                        self.reporter.round_status(RoundStatus::Idle);
                        FrameOutcome::DispatchFailed(round)
                    }
                }
            }
            Err(e) => {
                log::error!("Quality check failed: {e}");
                FrameOutcome::Discarded
            }
        }
    }
}

/// Owns the capture thread.
///
/// `start` is idempotent while the thread runs. `stop` joins the thread and
/// takes the worker back so the loop can be started again.
pub struct CaptureOrchestrator {
    state: SharedControlState,
    worker: Option<CaptureWorker>,
    handle: Option<JoinHandle<CaptureWorker>>,
    running: Arc<AtomicBool>,
    health: Arc<Mutex<CaptureHealth>>,
}

impl CaptureOrchestrator {
    pub fn new(state: SharedControlState, worker: CaptureWorker) -> Self {
        Self {
            state,
            worker: Some(worker),
            handle: None,
            running: Arc::new(AtomicBool::new(false)),
            health: Arc::new(Mutex::new(CaptureHealth::Stopped)),
        }
    }

    pub fn health(&self) -> CaptureHealth {
        self.health
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Spawns the capture thread. Returns `false` if it was already running.
    pub fn start(&mut self) -> bool {
        if self.handle.as_ref().is_some_and(|h| !h.is_finished()) {
            return false;
        }
        self.reclaim();
        let Some(worker) = self.worker.take() else {
            log::error!("Capture worker was lost; cannot start");
            return false;
        };

        self.running.store(true, Ordering::Relaxed);
        set_health(&self.health, CaptureHealth::Running);
        self.handle = Some(spawn_capture_loop(
            worker,
            self.state.clone(),
            self.running.clone(),
            self.health.clone(),
        ));
        log::info!("Capture loop started");
        true
    }

    /// Signals the loop to finish and waits for it.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        self.reclaim();
        let mut health = self.health.lock().unwrap_or_else(|p| p.into_inner());
        if *health == CaptureHealth::Running {
            *health = CaptureHealth::Stopped;
        }
    }

    fn reclaim(&mut self) {
        if let Some(handle) = self.handle.take() {
            match handle.join() {
                Ok(worker) => self.worker = Some(worker),
                Err(_) => {
                    log::error!("Capture thread panicked");
                    set_health(
                        &self.health,
                        CaptureHealth::CameraFailed("capture thread panicked".into()),
                    );
                }
            }
        }
    }
}

impl Drop for CaptureOrchestrator {
    fn drop(&mut self) {
        self.stop();
    }
}

fn set_health(health: &Mutex<CaptureHealth>, value: CaptureHealth) {
    *health.lock().unwrap_or_else(|p| p.into_inner()) = value;
}

/// Marks the camera as failed and drops a round that can no longer finish
/// capturing, announcing idle for it.
fn camera_lost(
    worker: &CaptureWorker,
    state: &SharedControlState,
    health: &Mutex<CaptureHealth>,
    reason: String,
) {
    set_health(health, CaptureHealth::CameraFailed(reason));
    let aborted = state.lock().abort_capture();
    if let Some(round) = aborted {
        log::warn!("Round {round} aborted: no camera");
        worker.reporter.round_status(RoundStatus::Idle);
    }
}

fn spawn_capture_loop(
    mut worker: CaptureWorker,
    state: SharedControlState,
    running: Arc<AtomicBool>,
    health: Arc<Mutex<CaptureHealth>>,
) -> JoinHandle<CaptureWorker> {
    std::thread::spawn(move || {
        if let Err(e) = worker.source.open() {
            log::error!("Cannot open camera: {e}");
            camera_lost(&worker, &state, &health, e.to_string());
            running.store(false, Ordering::Relaxed);
            return worker;
        }

        while running.load(Ordering::Relaxed) {
            match worker.source.next_frame() {
                Ok(frame) => {
                    worker.process_frame(&state, &frame);
                }
                Err(e) => {
                    log::error!("Camera stopped delivering frames: {e}");
                    camera_lost(&worker, &state, &health, e.to_string());
                    break;
                }
            }
        }

        worker.source.close();
        running.store(false, Ordering::Relaxed);
        worker
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::domain::phase::Phase;
    use crate::control::domain::status_reporter::BusIdentity;
    use crate::control::infrastructure::channel_bus::{BusEnvelope, ChannelBus};
    use crate::detection::domain::detection::Detection;
    use crate::generation::domain::generation_job::GenerationJob;
    use crate::capture::infrastructure::image_sequence_source::ImageSequenceSource;
    use crate::pipeline::capture_logger::NullCaptureLogger;
    use crate::pipeline::session_sink::ChannelSessionSink;
    use crate::shared::region::Region;
    use crossbeam_channel::Receiver;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tempfile::TempDir;

    fn checkerboard(w: u32, h: u32) -> Frame {
        let data = (0..w * h)
            .flat_map(|i| {
                let v = if (i % w + i / w) % 2 == 0 { 0 } else { 255 };
                [v, v, v]
            })
            .collect();
        Frame::new(data, w, h, 3, 0)
    }

    fn grey(w: u32, h: u32) -> Frame {
        Frame::new(vec![128u8; (w * h * 3) as usize], w, h, 3, 0)
    }

    fn det(x: i32, conf: f64) -> Detection {
        Detection::new(Region::new(x, 10, 40, 40), conf)
    }

    /// Returns the scripted detections in order, then nothing.
    struct ScriptedDetector {
        script: VecDeque<Result<Vec<Detection>, String>>,
        calls: Arc<AtomicUsize>,
    }

    impl FaceDetector for ScriptedDetector {
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<Detection>, Box<dyn std::error::Error>> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            match self.script.pop_front() {
                Some(Ok(d)) => Ok(d),
                Some(Err(e)) => Err(e.into()),
                None => Ok(vec![]),
            }
        }
    }

    /// Delivers `count` frames, then fails. `count == None` never ends.
    struct CountedSource {
        frame: Frame,
        count: Option<usize>,
        delivered: usize,
    }

    impl FrameSource for CountedSource {
        fn open(&mut self) -> Result<(), Box<dyn std::error::Error>> {
            self.delivered = 0;
            Ok(())
        }

        fn next_frame(&mut self) -> Result<Frame, Box<dyn std::error::Error>> {
            if self.count.is_some_and(|c| self.delivered >= c) {
                return Err("end of test stream".into());
            }
            self.delivered += 1;
            if self.count.is_none() {
                std::thread::sleep(Duration::from_millis(1));
            }
            Ok(self.frame.clone())
        }

        fn close(&mut self) {}
    }

    /// Keeps the ids passed to `round_finished`.
    struct RoundLog(Arc<Mutex<Vec<u64>>>);

    impl CaptureLogger for RoundLog {
        fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
        fn metric(&mut self, _name: &str, _value: f64) {}
        fn count(&mut self, _name: &str) {}
        fn round_finished(&mut self, round: u64) {
            self.0.lock().unwrap().push(round);
        }
    }

    struct BrokenSink;

    impl SessionSink for BrokenSink {
        fn submit(&mut self, _job: GenerationJob) -> Result<(), Box<dyn std::error::Error>> {
            Err("no worker".into())
        }
    }

    struct Harness {
        worker: CaptureWorker,
        jobs: Receiver<GenerationJob>,
        status: Receiver<BusEnvelope>,
        detector_calls: Arc<AtomicUsize>,
    }

    fn harness(script: Vec<Result<Vec<Detection>, String>>, source: CountedSource) -> Harness {
        let bus = Arc::new(ChannelBus::new());
        let status = bus.subscribe("alch");
        let reporter = StatusReporter::new(
            bus,
            BusIdentity {
                sender: "faceinator".into(),
                status_topic: "alch".into(),
                game_topic: "alch/game".into(),
            },
        );
        let (sink, jobs) = ChannelSessionSink::pair();
        let detector_calls = Arc::new(AtomicUsize::new(0));
        let worker = CaptureWorker::new(
            Box::new(source),
            Box::new(ScriptedDetector {
                script: script.into(),
                calls: detector_calls.clone(),
            }),
            DetectionFilter::new(0.5, 0, 0.4),
            QualityGate::new(100.0),
            reporter,
            Box::new(sink),
            Box::new(NullCaptureLogger),
        );
        Harness {
            worker,
            jobs,
            status,
            detector_calls,
        }
    }

    fn source(frame: Frame, count: Option<usize>) -> CountedSource {
        CountedSource {
            frame,
            count,
            delivered: 0,
        }
    }

    fn armed(players: u32) -> SharedControlState {
        let state = SharedControlState::new();
        {
            let mut s = state.lock();
            s.start_game().unwrap();
            s.set_required_players(players).unwrap();
            s.try_begin_capture().unwrap();
        }
        state
    }

    fn states(status: &Receiver<BusEnvelope>) -> Vec<u64> {
        status
            .try_iter()
            .map(|e| {
                let v: serde_json::Value = serde_json::from_str(&e.payload).unwrap();
                v["state"].as_u64().unwrap()
            })
            .collect()
    }

    #[test]
    fn test_idle_state_skips_detection() {
        let mut h = harness(vec![Ok(vec![det(10, 0.9)])], source(checkerboard(200, 100), None));
        let state = SharedControlState::new();

        let outcome = h.worker.process_frame(&state, &checkerboard(200, 100));

        assert_eq!(outcome, FrameOutcome::Idle);
        assert_eq!(h.detector_calls.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_two_faces_in_one_frame_dispatch_round() {
        let mut h = harness(
            vec![Ok(vec![det(10, 0.8), det(120, 0.9)])],
            source(checkerboard(200, 100), None),
        );
        let state = armed(2);

        let outcome = h.worker.process_frame(&state, &checkerboard(200, 100));

        assert_eq!(outcome, FrameOutcome::Dispatched(1));
        assert_eq!(state.snapshot().phase, Phase::Generating);
        let job = h.jobs.try_recv().unwrap();
        assert_eq!(job.round, 1);
        let indices: Vec<usize> = job.faces.iter().map(|f| f.index).collect();
        assert_eq!(indices, vec![0, 1]);
        // highest confidence is captured first
        assert_eq!(job.faces[0].bounding_box.x, 120);
        assert!(job.faces.iter().all(|f| f.sharpness.is_some()));
        assert_eq!(states(&h.status), vec![2]);
    }

    #[test]
    fn test_faces_accumulate_across_frames() {
        let mut h = harness(
            vec![Ok(vec![det(10, 0.9)]), Ok(vec![]), Ok(vec![det(120, 0.9)])],
            source(checkerboard(200, 100), None),
        );
        let state = armed(2);
        let frame = checkerboard(200, 100);

        assert_eq!(h.worker.process_frame(&state, &frame), FrameOutcome::Accepted(1));
        assert_eq!(h.worker.process_frame(&state, &frame), FrameOutcome::NoFaces);
        assert_eq!(state.snapshot().captured, 1);
        assert_eq!(h.worker.process_frame(&state, &frame), FrameOutcome::Dispatched(1));
        assert_eq!(h.jobs.try_recv().unwrap().faces.len(), 2);
    }

    #[test]
    fn test_extra_faces_beyond_target_are_dropped() {
        let mut h = harness(
            vec![Ok(vec![det(0, 0.6), det(70, 0.95), det(140, 0.8)])],
            source(checkerboard(200, 100), None),
        );
        let state = armed(2);

        h.worker.process_frame(&state, &checkerboard(200, 100));

        let job = h.jobs.try_recv().unwrap();
        let xs: Vec<i32> = job.faces.iter().map(|f| f.bounding_box.x).collect();
        assert_eq!(xs, vec![70, 140]);
    }

    #[test]
    fn test_low_confidence_detections_are_ignored() {
        let mut h = harness(vec![Ok(vec![det(10, 0.3)])], source(grey(200, 100), None));
        let state = armed(1);

        let outcome = h.worker.process_frame(&state, &checkerboard(200, 100));

        assert_eq!(outcome, FrameOutcome::NoFaces);
        assert_eq!(state.snapshot().phase, Phase::Capturing);
    }

    #[test]
    fn test_blurry_round_restarts_capture() {
        let mut h = harness(
            vec![Ok(vec![det(10, 0.9), det(120, 0.9)])],
            source(grey(200, 100), None),
        );
        let state = armed(2);

        let outcome = h.worker.process_frame(&state, &grey(200, 100));

        assert!(matches!(outcome, FrameOutcome::Recapture { index: 0, .. }));
        let snap = state.snapshot();
        assert_eq!(snap.phase, Phase::Capturing);
        assert_eq!(snap.captured, 0);
        assert_eq!(snap.round, 1);
        assert!(h.jobs.try_recv().is_err());
        assert!(states(&h.status).is_empty());
    }

    #[test]
    fn test_detector_error_leaves_round_untouched() {
        let mut h = harness(
            vec![Err("inference failed".into())],
            source(checkerboard(200, 100), None),
        );
        let state = armed(1);

        let outcome = h.worker.process_frame(&state, &checkerboard(200, 100));

        assert_eq!(outcome, FrameOutcome::DetectorError);
        assert_eq!(state.snapshot().phase, Phase::Capturing);
    }

    #[test]
    fn test_failed_hand_off_returns_to_idle() {
        let mut h = harness(vec![Ok(vec![det(10, 0.9)])], source(checkerboard(200, 100), None));
        h.worker.sink = Box::new(BrokenSink);
        let state = armed(1);

        let outcome = h.worker.process_frame(&state, &checkerboard(200, 100));

        assert_eq!(outcome, FrameOutcome::DispatchFailed(1));
        assert_eq!(state.snapshot().phase, Phase::Idle);
        assert_eq!(states(&h.status), vec![2, 0]);
    }

    fn wait_until(mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if done() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_thread_reports_camera_failure_after_stream_ends() {
        let h = harness(vec![Ok(vec![det(10, 0.9)])], source(checkerboard(200, 100), Some(3)));
        let state = armed(1);
        let mut orchestrator = CaptureOrchestrator::new(state.clone(), h.worker);

        assert!(orchestrator.start());
        assert!(wait_until(|| !orchestrator.is_running()));

        assert!(matches!(orchestrator.health(), CaptureHealth::CameraFailed(_)));
        assert_eq!(h.jobs.try_recv().unwrap().round, 1);
        assert_eq!(state.snapshot().phase, Phase::Generating);
    }

    #[test]
    fn test_start_is_idempotent_and_restartable() {
        let h = harness(vec![], source(grey(32, 32), None));
        let mut orchestrator = CaptureOrchestrator::new(SharedControlState::new(), h.worker);

        assert!(orchestrator.start());
        assert!(!orchestrator.start());
        assert_eq!(orchestrator.health(), CaptureHealth::Running);

        orchestrator.stop();
        assert_eq!(orchestrator.health(), CaptureHealth::Stopped);
        assert!(!orchestrator.is_running());

        assert!(orchestrator.start());
        orchestrator.stop();
        assert_eq!(orchestrator.health(), CaptureHealth::Stopped);
    }

    #[test]
    fn test_round_summary_on_dispatch_recapture_and_reset() {
        let mut h = harness(
            vec![Ok(vec![det(10, 0.9)]), Ok(vec![]), Ok(vec![det(10, 0.9)])],
            source(grey(200, 100), None),
        );
        let finished = Arc::new(Mutex::new(Vec::new()));
        h.worker.logger = Box::new(RoundLog(finished.clone()));
        let state = armed(1);

        // Blurry crop: the capture attempt ends, round 1 goes on
        assert!(matches!(
            h.worker.process_frame(&state, &grey(200, 100)),
            FrameOutcome::Recapture { .. }
        ));
        assert_eq!(*finished.lock().unwrap(), vec![1]);

        h.worker.process_frame(&state, &grey(200, 100));
        state.lock().reset();
        assert_eq!(h.worker.process_frame(&state, &grey(200, 100)), FrameOutcome::Idle);
        assert_eq!(*finished.lock().unwrap(), vec![1, 1]);

        {
            let mut s = state.lock();
            s.start_game().unwrap();
            s.set_required_players(1).unwrap();
            s.try_begin_capture().unwrap();
        }
        assert_eq!(
            h.worker.process_frame(&state, &checkerboard(200, 100)),
            FrameOutcome::Dispatched(2)
        );
        assert_eq!(*finished.lock().unwrap(), vec![1, 1, 2]);
    }

    #[test]
    fn test_camera_loss_aborts_capturing_round() {
        let h = harness(vec![], source(grey(32, 32), Some(0)));
        let state = armed(2);
        let mut orchestrator = CaptureOrchestrator::new(state.clone(), h.worker);

        assert!(orchestrator.start());
        assert!(wait_until(|| !orchestrator.is_running()));

        assert!(matches!(orchestrator.health(), CaptureHealth::CameraFailed(_)));
        assert_eq!(state.snapshot().phase, Phase::Idle);
        assert_eq!(states(&h.status), vec![0]);
    }

    #[test]
    fn test_image_sequence_survives_idle_time_before_round() {
        let tmp = TempDir::new().unwrap();
        for i in 0..5 {
            image::RgbImage::from_fn(200, 100, |x, y| {
                let v = if (x + y) % 2 == 0 { 0 } else { 255 };
                image::Rgb([v, v, v])
            })
            .save(tmp.path().join(format!("frame_{i}.png")))
            .unwrap();
        }
        let mut h = harness(vec![Ok(vec![det(10, 0.9)])], source(grey(32, 32), None));
        h.worker.source = Box::new(ImageSequenceSource::new(tmp.path()).with_frame_rate(200));
        let state = SharedControlState::new();
        let mut orchestrator = CaptureOrchestrator::new(state.clone(), h.worker);
        assert!(orchestrator.start());

        // Long enough to have gone through the directory several times
        std::thread::sleep(Duration::from_millis(150));
        assert_eq!(orchestrator.health(), CaptureHealth::Running);
        {
            let mut s = state.lock();
            s.start_game().unwrap();
            s.set_required_players(1).unwrap();
            s.try_begin_capture().unwrap();
        }

        let job = h.jobs.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(job.round, 1);
        assert_eq!(orchestrator.health(), CaptureHealth::Running);
        orchestrator.stop();
    }
}
