use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::handoff::handoff_dir::{HandoffDir, HandoffError};
use crate::pipeline::generation_dispatcher::{GenerationDispatcher, GenerationReport};

/// Generation side of two-process mode.
///
/// Waits for `scanningComplete=1`, runs the dispatcher over the faces in the
/// handoff directory, then marks the round done and clears
/// `scanningComplete`. A round withdrawn by a reset while it was generating
/// is left unmarked so a newer round in the directory is not lost.
pub struct HandoffWatcher {
    dir: HandoffDir,
    dispatcher: GenerationDispatcher,
    interval: Duration,
}

impl HandoffWatcher {
    pub fn new(dir: HandoffDir, dispatcher: GenerationDispatcher, interval: Duration) -> Self {
        Self {
            dir,
            dispatcher,
            interval,
        }
    }

    /// One poll. `Ok(None)` means nothing was ready.
    pub fn poll_once(&mut self) -> Result<Option<GenerationReport>, HandoffError> {
        if !self.dir.scanning_complete() {
            return Ok(None);
        }
        let Some(job) = self.dir.load_job() else {
            return Ok(None);
        };

        let report = self.dispatcher.run(&job);
        if self.dir.round() != Some(job.round) {
            log::info!("Round {} was withdrawn during generation", job.round);
            return Ok(Some(report));
        }
        self.dir.mark_done(job.round)?;
        self.dir.set_scanning_complete(false)?;
        Ok(Some(report))
    }

    /// Polls until `running` is cleared.
    pub fn run(&mut self, running: &AtomicBool) {
        log::info!("Watching {} for finished scans", self.dir.root().display());
        while running.load(Ordering::Relaxed) {
            if let Err(e) = self.poll_once() {
                log::warn!("Handoff update failed: {e}");
            }
            std::thread::sleep(self.interval);
        }
    }
}
