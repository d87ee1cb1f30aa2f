use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::control::domain::bus_message::RoundStatus;
use crate::control::domain::control_state::SharedControlState;
use crate::control::domain::status_reporter::StatusReporter;
use crate::handoff::handoff_dir::{HandoffDir, HandoffError};

/// Capture side of two-process mode: ends the round once the generation
/// process has marked it done.
///
/// A done flag for any round other than the one currently generating is
/// cleared without touching the control state or the other files.
pub struct DoneFlagWatcher {
    dir: HandoffDir,
    state: SharedControlState,
    reporter: StatusReporter,
}

impl DoneFlagWatcher {
    pub fn new(dir: HandoffDir, state: SharedControlState, reporter: StatusReporter) -> Self {
        Self {
            dir,
            state,
            reporter,
        }
    }

    /// Returns `true` when the current round was finished.
    pub fn poll_once(&self) -> Result<bool, HandoffError> {
        if !self.dir.done() {
            return Ok(false);
        }

        let done_round = self.dir.done_round();
        let finished = {
            let mut state = self.state.lock();
            match done_round {
                Some(round) if state.is_generating(round) => {
                    state.finish_generation(round).is_ok()
                }
                _ => false,
            }
        };

        if !finished {
            log::info!("Ignoring done flag for round {done_round:?}");
            self.dir.set_done(false)?;
            return Ok(false);
        }
        self.reporter.round_status(RoundStatus::Idle);
        self.dir.reset_flags()?;
        Ok(true)
    }

    /// Polls on a background thread until `running` is cleared.
    pub fn spawn(self, interval: Duration, running: Arc<AtomicBool>) -> JoinHandle<()> {
        std::thread::spawn(move || {
            while running.load(Ordering::Relaxed) {
                if let Err(e) = self.poll_once() {
                    log::warn!("Handoff update failed: {e}");
                }
                std::thread::sleep(interval);
            }
        })
    }
}
