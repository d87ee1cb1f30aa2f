use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;

use crate::capture::domain::capture_session::CaptureSession;
use crate::control::domain::phase::Phase;
use crate::generation::domain::generation_job::GenerationJob;
use crate::quality::domain::quality_gate::{IncompleteSession, QualityGate, QualityVerdict};
use crate::shared::frame::Frame;
use crate::shared::region::Region;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ControlError {
    #[error("invalid phase transition {from} -> {to}")]
    InvalidTransition { from: Phase, to: Phase },
    #[error("{action} rejected while {phase}")]
    Busy { action: &'static str, phase: Phase },
    #[error("result for round {got} discarded, current round is {current}")]
    StaleRound { got: u64, current: u64 },
    #[error(transparent)]
    Incomplete(#[from] IncompleteSession),
}

/// Read-only copy of the control state taken under one lock.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ControlSnapshot {
    pub game_active: bool,
    pub required_players: u32,
    pub phase: Phase,
    pub round: u64,
    pub captured: usize,
}

/// What the capture loop needs to know before running detection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CaptureRequest {
    pub round: u64,
    pub remaining: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AcceptOutcome {
    pub accepted: usize,
    /// The session reached its target and moved to quality checking.
    pub complete: bool,
}

/// Result of running the quality gate from `QualityChecking`.
#[derive(Debug)]
pub enum QualityStep {
    /// Faces were discarded; capturing resumes.
    Recapture { index: usize, score: f64 },
    /// All faces passed; the job carries copies of them.
    Dispatch(GenerationJob),
}

/// Process-wide round state.
///
/// Fields are private: every change goes through a method that checks the
/// phase table, so `phase == Idle` holds exactly when there is no session.
#[derive(Debug, Default)]
pub struct ControlState {
    game_active: bool,
    required_players: u32,
    phase: Phase,
    round: u64,
    session: Option<CaptureSession>,
}

impl ControlState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ControlSnapshot {
        ControlSnapshot {
            game_active: self.game_active,
            required_players: self.required_players,
            phase: self.phase,
            round: self.round,
            captured: self.session.as_ref().map_or(0, CaptureSession::len),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn session(&self) -> Option<&CaptureSession> {
        self.session.as_ref()
    }

    fn transition(&mut self, to: Phase) -> Result<(), ControlError> {
        if !self.phase.can_transition_to(to) {
            return Err(ControlError::InvalidTransition {
                from: self.phase,
                to,
            });
        }
        log::debug!("Phase {} -> {to}", self.phase);
        self.phase = to;
        Ok(())
    }

    /// Arms the game. Only accepted while idle; a running round is never preempted.
    pub fn start_game(&mut self) -> Result<(), ControlError> {
        if self.phase != Phase::Idle {
            return Err(ControlError::Busy {
                action: "start game",
                phase: self.phase,
            });
        }
        self.game_active = true;
        Ok(())
    }

    /// Sets the target for the next round. A running round keeps its target.
    pub fn set_required_players(&mut self, count: u32) -> Result<(), ControlError> {
        if self.phase != Phase::Idle {
            return Err(ControlError::Busy {
                action: "player count update",
                phase: self.phase,
            });
        }
        self.required_players = count;
        Ok(())
    }

    /// Opens a new round if the game is armed and a player count is known.
    ///
    /// Returns the new round id, or `None` when the conditions are not met.
    pub fn try_begin_capture(&mut self) -> Option<u64> {
        if self.phase != Phase::Idle || !self.game_active || self.required_players == 0 {
            return None;
        }
        self.transition(Phase::Capturing).ok()?;
        self.round += 1;
        self.session = Some(CaptureSession::new(self.required_players));
        log::info!(
            "Round {} started, capturing {} faces",
            self.round,
            self.required_players
        );
        Some(self.round)
    }

    pub fn capture_request(&self) -> Option<CaptureRequest> {
        if self.phase != Phase::Capturing {
            return None;
        }
        let session = self.session.as_ref()?;
        Some(CaptureRequest {
            round: self.round,
            remaining: session.remaining(),
        })
    }

    /// Appends crops detected for `round`, in order, until the session is full.
    ///
    /// Extras beyond the free slots are dropped. Reaching the target moves
    /// the state to `QualityChecking`.
    pub fn accept_faces(
        &mut self,
        round: u64,
        faces: Vec<(Frame, Region, f64)>,
    ) -> Result<AcceptOutcome, ControlError> {
        if round != self.round {
            return Err(ControlError::StaleRound {
                got: round,
                current: self.round,
            });
        }
        if self.phase != Phase::Capturing {
            return Err(ControlError::InvalidTransition {
                from: self.phase,
                to: Phase::QualityChecking,
            });
        }
        let Some(session) = self.session.as_mut() else {
            return Err(ControlError::InvalidTransition {
                from: self.phase,
                to: Phase::QualityChecking,
            });
        };

        let mut accepted = 0;
        for (image, region, confidence) in faces {
            match session.push(image, region, confidence) {
                Some(index) => {
                    log::info!("Captured face {index} (confidence {confidence:.2})");
                    accepted += 1;
                }
                None => break,
            }
        }

        let complete = session.is_complete();
        if complete {
            self.transition(Phase::QualityChecking)?;
        }
        Ok(AcceptOutcome { accepted, complete })
    }

    /// Runs the gate over the full session and moves to `Generating` or back
    /// to `Capturing`.
    pub fn evaluate_quality(&mut self, gate: &QualityGate) -> Result<QualityStep, ControlError> {
        if self.phase != Phase::QualityChecking {
            return Err(ControlError::InvalidTransition {
                from: self.phase,
                to: Phase::Generating,
            });
        }
        let Some(session) = self.session.as_mut() else {
            return Err(ControlError::InvalidTransition {
                from: self.phase,
                to: Phase::Generating,
            });
        };

        match gate.evaluate(session)? {
            QualityVerdict::Blurry { index, score } => {
                self.transition(Phase::Capturing)?;
                Ok(QualityStep::Recapture { index, score })
            }
            QualityVerdict::AllClear => {
                let faces = session.faces().to_vec();
                self.transition(Phase::Generating)?;
                Ok(QualityStep::Dispatch(GenerationJob {
                    round: self.round,
                    faces,
                }))
            }
        }
    }

    /// `true` while `round` is the current round and still waiting on generation.
    pub fn is_generating(&self, round: u64) -> bool {
        self.phase == Phase::Generating && self.round == round
    }

    /// Ends a generated round. The game must be started again for the next one.
    pub fn finish_generation(&mut self, round: u64) -> Result<(), ControlError> {
        if round != self.round {
            return Err(ControlError::StaleRound {
                got: round,
                current: self.round,
            });
        }
        self.transition(Phase::Idle)?;
        self.clear();
        log::info!("Round {round} finished");
        Ok(())
    }

    /// Drops a round that can no longer finish capturing, e.g. when the
    /// camera is gone. Returns its id; a generating round is left alone.
    pub fn abort_capture(&mut self) -> Option<u64> {
        if !matches!(self.phase, Phase::Capturing | Phase::QualityChecking) {
            return None;
        }
        self.reset();
        Some(self.round)
    }

    /// Back to the initial values from any phase. The round counter keeps
    /// counting so late results of the aborted round are recognised as stale.
    pub fn reset(&mut self) {
        if self.phase != Phase::Idle {
            log::info!("Round {} aborted while {}", self.round, self.phase);
        }
        self.clear();
    }

    fn clear(&mut self) {
        self.game_active = false;
        self.required_players = 0;
        self.phase = Phase::Idle;
        self.session = None;
    }
}

/// Control state shared between the bus handler, the capture loop and the
/// generation worker.
#[derive(Clone, Debug, Default)]
pub struct SharedControlState {
    inner: Arc<Mutex<ControlState>>,
}

impl SharedControlState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the state. A poisoned lock is recovered: every mutation is a
    /// single checked transition, so the state is never half-written.
    pub fn lock(&self) -> MutexGuard<'_, ControlState> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn snapshot(&self) -> ControlSnapshot {
        self.lock().snapshot()
    }
}
