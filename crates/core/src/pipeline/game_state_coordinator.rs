use crate::control::domain::bus_message::{classify, InboundCommand, InfoTrigger, RoundStatus};
use crate::control::domain::control_state::SharedControlState;
use crate::control::domain::status_reporter::StatusReporter;
use crate::control::infrastructure::local_ip::outbound_ip_string;

type IpLookup = Box<dyn Fn() -> String + Send + Sync>;
type ResetHook = Box<dyn Fn() + Send + Sync>;

/// Turns bus traffic into control state changes and acknowledgements.
///
/// Handlers never block on capture or generation: they take the control
/// lock briefly, release it, then publish.
pub struct GameStateCoordinator {
    state: SharedControlState,
    reporter: StatusReporter,
    ip_lookup: IpLookup,
    on_reset: Option<ResetHook>,
}

impl GameStateCoordinator {
    pub fn new(state: SharedControlState, reporter: StatusReporter) -> Self {
        Self {
            state,
            reporter,
            ip_lookup: Box::new(outbound_ip_string),
            on_reset: None,
        }
    }

    pub fn with_ip_lookup(mut self, lookup: impl Fn() -> String + Send + Sync + 'static) -> Self {
        self.ip_lookup = Box::new(lookup);
        self
    }

    /// Runs `hook` after every bus reset, once the control state is cleared.
    pub fn with_reset_hook(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_reset = Some(Box::new(hook));
        self
    }

    /// Announces the node: connectivity info, then a ready status.
    pub fn on_connect(&self) {
        log::info!("Connected as {}", self.reporter.sender());
        self.reporter.info(&(self.ip_lookup)(), InfoTrigger::Startup);
        self.reporter.round_status(RoundStatus::Idle);
    }

    pub fn on_disconnect(&self) {
        log::info!("Disconnecting");
        self.reporter.disconnected();
    }

    /// Handles one control-topic payload and returns how it was classified.
    ///
    /// Malformed payloads are logged and dropped.
    pub fn on_message(&self, payload: &[u8]) -> Option<InboundCommand> {
        let command = match classify(payload, self.reporter.sender()) {
            Ok(c) => c,
            Err(e) => {
                log::warn!("Ignoring control message: {e}");
                return None;
            }
        };

        match &command {
            InboundCommand::FromSelf => log::trace!("Skipping own message"),
            InboundCommand::StartGame => self.start_game(),
            InboundCommand::PlayerCount(n) => self.update_players(*n),
            InboundCommand::InvalidPlayerCount(raw) if raw == "null" => {
                log::debug!("Player count query seen on control topic")
            }
            InboundCommand::InvalidPlayerCount(raw) => {
                log::warn!("Invalid player count {raw}")
            }
            InboundCommand::SystemInfoRequest => {
                self.reporter.info(&(self.ip_lookup)(), InfoTrigger::Request)
            }
            InboundCommand::Reset => {
                log::info!("Reset requested");
                self.state.lock().reset();
                if let Some(hook) = &self.on_reset {
                    hook();
                }
                self.reporter.round_status(RoundStatus::Idle);
            }
            InboundCommand::Unrecognized => log::debug!("Unrecognized control message"),
        }
        Some(command)
    }

    fn start_game(&self) {
        let started = {
            let mut state = self.state.lock();
            state.start_game().map(|()| state.try_begin_capture())
        };
        match started {
            Ok(round) => {
                log::info!("Game started");
                self.reporter.round_status(RoundStatus::GameStarted);
                self.reporter.ask_players();
                if let Some(round) = round {
                    log::debug!("Round {round} armed on start");
                }
            }
            Err(e) => log::warn!("{e}"),
        }
    }

    fn update_players(&self, count: u32) {
        let result = {
            let mut state = self.state.lock();
            state
                .set_required_players(count)
                .map(|()| state.try_begin_capture())
        };
        match result {
            Ok(Some(round)) => log::info!("{count} players, round {round} capturing"),
            Ok(None) => log::info!("Player count set to {count}"),
            Err(e) => log::warn!("{e}"),
        }
    }
}
