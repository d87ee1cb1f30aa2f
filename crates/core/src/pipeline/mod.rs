pub mod capture_logger;
pub mod capture_orchestrator;
pub mod done_flag_watcher;
pub mod game_state_coordinator;
pub mod generation_dispatcher;
pub mod handoff_watcher;
pub mod session_sink;
