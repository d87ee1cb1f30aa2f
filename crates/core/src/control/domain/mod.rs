pub mod bus_message;
pub mod control_state;
pub mod message_publisher;
pub mod phase;
pub mod status_reporter;
