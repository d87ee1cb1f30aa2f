pub mod channel_bus;
pub mod console_bus;
pub mod local_ip;
