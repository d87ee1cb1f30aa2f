pub mod capture_session;
pub mod face_capture;
pub mod frame_source;
