use crate::shared::frame::Frame;

/// Domain interface for a live frame feed (camera, stream or test sequence).
///
/// `next_frame` blocks until a frame is available. An error is terminal for
/// the capture loop; sources are not expected to reconnect.
pub trait FrameSource: Send {
    fn open(&mut self) -> Result<(), Box<dyn std::error::Error>>;
    fn next_frame(&mut self) -> Result<Frame, Box<dyn std::error::Error>>;
    fn close(&mut self);
}
