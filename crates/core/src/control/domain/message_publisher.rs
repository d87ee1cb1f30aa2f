use thiserror::Error;

#[derive(Error, Debug)]
pub enum BusError {
    #[error("bus is disconnected")]
    Disconnected,
    #[error("failed to publish on {topic}: {reason}")]
    Publish { topic: String, reason: String },
}

/// Domain interface for the publish side of the message bus.
///
/// Publishing is fire-and-forget from the caller's point of view and must
/// not block on a slow subscriber.
pub trait MessagePublisher: Send + Sync {
    fn publish(&self, topic: &str, payload: &str) -> Result<(), BusError>;
}
