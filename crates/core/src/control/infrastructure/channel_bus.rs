use std::sync::Mutex;

use crossbeam_channel::{unbounded, Receiver, Sender};

use crate::control::domain::message_publisher::{BusError, MessagePublisher};

/// Subscribes to every topic.
pub const ALL_TOPICS: &str = "#";

/// One published message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BusEnvelope {
    pub topic: String,
    pub payload: String,
}

/// In-process topic fan-out over unbounded crossbeam channels.
///
/// Publishing never blocks. Subscribers whose receiver was dropped are
/// pruned on the next publish.
#[derive(Default)]
pub struct ChannelBus {
    subscribers: Mutex<Vec<(String, Sender<BusEnvelope>)>>,
}

impl ChannelBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receives messages published on `topic`, or on any topic for [`ALL_TOPICS`].
    pub fn subscribe(&self, topic: &str) -> Receiver<BusEnvelope> {
        let (tx, rx) = unbounded();
        self.subscribers
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push((topic.to_string(), tx));
        rx
    }
}

impl MessagePublisher for ChannelBus {
    fn publish(&self, topic: &str, payload: &str) -> Result<(), BusError> {
        let envelope = BusEnvelope {
            topic: topic.to_string(),
            payload: payload.to_string(),
        };
        let mut subscribers = self.subscribers.lock().unwrap_or_else(|p| p.into_inner());
        subscribers.retain(|(filter, tx)| {
            if filter != ALL_TOPICS && filter != topic {
                return true;
            }
            tx.send(envelope.clone()).is_ok()
        });
        Ok(())
    }
}
