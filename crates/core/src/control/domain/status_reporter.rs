use std::sync::Arc;

use crate::control::domain::bus_message::{
    disconnect_message, info_message, player_count_query, status_message, InfoTrigger,
    RoundStatus,
};
use crate::control::domain::message_publisher::MessagePublisher;
use crate::shared::config::AppConfig;
use crate::shared::constants::APP_VERSION;

/// Addresses and identity used for outbound messages.
#[derive(Clone, Debug)]
pub struct BusIdentity {
    pub sender: String,
    pub status_topic: String,
    pub game_topic: String,
}

impl BusIdentity {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            sender: config.identity.clone(),
            status_topic: config.status_topic.clone(),
            game_topic: config.game_topic.clone(),
        }
    }
}

/// Fire-and-forget publisher of this node's outbound messages.
///
/// Publish failures are logged and never reach the caller, so the capture
/// loop and the generation worker are never held up by the bus.
#[derive(Clone)]
pub struct StatusReporter {
    publisher: Arc<dyn MessagePublisher>,
    identity: BusIdentity,
}

impl StatusReporter {
    pub fn new(publisher: Arc<dyn MessagePublisher>, identity: BusIdentity) -> Self {
        Self {
            publisher,
            identity,
        }
    }

    pub fn sender(&self) -> &str {
        &self.identity.sender
    }

    pub fn round_status(&self, status: RoundStatus) {
        let payload = status_message(&self.identity.sender, status);
        self.send(&self.identity.status_topic, &payload);
    }

    pub fn info(&self, ip: &str, trigger: InfoTrigger) {
        let payload = info_message(&self.identity.sender, ip, APP_VERSION, trigger);
        self.send(&self.identity.status_topic, &payload);
    }

    pub fn disconnected(&self) {
        let payload = disconnect_message(&self.identity.sender);
        self.send(&self.identity.status_topic, &payload);
    }

    pub fn ask_players(&self) {
        let payload = player_count_query(&self.identity.sender);
        self.send(&self.identity.game_topic, &payload);
    }

    fn send(&self, topic: &str, payload: &str) {
        match self.publisher.publish(topic, payload) {
            Ok(()) => log::debug!("Published on {topic}: {payload}"),
            Err(e) => log::warn!("Dropped message on {topic}: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::domain::message_publisher::BusError;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingPublisher {
        sent: Mutex<Vec<(String, String)>>,
    }

    impl MessagePublisher for RecordingPublisher {
        fn publish(&self, topic: &str, payload: &str) -> Result<(), BusError> {
            self.sent
                .lock()
                .unwrap()
                .push((topic.to_string(), payload.to_string()));
            Ok(())
        }
    }

    struct FailingPublisher;

    impl MessagePublisher for FailingPublisher {
        fn publish(&self, _topic: &str, _payload: &str) -> Result<(), BusError> {
            Err(BusError::Disconnected)
        }
    }

    fn identity() -> BusIdentity {
        BusIdentity::from_config(&AppConfig::default())
    }

    #[test]
    fn test_messages_go_to_their_topics() {
        let publisher = Arc::new(RecordingPublisher::default());
        let reporter = StatusReporter::new(publisher.clone(), identity());

        reporter.round_status(RoundStatus::GameStarted);
        reporter.ask_players();

        let sent = publisher.sent.lock().unwrap();
        assert_eq!(sent[0].0, "alch");
        assert!(sent[0].1.contains("\"state\":1"));
        assert_eq!(sent[1].0, "alch/game");
        assert!(sent[1].1.contains("\"numPlayers\":null"));
    }

    #[test]
    fn test_info_carries_version() {
        let publisher = Arc::new(RecordingPublisher::default());
        let reporter = StatusReporter::new(publisher.clone(), identity());

        reporter.info("192.168.1.20", InfoTrigger::Startup);

        let sent = publisher.sent.lock().unwrap();
        let v: serde_json::Value = serde_json::from_str(&sent[0].1).unwrap();
        assert_eq!(v["version"], APP_VERSION);
        assert_eq!(v["trigger"], "startup");
    }

    #[test]
    fn test_publish_failure_is_swallowed() {
        let reporter = StatusReporter::new(Arc::new(FailingPublisher), identity());
        reporter.round_status(RoundStatus::Idle);
        reporter.disconnected();
    }
}
