use std::io::Write;
use std::sync::Mutex;

use serde_json::json;

use crate::control::domain::message_publisher::{BusError, MessagePublisher};

/// Sender name used for commands typed on the console.
pub const CONSOLE_SENDER: &str = "console";

/// Broker-less bus for running a booth from a terminal.
///
/// Outbound messages are written as `topic<TAB>payload` lines. Inbound lines
/// are translated by [`parse_console_line`].
pub struct ConsoleBus {
    out: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleBus {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }
}

impl MessagePublisher for ConsoleBus {
    fn publish(&self, topic: &str, payload: &str) -> Result<(), BusError> {
        let mut out = self.out.lock().unwrap_or_else(|p| p.into_inner());
        writeln!(out, "{topic}\t{payload}")
            .and_then(|_| out.flush())
            .map_err(|e| BusError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConsoleInput {
    /// Payloads to feed to the coordinator, in order.
    Messages(Vec<String>),
    Quit,
    /// Message addressed to another topic, or a blank line.
    Skip,
}

/// Translates one console line.
///
/// Accepted forms:
/// - a JSON object, delivered as-is on the control topic
/// - `topic<TAB>json`, delivered when `topic` is the control topic
/// - a player count `N`: start game followed by `numPlayers = N`
/// - `reset`, `exit` / `quit`
pub fn parse_console_line(line: &str, control_topic: &str) -> ConsoleInput {
    let line = line.trim();
    if line.is_empty() {
        return ConsoleInput::Skip;
    }
    if let Some((topic, payload)) = line.split_once('\t') {
        if topic.trim() != control_topic {
            return ConsoleInput::Skip;
        }
        return ConsoleInput::Messages(vec![payload.trim().to_string()]);
    }
    if line.starts_with('{') {
        return ConsoleInput::Messages(vec![line.to_string()]);
    }

    match line.to_ascii_lowercase().as_str() {
        "exit" | "quit" => return ConsoleInput::Quit,
        "reset" => {
            return ConsoleInput::Messages(vec![json!({
                "sender": CONSOLE_SENDER,
                "method": "put",
                "outputs": "reset",
            })
            .to_string()])
        }
        _ => {}
    }

    if let Ok(players) = line.parse::<u32>() {
        return ConsoleInput::Messages(vec![
            json!({
                "sender": CONSOLE_SENDER,
                "method": "put",
                "outputs": [{"id": 1, "value": 1}],
            })
            .to_string(),
            json!({
                "sender": CONSOLE_SENDER,
                "method": "put",
                "numPlayers": players,
            })
            .to_string(),
        ]);
    }

    // Unknown words still reach the coordinator, which logs and discards them
    ConsoleInput::Messages(vec![line.to_string()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_publish_writes_tab_separated_line() {
        let buf = SharedBuf::default();
        let bus = ConsoleBus::new(Box::new(buf.clone()));

        bus.publish("alch", "{\"state\":2}").unwrap();

        let written = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
        assert_eq!(written, "alch\t{\"state\":2}\n");
    }

    #[test]
    fn test_player_count_shortcut_starts_game() {
        let ConsoleInput::Messages(msgs) = parse_console_line("2", "alch/faceinator") else {
            panic!("expected messages");
        };
        assert_eq!(msgs.len(), 2);
        assert!(msgs[0].contains("\"outputs\":[{"));
        assert!(msgs[1].contains("\"numPlayers\":2"));
    }

    #[test]
    fn test_topic_prefixed_lines() {
        assert_eq!(
            parse_console_line("alch/faceinator\t{\"x\":1}", "alch/faceinator"),
            ConsoleInput::Messages(vec!["{\"x\":1}".to_string()])
        );
        assert_eq!(
            parse_console_line("alch/game\t{\"x\":1}", "alch/faceinator"),
            ConsoleInput::Skip
        );
    }

    #[test]
    fn test_keywords() {
        assert_eq!(parse_console_line(" EXIT ", "t"), ConsoleInput::Quit);
        assert_eq!(parse_console_line("", "t"), ConsoleInput::Skip);
        let ConsoleInput::Messages(msgs) = parse_console_line("reset", "t") else {
            panic!("expected messages");
        };
        assert!(msgs[0].contains("\"outputs\":\"reset\""));
    }

    #[test]
    fn test_raw_json_passes_through() {
        let line = r#"{"sender":"server","method":"get","info":"system"}"#;
        assert_eq!(
            parse_console_line(line, "t"),
            ConsoleInput::Messages(vec![line.to_string()])
        );
    }
}
