//! JSON payloads exchanged over the bus.
//!
//! Inbound payloads are classified into [`InboundCommand`]s; outbound ones are
//! built by the `*_message` functions below.

use serde_json::{json, Value};
use thiserror::Error;

/// Generic signal id used for every round status.
pub const ROUND_SIGNAL_ID: u32 = 1;

/// Values of the round status signal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoundStatus {
    Idle = 0,
    GameStarted = 1,
    Generating = 2,
}

#[derive(Error, Debug)]
pub enum MessageError {
    #[error("empty payload")]
    Empty,
    #[error("payload is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("payload is not a JSON object")]
    NotAnObject,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InboundCommand {
    StartGame,
    PlayerCount(u32),
    /// `numPlayers` present but not a non-negative integer (including `null`).
    InvalidPlayerCount(String),
    SystemInfoRequest,
    Reset,
    /// Sent under our own identity.
    FromSelf,
    Unrecognized,
}

/// Classifies an inbound payload. The first matching rule wins:
/// start game, player count, system info request, reset.
pub fn classify(payload: &[u8], own_identity: &str) -> Result<InboundCommand, MessageError> {
    if payload.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(MessageError::Empty);
    }
    let value: Value = serde_json::from_slice(payload)?;
    let obj = value.as_object().ok_or(MessageError::NotAnObject)?;

    if obj.get("sender").and_then(Value::as_str) == Some(own_identity) {
        return Ok(InboundCommand::FromSelf);
    }

    if let Some(Value::Array(outputs)) = obj.get("outputs") {
        if outputs.iter().any(is_start_signal) {
            return Ok(InboundCommand::StartGame);
        }
    }

    if let Some(raw) = obj.get("numPlayers") {
        return Ok(match parse_player_count(raw) {
            Some(n) => InboundCommand::PlayerCount(n),
            None => InboundCommand::InvalidPlayerCount(raw.to_string()),
        });
    }

    let method = obj.get("method").and_then(Value::as_str);
    if method == Some("get") && obj.get("info").and_then(Value::as_str) == Some("system") {
        return Ok(InboundCommand::SystemInfoRequest);
    }
    if method == Some("put") && obj.get("outputs").and_then(Value::as_str) == Some("reset") {
        return Ok(InboundCommand::Reset);
    }

    Ok(InboundCommand::Unrecognized)
}

fn is_start_signal(output: &Value) -> bool {
    let field = |name: &str| output.get(name).and_then(Value::as_f64);
    field("id") == Some(ROUND_SIGNAL_ID as f64) && field("value") == Some(1.0)
}

/// Accepts a JSON integer or a numeric string.
fn parse_player_count(raw: &Value) -> Option<u32> {
    match raw {
        Value::Number(n) => {
            if let Some(v) = n.as_u64() {
                return u32::try_from(v).ok();
            }
            let f = n.as_f64()?;
            (f >= 0.0 && f.fract() == 0.0 && f <= u32::MAX as f64).then_some(f as u32)
        }
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Round status: `{sender, method: "info", id, state}`.
pub fn status_message(sender: &str, status: RoundStatus) -> String {
    json!({
        "sender": sender,
        "method": "info",
        "id": ROUND_SIGNAL_ID,
        "state": status as u32,
    })
    .to_string()
}

/// Why connectivity info is being sent.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InfoTrigger {
    Startup,
    Request,
}

impl InfoTrigger {
    fn as_str(self) -> &'static str {
        match self {
            InfoTrigger::Startup => "startup",
            InfoTrigger::Request => "request",
        }
    }
}

pub fn info_message(sender: &str, ip: &str, version: &str, trigger: InfoTrigger) -> String {
    json!({
        "sender": sender,
        "connected": true,
        "ip": ip,
        "version": version,
        "method": "info",
        "trigger": trigger.as_str(),
    })
    .to_string()
}

pub fn disconnect_message(sender: &str) -> String {
    json!({
        "sender": sender,
        "connected": false,
        "method": "info",
    })
    .to_string()
}

/// Asks the game node how many players take part.
pub fn player_count_query(sender: &str) -> String {
    json!({
        "sender": sender,
        "numPlayers": null,
        "method": "get",
    })
    .to_string()
}
