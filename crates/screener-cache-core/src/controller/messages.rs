//! Messages pages send to the controller, and the replies they get.

use super::metrics::MetricsSnapshot;
use super::state::ControllerState;
use crate::cache::CacheStats;
use crate::config::{CacheNames, ControllerConfig};
use serde::{Deserialize, Serialize};

/// A command posted by a page.
///
/// Wire form: `{"type": "SKIP_WAITING"}`, `{"type": "CLEAR_CACHE"}`,
/// `{"type": "GET_STATUS"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControllerMessage {
    /// Activate an installed version now. No reply.
    SkipWaiting,
    /// Delete every namespace, then acknowledge.
    ClearCache,
    /// Report version, state and cache statistics.
    GetStatus,
}

impl ControllerMessage {
    /// Whether the sender should wait for a reply.
    pub fn expects_reply(&self) -> bool {
        !matches!(self, ControllerMessage::SkipWaiting)
    }
}

/// Reply sent back on the message's reply channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageReply {
    /// `{"status": "..."}`
    Ack { status: String },
    Status(Box<ControllerStatus>),
}

impl MessageReply {
    pub fn cache_cleared() -> Self {
        MessageReply::Ack {
            status: ControllerConfig::CLEAR_CACHE_REPLY.to_string(),
        }
    }
}

/// Snapshot of one controller version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerStatus {
    pub version: String,
    pub state: ControllerState,
    pub names: CacheNames,
    pub metrics: MetricsSnapshot,
    pub cache: CacheStats,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_wire_format() {
        let skip: ControllerMessage = serde_json::from_value(json!({"type": "SKIP_WAITING"})).unwrap();
        let clear: ControllerMessage = serde_json::from_value(json!({"type": "CLEAR_CACHE"})).unwrap();
        assert_eq!(skip, ControllerMessage::SkipWaiting);
        assert_eq!(clear, ControllerMessage::ClearCache);
        assert!(!skip.expects_reply());
        assert!(clear.expects_reply());
    }

    #[test]
    fn test_unknown_message_rejected() {
        let parsed = serde_json::from_value::<ControllerMessage>(json!({"type": "RELOAD"}));
        assert!(parsed.is_err());
    }

    #[test]
    fn test_clear_reply_wire_format() {
        let reply = serde_json::to_value(MessageReply::cache_cleared()).unwrap();
        assert_eq!(reply, json!({"status": "Cache cleared"}));
    }
}
