use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::envelope::{DecodeError, Envelope, now_millis};
use crate::{channels, kinds};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Info,
    Success,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// Payload of a `notification` envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub id: String,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub severity: Severity,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl NotificationPayload {
    pub fn new(title: impl Into<String>, message: impl Into<String>, severity: Severity) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            message: message.into(),
            severity,
            timestamp: now_millis(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectedInfo {
    pub connection_id: String,
    pub identity: String,
}

/// Messages the server sends. Change pushes carry the identity the mutation
/// originated from.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Connected(ConnectedInfo),
    Subscribed { channel: String },
    Unsubscribed { channel: String },
    Pong,
    DashboardUpdate { data: Value, identity: Option<String> },
    CallUpdate { data: Value, identity: Option<String> },
    AgentUpdate { data: Value, identity: Option<String> },
    Notification(NotificationPayload),
    Error { message: String },
    Unknown { kind: String },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            Self::Connected(_) => kinds::CONNECTED,
            Self::Subscribed { .. } => kinds::SUBSCRIBED,
            Self::Unsubscribed { .. } => kinds::UNSUBSCRIBED,
            Self::Pong => kinds::PONG,
            Self::DashboardUpdate { .. } => kinds::DASHBOARD_UPDATE,
            Self::CallUpdate { .. } => kinds::CALL_UPDATE,
            Self::AgentUpdate { .. } => kinds::AGENT_UPDATE,
            Self::Notification(_) => kinds::NOTIFICATION,
            Self::Error { .. } => kinds::ERROR,
            Self::Unknown { kind } => kind,
        }
    }

    /// Channel a push belongs to; `None` for control replies.
    pub fn push_channel(&self) -> Option<&'static str> {
        match self {
            Self::DashboardUpdate { .. } => Some(channels::DASHBOARD),
            Self::CallUpdate { .. } => Some(channels::CALLS),
            Self::AgentUpdate { .. } => Some(channels::AGENTS),
            Self::Notification(_) => Some(channels::NOTIFICATIONS),
            _ => None,
        }
    }

    pub fn into_envelope(self) -> Envelope {
        let envelope = Envelope::new(self.kind().to_owned());
        let channel = self.push_channel();
        let envelope = match self {
            Self::Connected(info) => envelope.with_data(json!(info)),
            Self::Subscribed { channel } | Self::Unsubscribed { channel } => {
                envelope.with_channel(channel)
            }
            Self::Pong | Self::Unknown { .. } => envelope,
            Self::DashboardUpdate { data, identity }
            | Self::CallUpdate { data, identity }
            | Self::AgentUpdate { data, identity } => {
                let envelope = envelope.with_data(data);
                match identity {
                    Some(identity) => envelope.with_identity(identity),
                    None => envelope,
                }
            }
            Self::Notification(payload) => envelope.with_data(json!(payload)),
            Self::Error { message } => envelope.with_data(json!({ "message": message })),
        };
        let envelope = match channel {
            Some(channel) => envelope.with_channel(channel),
            None => envelope,
        };
        envelope.stamped()
    }

    pub fn from_envelope(envelope: Envelope) -> Result<Self, DecodeError> {
        let message = match envelope.kind.as_str() {
            kinds::CONNECTED => Self::Connected(payload(&envelope)?),
            kinds::SUBSCRIBED => Self::Subscribed {
                channel: channel_of(&envelope)?,
            },
            kinds::UNSUBSCRIBED => Self::Unsubscribed {
                channel: channel_of(&envelope)?,
            },
            kinds::PONG => Self::Pong,
            kinds::DASHBOARD_UPDATE => Self::DashboardUpdate {
                data: envelope.data.unwrap_or(Value::Null),
                identity: envelope.identity,
            },
            kinds::CALL_UPDATE => Self::CallUpdate {
                data: envelope.data.unwrap_or(Value::Null),
                identity: envelope.identity,
            },
            kinds::AGENT_UPDATE => Self::AgentUpdate {
                data: envelope.data.unwrap_or(Value::Null),
                identity: envelope.identity,
            },
            kinds::NOTIFICATION => Self::Notification(payload(&envelope)?),
            kinds::ERROR => Self::Error {
                message: error_message(envelope.data.as_ref()),
            },
            _ => Self::Unknown {
                kind: envelope.kind,
            },
        };
        Ok(message)
    }

    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        Self::from_envelope(Envelope::decode(text)?)
    }

    pub fn encode(self) -> Result<String, serde_json::Error> {
        self.into_envelope().encode()
    }
}

/// Messages a client sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMessage {
    Ping,
    Subscribe { channel: String },
    Unsubscribe { channel: String },
    Unknown { kind: String },
}

impl ClientMessage {
    pub fn subscribe(channel: impl Into<String>) -> Self {
        Self::Subscribe {
            channel: channel.into(),
        }
    }

    pub fn unsubscribe(channel: impl Into<String>) -> Self {
        Self::Unsubscribe {
            channel: channel.into(),
        }
    }

    pub fn kind(&self) -> &str {
        match self {
            Self::Ping => kinds::PING,
            Self::Subscribe { .. } => kinds::SUBSCRIBE,
            Self::Unsubscribe { .. } => kinds::UNSUBSCRIBE,
            Self::Unknown { kind } => kind,
        }
    }

    pub fn into_envelope(self) -> Envelope {
        let envelope = Envelope::new(self.kind().to_owned());
        match self {
            Self::Subscribe { channel } | Self::Unsubscribe { channel } => {
                envelope.with_channel(channel)
            }
            Self::Ping | Self::Unknown { .. } => envelope,
        }
    }

    pub fn from_envelope(envelope: Envelope) -> Result<Self, DecodeError> {
        let message = match envelope.kind.as_str() {
            kinds::PING => Self::Ping,
            kinds::SUBSCRIBE => Self::Subscribe {
                channel: channel_of(&envelope)?,
            },
            kinds::UNSUBSCRIBE => Self::Unsubscribe {
                channel: channel_of(&envelope)?,
            },
            _ => Self::Unknown {
                kind: envelope.kind,
            },
        };
        Ok(message)
    }

    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        Self::from_envelope(Envelope::decode(text)?)
    }

    pub fn encode(self) -> Result<String, serde_json::Error> {
        self.into_envelope().encode()
    }
}

fn payload<T: serde::de::DeserializeOwned>(envelope: &Envelope) -> Result<T, DecodeError> {
    let data = envelope.data.clone().unwrap_or(Value::Null);
    serde_json::from_value(data).map_err(|source| DecodeError::Payload {
        kind: envelope.kind.clone(),
        source,
    })
}

/// Channel from the top-level field, falling back to `data.channel`.
fn channel_of(envelope: &Envelope) -> Result<String, DecodeError> {
    envelope.require_channel().or_else(|err| {
        envelope
            .data
            .as_ref()
            .and_then(|data| data.get("channel"))
            .and_then(Value::as_str)
            .filter(|channel| !channel.is_empty())
            .map(str::to_owned)
            .ok_or(err)
    })
}

fn error_message(data: Option<&Value>) -> String {
    match data {
        Some(Value::String(message)) => message.clone(),
        Some(value) => value
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .unwrap_or_else(|| value.to_string()),
        None => "unspecified error".to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_puts_channel_at_top_level() {
        let encoded = ClientMessage::subscribe("calls").encode().expect("encode");
        assert_eq!(encoded, r#"{"type":"subscribe","channel":"calls"}"#);
    }

    #[test]
    fn subscribe_without_channel_is_rejected() {
        let err = ClientMessage::decode(r#"{"type":"subscribe"}"#).expect_err("no channel");
        assert!(matches!(err, DecodeError::MissingChannel { .. }));
    }

    #[test]
    fn subscribe_channel_may_ride_in_data() {
        let message =
            ClientMessage::decode(r#"{"type":"subscribe","data":{"channel":"agents"}}"#)
                .expect("decode");
        assert_eq!(message, ClientMessage::subscribe("agents"));
    }

    #[test]
    fn unknown_client_type_is_preserved() {
        let message = ClientMessage::decode(r#"{"type":"hello"}"#).expect("decode");
        assert_eq!(
            message,
            ClientMessage::Unknown {
                kind: "hello".into()
            }
        );
    }

    #[test]
    fn updates_are_tagged_with_their_channel() {
        let envelope = ServerMessage::CallUpdate {
            data: json!({"id": "c1"}),
            identity: Some("user-1".into()),
        }
        .into_envelope();
        assert_eq!(envelope.kind, kinds::CALL_UPDATE);
        assert_eq!(envelope.channel.as_deref(), Some(channels::CALLS));
        assert_eq!(envelope.identity.as_deref(), Some("user-1"));
        assert!(envelope.timestamp.is_some());
    }

    #[test]
    fn notification_decodes_with_default_severity() {
        let text = r#"{"type":"notification","data":{"id":"n1","title":"t","message":"m","timestamp":5}}"#;
        let message = ServerMessage::decode(text).expect("decode");
        let ServerMessage::Notification(payload) = message else {
            panic!("expected notification, got {message:?}");
        };
        assert_eq!(payload.id, "n1");
        assert_eq!(payload.severity, Severity::Info);
    }

    #[test]
    fn notification_with_bad_payload_is_a_payload_error() {
        let err = ServerMessage::decode(r#"{"type":"notification","data":{"id":1}}"#)
            .expect_err("bad payload");
        assert!(matches!(err, DecodeError::Payload { .. }));
    }

    #[test]
    fn error_message_survives_the_wire() {
        let text = ServerMessage::error("unknown channel").encode().expect("encode");
        let decoded = ServerMessage::decode(&text).expect("decode");
        assert_eq!(decoded, ServerMessage::error("unknown channel"));
    }

    #[test]
    fn unknown_server_type_is_not_an_error() {
        let decoded = ServerMessage::decode(r#"{"type":"presence","data":{}}"#).expect("decode");
        assert_eq!(decoded.kind(), "presence");
    }
}
