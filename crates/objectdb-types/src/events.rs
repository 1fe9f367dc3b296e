//! Upstream events.
//!
//! The upstream authority delivers each tick as an ordered array of
//! [`EventEnvelope`] values (`{"type": ..., "data": ...}`). The envelope is
//! what gets persisted in the `event` table verbatim; [`DomainEvent`] is the
//! typed view the rule set dispatches on.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One raw event as delivered by the upstream authority.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Event type discriminator (e.g. `user_registered`).
    #[serde(rename = "type")]
    pub event_type: String,
    /// Type-specific payload. Accepts `payload` as an alias.
    #[serde(default, alias = "payload")]
    pub data: Value,
}

impl EventEnvelope {
    /// Build an envelope from a type name and payload.
    pub fn new(event_type: impl Into<String>, data: Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
        }
    }
}

/// An envelope whose type is not declared or whose payload does not fit
/// the declared shape.
#[derive(Debug, thiserror::Error)]
#[error("unrecognised event {event_type:?}: {source}")]
pub struct EventParseError {
    /// The type name carried by the offending envelope.
    pub event_type: String,
    /// The underlying decode error.
    pub source: serde_json::Error,
}

/// Every event type the system declares.
///
/// Adding a variant forces a matching arm in the rule set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum DomainEvent {
    /// A new user signed up.
    UserRegistered(UserRegistered),
    /// A user changed their display name.
    UserRealnameChanged(UserRealnameChanged),
    /// A user changed their username.
    UserUsernameChanged(UserUsernameChanged),
    /// A user changed their email address.
    UserEmailChanged(UserEmailChanged),
    /// Liveness ping; bumps the `ping` counter.
    Ping(Ping),
    /// A user created a board.
    BoardCreated(BoardCreated),
    /// A board was renamed.
    BoardRenamed(BoardRenamed),
}

impl DomainEvent {
    /// Type names of all declared events, in declaration order.
    pub const DECLARED_TYPES: [&'static str; 7] = [
        "user_registered",
        "user_realname_changed",
        "user_username_changed",
        "user_email_changed",
        "ping",
        "board_created",
        "board_renamed",
    ];

    /// Decode the typed event from a raw envelope.
    ///
    /// A missing or `null` payload is read as the empty object so that
    /// payload-less events such as `ping` decode.
    ///
    /// # Errors
    ///
    /// Returns [`EventParseError`] if the type is undeclared or the payload
    /// does not match the declared shape.
    pub fn parse(envelope: &EventEnvelope) -> Result<Self, EventParseError> {
        let data = if envelope.data.is_null() {
            Value::Object(Map::new())
        } else {
            envelope.data.clone()
        };
        let mut tagged = Map::with_capacity(2);
        tagged.insert("type".to_owned(), Value::String(envelope.event_type.clone()));
        tagged.insert("data".to_owned(), data);

        serde_json::from_value(Value::Object(tagged)).map_err(|source| EventParseError {
            event_type: envelope.event_type.clone(),
            source,
        })
    }

    /// The snake-case type name of this event.
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::UserRegistered(_) => "user_registered",
            Self::UserRealnameChanged(_) => "user_realname_changed",
            Self::UserUsernameChanged(_) => "user_username_changed",
            Self::UserEmailChanged(_) => "user_email_changed",
            Self::Ping(_) => "ping",
            Self::BoardCreated(_) => "board_created",
            Self::BoardRenamed(_) => "board_renamed",
        }
    }
}

/// Payload of `user_registered`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRegistered {
    /// Identifier of the new user.
    pub user_id: String,
    /// Requested unique username.
    pub username: String,
    /// Display name.
    pub realname: String,
    /// Requested unique email address.
    pub email: String,
    /// Credential material, stored as given.
    pub password: String,
}

/// Payload of `user_realname_changed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRealnameChanged {
    /// The user being changed.
    pub user_id: String,
    /// New display name.
    pub realname: String,
}

/// Payload of `user_username_changed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserUsernameChanged {
    /// The user being changed.
    pub user_id: String,
    /// New username.
    pub username: String,
}

/// Payload of `user_email_changed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEmailChanged {
    /// The user being changed.
    pub user_id: String,
    /// New email address.
    pub email: String,
}

/// Payload of `ping` (empty).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ping {}

/// Payload of `board_created`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardCreated {
    /// Owner of the board.
    pub user_id: String,
    /// Identifier of the new board.
    pub board_id: String,
    /// Initial board name.
    pub board_name: String,
}

/// Payload of `board_renamed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardRenamed {
    /// The board being renamed.
    pub board_id: String,
    /// New board name.
    pub board_name: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn envelope_accepts_payload_alias() {
        let envelope: EventEnvelope =
            serde_json::from_value(json!({"type": "ping", "payload": {}})).unwrap();
        assert_eq!(envelope.event_type, "ping");
        assert_eq!(envelope.data, json!({}));
    }

    #[test]
    fn ping_without_data_parses() {
        let envelope: EventEnvelope = serde_json::from_value(json!({"type": "ping"})).unwrap();
        assert!(envelope.data.is_null());
        let event = DomainEvent::parse(&envelope).unwrap();
        assert_eq!(event, DomainEvent::Ping(Ping {}));
    }

    #[test]
    fn board_renamed_parses_typed_payload() {
        let envelope = EventEnvelope::new(
            "board_renamed",
            json!({"board_id": "b1", "board_name": "Roadmap"}),
        );
        let event = DomainEvent::parse(&envelope).unwrap();
        assert_eq!(event.kind(), "board_renamed");
        assert_eq!(
            event,
            DomainEvent::BoardRenamed(BoardRenamed {
                board_id: "b1".to_owned(),
                board_name: "Roadmap".to_owned(),
            })
        );
    }

    #[test]
    fn undeclared_type_is_rejected() {
        let envelope = EventEnvelope::new("user_deleted", json!({"user_id": "u1"}));
        let err = DomainEvent::parse(&envelope).unwrap_err();
        assert_eq!(err.event_type, "user_deleted");
        assert!(err.to_string().contains("user_deleted"));
    }

    #[test]
    fn missing_field_is_rejected() {
        let envelope = EventEnvelope::new("board_created", json!({"board_id": "b1"}));
        assert!(DomainEvent::parse(&envelope).is_err());
    }

    #[test]
    fn declared_types_cover_every_variant_name() {
        let samples = [
            DomainEvent::UserRegistered(UserRegistered {
                user_id: String::new(),
                username: String::new(),
                realname: String::new(),
                email: String::new(),
                password: String::new(),
            }),
            DomainEvent::UserRealnameChanged(UserRealnameChanged {
                user_id: String::new(),
                realname: String::new(),
            }),
            DomainEvent::UserUsernameChanged(UserUsernameChanged {
                user_id: String::new(),
                username: String::new(),
            }),
            DomainEvent::UserEmailChanged(UserEmailChanged {
                user_id: String::new(),
                email: String::new(),
            }),
            DomainEvent::Ping(Ping {}),
            DomainEvent::BoardCreated(BoardCreated {
                user_id: String::new(),
                board_id: String::new(),
                board_name: String::new(),
            }),
            DomainEvent::BoardRenamed(BoardRenamed {
                board_id: String::new(),
                board_name: String::new(),
            }),
        ];
        let kinds: Vec<&str> = samples.iter().map(DomainEvent::kind).collect();
        assert_eq!(kinds, DomainEvent::DECLARED_TYPES);
    }
}
