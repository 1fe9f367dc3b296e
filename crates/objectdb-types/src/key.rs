//! Object identity.
//!
//! An object is identified by the pair `(object_type, object_id)`. Both
//! halves are opaque strings as far as the store is concerned; the rules
//! only ever write the object types enumerated in [`ObjectType`].

use serde::{Deserialize, Serialize};

/// Identity of one versioned object: `(object_type, object_id)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectKey {
    /// Object type name (e.g. `user`, `counter`).
    pub object_type: String,
    /// Object identifier, unique within its type.
    pub object_id: String,
}

impl ObjectKey {
    /// Build a key from any type name and identifier.
    pub fn new(object_type: impl Into<String>, object_id: impl Into<String>) -> Self {
        Self {
            object_type: object_type.into(),
            object_id: object_id.into(),
        }
    }
}

impl core::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}/{}", self.object_type, self.object_id)
    }
}

/// The object types written by the rule set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectType {
    /// A registered user profile.
    User,
    /// Username reservation, pointing at the owning user.
    Username,
    /// Email reservation, pointing at the owning user.
    Email,
    /// Stored credentials of a user.
    Credentials,
    /// Singly linked list of all users, headed by the `root` node.
    UsersLl,
    /// A named counter.
    Counter,
    /// A board owned by a user.
    Board,
    /// The ordered list of boards owned by one user.
    UserBoards,
}

impl ObjectType {
    /// The type name as persisted in `object_rev.object_type`.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Username => "username",
            Self::Email => "email",
            Self::Credentials => "credentials",
            Self::UsersLl => "users_ll",
            Self::Counter => "counter",
            Self::Board => "board",
            Self::UserBoards => "user_boards",
        }
    }

    /// Build the [`ObjectKey`] of the object of this type with the given id.
    pub fn key(self, object_id: impl Into<String>) -> ObjectKey {
        ObjectKey::new(self.as_str(), object_id)
    }
}

impl core::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn key_display_joins_type_and_id() {
        let key = ObjectType::UsersLl.key("root");
        assert_eq!(key.to_string(), "users_ll/root");
    }

    #[test]
    fn object_type_names_match_serde() {
        let json = serde_json::to_value(ObjectType::UserBoards).unwrap();
        assert_eq!(json, serde_json::json!(ObjectType::UserBoards.as_str()));
    }
}
