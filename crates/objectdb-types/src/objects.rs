//! Typed object payloads.
//!
//! These are the shapes the rule set reads and writes. On disk every payload
//! is plain JSON in `object_rev.payload`; a `NULL` payload is a deletion and
//! never reaches these types.

use serde::{Deserialize, Serialize};

/// `user/<user_id>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserObject {
    /// Email address.
    pub email: String,
    /// Username.
    pub username: String,
    /// Display name.
    pub realname: String,
}

/// `username/<username>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsernameObject {
    /// The user holding this username.
    pub user_id: String,
}

/// `email/<email>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailObject {
    /// The user holding this email address.
    pub user_id: String,
}

/// `credentials/<user_id>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialsObject {
    /// Credential material.
    pub password: String,
}

/// `users_ll/<user_id>` and the list head `users_ll/root`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserLinkObject {
    /// The next user in the list, `None` at the tail.
    pub next: Option<String>,
}

/// `counter/<name>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterObject {
    /// Current count.
    pub count: u64,
}

/// `board/<board_id>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardObject {
    /// Board name.
    pub name: String,
    /// Owning user.
    pub user_id: String,
}

/// `user_boards/<user_id>`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserBoardsObject {
    /// Board ids in creation order.
    pub list: Vec<String>,
}
