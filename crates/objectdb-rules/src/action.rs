//! Declarative action trees.
//!
//! Rule handlers never touch the store. They return an [`Action`] that
//! describes the reads and writes they want; the interpreter evaluates it
//! against a transaction later. Because the tree is plain data plus pure
//! continuations, the same tree can be replayed against any transaction.

use objectdb_types::ObjectKey;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Continuation run with the value of a fetched object.
pub type OnFound = Box<dyn FnOnce(Value) -> Action + Send>;

/// Continuation run when a fetched object is missing.
pub type OnMissing = Box<dyn FnOnce() -> Action + Send>;

/// Reason used when a required object is absent.
pub const NOT_FOUND: &str = "not found";

/// A read of one object followed by a choice of continuation.
pub struct Fetch {
    /// The object to read.
    pub key: ObjectKey,
    /// Continuation when the object exists.
    pub on_found: OnFound,
    /// Continuation when the object is missing.
    pub on_missing: OnMissing,
}

impl core::fmt::Debug for Fetch {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Fetch").field("key", &self.key).finish_non_exhaustive()
    }
}

/// One node of an action tree.
#[derive(Debug)]
pub enum Action {
    /// Read an object, then continue with one of two subtrees.
    Fetch(Fetch),
    /// Write an object; `None` deletes it.
    Change {
        /// The object to write.
        key: ObjectKey,
        /// The new value, `None` for a deletion.
        value: Option<Value>,
    },
    /// Independent subtrees, each fully interpreted.
    Sequence(Vec<Action>),
    /// The event cannot legally be applied.
    Failed(String),
}

impl Action {
    /// Read `key` and continue with `on_found(value)` or `on_missing()`.
    pub fn fetch(
        key: ObjectKey,
        on_found: impl FnOnce(Value) -> Self + Send + 'static,
        on_missing: impl FnOnce() -> Self + Send + 'static,
    ) -> Self {
        Self::Fetch(Fetch {
            key,
            on_found: Box::new(on_found),
            on_missing: Box::new(on_missing),
        })
    }

    /// Read `key`, failing with [`NOT_FOUND`] when it is missing.
    pub fn fetch_existing(
        key: ObjectKey,
        on_found: impl FnOnce(Value) -> Self + Send + 'static,
    ) -> Self {
        Self::fetch(key, on_found, || Self::fail(NOT_FOUND))
    }

    /// Read `key` decoded as `T`.
    ///
    /// A stored value that does not decode as `T` fails the event instead of
    /// reaching `on_found`.
    pub fn fetch_as<T>(
        key: ObjectKey,
        on_found: impl FnOnce(T) -> Self + Send + 'static,
        on_missing: impl FnOnce() -> Self + Send + 'static,
    ) -> Self
    where
        T: DeserializeOwned + 'static,
    {
        let label = key.to_string();
        Self::fetch(
            key,
            move |value| match serde_json::from_value::<T>(value) {
                Ok(decoded) => on_found(decoded),
                Err(e) => Self::fail(format!("malformed {label} object: {e}")),
            },
            on_missing,
        )
    }

    /// Write `value` as a new object.
    pub fn create<T: Serialize>(key: ObjectKey, value: &T) -> Self {
        match serde_json::to_value(value) {
            Ok(json) => Self::Change {
                key,
                value: Some(json),
            },
            Err(e) => Self::fail(format!("cannot encode {key}: {e}")),
        }
    }

    /// Overwrite an existing object with `value`.
    pub fn update<T: Serialize>(key: ObjectKey, value: &T) -> Self {
        Self::create(key, value)
    }

    /// Delete an object.
    pub const fn delete(key: ObjectKey) -> Self {
        Self::Change { key, value: None }
    }

    /// Group independent subtrees.
    pub const fn seq(actions: Vec<Self>) -> Self {
        Self::Sequence(actions)
    }

    /// Refuse the event with a human-readable reason.
    pub fn fail(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }
}
