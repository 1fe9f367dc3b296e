//! Evaluation of action trees against an [`ObjectStore`].

use objectdb_db::{DbError, ObjectStore};
use objectdb_types::EventEnvelope;
use tracing::debug;

use crate::action::{Action, Fetch};
use crate::rules;

/// Why an action tree could not be applied.
#[derive(Debug, thiserror::Error)]
pub enum InterpretError {
    /// A branch of the tree reached [`Action::Failed`].
    #[error("event {event_type} rejected: {reason}")]
    Rejected {
        /// Type of the rejected event.
        event_type: String,
        /// Reason carried by the failing node.
        reason: String,
    },

    /// The store refused a read or write.
    #[error(transparent)]
    Store(#[from] DbError),
}

impl InterpretError {
    /// The rejection reason, if the event itself was refused.
    pub fn rejection(&self) -> Option<&str> {
        match self {
            Self::Rejected { reason, .. } => Some(reason),
            Self::Store(_) => None,
        }
    }
}

/// Interpret `action` against `store`.
///
/// Fetches read through the store and continue with the matching branch.
/// Sequence children are interpreted one after another in list order. The
/// walk keeps its own stack, so deep trees do not grow the call stack.
///
/// # Errors
///
/// Returns [`InterpretError::Rejected`] as soon as a [`Action::Failed`] node
/// is reached, or [`InterpretError::Store`] if the store fails. Writes made
/// before the failure remain in `store`; the caller must discard the
/// transaction.
pub async fn finalize<S: ObjectStore>(
    action: Action,
    event_type: &str,
    store: &mut S,
) -> Result<(), InterpretError> {
    let mut pending = vec![action];
    while let Some(next) = pending.pop() {
        match next {
            Action::Fetch(Fetch {
                key,
                on_found,
                on_missing,
            }) => {
                let continuation = match store.fetch(&key).await? {
                    Some(value) => on_found(value),
                    None => on_missing(),
                };
                pending.push(continuation);
            }
            Action::Change { key, value } => store.change(key, value).await?,
            Action::Sequence(children) => pending.extend(children.into_iter().rev()),
            Action::Failed(reason) => {
                debug!(event_type, reason = %reason, "action tree failed");
                return Err(InterpretError::Rejected {
                    event_type: event_type.to_owned(),
                    reason,
                });
            }
        }
    }
    Ok(())
}

/// Plan and apply one event against `store`.
///
/// The caller records the raw event row first, so every change made here
/// lands at that event's slot.
///
/// # Errors
///
/// See [`finalize`].
pub async fn process_event<S: ObjectStore>(
    envelope: &EventEnvelope,
    store: &mut S,
) -> Result<(), InterpretError> {
    let action = rules::plan(envelope);
    finalize(action, &envelope.event_type, store).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use objectdb_db::{MemoryStore, TickStore};
    use objectdb_types::{ObjectKey, ObjectType};
    use serde_json::{Value, json};

    use super::*;

    async fn apply_tick(store: &MemoryStore, tick: u64, events: &[EventEnvelope]) -> Result<(), InterpretError> {
        let mut trx = store.begin().await.unwrap();
        trx.set_tick(tick).await?;
        for (slot, event) in (0_u32..).zip(events) {
            trx.record_event(slot, event).await?;
            if let Err(e) = process_event(event, &mut trx).await {
                trx.rollback().await?;
                return Err(e);
            }
        }
        trx.commit().await?;
        Ok(())
    }

    fn ping() -> EventEnvelope {
        EventEnvelope::new("ping", Value::Null)
    }

    fn register(user_id: &str, username: &str) -> EventEnvelope {
        EventEnvelope::new(
            "user_registered",
            json!({
                "user_id": user_id,
                "username": username,
                "realname": format!("{username} real"),
                "email": format!("{username}@example.com"),
                "password": "secret"
            }),
        )
    }

    fn latest(store: &MemoryStore, key: &ObjectKey) -> Option<Value> {
        store.latest_value(key).unwrap()
    }

    #[tokio::test]
    async fn ping_counts_up() {
        let store = MemoryStore::new();
        apply_tick(&store, 1, &[ping()]).await.unwrap();
        let counter = ObjectType::Counter.key("ping");
        assert_eq!(latest(&store, &counter), Some(json!({"count": 1})));

        apply_tick(&store, 2, &[ping()]).await.unwrap();
        assert_eq!(latest(&store, &counter), Some(json!({"count": 2})));
    }

    #[tokio::test]
    async fn two_pings_in_one_tick_use_two_slots() {
        let store = MemoryStore::new();
        apply_tick(&store, 1, &[ping(), ping()]).await.unwrap();

        let revisions = store.revisions_at(1).unwrap();
        let slots: Vec<i32> = revisions.iter().map(|r| r.slot).collect();
        assert_eq!(slots, vec![0, 1]);
        assert_eq!(
            latest(&store, &ObjectType::Counter.key("ping")),
            Some(json!({"count": 2}))
        );
    }

    #[tokio::test]
    async fn registration_creates_user_objects() {
        let store = MemoryStore::new();
        apply_tick(&store, 1, &[register("u1", "alice")]).await.unwrap();

        assert_eq!(
            latest(&store, &ObjectType::User.key("u1")),
            Some(json!({"email": "alice@example.com", "username": "alice", "realname": "alice real"}))
        );
        assert_eq!(
            latest(&store, &ObjectType::Username.key("alice")),
            Some(json!({"user_id": "u1"}))
        );
        assert_eq!(
            latest(&store, &ObjectType::Email.key("alice@example.com")),
            Some(json!({"user_id": "u1"}))
        );
        assert_eq!(
            latest(&store, &ObjectType::Credentials.key("u1")),
            Some(json!({"password": "secret"}))
        );
        assert_eq!(
            latest(&store, &ObjectType::UsersLl.key("root")),
            Some(json!({"next": "u1"}))
        );
        assert_eq!(
            latest(&store, &ObjectType::UsersLl.key("u1")),
            Some(json!({"next": null}))
        );
    }

    #[tokio::test]
    async fn users_are_linked_newest_first() {
        let store = MemoryStore::new();
        apply_tick(&store, 1, &[register("u1", "alice")]).await.unwrap();
        apply_tick(&store, 2, &[register("u2", "bob")]).await.unwrap();

        assert_eq!(
            latest(&store, &ObjectType::UsersLl.key("root")),
            Some(json!({"next": "u2"}))
        );
        assert_eq!(
            latest(&store, &ObjectType::UsersLl.key("u2")),
            Some(json!({"next": "u1"}))
        );
    }

    #[tokio::test]
    async fn duplicate_registration_is_rejected_without_writes() {
        let store = MemoryStore::new();
        apply_tick(&store, 1, &[register("u1", "alice")]).await.unwrap();

        let err = apply_tick(&store, 2, &[register("u1", "alice2")])
            .await
            .unwrap_err();
        assert_eq!(err.rejection(), Some("user_id already taken"));
        assert!(store.revisions_at(2).unwrap().is_empty());
        assert!(store.events_at(2).unwrap().is_empty());
    }

    #[tokio::test]
    async fn rename_of_missing_board_is_rejected() {
        let store = MemoryStore::new();
        let rename = EventEnvelope::new(
            "board_renamed",
            json!({"board_id": "b9", "board_name": "x"}),
        );
        let err = apply_tick(&store, 1, &[rename]).await.unwrap_err();
        assert_eq!(err.rejection(), Some("not found"));
    }

    #[tokio::test]
    async fn boards_accumulate_per_user() {
        let store = MemoryStore::new();
        let created = |board: &str| {
            EventEnvelope::new(
                "board_created",
                json!({"user_id": "u1", "board_id": board, "board_name": board}),
            )
        };
        apply_tick(&store, 1, &[created("b1")]).await.unwrap();
        apply_tick(&store, 2, &[created("b2")]).await.unwrap();
        let rename = EventEnvelope::new(
            "board_renamed",
            json!({"board_id": "b1", "board_name": "Roadmap"}),
        );
        apply_tick(&store, 3, &[rename]).await.unwrap();

        assert_eq!(
            latest(&store, &ObjectType::UserBoards.key("u1")),
            Some(json!({"list": ["b1", "b2"]}))
        );
        assert_eq!(
            latest(&store, &ObjectType::Board.key("b1")),
            Some(json!({"name": "Roadmap", "user_id": "u1"}))
        );
    }

    #[tokio::test]
    async fn same_events_produce_same_revisions() {
        let ticks = vec![
            vec![register("u1", "alice"), ping()],
            vec![ping(), register("u2", "bob")],
            vec![EventEnvelope::new(
                "board_created",
                json!({"user_id": "u2", "board_id": "b1", "board_name": "Plans"}),
            )],
        ];

        let first = MemoryStore::new();
        let second = MemoryStore::new();
        for (tick, events) in (1_u64..).zip(&ticks) {
            apply_tick(&first, tick, events).await.unwrap();
            apply_tick(&second, tick, events).await.unwrap();
        }
        for tick in 1..=3 {
            let a = serde_json::to_value(first.revisions_at(tick).unwrap()).unwrap();
            let b = serde_json::to_value(second.revisions_at(tick).unwrap()).unwrap();
            assert_eq!(a, b);
        }
    }

    #[tokio::test]
    async fn sequence_children_run_in_order() {
        let store = MemoryStore::new();
        let mut trx = store.begin().await.unwrap();
        trx.set_tick(1).await.unwrap();
        trx.record_event(0, &ping()).await.unwrap();

        let key = ObjectType::Counter.key("seq");
        let action = Action::seq(vec![
            Action::create(key.clone(), &json!({"count": 1})),
            Action::fetch_existing(key.clone(), |_| Action::fail("saw the first write")),
        ]);
        let err = finalize(action, "ping", &mut trx).await.unwrap_err();
        assert_eq!(err.rejection(), Some("saw the first write"));
    }
}
