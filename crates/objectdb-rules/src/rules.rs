//! Event rules: one pure handler per declared event type.
//!
//! A handler turns a typed event into an [`Action`] tree. Handlers never
//! perform I/O, so the same event always yields the same tree, and
//! interpreting that tree against the same state always yields the same
//! writes.

use objectdb_types::{
    BoardCreated, BoardObject, BoardRenamed, CounterObject, CredentialsObject, DomainEvent,
    EmailObject, EventEnvelope, ObjectType, UserBoardsObject, UserLinkObject, UserObject,
    UserRegistered, UsernameObject,
};

use crate::action::Action;

/// Reason given by handlers whose behaviour is not defined yet.
pub const NOT_IMPLEMENTED: &str = "not implemented";

/// Id of the head node of the `users_ll` list.
pub const USERS_ROOT: &str = "root";

/// Plan the actions for a raw envelope.
///
/// Undeclared types and payloads that do not fit their declared shape are
/// planned as a failure.
pub fn plan(envelope: &EventEnvelope) -> Action {
    match DomainEvent::parse(envelope) {
        Ok(event) => handle(event),
        Err(e) => Action::fail(e.to_string()),
    }
}

/// Plan the actions for a typed event.
pub fn handle(event: DomainEvent) -> Action {
    match event {
        DomainEvent::UserRegistered(e) => user_registered(e),
        DomainEvent::UserRealnameChanged(_)
        | DomainEvent::UserUsernameChanged(_)
        | DomainEvent::UserEmailChanged(_) => Action::fail(NOT_IMPLEMENTED),
        DomainEvent::Ping(_) => ping(),
        DomainEvent::BoardCreated(e) => board_created(e),
        DomainEvent::BoardRenamed(e) => board_renamed(e),
    }
}

fn user_registered(event: UserRegistered) -> Action {
    // `root` is the list head; a user with that id would collide with it.
    if event.user_id == USERS_ROOT {
        return Action::fail("user_id reserved");
    }
    let user_key = ObjectType::User.key(event.user_id.clone());
    Action::fetch(
        user_key,
        |_| Action::fail("user_id already taken"),
        move || {
            let UserRegistered {
                user_id,
                username,
                realname,
                email,
                password,
            } = event;
            Action::seq(vec![
                Action::create(
                    ObjectType::User.key(user_id.clone()),
                    &UserObject {
                        email: email.clone(),
                        username: username.clone(),
                        realname,
                    },
                ),
                Action::create(
                    ObjectType::Username.key(username),
                    &UsernameObject {
                        user_id: user_id.clone(),
                    },
                ),
                Action::create(
                    ObjectType::Email.key(email),
                    &EmailObject {
                        user_id: user_id.clone(),
                    },
                ),
                Action::create(
                    ObjectType::Credentials.key(user_id.clone()),
                    &CredentialsObject { password },
                ),
                link_user(user_id),
            ])
        },
    )
}

/// Push `user_id` onto the front of the `users_ll` list.
fn link_user(user_id: String) -> Action {
    let node = user_id.clone();
    Action::fetch_as::<UserLinkObject>(
        ObjectType::UsersLl.key(USERS_ROOT),
        move |root| {
            Action::seq(vec![
                Action::create(ObjectType::UsersLl.key(node.clone()), &root),
                Action::update(
                    ObjectType::UsersLl.key(USERS_ROOT),
                    &UserLinkObject { next: Some(node) },
                ),
            ])
        },
        move || {
            Action::seq(vec![
                Action::create(
                    ObjectType::UsersLl.key(user_id.clone()),
                    &UserLinkObject { next: None },
                ),
                Action::create(
                    ObjectType::UsersLl.key(USERS_ROOT),
                    &UserLinkObject {
                        next: Some(user_id),
                    },
                ),
            ])
        },
    )
}

fn ping() -> Action {
    let key = ObjectType::Counter.key("ping");
    Action::fetch_as::<CounterObject>(
        key.clone(),
        {
            let key = key.clone();
            move |counter| match counter.count.checked_add(1) {
                Some(count) => Action::update(key, &CounterObject { count }),
                None => Action::fail("ping counter overflow"),
            }
        },
        move || Action::create(key, &CounterObject { count: 1 }),
    )
}

fn board_created(event: BoardCreated) -> Action {
    let BoardCreated {
        user_id,
        board_id,
        board_name,
    } = event;
    let boards_key = ObjectType::UserBoards.key(user_id.clone());
    let appended = board_id.clone();
    let first = board_id.clone();
    let found_key = boards_key.clone();
    Action::seq(vec![
        Action::create(
            ObjectType::Board.key(board_id),
            &BoardObject {
                name: board_name,
                user_id,
            },
        ),
        Action::fetch_as::<UserBoardsObject>(
            boards_key.clone(),
            move |mut boards| {
                boards.list.push(appended);
                Action::update(found_key, &boards)
            },
            move || Action::update(boards_key, &UserBoardsObject { list: vec![first] }),
        ),
    ])
}

fn board_renamed(event: BoardRenamed) -> Action {
    let key = ObjectType::Board.key(event.board_id);
    let target = key.clone();
    Action::fetch(
        key,
        move |value| match serde_json::from_value::<BoardObject>(value) {
            Ok(board) => Action::update(
                target,
                &BoardObject {
                    name: event.board_name,
                    ..board
                },
            ),
            Err(e) => Action::fail(format!("malformed board object: {e}")),
        },
        || Action::fail(crate::action::NOT_FOUND),
    )
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn envelope(event_type: &str, data: serde_json::Value) -> EventEnvelope {
        EventEnvelope::new(event_type, data)
    }

    #[test]
    fn undeclared_event_fails() {
        let action = plan(&envelope("board_deleted", json!({"board_id": "b1"})));
        assert!(matches!(action, Action::Failed(reason) if reason.contains("board_deleted")));
    }

    #[test]
    fn malformed_payload_fails() {
        let action = plan(&envelope("board_renamed", json!({"board_id": 7})));
        assert!(matches!(action, Action::Failed(_)));
    }

    #[test]
    fn change_events_are_not_implemented() {
        let cases = [
            ("user_realname_changed", json!({"user_id": "u1", "realname": "A"})),
            ("user_username_changed", json!({"user_id": "u1", "username": "a"})),
            ("user_email_changed", json!({"user_id": "u1", "email": "a@b"})),
        ];
        for (event_type, data) in cases {
            let action = plan(&envelope(event_type, data));
            assert!(
                matches!(&action, Action::Failed(reason) if reason == NOT_IMPLEMENTED),
                "{event_type} planned {action:?}"
            );
        }
    }

    #[test]
    fn ping_starts_with_a_counter_fetch() {
        let action = plan(&envelope("ping", serde_json::Value::Null));
        let fetch = match action {
            Action::Fetch(fetch) => fetch,
            other => panic!("Expected Fetch, got {other:?}"),
        };
        assert_eq!(fetch.key, ObjectType::Counter.key("ping"));
        assert!(matches!(
            (fetch.on_missing)(),
            Action::Change { value: Some(v), .. } if v == json!({"count": 1})
        ));
    }

    #[test]
    fn reserved_user_id_is_rejected() {
        let action = plan(&envelope(
            "user_registered",
            json!({
                "user_id": "root",
                "username": "r",
                "realname": "R",
                "email": "r@x",
                "password": "p"
            }),
        ));
        assert!(matches!(action, Action::Failed(reason) if reason == "user_id reserved"));
    }

    #[test]
    fn board_created_writes_board_then_list() {
        let action = plan(&envelope(
            "board_created",
            json!({"user_id": "u1", "board_id": "b1", "board_name": "Plans"}),
        ));
        let children = match action {
            Action::Sequence(children) => children,
            other => panic!("Expected Sequence, got {other:?}"),
        };
        assert_eq!(children.len(), 2);
        assert!(matches!(
            &children[0],
            Action::Change { key, value: Some(v) }
                if *key == ObjectType::Board.key("b1")
                    && *v == json!({"name": "Plans", "user_id": "u1"})
        ));
        assert!(matches!(&children[1], Action::Fetch(f) if f.key == ObjectType::UserBoards.key("u1")));
    }
}
