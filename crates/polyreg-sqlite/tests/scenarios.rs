//! End-to-end scenarios run against both backends through the traits.

use polyreg_core::MemoryStore;
use polyreg_sqlite::{
    BackingStore, EntityRegistry, NewSession, RegistryError, RegistryStore, SessionId,
    SessionStore, SqliteStore, TargetRef,
};

fn backends() -> Vec<(&'static str, Box<dyn RegistryStore>)> {
    let memory: Box<dyn RegistryStore> = Box::new(MemoryStore::new());
    let sqlite: Box<dyn RegistryStore> = Box::new(SqliteStore::open_in_memory().unwrap());
    vec![("memory", memory), ("sqlite", sqlite)]
}

#[test]
fn bot_lifecycle_cascades_to_sessions() {
    for (name, store) in backends() {
        let b1 = TargetRef::bot("b1");
        store.insert_backing(&b1).unwrap();

        store.register(&b1).unwrap();
        store
            .create_session(NewSession::new("s1", b1.clone()))
            .unwrap();

        let report = store.delete_backing(&b1).unwrap();
        assert!(report.entity_removed, "{name}");
        assert_eq!(report.sessions_removed, vec![SessionId::new("s1")], "{name}");

        assert!(store.lookup(&b1).unwrap().is_none(), "{name}");
        assert!(
            store.get_session(&SessionId::new("s1")).unwrap().is_none(),
            "{name}"
        );
        assert!(store.verify_integrity().unwrap().is_empty(), "{name}");
    }
}

#[test]
fn session_for_unknown_user_creates_nothing() {
    for (name, store) in backends() {
        let u9 = TargetRef::user("u9");
        let err = store
            .create_session(NewSession::new("s1", u9.clone()))
            .unwrap_err();
        assert_eq!(err, RegistryError::UnknownEntity { target: u9.clone() }, "{name}");
        assert!(store.list_sessions(&u9).unwrap().is_empty(), "{name}");
        assert!(
            store.get_session(&SessionId::new("s1")).unwrap().is_none(),
            "{name}"
        );
    }
}

#[test]
fn register_preconditions() {
    for (name, store) in backends() {
        let b2 = TargetRef::bot("b2");
        assert!(
            matches!(
                store.register(&b2),
                Err(RegistryError::UnknownBackingRecord { .. })
            ),
            "{name}"
        );

        store.insert_backing(&b2).unwrap();
        store.register(&b2).unwrap();
        assert!(
            matches!(
                store.register(&b2),
                Err(RegistryError::DuplicateEntity { .. })
            ),
            "{name}"
        );
    }
}

#[test]
fn unknown_tag_is_rejected_before_reaching_a_store() {
    let err = TargetRef::parse("g1", "guild").unwrap_err();
    assert_eq!(
        err,
        RegistryError::InvalidTargetType {
            tag: "guild".to_owned()
        }
    );
}

#[test]
fn cascade_only_touches_its_own_pair() {
    for (name, store) in backends() {
        let bot = TargetRef::bot("same");
        let user = TargetRef::user("same");
        for t in [&bot, &user] {
            store.insert_backing(t).unwrap();
            store.register(t).unwrap();
        }
        store
            .create_session(NewSession::new("bot-s", bot.clone()))
            .unwrap();
        store
            .create_session(NewSession::new("user-s", user.clone()))
            .unwrap();

        store.delete_backing(&user).unwrap();

        assert!(store.lookup(&bot).unwrap().is_some(), "{name}");
        assert!(store.lookup(&user).unwrap().is_none(), "{name}");
        assert!(
            store.get_session(&SessionId::new("bot-s")).unwrap().is_some(),
            "{name}"
        );
        assert!(
            store.get_session(&SessionId::new("user-s")).unwrap().is_none(),
            "{name}"
        );
    }
}

#[test]
fn repeated_deletes_are_noops() {
    for (name, store) in backends() {
        let b1 = TargetRef::bot("b1");
        store.insert_backing(&b1).unwrap();
        store.register(&b1).unwrap();

        assert!(!store.delete_backing(&b1).unwrap().is_noop(), "{name}");
        assert!(store.delete_backing(&b1).unwrap().is_noop(), "{name}");
        assert!(store.on_backing_record_deleted(&b1).unwrap().is_noop(), "{name}");
    }
}

#[test]
fn reregister_after_backing_recreated() {
    for (name, store) in backends() {
        let u1 = TargetRef::user("u1");
        store.insert_backing(&u1).unwrap();
        store.register(&u1).unwrap();
        store.delete_backing(&u1).unwrap();

        assert!(
            matches!(
                store.register(&u1),
                Err(RegistryError::UnknownBackingRecord { .. })
            ),
            "{name}"
        );
        store.insert_backing(&u1).unwrap();
        store.register(&u1).unwrap();
        assert!(store.list_sessions(&u1).unwrap().is_empty(), "{name}");
    }
}
