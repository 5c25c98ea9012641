//! In-process backend.
//!
//! Emulates the schema guarantees without a storage engine. Every mutation
//! runs under one write guard, so an existence check and the write that
//! depends on it are never separated. Deleting a backing record forwards
//! into the registry delete path before the guard is released, which gives
//! the same backing → entity → sessions order as the engine cascade.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::error::{RegistryError, Result};
use crate::registry::{BackingStore, EntityRegistry, RegistryStore, SessionStore};
use crate::types::{
    BotId, CascadeReport, IntegrityViolation, KnownEntity, NewSession, SessionId, TargetRef,
    TestSession, UserId,
};

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

#[derive(Debug, Default)]
struct State {
    bots: BTreeSet<BotId>,
    users: BTreeSet<UserId>,
    entities: BTreeSet<TargetRef>,
    sessions: BTreeMap<SessionId, TestSession>,
    sessions_by_target: BTreeMap<TargetRef, BTreeSet<SessionId>>,
}

impl State {
    fn backing_exists(&self, target: &TargetRef) -> bool {
        match target {
            TargetRef::Bot(id) => self.bots.contains(id),
            TargetRef::User(id) => self.users.contains(id),
        }
    }

    fn insert_backing(&mut self, target: &TargetRef) -> bool {
        match target {
            TargetRef::Bot(id) => self.bots.insert(id.clone()),
            TargetRef::User(id) => self.users.insert(id.clone()),
        }
    }

    fn remove_backing(&mut self, target: &TargetRef) -> bool {
        match target {
            TargetRef::Bot(id) => self.bots.remove(id),
            TargetRef::User(id) => self.users.remove(id),
        }
    }

    /// Entity, then its sessions.
    fn remove_entity(&mut self, target: &TargetRef, report: &mut CascadeReport) {
        if !self.entities.remove(target) {
            return;
        }
        report.entity_removed = true;
        if let Some(ids) = self.sessions_by_target.remove(target) {
            for id in &ids {
                self.sessions.remove(id);
            }
            report.sessions_removed = ids.into_iter().collect();
        }
    }

    fn unlink_session(&mut self, session: &TestSession) {
        if let Some(ids) = self.sessions_by_target.get_mut(&session.target) {
            ids.remove(&session.id);
            if ids.is_empty() {
                self.sessions_by_target.remove(&session.target);
            }
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.state
            .read()
            .map_err(|_| RegistryError::Storage("memory store lock poisoned".to_owned()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        self.state
            .write()
            .map_err(|_| RegistryError::Storage("memory store lock poisoned".to_owned()))
    }
}

impl EntityRegistry for MemoryStore {
    fn register(&self, target: &TargetRef) -> Result<KnownEntity> {
        let mut state = self.write()?;
        if state.entities.contains(target) {
            return Err(RegistryError::DuplicateEntity {
                target: target.clone(),
            });
        }
        if !state.backing_exists(target) {
            return Err(RegistryError::UnknownBackingRecord {
                target: target.clone(),
            });
        }
        state.entities.insert(target.clone());
        info!(
            target_type = target.target_type().as_str(),
            target_id = target.target_id(),
            "entity registered"
        );
        Ok(KnownEntity::new(target.clone()))
    }

    fn lookup(&self, target: &TargetRef) -> Result<Option<KnownEntity>> {
        let state = self.read()?;
        Ok(state
            .entities
            .contains(target)
            .then(|| KnownEntity::new(target.clone())))
    }

    fn on_backing_record_deleted(&self, target: &TargetRef) -> Result<CascadeReport> {
        let mut state = self.write()?;
        if state.backing_exists(target) {
            warn!(entity = %target, "deletion hook called while backing record still exists");
        }
        let mut report = CascadeReport::empty(target.clone());
        state.remove_entity(target, &mut report);
        if report.entity_removed {
            info!(
                entity = %target,
                sessions_removed = report.sessions_removed.len(),
                "entity removed by deletion hook"
            );
        } else {
            debug!(entity = %target, "deletion hook: entity already absent");
        }
        Ok(report)
    }

    fn list_entities(&self) -> Result<Vec<KnownEntity>> {
        let state = self.read()?;
        Ok(state.entities.iter().cloned().map(KnownEntity::new).collect())
    }
}

impl SessionStore for MemoryStore {
    fn create_session(&self, new: NewSession) -> Result<TestSession> {
        let mut state = self.write()?;
        if !state.entities.contains(&new.target) {
            return Err(RegistryError::UnknownEntity { target: new.target });
        }
        if state.sessions.contains_key(&new.id) {
            return Err(RegistryError::DuplicateSession { id: new.id });
        }
        let session = TestSession {
            id: new.id,
            target: new.target,
            name: new.name,
            created_at: Utc::now(),
        };
        state
            .sessions_by_target
            .entry(session.target.clone())
            .or_default()
            .insert(session.id.clone());
        state.sessions.insert(session.id.clone(), session.clone());
        info!(session = %session.id, entity = %session.target, "session created");
        Ok(session)
    }

    fn get_session(&self, id: &SessionId) -> Result<Option<TestSession>> {
        Ok(self.read()?.sessions.get(id).cloned())
    }

    fn list_sessions(&self, target: &TargetRef) -> Result<Vec<TestSession>> {
        let state = self.read()?;
        let Some(ids) = state.sessions_by_target.get(target) else {
            return Ok(Vec::new());
        };
        Ok(ids
            .iter()
            .filter_map(|id| state.sessions.get(id).cloned())
            .collect())
    }

    fn delete_session(&self, id: &SessionId) -> Result<()> {
        let mut state = self.write()?;
        let Some(session) = state.sessions.remove(id) else {
            return Err(RegistryError::NotFound { id: id.clone() });
        };
        state.unlink_session(&session);
        debug!(session = %id, "session deleted");
        Ok(())
    }

    fn delete_all_sessions(&self, target: &TargetRef) -> Result<usize> {
        let mut state = self.write()?;
        let ids = state.sessions_by_target.remove(target).unwrap_or_default();
        for id in &ids {
            state.sessions.remove(id);
        }
        debug!(entity = %target, count = ids.len(), "sessions deleted for entity");
        Ok(ids.len())
    }
}

impl BackingStore for MemoryStore {
    fn insert_backing(&self, target: &TargetRef) -> Result<()> {
        let mut state = self.write()?;
        if state.insert_backing(target) {
            debug!(entity = %target, "backing record inserted");
        }
        Ok(())
    }

    fn delete_backing(&self, target: &TargetRef) -> Result<CascadeReport> {
        let mut state = self.write()?;
        let mut report = CascadeReport::empty(target.clone());
        report.backing_removed = state.remove_backing(target);
        state.remove_entity(target, &mut report);
        if !report.is_noop() {
            info!(
                entity = %target,
                entity_removed = report.entity_removed,
                sessions_removed = report.sessions_removed.len(),
                "backing record deleted"
            );
        }
        Ok(report)
    }

    fn backing_exists(&self, target: &TargetRef) -> Result<bool> {
        Ok(self.read()?.backing_exists(target))
    }
}

impl RegistryStore for MemoryStore {
    fn verify_integrity(&self) -> Result<Vec<IntegrityViolation>> {
        let state = self.read()?;
        let mut violations: Vec<IntegrityViolation> = state
            .entities
            .iter()
            .filter(|target| !state.backing_exists(target))
            .map(|target| IntegrityViolation::OrphanEntity {
                target: target.clone(),
            })
            .collect();
        violations.extend(
            state
                .sessions
                .values()
                .filter(|s| !state.entities.contains(&s.target))
                .map(|s| IntegrityViolation::OrphanSession {
                    session: s.id.clone(),
                    target: s.target.clone(),
                }),
        );
        Ok(violations)
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone)]
    enum Op {
        InsertBacking(TargetRef),
        DeleteBacking(TargetRef),
        Register(TargetRef),
        Hook(TargetRef),
        CreateSession(String, TargetRef),
        DeleteSession(String),
        DeleteAllSessions(TargetRef),
    }

    fn arb_target() -> impl Strategy<Value = TargetRef> {
        prop_oneof![
            Just(TargetRef::bot("a")),
            Just(TargetRef::bot("b")),
            Just(TargetRef::user("a")),
            Just(TargetRef::user("b")),
        ]
    }

    fn arb_session_id() -> impl Strategy<Value = String> {
        (0u8..4).prop_map(|n| format!("s{n}"))
    }

    fn arb_op() -> impl Strategy<Value = Op> {
        prop_oneof![
            arb_target().prop_map(Op::InsertBacking),
            arb_target().prop_map(Op::DeleteBacking),
            arb_target().prop_map(Op::Register),
            arb_target().prop_map(Op::Hook),
            (arb_session_id(), arb_target()).prop_map(|(id, t)| Op::CreateSession(id, t)),
            arb_session_id().prop_map(Op::DeleteSession),
            arb_target().prop_map(Op::DeleteAllSessions),
        ]
    }

    proptest! {
        /// The ownership chain holds after every operation.
        #[test]
        fn integrity_holds_after_any_sequence(ops in proptest::collection::vec(arb_op(), 0..60)) {
            let store = MemoryStore::new();
            for op in ops {
                match op {
                    Op::InsertBacking(t) => store.insert_backing(&t).unwrap(),
                    Op::DeleteBacking(t) => {
                        let report = store.delete_backing(&t).unwrap();
                        prop_assert!(store.lookup(&t).unwrap().is_none());
                        for id in &report.sessions_removed {
                            prop_assert!(store.get_session(id).unwrap().is_none());
                        }
                    }
                    Op::Register(t) => {
                        let registered = store.lookup(&t).unwrap().is_some();
                        let backed = store.backing_exists(&t).unwrap();
                        match store.register(&t) {
                            Ok(_) => prop_assert!(backed && !registered),
                            Err(RegistryError::DuplicateEntity { .. }) => prop_assert!(registered),
                            Err(RegistryError::UnknownBackingRecord { .. }) => prop_assert!(!backed),
                            Err(other) => prop_assert!(false, "unexpected error {other}"),
                        }
                    }
                    Op::Hook(t) => {
                        store.on_backing_record_deleted(&t).unwrap();
                        prop_assert!(store.lookup(&t).unwrap().is_none());
                    }
                    Op::CreateSession(id, t) => {
                        let registered = store.lookup(&t).unwrap().is_some();
                        match store.create_session(NewSession::new(id.as_str(), t)) {
                            Ok(_) => prop_assert!(registered),
                            Err(RegistryError::UnknownEntity { .. }) => prop_assert!(!registered),
                            Err(RegistryError::DuplicateSession { .. }) => {}
                            Err(other) => prop_assert!(false, "unexpected error {other}"),
                        }
                    }
                    Op::DeleteSession(id) => {
                        let id = SessionId::new(id);
                        let existed = store.get_session(&id).unwrap().is_some();
                        prop_assert_eq!(store.delete_session(&id).is_ok(), existed);
                    }
                    Op::DeleteAllSessions(t) => {
                        store.delete_all_sessions(&t).unwrap();
                        prop_assert!(store.list_sessions(&t).unwrap().is_empty());
                    }
                }
                prop_assert!(store.verify_integrity().unwrap().is_empty());
                for entity in store.list_entities().unwrap() {
                    prop_assert!(store.backing_exists(&entity.target).unwrap());
                }
            }
        }
    }
}
