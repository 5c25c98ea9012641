//! Store traits. Each backend implements all four; callers and tests only
//! depend on these.

use crate::error::{RegistryError, Result};
use crate::types::{
    CascadeReport, IntegrityViolation, KnownEntity, NewSession, SessionId, TargetRef, TestSession,
};

/// Source of truth for "this `(id, type)` pair is a known, valid target".
pub trait EntityRegistry: Send + Sync {
    /// Insert a new pair. The backing-record check is atomic with the insert.
    ///
    /// Fails with `DuplicateEntity` or `UnknownBackingRecord`.
    fn register(&self, target: &TargetRef) -> Result<KnownEntity>;

    fn lookup(&self, target: &TargetRef) -> Result<Option<KnownEntity>>;

    /// Deletion hook for a backing record that has gone away. Removes the
    /// entry and its sessions in one transaction; absent entry is a no-op.
    fn on_backing_record_deleted(&self, target: &TargetRef) -> Result<CascadeReport>;

    /// All entries, ordered by `(target_type, target_id)`.
    fn list_entities(&self) -> Result<Vec<KnownEntity>>;

    /// `register`, treating "already registered" as success.
    fn ensure_registered(&self, target: &TargetRef) -> Result<KnownEntity> {
        match self.register(target) {
            Err(RegistryError::DuplicateEntity { .. }) => Ok(KnownEntity::new(target.clone())),
            other => other,
        }
    }
}

/// Records that hang off a registered entity and die with it.
pub trait SessionStore: Send + Sync {
    /// Fails with `UnknownEntity` unless the target is registered, or
    /// `DuplicateSession` if the id is taken.
    fn create_session(&self, new: NewSession) -> Result<TestSession>;

    fn get_session(&self, id: &SessionId) -> Result<Option<TestSession>>;

    /// Sessions of one entity, ordered by id.
    fn list_sessions(&self, target: &TargetRef) -> Result<Vec<TestSession>>;

    /// Fails with `NotFound` if absent. Sessions are leaves: nothing cascades.
    fn delete_session(&self, id: &SessionId) -> Result<()>;

    /// Remove every session of `target`, keeping the entity. Returns the count.
    fn delete_all_sessions(&self, target: &TargetRef) -> Result<usize>;
}

/// The `bots` / `users` tables as seen by the registry.
pub trait BackingStore: Send + Sync {
    /// Create the backing row; no-op if it already exists.
    fn insert_backing(&self, target: &TargetRef) -> Result<()>;

    /// Delete the backing row and walk backing → entity → sessions in one
    /// transaction. Deleting an absent row yields a no-op report.
    fn delete_backing(&self, target: &TargetRef) -> Result<CascadeReport>;

    fn backing_exists(&self, target: &TargetRef) -> Result<bool>;
}

/// A full backend: registry, sessions, backing tables, plus an audit.
pub trait RegistryStore: EntityRegistry + SessionStore + BackingStore {
    /// Every row breaking the backing → entity → session chain. Empty means
    /// the invariants hold.
    fn verify_integrity(&self) -> Result<Vec<IntegrityViolation>>;
}
