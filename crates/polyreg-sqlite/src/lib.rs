//! polyreg-sqlite: SQLite backend for the polymorphic entity registry.
//! Referential integrity and cascades are enforced by the schema
//! (generated discriminator columns, one foreign key each), not by callers.

mod backing;
pub mod config;
mod error;
pub mod migrations;
mod registry;
mod sessions;
pub mod store;

pub use config::{ConfigError, StoreConfig};
pub use migrations::{MIGRATIONS, Migration};
pub use store::SqliteStore;

pub use polyreg_core::{
    BackingStore, CascadeReport, EntityRegistry, IntegrityViolation, KnownEntity, NewSession,
    RegistryError, RegistryStore, Result, SessionId, SessionStore, TargetRef, TargetType,
    TestSession,
};
