//! polyreg-core: polymorphic entity registry model.
//! Target types as a closed tagged union, the error taxonomy, the store
//! traits every backend implements, and an in-process backend that
//! emulates the schema guarantees under a single lock.

pub mod error;
pub mod memory;
pub mod registry;
pub mod types;

pub use error::{RegistryError, Result};
pub use memory::MemoryStore;
pub use registry::{BackingStore, EntityRegistry, RegistryStore, SessionStore};
pub use types::{
    BotId, CascadeReport, IntegrityViolation, KnownEntity, NewSession, SessionId, TargetRef,
    TargetType, TestSession, UserId,
};
