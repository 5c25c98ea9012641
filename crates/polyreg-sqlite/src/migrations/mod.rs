//! Ordered schema migrations, each applied once in its own transaction and
//! recorded in `_migrations_applied`.

mod add_known_entities;
mod add_test_sessions;

use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior, params};
use tracing::{debug, info};

use polyreg_core::Result;

use crate::error::classify;

#[derive(Clone, Copy)]
pub struct Migration {
    pub id: &'static str,
    pub description: &'static str,
    pub up: fn(&Transaction<'_>) -> rusqlite::Result<()>,
}

pub const MIGRATIONS: [Migration; 2] = [
    add_known_entities::MIGRATION,
    add_test_sessions::MIGRATION,
];

const MIGRATIONS_TABLE: &str = "
CREATE TABLE IF NOT EXISTS _migrations_applied (
    id         TEXT PRIMARY KEY NOT NULL,
    applied_at TEXT NOT NULL
)";

/// Apply every pending migration. Returns the ids applied by this call.
///
/// The applied-check runs inside the migration's write transaction, so two
/// processes opening the same file never apply a migration twice.
pub fn apply_migrations(conn: &mut Connection) -> Result<Vec<&'static str>> {
    conn.execute_batch(MIGRATIONS_TABLE).map_err(classify)?;

    let mut applied = Vec::new();
    for migration in MIGRATIONS {
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(classify)?;

        let applied_at: Option<String> = tx
            .query_row(
                "SELECT applied_at FROM _migrations_applied WHERE id = ?1",
                params![migration.id],
                |row| row.get(0),
            )
            .optional()
            .map_err(classify)?;
        if let Some(applied_at) = applied_at {
            debug!(id = migration.id, %applied_at, "migration already applied");
            continue;
        }

        info!(
            id = migration.id,
            description = migration.description,
            "applying migration"
        );
        (migration.up)(&tx).map_err(classify)?;
        tx.execute(
            "INSERT INTO _migrations_applied (id, applied_at) VALUES (?1, ?2)",
            params![migration.id, Utc::now().to_rfc3339()],
        )
        .map_err(classify)?;
        tx.commit().map_err(classify)?;

        applied.push(migration.id);
    }

    Ok(applied)
}
