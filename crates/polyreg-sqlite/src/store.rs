//! SQLite-backed registry store.
//!
//! The schema carries the integrity rules: per-type generated columns with
//! their own foreign keys on `known_entities`, and a composite foreign key
//! from `test_sessions`. All deletes cascade inside the engine, in
//! backing → entity → session order.

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior, params};
use tracing::{debug, info};

use polyreg_core::{RegistryError, Result, SessionId, TargetRef, TargetType};

use crate::config::StoreConfig;
use crate::error::classify;
use crate::migrations::apply_migrations;

/// Minimal shapes of the external `bots` / `users` tables. Only the primary
/// key is part of the contract.
const BACKING_TABLES: &str = "
CREATE TABLE IF NOT EXISTS bots (bot_id TEXT PRIMARY KEY NOT NULL);
CREATE TABLE IF NOT EXISTS users (user_id TEXT PRIMARY KEY NOT NULL);
";

/// Statements against one backing table.
pub(crate) struct BackingSql {
    pub exists: &'static str,
    pub insert: &'static str,
    pub delete: &'static str,
}

const BOTS_SQL: BackingSql = BackingSql {
    exists: "SELECT EXISTS(SELECT 1 FROM bots WHERE bot_id = ?1)",
    insert: "INSERT OR IGNORE INTO bots (bot_id) VALUES (?1)",
    delete: "DELETE FROM bots WHERE bot_id = ?1",
};

const USERS_SQL: BackingSql = BackingSql {
    exists: "SELECT EXISTS(SELECT 1 FROM users WHERE user_id = ?1)",
    insert: "INSERT OR IGNORE INTO users (user_id) VALUES (?1)",
    delete: "DELETE FROM users WHERE user_id = ?1",
};

pub(crate) fn backing_sql(target_type: TargetType) -> &'static BackingSql {
    match target_type {
        TargetType::Bot => &BOTS_SQL,
        TargetType::User => &USERS_SQL,
    }
}

pub(crate) fn provision_backing_tables(conn: &Connection) -> Result<()> {
    conn.execute_batch(BACKING_TABLES).map_err(classify)
}

/// SQLite persistence for the registry, its sessions and (optionally) the
/// backing tables.
///
/// One connection per store. Open several stores on the same file to get
/// independent writers; SQLite serializes them.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    config: StoreConfig,
}

impl SqliteStore {
    /// Open (or create) the database described by `config` and run migrations.
    pub fn open(config: StoreConfig) -> Result<Self> {
        let mut conn = match &config.path {
            Some(path) => Connection::open(path),
            None => Connection::open_in_memory(),
        }
        .map_err(classify)?;

        conn.busy_timeout(config.busy_timeout()).map_err(classify)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(classify)?;
        if config.path.is_some() && config.journal_wal {
            let mode: String = conn
                .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
                .map_err(classify)?;
            debug!(%mode, "journal mode set");
        }
        if config.provision_backing_tables {
            provision_backing_tables(&conn)?;
        }

        let applied = apply_migrations(&mut conn)?;
        info!(
            path = ?config.path,
            migrations_applied = applied.len(),
            "registry store opened"
        );

        Ok(Self {
            conn: Mutex::new(conn),
            config,
        })
    }

    /// Open a database file with default settings.
    pub fn open_path(path: impl Into<PathBuf>) -> Result<Self> {
        Self::open(StoreConfig::at_path(path))
    }

    /// Open an in-memory database. Useful for testing.
    pub fn open_in_memory() -> Result<Self> {
        Self::open(StoreConfig::in_memory())
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| RegistryError::Storage("sqlite connection mutex poisoned".to_owned()))
    }

    /// Run a single-statement read.
    pub(crate) fn read<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.lock()?;
        f(&conn)
    }

    /// Run `f` in a `BEGIN IMMEDIATE` transaction.
    ///
    /// The write lock is held from the first check to commit. Any error
    /// (or unwinding) drops the transaction, which rolls it back.
    pub(crate) fn write<T>(&self, f: impl FnOnce(&Transaction<'_>) -> Result<T>) -> Result<T> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(classify)?;
        let out = f(&tx)?;
        tx.commit().map_err(classify)?;
        Ok(out)
    }
}

// ─── Shared queries ──────────────────────────────────────────────────

pub(crate) fn backing_exists_in(conn: &Connection, target: &TargetRef) -> Result<bool> {
    conn.query_row(
        backing_sql(target.target_type()).exists,
        params![target.target_id()],
        |row| row.get(0),
    )
    .map_err(classify)
}

pub(crate) fn entity_exists_in(conn: &Connection, target: &TargetRef) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM known_entities WHERE target_id = ?1 AND target_type = ?2",
            params![target.target_id(), target.target_type().as_str()],
            |row| row.get(0),
        )
        .optional()
        .map_err(classify)?;
    Ok(found.is_some())
}

/// Ids of the sessions owned by `target`, sorted.
pub(crate) fn session_ids_for(conn: &Connection, target: &TargetRef) -> Result<Vec<SessionId>> {
    let mut stmt = conn
        .prepare(
            "SELECT id FROM test_sessions
             WHERE target_id = ?1 AND target_type = ?2
             ORDER BY id",
        )
        .map_err(classify)?;
    let ids = stmt
        .query_map(
            params![target.target_id(), target.target_type().as_str()],
            |row| row.get::<_, String>(0),
        )
        .map_err(classify)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(classify)?;
    Ok(ids.into_iter().map(SessionId::new).collect())
}
