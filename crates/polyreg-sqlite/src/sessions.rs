use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::{debug, info};

use polyreg_core::{
    NewSession, RegistryError, Result, SessionId, SessionStore, TargetRef, TestSession,
};

use crate::error::{Constraint, classify, constraint_of};
use crate::store::SqliteStore;

const SESSION_COLUMNS: &str = "id, target_id, target_type, name, created_at";

/// A `test_sessions` row before its tag and timestamp are validated.
struct SessionRow {
    id: String,
    target_id: String,
    target_type: String,
    name: Option<String>,
    created_at: String,
}

impl SessionRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            target_id: row.get(1)?,
            target_type: row.get(2)?,
            name: row.get(3)?,
            created_at: row.get(4)?,
        })
    }

    fn into_session(self) -> Result<TestSession> {
        let target = TargetRef::parse(&self.target_id, &self.target_type)?;
        let created_at = DateTime::parse_from_rfc3339(&self.created_at)
            .map_err(|e| {
                RegistryError::Storage(format!(
                    "session {}: bad created_at {:?}: {e}",
                    self.id, self.created_at
                ))
            })?
            .with_timezone(&Utc);
        Ok(TestSession {
            id: SessionId::new(self.id),
            target,
            name: self.name,
            created_at,
        })
    }
}

fn query_sessions(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<Vec<TestSession>> {
    let mut stmt = conn.prepare(sql).map_err(classify)?;
    let rows = stmt
        .query_map(params, SessionRow::from_row)
        .map_err(classify)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(classify)?;
    rows.into_iter().map(SessionRow::into_session).collect()
}

impl SessionStore for SqliteStore {
    /// The composite foreign key to `known_entities` is checked by the same
    /// statement that inserts, under the write lock, so a concurrent cascade
    /// either runs before (and the insert fails) or after (and removes it).
    fn create_session(&self, new: NewSession) -> Result<TestSession> {
        let session = TestSession {
            id: new.id,
            target: new.target,
            name: new.name,
            created_at: Utc::now(),
        };
        self.write(|tx| {
            tx.execute(
                "INSERT INTO test_sessions (id, target_id, target_type, name, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    session.id.as_str(),
                    session.target.target_id(),
                    session.target.target_type().as_str(),
                    session.name,
                    session.created_at.to_rfc3339(),
                ],
            )
            .map_err(|err| match constraint_of(&err) {
                Some(Constraint::Key) => RegistryError::DuplicateSession {
                    id: session.id.clone(),
                },
                Some(Constraint::ForeignKey) => RegistryError::UnknownEntity {
                    target: session.target.clone(),
                },
                _ => classify(err),
            })?;
            Ok(())
        })?;
        info!(
            session = %session.id,
            entity = %session.target,
            "session created"
        );
        Ok(session)
    }

    fn get_session(&self, id: &SessionId) -> Result<Option<TestSession>> {
        let row = self.read(|conn| {
            conn.query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM test_sessions WHERE id = ?1"),
                params![id.as_str()],
                SessionRow::from_row,
            )
            .optional()
            .map_err(classify)
        })?;
        row.map(SessionRow::into_session).transpose()
    }

    fn list_sessions(&self, target: &TargetRef) -> Result<Vec<TestSession>> {
        self.read(|conn| {
            query_sessions(
                conn,
                &format!(
                    "SELECT {SESSION_COLUMNS} FROM test_sessions
                     WHERE target_id = ?1 AND target_type = ?2
                     ORDER BY id"
                ),
                params![target.target_id(), target.target_type().as_str()],
            )
        })
    }

    fn delete_session(&self, id: &SessionId) -> Result<()> {
        let deleted = self.write(|tx| {
            tx.execute("DELETE FROM test_sessions WHERE id = ?1", params![id.as_str()])
                .map_err(classify)
        })?;
        if deleted == 0 {
            return Err(RegistryError::NotFound { id: id.clone() });
        }
        debug!(session = %id, "session deleted");
        Ok(())
    }

    fn delete_all_sessions(&self, target: &TargetRef) -> Result<usize> {
        let deleted = self.write(|tx| {
            tx.execute(
                "DELETE FROM test_sessions WHERE target_id = ?1 AND target_type = ?2",
                params![target.target_id(), target.target_type().as_str()],
            )
            .map_err(classify)
        })?;
        debug!(entity = %target, count = deleted, "sessions deleted for entity");
        Ok(deleted)
    }
}
