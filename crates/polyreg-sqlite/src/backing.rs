//! The backing tables as a delete entry point, plus the integrity audit.

use rusqlite::params;
use tracing::{debug, info};

use polyreg_core::{
    BackingStore, CascadeReport, IntegrityViolation, RegistryStore, Result, SessionId, TargetRef,
};

use crate::error::classify;
use crate::store::{SqliteStore, backing_exists_in, backing_sql, entity_exists_in, session_ids_for};

impl BackingStore for SqliteStore {
    fn insert_backing(&self, target: &TargetRef) -> Result<()> {
        let inserted = self.write(|tx| {
            tx.execute(
                backing_sql(target.target_type()).insert,
                params![target.target_id()],
            )
            .map_err(classify)
        })?;
        if inserted > 0 {
            debug!(entity = %target, "backing record inserted");
        }
        Ok(())
    }

    /// Deleting the backing row is all it takes: the engine removes the
    /// entity through its discriminator foreign key and the sessions through
    /// theirs. The report is read under the same write lock beforehand.
    fn delete_backing(&self, target: &TargetRef) -> Result<CascadeReport> {
        let report = self.write(|tx| {
            let entity_present = entity_exists_in(tx, target)?;
            let sessions = session_ids_for(tx, target)?;
            let deleted = tx
                .execute(
                    backing_sql(target.target_type()).delete,
                    params![target.target_id()],
                )
                .map_err(classify)?;
            if deleted == 0 {
                return Ok(CascadeReport::empty(target.clone()));
            }
            Ok(CascadeReport {
                target: target.clone(),
                backing_removed: true,
                entity_removed: entity_present,
                sessions_removed: sessions,
            })
        })?;

        if report.backing_removed {
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
        self.read(|conn| backing_exists_in(conn, target))
    }
}

const ORPHAN_ENTITIES: &str = "
SELECT k.target_id, k.target_type FROM known_entities k
WHERE (k.target_type = 'bot'
       AND NOT EXISTS (SELECT 1 FROM bots b WHERE b.bot_id = k.target_id))
   OR (k.target_type = 'user'
       AND NOT EXISTS (SELECT 1 FROM users u WHERE u.user_id = k.target_id))
ORDER BY k.target_type, k.target_id";

const ORPHAN_SESSIONS: &str = "
SELECT s.id, s.target_id, s.target_type FROM test_sessions s
LEFT JOIN known_entities k
       ON k.target_id = s.target_id AND k.target_type = s.target_type
WHERE k.target_id IS NULL
ORDER BY s.id";

impl RegistryStore for SqliteStore {
    fn verify_integrity(&self) -> Result<Vec<IntegrityViolation>> {
        let (entities, sessions) = self.read(|conn| {
            let mut stmt = conn.prepare(ORPHAN_ENTITIES).map_err(classify)?;
            let entities = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
                .map_err(classify)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(classify)?;

            let mut stmt = conn.prepare(ORPHAN_SESSIONS).map_err(classify)?;
            let sessions = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                })
                .map_err(classify)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(classify)?;
            Ok((entities, sessions))
        })?;

        let mut violations = Vec::with_capacity(entities.len() + sessions.len());
        for (id, tag) in entities {
            violations.push(IntegrityViolation::OrphanEntity {
                target: TargetRef::parse(&id, &tag)?,
            });
        }
        for (session, id, tag) in sessions {
            violations.push(IntegrityViolation::OrphanSession {
                session: SessionId::new(session),
                target: TargetRef::parse(&id, &tag)?,
            });
        }
        Ok(violations)
    }
}
