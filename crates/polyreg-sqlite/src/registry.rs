use rusqlite::params;
use tracing::{debug, info, warn};

use polyreg_core::{CascadeReport, EntityRegistry, KnownEntity, RegistryError, Result, TargetRef};

use crate::error::{Constraint, classify, constraint_of};
use crate::store::{SqliteStore, backing_exists_in, entity_exists_in, session_ids_for};

impl EntityRegistry for SqliteStore {
    /// The insert alone enforces every precondition: the primary key rejects
    /// duplicates, the live discriminator foreign key rejects a missing
    /// backing record, and the CHECK rejects unknown tags.
    fn register(&self, target: &TargetRef) -> Result<KnownEntity> {
        debug!(entity = %target, "registering entity");
        self.write(|tx| {
            tx.execute(
                "INSERT INTO known_entities (target_id, target_type) VALUES (?1, ?2)",
                params![target.target_id(), target.target_type().as_str()],
            )
            .map_err(|err| match constraint_of(&err) {
                Some(Constraint::Key) => RegistryError::DuplicateEntity {
                    target: target.clone(),
                },
                Some(Constraint::ForeignKey) => RegistryError::UnknownBackingRecord {
                    target: target.clone(),
                },
                Some(Constraint::Check) => RegistryError::InvalidTargetType {
                    tag: target.target_type().as_str().to_owned(),
                },
                _ => classify(err),
            })?;
            Ok(())
        })?;
        info!(
            target_type = target.target_type().as_str(),
            target_id = target.target_id(),
            "entity registered"
        );
        Ok(KnownEntity::new(target.clone()))
    }

    fn lookup(&self, target: &TargetRef) -> Result<Option<KnownEntity>> {
        let found = self.read(|conn| entity_exists_in(conn, target))?;
        Ok(found.then(|| KnownEntity::new(target.clone())))
    }

    fn on_backing_record_deleted(&self, target: &TargetRef) -> Result<CascadeReport> {
        let report = self.write(|tx| {
            if backing_exists_in(tx, target)? {
                warn!(entity = %target, "deletion hook called while backing record still exists");
            }
            let mut report = CascadeReport::empty(target.clone());
            report.sessions_removed = session_ids_for(tx, target)?;
            let deleted = tx
                .execute(
                    "DELETE FROM known_entities WHERE target_id = ?1 AND target_type = ?2",
                    params![target.target_id(), target.target_type().as_str()],
                )
                .map_err(classify)?;
            report.entity_removed = deleted > 0;
            Ok(report)
        })?;

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
        let rows: Vec<(String, String)> = self.read(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT target_id, target_type FROM known_entities
                     ORDER BY target_type, target_id",
                )
                .map_err(classify)?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
                .map_err(classify)?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(classify)?;
            Ok(rows)
        })?;

        rows.iter()
            .map(|(id, tag)| TargetRef::parse(id, tag).map(KnownEntity::new))
            .collect()
    }
}
