use rusqlite::Transaction;

use super::Migration;

const TEST_SESSIONS_TABLE: &str = "
CREATE TABLE test_sessions (
    id          TEXT PRIMARY KEY NOT NULL,
    target_id   TEXT NOT NULL,
    target_type TEXT NOT NULL,
    name        TEXT,
    created_at  TEXT NOT NULL,

    CONSTRAINT fk_sessions_known_entity
        FOREIGN KEY (target_id, target_type)
        REFERENCES known_entities(target_id, target_type)
        ON DELETE CASCADE
);
CREATE INDEX idx_test_sessions_target ON test_sessions(target_id, target_type);
";

fn up(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    tx.execute_batch(TEST_SESSIONS_TABLE)
}

pub const MIGRATION: Migration = Migration {
    id: "add_test_sessions",
    description: "Add test_sessions owned by known_entities",
    up,
};
