use rusqlite::Transaction;

use super::Migration;

// One generated column per target type. Exactly one is non-null per row,
// so at most one foreign key is live for any entity.
const KNOWN_ENTITIES_TABLE: &str = "
CREATE TABLE known_entities (
    target_id   TEXT NOT NULL,
    target_type TEXT NOT NULL CHECK (target_type IN ('bot', 'user')),

    _bot_fk  TEXT GENERATED ALWAYS AS (
        CASE WHEN target_type = 'bot' THEN target_id END
    ) STORED,
    _user_fk TEXT GENERATED ALWAYS AS (
        CASE WHEN target_type = 'user' THEN target_id END
    ) STORED,

    PRIMARY KEY (target_id, target_type),

    CONSTRAINT fk_known_bots
        FOREIGN KEY (_bot_fk) REFERENCES bots(bot_id)
        ON DELETE CASCADE,
    CONSTRAINT fk_known_users
        FOREIGN KEY (_user_fk) REFERENCES users(user_id)
        ON DELETE CASCADE
);
CREATE INDEX idx_known_entities_bot_fk ON known_entities(_bot_fk);
CREATE INDEX idx_known_entities_user_fk ON known_entities(_user_fk);
";

fn up(tx: &Transaction<'_>) -> rusqlite::Result<()> {
    tx.execute_batch(KNOWN_ENTITIES_TABLE)
}

pub const MIGRATION: Migration = Migration {
    id: "add_known_entities",
    description: "Add known_entities with per-type discriminated foreign keys",
    up,
};
