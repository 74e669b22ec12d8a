use rusqlite::{Connection, TransactionBehavior};
use tracing::info;

use crate::Result;

/// Highest schema version this build knows about.
pub const SCHEMA_VERSION: i64 = 2;

pub fn run(conn: &mut Connection) -> Result<()> {
    // IMMEDIATE so two handles opening a fresh file don't both run v1.
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    tx.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 =
        tx.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))?;

    if version < 1 {
        info!("Running migration v1 (initial schema)");
        tx.execute_batch(
            "
            CREATE TABLE users (
                email       TEXT PRIMARY KEY,
                verified    INTEGER NOT NULL DEFAULT 0,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE pending_registrations (
                email       TEXT PRIMARY KEY,
                token       TEXT NOT NULL,
                created_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE citizens (
                id              INTEGER PRIMARY KEY,
                email           TEXT NOT NULL UNIQUE REFERENCES users(email),
                full_name       TEXT NOT NULL,
                date_of_birth   TEXT NOT NULL,
                id_number       TEXT NOT NULL UNIQUE,
                theme           TEXT NOT NULL DEFAULT 'light'
                                CHECK (theme IN ('light', 'dark')),
                created_at      TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE id_counter (
                id          INTEGER PRIMARY KEY CHECK (id = 1),
                last_id     INTEGER NOT NULL DEFAULT 0
            );

            -- Single counter row, seeded once
            INSERT INTO id_counter (id, last_id) VALUES (1, 0);

            CREATE TABLE sessions (
                id          TEXT PRIMARY KEY,
                email       TEXT NOT NULL REFERENCES users(email),
                stage       TEXT NOT NULL,
                created_at  TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at  TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE INDEX idx_sessions_email ON sessions(email, stage);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    if version < 2 {
        info!("Running migration v2 (session expiry)");
        // Rows from before v2 have no known expiry and start out expired.
        tx.execute_batch(
            "
            ALTER TABLE sessions
                ADD COLUMN expires_at TEXT NOT NULL DEFAULT '1970-01-01 00:00:00';

            CREATE INDEX idx_sessions_expires ON sessions(expires_at);

            INSERT INTO schema_version (version) VALUES (2);
            ",
        )?;
    }

    tx.commit()?;
    info!("Database migrations complete");
    Ok(())
}
