//! Database schema migrations.
//!
//! Applies the initial schema: users, messages, and schema_migrations.

use rusqlite::Connection;
use tracing::info;

use agentbrain_core::error::BrainError;

/// Run all pending database migrations.
pub fn run_migrations(conn: &Connection) -> Result<(), BrainError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| BrainError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| BrainError::Storage(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: initial_schema");
    }

    Ok(())
}

/// Version 1: users and the append-only message log.
fn apply_v1(conn: &Connection) -> Result<(), BrainError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            name        TEXT NOT NULL,
            email       TEXT NOT NULL UNIQUE,
            handle      TEXT NOT NULL UNIQUE,
            created_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );

        -- AUTOINCREMENT keeps ids strictly increasing, which is the history order.
        CREATE TABLE IF NOT EXISTS messages (
            id          INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id     INTEGER NOT NULL REFERENCES users(id),
            role        TEXT NOT NULL
                        CHECK (role IN ('user', 'professor', 'agent')),
            content     TEXT NOT NULL,
            origin      TEXT NOT NULL DEFAULT 'generated'
                        CHECK (origin IN ('generated', 'sentinel', 'fallback')),
            created_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );

        CREATE INDEX IF NOT EXISTS idx_messages_user
            ON messages (user_id, id);

        INSERT INTO schema_migrations (version, name) VALUES (1, 'initial_schema');
        ",
    )
    .map_err(|e| BrainError::Storage(format!("Migration v1 failed: {}", e)))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        run_migrations(&conn).unwrap();

        let versions: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| row.get(0))
            .unwrap();
        assert_eq!(versions, 1);
    }

    #[test]
    fn test_role_check_constraint() {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn.execute(
            "INSERT INTO users (name, email, handle) VALUES ('a', 'a@x', 'a')",
            [],
        )
        .unwrap();

        let bad = conn.execute(
            "INSERT INTO messages (user_id, role, content) VALUES (1, 'gpt', 'x')",
            [],
        );
        assert!(bad.is_err());
    }
}
