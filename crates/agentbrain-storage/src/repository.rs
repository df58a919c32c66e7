//! Repository implementations for SQLite-backed persistence.
//!
//! `UserRepository` registers users; `MessageRepository` is the
//! append-only conversation log behind `ConversationStore`.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::OptionalExtension;
use tracing::debug;

use agentbrain_core::error::BrainError;
use agentbrain_core::store::ConversationStore;
use agentbrain_core::types::{Message, MessageId, MessageOrigin, NewMessage, Role, Scope, User, UserId};

use crate::db::Database;

/// Repository for registered users.
pub struct UserRepository {
    db: Arc<Database>,
}

impl UserRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Return the id of the user matching `email` OR `handle`, creating the
    /// user if neither is known.
    ///
    /// An existing user is returned unchanged; a differing `name` is ignored.
    pub fn get_or_create(&self, name: &str, email: &str, handle: &str) -> Result<UserId, BrainError> {
        self.db.with_conn(|conn| {
            let existing: Option<i64> = conn
                .query_row(
                    "SELECT id FROM users WHERE email = ?1 OR handle = ?2 ORDER BY id LIMIT 1",
                    rusqlite::params![email, handle],
                    |row| row.get(0),
                )
                .optional()
                .map_err(|e| BrainError::Storage(format!("Failed to look up user: {}", e)))?;

            if let Some(id) = existing {
                debug!(user_id = id, "Existing user found");
                return Ok(UserId(id));
            }

            conn.execute(
                "INSERT INTO users (name, email, handle, created_at) VALUES (?1, ?2, ?3, ?4)",
                rusqlite::params![name, email, handle, Utc::now().timestamp()],
            )
            .map_err(|e| BrainError::Storage(format!("Failed to create user: {}", e)))?;

            let id = conn.last_insert_rowid();
            debug!(user_id = id, "User created");
            Ok(UserId(id))
        })
    }

    /// Find a user by id.
    pub fn find_by_id(&self, id: UserId) -> Result<Option<User>, BrainError> {
        self.db.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, name, email, handle, created_at FROM users WHERE id = ?1",
                    rusqlite::params![id.0],
                    |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, i64>(4)?,
                        ))
                    },
                )
                .optional()
                .map_err(|e| BrainError::Storage(e.to_string()))?;

            Ok(row.map(|(id, name, email, handle, created_at)| User {
                id: UserId(id),
                name,
                email,
                handle,
                created_at: epoch_to_utc(created_at),
            }))
        })
    }

    /// Count registered users.
    pub fn count(&self) -> Result<u64, BrainError> {
        self.db.with_conn(|conn| {
            let count: i64 = conn
                .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
                .map_err(|e| BrainError::Storage(e.to_string()))?;
            Ok(count as u64)
        })
    }
}

/// Append-only message log ordered by sequence id.
pub struct MessageRepository {
    db: Arc<Database>,
}

impl MessageRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }
}

impl ConversationStore for MessageRepository {
    fn append(&self, message: &NewMessage) -> Result<MessageId, BrainError> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (user_id, role, content, origin, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    message.user_id.0,
                    message.role.as_str(),
                    message.content,
                    message.origin.as_str(),
                    Utc::now().timestamp(),
                ],
            )
            .map_err(|e| BrainError::Storage(format!("Failed to store message: {}", e)))?;
            Ok(MessageId(conn.last_insert_rowid()))
        })
    }

    fn read(&self, scope: Scope, limit: Option<usize>) -> Result<Vec<Message>, BrainError> {
        // Newest-first with LIMIT, reversed below; LIMIT -1 means unbounded.
        let limit = limit.map(|l| l as i64).unwrap_or(-1);

        self.db.with_conn(|conn| {
            let mut messages = match scope {
                Scope::User(user_id) => {
                    let mut stmt = conn
                        .prepare(
                            "SELECT id, user_id, role, content, origin, created_at
                             FROM messages WHERE user_id = ?1
                             ORDER BY id DESC LIMIT ?2",
                        )
                        .map_err(|e| BrainError::Storage(e.to_string()))?;
                    let rows = stmt
                        .query_map(rusqlite::params![user_id.0, limit], |row| {
                            Ok(row_to_message(row))
                        })
                        .map_err(|e| BrainError::Storage(e.to_string()))?;
                    collect_rows(rows)?
                }
                Scope::Global => {
                    let mut stmt = conn
                        .prepare(
                            "SELECT id, user_id, role, content, origin, created_at
                             FROM messages ORDER BY id DESC LIMIT ?1",
                        )
                        .map_err(|e| BrainError::Storage(e.to_string()))?;
                    let rows = stmt
                        .query_map(rusqlite::params![limit], |row| Ok(row_to_message(row)))
                        .map_err(|e| BrainError::Storage(e.to_string()))?;
                    collect_rows(rows)?
                }
            };
            messages.reverse();
            Ok(messages)
        })
    }
}

fn collect_rows<I>(rows: I) -> Result<Vec<Message>, BrainError>
where
    I: Iterator<Item = rusqlite::Result<Result<Message, BrainError>>>,
{
    let mut messages = Vec::new();
    for row in rows {
        let message = row.map_err(|e| BrainError::Storage(e.to_string()))??;
        messages.push(message);
    }
    Ok(messages)
}

fn row_to_message(row: &rusqlite::Row<'_>) -> Result<Message, BrainError> {
    let id: i64 = row.get(0).map_err(|e| BrainError::Storage(e.to_string()))?;
    let user_id: i64 = row.get(1).map_err(|e| BrainError::Storage(e.to_string()))?;
    let role: String = row.get(2).map_err(|e| BrainError::Storage(e.to_string()))?;
    let content: String = row.get(3).map_err(|e| BrainError::Storage(e.to_string()))?;
    let origin: String = row.get(4).map_err(|e| BrainError::Storage(e.to_string()))?;
    let created_at: i64 = row.get(5).map_err(|e| BrainError::Storage(e.to_string()))?;

    Ok(Message {
        id: MessageId(id),
        user_id: UserId(user_id),
        role: role.parse::<Role>().map_err(BrainError::Storage)?,
        content,
        origin: origin.parse::<MessageOrigin>().map_err(BrainError::Storage)?,
        created_at: epoch_to_utc(created_at),
    })
}

fn epoch_to_utc(epoch: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(epoch, 0).single().unwrap_or_default()
}
