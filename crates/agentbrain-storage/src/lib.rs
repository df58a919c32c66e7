//! AgentBrain storage crate - SQLite persistence for users and messages.
//!
//! Provides a WAL-mode SQLite database with migrations, a get-or-create
//! user repository, and the message repository backing `ConversationStore`.

pub mod db;
pub mod migrations;
pub mod repository;

pub use db::Database;
pub use repository::{MessageRepository, UserRepository};
