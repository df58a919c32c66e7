pub mod config;
pub mod error;
pub mod knowledge;
pub mod logging;
pub mod store;
pub mod types;

pub use config::BrainConfig;
pub use error::{BrainError, Result};
pub use knowledge::KnowledgeConfig;
pub use store::ConversationStore;
pub use types::*;
