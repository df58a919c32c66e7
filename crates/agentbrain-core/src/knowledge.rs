//! Static domain facts that ground the primary responder.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{BrainError, Result};

/// Read-only knowledge record about the office, loaded once at startup.
///
/// The on-disk JSON keeps the Portuguese field names of the data file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeConfig {
    #[serde(rename = "nome")]
    pub name: String,
    #[serde(rename = "endereco")]
    pub address: String,
    #[serde(rename = "historia")]
    pub history: String,
    #[serde(rename = "nossos_valores", default)]
    pub values: Vec<String>,
    #[serde(rename = "especialidades", default)]
    pub specialties: Vec<String>,
    #[serde(rename = "funcionarios", default)]
    pub staff: Vec<String>,
}

impl KnowledgeConfig {
    /// Load the knowledge record from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            BrainError::Config(format!(
                "cannot read knowledge file {}: {}",
                path.display(),
                e
            ))
        })?;
        let knowledge: KnowledgeConfig = serde_json::from_str(&content).map_err(|e| {
            BrainError::Config(format!(
                "invalid knowledge file {}: {}",
                path.display(),
                e
            ))
        })?;
        info!(
            path = %path.display(),
            name = %knowledge.name,
            staff = knowledge.staff.len(),
            "Knowledge config loaded"
        );
        Ok(knowledge)
    }
}
