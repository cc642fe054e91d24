//! Core domain types shared by the gate, the ledger and the orchestrator.

pub mod ids;

pub use ids::{ContentHash, EventId, InvalidDigest, SHA256_HEX_LEN, Sha};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Whether the shared substrates (remote marker refs, remote ledger branch)
/// are used, or everything stays on the local filesystem.
///
/// Injected by the orchestrator; components never inspect the environment to
/// decide this themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Shared substrates first, local filesystem as fallback.
    #[default]
    Shared,
    /// Local filesystem only (local runs and tests).
    LocalOnly,
}

impl ExecutionMode {
    pub fn is_shared(&self) -> bool {
        matches!(self, ExecutionMode::Shared)
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Shared => write!(f, "shared"),
            ExecutionMode::LocalOnly => write!(f, "local"),
        }
    }
}

impl FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "shared" => Ok(ExecutionMode::Shared),
            "local" | "local-only" | "local_only" => Ok(ExecutionMode::LocalOnly),
            other => Err(format!("unknown execution mode: {other}")),
        }
    }
}
