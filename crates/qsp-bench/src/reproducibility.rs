//! Run metadata persisted next to every result table.
//!
//! Captures what is needed to rerun a sweep: the tool version, the exact
//! command line and a unique run id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity and provenance of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    /// Unique id shared by every file of this run.
    pub run_id: String,
    /// Run start, UTC.
    pub started_at: DateTime<Utc>,
    /// Harness version.
    pub tool_version: String,
    /// Command line the run was started with.
    pub cli_args: Vec<String>,
}

impl RunMetadata {
    /// Capture metadata for a run starting now.
    pub fn capture(cli_args: &[String]) -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            tool_version: env!("CARGO_PKG_VERSION").to_string(),
            cli_args: cli_args.to_vec(),
        }
    }
}
