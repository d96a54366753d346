//! Typed events emitted while an action runs.
//!
//! On the wire each event is one compact JSON object per line
//! (`application/x-ndjson`), discriminated by `type` and carrying a
//! `timestamp`:
//!
//! ```text
//! {"timestamp":"…","type":"action_start","slug":"fmt","title":"Format Rust workspace",…}
//! {"timestamp":"…","type":"command_start","slug":"fmt","command_index":0,"command":"cargo fmt --all",…}
//! {"timestamp":"…","type":"command_output","slug":"fmt","command_index":0,"line":"Formatting crates/state"}
//! {"timestamp":"…","type":"command_end","slug":"fmt","command_index":0,"status":"success","exit_code":0,"duration":0.42}
//! {"timestamp":"…","type":"action_complete","slug":"fmt","duration":0.43}
//! ```

use crate::types::CommandStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ExecutionEvent {
    ActionStart {
        slug: String,
        title: String,
        description: String,
        command_count: usize,
    },
    CommandStart {
        slug: String,
        command_index: usize,
        command: String,
        argv: Vec<String>,
        cwd: String,
    },
    CommandOutput {
        slug: String,
        command_index: usize,
        line: String,
    },
    CommandEnd {
        slug: String,
        command_index: usize,
        status: CommandStatus,
        exit_code: i32,
        duration: f64,
    },
    ActionComplete {
        slug: String,
        duration: f64,
    },
    ActionError {
        slug: String,
        command_index: usize,
        exit_code: i32,
        duration: f64,
    },
}

impl ExecutionEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ExecutionEvent::ActionStart { .. } => "action_start",
            ExecutionEvent::CommandStart { .. } => "command_start",
            ExecutionEvent::CommandOutput { .. } => "command_output",
            ExecutionEvent::CommandEnd { .. } => "command_end",
            ExecutionEvent::ActionComplete { .. } => "action_complete",
            ExecutionEvent::ActionError { .. } => "action_error",
        }
    }

    /// `action_complete` and `action_error` close a run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionEvent::ActionComplete { .. } | ExecutionEvent::ActionError { .. }
        )
    }
}

/// An [`ExecutionEvent`] stamped with the wall-clock time it was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub event: ExecutionEvent,
}

impl EventRecord {
    pub fn now(event: ExecutionEvent) -> Self {
        Self {
            timestamp: Utc::now(),
            event,
        }
    }

    /// Serialise as one NDJSON line (compact JSON terminated by `\n`).
    pub fn to_ndjson_line(&self) -> serde_json::Result<String> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

/// Elapsed seconds rounded to millisecond precision.
pub fn rounded_secs(elapsed: Duration) -> f64 {
    (elapsed.as_secs_f64() * 1000.0).round() / 1000.0
}
