//! Command history records.
//!
//! Each tracked command becomes a [`CommandRecord`] the moment it is
//! submitted. The record's output grows append-only while the command is
//! in flight and is sealed by `finalize()`, which also appends the
//! [`COMMAND_END_SENTINEL`] so downstream consumers can tell where the
//! tracked output stops. History is an ordered, append-only sequence of
//! these records; only a bulk clear removes them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Literal token appended to a record's output (and broadcast as its own
/// chunk) when the command finalizes. Consumers must strip this exact
/// token before treating the text as shell output.
pub const COMMAND_END_SENTINEL: &str = "\n[COMMAND_END]\n";

/// One submitted command and everything the shell printed while it ran.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRecord {
    /// Submitted command text, verbatim.
    pub command: String,
    /// Accumulated output. Append-only while in flight; after
    /// finalization it ends with [`COMMAND_END_SENTINEL`] and never
    /// grows again.
    pub output: String,
    /// Submission time.
    pub submitted_at: DateTime<Utc>,
    /// Whether the completion detector has sealed this record.
    pub completed: bool,
}

impl CommandRecord {
    /// Open a new in-flight record for a just-submitted command.
    #[must_use]
    pub fn open(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            output: String::new(),
            submitted_at: Utc::now(),
            completed: false,
        }
    }

    /// Append an output chunk. No-op once the record is completed.
    pub fn append_output(&mut self, chunk: &str) {
        if self.completed {
            log::warn!(
                "Dropping chunk for already-finalized command {:?}",
                self.command
            );
            return;
        }
        self.output.push_str(chunk);
    }

    /// Seal the record: flip `completed` and append the sentinel.
    ///
    /// Returns `false` if the record was already completed, so callers
    /// can guarantee at-most-once finalization side effects.
    pub fn finalize(&mut self) -> bool {
        if self.completed {
            return false;
        }
        self.completed = true;
        self.output.push_str(COMMAND_END_SENTINEL);
        true
    }
}
