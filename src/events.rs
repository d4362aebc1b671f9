//! Session events for pub/sub broadcasting.
//!
//! Every output chunk and lifecycle change the session produces is
//! expressed as a [`SessionEvent`] and fanned out via a
//! `tokio::sync::broadcast` channel. The session emits without knowing
//! who is subscribed; each observer receives events independently through
//! its own receiver, in generation order.
//!
//! Events serialize with the wire names transports expect:
//! `session-established`, `output`, `process-exited`, `command-completed`.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Events broadcast by the terminal session to attached observers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "kebab-case")]
pub enum SessionEvent {
    /// Greeting delivered to a newly attached observer.
    #[serde(rename_all = "camelCase")]
    SessionEstablished {
        /// Human-readable connection message.
        message: String,
        /// Identifier assigned to the attaching observer.
        session_id: String,
    },

    /// Raw text chunk from the shell, verbatim.
    ///
    /// No framing beyond UTF-8 text boundaries: a chunk may split a
    /// line, a prompt, or an escape sequence.
    Output(String),

    /// The shell process exited. The session holds no live process
    /// afterwards; a new one must be spawned.
    #[serde(rename_all = "camelCase")]
    ProcessExited {
        /// Exit code if available (`None` if killed by signal).
        exit_code: Option<i32>,
    },

    /// A tracked command was finalized by the completion detector.
    #[serde(rename_all = "camelCase")]
    CommandCompleted {
        /// The command text as submitted.
        command: String,
        /// When the command was submitted.
        submitted_at: DateTime<Utc>,
        /// Byte length of the stored output, sentinel included.
        output_length: usize,
    },
}

impl SessionEvent {
    /// Create an output event from a text chunk.
    #[must_use]
    pub fn output(chunk: impl Into<String>) -> Self {
        Self::Output(chunk.into())
    }

    /// Create a process exited event.
    #[must_use]
    pub fn process_exited(exit_code: Option<i32>) -> Self {
        Self::ProcessExited { exit_code }
    }

    /// Check if this is an output event.
    #[must_use]
    pub fn is_output(&self) -> bool {
        matches!(self, Self::Output(_))
    }

    /// Check if this is a process exit event.
    #[must_use]
    pub fn is_process_exited(&self) -> bool {
        matches!(self, Self::ProcessExited { .. })
    }

    /// Check if this is a command completion event.
    #[must_use]
    pub fn is_command_completed(&self) -> bool {
        matches!(self, Self::CommandCompleted { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_event_creation() {
        let event = SessionEvent::output("hello");
        assert!(event.is_output());
        match event {
            SessionEvent::Output(chunk) => assert_eq!(chunk, "hello"),
            _ => panic!("Expected Output variant"),
        }
    }

    #[test]
    fn test_process_exited_event_creation() {
        let event = SessionEvent::process_exited(Some(0));
        assert!(event.is_process_exited());
        match event {
            SessionEvent::ProcessExited { exit_code } => assert_eq!(exit_code, Some(0)),
            _ => panic!("Expected ProcessExited variant"),
        }
    }

    #[test]
    fn test_event_predicates_are_exclusive() {
        let output = SessionEvent::output("x");
        assert!(output.is_output());
        assert!(!output.is_process_exited());
        assert!(!output.is_command_completed());

        let exited = SessionEvent::process_exited(None);
        assert!(!exited.is_output());
        assert!(exited.is_process_exited());
    }

    #[test]
    fn test_wire_names() {
        let json = serde_json::to_value(SessionEvent::output("chunk")).unwrap();
        assert_eq!(json["event"], "output");
        assert_eq!(json["data"], "chunk");

        let json = serde_json::to_value(SessionEvent::process_exited(Some(1))).unwrap();
        assert_eq!(json["event"], "process-exited");
        assert_eq!(json["data"]["exitCode"], 1);

        let json = serde_json::to_value(SessionEvent::SessionEstablished {
            message: "Connected to terminal session".to_string(),
            session_id: "abc".to_string(),
        })
        .unwrap();
        assert_eq!(json["event"], "session-established");
        assert_eq!(json["data"]["sessionId"], "abc");
    }

    #[test]
    fn test_command_completed_payload_fields() {
        let event = SessionEvent::CommandCompleted {
            command: "ls".to_string(),
            submitted_at: Utc::now(),
            output_length: 42,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "command-completed");
        assert_eq!(json["data"]["command"], "ls");
        assert_eq!(json["data"]["outputLength"], 42);
        assert!(json["data"].get("submittedAt").is_some());
    }
}
