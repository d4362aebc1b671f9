//! Shared terminal session core.
//!
//! Drives one interactive shell on behalf of any number of remote
//! observers, streams its output to all of them in real time, and infers
//! (without cooperation from the shell) when each submitted command has
//! finished, so command/output pairs can be recorded as discrete history
//! entries.
//!
//! # Components
//!
//! - [`pty`]: PTY-backed shell process: write, resize, terminate, and a
//!   lazy unbounded stream of output chunks plus an exit notice.
//! - [`detector`]: completion heuristic: escape-stripped last line
//!   matched against idle-prompt suffixes, behind a pluggable strategy.
//! - [`session`]: the session manager: owns the shell, the history, and
//!   the in-flight record; serializes lifecycle operations against
//!   asynchronously arriving chunks under one lock.
//! - [`broadcast`]: event fan-out to observers in generation order.
//! - [`events`] / [`history`]: the event and record data model.
//! - [`config`]: JSON configuration with sensible defaults.
//!
//! Transports (HTTP, sockets) live outside this crate: they call
//! [`Session`] operations and forward [`SessionEvent`]s to their
//! clients.

pub mod broadcast;
pub mod config;
pub mod detector;
pub mod events;
pub mod history;
pub mod pty;
pub mod session;

pub use broadcast::Broadcaster;
pub use config::Config;
pub use detector::{CompletionStrategy, PromptSuffix};
pub use events::SessionEvent;
pub use history::{CommandRecord, COMMAND_END_SENTINEL};
pub use pty::{PtyNotice, PtyProcess};
pub use session::{ExecuteAck, ObserverHandle, Session};
