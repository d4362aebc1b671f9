//! Shared terminal session management.
//!
//! One live shell, many observers. The [`Session`] owns the single
//! [`PtyProcess`], the command history, and the in-flight record pointer,
//! and serializes every lifecycle operation (initialize, execute, resize,
//! clear, destroy) against asynchronously arriving output chunks.
//!
//! # Architecture
//!
//! ```text
//! Session (cheaply cloneable, all shared state behind one Mutex)
//!  ├── state: Mutex<SessionState>     (pty, history, in-flight pointer, accumulator)
//!  ├── broadcaster: Broadcaster       (SessionEvent fan-out to observers)
//!  └── strategy: Arc<dyn CompletionStrategy>
//! ```
//!
//! A tokio pump task drains the PTY notice channel and processes chunks
//! strictly one at a time: append to the in-flight record, run the
//! completion detector, broadcast the chunk verbatim. When the detector
//! fires, the record is sealed, the sentinel is appended and broadcast as
//! its own chunk, and a `command-completed` notification follows. All of
//! that is decided under the same lock, so the sentinel and the
//! notification can never disagree about which command finished.
//!
//! # Shared terminal semantics
//!
//! Input submitted via [`execute_command`](Session::execute_command) is
//! tracked in history; raw keystrokes via
//! [`write_input`](Session::write_input) go straight to the shell and are
//! visible to every observer but produce no record. All observers see the
//! same live shell.
//!
//! # Overlapping submissions
//!
//! Submitting a command while another is still in flight overwrites the
//! in-flight pointer: the earlier record stays in history, unfinalized,
//! and subsequent output is attributed to the new record. This mirrors
//! the original system's behavior and is logged as a warning rather than
//! rejected.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use uuid::Uuid;

use crate::broadcast::Broadcaster;
use crate::config::Config;
use crate::detector::{output_ends_at_prompt, CompletionStrategy, PromptSuffix};
use crate::events::SessionEvent;
use crate::history::{CommandRecord, COMMAND_END_SENTINEL};
use crate::pty::{resolve_shell, PtyNotice, PtyProcess};

/// Terminal type advertised to the spawned shell.
const TERM_NAME: &str = "xterm-color";

/// Immediate acknowledgment for a tracked command submission.
///
/// Confirms the command was written to the shell, not that it
/// completed. Completion arrives later as a `command-completed` event.
#[derive(Debug, Clone, Serialize)]
pub struct ExecuteAck {
    pub success: bool,
    pub message: String,
    pub command: String,
}

/// Everything needed to emit a `command-completed` notification.
struct CompletionInfo {
    command: String,
    submitted_at: DateTime<Utc>,
    output_length: usize,
}

/// All mutable session state, guarded by a single mutex.
///
/// Every mutation, whether from a lifecycle operation or the chunk pump,
/// goes through this struct under the lock, so a chunk arriving
/// mid-`execute_command` can never observe a half-updated in-flight
/// pointer.
struct SessionState {
    /// The live shell, if one has been spawned and has not exited.
    pty: Option<PtyProcess>,
    /// Ordered history; insertion order equals submission order.
    history: Vec<CommandRecord>,
    /// Index of the single unfinalized record, if any.
    current: Option<usize>,
    /// Raw output accumulated since the last submission.
    accumulator: String,
    /// Most recently submitted command text.
    last_command: String,
}

impl SessionState {
    fn new() -> Self {
        Self {
            pty: None,
            history: Vec::new(),
            current: None,
            accumulator: String::new(),
            last_command: String::new(),
        }
    }

    /// Open a new in-flight record for a submitted command.
    fn open_record(&mut self, command: &str) {
        if let Some(index) = self.current {
            log::warn!(
                "Command {:?} submitted while {:?} is still in flight; the earlier record is abandoned unfinalized",
                command,
                self.history[index].command
            );
        }
        self.history.push(CommandRecord::open(command));
        self.current = Some(self.history.len() - 1);
        self.accumulator.clear();
        self.last_command = command.to_string();
    }

    /// Append a chunk, run the detector, and finalize on a prompt match.
    ///
    /// Returns the completion payload when this chunk sealed the
    /// in-flight record. Chunks arriving with no record in flight only
    /// feed the accumulator.
    fn absorb_chunk(
        &mut self,
        chunk: &str,
        strategy: &dyn CompletionStrategy,
    ) -> Option<CompletionInfo> {
        self.accumulator.push_str(chunk);

        let index = self.current?;
        let record = &mut self.history[index];
        record.append_output(chunk);

        if !output_ends_at_prompt(strategy, &record.output) {
            return None;
        }

        if !record.finalize() {
            return None;
        }
        self.current = None;
        Some(CompletionInfo {
            command: record.command.clone(),
            submitted_at: record.submitted_at,
            output_length: record.output.len(),
        })
    }

    /// Drop all history and the in-flight pointer.
    ///
    /// The shell is not notified; output from a still-running cleared
    /// command arrives with no record to land in and is lost.
    fn clear(&mut self) {
        log::info!("Clearing command history ({} records)", self.history.len());
        self.history.clear();
        self.current = None;
        self.accumulator.clear();
        self.last_command.clear();
    }
}

/// Observer attachment to the shared session.
///
/// Holds only a subscription, never shell state. Dropping the handle
/// detaches the observer.
pub struct ObserverHandle {
    session_id: Uuid,
    events: broadcast::Receiver<SessionEvent>,
}

impl ObserverHandle {
    /// Identifier assigned to this observer.
    #[must_use]
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// The per-observer `session-established` greeting.
    ///
    /// Delivered to this observer only; it is not part of the broadcast
    /// stream other observers see.
    #[must_use]
    pub fn greeting(&self) -> SessionEvent {
        SessionEvent::SessionEstablished {
            message: "Connected to terminal session".to_string(),
            session_id: self.session_id.to_string(),
        }
    }

    /// Receive the next broadcast event.
    ///
    /// # Errors
    ///
    /// Returns `RecvError::Lagged` when this observer fell behind the
    /// channel capacity, `RecvError::Closed` when the session is gone.
    pub async fn recv(&mut self) -> Result<SessionEvent, broadcast::error::RecvError> {
        self.events.recv().await
    }

    /// Non-blocking receive, mainly for tests and polling transports.
    ///
    /// # Errors
    ///
    /// Returns `TryRecvError::Empty` when no event is pending.
    pub fn try_recv(&mut self) -> Result<SessionEvent, broadcast::error::TryRecvError> {
        self.events.try_recv()
    }
}

/// The shared terminal session manager.
///
/// Cheaply cloneable; clones share the same shell, history, and
/// broadcast channel.
#[derive(Clone)]
pub struct Session {
    state: Arc<Mutex<SessionState>>,
    broadcaster: Broadcaster,
    strategy: Arc<dyn CompletionStrategy>,
    config: Config,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().expect("session state lock poisoned");
        f.debug_struct("Session")
            .field("has_pty", &state.pty.is_some())
            .field("history_len", &state.history.len())
            .field("in_flight", &state.current.is_some())
            .field("observers", &self.broadcaster.observer_count())
            .finish()
    }
}

impl Session {
    /// Create a session with the default prompt-suffix detector.
    ///
    /// No shell is spawned until [`initialize`](Self::initialize),
    /// [`attach`](Self::attach), or the first
    /// [`execute_command`](Self::execute_command).
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self::with_strategy(config, Arc::new(PromptSuffix))
    }

    /// Create a session with a custom completion strategy.
    #[must_use]
    pub fn with_strategy(config: Config, strategy: Arc<dyn CompletionStrategy>) -> Self {
        let broadcaster = Broadcaster::new(config.broadcast_capacity);
        Self {
            state: Arc::new(Mutex::new(SessionState::new())),
            broadcaster,
            strategy,
            config,
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Spawn the shell if none exists. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns an error if no shell binary resolves for this host, the
    /// PTY spawn fails, or no Tokio runtime is available for the chunk
    /// pump. These are the fatal class: the session cannot start.
    pub fn initialize(&self) -> Result<()> {
        // The pump task needs a runtime; fail before spawning a shell
        // that nothing would drain.
        let runtime = tokio::runtime::Handle::try_current()
            .context("Session requires a running Tokio runtime")?;

        let mut state = self.state.lock().expect("session state lock poisoned");
        if state.pty.is_some() {
            return Ok(());
        }

        let shell = resolve_shell(self.config.shell.as_deref())?;
        let workdir = self.config.resolved_workdir();
        let mut env = HashMap::new();
        env.insert("TERM".to_string(), TERM_NAME.to_string());

        log::info!("Initializing terminal session: shell={shell}");

        let (notice_tx, mut notice_rx) = mpsc::unbounded_channel();
        let pty = PtyProcess::spawn(
            &shell,
            &workdir,
            &env,
            self.config.cols,
            self.config.rows,
            notice_tx,
        )?;
        state.pty = Some(pty);
        drop(state);

        let session = self.clone();
        runtime.spawn(async move {
            while let Some(notice) = notice_rx.recv().await {
                match notice {
                    PtyNotice::Chunk(chunk) => session.process_chunk(&chunk),
                    PtyNotice::Exited { exit_code } => session.process_exit(exit_code),
                }
            }
            log::debug!("Session pump exiting - PTY notice channel closed");
        });

        Ok(())
    }

    /// Attach an observer: lazily initialize, subscribe, assign an id.
    ///
    /// The returned handle's [`greeting`](ObserverHandle::greeting) is
    /// the observer's private `session-established` notification; the
    /// subscription itself carries no replay of prior output.
    ///
    /// # Errors
    ///
    /// Propagates initialization failures (fatal class).
    pub fn attach(&self) -> Result<ObserverHandle> {
        // Subscribe before initializing so the shell's first chunks are
        // not missed by the attaching observer.
        let events = self.broadcaster.subscribe();
        self.initialize()?;

        let session_id = Uuid::new_v4();
        log::info!("Observer attached: {session_id}");
        Ok(ObserverHandle { session_id, events })
    }

    /// Submit a command for tracked execution.
    ///
    /// Opens a new history record, resets the output accumulator, and
    /// writes `command + '\r'` to the shell. The acknowledgment confirms
    /// the write was issued, not that the command completed; completion
    /// is signaled asynchronously via a `command-completed` event.
    ///
    /// # Errors
    ///
    /// Returns an error only when lazy initialization fails. Write
    /// failures against a live shell are logged and absorbed.
    pub fn execute_command(&self, command: &str) -> Result<ExecuteAck> {
        self.initialize()?;

        let mut state = self.state.lock().expect("session state lock poisoned");
        state.open_record(command);
        log::info!("Executing command: {command:?}");

        if let Some(pty) = &mut state.pty {
            if let Err(e) = pty.write(format!("{command}\r").as_bytes()) {
                log::error!("Failed to write command to PTY: {e}");
            }
        }

        Ok(ExecuteAck {
            success: true,
            message: "Command executed".to_string(),
            command: command.to_string(),
        })
    }

    /// Forward raw keystrokes to the shell, bypassing history.
    ///
    /// The resulting output is broadcast like any other, but no record
    /// tracks it unless a command is already in flight. A write with no
    /// live shell is a logged no-op.
    pub fn write_input(&self, input: &[u8]) {
        let mut state = self.state.lock().expect("session state lock poisoned");
        match &mut state.pty {
            Some(pty) => {
                if let Err(e) = pty.write(input) {
                    log::error!("Failed to write input to PTY: {e}");
                }
            }
            None => log::info!("Ignoring input: no terminal session initialized"),
        }
    }

    /// Adjust the PTY window size. No-op if uninitialized.
    pub fn resize(&self, cols: u16, rows: u16) {
        let state = self.state.lock().expect("session state lock poisoned");
        match &state.pty {
            Some(pty) => pty.resize(cols, rows),
            None => log::debug!("Ignoring resize: no terminal session initialized"),
        }
    }

    /// Atomically drop all history and the in-flight pointer.
    ///
    /// The shell keeps running and is not notified; output from a
    /// cleared-but-still-running command is broadcast but stored
    /// nowhere.
    pub fn clear_history(&self) {
        let mut state = self.state.lock().expect("session state lock poisoned");
        state.clear();
    }

    /// Terminate the shell and release the session's process.
    ///
    /// History is retained; a later `initialize` spawns a fresh shell.
    pub fn destroy(&self) {
        let pty = {
            let mut state = self.state.lock().expect("session state lock poisoned");
            state.pty.take()
        };
        if let Some(mut pty) = pty {
            pty.terminate();
        }
    }

    // =========================================================================
    // Read-only snapshots
    // =========================================================================

    /// Full ordered history snapshot.
    #[must_use]
    pub fn history(&self) -> Vec<CommandRecord> {
        self.state
            .lock()
            .expect("session state lock poisoned")
            .history
            .clone()
    }

    /// The most recent record, if any.
    #[must_use]
    pub fn last(&self) -> Option<CommandRecord> {
        self.state
            .lock()
            .expect("session state lock poisoned")
            .history
            .last()
            .cloned()
    }

    /// The most recently submitted command text.
    #[must_use]
    pub fn last_command(&self) -> String {
        self.state
            .lock()
            .expect("session state lock poisoned")
            .last_command
            .clone()
    }

    /// Raw output accumulated since the last submission.
    #[must_use]
    pub fn last_output(&self) -> String {
        self.state
            .lock()
            .expect("session state lock poisoned")
            .accumulator
            .clone()
    }

    /// Whether a live shell is attached.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.state
            .lock()
            .expect("session state lock poisoned")
            .pty
            .is_some()
    }

    /// Number of currently attached observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.broadcaster.observer_count()
    }

    /// Subscribe to the broadcast stream without attaching formally.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.broadcaster.subscribe()
    }

    // =========================================================================
    // Chunk pump
    // =========================================================================

    /// Process one output chunk: append, detect, broadcast.
    ///
    /// Called only from the pump task, one chunk at a time, in arrival
    /// order. On a prompt match the sentinel chunk and the completion
    /// notification follow the triggering chunk in the broadcast stream.
    pub(crate) fn process_chunk(&self, chunk: &str) {
        let completion = {
            let mut state = self.state.lock().expect("session state lock poisoned");
            state.absorb_chunk(chunk, self.strategy.as_ref())
        };

        self.broadcaster.emit(SessionEvent::output(chunk));

        if let Some(info) = completion {
            log::info!(
                "Command completed: {:?} ({} bytes of output)",
                info.command,
                info.output_length
            );
            self.broadcaster.emit(SessionEvent::output(COMMAND_END_SENTINEL));
            self.broadcaster.emit(SessionEvent::CommandCompleted {
                command: info.command,
                submitted_at: info.submitted_at,
                output_length: info.output_length,
            });
        }
    }

    /// Handle the terminal exit notice from the PTY.
    ///
    /// The dead process is released; an in-flight record, if any, stays
    /// unfinalized (there is no prompt left to match it).
    pub(crate) fn process_exit(&self, exit_code: Option<i32>) {
        {
            let mut state = self.state.lock().expect("session state lock poisoned");
            state.pty = None;
        }
        log::info!("Terminal process exited with code {exit_code:?}");
        self.broadcaster.emit(SessionEvent::process_exited(exit_code));
    }
}
