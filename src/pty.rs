//! Pseudo-terminal process wrapper.
//!
//! Owns one shell child bound to a PTY and turns its un-framed byte
//! stream into a lazy sequence of UTF-8 text chunks. A dedicated OS
//! reader thread pushes [`PtyNotice::Chunk`]s into an unbounded channel
//! (no back-pressure) until the process exits, then reaps the child and
//! sends a single [`PtyNotice::Exited`]. After that the wrapper is
//! permanently inert; a new shell requires a new `PtyProcess`.
//!
//! The child handle is moved into the reader thread so it can `wait()`
//! for the exit code; termination from the outside goes through a
//! [`ChildKiller`] clone.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread;

use anyhow::{bail, Context, Result};
use portable_pty::{native_pty_system, Child, ChildKiller, CommandBuilder, MasterPty, PtySize};
use tokio::sync::mpsc;

/// Read buffer size for the PTY reader thread.
const READ_BUFFER_BYTES: usize = 4096;

/// Asynchronous notices produced by a PTY-backed shell process.
#[derive(Debug, Clone)]
pub enum PtyNotice {
    /// An opaque text fragment. May split a line, a prompt, or an
    /// escape sequence across chunk boundaries.
    Chunk(String),
    /// The process exited. Always the final notice for a given process.
    Exited {
        /// Exit code if the child could be reaped (`None` otherwise).
        exit_code: Option<i32>,
    },
}

/// A live shell bound to a pseudo-terminal.
pub struct PtyProcess {
    master: Box<dyn MasterPty + Send>,
    writer: Box<dyn Write + Send>,
    killer: Box<dyn ChildKiller + Send + Sync>,
    alive: Arc<AtomicBool>,
    reader_thread: Option<thread::JoinHandle<()>>,
}

impl std::fmt::Debug for PtyProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PtyProcess")
            .field("alive", &self.is_alive())
            .field("has_reader_thread", &self.reader_thread.is_some())
            .finish()
    }
}

impl PtyProcess {
    /// Spawn `command` in a fresh PTY of the given geometry.
    ///
    /// Output chunks and the final exit notice are delivered through
    /// `notice_tx`. The channel is unbounded; chunk delivery never
    /// blocks the reader thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the PTY cannot be opened or the command
    /// cannot be spawned.
    pub fn spawn(
        command: &str,
        cwd: &Path,
        env: &HashMap<String, String>,
        cols: u16,
        rows: u16,
        notice_tx: mpsc::UnboundedSender<PtyNotice>,
    ) -> Result<Self> {
        let pty_system = native_pty_system();
        let size = PtySize {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        };
        let pair = pty_system.openpty(size).context("Failed to open PTY")?;

        let cmd = build_command(command, cwd, env);
        let child = pair
            .slave
            .spawn_command(cmd)
            .context("Failed to spawn shell in PTY")?;

        let killer = child.clone_killer();
        let reader = pair.master.try_clone_reader()?;
        let writer = pair.master.take_writer()?;

        let alive = Arc::new(AtomicBool::new(true));
        let reader_thread = spawn_reader_thread(reader, child, Arc::clone(&alive), notice_tx);

        log::info!("Spawned PTY shell: {command} ({cols}x{rows}) in {}", cwd.display());

        Ok(Self {
            master: pair.master,
            writer,
            killer,
            alive,
            reader_thread: Some(reader_thread),
        })
    }

    /// Whether the child process is still running.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Forward raw bytes to the shell's input.
    ///
    /// A write after the process has exited is a logged no-op, not an
    /// error.
    ///
    /// # Errors
    ///
    /// Returns an error only when the underlying write to a live PTY
    /// fails.
    pub fn write(&mut self, input: &[u8]) -> Result<()> {
        if !self.is_alive() {
            log::info!("Ignoring write to exited PTY process");
            return Ok(());
        }
        self.writer.write_all(input)?;
        self.writer.flush()?;
        Ok(())
    }

    /// Adjust the PTY window size. Failures are logged, not surfaced.
    pub fn resize(&self, cols: u16, rows: u16) {
        let size = PtySize {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        };
        if let Err(e) = self.master.resize(size) {
            log::warn!("Failed to resize PTY to {cols}x{rows}: {e}");
        }
    }

    /// Forcibly end the child process.
    ///
    /// The reader thread observes the resulting EOF, reaps the child,
    /// and emits the exit notice as usual.
    pub fn terminate(&mut self) {
        if !self.is_alive() {
            return;
        }
        log::info!("Terminating PTY child process");
        if let Err(e) = self.killer.kill() {
            log::warn!("Failed to kill PTY child: {e}");
        }
    }
}

impl Drop for PtyProcess {
    fn drop(&mut self) {
        self.terminate();
        if let Some(handle) = self.reader_thread.take() {
            let _ = handle.join();
        }
    }
}

/// Resolve the interactive shell binary for this host.
///
/// Order: explicit `override_shell`, `$SHELL`, `/bin/bash`, `/bin/sh`
/// (Windows: `powershell.exe`).
///
/// # Errors
///
/// Returns an error when no candidate resolves: the session cannot
/// start without a shell.
pub fn resolve_shell(override_shell: Option<&str>) -> Result<String> {
    if let Some(shell) = override_shell {
        return Ok(shell.to_string());
    }

    if cfg!(windows) {
        return Ok("powershell.exe".to_string());
    }

    if let Ok(shell) = std::env::var("SHELL") {
        if !shell.is_empty() && Path::new(&shell).exists() {
            return Ok(shell);
        }
    }

    for candidate in ["/bin/bash", "/bin/sh"] {
        if Path::new(candidate).exists() {
            return Ok(candidate.to_string());
        }
    }

    bail!("No interactive shell binary found on this host")
}

/// Build a command from a whitespace-separated command string.
fn build_command(command_str: &str, cwd: &Path, env_vars: &HashMap<String, String>) -> CommandBuilder {
    let mut parts = command_str.split_whitespace();
    let program = parts.next().unwrap_or(command_str);
    let mut cmd = CommandBuilder::new(program);
    for arg in parts {
        cmd.arg(arg);
    }
    cmd.cwd(cwd);
    for (key, value) in env_vars {
        cmd.env(key, value);
    }
    cmd
}

/// Spawn the reader thread that drains PTY output.
///
/// Every successful read becomes a `Chunk` notice; bytes are decoded
/// lossily, so a chunk boundary inside a multi-byte character yields
/// replacement characters rather than an error. On EOF or read error the
/// thread reaps the child and sends the terminal `Exited` notice.
fn spawn_reader_thread(
    mut reader: Box<dyn Read + Send>,
    mut child: Box<dyn Child + Send + Sync>,
    alive: Arc<AtomicBool>,
    notice_tx: mpsc::UnboundedSender<PtyNotice>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        log::debug!("PTY reader thread started");
        let mut buf = [0u8; READ_BUFFER_BYTES];

        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    let chunk = String::from_utf8_lossy(&buf[..n]).into_owned();
                    if notice_tx.send(PtyNotice::Chunk(chunk)).is_err() {
                        log::debug!("PTY notice channel closed, stopping reader");
                        break;
                    }
                }
                Err(e) => {
                    // EIO is the normal Linux signal that the slave side closed.
                    log::debug!("PTY read ended: {e}");
                    break;
                }
            }
        }

        alive.store(false, Ordering::Release);

        let exit_code = match child.wait() {
            Ok(status) => Some(status.exit_code() as i32),
            Err(e) => {
                log::warn!("Failed to reap PTY child: {e}");
                None
            }
        };
        log::info!("PTY process exited with code {exit_code:?}");

        let _ = notice_tx.send(PtyNotice::Exited { exit_code });
        log::debug!("PTY reader thread exiting");
    })
}
