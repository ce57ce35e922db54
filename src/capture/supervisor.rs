//! Capture subprocess supervisor
//!
//! Owns the lifecycle of the OS-level capture process as an explicit
//! state machine. The process's stdout is the single source of raw PCM
//! for the whole server and is fanned out through a broadcast channel;
//! stderr is routed to the diagnostic log and never parsed for control
//! decisions.
//!
//! Failure policy: a non-zero exit or spawn error schedules a restart
//! with exponential backoff (2s floor, 15s ceiling). The delay resets to
//! the floor only after a process has stayed alive long enough to count
//! as a successful start. A clean exit (code 0) parks the supervisor in
//! `Stopped` without a restart.

use bytes::Bytes;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{broadcast, watch};
use tokio::time::Instant;

use crate::capture::command::CaptureCommand;
use crate::constants::*;
use crate::error::CaptureError;

/// Supervisor lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SupervisorState {
    Stopped,
    Starting,
    Running,
    RestartScheduled,
}

/// Exponential restart backoff: floor-doubling-ceiling
#[derive(Debug, Clone)]
pub struct RestartBackoff {
    delay_ms: u64,
    floor_ms: u64,
    ceil_ms: u64,
}

impl RestartBackoff {
    pub fn new(floor_ms: u64, ceil_ms: u64) -> Self {
        Self {
            delay_ms: floor_ms,
            floor_ms,
            ceil_ms,
        }
    }

    /// Take the current delay and double it for the next failure
    pub fn next(&mut self) -> Duration {
        let delay = self.delay_ms;
        self.delay_ms = (self.delay_ms * 2).min(self.ceil_ms);
        Duration::from_millis(delay)
    }

    /// Reset to the floor after a start that stayed alive
    pub fn reset(&mut self) {
        self.delay_ms = self.floor_ms;
    }

    pub fn current_ms(&self) -> u64 {
        self.delay_ms
    }
}

impl Default for RestartBackoff {
    fn default() -> Self {
        Self::new(RESTART_DELAY_FLOOR_MS, RESTART_DELAY_CEIL_MS)
    }
}

/// Shared, read-only view of the supervisor state for status reporting
pub type SharedSupervisorState = Arc<RwLock<SupervisorState>>;

/// Capture subprocess supervisor.
///
/// Constructed once with the resolved capture command; `run` drives the
/// spawn/read/restart loop until shutdown is signalled or the process
/// exits cleanly.
pub struct CaptureSupervisor {
    command: CaptureCommand,
    pcm_tx: broadcast::Sender<Bytes>,
    state: SharedSupervisorState,
    backoff: RestartBackoff,
}

impl CaptureSupervisor {
    pub fn new(command: CaptureCommand, pcm_tx: broadcast::Sender<Bytes>) -> Self {
        Self {
            command,
            pcm_tx,
            state: Arc::new(RwLock::new(SupervisorState::Stopped)),
            backoff: RestartBackoff::default(),
        }
    }

    /// Handle for status reporting
    pub fn state_handle(&self) -> SharedSupervisorState {
        self.state.clone()
    }

    fn set_state(&self, state: SupervisorState) {
        *self.state.write() = state;
    }

    /// Drive the capture process until shutdown or clean exit.
    ///
    /// At most one child is alive at any time: the next spawn only
    /// happens after the previous child has been reaped.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }

            self.set_state(SupervisorState::Starting);
            tracing::debug!("Starting audio capture: {}", self.command.display());

            let started = Instant::now();
            match self.spawn() {
                Ok(mut child) => {
                    self.set_state(SupervisorState::Running);

                    self.pump_child(&mut child, &mut shutdown).await;

                    // A dropped sender counts as shutdown too.
                    if *shutdown.borrow() || shutdown.has_changed().is_err() {
                        let _ = child.start_kill();
                        let _ = child.wait().await;
                        break;
                    }

                    let status = child.wait().await.ok();
                    match status {
                        Some(status) if status.success() => {
                            tracing::info!("Capture process exited cleanly; not restarting");
                            self.set_state(SupervisorState::Stopped);
                            return;
                        }
                        status => {
                            tracing::warn!(
                                "Capture process {} exited with {:?}",
                                self.command.program,
                                status
                            );
                        }
                    }

                    if started.elapsed() >= Duration::from_millis(STABLE_RUN_MS) {
                        self.backoff.reset();
                    }
                }
                Err(e) => {
                    tracing::error!("Capture process error: {}", e);
                }
            }

            let delay = self.backoff.next();
            self.set_state(SupervisorState::RestartScheduled);
            tracing::info!("Restarting capture in {} ms", delay.as_millis());

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    // A closed channel would otherwise complete this
                    // arm instantly on every iteration, turning the
                    // backoff wait into a hot respawn loop.
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        self.set_state(SupervisorState::Stopped);
    }

    fn spawn(&self) -> Result<Child, CaptureError> {
        let mut child = Command::new(self.command.program)
            .args(&self.command.args)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CaptureError::SpawnFailed(e.to_string()))?;

        // Route stderr lines to the diagnostic log; nothing in the raw
        // path ever acts on their content.
        if let Some(stderr) = child.stderr.take() {
            let program = self.command.program;
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(target: "capture_stderr", "[{}] {}", program, line);
                }
            });
        }

        Ok(child)
    }

    /// Copy stdout chunks into the shared broadcast channel until EOF or
    /// shutdown.
    async fn pump_child(&self, child: &mut Child, shutdown: &mut watch::Receiver<bool>) {
        let Some(mut stdout) = child.stdout.take() else {
            tracing::error!("Capture process has no stdout pipe");
            return;
        };

        let mut buf = vec![0u8; 4096];
        loop {
            tokio::select! {
                read = stdout.read(&mut buf) => {
                    match read {
                        Ok(0) => return,
                        Ok(n) => {
                            // A send error only means no subscriber is
                            // currently attached; the stream goes on.
                            let _ = self.pcm_tx.send(Bytes::copy_from_slice(&buf[..n]));
                        }
                        Err(e) => {
                            tracing::warn!("Capture stdout read failed: {}", e);
                            return;
                        }
                    }
                }
                _ = shutdown.changed() => return,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_to_ceiling() {
        let mut backoff = RestartBackoff::new(2000, 15000);
        assert_eq!(backoff.next(), Duration::from_millis(2000));
        assert_eq!(backoff.next(), Duration::from_millis(4000));
        assert_eq!(backoff.next(), Duration::from_millis(8000));
        // 16000 clamps to the ceiling
        assert_eq!(backoff.next(), Duration::from_millis(15000));
        assert_eq!(backoff.next(), Duration::from_millis(15000));
    }

    #[test]
    fn test_backoff_reset_returns_to_floor() {
        let mut backoff = RestartBackoff::new(2000, 15000);
        backoff.next();
        backoff.next();
        backoff.reset();
        assert_eq!(backoff.next(), Duration::from_millis(2000));
    }

    #[tokio::test]
    async fn test_clean_exit_stops_without_restart() {
        let (pcm_tx, _) = broadcast::channel(8);
        let command = CaptureCommand {
            program: "true",
            args: vec![],
        };
        let supervisor = CaptureSupervisor::new(command, pcm_tx);
        let state = supervisor.state_handle();

        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        // "true" exits 0 immediately, so run() returns on its own.
        tokio::time::timeout(Duration::from_secs(5), supervisor.run(shutdown_rx))
            .await
            .expect("supervisor should stop after clean exit");

        assert_eq!(*state.read(), SupervisorState::Stopped);
    }

    #[tokio::test]
    async fn test_stdout_is_broadcast() {
        let (pcm_tx, mut pcm_rx) = broadcast::channel(8);
        let command = CaptureCommand {
            program: "printf",
            args: vec!["abc".into()],
        };
        let supervisor = CaptureSupervisor::new(command, pcm_tx);
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(supervisor.run(shutdown_rx));

        let chunk = tokio::time::timeout(Duration::from_secs(5), pcm_rx.recv())
            .await
            .expect("expected captured bytes")
            .unwrap();
        assert_eq!(&chunk[..], b"abc");

        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_restart_wait() {
        let (pcm_tx, _) = broadcast::channel(8);
        // "false" exits non-zero, driving the supervisor into backoff.
        let command = CaptureCommand {
            program: "false",
            args: vec![],
        };
        let supervisor = CaptureSupervisor::new(command, pcm_tx);
        let state = supervisor.state_handle();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(supervisor.run(shutdown_rx));

        // Wait for the first spawn/exit cycle to land in backoff.
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while *state.read() != SupervisorState::RestartScheduled
            && std::time::Instant::now() < deadline
        {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        shutdown_tx.send(true).unwrap();
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
        assert_eq!(*state.read(), SupervisorState::Stopped);
    }

    #[tokio::test]
    async fn test_dropped_shutdown_sender_stops_supervisor() {
        let (pcm_tx, _) = broadcast::channel(8);
        let command = CaptureCommand {
            program: "false",
            args: vec![],
        };
        let supervisor = CaptureSupervisor::new(command, pcm_tx);
        let state = supervisor.state_handle();

        // The sender is gone before the supervisor ever runs; a failing
        // child must not put it into a zero-delay respawn loop.
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        drop(shutdown_tx);

        tokio::time::timeout(Duration::from_secs(5), supervisor.run(shutdown_rx))
            .await
            .expect("supervisor should stop when the shutdown channel closes");
        assert_eq!(*state.read(), SupervisorState::Stopped);
    }
}
