use log::{debug, error, info, trace, warn};
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::command::{build_args, command_line};
use super::process_handle::ProcessHandle;
use super::types::{EventSink, LaunchedProcess, TerminateMode, TranscoderEvent};
use crate::configuration::TranscoderConfig;
use crate::error_handling::types::TranscoderError;
use crate::session_management::SessionId;

/// Starts transcoder processes.
///
/// This is the seam between the lifecycle controller and the operating system. The
/// production implementation is [`FfmpegLauncher`].
pub trait Launcher: Send + Sync {
    /// Starts the process for `session_id`. An `Ok` return is the start acknowledgment;
    /// an `Err` means nothing is running.
    fn launch(
        &self,
        session_id: &SessionId,
        source: &str,
        sink: EventSink,
    ) -> Result<LaunchedProcess, TranscoderError>;
}

/// Runs ffmpeg with the fixed HLS argument template.
///
/// Design notes:
/// - stdin is closed, stdout discarded, stderr read line by line for diagnostics.
/// - The child is owned by the monitor future, which also executes termination requests.
/// - `kill_on_drop` guarantees the process does not outlive a dropped monitor.
pub struct FfmpegLauncher {
    config: TranscoderConfig,
    output_dir: PathBuf,
}

impl FfmpegLauncher {
    pub fn new(config: TranscoderConfig, output_dir: PathBuf) -> Self {
        info!(
            "Transcoder launcher using {} writing to {}",
            config.ffmpeg_path,
            output_dir.display()
        );
        Self { config, output_dir }
    }
}

impl Launcher for FfmpegLauncher {
    fn launch(
        &self,
        session_id: &SessionId,
        source: &str,
        sink: EventSink,
    ) -> Result<LaunchedProcess, TranscoderError> {
        let args = build_args(&self.config, &self.output_dir, session_id, source);
        let line = command_line(&self.config.ffmpeg_path, &args);
        debug!("[{}] Spawning transcoder: {}", session_id, line);

        let mut child = Command::new(&self.config.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                error!("[{}] Failed to spawn transcoder: {}", session_id, e);
                TranscoderError::SpawnFailed(format!("{}: {}", self.config.ffmpeg_path, e))
            })?;

        let pid = child.id();
        info!("[{}] Transcoder started (pid {:?})", session_id, pid);

        let stderr_task = child
            .stderr
            .take()
            .map(|stderr| spawn_stderr_reader(session_id.clone(), stderr, sink.clone()));

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let handle = ProcessHandle::new(pid, line, control_tx);
        let monitor = Box::pin(monitor_process(
            session_id.clone(),
            child,
            control_rx,
            stderr_task,
            sink,
        ));

        Ok(LaunchedProcess { handle, monitor })
    }
}

/// Logs stderr and forwards progress lines. Resolves to the last non-empty line, which is
/// the most useful failure reason ffmpeg gives.
fn spawn_stderr_reader(
    session_id: SessionId,
    stderr: tokio::process::ChildStderr,
    sink: EventSink,
) -> JoinHandle<Option<String>> {
    tokio::spawn(async move {
        let mut reader = BufReader::new(stderr).lines();
        let mut last_line = None;
        while let Ok(Some(line)) = reader.next_line().await {
            let line = line.trim().to_string();
            if line.is_empty() {
                continue;
            }
            trace!("[{}][ffmpeg] {}", session_id, line);
            if line.starts_with("frame=") || line.starts_with("size=") {
                sink(TranscoderEvent::Progress { line: line.clone() });
            }
            last_line = Some(line);
        }
        debug!("[{}] stderr monitoring ended", session_id);
        last_line
    })
}

async fn monitor_process(
    session_id: SessionId,
    mut child: Child,
    mut control_rx: mpsc::UnboundedReceiver<TerminateMode>,
    stderr_task: Option<JoinHandle<Option<String>>>,
    sink: EventSink,
) {
    let mut handle_alive = true;
    let status = loop {
        let mode = tokio::select! {
            status = child.wait() => break status,
            mode = control_rx.recv(), if handle_alive => match mode {
                Some(mode) => mode,
                None => {
                    // Nobody can stop the process any more.
                    debug!("[{}] Process handle dropped, killing transcoder", session_id);
                    handle_alive = false;
                    TerminateMode::Forced
                }
            },
        };
        if let Err(e) = deliver_termination(&mut child, mode) {
            warn!("[{}] {}", session_id, e);
        }
    };
    // Further requests have nothing to act on.
    control_rx.close();

    let last_line = match stderr_task {
        Some(task) => tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .ok()
            .and_then(|joined| joined.ok())
            .flatten(),
        None => None,
    };

    match status {
        Ok(status) => {
            if let Some(reason) = failure_reason(&status, last_line) {
                warn!("[{}] Transcoder failed: {}", session_id, reason);
                sink(TranscoderEvent::Failed { reason });
            } else {
                info!("[{}] Transcoder exited cleanly", session_id);
            }
            sink(TranscoderEvent::Exited {
                code: status.code(),
            });
        }
        Err(e) => {
            error!("[{}] Failed to wait for transcoder: {}", session_id, e);
            sink(TranscoderEvent::Failed {
                reason: format!("wait failed: {}", e),
            });
            sink(TranscoderEvent::Exited { code: None });
        }
    }
}

fn failure_reason(status: &ExitStatus, last_line: Option<String>) -> Option<String> {
    if status.success() {
        return None;
    }
    let base = match status.code() {
        Some(code) => format!("exited with code {}", code),
        None => "terminated by signal".to_string(),
    };
    Some(match last_line {
        Some(line) => format!("{}: {}", base, line),
        None => base,
    })
}

fn deliver_termination(child: &mut Child, mode: TerminateMode) -> Result<(), TranscoderError> {
    match mode {
        TerminateMode::Graceful => send_sigterm(child),
        TerminateMode::Forced => child
            .start_kill()
            .map_err(|e| TranscoderError::SignalFailed(format!("kill failed: {}", e))),
    }
}

#[cfg(unix)]
fn send_sigterm(child: &mut Child) -> Result<(), TranscoderError> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let pid = child
        .id()
        .ok_or_else(|| TranscoderError::SignalFailed("process already reaped".to_string()))?;
    kill(Pid::from_raw(pid as i32), Signal::SIGTERM)
        .map_err(|e| TranscoderError::SignalFailed(format!("SIGTERM failed: {}", e)))
}

#[cfg(not(unix))]
fn send_sigterm(child: &mut Child) -> Result<(), TranscoderError> {
    // No cooperative signal available; the grace window still applies.
    child
        .start_kill()
        .map_err(|e| TranscoderError::SignalFailed(format!("kill failed: {}", e)))
}
