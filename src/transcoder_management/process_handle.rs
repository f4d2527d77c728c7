use log::debug;
use tokio::sync::mpsc;

use super::types::TerminateMode;

/// Control handle of one transcoder process.
///
/// The process itself is owned by its monitor task; the handle only carries termination
/// requests to it. Requests sent after the process has exited are dropped.
#[derive(Debug)]
pub struct ProcessHandle {
    /// OS process id, when the platform reports one.
    pub pid: Option<u32>,
    /// Command line used to start the process, for logs and diagnostics.
    pub command_line: String,
    control_tx: mpsc::UnboundedSender<TerminateMode>,
}

impl ProcessHandle {
    pub fn new(
        pid: Option<u32>,
        command_line: String,
        control_tx: mpsc::UnboundedSender<TerminateMode>,
    ) -> Self {
        Self {
            pid,
            command_line,
            control_tx,
        }
    }

    /// Asks the process to stop. Never blocks.
    pub fn terminate(&self, mode: TerminateMode) {
        if self.control_tx.send(mode).is_err() {
            debug!(
                "Termination request {:?} ignored, process {:?} already exited",
                mode, self.pid
            );
        }
    }

    /// Whether the monitor task is still watching the process.
    pub fn is_running(&self) -> bool {
        !self.control_tx.is_closed()
    }
}
