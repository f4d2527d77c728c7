//! Transcoder process management.
//!
//! One external ffmpeg process per session, started from a fixed argument template and
//! watched by a monitor future that reports its lifecycle as [`TranscoderEvent`]s.
//!
//! Re-exports:
//! - [`Launcher`] / [`FfmpegLauncher`]: start processes.
//! - [`ProcessHandle`]: cooperative or forced termination of a running process.
//! - [`TranscoderEvent`], [`TerminateMode`], [`EventSink`], [`LaunchedProcess`]: core types.

pub mod command;
pub mod launcher;
pub mod process_handle;
pub mod types;

pub use launcher::{FfmpegLauncher, Launcher};
pub use process_handle::ProcessHandle;
pub use types::{EventSink, LaunchedProcess, ProcessMonitor, TerminateMode, TranscoderEvent};
