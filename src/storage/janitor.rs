use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::storage::storage_trait::ArtifactStorage;

/// Periodic age-based sweep of the output directory.
///
/// Catches whatever escaped per-session cleanup (crashes, restarts, a purge that raced a
/// late segment write). It only looks at file ages and never consults the session registry.
pub struct Janitor;

pub struct JanitorHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Janitor {
    pub fn spawn(
        storage: Arc<dyn ArtifactStorage>,
        retention: Duration,
        interval: Duration,
    ) -> JanitorHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        info!(
            "Janitor started: retention {}s, every {}s",
            retention.as_secs(),
            interval.as_secs()
        );

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let storage = storage.clone();
                        let swept = tokio::task::spawn_blocking(move || {
                            storage.sweep_older_than(retention)
                        })
                        .await;
                        match swept {
                            Ok(Ok(count)) => debug!("Janitor pass removed {} file(s)", count),
                            Ok(Err(e)) => warn!("Janitor pass failed: {}", e),
                            Err(e) => warn!("Janitor pass panicked: {}", e),
                        }
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
            debug!("Janitor stopped");
        });

        JanitorHandle { shutdown_tx, task }
    }
}

impl JanitorHandle {
    /// Stops the sweep loop and waits for an in-flight pass to finish.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            warn!("Janitor task ended abnormally: {}", e);
        }
    }
}
