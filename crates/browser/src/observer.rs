use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::snapshot::fingerprint;
use crate::surface::ActionSurface;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ObserverEvent {
    /// The snapshot's content fingerprint differs from the last one observed.
    Changed { snapshot: String },
    /// A poll failed; the loop keeps running.
    PollFailed { message: String },
}

/// Polls the action surface on a fixed interval and reports content changes
/// through a typed listener channel.
///
/// One polling task exists at most; a poll in flight delays the next tick
/// rather than overlapping it. Dropping the listener (or calling [`stop`])
/// ends the subscription, so repeated start/stop cycles cannot leak
/// listeners.
///
/// [`stop`]: SnapshotObserver::stop
pub struct SnapshotObserver {
    surface: Arc<dyn ActionSurface>,
    poll_interval: Duration,
    worker: Option<JoinHandle<()>>,
}

impl SnapshotObserver {
    pub fn new(surface: Arc<dyn ActionSurface>, poll_interval: Duration) -> Self {
        Self { surface, poll_interval, worker: None }
    }

    pub fn is_running(&self) -> bool {
        self.worker.as_ref().is_some_and(|worker| !worker.is_finished())
    }

    /// Begins polling, replacing any previous polling task. The first poll
    /// runs immediately; every subsequent poll waits out the interval.
    pub fn start(&mut self, listener: mpsc::Sender<ObserverEvent>) {
        self.stop();

        let surface = Arc::clone(&self.surface);
        let poll_interval = self.poll_interval;

        self.worker = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut last_fingerprint: Option<String> = None;

            loop {
                ticker.tick().await;

                let snapshot = match surface.snapshot().await {
                    Ok(snapshot) => snapshot,
                    Err(error) => {
                        warn!(error = %error, "snapshot poll failed; continuing");
                        if listener
                            .send(ObserverEvent::PollFailed { message: error.to_string() })
                            .await
                            .is_err()
                        {
                            break;
                        }
                        continue;
                    }
                };

                let current = fingerprint(&snapshot);
                if last_fingerprint.as_deref() == Some(current.as_str()) {
                    continue;
                }
                last_fingerprint = Some(current);

                debug!(snapshot_len = snapshot.len(), "snapshot content changed");
                if listener.send(ObserverEvent::Changed { snapshot }).await.is_err() {
                    break;
                }
            }
        }));
    }

    pub fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
    }
}

impl Drop for SnapshotObserver {
    fn drop(&mut self) {
        self.stop();
    }
}
