use std::sync::Arc;

use rand::Rng;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use parley_browser::ChatSender;
use parley_core::config::StallConfig;

/// Filler pool, cycled round-robin. Kept deliberately bland; these exist to
/// hold the remote party's attention, not to negotiate.
const STALL_MESSAGES: [&str; 5] = [
    "One moment please, just checking on something on my side.",
    "Thanks for your patience, still here.",
    "Give me just a minute to confirm the details.",
    "Sorry for the wait, almost there.",
    "Still with you, just double-checking the numbers.",
];

/// Keeps the remote party engaged while the session is suspended on the
/// approval rendezvous.
///
/// `start` arms a first send at the configured initial delay; each later send
/// follows the previous one by `min_interval + random(0, jitter_max)`. Failed
/// sends are swallowed and the schedule continues. Sent texts are reported
/// through the notice channel so the runtime can record them in the
/// conversation log it owns.
pub struct StallScheduler {
    sender: Arc<dyn ChatSender>,
    config: StallConfig,
    notices: mpsc::Sender<String>,
    worker: Option<JoinHandle<()>>,
}

impl StallScheduler {
    pub fn new(
        sender: Arc<dyn ChatSender>,
        config: StallConfig,
        notices: mpsc::Sender<String>,
    ) -> Self {
        Self { sender, config, notices, worker: None }
    }

    pub fn is_active(&self) -> bool {
        self.worker.as_ref().is_some_and(|worker| !worker.is_finished())
    }

    /// Starts the schedule from a fresh rotation counter, replacing any
    /// previous run.
    pub fn start(&mut self) {
        self.stop();

        let sender = Arc::clone(&self.sender);
        let config = self.config.clone();
        let notices = self.notices.clone();

        self.worker = Some(tokio::spawn(async move {
            tokio::time::sleep(config.initial_delay()).await;

            let mut rotation = 0_usize;
            loop {
                let text = STALL_MESSAGES[rotation % STALL_MESSAGES.len()];
                rotation += 1;

                match sender.send_chat(text).await {
                    Ok(()) => {
                        debug!(rotation, "stall message sent");
                        if notices.send(text.to_owned()).await.is_err() {
                            break;
                        }
                    }
                    Err(error) => {
                        warn!(error = %error, "stall message send failed; schedule continues");
                    }
                }

                let jitter_ms = {
                    let max = config.jitter_max().as_millis() as u64;
                    if max == 0 {
                        0
                    } else {
                        rand::thread_rng().gen_range(0..=max)
                    }
                };
                let spacing = config.min_interval() + std::time::Duration::from_millis(jitter_ms);
                tokio::time::sleep(spacing).await;
            }
        }));
    }

    /// Cancels any pending send and resets the rotation.
    pub fn stop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.abort();
        }
    }
}

impl Drop for StallScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use super::StallScheduler;
    use parley_browser::{ChatSender, SurfaceError};
    use parley_core::config::StallConfig;

    struct RecordingChat {
        sent: Mutex<Vec<String>>,
        fail_first: Mutex<bool>,
    }

    impl RecordingChat {
        fn new(fail_first: bool) -> Self {
            Self { sent: Mutex::new(Vec::new()), fail_first: Mutex::new(fail_first) }
        }

        fn sent(&self) -> Vec<String> {
            self.sent.lock().expect("sent lock").clone()
        }
    }

    #[async_trait]
    impl ChatSender for RecordingChat {
        async fn send_chat(&self, text: &str) -> Result<(), SurfaceError> {
            let mut fail_first = self.fail_first.lock().expect("fail lock");
            if *fail_first {
                *fail_first = false;
                return Err(SurfaceError::ComposerUnknown);
            }
            drop(fail_first);
            self.sent.lock().expect("sent lock").push(text.to_owned());
            Ok(())
        }
    }

    fn config(jitter_max_secs: u64) -> StallConfig {
        StallConfig { initial_delay_secs: 20, min_interval_secs: 45, jitter_max_secs }
    }

    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn first_send_lands_exactly_at_the_initial_delay() {
        let chat = Arc::new(RecordingChat::new(false));
        let (notice_tx, mut notices) = mpsc::channel(8);
        let mut scheduler = StallScheduler::new(chat.clone(), config(0), notice_tx);

        scheduler.start();
        settle().await;

        tokio::time::advance(Duration::from_secs(19)).await;
        settle().await;
        assert!(chat.sent().is_empty(), "nothing before the initial delay");

        tokio::time::advance(Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(chat.sent().len(), 1);
        assert_eq!(notices.try_recv().ok(), Some(chat.sent()[0].clone()));

        scheduler.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn subsequent_sends_follow_the_minimum_interval() {
        let chat = Arc::new(RecordingChat::new(false));
        let (notice_tx, _notices) = mpsc::channel(8);
        let mut scheduler = StallScheduler::new(chat.clone(), config(0), notice_tx);

        scheduler.start();
        settle().await;
        tokio::time::advance(Duration::from_secs(20)).await;
        settle().await;
        assert_eq!(chat.sent().len(), 1);

        tokio::time::advance(Duration::from_secs(44)).await;
        settle().await;
        assert_eq!(chat.sent().len(), 1, "second send waits out the spacing");

        tokio::time::advance(Duration::from_secs(1)).await;
        settle().await;
        assert_eq!(chat.sent().len(), 2);

        // Round-robin rotation: the two messages differ.
        let sent = chat.sent();
        assert_ne!(sent[0], sent[1]);

        scheduler.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn failed_send_does_not_halt_the_schedule() {
        let chat = Arc::new(RecordingChat::new(true));
        let (notice_tx, _notices) = mpsc::channel(8);
        let mut scheduler = StallScheduler::new(chat.clone(), config(0), notice_tx);

        scheduler.start();
        settle().await;
        tokio::time::advance(Duration::from_secs(20)).await;
        settle().await;
        assert!(chat.sent().is_empty(), "first send failed");

        tokio::time::advance(Duration::from_secs(45)).await;
        settle().await;
        assert_eq!(chat.sent().len(), 1, "schedule survived the failure");

        scheduler.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn stop_prevents_all_further_sends() {
        let chat = Arc::new(RecordingChat::new(false));
        let (notice_tx, _notices) = mpsc::channel(8);
        let mut scheduler = StallScheduler::new(chat.clone(), config(0), notice_tx);

        scheduler.start();
        settle().await;
        tokio::time::advance(Duration::from_secs(20)).await;
        settle().await;
        assert_eq!(chat.sent().len(), 1);

        scheduler.stop();
        tokio::time::advance(Duration::from_secs(600)).await;
        settle().await;
        assert_eq!(chat.sent().len(), 1, "no sends after stop");
    }
}
