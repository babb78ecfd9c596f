//! Liveness polling until the host answers.

use std::{sync::Arc, time::Duration};

use stagelink_core::MessageChannel;
use stagelink_transport::Outbound;
use tokio::{sync::watch, task::JoinHandle, time::MissedTickBehavior};

/// Sends `loadingStateQuery` at a fixed interval until the session is ready.
///
/// There is no backoff and no attempt limit; the poll task ends as soon as
/// the readiness flag turns true.
pub struct ReadinessProber {
    interval: Duration,
    task: Option<JoinHandle<()>>,
}

impl ReadinessProber {
    /// Create a stopped prober.
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            task: None,
        }
    }

    /// Whether the poll task is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Start polling. Does nothing if already running.
    ///
    /// Returns true if a poll task was started.
    pub fn start<C>(&mut self, channel: Arc<C>, ready: watch::Receiver<bool>) -> bool
    where
        C: MessageChannel + ?Sized + 'static,
    {
        if self.is_running() {
            return false;
        }
        self.task = Some(tokio::spawn(poll(channel, ready, self.interval)));
        true
    }

    /// Abort the poll task.
    pub fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for ReadinessProber {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn poll<C>(channel: Arc<C>, mut ready: watch::Receiver<bool>, period: Duration)
where
    C: MessageChannel + ?Sized,
{
    let query = Outbound::LoadingStateQuery {};
    let frame = match query.to_frame() {
        Ok(frame) => frame,
        Err(e) => {
            tracing::error!("Failed to encode liveness query: {e}");
            return;
        }
    };

    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if *ready.borrow() {
                    break;
                }
                tracing::info!("Polling host for readiness");
                if let Err(e) = channel.send(frame.clone()).await {
                    tracing::warn!("Liveness query not sent: {e}");
                }
            }
            changed = ready.changed() => {
                if changed.is_err() || *ready.borrow_and_update() {
                    break;
                }
            }
        }
    }
    tracing::debug!("Readiness polling stopped");
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use stagelink_core::ChannelError;

    use super::*;

    #[derive(Default)]
    struct RecordingChannel {
        frames: Mutex<Vec<String>>,
    }

    impl RecordingChannel {
        fn count(&self) -> usize {
            self.frames.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl MessageChannel for RecordingChannel {
        async fn send(&self, frame: String) -> Result<(), ChannelError> {
            self.frames.lock().unwrap().push(frame);
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_at_interval_until_ready() {
        let channel = Arc::new(RecordingChannel::default());
        let (ready_tx, ready_rx) = watch::channel(false);
        let mut prober = ReadinessProber::new(Duration::from_secs(3));

        assert!(prober.start(Arc::clone(&channel), ready_rx.clone()));
        assert!(!prober.start(Arc::clone(&channel), ready_rx));
        assert!(prober.is_running());

        // Ticks at 0s, 3s and 6s.
        tokio::time::sleep(Duration::from_secs(7)).await;
        assert_eq!(channel.count(), 3);
        assert!(
            channel.frames.lock().unwrap()[0].contains("loadingStateQuery"),
            "unexpected frame"
        );

        ready_tx.send_replace(true);
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(channel.count(), 3);
        assert!(!prober.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_ready_sends_nothing() {
        let channel = Arc::new(RecordingChannel::default());
        let (_ready_tx, ready_rx) = watch::channel(true);
        let mut prober = ReadinessProber::new(Duration::from_secs(3));

        prober.start(Arc::clone(&channel), ready_rx);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(channel.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_aborts_polling() {
        let channel = Arc::new(RecordingChannel::default());
        let (_ready_tx, ready_rx) = watch::channel(false);
        let mut prober = ReadinessProber::new(Duration::from_secs(3));

        prober.start(Arc::clone(&channel), ready_rx);
        tokio::time::sleep(Duration::from_secs(1)).await;
        prober.stop();
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(channel.count(), 1);
        assert!(!prober.is_running());
    }
}
