use std::time::Duration;

use tokio::{
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use tracing::debug;

/// A poll request posted by a [`PollSchedule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTick {
    /// Session generation the schedule was started for.
    pub generation: u64,
}

/// Repeating background task that posts [`PollTick`]s into the owner's
/// channel at a fixed period.
///
/// Ticks are posted with `try_send`, so a full channel drops the tick instead
/// of queueing it. The task stops when cancelled, dropped, or when the
/// receiver goes away.
#[derive(Debug)]
pub struct PollSchedule {
    generation: u64,
    task: JoinHandle<()>,
}

impl PollSchedule {
    /// Start posting ticks every `period`. The first tick arrives one period
    /// after the call. Must be called inside a tokio runtime.
    pub fn start(period: Duration, generation: u64, sender: mpsc::Sender<PollTick>) -> Self {
        let period = period.max(Duration::from_millis(10));
        let task = tokio::spawn(async move {
            let mut ticks = interval(period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
            ticks.tick().await;
            loop {
                ticks.tick().await;
                match sender.try_send(PollTick { generation }) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        debug!(generation, "poll tick dropped; owner busy");
                    }
                    Err(TrySendError::Closed(_)) => break,
                }
            }
        });
        Self { generation, task }
    }

    /// Generation this schedule posts.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Stop posting ticks.
    pub fn cancel(&self) {
        self.task.abort();
    }
}

impl Drop for PollSchedule {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn posts_ticks_with_generation_until_cancelled() {
        let (tx, mut rx) = mpsc::channel(1);
        let schedule = PollSchedule::start(Duration::from_secs(2), 7, tx);

        let tick = rx.recv().await;
        assert_eq!(tick, Some(PollTick { generation: 7 }));

        schedule.cancel();
        drop(schedule);
        tokio::time::sleep(Duration::from_secs(10)).await;
        // The aborted task drops its sender, closing the channel.
        let mut received = Vec::new();
        while let Some(tick) = rx.recv().await {
            received.push(tick);
        }
        assert!(received.len() <= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn full_channel_drops_ticks_instead_of_queueing() {
        let (tx, mut rx) = mpsc::channel(1);
        let _schedule = PollSchedule::start(Duration::from_secs(1), 1, tx);

        tokio::time::sleep(Duration::from_millis(5500)).await;
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }
}
