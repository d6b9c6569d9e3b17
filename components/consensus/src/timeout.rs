//! Per (height, round, step) timers.
use std::{collections::HashMap, time::Duration};

use tbft_roles::validator::{Height, Round, Step};
use tokio::{sync::mpsc, task::JoinHandle};

/// Fired (or scheduled) timeout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimeoutInfo {
    /// Height the timer was scheduled at.
    pub height: Height,
    /// Round the timer was scheduled at.
    pub round: Round,
    /// Step the timer was scheduled for.
    pub step: Step,
    /// Whether this is the optimal propose timer, raced against the normal one.
    pub optimal: bool,
}

impl TimeoutInfo {
    /// Timeout for the given step.
    pub fn new(height: Height, round: Round, step: Step) -> Self {
        Self {
            height,
            round,
            step,
            optimal: false,
        }
    }
}

/// Schedules timers and delivers the fired ones through a single channel.
///
/// Every timer is an independent task. Rescheduling an already scheduled
/// timer restarts it. The receiver has to check the fired timer against its
/// current state, since a timer may fire right before being cancelled.
#[derive(Debug)]
pub struct TimeoutScheduler {
    send: mpsc::UnboundedSender<TimeoutInfo>,
    recv: mpsc::UnboundedReceiver<TimeoutInfo>,
    timers: HashMap<TimeoutInfo, JoinHandle<()>>,
}

impl Default for TimeoutScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeoutScheduler {
    /// Scheduler without timers.
    pub fn new() -> Self {
        let (send, recv) = mpsc::unbounded_channel();
        Self {
            send,
            recv,
            timers: HashMap::new(),
        }
    }

    /// Schedules `info` to fire after `duration`.
    pub fn schedule(&mut self, info: TimeoutInfo, duration: Duration) {
        tracing::trace!(?info, ?duration, "schedule timeout");
        let send = self.send.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            // The receiver is gone only if the scheduler is dropped.
            let _ = send.send(info);
        });
        if let Some(old) = self.timers.insert(info, task) {
            old.abort();
        }
    }

    /// Cancels the timer for `(height, round, step)`, the optimal one included.
    pub fn cancel(&mut self, height: Height, round: Round, step: Step) {
        self.timers.retain(|info, task| {
            let hit = (info.height, info.round, info.step) == (height, round, step);
            if hit {
                task.abort();
            }
            !hit
        });
    }

    /// Cancels all timers scheduled before `(height, round)`.
    pub fn prune(&mut self, height: Height, round: Round) {
        self.timers.retain(|info, task| {
            let keep = (info.height, info.round) >= (height, round);
            if !keep {
                task.abort();
            }
            keep
        });
    }

    /// Number of pending timers.
    pub fn pending(&self) -> usize {
        self.timers.len()
    }

    /// Waits for the next fired timer.
    pub async fn recv(&mut self) -> Option<TimeoutInfo> {
        let info = self.recv.recv().await?;
        self.timers.remove(&info);
        Some(info)
    }
}

impl Drop for TimeoutScheduler {
    fn drop(&mut self) {
        for task in self.timers.values() {
            task.abort();
        }
    }
}
