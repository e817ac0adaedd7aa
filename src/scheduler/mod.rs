use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

#[derive(Error, Debug, PartialEq)]
pub enum SchedulerError {
    #[error("Scheduler is already running")]
    AlreadyRunning,
    #[error("Scheduler is not running")]
    NotRunning,
    #[error("Scheduler did not stop within {0:?}")]
    StopTimeout(Duration),
    #[error("Scheduler state lock poisoned")]
    Poisoned,
    #[error("Poll interval must not be zero")]
    ZeroInterval,
    #[error("Poll loop ended before it was stopped")]
    LoopEnded,
}

struct Running {
    stop_tx: mpsc::Sender<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

/// Runs a handler right away and then once per interval until stopped.
pub struct PollScheduler {
    interval: Duration,
    running: Mutex<Option<Running>>,
}

impl PollScheduler {
    pub fn new(interval: Duration) -> Self {
        PollScheduler { interval, running: Mutex::new(None) }
    }

    pub fn is_running(&self) -> bool {
        match self.running.lock() {
            Ok(r) => r.as_ref().is_some_and(|r| !r.task.is_finished()),
            Err(_) => false,
        }
    }

    /// `handler` gets the time the tick fired. Polls never overlap, a slow
    /// poll delays the next tick instead of queueing more.
    pub fn start<F, Fut>(&self, handler: F) -> Result<(), SchedulerError>
    where
        F: Fn(DateTime<Utc>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.interval.is_zero() {
            return Err(SchedulerError::ZeroInterval);
        }
        let mut running = self.running.lock().map_err(|_| SchedulerError::Poisoned)?;
        if running.is_some() {
            return Err(SchedulerError::AlreadyRunning);
        }

        let (stop_tx, mut stop_rx) = mpsc::channel::<oneshot::Sender<()>>(1);
        let interval = self.interval;
        info!("Starting poll scheduler, interval {interval:?}");

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // the first tick completes at once
            ticker.tick().await;

            loop {
                let poll = handler(Utc::now());
                poll.await;
                tokio::select! {
                    _ = ticker.tick() => {
                        debug!("Poll tick");
                    }
                    ack = stop_rx.recv() => {
                        if let Some(ack) = ack {
                            let _ = ack.send(());
                        }
                        info!("Poll scheduler stopped");
                        return;
                    }
                }
            }
        });

        *running = Some(Running { stop_tx, task });
        Ok(())
    }

    /// Asks the loop to stop after the current poll and waits up to `within`
    /// for it to confirm. On timeout the task is aborted. A loop that is
    /// already gone, e.g. after a panicking handler, is `LoopEnded`.
    pub async fn stop(&self, within: Duration) -> Result<(), SchedulerError> {
        let running = self
            .running
            .lock()
            .map_err(|_| SchedulerError::Poisoned)?
            .take()
            .ok_or(SchedulerError::NotRunning)?;

        let (ack_tx, ack_rx) = oneshot::channel();
        let acked = tokio::time::timeout(within, async {
            running.stop_tx.send(ack_tx).await.is_ok() && ack_rx.await.is_ok()
        })
        .await;

        match acked {
            Ok(true) => Ok(()),
            Ok(false) => {
                match running.task.await {
                    Err(e) if e.is_panic() => error!("Poll loop panicked: {e}"),
                    _ => warn!("Poll loop ended on its own"),
                }
                Err(SchedulerError::LoopEnded)
            }
            Err(_) => {
                warn!("Poll scheduler did not stop within {within:?}, aborting it");
                running.task.abort();
                Err(SchedulerError::StopTimeout(within))
            }
        }
    }
}
