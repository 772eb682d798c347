//! Background task scheduler.
//!
//! Sweeps the queue for in-flight envelopes whose visibility timeout lapsed
//! without an ack/nack — the worker that held them died or hung, so they must
//! be handed back to a live worker. Retargeted from the
//! teacher's decay/session-cleanup scheduler, keeping its
//! `tokio::select!`-over-interval-timers-and-a-broadcast-shutdown shape.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, info};

use crate::queue::Queue;

/// Scheduler tuning.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
  /// How often the queue is swept for expired in-flight envelopes.
  pub sweep_interval_secs: u64,
}

impl Default for SchedulerConfig {
  fn default() -> Self {
    Self { sweep_interval_secs: 30 }
  }
}

/// Background task driver. Owns nothing but a reference to the queue and the
/// shutdown signal; all actual state lives in [`Queue`].
pub struct Scheduler {
  config: SchedulerConfig,
  queue: Arc<Queue>,
  shutdown_rx: broadcast::Receiver<()>,
}

impl Scheduler {
  pub fn new(queue: Arc<Queue>, shutdown_rx: broadcast::Receiver<()>) -> Self {
    Self { config: SchedulerConfig::default(), queue, shutdown_rx }
  }

  pub fn with_config(queue: Arc<Queue>, shutdown_rx: broadcast::Receiver<()>, config: SchedulerConfig) -> Self {
    Self { config, queue, shutdown_rx }
  }

  /// Run the sweep loop until a shutdown signal arrives.
  pub async fn run(mut self) {
    let mut sweep_timer = interval(Duration::from_secs(self.config.sweep_interval_secs.max(1)));
    sweep_timer.tick().await;

    loop {
      tokio::select! {
        _ = sweep_timer.tick() => {
          let requeued = self.queue.sweep_expired().await;
          if requeued > 0 {
            info!(requeued, "swept expired in-flight pipeline messages back to ready");
          }
        }
        _ = self.shutdown_rx.recv() => {
          debug!("scheduler received shutdown signal");
          break;
        }
      }
    }
  }
}

/// Spawn the scheduler as a background task.
pub fn spawn_scheduler(queue: Arc<Queue>, shutdown_rx: broadcast::Receiver<()>) -> tokio::task::JoinHandle<()> {
  let scheduler = Scheduler::new(queue, shutdown_rx);
  tokio::spawn(async move {
    scheduler.run().await;
  })
}

/// Spawn the scheduler with custom config.
pub fn spawn_scheduler_with_config(queue: Arc<Queue>, shutdown_rx: broadcast::Receiver<()>, config: SchedulerConfig) -> tokio::task::JoinHandle<()> {
  let scheduler = Scheduler::with_config(queue, shutdown_rx, config);
  tokio::spawn(async move {
    scheduler.run().await;
  })
}
