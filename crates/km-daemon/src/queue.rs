//! C3 Queue: durable FIFO with visibility timeouts, ack/nack, and
//! a poison store after `N` delivery attempts.
//!
//! The reference implementation keeps everything in-process behind a
//! `tokio::sync::Mutex`-guarded map of named queues, grounded in the
//! teacher's `daemon::scheduler` background-task pattern (a periodic sweep
//! that requeues work the owning worker never finished). Messages carry only
//! the `(index, documentId)` pair, kept small enough that any
//! worker can rehydrate the full pipeline state from `status.json`.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use km_core::QueueConfig;

/// Opaque payload a pipeline message carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineMessage {
  pub index: String,
  pub document_id: String,
}

impl PipelineMessage {
  pub fn new(index: impl Into<String>, document_id: impl Into<String>) -> Self {
    Self { index: index.into(), document_id: document_id.into() }
  }

  pub fn to_bytes(&self) -> Vec<u8> {
    serde_json::to_vec(self).expect("PipelineMessage always serializes")
  }

  pub fn from_bytes(bytes: &[u8]) -> km_core::Result<Self> {
    serde_json::from_slice(bytes).map_err(|e| km_core::Error::fatal(format!("corrupt queue payload: {e}")))
  }
}

#[derive(Debug, Clone)]
struct Envelope {
  id: Uuid,
  payload: Vec<u8>,
  delivery_attempts: u32,
  visible_at: DateTime<Utc>,
}

#[derive(Default)]
struct QueueState {
  ready: VecDeque<Envelope>,
  in_flight: HashMap<Uuid, Envelope>,
  poisoned: Vec<Envelope>,
}

/// One in-flight delivery: `Subscribe`'s handler gets the payload and must
/// eventually `ack` or `nack` it by `delivery_id`.
pub struct Delivery {
  pub delivery_id: Uuid,
  pub payload: Vec<u8>,
  pub delivery_attempts: u32,
}

pub struct Queue {
  config: QueueConfig,
  queues: Mutex<HashMap<String, QueueState>>,
}

impl Queue {
  pub fn new(config: QueueConfig) -> Self {
    Self { config, queues: Mutex::new(HashMap::new()) }
  }

  /// Schedule `payload` onto `queue`, optionally delaying its initial
  /// visibility.
  pub async fn enqueue(&self, queue: &str, payload: Vec<u8>, delay: Option<Duration>) {
    let visible_at = Utc::now() + chrono::Duration::from_std(delay.unwrap_or_default()).unwrap_or_default();
    let envelope = Envelope { id: Uuid::new_v4(), payload, delivery_attempts: 0, visible_at };

    let mut queues = self.queues.lock().await;
    queues.entry(queue.to_string()).or_default().ready.push_back(envelope);
  }

  /// Pop the oldest currently-visible message, if any, moving it in-flight
  /// for the configured visibility timeout.
  pub async fn dequeue(&self, queue: &str) -> Option<Delivery> {
    let mut queues = self.queues.lock().await;
    let state = queues.get_mut(queue)?;
    let now = Utc::now();
    let pos = state.ready.iter().position(|e| e.visible_at <= now)?;
    let mut envelope = state.ready.remove(pos)?;

    envelope.delivery_attempts += 1;
    envelope.visible_at = now + chrono::Duration::seconds(self.config.visibility_timeout_secs as i64);

    let delivery = Delivery { delivery_id: envelope.id, payload: envelope.payload.clone(), delivery_attempts: envelope.delivery_attempts };
    state.in_flight.insert(envelope.id, envelope);
    Some(delivery)
  }

  /// Handler returned `complete`: drop the in-flight envelope for good.
  pub async fn ack(&self, queue: &str, delivery_id: Uuid) {
    let mut queues = self.queues.lock().await;
    if let Some(state) = queues.get_mut(queue) {
      state.in_flight.remove(&delivery_id);
    }
  }

  /// Handler returned `retry-later`/`transient-error`: redeliver after a
  /// backoff, or route to the poison store once `max_delivery_attempts` is
  /// exhausted. Returns `true` when the message was poisoned.
  pub async fn nack(&self, queue: &str, delivery_id: Uuid) -> bool {
    let mut queues = self.queues.lock().await;
    let Some(state) = queues.get_mut(queue) else { return false };
    let Some(mut envelope) = state.in_flight.remove(&delivery_id) else { return false };

    if envelope.delivery_attempts >= self.config.max_delivery_attempts {
      state.poisoned.push(envelope);
      return true;
    }

    let backoff_ms = self.config.retry_backoff_ms.saturating_mul(envelope.delivery_attempts as u64);
    envelope.visible_at = Utc::now() + chrono::Duration::milliseconds(backoff_ms as i64);
    state.ready.push_back(envelope);
    false
  }

  /// Requeues any in-flight envelope whose visibility timeout lapsed without
  /// an ack/nack (the worker that held it died or hung); the visibility
  /// timeout must exceed the longest handler runtime. Called periodically by
  /// [`crate::scheduler`]. Returns the number of envelopes requeued.
  pub async fn sweep_expired(&self) -> usize {
    let mut queues = self.queues.lock().await;
    let now = Utc::now();
    let mut requeued = 0;

    for state in queues.values_mut() {
      let expired: Vec<Uuid> = state.in_flight.iter().filter(|(_, e)| e.visible_at <= now).map(|(id, _)| *id).collect();
      for id in expired {
        if let Some(envelope) = state.in_flight.remove(&id) {
          state.ready.push_back(envelope);
          requeued += 1;
        }
      }
    }

    requeued
  }

  /// Payloads currently parked in `queue`'s poison store.
  pub async fn poisoned(&self, queue: &str) -> Vec<Vec<u8>> {
    let queues = self.queues.lock().await;
    queues.get(queue).map(|s| s.poisoned.iter().map(|e| e.payload.clone()).collect()).unwrap_or_default()
  }

  /// Number of messages currently visible and waiting in `queue`.
  pub async fn depth(&self, queue: &str) -> usize {
    let queues = self.queues.lock().await;
    queues.get(queue).map(|s| s.ready.len()).unwrap_or(0)
  }
}
