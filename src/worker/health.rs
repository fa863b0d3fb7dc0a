//! Shared readiness flags and counters.
//!
//! Written by startup code and the consumer loop, read by the `/health`
//! route. Atomics only, so readers never wait on a job.

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};

use serde::Serialize;

use crate::worker::state::ConsumerState;

#[derive(Debug, Default)]
pub struct WorkerHealth {
    models_loaded: AtomicBool,
    queue_connected: AtomicBool,
    state: AtomicU8,
    processed: AtomicU64,
    acknowledged: AtomicU64,
    rejected: AtomicU64,
    requeued: AtomicU64,
}

/// Point-in-time view served by `/health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthSnapshot {
    pub status: &'static str,
    pub models: &'static str,
    pub queue: &'static str,
    pub consumer_state: ConsumerState,
    pub processed: u64,
    pub acknowledged: u64,
    pub rejected: u64,
    pub requeued: u64,
}

impl WorkerHealth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_models_loaded(&self, loaded: bool) {
        self.models_loaded.store(loaded, Ordering::Release);
    }

    pub fn set_queue_connected(&self, connected: bool) {
        self.queue_connected.store(connected, Ordering::Release);
    }

    pub fn set_consumer_state(&self, state: ConsumerState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    pub fn consumer_state(&self) -> ConsumerState {
        ConsumerState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ack(&self) {
        self.acknowledged.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reject(&self, requeued: bool) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
        if requeued {
            self.requeued.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Models loaded and queue connected.
    pub fn is_ready(&self) -> bool {
        self.models_loaded.load(Ordering::Acquire) && self.queue_connected.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let models_loaded = self.models_loaded.load(Ordering::Acquire);
        let queue_connected = self.queue_connected.load(Ordering::Acquire);
        HealthSnapshot {
            status: if models_loaded && queue_connected {
                "AI Worker Running"
            } else {
                "AI Worker Starting"
            },
            models: if models_loaded { "loaded" } else { "loading" },
            queue: if queue_connected {
                "connected"
            } else {
                "disconnected"
            },
            consumer_state: self.consumer_state(),
            processed: self.processed.load(Ordering::Relaxed),
            acknowledged: self.acknowledged.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            requeued: self.requeued.load(Ordering::Relaxed),
        }
    }
}
