//! Worker runtime: the consumer loop and its liveness surface.
//!
//! Core components:
//! - `state`: consumer state machine (Idle → … → Acknowledging → Idle)
//! - `consumer`: delivery handling, settlement and `RetryPolicy`
//! - `health`: atomics shared between the loop and the health route
//! - `routes`: axum `/health` endpoint

pub mod consumer;
pub mod health;
pub mod routes;
pub mod state;

pub use consumer::{Consumer, Disposition, RetryPolicy};
pub use health::{HealthSnapshot, WorkerHealth};
pub use routes::health_routes;
pub use state::ConsumerState;
