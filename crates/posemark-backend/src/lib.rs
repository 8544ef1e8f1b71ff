//! HTTP bridge to the external pose-estimation program.
//!
//! This crate provides:
//! - The five inference endpoints plus video upload
//! - [`InferenceRunner`]: one supervised child process at a time
//! - Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod runner;
pub mod state;

pub use config::BackendConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use runner::{InferenceRunner, RunnerConfig, RunnerError};
pub use state::AppState;
