//! Client for the pose-estimation inference backend.
//!
//! Provides a typed HTTP client for the five backend endpoints and a
//! cancellable [`InferenceSession`] that polls for per-frame results.

pub mod client;
pub mod error;
pub mod session;

pub use client::{InferenceClient, InferenceClientConfig, NextOutcome};
pub use error::{ClientResult, InferenceError};
pub use session::{CancelHandle, InferenceSession};
