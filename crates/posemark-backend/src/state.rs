//! Application state.

use std::sync::Arc;

use crate::config::BackendConfig;
use crate::runner::{InferenceRunner, RunnerConfig};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<BackendConfig>,
    pub runner: Arc<InferenceRunner>,
}

impl AppState {
    /// Create new application state.
    pub fn new(config: BackendConfig) -> Self {
        let runner = InferenceRunner::new(RunnerConfig {
            program: config.program.clone(),
            args: config.program_args.clone(),
            stderr_tail_lines: config.stderr_tail_lines,
        });

        Self {
            config: Arc::new(config),
            runner: Arc::new(runner),
        }
    }
}
