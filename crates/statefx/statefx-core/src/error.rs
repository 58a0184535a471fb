//! Error types surfaced by configuration, dispatch and ticking.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Problems found while parsing or validating a binding document.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("binding json parse error: {0}")]
    Parse(String),
    #[error("binding #{index} has an empty state name")]
    EmptyStateName { index: usize },
    #[error("effect '{target}' on state '{state}' has a negative or non-finite delay")]
    NegativeDelay { state: String, target: String },
    #[error("timer threshold on state '{state}' must be finite and >= 0")]
    InvalidThreshold { state: String },
}

/// Failures isolated to one binding while dispatching a tick.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum DispatchError {
    #[error("no listener registered for required message '{message}' (state '{state}')")]
    MissingListener { message: String, state: String },
    #[error("effect '{target}' on state '{state}' is not bound to a target")]
    UnboundEffect { state: String, target: String },
    #[error("effect target '{target}' did not handle the reset signal")]
    ResetUnhandled { target: String },
}

/// Conditions that make the engine skip a whole tick.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("animator reports {actual} layers but the engine tracks {expected}; reinitialize required")]
    LayerCountMismatch { expected: usize, actual: usize },
}
