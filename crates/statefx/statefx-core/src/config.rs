//! Core configuration for statefx-core.

use serde::{Deserialize, Serialize};

use crate::notify::Delivery;

/// Engine-wide policies and sizing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Whether enter/exit/update/timer messages need a registered listener.
    pub notifications: Delivery,
    /// Whether replay reset signals need a target that handles them.
    pub reset_signals: Delivery,
    /// Maximum events to retain per tick; extra events are counted as dropped.
    pub max_events_per_tick: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            notifications: Delivery::Required,
            reset_signals: Delivery::Required,
            max_events_per_tick: 1024,
        }
    }
}
