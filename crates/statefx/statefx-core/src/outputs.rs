//! Output contracts from the core engine.
//!
//! Outputs carry the semantic events of one tick plus the dispatch errors
//! isolated to individual bindings. Hosts inspect or forward them after each
//! `Engine::update()`.

use serde::{Deserialize, Serialize};

use crate::error::DispatchError;
use crate::notify::NotificationKind;

/// Discrete semantic signals emitted during a tick, in dispatch order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum CoreEvent {
    BindingExited {
        state: String,
        layer: usize,
    },
    BindingEntered {
        state: String,
        layer: usize,
    },
    Notified {
        message: String,
        kind: NotificationKind,
        layer: usize,
    },
    EffectActivated {
        target: String,
    },
    EffectDeactivated {
        target: String,
    },
    EffectReset {
        target: String,
    },
}

/// Outputs returned by Engine::update().
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Outputs {
    #[serde(default)]
    pub events: Vec<CoreEvent>,
    #[serde(default)]
    pub errors: Vec<DispatchError>,
    /// Events discarded this tick because `max_events` was reached.
    #[serde(default)]
    pub events_dropped: usize,
    #[serde(skip)]
    max_events: Option<usize>,
}

impl Outputs {
    /// Outputs that keep at most `max_events` events per tick.
    pub fn with_limit(max_events: usize) -> Self {
        Self {
            max_events: Some(max_events),
            ..Self::default()
        }
    }

    #[inline]
    pub fn clear(&mut self) {
        self.events.clear();
        self.errors.clear();
        self.events_dropped = 0;
    }

    #[inline]
    pub fn push_event(&mut self, event: CoreEvent) {
        match self.max_events {
            Some(max) if self.events.len() >= max => self.events_dropped += 1,
            _ => self.events.push(event),
        }
    }

    #[inline]
    pub fn push_error(&mut self, error: DispatchError) {
        self.errors.push(error);
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty() && self.errors.is_empty()
    }

    /// Messages delivered this tick, in order.
    pub fn messages(&self) -> impl Iterator<Item = &str> {
        self.events.iter().filter_map(|e| match e {
            CoreEvent::Notified { message, .. } => Some(message.as_str()),
            _ => None,
        })
    }
}
