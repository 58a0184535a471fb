//! Named notification delivery.
//!
//! Listeners are registered under a message name and invoked synchronously in
//! registration order. Whether a message without listeners is an error depends
//! on the [`Delivery`] policy in effect.

use std::fmt;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::error::DispatchError;
use crate::ids::{IdAllocator, ListenerId};
use crate::layer::LayerState;
use crate::time::FrameTime;

/// What happens when a message has no receiver.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    /// A missing receiver is reported as a configuration error.
    #[default]
    Required,
    /// A missing receiver is ignored.
    BestEffort,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Enter,
    Exit,
    Update,
    Timer,
}

/// Payload handed to listeners.
#[derive(Clone, Copy, Debug)]
pub struct Notification<'a> {
    pub message: &'a str,
    pub kind: NotificationKind,
    /// Name of the bound state that produced the message.
    pub state: &'a str,
    pub layer_index: usize,
    pub layer: &'a LayerState,
    /// Every layer the engine tracks, as of this point in the tick.
    pub layers: &'a [LayerState],
    pub time: FrameTime,
}

type Callback = Box<dyn FnMut(&Notification<'_>)>;

struct Listener {
    id: ListenerId,
    callback: Callback,
}

/// Message name → listeners, in registration order.
#[derive(Default)]
pub struct ListenerRegistry {
    ids: IdAllocator,
    listeners: HashMap<String, Vec<Listener>>,
}

impl fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut m = f.debug_map();
        for (name, list) in &self.listeners {
            m.entry(name, &list.len());
        }
        m.finish()
    }
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, message: &str, callback: F) -> ListenerId
    where
        F: FnMut(&Notification<'_>) + 'static,
    {
        let id = self.ids.alloc_listener();
        self.listeners
            .entry(message.to_string())
            .or_default()
            .push(Listener {
                id,
                callback: Box::new(callback),
            });
        id
    }

    /// Remove a listener; returns false if the id is unknown.
    pub fn unregister(&mut self, id: ListenerId) -> bool {
        let mut removed = false;
        self.listeners.retain(|_, list| {
            let before = list.len();
            list.retain(|l| l.id != id);
            removed |= list.len() != before;
            !list.is_empty()
        });
        removed
    }

    pub fn has_listener(&self, message: &str) -> bool {
        self.listener_count(message) > 0
    }

    pub fn listener_count(&self, message: &str) -> usize {
        self.listeners.get(message).map_or(0, Vec::len)
    }

    pub fn clear(&mut self) {
        self.listeners.clear();
    }

    /// Invoke every listener of `n.message`; returns how many ran.
    pub fn deliver(&mut self, n: &Notification<'_>) -> usize {
        match self.listeners.get_mut(n.message) {
            Some(list) => {
                for l in list.iter_mut() {
                    (l.callback)(n);
                }
                list.len()
            }
            None => 0,
        }
    }

    /// Deliver under `policy`, reporting a missing receiver when it is required.
    pub fn send(&mut self, n: &Notification<'_>, policy: Delivery) -> Result<(), DispatchError> {
        if self.deliver(n) == 0 && policy == Delivery::Required {
            return Err(DispatchError::MissingListener {
                message: n.message.to_string(),
                state: n.state.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn note<'a>(message: &'a str, layer: &'a LayerState) -> Notification<'a> {
        Notification {
            message,
            kind: NotificationKind::Enter,
            state: "Run",
            layer_index: 0,
            layer,
            layers: std::slice::from_ref(layer),
            time: FrameTime::default(),
        }
    }

    #[test]
    fn listeners_run_in_registration_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut reg = ListenerRegistry::new();
        let (a, b) = (log.clone(), log.clone());
        reg.register("OnRun", move |_| a.borrow_mut().push("first"));
        reg.register("OnRun", move |_| b.borrow_mut().push("second"));

        let layer = LayerState::new(0);
        assert_eq!(reg.deliver(&note("OnRun", &layer)), 2);
        assert_eq!(*log.borrow(), vec!["first", "second"]);
    }

    #[test]
    fn required_delivery_reports_missing_receiver() {
        let mut reg = ListenerRegistry::new();
        let layer = LayerState::new(0);
        let err = reg
            .send(&note("OnNothing", &layer), Delivery::Required)
            .unwrap_err();
        assert_eq!(
            err,
            DispatchError::MissingListener {
                message: "OnNothing".into(),
                state: "Run".into()
            }
        );
        assert!(reg
            .send(&note("OnNothing", &layer), Delivery::BestEffort)
            .is_ok());
    }

    #[test]
    fn unregister_drops_only_that_listener() {
        let mut reg = ListenerRegistry::new();
        let id = reg.register("A", |_| {});
        reg.register("A", |_| {});
        assert!(reg.unregister(id));
        assert!(!reg.unregister(id));
        assert_eq!(reg.listener_count("A"), 1);
    }
}
