//! Read-only animator query contract.
//!
//! The engine never evaluates a state machine itself. Hosts implement
//! [`AnimatorQuery`] over whatever animator they run; [`ManualAnimator`] is a
//! small host-driven implementation for tools, tests and scripted playback.

use serde::{Deserialize, Serialize};

use crate::ids::StateId;

/// Playback descriptor for one state on one layer.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StateInfo {
    pub id: StateId,
    /// Integer part counts completed loops; fraction is progress within the current loop.
    pub normalized_time: f32,
    /// Length of one loop in seconds.
    pub length: f32,
}

impl StateInfo {
    pub fn new(name: &str, normalized_time: f32, length: f32) -> Self {
        Self {
            id: StateId::from_name(name),
            normalized_time,
            length,
        }
    }

    #[inline]
    pub fn is_name(&self, name: &str) -> bool {
        self.id == StateId::from_name(name)
    }
}

impl Default for StateInfo {
    fn default() -> Self {
        Self {
            id: StateId(0),
            normalized_time: 0.0,
            length: 0.0,
        }
    }
}

/// Blend progress between the current and the next state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TransitionInfo {
    /// 0 at transition start, 1 at its end.
    pub normalized_time: f32,
}

/// Per-layer queries, each called at most once per layer per tick.
pub trait AnimatorQuery {
    fn layer_count(&self) -> usize;
    fn is_in_transition(&self, layer: usize) -> bool;
    fn current_state_info(&self, layer: usize) -> StateInfo;
    /// Only meaningful while `is_in_transition(layer)` is true.
    fn next_state_info(&self, layer: usize) -> StateInfo;
    fn transition_info(&self, layer: usize) -> TransitionInfo;
}

#[derive(Clone, Debug, Default)]
struct ManualLayer {
    current: StateInfo,
    next: Option<StateInfo>,
    transition: TransitionInfo,
    transition_duration: f32,
}

/// Animator whose layers are driven explicitly by the host.
#[derive(Clone, Debug, Default)]
pub struct ManualAnimator {
    layers: Vec<ManualLayer>,
}

impl ManualAnimator {
    pub fn new(layer_count: usize) -> Self {
        Self {
            layers: vec![ManualLayer::default(); layer_count],
        }
    }

    /// Grow or shrink the layer list; new layers start in the default state.
    pub fn set_layer_count(&mut self, layer_count: usize) {
        self.layers.resize(layer_count, ManualLayer::default());
    }

    /// Jump a layer straight into `name`, dropping any transition in progress.
    pub fn set_state(&mut self, layer: usize, name: &str, normalized_time: f32, length: f32) {
        if let Some(l) = self.layers.get_mut(layer) {
            l.current = StateInfo::new(name, normalized_time, length);
            l.next = None;
            l.transition = TransitionInfo::default();
        }
    }

    /// Start blending towards `name` over `duration` seconds.
    /// A transition that is already running is replaced (interrupted).
    pub fn begin_transition(&mut self, layer: usize, name: &str, length: f32, duration: f32) {
        if let Some(l) = self.layers.get_mut(layer) {
            l.next = Some(StateInfo::new(name, 0.0, length));
            l.transition = TransitionInfo {
                normalized_time: 0.0,
            };
            l.transition_duration = duration.max(0.0);
        }
    }

    /// Complete the running transition so the next state becomes current.
    pub fn finish_transition(&mut self, layer: usize) {
        if let Some(l) = self.layers.get_mut(layer) {
            if let Some(next) = l.next.take() {
                l.current = next;
            }
            l.transition = TransitionInfo::default();
        }
    }

    /// Override playback position of the state a layer is heading to (current or next).
    pub fn set_normalized_time(&mut self, layer: usize, normalized_time: f32) {
        if let Some(l) = self.layers.get_mut(layer) {
            match l.next.as_mut() {
                Some(next) => next.normalized_time = normalized_time,
                None => l.current.normalized_time = normalized_time,
            }
        }
    }

    /// Advance every layer by `dt` seconds: normalized times move by `dt / length`
    /// and transitions finish once their progress reaches 1.
    pub fn advance(&mut self, dt: f32) {
        for l in &mut self.layers {
            step_state(&mut l.current, dt);
            if let Some(next) = l.next.as_mut() {
                step_state(next, dt);
                if l.transition_duration <= 0.0 {
                    l.transition.normalized_time = 1.0;
                } else {
                    l.transition.normalized_time += dt / l.transition_duration;
                }
                if l.transition.normalized_time >= 1.0 {
                    if let Some(next) = l.next.take() {
                        l.current = next;
                    }
                    l.transition = TransitionInfo::default();
                }
            }
        }
    }
}

fn step_state(info: &mut StateInfo, dt: f32) {
    if info.length > 0.0 {
        info.normalized_time += dt / info.length;
    }
}

impl AnimatorQuery for ManualAnimator {
    fn layer_count(&self) -> usize {
        self.layers.len()
    }

    fn is_in_transition(&self, layer: usize) -> bool {
        self.layers
            .get(layer)
            .map(|l| l.next.is_some())
            .unwrap_or(false)
    }

    fn current_state_info(&self, layer: usize) -> StateInfo {
        self.layers
            .get(layer)
            .map(|l| l.current)
            .unwrap_or_default()
    }

    fn next_state_info(&self, layer: usize) -> StateInfo {
        self.layers
            .get(layer)
            .and_then(|l| l.next)
            .unwrap_or_default()
    }

    fn transition_info(&self, layer: usize) -> TransitionInfo {
        self.layers
            .get(layer)
            .map(|l| l.transition)
            .unwrap_or_default()
    }
}
