//! Engine: owns bindings, layer snapshots and listeners; drives them once per tick.
//!
//! Methods:
//! - new, from_json, prebind (resolver), update / update_at (layers → exit → enter → update → tail)
//! - reinitialize when the animator's layer count changes

use log::{debug, warn};

use crate::animator::AnimatorQuery;
use crate::binding::{BindingCtx, StateBinding, StateBindingCfg};
use crate::config::Config;
use crate::effect::EffectResolver;
use crate::error::{ConfigError, EngineError};
use crate::ids::{BindingId, IdAllocator, StateId};
use crate::layer::LayerState;
use crate::notify::ListenerRegistry;
use crate::outputs::{CoreEvent, Outputs};
use crate::stored_bindings::{parse_bindings_json, BindingSetCfg};
use crate::time::{Clock, FrameTime};

#[derive(Debug)]
pub struct Engine {
    cfg: Config,
    bindings: Vec<StateBinding>,
    /// Active bindings in activation order.
    active: Vec<BindingId>,
    /// Per binding: number of layers whose current state it matches.
    active_refs: Vec<u32>,
    layers: Vec<LayerState>,
    listeners: ListenerRegistry,
    clock: Clock,

    // Per-tick outputs
    outputs: Outputs,
}

impl Engine {
    /// Create an engine for an animator with `layer_count` layers.
    pub fn new(cfg: Config, bindings: Vec<StateBindingCfg>, layer_count: usize) -> Self {
        let mut ids = IdAllocator::new();
        let bindings: Vec<StateBinding> = bindings
            .into_iter()
            .map(|b| StateBinding::new(ids.alloc_binding(), b))
            .collect();
        let mut engine = Self {
            outputs: Outputs::with_limit(cfg.max_events_per_tick),
            cfg,
            active: Vec::new(),
            active_refs: vec![0; bindings.len()],
            bindings,
            layers: Vec::new(),
            listeners: ListenerRegistry::new(),
            clock: Clock::new(),
        };
        engine.reinitialize(layer_count);
        engine
    }

    pub fn from_set(cfg: Config, set: BindingSetCfg, layer_count: usize) -> Self {
        Self::new(cfg, set.bindings, layer_count)
    }

    /// Parse, validate and load a JSON binding document.
    pub fn from_json(cfg: Config, json: &str, layer_count: usize) -> Result<Self, ConfigError> {
        let set = parse_bindings_json(json)?;
        Ok(Self::from_set(cfg, set, layer_count))
    }

    /// One-time resolution of effect targets. Returns the target names left unbound.
    pub fn prebind(&mut self, resolver: &mut dyn EffectResolver) -> Vec<String> {
        let mut unresolved = Vec::new();
        for b in &mut self.bindings {
            for target in b.prebind(resolver) {
                warn!(
                    "effect target '{}' for state '{}' could not be resolved",
                    target,
                    b.state_name()
                );
                unresolved.push(target);
            }
        }
        unresolved
    }

    /// Rebuild layer snapshots for `layer_count` layers, reset every binding and
    /// forget which bindings were active. The next tick enters the current states afresh.
    pub fn reinitialize(&mut self, layer_count: usize) {
        self.layers = (0..layer_count).map(LayerState::new).collect();
        for b in &mut self.bindings {
            b.reset();
        }
        self.active.clear();
        self.active_refs.iter_mut().for_each(|r| *r = 0);
        self.outputs.clear();
    }

    /// Reinitialize with the current layer count.
    pub fn reset(&mut self) {
        self.reinitialize(self.layers.len());
    }

    /// Step by `dt` seconds using the engine's own clock.
    pub fn update(&mut self, dt: f32, animator: &dyn AnimatorQuery) -> Result<&Outputs, EngineError> {
        self.check_layers(animator)?;
        let time = self.clock.tick(dt);
        self.step(time, animator);
        Ok(&self.outputs)
    }

    /// Step with time supplied by the host.
    pub fn update_at(
        &mut self,
        time: FrameTime,
        animator: &dyn AnimatorQuery,
    ) -> Result<&Outputs, EngineError> {
        self.check_layers(animator)?;
        self.clock.sync(time);
        self.step(time, animator);
        Ok(&self.outputs)
    }

    fn check_layers(&mut self, animator: &dyn AnimatorQuery) -> Result<(), EngineError> {
        let actual = animator.layer_count();
        if actual != self.layers.len() {
            self.outputs.clear();
            warn!(
                "[frame {}] animator has {} layers, engine tracks {}; tick skipped",
                self.clock.frame(),
                actual,
                self.layers.len()
            );
            return Err(EngineError::LayerCountMismatch {
                expected: self.layers.len(),
                actual,
            });
        }
        Ok(())
    }

    fn step(&mut self, time: FrameTime, animator: &dyn AnimatorQuery) {
        self.outputs.clear();

        for layer in 0..self.layers.len() {
            self.layers[layer].update(animator, time.dt);
            if self.layers[layer].changed {
                self.apply_change(layer, time);
            }
            self.update_active(layer, time);
        }

        // Tail pending effect operations against the fresh layer snapshots.
        for b in &mut self.bindings {
            let active = self.active_refs[b.id().index()] > 0;
            b.poll_effects(active, &self.layers, time, &self.cfg, &mut self.outputs);
        }
    }

    /// Diff membership for a changed layer, then dispatch all exits before any enter.
    fn apply_change(&mut self, layer: usize, time: FrameTime) {
        let previous = self.layers[layer].previous;
        let current = self.layers[layer].state_id();
        let exits = self.matching(previous);
        let enters = self.matching(current);

        for &id in &exits {
            let refs = &mut self.active_refs[id.index()];
            *refs = refs.saturating_sub(1);
            if *refs == 0 {
                self.active.retain(|a| *a != id);
            }
        }
        for &id in &enters {
            let refs = &mut self.active_refs[id.index()];
            if *refs == 0 {
                self.active.push(id);
            }
            *refs += 1;
        }

        for &id in &exits {
            let b = &mut self.bindings[id.index()];
            debug!(
                "[frame {}] layer {} exit '{}'",
                time.frame,
                layer,
                b.state_name()
            );
            self.outputs.push_event(CoreEvent::BindingExited {
                state: b.state_name().to_string(),
                layer,
            });
            let mut cx = BindingCtx {
                time,
                layer_index: layer,
                layers: &self.layers,
                listeners: &mut self.listeners,
                cfg: &self.cfg,
                out: &mut self.outputs,
            };
            b.exit(&mut cx);
        }
        for &id in &enters {
            let b = &mut self.bindings[id.index()];
            debug!(
                "[frame {}] layer {} enter '{}'",
                time.frame,
                layer,
                b.state_name()
            );
            self.outputs.push_event(CoreEvent::BindingEntered {
                state: b.state_name().to_string(),
                layer,
            });
            let mut cx = BindingCtx {
                time,
                layer_index: layer,
                layers: &self.layers,
                listeners: &mut self.listeners,
                cfg: &self.cfg,
                out: &mut self.outputs,
            };
            b.enter(&mut cx);
        }
    }

    /// Update every active binding bound to this layer's current state.
    fn update_active(&mut self, layer: usize, time: FrameTime) {
        let current = self.layers[layer].state_id();
        for id in &self.active {
            let b = &mut self.bindings[id.index()];
            if !b.matches(current) {
                continue;
            }
            let mut cx = BindingCtx {
                time,
                layer_index: layer,
                layers: &self.layers,
                listeners: &mut self.listeners,
                cfg: &self.cfg,
                out: &mut self.outputs,
            };
            b.update(&mut cx);
        }
    }

    fn matching(&self, state: Option<StateId>) -> Vec<BindingId> {
        if state.is_none() {
            return Vec::new();
        }
        self.bindings
            .iter()
            .filter(|b| b.matches(state))
            .map(StateBinding::id)
            .collect()
    }
}

impl Engine {
    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn outputs(&self) -> &Outputs {
        &self.outputs
    }

    pub fn listeners(&self) -> &ListenerRegistry {
        &self.listeners
    }

    pub fn listeners_mut(&mut self) -> &mut ListenerRegistry {
        &mut self.listeners
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Snapshot for one layer, or `None` when the index is out of range.
    pub fn layer_state(&self, layer: usize) -> Option<&LayerState> {
        self.layers.get(layer)
    }

    pub fn layer_states(&self) -> &[LayerState] {
        &self.layers
    }

    pub fn bindings(&self) -> &[StateBinding] {
        &self.bindings
    }

    pub fn binding(&self, id: BindingId) -> Option<&StateBinding> {
        self.bindings.get(id.index())
    }

    /// First binding configured for `state`.
    pub fn binding_for_state(&self, state: &str) -> Option<&StateBinding> {
        let id = StateId::from_name(state);
        self.bindings.iter().find(|b| b.state_id() == id)
    }

    pub fn is_active(&self, id: BindingId) -> bool {
        self.active_refs.get(id.index()).is_some_and(|r| *r > 0)
    }

    /// Active bindings in activation order.
    pub fn active_bindings(&self) -> impl Iterator<Item = &StateBinding> {
        self.active.iter().map(move |id| &self.bindings[id.index()])
    }

    pub fn frame(&self) -> u64 {
        self.clock.frame()
    }

    pub fn now(&self) -> f32 {
        self.clock.now()
    }
}
