//! Effect instances and their delayed play/stop lifecycle.
//!
//! An [`EffectInstance`] wraps one externally owned [`EffectTarget`]. Play and
//! stop requests either complete immediately or leave a single [`PendingOp`]
//! that the engine polls once per tick. A newer request replaces the pending
//! record, which is how an opposing request cancels a delayed one.
//!
//! A delayed play is measured against the layer's playback position one tick
//! after the request, once a transition in progress can be estimated.

use std::fmt;

use log::trace;
use serde::{Deserialize, Serialize};

use crate::error::DispatchError;
use crate::layer::LayerState;
use crate::notify::Delivery;
use crate::outputs::{CoreEvent, Outputs};
use crate::time::FrameTime;

/// Host-side object realizing an effect (particles, audio source, ...).
pub trait EffectTarget {
    fn set_active(&mut self, active: bool);
    /// Restart the target's own internal state. Returns false when the target has no reset behaviour.
    fn reset(&mut self) -> bool;
}

/// Resolves configured target names to host objects.
/// Adapters implement this and pass it into `Engine::prebind()`.
pub trait EffectResolver {
    fn resolve(&mut self, target: &str) -> Option<Box<dyn EffectTarget>>;
}

/// Declarative options for one effect of a binding.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EffectSpec {
    /// Name handed to the [`EffectResolver`].
    pub target: String,
    /// Send a reset signal when the effect is played while still active.
    #[serde(default)]
    pub reset_on_replay: bool,
    #[serde(default)]
    pub play_delay: f32,
    #[serde(default)]
    pub stop_delay: f32,
}

impl EffectSpec {
    pub fn new(target: &str) -> Self {
        Self {
            target: target.to_string(),
            reset_on_replay: false,
            play_delay: 0.0,
            stop_delay: 0.0,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EffectState {
    Stopped,
    PendingPlay,
    Playing,
    PendingStop,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpKind {
    Play,
    Stop,
}

/// A deferred play or stop waiting for its delay.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingOp {
    pub kind: OpKind,
    /// Layer whose playback position the delay is measured against.
    pub layer: usize,
    /// Frame of the request.
    pub frame: u64,
    /// Time the delay is measured from.
    pub armed_at: f32,
    pub delay: f32,
    /// False until a play has been measured against its layer; stops are
    /// measured at request time.
    pub measured: bool,
}

impl PendingOp {
    #[inline]
    pub fn is_due(&self, now: f32) -> bool {
        now - self.armed_at >= self.delay
    }
}

/// Per-call context handed down by the engine.
pub struct EffectCtx<'a> {
    pub time: FrameTime,
    /// Name of the state owning the effect.
    pub state: &'a str,
    pub reset_delivery: Delivery,
    pub out: &'a mut Outputs,
}

pub struct EffectInstance {
    spec: EffectSpec,
    target: Option<Box<dyn EffectTarget>>,
    state: EffectState,
    pending: Option<PendingOp>,
    /// Last value passed to `set_active`.
    active: bool,
    requested_at: f32,
}

impl fmt::Debug for EffectInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectInstance")
            .field("spec", &self.spec)
            .field("bound", &self.target.is_some())
            .field("state", &self.state)
            .field("pending", &self.pending)
            .field("active", &self.active)
            .field("requested_at", &self.requested_at)
            .finish()
    }
}

impl EffectInstance {
    /// Unbound instance; resolve its target later with [`EffectInstance::bind`].
    pub fn new(spec: EffectSpec) -> Self {
        Self {
            spec,
            target: None,
            state: EffectState::Stopped,
            pending: None,
            active: false,
            requested_at: f32::NEG_INFINITY,
        }
    }

    pub fn with_target(spec: EffectSpec, target: Box<dyn EffectTarget>) -> Self {
        let mut inst = Self::new(spec);
        inst.target = Some(target);
        inst
    }

    pub fn bind(&mut self, target: Box<dyn EffectTarget>) {
        self.target = Some(target);
    }

    #[inline]
    pub fn is_bound(&self) -> bool {
        self.target.is_some()
    }

    #[inline]
    pub fn spec(&self) -> &EffectSpec {
        &self.spec
    }

    #[inline]
    pub fn state(&self) -> EffectState {
        self.state
    }

    #[inline]
    pub fn pending(&self) -> Option<PendingOp> {
        self.pending
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.active
    }

    #[inline]
    pub fn requested_at(&self) -> f32 {
        self.requested_at
    }

    /// Start the effect, immediately or once the play delay has elapsed.
    ///
    /// With a delay the request is only recorded here; [`EffectInstance::poll`]
    /// measures it against `layer` on a later tick.
    pub fn play(&mut self, layer: &LayerState, cx: &mut EffectCtx<'_>) -> Result<(), DispatchError> {
        self.ensure_bound(cx.state)?;
        match self.state {
            EffectState::PendingPlay => Ok(()),
            EffectState::Playing => {
                if self.spec.reset_on_replay {
                    self.signal_reset(cx)
                } else {
                    Ok(())
                }
            }
            EffectState::Stopped | EffectState::PendingStop => {
                if self.pending.take().is_some() {
                    trace!(
                        "[frame {}] effect '{}': pending stop canceled by play",
                        cx.time.frame,
                        self.spec.target
                    );
                }
                self.requested_at = cx.time.now;
                if self.spec.play_delay <= 0.0 {
                    return self.activate(cx);
                }
                self.pending = Some(PendingOp {
                    kind: OpKind::Play,
                    layer: layer.index,
                    frame: cx.time.frame,
                    armed_at: cx.time.now,
                    delay: self.spec.play_delay,
                    measured: false,
                });
                self.state = EffectState::PendingPlay;
                Ok(())
            }
        }
    }

    /// Stop the effect, immediately or once the stop delay has elapsed.
    pub fn stop(&mut self, cx: &mut EffectCtx<'_>) -> Result<(), DispatchError> {
        self.ensure_bound(cx.state)?;
        match self.state {
            EffectState::Stopped | EffectState::PendingStop => Ok(()),
            EffectState::Playing | EffectState::PendingPlay => {
                if self.pending.take().is_some() {
                    trace!(
                        "[frame {}] effect '{}': pending play canceled by stop",
                        cx.time.frame,
                        self.spec.target
                    );
                }
                self.requested_at = cx.time.now;
                if self.spec.stop_delay <= 0.0 {
                    self.deactivate(cx);
                    return Ok(());
                }
                self.pending = Some(PendingOp {
                    kind: OpKind::Stop,
                    layer: 0,
                    frame: cx.time.frame,
                    armed_at: cx.time.now,
                    delay: self.spec.stop_delay,
                    measured: true,
                });
                self.state = EffectState::PendingStop;
                Ok(())
            }
        }
    }

    /// Re-check a pending operation against this tick's layer snapshots.
    ///
    /// A pending play is abandoned when the binding that requested it is no
    /// longer active. An unmeasured play waits until a tick after its request
    /// and then turns into a wait of `delay - playback_elapsed` seconds.
    pub fn poll(
        &mut self,
        binding_active: bool,
        layers: &[LayerState],
        cx: &mut EffectCtx<'_>,
    ) -> Result<(), DispatchError> {
        let Some(op) = self.pending else {
            return Ok(());
        };
        match op.kind {
            OpKind::Play if !binding_active => {
                trace!(
                    "[frame {}] effect '{}': pending play canceled, state no longer active",
                    cx.time.frame,
                    self.spec.target
                );
                self.deactivate(cx);
                Ok(())
            }
            OpKind::Play if !op.measured => {
                if op.frame == cx.time.frame {
                    return Ok(());
                }
                let Some(elapsed) = layers.get(op.layer).and_then(LayerState::playback_elapsed)
                else {
                    return Ok(());
                };
                if elapsed >= op.delay {
                    return self.activate(cx);
                }
                let wait = op.delay - elapsed;
                trace!(
                    "[frame {}] effect '{}' delayed for {} seconds",
                    cx.time.frame,
                    self.spec.target,
                    wait
                );
                self.pending = Some(PendingOp {
                    armed_at: cx.time.now,
                    delay: wait,
                    measured: true,
                    ..op
                });
                Ok(())
            }
            OpKind::Play if op.is_due(cx.time.now) => self.activate(cx),
            OpKind::Stop if op.is_due(cx.time.now) => {
                self.deactivate(cx);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Force `Stopped`: deactivate, drop any pending operation and invalidate the
    /// last request. `signal` additionally asks the target to reset itself; an
    /// unhandled signal is ignored here.
    pub fn reset(&mut self, signal: bool) {
        self.pending = None;
        self.state = EffectState::Stopped;
        self.active = false;
        self.requested_at = f32::NEG_INFINITY;
        if let Some(target) = self.target.as_mut() {
            target.set_active(false);
            if signal {
                target.reset();
            }
        }
    }

    fn ensure_bound(&self, state: &str) -> Result<(), DispatchError> {
        if self.target.is_some() {
            Ok(())
        } else {
            Err(DispatchError::UnboundEffect {
                state: state.to_string(),
                target: self.spec.target.clone(),
            })
        }
    }

    fn activate(&mut self, cx: &mut EffectCtx<'_>) -> Result<(), DispatchError> {
        let was_active = self.active;
        self.pending = None;
        self.state = EffectState::Playing;
        self.active = true;
        if let Some(target) = self.target.as_mut() {
            target.set_active(true);
        }
        if was_active {
            if self.spec.reset_on_replay {
                return self.signal_reset(cx);
            }
            return Ok(());
        }
        trace!(
            "[frame {}] effect '{}' activated",
            cx.time.frame,
            self.spec.target
        );
        cx.out.push_event(CoreEvent::EffectActivated {
            target: self.spec.target.clone(),
        });
        Ok(())
    }

    fn deactivate(&mut self, cx: &mut EffectCtx<'_>) {
        self.pending = None;
        self.state = EffectState::Stopped;
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(target) = self.target.as_mut() {
            target.set_active(false);
        }
        trace!(
            "[frame {}] effect '{}' deactivated",
            cx.time.frame,
            self.spec.target
        );
        cx.out.push_event(CoreEvent::EffectDeactivated {
            target: self.spec.target.clone(),
        });
    }

    fn signal_reset(&mut self, cx: &mut EffectCtx<'_>) -> Result<(), DispatchError> {
        let handled = match self.target.as_mut() {
            Some(target) => target.reset(),
            None => false,
        };
        if handled {
            cx.out.push_event(CoreEvent::EffectReset {
                target: self.spec.target.clone(),
            });
            Ok(())
        } else if cx.reset_delivery == Delivery::Required {
            Err(DispatchError::ResetUnhandled {
                target: self.spec.target.clone(),
            })
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animator::TransitionInfo;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Active(bool),
        Reset,
    }

    struct Recorder {
        calls: Rc<RefCell<Vec<Call>>>,
        handles_reset: bool,
    }

    impl EffectTarget for Recorder {
        fn set_active(&mut self, active: bool) {
            self.calls.borrow_mut().push(Call::Active(active));
        }
        fn reset(&mut self) -> bool {
            self.calls.borrow_mut().push(Call::Reset);
            self.handles_reset
        }
    }

    fn instance(spec: EffectSpec, handles_reset: bool) -> (EffectInstance, Rc<RefCell<Vec<Call>>>) {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let inst = EffectInstance::with_target(
            spec,
            Box::new(Recorder {
                calls: calls.clone(),
                handles_reset,
            }),
        );
        (inst, calls)
    }

    fn at(now: f32) -> FrameTime {
        FrameTime {
            frame: (now * 10.0) as u64,
            now,
            dt: 0.1,
        }
    }

    fn ctx<'a>(now: f32, out: &'a mut Outputs) -> EffectCtx<'a> {
        EffectCtx {
            time: at(now),
            state: "Run",
            reset_delivery: Delivery::Required,
            out,
        }
    }

    #[test]
    fn immediate_play_and_stop() {
        let (mut fx, calls) = instance(EffectSpec::new("dust"), true);
        let layer = LayerState::new(0);
        let mut out = Outputs::default();

        fx.play(&layer, &mut ctx(0.0, &mut out)).unwrap();
        assert_eq!(fx.state(), EffectState::Playing);
        fx.stop(&mut ctx(0.1, &mut out)).unwrap();
        assert_eq!(fx.state(), EffectState::Stopped);
        assert_eq!(*calls.borrow(), vec![Call::Active(true), Call::Active(false)]);
    }

    #[test]
    fn stop_before_play_delay_cancels_activation() {
        let mut spec = EffectSpec::new("spark");
        spec.play_delay = 0.5;
        let (mut fx, calls) = instance(spec, true);
        let layer = LayerState::new(0);
        let mut out = Outputs::default();

        fx.play(&layer, &mut ctx(0.0, &mut out)).unwrap();
        assert_eq!(fx.state(), EffectState::PendingPlay);
        fx.stop(&mut ctx(0.2, &mut out)).unwrap();
        for t in [0.3, 0.6, 1.0] {
            fx.poll(true, &[layer.clone()], &mut ctx(t, &mut out)).unwrap();
        }
        assert_eq!(fx.state(), EffectState::Stopped);
        assert!(calls.borrow().iter().all(|c| *c != Call::Active(true)));
    }

    #[test]
    fn pending_play_completes_when_due() {
        let mut spec = EffectSpec::new("spark");
        spec.play_delay = 0.3;
        let (mut fx, calls) = instance(spec, true);
        let layer = LayerState::new(0);
        let mut out = Outputs::default();

        let layers = [layer.clone()];

        fx.play(&layer, &mut ctx(1.0, &mut out)).unwrap();
        fx.poll(true, &layers, &mut ctx(1.0, &mut out)).unwrap();
        assert!(!fx.pending().unwrap().measured);

        fx.poll(true, &layers, &mut ctx(1.1, &mut out)).unwrap();
        let op = fx.pending().unwrap();
        assert!(op.measured);
        assert!((op.delay - 0.3).abs() < 1e-5);

        fx.poll(true, &layers, &mut ctx(1.3, &mut out)).unwrap();
        assert_eq!(fx.state(), EffectState::PendingPlay);
        fx.poll(true, &layers, &mut ctx(1.5, &mut out)).unwrap();
        assert_eq!(fx.state(), EffectState::Playing);
        assert_eq!(*calls.borrow(), vec![Call::Active(true)]);
    }

    #[test]
    fn remaining_blend_is_added_to_play_delay() {
        let mut spec = EffectSpec::new("swoosh");
        spec.play_delay = 0.3;
        let (mut fx, _) = instance(spec, true);
        let mut out = Outputs::default();
        fx.play(&LayerState::new(0), &mut ctx(5.0, &mut out)).unwrap();

        // 0.2s into a blend at half progress: 0.2s of blend remain.
        let blending = [LayerState {
            in_transition: true,
            transition: Some(TransitionInfo {
                normalized_time: 0.5,
            }),
            transition_seconds: 0.2,
            ..LayerState::new(0)
        }];
        fx.poll(true, &blending, &mut ctx(5.1, &mut out)).unwrap();
        let op = fx.pending().unwrap();
        assert!((op.delay - 0.5).abs() < 1e-5);

        fx.poll(true, &blending, &mut ctx(5.5, &mut out)).unwrap();
        assert_eq!(fx.state(), EffectState::PendingPlay);
        fx.poll(true, &blending, &mut ctx(5.7, &mut out)).unwrap();
        assert_eq!(fx.state(), EffectState::Playing);
    }

    #[test]
    fn measurement_waits_for_transition_progress() {
        let mut spec = EffectSpec::new("swoosh");
        spec.play_delay = 0.3;
        let (mut fx, calls) = instance(spec, true);
        let mut out = Outputs::default();
        let starting = [LayerState {
            in_transition: true,
            transition: Some(TransitionInfo::default()),
            ..LayerState::new(0)
        }];

        fx.play(&starting[0], &mut ctx(1.0, &mut out)).unwrap();
        for t in [1.1, 1.5, 2.0] {
            fx.poll(true, &starting, &mut ctx(t, &mut out)).unwrap();
        }
        assert_eq!(fx.state(), EffectState::PendingPlay);
        assert!(!fx.pending().unwrap().measured);
        assert!(calls.borrow().is_empty());
    }

    #[test]
    fn replay_while_playing_resets_once() {
        let mut spec = EffectSpec::new("dust");
        spec.reset_on_replay = true;
        let (mut fx, calls) = instance(spec, true);
        let layer = LayerState::new(0);
        let mut out = Outputs::default();

        fx.play(&layer, &mut ctx(0.0, &mut out)).unwrap();
        fx.play(&layer, &mut ctx(0.1, &mut out)).unwrap();
        assert_eq!(fx.state(), EffectState::Playing);
        assert_eq!(*calls.borrow(), vec![Call::Active(true), Call::Reset]);
    }

    #[test]
    fn replay_during_pending_stop_keeps_target_active() {
        let mut spec = EffectSpec::new("trail");
        spec.stop_delay = 1.0;
        spec.reset_on_replay = true;
        let (mut fx, calls) = instance(spec, true);
        let layer = LayerState::new(0);
        let mut out = Outputs::default();

        fx.play(&layer, &mut ctx(0.0, &mut out)).unwrap();
        fx.stop(&mut ctx(0.5, &mut out)).unwrap();
        assert_eq!(fx.state(), EffectState::PendingStop);
        fx.play(&layer, &mut ctx(0.6, &mut out)).unwrap();
        fx.poll(true, &[layer.clone()], &mut ctx(2.0, &mut out)).unwrap();

        assert_eq!(fx.state(), EffectState::Playing);
        assert_eq!(
            *calls.borrow(),
            vec![Call::Active(true), Call::Active(true), Call::Reset]
        );
    }

    #[test]
    fn unhandled_reset_is_reported_when_required() {
        let mut spec = EffectSpec::new("dust");
        spec.reset_on_replay = true;
        let (mut fx, _) = instance(spec, false);
        let layer = LayerState::new(0);
        let mut out = Outputs::default();

        fx.play(&layer, &mut ctx(0.0, &mut out)).unwrap();
        let err = fx.play(&layer, &mut ctx(0.1, &mut out)).unwrap_err();
        assert_eq!(err, DispatchError::ResetUnhandled { target: "dust".into() });
        assert_eq!(fx.state(), EffectState::Playing);

        let mut relaxed = EffectCtx {
            reset_delivery: Delivery::BestEffort,
            ..ctx(0.2, &mut out)
        };
        assert!(fx.play(&layer, &mut relaxed).is_ok());
    }

    #[test]
    fn reset_drops_pending_and_invalidates_request() {
        let mut spec = EffectSpec::new("spark");
        spec.play_delay = 1.0;
        let (mut fx, calls) = instance(spec, true);
        let layer = LayerState::new(0);
        let mut out = Outputs::default();

        fx.play(&layer, &mut ctx(0.0, &mut out)).unwrap();
        fx.reset(false);
        assert_eq!(fx.requested_at(), f32::NEG_INFINITY);
        fx.poll(true, &[layer.clone()], &mut ctx(5.0, &mut out)).unwrap();
        assert_eq!(fx.state(), EffectState::Stopped);
        assert_eq!(*calls.borrow(), vec![Call::Active(false)]);
    }

    #[test]
    fn unbound_effect_reports_and_stays_stopped() {
        let mut fx = EffectInstance::new(EffectSpec::new("missing"));
        let layer = LayerState::new(0);
        let mut out = Outputs::default();
        let err = fx.play(&layer, &mut ctx(0.0, &mut out)).unwrap_err();
        assert!(matches!(err, DispatchError::UnboundEffect { .. }));
        assert_eq!(fx.state(), EffectState::Stopped);
    }
}
