//! State bindings: one animator state tied to effects and notifications.

use log::warn;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::effect::{EffectCtx, EffectInstance, EffectResolver, EffectSpec};
use crate::error::DispatchError;
use crate::ids::{BindingId, StateId};
use crate::layer::LayerState;
use crate::notify::{ListenerRegistry, Notification, NotificationKind};
use crate::outputs::{CoreEvent, Outputs};
use crate::time::FrameTime;

/// Declarative form of a binding. Empty message names disable that notification.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StateBindingCfg {
    pub state: String,
    #[serde(default)]
    pub enter: String,
    #[serde(default)]
    pub exit: String,
    #[serde(default)]
    pub update: String,
    #[serde(default)]
    pub timer: String,
    /// Seconds into each loop at which `timer` fires; 0 disables the timer.
    #[serde(default)]
    pub timer_threshold: f32,
    #[serde(default)]
    pub effects: Vec<EffectSpec>,
}

impl StateBindingCfg {
    pub fn new(state: &str) -> Self {
        Self {
            state: state.to_string(),
            ..Self::default()
        }
    }

    pub fn on_enter(mut self, message: &str) -> Self {
        self.enter = message.to_string();
        self
    }

    pub fn on_exit(mut self, message: &str) -> Self {
        self.exit = message.to_string();
        self
    }

    pub fn on_update(mut self, message: &str) -> Self {
        self.update = message.to_string();
        self
    }

    pub fn on_timer(mut self, message: &str, threshold: f32) -> Self {
        self.timer = message.to_string();
        self.timer_threshold = threshold;
        self
    }

    pub fn with_effect(mut self, effect: EffectSpec) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Everything a binding needs from the engine for one call.
pub struct BindingCtx<'a> {
    pub time: FrameTime,
    pub layer_index: usize,
    pub layers: &'a [LayerState],
    pub listeners: &'a mut ListenerRegistry,
    pub cfg: &'a Config,
    pub out: &'a mut Outputs,
}

#[derive(Debug)]
pub struct StateBinding {
    id: BindingId,
    state_id: StateId,
    state: String,
    enter: String,
    exit: String,
    update: String,
    timer: String,
    timer_threshold: f32,
    effects: Vec<EffectInstance>,
    /// Timer already fired during the current loop.
    timer_armed: bool,
}

impl StateBinding {
    pub fn new(id: BindingId, cfg: StateBindingCfg) -> Self {
        Self {
            id,
            state_id: StateId::from_name(&cfg.state),
            state: cfg.state,
            enter: cfg.enter,
            exit: cfg.exit,
            update: cfg.update,
            timer: cfg.timer,
            timer_threshold: cfg.timer_threshold,
            effects: cfg.effects.into_iter().map(EffectInstance::new).collect(),
            timer_armed: false,
        }
    }

    #[inline]
    pub fn id(&self) -> BindingId {
        self.id
    }

    #[inline]
    pub fn state_name(&self) -> &str {
        &self.state
    }

    #[inline]
    pub fn state_id(&self) -> StateId {
        self.state_id
    }

    #[inline]
    pub fn matches(&self, id: Option<StateId>) -> bool {
        id == Some(self.state_id)
    }

    pub fn effects(&self) -> &[EffectInstance] {
        &self.effects
    }

    #[inline]
    pub fn timer_armed(&self) -> bool {
        self.timer_armed
    }

    /// Resolve effect targets; returns the names that stayed unbound.
    pub fn prebind(&mut self, resolver: &mut dyn EffectResolver) -> Vec<String> {
        let mut unresolved = Vec::new();
        for fx in &mut self.effects {
            match resolver.resolve(&fx.spec().target) {
                Some(target) => fx.bind(target),
                None => unresolved.push(fx.spec().target.clone()),
            }
        }
        unresolved
    }

    /// Disarm the timer and force every effect to `Stopped` without delay or notification.
    pub fn reset(&mut self) {
        self.timer_armed = false;
        for fx in &mut self.effects {
            fx.reset(false);
        }
    }

    pub fn enter(&mut self, cx: &mut BindingCtx<'_>) {
        self.timer_armed = false;
        self.notify(&self.enter, NotificationKind::Enter, cx);
        let layers = cx.layers;
        let layer = &layers[cx.layer_index];
        let mut ecx = EffectCtx {
            time: cx.time,
            state: &self.state,
            reset_delivery: cx.cfg.reset_signals,
            out: &mut *cx.out,
        };
        for fx in &mut self.effects {
            if let Err(e) = fx.play(layer, &mut ecx) {
                report(ecx.out, cx.time, e);
            }
        }
    }

    pub fn update(&mut self, cx: &mut BindingCtx<'_>) {
        self.notify(&self.update, NotificationKind::Update, cx);
        if self.timer.is_empty() || self.timer_threshold == 0.0 {
            return;
        }
        let seconds = cx.layers[cx.layer_index].state_seconds;
        if self.timer_armed && seconds <= self.timer_threshold {
            self.timer_armed = false;
        } else if !self.timer_armed && seconds > self.timer_threshold {
            self.notify(&self.timer, NotificationKind::Timer, cx);
            self.timer_armed = true;
        }
    }

    pub fn exit(&mut self, cx: &mut BindingCtx<'_>) {
        self.notify(&self.exit, NotificationKind::Exit, cx);
        let mut ecx = EffectCtx {
            time: cx.time,
            state: &self.state,
            reset_delivery: cx.cfg.reset_signals,
            out: &mut *cx.out,
        };
        for fx in &mut self.effects {
            if let Err(e) = fx.stop(&mut ecx) {
                report(ecx.out, cx.time, e);
            }
        }
    }

    /// Advance pending delayed plays/stops of every effect.
    pub fn poll_effects(
        &mut self,
        active: bool,
        layers: &[LayerState],
        time: FrameTime,
        cfg: &Config,
        out: &mut Outputs,
    ) {
        let mut ecx = EffectCtx {
            time,
            state: &self.state,
            reset_delivery: cfg.reset_signals,
            out,
        };
        for fx in &mut self.effects {
            if let Err(e) = fx.poll(active, layers, &mut ecx) {
                report(ecx.out, time, e);
            }
        }
    }

    fn notify(&self, message: &str, kind: NotificationKind, cx: &mut BindingCtx<'_>) {
        if message.is_empty() {
            return;
        }
        let layers = cx.layers;
        let n = Notification {
            message,
            kind,
            state: &self.state,
            layer_index: cx.layer_index,
            layer: &layers[cx.layer_index],
            layers,
            time: cx.time,
        };
        match cx.listeners.send(&n, cx.cfg.notifications) {
            Ok(()) => cx.out.push_event(CoreEvent::Notified {
                message: message.to_string(),
                kind,
                layer: cx.layer_index,
            }),
            Err(e) => report(cx.out, cx.time, e),
        }
    }
}

fn report(out: &mut Outputs, time: FrameTime, error: DispatchError) {
    warn!("[frame {}] {}", time.frame, error);
    out.push_error(error);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::{EffectState, EffectTarget};
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Flag(Rc<RefCell<bool>>);

    impl EffectTarget for Flag {
        fn set_active(&mut self, active: bool) {
            *self.0.borrow_mut() = active;
        }
        fn reset(&mut self) -> bool {
            true
        }
    }

    struct Resolver(Rc<RefCell<bool>>);

    impl EffectResolver for Resolver {
        fn resolve(&mut self, target: &str) -> Option<Box<dyn EffectTarget>> {
            (target == "dust").then(|| Box::new(Flag(self.0.clone())) as Box<dyn EffectTarget>)
        }
    }

    fn layer_with_seconds(seconds: f32) -> LayerState {
        LayerState {
            state_seconds: seconds,
            ..LayerState::new(0)
        }
    }

    fn run_update(
        b: &mut StateBinding,
        layers: &[LayerState],
        reg: &mut ListenerRegistry,
        out: &mut Outputs,
    ) {
        let cfg = Config::default();
        let mut cx = BindingCtx {
            time: FrameTime::default(),
            layer_index: 0,
            layers,
            listeners: reg,
            cfg: &cfg,
            out,
        };
        b.update(&mut cx);
    }

    #[test]
    fn timer_fires_on_first_crossing_only() {
        let mut b = StateBinding::new(
            BindingId(0),
            StateBindingCfg::new("Run").on_timer("OnStep", 0.4),
        );
        let fired = Rc::new(RefCell::new(0));
        let mut reg = ListenerRegistry::new();
        let f = fired.clone();
        reg.register("OnStep", move |_| *f.borrow_mut() += 1);
        let mut out = Outputs::default();

        for (tick, s) in [0.2, 0.5, 0.9].into_iter().enumerate() {
            run_update(&mut b, &[layer_with_seconds(s)], &mut reg, &mut out);
            let expected = if tick == 0 { 0 } else { 1 };
            assert_eq!(*fired.borrow(), expected, "tick {tick}");
        }
        assert!(b.timer_armed());

        // Loop wrap disarms, next crossing refires.
        run_update(&mut b, &[layer_with_seconds(0.1)], &mut reg, &mut out);
        assert!(!b.timer_armed());
        run_update(&mut b, &[layer_with_seconds(0.6)], &mut reg, &mut out);
        assert_eq!(*fired.borrow(), 2);
    }

    #[test]
    fn zero_threshold_disables_timer() {
        let mut b = StateBinding::new(BindingId(0), StateBindingCfg::new("Run").on_timer("OnStep", 0.0));
        let mut reg = ListenerRegistry::new();
        let mut out = Outputs::default();
        run_update(&mut b, &[layer_with_seconds(3.0)], &mut reg, &mut out);
        assert!(out.errors.is_empty());
        assert!(!b.timer_armed());
    }

    #[test]
    fn reset_enter_exit_leaves_effects_inactive() {
        let flag = Rc::new(RefCell::new(false));
        let mut b = StateBinding::new(
            BindingId(0),
            StateBindingCfg::new("Jump").with_effect(EffectSpec::new("dust")),
        );
        assert!(b.prebind(&mut Resolver(flag.clone())).is_empty());

        let cfg = Config::default();
        let mut reg = ListenerRegistry::new();
        let mut out = Outputs::default();
        let layers = [LayerState::new(0)];
        let mut cx = BindingCtx {
            time: FrameTime::default(),
            layer_index: 0,
            layers: &layers,
            listeners: &mut reg,
            cfg: &cfg,
            out: &mut out,
        };

        b.reset();
        b.enter(&mut cx);
        assert!(*flag.borrow());
        b.exit(&mut cx);
        assert!(!*flag.borrow());
        assert!(b
            .effects()
            .iter()
            .all(|fx| fx.state() == EffectState::Stopped && !fx.is_active()));
    }

    #[test]
    fn prebind_reports_unresolved_targets() {
        let mut b = StateBinding::new(
            BindingId(0),
            StateBindingCfg::new("Jump")
                .with_effect(EffectSpec::new("dust"))
                .with_effect(EffectSpec::new("smoke")),
        );
        let unresolved = b.prebind(&mut Resolver(Rc::new(RefCell::new(false))));
        assert_eq!(unresolved, vec!["smoke".to_string()]);
    }
}
