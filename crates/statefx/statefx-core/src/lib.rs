//! statefx core (engine-agnostic)
//!
//! Binds animator states to effects and notification messages. Each tick the
//! [`Engine`] reads every animator layer through [`AnimatorQuery`], detects
//! state changes, and dispatches exit → enter → update to the bound
//! [`StateBinding`]s, which start and stop their [`EffectInstance`]s (with
//! optional delays) and notify listeners registered in a [`ListenerRegistry`].

pub mod animator;
pub mod binding;
pub mod config;
pub mod effect;
pub mod engine;
pub mod error;
pub mod ids;
pub mod layer;
pub mod notify;
pub mod outputs;
pub mod stored_bindings;
pub mod time;

// Re-exports for consumers (adapters)
pub use animator::{AnimatorQuery, ManualAnimator, StateInfo, TransitionInfo};
pub use binding::{BindingCtx, StateBinding, StateBindingCfg};
pub use config::Config;
pub use effect::{
    EffectInstance, EffectResolver, EffectSpec, EffectState, EffectTarget, OpKind, PendingOp,
};
pub use engine::Engine;
pub use error::{ConfigError, DispatchError, EngineError};
pub use ids::{BindingId, ListenerId, StateId};
pub use layer::LayerState;
pub use notify::{Delivery, ListenerRegistry, Notification, NotificationKind};
pub use outputs::{CoreEvent, Outputs};
pub use stored_bindings::{parse_bindings_json, BindingSetCfg};
pub use time::{Clock, FrameTime};
