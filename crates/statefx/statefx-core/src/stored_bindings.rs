//! Stored binding documents: JSON in, validated [`BindingSetCfg`] out.

use serde::{Deserialize, Serialize};

use crate::binding::StateBindingCfg;
use crate::error::ConfigError;

/// Authoring document: the ordered bindings of one animator.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BindingSetCfg {
    #[serde(default)]
    pub bindings: Vec<StateBindingCfg>,
}

impl BindingSetCfg {
    /// Validate basic invariants (named states, finite non-negative delays and thresholds).
    pub fn validate_basic(&self) -> Result<(), ConfigError> {
        for (index, b) in self.bindings.iter().enumerate() {
            if b.state.trim().is_empty() {
                return Err(ConfigError::EmptyStateName { index });
            }
            if !b.timer_threshold.is_finite() || b.timer_threshold < 0.0 {
                return Err(ConfigError::InvalidThreshold {
                    state: b.state.clone(),
                });
            }
            for fx in &b.effects {
                let ok = |d: f32| d.is_finite() && d >= 0.0;
                if !ok(fx.play_delay) || !ok(fx.stop_delay) {
                    return Err(ConfigError::NegativeDelay {
                        state: b.state.clone(),
                        target: fx.target.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Public API: parse a binding document from JSON and validate it.
///
/// Accepts either `{ "bindings": [...] }` or a bare array of bindings.
/// Missing message names default to empty (disabled), missing delays to 0.
pub fn parse_bindings_json(s: &str) -> Result<BindingSetCfg, ConfigError> {
    let raw: RawDocument = serde_json::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?;
    let doc = match raw {
        RawDocument::Set(set) => set,
        RawDocument::List(bindings) => BindingSetCfg { bindings },
    };
    doc.validate_basic()?;
    Ok(doc)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDocument {
    Set(BindingSetCfg),
    List(Vec<StateBindingCfg>),
}
