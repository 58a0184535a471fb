//! Per-layer runtime snapshot rebuilt every tick.

use serde::{Deserialize, Serialize};

use crate::animator::{AnimatorQuery, StateInfo, TransitionInfo};
use crate::ids::StateId;

/// Latest animator facts for one layer plus the timing derived from them.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LayerState {
    pub index: usize,
    /// State the layer is in, or heading to while in transition. `None` before the first update.
    pub state: Option<StateInfo>,
    /// Identity held before the latest update.
    pub previous: Option<StateId>,
    pub in_transition: bool,
    pub transition: Option<TransitionInfo>,
    /// Seconds since the running transition began.
    pub transition_seconds: f32,
    /// Seconds since the current loop began.
    pub state_seconds: f32,
    pub loop_count: i32,
    /// Seconds spent in completed loops.
    pub state_seconds_total: f32,
    /// Identity changed, or a transition began, during the latest update.
    pub changed: bool,
}

impl LayerState {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            ..Self::default()
        }
    }

    /// Pull this tick's facts for the layer from the animator.
    pub fn update(&mut self, animator: &dyn AnimatorQuery, dt: f32) {
        let layer = self.index;
        let was_in_transition = self.in_transition;
        let in_transition = animator.is_in_transition(layer);

        let previous = self.state.map(|s| s.id);
        let info = if in_transition {
            let info = animator.next_state_info(layer);
            // A retargeted blend restarts the transition clock.
            if was_in_transition && previous == Some(info.id) {
                self.transition_seconds += dt;
            } else {
                self.transition_seconds = 0.0;
            }
            self.transition = Some(animator.transition_info(layer));
            info
        } else {
            self.transition = None;
            animator.current_state_info(layer)
        };

        self.changed = previous != Some(info.id) || (in_transition && !was_in_transition);
        self.previous = previous;
        self.in_transition = in_transition;
        self.state = Some(info);

        let loops = info.normalized_time.floor();
        self.loop_count = loops as i32;
        self.state_seconds = info.length * (info.normalized_time - loops);
        self.state_seconds_total = info.length * loops;
    }

    #[inline]
    pub fn state_id(&self) -> Option<StateId> {
        self.state.map(|s| s.id)
    }

    #[inline]
    pub fn is_state(&self, id: StateId) -> bool {
        self.state_id() == Some(id)
    }

    /// Playback position used as the reference for play delays.
    ///
    /// Outside a transition this is the time spent in completed loops. While
    /// blending it is measured from the estimated end of the transition, so it
    /// is negative and a delay only runs out once the blend is over. `None`
    /// while the transition has not progressed far enough to be estimated.
    pub fn playback_elapsed(&self) -> Option<f32> {
        if self.in_transition {
            self.estimated_transition_length()
                .map(|length| self.transition_seconds - length)
        } else {
            Some(self.state_seconds_total)
        }
    }

    pub fn transition_progress(&self) -> Option<f32> {
        self.transition.map(|t| t.normalized_time)
    }

    /// Total transition length extrapolated from elapsed seconds and progress.
    pub fn estimated_transition_length(&self) -> Option<f32> {
        let progress = self.transition_progress()?;
        if progress > 0.0 && self.transition_seconds > 0.0 {
            Some(self.transition_seconds / progress)
        } else {
            None
        }
    }
}
