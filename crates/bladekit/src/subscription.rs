//! Gesture subscription tracking
//!
//! The driver is told which gestures the application wants to receive, and
//! separately which ones should still be forwarded to the OS. Both sets are
//! tracked here so repeated requests don't turn into repeated driver calls.
//!
//! # Reconciliation
//!
//! A request is a set of gestures plus an enable/disable flag. [`plan`]
//! decides what the active set becomes, or that nothing needs to happen:
//!
//! - a request carrying `All` makes the active set everything
//! - disabling nothing means enabling everything
//! - enabling nothing clears the active set (unless it is already clear)
//! - enabling gestures already active, or disabling gestures that aren't, is
//!   a no-op
//!
//! `{All}` with `all_enabled == false` is the "everything disabled" state;
//! it counts as an empty active set for enable and disable requests.
//!
//! [`plan`]: SubscriptionState::plan

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;
use crate::gesture::{self, Gesture, GestureSet};
use crate::native::Driver;

/// What a subscription currently has enabled
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionState {
    pub active: GestureSet,
    pub all_enabled: bool,
}

/// A reconcile decision that needs a native call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconcile {
    /// The active set after the call
    pub active: GestureSet,
    /// Flag passed to the native primitive
    pub enable: bool,
    pub all_enabled: bool,
}

impl SubscriptionState {
    /// The "everything disabled" state left by disabling `All`.
    fn all_disabled(&self) -> bool {
        self.active.contains(Gesture::All) && !self.all_enabled
    }

    /// The active set as far as enable/disable requests are concerned.
    fn effective(&self) -> GestureSet {
        if self.all_disabled() {
            GestureSet::new()
        } else {
            self.active.clone()
        }
    }

    /// Decide the outcome of requesting `requested` with `enabled`.
    ///
    /// Returns `None` when the request is already satisfied.
    pub fn plan(&self, requested: &GestureSet, enabled: bool) -> Option<Reconcile> {
        if requested.contains(Gesture::All) {
            return Some(Self::reconciled(GestureSet::all(), enabled));
        }

        if requested.is_nothing() {
            if !enabled {
                return self.plan(&GestureSet::from(Gesture::All), true);
            }
            if self.effective().is_nothing() {
                return None;
            }
            return Some(Self::reconciled(requested.clone(), enabled));
        }

        let effective = self.effective();
        let active = if enabled {
            if effective.covers(requested) {
                return None;
            }
            effective.union(requested)
        } else {
            if !effective.covers(requested) {
                return None;
            }
            effective.difference(requested)
        };

        Some(Self::reconciled(active.canonical(), enabled))
    }

    fn reconciled(active: GestureSet, enable: bool) -> Reconcile {
        let all_enabled = enable && active.contains(Gesture::All);
        Reconcile {
            active,
            enable,
            all_enabled,
        }
    }

    fn apply(&mut self, plan: Reconcile) {
        self.active = plan.active;
        self.all_enabled = plan.all_enabled;
    }
}

/// Which native primitives a subscription drives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    /// Gestures delivered to the application
    Device,
    /// Gestures the driver also forwards to the OS
    Os,
}

/// Device-level and OS-forwarded gesture subscriptions.
pub struct GestureSubscription {
    driver: Arc<dyn Driver>,
    device: Mutex<SubscriptionState>,
    os: Mutex<SubscriptionState>,
}

impl GestureSubscription {
    pub fn new(driver: Arc<dyn Driver>) -> Self {
        Self {
            driver,
            device: Mutex::new(SubscriptionState::default()),
            os: Mutex::new(SubscriptionState::default()),
        }
    }

    /// Enable or disable delivery of `gestures` to the application.
    ///
    /// Returns whether a native call was issued.
    pub fn set_gestures(&self, gestures: &GestureSet, enabled: bool) -> Result<bool> {
        self.reconcile(Target::Device, gestures, enabled)
    }

    /// Enable or disable forwarding of `gestures` to the OS.
    ///
    /// Returns whether native calls were issued.
    pub fn set_os_gestures(&self, gestures: &GestureSet, enabled: bool) -> Result<bool> {
        self.reconcile(Target::Os, gestures, enabled)
    }

    pub fn enable_gesture(&self, gesture: Gesture) -> Result<bool> {
        self.set_gestures(&gesture.into(), true)
    }

    pub fn disable_gesture(&self, gesture: Gesture) -> Result<bool> {
        self.set_gestures(&gesture.into(), false)
    }

    pub fn enable_os_gesture(&self, gesture: Gesture) -> Result<bool> {
        self.set_os_gestures(&gesture.into(), true)
    }

    pub fn disable_os_gesture(&self, gesture: Gesture) -> Result<bool> {
        self.set_os_gestures(&gesture.into(), false)
    }

    pub fn state(&self) -> SubscriptionState {
        self.device.lock().clone()
    }

    pub fn os_state(&self) -> SubscriptionState {
        self.os.lock().clone()
    }

    fn reconcile(&self, target: Target, requested: &GestureSet, enabled: bool) -> Result<bool> {
        let state = match target {
            Target::Device => &self.device,
            Target::Os => &self.os,
        };

        // Held across the native call so concurrent requests serialize
        let mut state = state.lock();

        let Some(plan) = state.plan(requested, enabled) else {
            tracing::debug!(?target, "Gestures {} already {}", requested, if enabled { "enabled" } else { "disabled" });
            return Ok(false);
        };

        let mask = gesture::encode(&plan.active);
        tracing::debug!(
            ?target,
            mask = %format!("{:#06x}", mask),
            enable = plan.enable,
            "Reconciling gestures to {}",
            plan.active
        );

        self.driver
            .enable_gesture(mask, plan.enable)
            .check("RzSBEnableGesture")?;
        if target == Target::Os {
            self.driver
                .enable_os_gesture(mask, plan.enable)
                .check("RzSBEnableOSGesture")?;
        }

        state.apply(plan);
        Ok(true)
    }
}

impl std::fmt::Debug for GestureSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GestureSubscription")
            .field("device", &*self.device.lock())
            .field("os", &*self.os.lock())
            .finish()
    }
}
