//! Controller lifecycle states.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of one controller version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerState {
    /// Created, install not started.
    Parsed = 0,
    /// Namespaces are being created and the manifest fetched.
    Installing = 1,
    /// Installed, waiting to replace the active version.
    Installed = 2,
    /// Pruning namespaces of older versions.
    Activating = 3,
    /// Intercepting requests.
    Activated = 4,
    /// Failed to install or replaced by a newer version.
    Redundant = 5,
}

impl ControllerState {
    /// Whether fetches are intercepted in this state.
    pub fn can_intercept_fetch(&self) -> bool {
        matches!(self, ControllerState::Activated)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ControllerState::Redundant)
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => ControllerState::Parsed,
            1 => ControllerState::Installing,
            2 => ControllerState::Installed,
            3 => ControllerState::Activating,
            4 => ControllerState::Activated,
            _ => ControllerState::Redundant,
        }
    }
}

impl std::fmt::Display for ControllerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ControllerState::Parsed => write!(f, "parsed"),
            ControllerState::Installing => write!(f, "installing"),
            ControllerState::Installed => write!(f, "installed"),
            ControllerState::Activating => write!(f, "activating"),
            ControllerState::Activated => write!(f, "activated"),
            ControllerState::Redundant => write!(f, "redundant"),
        }
    }
}

/// Atomic wrapper for ControllerState.
pub(crate) struct AtomicControllerState(AtomicU8);

impl AtomicControllerState {
    pub(crate) fn new(state: ControllerState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn load(&self) -> ControllerState {
        ControllerState::from_u8(self.0.load(Ordering::SeqCst))
    }

    /// Unconditionally move to `to`, returning the state it replaced.
    pub(crate) fn swap(&self, to: ControllerState) -> ControllerState {
        ControllerState::from_u8(self.0.swap(to as u8, Ordering::SeqCst))
    }

    /// Move from `from` to `to`; on mismatch returns the actual state.
    pub(crate) fn transition(
        &self,
        from: ControllerState,
        to: ControllerState,
    ) -> std::result::Result<(), ControllerState> {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(ControllerState::from_u8)
    }
}
