//! Controller state machine using rust-fsm.
//!
//! ```text
//!  Uninitialized
//!       │ TokenChanged
//!       ▼
//!  ResolvingClaims ── ClaimsFailed ──► Failed
//!       │ ClaimsResolved                 │
//!       ▼                                │ TokenChanged
//!    Syncing ──── SyncFailed ──► Failed  ▼
//!       │ SyncSucceeded            ResolvingClaims
//!       ▼
//!     Idle ── TokenChanged ──► ResolvingClaims
//! ```
//!
//! `Teardown` moves every state to `TornDown`, which has no way out.

use rust_fsm::*;
use serde::{Deserialize, Serialize};

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub controller_machine(Uninitialized)

    Uninitialized => {
        TokenChanged => ResolvingClaims,
        Teardown => TornDown
    },
    ResolvingClaims => {
        ClaimsResolved => Syncing,
        ClaimsFailed => Failed,
        Teardown => TornDown
    },
    Syncing => {
        // A newer event supersedes the in-flight sync
        TokenChanged => ResolvingClaims,
        SyncSucceeded => Idle,
        SyncFailed => Failed,
        Teardown => TornDown
    },
    Idle => {
        TokenChanged => ResolvingClaims,
        Teardown => TornDown
    },
    Failed => {
        TokenChanged => ResolvingClaims,
        Teardown => TornDown
    },
    TornDown => {
        Teardown => TornDown
    }
}

pub use controller_machine::Input as ControllerMachineInput;
pub use controller_machine::State as ControllerMachineState;
pub use controller_machine::StateMachine as ControllerMachine;

/// Controller phase for external consumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerPhase {
    /// No token-change event processed yet.
    Uninitialized,
    /// Reading the current session's claims.
    ResolvingClaims,
    /// Sync handler in flight.
    Syncing,
    /// Latest sync succeeded.
    Idle,
    /// Latest claim fetch or sync failed.
    Failed,
    /// Subscription ended.
    TornDown,
}

impl ControllerPhase {
    /// Returns true while a cycle is still running.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            ControllerPhase::ResolvingClaims | ControllerPhase::Syncing
        )
    }
}

impl From<&ControllerMachineState> for ControllerPhase {
    fn from(state: &ControllerMachineState) -> Self {
        match state {
            ControllerMachineState::Uninitialized => ControllerPhase::Uninitialized,
            ControllerMachineState::ResolvingClaims => ControllerPhase::ResolvingClaims,
            ControllerMachineState::Syncing => ControllerPhase::Syncing,
            ControllerMachineState::Idle => ControllerPhase::Idle,
            ControllerMachineState::Failed => ControllerPhase::Failed,
            ControllerMachineState::TornDown => ControllerPhase::TornDown,
        }
    }
}
