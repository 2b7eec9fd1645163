//! Error types for the identity change controller.

use cookie_sync_client::CookieSyncError;
use identity_claims::IdentityError;
use thiserror::Error;

/// Failure of a sync handler.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Cookie(#[from] CookieSyncError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    /// Failure raised by a caller-supplied handler.
    #[error(transparent)]
    Handler(#[from] anyhow::Error),
}

/// Controller API errors.
#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("Controller is already subscribed")]
    AlreadySubscribed,

    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("Cookie sync client error: {0}")]
    Client(#[from] CookieSyncError),
}

/// Failure that ended a token-change cycle.
#[derive(Debug, Error)]
pub enum CycleFailure {
    /// The current session's claims could not be read. Nothing past the
    /// completion reset was applied for this cycle.
    #[error("Cycle {cycle}: failed to fetch session claims: {source}")]
    ClaimFetch {
        cycle: u64,
        #[source]
        source: IdentityError,
    },

    /// The sync handler failed. The completion flag stays false.
    #[error("Cycle {cycle}: session sync failed: {source}")]
    Sync {
        cycle: u64,
        #[source]
        source: SyncError,
    },
}

impl CycleFailure {
    pub fn cycle(&self) -> u64 {
        match self {
            CycleFailure::ClaimFetch { cycle, .. } | CycleFailure::Sync { cycle, .. } => *cycle,
        }
    }
}

/// Result type alias using ControllerError.
pub type ControllerResult<T> = Result<T, ControllerError>;
