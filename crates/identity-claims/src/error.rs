//! Identity error types.

use thiserror::Error;

/// Errors raised while reading identity state from the provider.
#[derive(Error, Debug)]
pub enum IdentityError {
    /// The provider has no signed-in user at call time.
    #[error("No current identity session")]
    NoCurrentSession,

    /// Token requested from an unauthenticated user.
    #[error("User is not authenticated")]
    NotAuthenticated,

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using IdentityError.
pub type IdentityResult<T> = Result<T, IdentityError>;
