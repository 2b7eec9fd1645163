//! Identity model shared by the cookie-sync controller.
//!
//! This crate provides:
//! - Custom-claim filtering (standard token claims stripped)
//! - `AuthUser`, the immutable identity value built from a provider user
//! - The `IdentityProvider` seam plus an in-memory implementation

mod claims;
mod error;
mod provider;
mod user;

pub use claims::{filter_standard_claims, is_standard_claim, CustomClaims, STANDARD_CLAIMS};
pub use error::{IdentityError, IdentityResult};
pub use provider::{IdTokenChanges, IdTokenResult, IdentityProvider, InMemoryIdentityProvider};
pub use user::{AuthUser, IdTokenSource, ProviderUser, StaticIdToken};
