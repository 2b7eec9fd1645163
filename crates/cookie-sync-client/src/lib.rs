//! Client for the server endpoints that set and clear the session cookie.
//!
//! `login` posts the user's ID token; `logout` posts without credentials
//! other than the cookie jar. Only the HTTP status decides success.

mod client;
mod error;

pub use client::{CookieSyncClient, SyncOutcome};
pub use error::{CookieSyncError, CookieSyncResult, SyncEndpoint};
