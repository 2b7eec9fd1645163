//! Identity change controller.
//!
//! Observes an [`IdentityProvider`](identity_claims::IdentityProvider) for
//! token changes, publishes the resulting user and custom claims, and calls a
//! [`SyncHandler`] so the server-side session cookie follows the client
//! identity. The default handler posts to the login/logout endpoints through
//! [`CookieSyncClient`](cookie_sync_client::CookieSyncClient).

mod controller;
mod error;
mod handler;
mod machine;

pub use controller::{
    AuthSnapshot, ChangeCallback, ControllerConfig, IdentityChangeController, Subscription,
    UserInfo,
};
pub use error::{ControllerError, ControllerResult, CycleFailure, SyncError};
pub use handler::{sync_handler_fn, CookieSyncHandler, SyncHandler};
pub use machine::{ControllerMachine, ControllerMachineInput, ControllerMachineState, ControllerPhase};
