//! Identity provider seam.
//!
//! The controller depends on [`IdentityProvider`] instead of a global SDK
//! handle, so tests and the CLI can substitute [`InMemoryIdentityProvider`].

use crate::{IdentityError, IdentityResult, ProviderUser};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// Ordered stream of token-change events. `None` means signed out.
///
/// Dropping the receiver detaches the subscription.
pub type IdTokenChanges = mpsc::UnboundedReceiver<Option<ProviderUser>>;

/// Result of reading the current session's ID token.
#[derive(Debug, Clone, Default)]
pub struct IdTokenResult {
    /// Full claim set, standard claims included.
    pub claims: Map<String, Value>,
}

/// Client-side identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Subscribe to token-change events (sign-in, sign-out, token refresh).
    fn id_token_changes(&self) -> IdTokenChanges;

    /// Claims of whichever session is current when called.
    ///
    /// Fails with [`IdentityError::NoCurrentSession`] when nobody is signed in.
    async fn current_session_claims(&self) -> IdentityResult<IdTokenResult>;
}

#[derive(Clone)]
struct Session {
    user: ProviderUser,
    claims: Map<String, Value>,
}

/// Provider holding its session in memory. Events are emitted explicitly.
#[derive(Default)]
pub struct InMemoryIdentityProvider {
    listeners: Mutex<Vec<mpsc::UnboundedSender<Option<ProviderUser>>>>,
    session: Mutex<Option<Session>>,
    claims_latency: Option<Duration>,
}

impl InMemoryIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every claim fetch by `latency`.
    pub fn with_claims_latency(mut self, latency: Duration) -> Self {
        self.claims_latency = Some(latency);
        self
    }

    /// Make `user` current and notify listeners.
    pub fn sign_in(&self, user: ProviderUser, claims: Map<String, Value>) {
        *self.session.lock() = Some(Session {
            user: user.clone(),
            claims,
        });
        self.emit(Some(user));
    }

    /// Clear the current session and notify listeners.
    pub fn sign_out(&self) {
        *self.session.lock() = None;
        self.emit(None);
    }

    /// Re-announce the current user, as a token refresh would.
    pub fn refresh_token(&self) {
        let user = self.session.lock().as_ref().map(|s| s.user.clone());
        self.emit(user);
    }

    /// Replace the claims of the current session without emitting.
    pub fn set_session_claims(&self, claims: Map<String, Value>) {
        if let Some(session) = self.session.lock().as_mut() {
            session.claims = claims;
        }
    }

    /// Deliver an event without touching the session.
    pub fn emit(&self, user: Option<ProviderUser>) {
        let mut listeners = self.listeners.lock();
        listeners.retain(|tx| tx.send(user.clone()).is_ok());
        debug!(
            signed_in = user.is_some(),
            listeners = listeners.len(),
            "Token change emitted"
        );
    }

    /// Number of live subscriptions.
    pub fn listener_count(&self) -> usize {
        let mut listeners = self.listeners.lock();
        listeners.retain(|tx| !tx.is_closed());
        listeners.len()
    }
}

#[async_trait]
impl IdentityProvider for InMemoryIdentityProvider {
    fn id_token_changes(&self) -> IdTokenChanges {
        let (tx, rx) = mpsc::unbounded_channel();
        self.listeners.lock().push(tx);
        rx
    }

    async fn current_session_claims(&self) -> IdentityResult<IdTokenResult> {
        // Resolved against the session at call time, even with latency.
        let claims = self.session.lock().as_ref().map(|s| s.claims.clone());

        if let Some(latency) = self.claims_latency {
            tokio::time::sleep(latency).await;
        }

        claims
            .map(|claims| IdTokenResult { claims })
            .ok_or(IdentityError::NoCurrentSession)
    }
}
