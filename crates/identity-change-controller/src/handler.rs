//! Sync handlers invoked after each token change.

use crate::SyncError;
use async_trait::async_trait;
use cookie_sync_client::CookieSyncClient;
use identity_claims::AuthUser;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// Brings the server session in line with `user`.
#[async_trait]
pub trait SyncHandler: Send + Sync {
    async fn sync(&self, user: &AuthUser) -> Result<(), SyncError>;
}

/// Default handler: login with the user's ID token, or logout when signed out.
#[derive(Debug, Clone)]
pub struct CookieSyncHandler {
    client: CookieSyncClient,
}

impl CookieSyncHandler {
    pub fn new(client: CookieSyncClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &CookieSyncClient {
        &self.client
    }
}

#[async_trait]
impl SyncHandler for CookieSyncHandler {
    async fn sync(&self, user: &AuthUser) -> Result<(), SyncError> {
        let outcome = if user.is_authenticated() {
            let token = user.get_id_token().await?;
            self.client.login(&token).await?
        } else {
            self.client.logout().await?
        };

        debug!(
            endpoint = %outcome.endpoint,
            status = outcome.status,
            "Session cookie synced"
        );
        Ok(())
    }
}

struct FnSyncHandler<F>(F);

#[async_trait]
impl<F, Fut> SyncHandler for FnSyncHandler<F>
where
    F: Fn(AuthUser) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), SyncError>> + Send,
{
    async fn sync(&self, user: &AuthUser) -> Result<(), SyncError> {
        (self.0)(user.clone()).await
    }
}

/// Wrap an async closure as a [`SyncHandler`].
pub fn sync_handler_fn<F, Fut>(handler: F) -> Arc<dyn SyncHandler>
where
    F: Fn(AuthUser) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), SyncError>> + Send + 'static,
{
    Arc::new(FnSyncHandler(handler))
}
