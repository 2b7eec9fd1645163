#![allow(dead_code)]

use cookie_sync_client::CookieSyncClient;
use identity_change_controller::{
    AuthSnapshot, ControllerConfig, CycleFailure, IdentityChangeController,
};
use identity_claims::InMemoryIdentityProvider;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use url::Url;
use wiremock::MockServer;

pub const WAIT: Duration = Duration::from_secs(5);

pub fn claims(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

pub fn client_for(server: &MockServer) -> CookieSyncClient {
    let login = Url::parse(&format!("{}/api/login", server.uri())).unwrap();
    let logout = Url::parse(&format!("{}/api/logout", server.uri())).unwrap();
    CookieSyncClient::new(login, logout).unwrap()
}

pub fn controller_for(
    server: &MockServer,
    provider: Arc<InMemoryIdentityProvider>,
) -> IdentityChangeController {
    IdentityChangeController::new(provider, client_for(server), ControllerConfig::default())
}

/// Snapshots passed to `on_change`, in delivery order.
#[derive(Clone, Default)]
pub struct Recorder(Arc<Mutex<Vec<AuthSnapshot>>>);

impl Recorder {
    pub fn callback(&self) -> impl Fn(&AuthSnapshot) + Send + Sync + 'static {
        let seen = self.0.clone();
        move |snapshot: &AuthSnapshot| seen.lock().push(snapshot.clone())
    }

    pub fn snapshots(&self) -> Vec<AuthSnapshot> {
        self.0.lock().clone()
    }
}

pub async fn wait_until<F>(rx: &mut watch::Receiver<AuthSnapshot>, predicate: F) -> AuthSnapshot
where
    F: FnMut(&AuthSnapshot) -> bool,
{
    let snapshot = tokio::time::timeout(WAIT, rx.wait_for(predicate))
        .await
        .expect("timed out waiting for snapshot")
        .expect("snapshot sender dropped");
    AuthSnapshot::clone(&snapshot)
}

pub async fn next_failure(rx: &mut mpsc::UnboundedReceiver<CycleFailure>) -> CycleFailure {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for failure")
        .expect("failure channel closed")
}
