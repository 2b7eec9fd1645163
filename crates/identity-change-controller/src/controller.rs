//! Identity change controller with FSM-based cycle tracking.
//!
//! Each token-change event starts a cycle:
//!
//! 1. reset `auth_request_completed` and publish,
//! 2. read the current session's claims (signed-in users only) and strip the
//!    standard ones,
//! 3. publish the new [`UserInfo`],
//! 4. hand the [`AuthUser`] to the sync handler in a spawned task,
//! 5. when that task settles, mark the request completed if the controller is
//!    still subscribed and no newer cycle has started.
//!
//! Steps 1-3 run on one event task in arrival order, so the published user is
//! always the one from the latest event. Sync tasks are never aborted; their
//! results are dropped after teardown.

use crate::handler::{CookieSyncHandler, SyncHandler};
use crate::machine::{ControllerMachine, ControllerMachineInput, ControllerPhase};
use crate::{ControllerError, ControllerResult, CycleFailure, SyncError};
use cookie_sync_client::CookieSyncClient;
use cookie_sync_config::Config;
use identity_claims::{
    filter_standard_claims, AuthUser, CustomClaims, IdTokenChanges, IdentityProvider,
    ProviderUser,
};
use parking_lot::{Mutex, ReentrantMutex};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// User and custom claims from the latest processed token change.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UserInfo {
    /// `None` when signed out or before the first event.
    pub user: Option<AuthUser>,
    pub claims: CustomClaims,
    /// False until the first token change has been processed. Never reverts.
    pub initialized: bool,
}

/// Everything a consumer can observe about the controller.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AuthSnapshot {
    #[serde(flatten)]
    pub user_info: UserInfo,
    /// True once the latest sync request succeeded, until the next token change.
    pub auth_request_completed: bool,
}

impl AuthSnapshot {
    pub fn user(&self) -> Option<&AuthUser> {
        self.user_info.user.as_ref()
    }

    pub fn claims(&self) -> &CustomClaims {
        &self.user_info.claims
    }

    pub fn initialized(&self) -> bool {
        self.user_info.initialized
    }
}

/// Callback type for snapshot change notifications.
pub type ChangeCallback = Box<dyn Fn(&AuthSnapshot) + Send + Sync>;

/// Controller options.
#[derive(Clone, Default)]
pub struct ControllerConfig {
    /// Replaces the default login/logout handler.
    pub sync_handler: Option<Arc<dyn SyncHandler>>,
}

impl ControllerConfig {
    pub fn with_sync_handler(handler: Arc<dyn SyncHandler>) -> Self {
        Self {
            sync_handler: Some(handler),
        }
    }
}

struct ControllerState {
    machine: ControllerMachine,
    snapshot: AuthSnapshot,
    /// Number of the latest cycle.
    cycle: u64,
    torn_down: bool,
}

impl ControllerState {
    fn new() -> Self {
        Self {
            machine: ControllerMachine::new(),
            snapshot: AuthSnapshot::default(),
            cycle: 0,
            torn_down: false,
        }
    }

    fn phase(&self) -> ControllerPhase {
        ControllerPhase::from(self.machine.state())
    }

    fn transition(&mut self, input: ControllerMachineInput) -> ControllerResult<ControllerPhase> {
        let old_phase = self.phase();

        self.machine.consume(&input).map_err(|_| {
            ControllerError::InvalidStateTransition(format!(
                "Cannot apply {:?} in state {:?}",
                input,
                self.machine.state()
            ))
        })?;

        let new_phase = self.phase();
        if old_phase != new_phase {
            debug!(
                old_phase = ?old_phase,
                new_phase = ?new_phase,
                "Controller phase transition"
            );
        }

        Ok(new_phase)
    }

    fn apply(&mut self, input: ControllerMachineInput) {
        if let Err(e) = self.transition(input) {
            debug!(error = %e, "Ignoring controller input");
        }
    }
}

/// How a sync task's result was applied.
enum Settled {
    Latest,
    Superseded,
    AfterTeardown,
}

/// State shared between the controller, its event task and sync tasks.
struct Shared {
    state: Mutex<ControllerState>,
    /// Held across mutate-and-notify so teardown cannot interleave with a
    /// publish. Reentrant so a callback may tear the controller down.
    publish_gate: ReentrantMutex<()>,
    snapshot_tx: watch::Sender<AuthSnapshot>,
    on_change: OnceLock<ChangeCallback>,
    failures_tx: mpsc::UnboundedSender<CycleFailure>,
}

impl Shared {
    /// Mutate state and publish the new snapshot.
    ///
    /// Does nothing once torn down. Nothing is published when `mutate`
    /// returns `None`.
    fn update<R>(&self, mutate: impl FnOnce(&mut ControllerState) -> Option<R>) -> Option<R> {
        let _gate = self.publish_gate.lock();

        let (snapshot, result) = {
            let mut state = self.state.lock();
            if state.torn_down {
                return None;
            }
            let result = mutate(&mut *state)?;
            (state.snapshot.clone(), result)
        };

        if let Some(callback) = self.on_change.get() {
            callback(&snapshot);
        }
        self.snapshot_tx.send_replace(snapshot);

        Some(result)
    }

    /// Phase-only transition. Returns false once torn down.
    fn record(&self, input: ControllerMachineInput) -> bool {
        let mut state = self.state.lock();
        if state.torn_down {
            return false;
        }
        state.apply(input);
        true
    }

    fn begin_cycle(&self) -> Option<u64> {
        self.update(|state| {
            state.cycle += 1;
            state.snapshot.auth_request_completed = false;
            state.apply(ControllerMachineInput::TokenChanged);
            Some(state.cycle)
        })
    }

    fn publish_user_info(&self, user_info: UserInfo) -> bool {
        self.update(|state| {
            state.snapshot.user_info = user_info;
            state.apply(ControllerMachineInput::ClaimsResolved);
            Some(())
        })
        .is_some()
    }

    fn settle(&self, cycle: u64, result: Result<(), SyncError>) {
        let succeeded = result.is_ok();
        if let Err(source) = result {
            self.report(CycleFailure::Sync { cycle, source });
        }

        let mut settled = Settled::AfterTeardown;
        self.update(|state| {
            if state.cycle != cycle {
                settled = Settled::Superseded;
                return None;
            }
            settled = Settled::Latest;
            if succeeded {
                state.snapshot.auth_request_completed = true;
                state.apply(ControllerMachineInput::SyncSucceeded);
                Some(())
            } else {
                state.apply(ControllerMachineInput::SyncFailed);
                None
            }
        });

        match settled {
            Settled::Latest if succeeded => debug!(cycle, "Completed session sync"),
            Settled::Latest => {}
            Settled::Superseded => debug!(cycle, "Session sync settled after a newer token change"),
            Settled::AfterTeardown => {
                debug!(cycle, "Session sync settled after teardown; result discarded")
            }
        }
    }

    fn report(&self, failure: CycleFailure) {
        error!(cycle = failure.cycle(), error = %failure, "Identity change cycle failed");
        let _ = self.failures_tx.send(failure);
    }

    /// Returns true for the call that actually tore down.
    fn teardown(&self) -> bool {
        let _gate = self.publish_gate.lock();
        let mut state = self.state.lock();
        if state.torn_down {
            return false;
        }
        state.torn_down = true;
        state.apply(ControllerMachineInput::Teardown);
        true
    }
}

/// Processes provider events in order on a single task.
struct EventLoop {
    provider: Arc<dyn IdentityProvider>,
    handler: Arc<dyn SyncHandler>,
    shared: Arc<Shared>,
}

impl EventLoop {
    async fn run(self, mut changes: IdTokenChanges) {
        while let Some(user) = changes.recv().await {
            self.on_token_change(user).await;
        }
        debug!("Identity token change stream closed");
    }

    async fn on_token_change(&self, user: Option<ProviderUser>) {
        let user = user.filter(|user| !user.uid.is_empty());
        let Some(cycle) = self.shared.begin_cycle() else {
            return;
        };
        debug!(
            cycle,
            uid = ?user.as_ref().map(|u| u.uid.as_str()),
            "Identity token changed"
        );

        let claims = match &user {
            Some(_) => match self.provider.current_session_claims().await {
                Ok(result) => filter_standard_claims(&result.claims),
                Err(source) => {
                    self.shared
                        .report(CycleFailure::ClaimFetch { cycle, source });
                    self.shared.record(ControllerMachineInput::ClaimsFailed);
                    return;
                }
            },
            None => CustomClaims::new(),
        };
        debug!(cycle, claim_count = claims.len(), "Session claims resolved");

        let auth_user = AuthUser::from_provider_user(user.as_ref(), claims.clone(), true);
        let user_info = UserInfo {
            user: auth_user.is_authenticated().then(|| auth_user.clone()),
            claims,
            initialized: true,
        };
        if !self.shared.publish_user_info(user_info) {
            return;
        }

        debug!(cycle, authenticated = auth_user.is_authenticated(), "Starting session sync");
        let handler = self.handler.clone();
        let shared = self.shared.clone();
        tokio::spawn(async move {
            let result = handler.sync(&auth_user).await;
            shared.settle(cycle, result);
        });
    }
}

/// Keeps the server session cookie in step with the provider's identity.
///
/// A controller observes the provider through a single [`Subscription`].
/// Once that subscription ends the controller is torn down for good.
pub struct IdentityChangeController {
    provider: Arc<dyn IdentityProvider>,
    handler: Arc<dyn SyncHandler>,
    shared: Arc<Shared>,
    subscribed: AtomicBool,
    failures_rx: Mutex<Option<mpsc::UnboundedReceiver<CycleFailure>>>,
}

impl IdentityChangeController {
    /// Create a controller that syncs through `client` unless `config`
    /// supplies its own handler.
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        client: CookieSyncClient,
        config: ControllerConfig,
    ) -> Self {
        let handler = config
            .sync_handler
            .unwrap_or_else(|| Arc::new(CookieSyncHandler::new(client)));
        Self::with_handler(provider, handler)
    }

    /// Create a controller with the endpoints from `config`.
    pub fn from_config(
        provider: Arc<dyn IdentityProvider>,
        config: &Config,
        controller_config: ControllerConfig,
    ) -> ControllerResult<Self> {
        let client = CookieSyncClient::from_config(config)?;
        Ok(Self::new(provider, client, controller_config))
    }

    pub fn with_handler(provider: Arc<dyn IdentityProvider>, handler: Arc<dyn SyncHandler>) -> Self {
        let (snapshot_tx, _) = watch::channel(AuthSnapshot::default());
        let (failures_tx, failures_rx) = mpsc::unbounded_channel();

        Self {
            provider,
            handler,
            shared: Arc::new(Shared {
                state: Mutex::new(ControllerState::new()),
                publish_gate: ReentrantMutex::new(()),
                snapshot_tx,
                on_change: OnceLock::new(),
                failures_tx,
            }),
            subscribed: AtomicBool::new(false),
            failures_rx: Mutex::new(Some(failures_rx)),
        }
    }

    /// Start observing token changes. Must be called within a Tokio runtime.
    ///
    /// `on_change` runs after every published change. A controller can be
    /// subscribed once; later calls fail with
    /// [`ControllerError::AlreadySubscribed`].
    pub fn subscribe<F>(&self, on_change: F) -> ControllerResult<Subscription>
    where
        F: Fn(&AuthSnapshot) + Send + Sync + 'static,
    {
        if self.subscribed.swap(true, Ordering::SeqCst) {
            return Err(ControllerError::AlreadySubscribed);
        }

        let _ = self.shared.on_change.set(Box::new(on_change));
        let changes = self.provider.id_token_changes();
        let event_loop = EventLoop {
            provider: self.provider.clone(),
            handler: self.handler.clone(),
            shared: self.shared.clone(),
        };
        let event_task = tokio::spawn(event_loop.run(changes));

        info!("Subscribed to identity token changes");
        Ok(Subscription {
            shared: self.shared.clone(),
            event_task: Some(event_task),
        })
    }

    pub fn snapshot(&self) -> AuthSnapshot {
        self.shared.state.lock().snapshot.clone()
    }

    /// Receiver that sees every published snapshot.
    pub fn watch(&self) -> watch::Receiver<AuthSnapshot> {
        self.shared.snapshot_tx.subscribe()
    }

    pub fn phase(&self) -> ControllerPhase {
        self.shared.state.lock().phase()
    }

    /// Number of token changes taken up so far.
    pub fn cycle(&self) -> u64 {
        self.shared.state.lock().cycle
    }

    pub fn is_torn_down(&self) -> bool {
        self.shared.state.lock().torn_down
    }

    /// Receiver for failed cycles. Available once.
    ///
    /// Failures queue up until taken, including ones settling after teardown.
    pub fn take_failures(&self) -> Option<mpsc::UnboundedReceiver<CycleFailure>> {
        self.failures_rx.lock().take()
    }
}

/// Live subscription of a controller to its provider.
///
/// Dropping it has the same effect as [`Subscription::unsubscribe`].
pub struct Subscription {
    shared: Arc<Shared>,
    event_task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Tear the controller down and detach from the provider.
    ///
    /// No state change is published afterwards. Idempotent.
    pub fn unsubscribe(&mut self) {
        if self.shared.teardown() {
            info!("Identity change controller torn down");
        }
        if let Some(task) = self.event_task.take() {
            task.abort();
        }
    }

    pub fn is_active(&self) -> bool {
        self.event_task.is_some()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
