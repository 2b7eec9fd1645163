//! `cookie-sync replay`: drive the controller through a scripted timeline.

use crate::timeline::TimelineEvent;
use anyhow::bail;
use cookie_sync_config::Config;
use identity_change_controller::{
    AuthSnapshot, ControllerConfig, ControllerPhase, CycleFailure, IdentityChangeController,
};
use identity_claims::InMemoryIdentityProvider;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Outcome printed by the replay command.
#[derive(Debug, Serialize)]
pub struct ReplayReport {
    pub snapshot: AuthSnapshot,
    pub phase: ControllerPhase,
    pub cycles: u64,
    pub failures: Vec<String>,
}

/// Replay `events` against the configured endpoints and wait for the last
/// cycle to settle.
pub async fn run(
    config: &Config,
    events: Vec<TimelineEvent>,
    settle_timeout: Duration,
) -> anyhow::Result<ReplayReport> {
    let provider = Arc::new(InMemoryIdentityProvider::new());
    let controller =
        IdentityChangeController::from_config(provider.clone(), config, ControllerConfig::default())?;
    let mut failures = controller.take_failures();
    let mut changes = controller.watch();

    let mut subscription = controller.subscribe(|snapshot| {
        debug!(
            initialized = snapshot.initialized(),
            authenticated = snapshot.user().is_some(),
            auth_request_completed = snapshot.auth_request_completed,
            "Snapshot published"
        );
    })?;

    let expected_cycles = events.len() as u64;
    for (index, event) in events.into_iter().enumerate() {
        if event.delay_ms > 0 {
            tokio::time::sleep(event.delay()).await;
        }

        match event.provider_user() {
            Some(user) => {
                info!(index, uid = %user.uid, "Replaying sign-in");
                provider.sign_in(user, event.claims);
            }
            None => {
                info!(index, "Replaying sign-out");
                provider.sign_out();
            }
        }
    }

    let deadline = Instant::now() + settle_timeout;
    while controller.cycle() < expected_cycles || controller.phase().is_in_flight() {
        if Instant::now() >= deadline {
            bail!(
                "Timed out after {:?} waiting for cycle {} to settle",
                settle_timeout,
                expected_cycles
            );
        }
        tokio::select! {
            _ = changes.changed() => {}
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
        }
    }

    let report = ReplayReport {
        snapshot: controller.snapshot(),
        phase: controller.phase(),
        cycles: controller.cycle(),
        failures: drain_failures(&mut failures),
    };
    subscription.unsubscribe();

    if !report.failures.is_empty() {
        warn!(count = report.failures.len(), "Replay finished with failed cycles");
    }
    Ok(report)
}

fn drain_failures(failures: &mut Option<mpsc::UnboundedReceiver<CycleFailure>>) -> Vec<String> {
    let mut drained = Vec::new();
    if let Some(rx) = failures.as_mut() {
        while let Ok(failure) = rx.try_recv() {
            drained.push(failure.to_string());
        }
    }
    drained
}
