//! Scripted identity timelines for `cookie-sync replay`.
//!
//! A timeline is a JSON array of token-change events:
//!
//! ```json
//! [
//!   { "user": { "uid": "u1", "email": "u1@example.com" },
//!     "claims": { "role": "admin" }, "token": "id-token-u1" },
//!   { "user": null, "delay_ms": 250 }
//! ]
//! ```

use anyhow::{bail, Context};
use identity_claims::ProviderUser;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::Path;
use std::time::Duration;

/// User fields as written in a timeline.
#[derive(Debug, Clone, Deserialize)]
pub struct TimelineUser {
    pub uid: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
}

/// One token-change event. `user: null` signs out.
#[derive(Debug, Clone, Deserialize)]
pub struct TimelineEvent {
    #[serde(default)]
    pub user: Option<TimelineUser>,
    /// Full session claims, standard ones included.
    #[serde(default)]
    pub claims: Map<String, Value>,
    /// ID token presented to the login endpoint.
    #[serde(default)]
    pub token: Option<String>,
    /// Pause before emitting this event.
    #[serde(default)]
    pub delay_ms: u64,
}

impl TimelineEvent {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Provider user for this event, `None` for a sign-out.
    pub fn provider_user(&self) -> Option<ProviderUser> {
        let user = self.user.as_ref()?;
        let token = self.token.clone().unwrap_or_default();

        let mut provider_user = ProviderUser::with_static_token(user.uid.clone(), token);
        provider_user.email = user.email.clone();
        provider_user.email_verified = user.email_verified;
        provider_user.phone_number = user.phone_number.clone();
        provider_user.display_name = user.display_name.clone();
        provider_user.photo_url = user.photo_url.clone();
        Some(provider_user)
    }
}

/// Parse and check a timeline.
pub fn parse(content: &str) -> anyhow::Result<Vec<TimelineEvent>> {
    let events: Vec<TimelineEvent> =
        serde_json::from_str(content).context("Timeline must be a JSON array of events")?;

    for (index, event) in events.iter().enumerate() {
        if let Some(user) = &event.user {
            if user.uid.is_empty() {
                bail!("Event {index}: user.uid must not be empty");
            }
            if event.token.as_deref().map_or(true, str::is_empty) {
                bail!("Event {index}: signed-in users need a token");
            }
        }
    }

    Ok(events)
}

pub fn load(path: &Path) -> anyhow::Result<Vec<TimelineEvent>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read timeline {}", path.display()))?;
    parse(&content)
}
