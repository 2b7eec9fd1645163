//! Provider users and the `AuthUser` value built from them.

use crate::{CustomClaims, IdentityError, IdentityResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;
use std::sync::Arc;

/// Capability to obtain a bearer ID token for a signed-in session.
#[async_trait]
pub trait IdTokenSource: Send + Sync {
    /// Returns the current ID token, refreshing it if the provider requires.
    async fn id_token(&self) -> IdentityResult<String>;
}

/// Token source that always yields the same token.
#[derive(Debug, Clone)]
pub struct StaticIdToken(String);

impl StaticIdToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl IdTokenSource for StaticIdToken {
    async fn id_token(&self) -> IdentityResult<String> {
        Ok(self.0.clone())
    }
}

/// User object as delivered by the identity provider's client SDK.
#[derive(Clone)]
pub struct ProviderUser {
    pub uid: String,
    pub email: Option<String>,
    pub email_verified: bool,
    pub phone_number: Option<String>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    token_source: Arc<dyn IdTokenSource>,
}

impl ProviderUser {
    pub fn new(uid: impl Into<String>, token_source: Arc<dyn IdTokenSource>) -> Self {
        Self {
            uid: uid.into(),
            email: None,
            email_verified: false,
            phone_number: None,
            display_name: None,
            photo_url: None,
            token_source,
        }
    }

    /// Provider user whose token source yields `token`.
    pub fn with_static_token(uid: impl Into<String>, token: impl Into<String>) -> Self {
        Self::new(uid, Arc::new(StaticIdToken::new(token)))
    }

    pub fn with_email(mut self, email: impl Into<String>, verified: bool) -> Self {
        self.email = Some(email.into());
        self.email_verified = verified;
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn token_source(&self) -> Arc<dyn IdTokenSource> {
        self.token_source.clone()
    }
}

impl fmt::Debug for ProviderUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderUser")
            .field("uid", &self.uid)
            .field("email", &self.email)
            .field("email_verified", &self.email_verified)
            .field("display_name", &self.display_name)
            .finish_non_exhaustive()
    }
}

/// Immutable identity value handed to sync handlers and snapshot readers.
///
/// An unauthenticated `AuthUser` has no `id` and no token source.
#[derive(Clone)]
pub struct AuthUser {
    id: Option<String>,
    email: Option<String>,
    email_verified: bool,
    phone_number: Option<String>,
    display_name: Option<String>,
    photo_url: Option<String>,
    claims: CustomClaims,
    client_initialized: bool,
    token_source: Option<Arc<dyn IdTokenSource>>,
}

/// Wire form of [`AuthUser::serialize`].
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SerializedAuthUser {
    id: Option<String>,
    #[serde(default)]
    claims: CustomClaims,
    email: Option<String>,
    #[serde(default)]
    email_verified: bool,
    phone_number: Option<String>,
    display_name: Option<String>,
    #[serde(rename = "photoURL")]
    photo_url: Option<String>,
    #[serde(default)]
    client_initialized: bool,
    #[serde(rename = "_token", default, skip_serializing_if = "Option::is_none")]
    token: Option<String>,
}

impl AuthUser {
    /// Build from the provider's user, or the unauthenticated value for `None`.
    ///
    /// A user with an empty uid is treated as signed out.
    pub fn from_provider_user(
        user: Option<&ProviderUser>,
        claims: CustomClaims,
        client_initialized: bool,
    ) -> Self {
        match user.filter(|user| !user.uid.is_empty()) {
            Some(user) => Self {
                id: Some(user.uid.clone()),
                email: user.email.clone(),
                email_verified: user.email_verified,
                phone_number: user.phone_number.clone(),
                display_name: user.display_name.clone(),
                photo_url: user.photo_url.clone(),
                claims,
                client_initialized,
                token_source: Some(user.token_source()),
            },
            None => Self {
                client_initialized,
                ..Self::unauthenticated()
            },
        }
    }

    pub fn unauthenticated() -> Self {
        Self {
            id: None,
            email: None,
            email_verified: false,
            phone_number: None,
            display_name: None,
            photo_url: None,
            claims: CustomClaims::new(),
            client_initialized: false,
            token_source: None,
        }
    }

    /// Rebuild from [`AuthUser::serialize`] output. An embedded token becomes
    /// the token source.
    pub fn from_serialized(serialized: &str) -> IdentityResult<Self> {
        let parsed: SerializedAuthUser = serde_json::from_str(serialized)?;
        let token_source = parsed
            .token
            .map(|token| Arc::new(StaticIdToken::new(token)) as Arc<dyn IdTokenSource>);

        Ok(Self {
            id: parsed.id.filter(|id| !id.is_empty()),
            email: parsed.email,
            email_verified: parsed.email_verified,
            phone_number: parsed.phone_number,
            display_name: parsed.display_name,
            photo_url: parsed.photo_url,
            claims: parsed.claims,
            client_initialized: parsed.client_initialized,
            token_source,
        })
    }

    /// JSON form of the identity fields, optionally embedding `token`.
    pub fn serialize(&self, token: Option<&str>) -> IdentityResult<String> {
        Ok(serde_json::to_string(&self.to_wire(token))?)
    }

    fn to_wire(&self, token: Option<&str>) -> SerializedAuthUser {
        SerializedAuthUser {
            id: self.id.clone(),
            claims: self.claims.clone(),
            email: self.email.clone(),
            email_verified: self.email_verified,
            phone_number: self.phone_number.clone(),
            display_name: self.display_name.clone(),
            photo_url: self.photo_url.clone(),
            client_initialized: self.client_initialized,
            token: token.map(str::to_string),
        }
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.id.is_some()
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn email_verified(&self) -> bool {
        self.email_verified
    }

    pub fn phone_number(&self) -> Option<&str> {
        self.phone_number.as_deref()
    }

    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    pub fn photo_url(&self) -> Option<&str> {
        self.photo_url.as_deref()
    }

    pub fn claims(&self) -> &CustomClaims {
        &self.claims
    }

    pub fn client_initialized(&self) -> bool {
        self.client_initialized
    }

    /// Bearer token for the session this user was built from.
    ///
    /// Fails with [`IdentityError::NotAuthenticated`] for the unauthenticated user.
    pub async fn get_id_token(&self) -> IdentityResult<String> {
        match &self.token_source {
            Some(source) => source.id_token().await,
            None => Err(IdentityError::NotAuthenticated),
        }
    }
}

impl fmt::Debug for AuthUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthUser")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("claims", &self.claims)
            .field("client_initialized", &self.client_initialized)
            .finish_non_exhaustive()
    }
}

/// Serde form never includes a token.
impl Serialize for AuthUser {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_wire(None).serialize(serializer)
    }
}

/// Equality over identity fields; the token source is not compared.
impl PartialEq for AuthUser {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.email == other.email
            && self.email_verified == other.email_verified
            && self.phone_number == other.phone_number
            && self.display_name == other.display_name
            && self.photo_url == other.photo_url
            && self.claims == other.claims
            && self.client_initialized == other.client_initialized
    }
}
