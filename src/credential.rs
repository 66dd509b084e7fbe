//! Google service account credential and OAuth2 access tokens.
//!
//! The credential is read once, at start-up. Access tokens are minted with
//! the JWT bearer grant and kept in memory until shortly before they expire.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::config::Endpoints;

/// Environment variable holding the JSON service account.
pub const SERVICE_ACCOUNT: &str = "FIREBASE_SERVICE_ACCOUNT";
/// Project used against emulators when no service account is given.
pub const EMULATOR_PROJECT: &str = "GCLOUD_PROJECT";

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const SCOPES: &str = "https://www.googleapis.com/auth/cloud-platform \
                      https://www.googleapis.com/auth/datastore \
                      https://www.googleapis.com/auth/identitytoolkit \
                      https://www.googleapis.com/auth/userinfo.email";
const ASSERTION_LIFETIME: u64 = 60 * 60; // 1 hour.
const EXPIRY_MARGIN: u64 = 60;
const EMULATOR_TOKEN: &str = "owner";

/// Errors raised while loading the credential.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("missing `{0}` environment variable")]
    Missing(&'static str),

    #[error("service account is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("service account private key is unusable: {0}")]
    Key(#[from] jsonwebtoken::errors::Error),
}

/// Errors raised while obtaining an access token.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("cannot sign token assertion: {0}")]
    Sign(#[from] jsonwebtoken::errors::Error),

    #[error("token request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("token request rejected: {0}")]
    Rejected(String),
}

/// Service account key, as downloaded from the Firebase console.
#[derive(Clone, Deserialize)]
pub struct ServiceAccount {
    pub project_id: String,
    pub client_email: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_owned()
}

impl fmt::Debug for ServiceAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceAccount")
            .field("project_id", &self.project_id)
            .field("client_email", &self.client_email)
            .field("private_key_id", &self.private_key_id)
            .field("token_uri", &self.token_uri)
            .finish_non_exhaustive()
    }
}

impl ServiceAccount {
    /// Parse a JSON service account.
    pub fn from_json(json: &str) -> Result<Self, CredentialError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Claims of the signed assertion exchanged for an access token.
#[derive(Debug, Serialize, Deserialize)]
pub struct Assertion {
    pub iss: String,
    pub scope: String,
    pub aud: String,
    pub iat: u64,
    pub exp: u64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: u64,
}

impl AccessToken {
    fn is_fresh(&self, now: u64) -> bool {
        now + EXPIRY_MARGIN < self.expires_at
    }
}

/// Mint and cache OAuth2 access tokens for a [`ServiceAccount`].
pub struct TokenSource {
    account: ServiceAccount,
    key: EncodingKey,
    http: reqwest::Client,
    cache: RwLock<Option<AccessToken>>,
}

impl TokenSource {
    /// Create a new [`TokenSource`]. Fails if the private key is not a RSA
    /// PEM key.
    pub fn new(
        account: ServiceAccount,
        http: reqwest::Client,
    ) -> Result<Self, CredentialError> {
        let key = EncodingKey::from_rsa_pem(account.private_key.as_bytes())?;

        Ok(Self {
            account,
            key,
            http,
            cache: RwLock::new(None),
        })
    }

    /// Return a valid access token, exchanging a new assertion if needed.
    pub async fn token(&self) -> Result<String, TokenError> {
        let now = unix_now();

        if let Some(token) = self.cached(now).await {
            return Ok(token);
        }

        let mut cache = self.cache.write().await;
        // Another request may have refreshed it while we were waiting.
        if let Some(token) = cache.as_ref().filter(|t| t.is_fresh(now)) {
            return Ok(token.value.clone());
        }

        let token = self.exchange(now).await?;
        tracing::debug!(expires_at = token.expires_at, "access token refreshed");

        let value = token.value.clone();
        *cache = Some(token);
        Ok(value)
    }

    async fn cached(&self, now: u64) -> Option<String> {
        self.cache
            .read()
            .await
            .as_ref()
            .filter(|t| t.is_fresh(now))
            .map(|t| t.value.clone())
    }

    /// Sign the assertion sent to the token endpoint.
    fn assertion(&self, now: u64) -> Result<String, TokenError> {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.account.private_key_id.clone();

        let claims = Assertion {
            iss: self.account.client_email.clone(),
            scope: SCOPES.to_owned(),
            aud: self.account.token_uri.clone(),
            iat: now,
            exp: now + ASSERTION_LIFETIME,
        };

        Ok(encode(&header, &claims, &self.key)?)
    }

    async fn exchange(&self, now: u64) -> Result<AccessToken, TokenError> {
        let assertion = self.assertion(now)?;

        let response = self
            .http
            .post(&self.account.token_uri)
            .form(&[("grant_type", GRANT_TYPE), ("assertion", assertion.as_str())])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let reason = match response.json::<TokenErrorResponse>().await {
                Ok(body) => body.error_description.unwrap_or(body.error),
                Err(_) => status.to_string(),
            };
            return Err(TokenError::Rejected(reason));
        }

        let body = response.json::<TokenResponse>().await?;
        Ok(AccessToken {
            value: body.access_token,
            expires_at: now + body.expires_in,
        })
    }
}

/// How requests to Google APIs are authorized.
pub enum Credentials {
    /// Tokens minted from a service account.
    ServiceAccount(TokenSource),
    /// Firebase emulators accept a static owner token.
    Emulator { project_id: String },
}

impl Credentials {
    /// Load credentials once at start-up.
    ///
    /// A service account is mandatory unless both emulators are configured.
    pub fn from_env(
        endpoints: &Endpoints,
        http: reqwest::Client,
    ) -> Result<Self, CredentialError> {
        let account = std::env::var(SERVICE_ACCOUNT)
            .ok()
            .filter(|json| !json.trim().is_empty())
            .map(|json| ServiceAccount::from_json(&json))
            .transpose()?;

        Self::resolve(
            account,
            std::env::var(EMULATOR_PROJECT).ok(),
            endpoints.emulated,
            http,
        )
    }

    fn resolve(
        account: Option<ServiceAccount>,
        emulator_project: Option<String>,
        emulated: bool,
        http: reqwest::Client,
    ) -> Result<Self, CredentialError> {
        if emulated {
            let project_id = emulator_project
                .filter(|project| !project.is_empty())
                .or(account.map(|account| account.project_id))
                .ok_or(CredentialError::Missing(EMULATOR_PROJECT))?;

            tracing::warn!(%project_id, "using Firebase emulators");
            return Ok(Self::Emulator { project_id });
        }

        let account = account.ok_or(CredentialError::Missing(SERVICE_ACCOUNT))?;
        tracing::info!(
            project_id = account.project_id,
            client_email = account.client_email,
            "service account loaded"
        );

        Ok(Self::ServiceAccount(TokenSource::new(account, http)?))
    }

    /// Project every request is scoped to.
    pub fn project_id(&self) -> &str {
        match self {
            Self::ServiceAccount(source) => &source.account.project_id,
            Self::Emulator { project_id } => project_id,
        }
    }

    /// Value of the `Authorization` header.
    pub async fn authorization(&self) -> Result<String, TokenError> {
        let token = match self {
            Self::ServiceAccount(source) => source.token().await?,
            Self::Emulator { .. } => EMULATOR_TOKEN.to_owned(),
        };
        Ok(format!("Bearer {token}"))
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs())
        .unwrap_or_default()
}
