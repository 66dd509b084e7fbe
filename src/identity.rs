//! Firebase Authentication, reached through the Identity Toolkit REST API.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::header;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::credential::{Credentials, TokenError};
use crate::error::google_error_message;

/// Account to create on the identity provider.
#[derive(Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAccount {
    pub email: String,
    pub password: String,
    pub display_name: String,
}

impl fmt::Debug for NewAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewAccount")
            .field("email", &self.email)
            .field("display_name", &self.display_name)
            .finish_non_exhaustive()
    }
}

/// Account returned by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedAccount {
    pub uid: String,
}

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("identity provider unreachable: {0}")]
    Request(#[from] reqwest::Error),

    #[error("invalid identity provider URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("{message}")]
    Rejected { code: String, message: String },

    #[error("identity provider returned no user identifier")]
    MissingUid,

    #[error("identity provider did not answer within {0:?}")]
    Timeout(std::time::Duration),
}

impl IdentityError {
    /// Build a rejection from an Identity Toolkit error message, formatted
    /// as `CODE` or `CODE : details`.
    pub fn rejected(raw: &str) -> Self {
        let code = raw
            .split(" : ")
            .next()
            .unwrap_or_default()
            .trim()
            .to_owned();
        let message = match describe(&code) {
            Some(message) => message.to_owned(),
            None => raw.to_owned(),
        };

        Self::Rejected { code, message }
    }
}

/// Messages reported by the Firebase admin SDK for the usual server codes.
fn describe(code: &str) -> Option<&'static str> {
    Some(match code {
        "EMAIL_EXISTS" | "DUPLICATE_EMAIL" => {
            "The email address is already in use by another account."
        },
        "INVALID_EMAIL" | "MISSING_EMAIL" => {
            "The email address is improperly formatted."
        },
        "WEAK_PASSWORD" | "INVALID_PASSWORD" | "MISSING_PASSWORD" => {
            "The password must be a string with at least 6 characters."
        },
        "INVALID_DISPLAY_NAME" => {
            "The displayName field must be a valid string."
        },
        "USER_NOT_FOUND" => {
            "There is no user record corresponding to the provided identifier."
        },
        "PROJECT_NOT_FOUND" | "CONFIGURATION_NOT_FOUND" => {
            "No Firebase project was found for the provided credential."
        },
        "INSUFFICIENT_PERMISSION" => {
            "The credential used does not have permission to access the requested resource."
        },
        "OPERATION_NOT_ALLOWED" | "PASSWORD_LOGIN_DISABLED" => {
            "The email/password sign-in provider is disabled for this Firebase project."
        },
        "QUOTA_EXCEEDED" | "TOO_MANY_ATTEMPTS_TRY_LATER" => {
            "The project quota for the specified operation has been exceeded."
        },
        _ => return None,
    })
}

/// Identity provider port.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Create an email/password account.
    async fn create_account(
        &self,
        account: &NewAccount,
    ) -> Result<CreatedAccount, IdentityError>;

    /// Delete an account by its identifier.
    async fn delete_account(&self, uid: &str) -> Result<(), IdentityError>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignUpResponse {
    #[serde(default)]
    local_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteRequest<'a> {
    local_id: &'a str,
}

/// Identity Toolkit v1 client, authenticated as a project administrator.
pub struct IdentityToolkit {
    http: reqwest::Client,
    base: Url,
    credentials: Arc<Credentials>,
}

impl IdentityToolkit {
    /// Create a new [`IdentityToolkit`] client.
    pub fn new(
        http: reqwest::Client,
        base: Url,
        credentials: Arc<Credentials>,
    ) -> Self {
        Self {
            http,
            base,
            credentials,
        }
    }

    fn url(&self, method: &str) -> Result<Url, url::ParseError> {
        self.base.join(&format!(
            "v1/projects/{}/{method}",
            self.credentials.project_id()
        ))
    }

    async fn post<T: Serialize + ?Sized>(
        &self,
        method: &str,
        body: &T,
    ) -> Result<reqwest::Response, IdentityError> {
        let response = self
            .http
            .post(self.url(method)?)
            .header(
                header::AUTHORIZATION,
                self.credentials.authorization().await?,
            )
            .json(body)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(response)
        } else {
            Err(IdentityError::rejected(
                &google_error_message(response).await,
            ))
        }
    }
}

#[async_trait]
impl IdentityProvider for IdentityToolkit {
    async fn create_account(
        &self,
        account: &NewAccount,
    ) -> Result<CreatedAccount, IdentityError> {
        let response = self.post("accounts", account).await?;

        let uid = response
            .json::<SignUpResponse>()
            .await?
            .local_id
            .filter(|uid| !uid.is_empty())
            .ok_or(IdentityError::MissingUid)?;

        Ok(CreatedAccount { uid })
    }

    async fn delete_account(&self, uid: &str) -> Result<(), IdentityError> {
        self.post("accounts:delete", &DeleteRequest { local_id: uid })
            .await?;
        Ok(())
    }
}
