use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use crate::error::Result;
use crate::identity::{IdentityError, IdentityProvider};
use crate::store::{DocumentStore, StoreError};
use crate::user::UserCreationRequest;

/// Registration manager.
///
/// Creates the account first, then its profile record. Both calls are
/// sequential and never retried. Each external call is bounded by
/// `timeout`, so a stalled service ends as an error, never as a dropped
/// registration.
#[derive(Clone)]
pub struct Registration {
    identity: Arc<dyn IdentityProvider>,
    store: Arc<dyn DocumentStore>,
    collection: String,
    rollback: bool,
    timeout: Duration,
}

impl Registration {
    /// Create a new [`Registration`].
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        store: Arc<dyn DocumentStore>,
        collection: impl Into<String>,
        rollback: bool,
        timeout: Duration,
    ) -> Self {
        Self {
            identity,
            store,
            collection: collection.into(),
            rollback,
            timeout,
        }
    }

    /// Register a user and return its identifier.
    pub async fn register(&self, request: UserCreationRequest) -> Result<String> {
        let account = timeout(
            self.timeout,
            self.identity.create_account(&request.account()),
        )
        .await
        .unwrap_or(Err(IdentityError::Timeout(self.timeout)))?;
        tracing::debug!(uid = account.uid, "account created");

        let profile = request.profile(&account.uid);
        let written = timeout(
            self.timeout,
            self.store.set_document(&self.collection, &account.uid, &profile),
        )
        .await
        .unwrap_or(Err(StoreError::Timeout(self.timeout)));

        if let Err(err) = written {
            if self.rollback {
                self.compensate(&account.uid).await;
            } else {
                tracing::warn!(
                    uid = account.uid,
                    "profile not written, account left without profile"
                );
            }
            return Err(err.into());
        }

        metrics::counter!("users_created_total").increment(1);
        tracing::info!(uid = account.uid, collection = self.collection, "user created");

        Ok(account.uid)
    }

    /// Remove an account whose profile could not be written.
    async fn compensate(&self, uid: &str) {
        let deleted = timeout(self.timeout, self.identity.delete_account(uid))
            .await
            .unwrap_or(Err(IdentityError::Timeout(self.timeout)));

        match deleted {
            Ok(()) => {
                metrics::counter!("users_rolled_back_total").increment(1);
                tracing::info!(uid, "account deleted after profile failure");
            },
            Err(err) => {
                metrics::counter!("users_orphaned_total").increment(1);
                tracing::error!(
                    uid,
                    error = %err,
                    "account orphaned, rollback failed"
                );
            },
        }
    }
}
