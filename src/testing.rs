//! Test doubles. MUST NEVER be used in production.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use url::Url;

use crate::config::Configuration;
use crate::identity::{CreatedAccount, IdentityError, IdentityProvider, NewAccount};
use crate::store::{Document, DocumentStore, StoreError, WriteResult};
use crate::user::Registration;
use crate::AppState;

/// Serve `router` on a random local port and return its base URL.
pub async fn serve(router: Router) -> Url {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("cannot bind test listener");
    let addr = listener.local_addr().expect("listener has no address");

    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("test server failed");
    });

    Url::parse(&format!("http://{addr}/")).expect("invalid test server URL")
}

/// In-memory identity provider handing out `uid-1`, `uid-2`...
#[derive(Default)]
pub struct FakeIdentity {
    rejection: Option<String>,
    failing_delete: bool,
    created: Mutex<Vec<NewAccount>>,
    deleted: Mutex<Vec<String>>,
}

impl FakeIdentity {
    /// Reject every creation with an Identity Toolkit code.
    pub fn rejecting(code: &str) -> Self {
        Self {
            rejection: Some(code.to_owned()),
            ..Default::default()
        }
    }

    pub fn failing_delete(mut self) -> Self {
        self.failing_delete = true;
        self
    }

    pub fn created(&self) -> Vec<NewAccount> {
        self.created.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    async fn create_account(
        &self,
        account: &NewAccount,
    ) -> Result<CreatedAccount, IdentityError> {
        if let Some(code) = &self.rejection {
            return Err(IdentityError::rejected(code));
        }

        let mut created = self.created.lock().unwrap();
        created.push(account.clone());
        Ok(CreatedAccount {
            uid: format!("uid-{}", created.len()),
        })
    }

    async fn delete_account(&self, uid: &str) -> Result<(), IdentityError> {
        self.deleted.lock().unwrap().push(uid.to_owned());
        if self.failing_delete {
            Err(IdentityError::rejected("USER_NOT_FOUND"))
        } else {
            Ok(())
        }
    }
}

/// In-memory document store recording every write.
#[derive(Default)]
pub struct FakeStore {
    failure: Option<String>,
    delay: Option<Duration>,
    writes: Mutex<Vec<(String, String, Document)>>,
}

impl FakeStore {
    /// Fail every write with `message`.
    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_owned()),
            ..Default::default()
        }
    }

    /// Hold every write for `delay` before recording it.
    pub fn stalling(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }

    pub fn writes(&self) -> Vec<(String, String, Document)> {
        self.writes.lock().unwrap().clone()
    }
}

#[async_trait]
impl DocumentStore for FakeStore {
    async fn set_document(
        &self,
        collection: &str,
        key: &str,
        document: &Document,
    ) -> Result<WriteResult, StoreError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = &self.failure {
            return Err(StoreError::Rejected(message.clone()));
        }

        self.writes.lock().unwrap().push((
            collection.to_owned(),
            key.to_owned(),
            document.clone(),
        ));
        Ok(WriteResult::default())
    }
}

/// Application state wired to the given doubles.
pub fn state(identity: &Arc<FakeIdentity>, store: &Arc<FakeStore>) -> AppState {
    let config = Arc::new(Configuration::default());

    AppState {
        registration: Arc::new(Registration::new(
            identity.clone(),
            store.clone(),
            config.collection.clone(),
            config.rollback,
            config.request_timeout(),
        )),
        config,
        metrics: None,
    }
}
