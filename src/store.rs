//! Cloud Firestore, reached through its REST API.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::header;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::credential::{Credentials, TokenError};
use crate::error::google_error_message;

const REQUEST_TIME: &str = "REQUEST_TIME";

/// Field value written to a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Explicit null, stored as a field.
    Null,
    String(String),
    /// Filled in by the store at write time.
    ServerTimestamp,
}

impl From<Option<String>> for Value {
    fn from(value: Option<String>) -> Self {
        value.map(Value::String).unwrap_or(Value::Null)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

/// Set of fields stored under one key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Document {
    fields: BTreeMap<String, Value>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a field.
    pub fn field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(name.to_owned(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }
}

/// Outcome of a write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteResult {
    pub commit_time: Option<DateTime<Utc>>,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("document store unreachable: {0}")]
    Request(#[from] reqwest::Error),

    #[error("invalid document store URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("{0}")]
    Rejected(String),

    #[error("document store did not answer within {0:?}")]
    Timeout(std::time::Duration),
}

/// Document store port.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Create or overwrite the document `key` of `collection`.
    async fn set_document(
        &self,
        collection: &str,
        key: &str,
        document: &Document,
    ) -> Result<WriteResult, StoreError>;
}

#[derive(Debug, Serialize)]
struct CommitRequest<'a> {
    writes: [Write<'a>; 1],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Write<'a> {
    update: DocumentBody<'a>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    update_transforms: Vec<FieldTransform<'a>>,
}

#[derive(Debug, Serialize)]
struct DocumentBody<'a> {
    name: String,
    fields: BTreeMap<&'a str, FieldValue<'a>>,
}

#[derive(Debug, Serialize)]
enum FieldValue<'a> {
    #[serde(rename = "nullValue")]
    Null(()),
    #[serde(rename = "stringValue")]
    String(&'a str),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FieldTransform<'a> {
    field_path: &'a str,
    set_to_server_value: &'static str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommitResponse {
    #[serde(default)]
    commit_time: Option<DateTime<Utc>>,
}

impl<'a> CommitRequest<'a> {
    /// A single update without precondition, so an existing document is
    /// replaced.
    fn set(name: String, document: &'a Document) -> Self {
        let mut fields = BTreeMap::new();
        let mut update_transforms = Vec::new();

        for (field, value) in document.iter() {
            match value {
                Value::Null => {
                    fields.insert(field.as_str(), FieldValue::Null(()));
                },
                Value::String(value) => {
                    fields.insert(field.as_str(), FieldValue::String(value));
                },
                Value::ServerTimestamp => {
                    update_transforms.push(FieldTransform {
                        field_path: field,
                        set_to_server_value: REQUEST_TIME,
                    });
                },
            }
        }

        Self {
            writes: [Write {
                update: DocumentBody { name, fields },
                update_transforms,
            }],
        }
    }
}

/// Firestore v1 client.
pub struct Firestore {
    http: reqwest::Client,
    base: Url,
    credentials: Arc<Credentials>,
    database: String,
}

impl Firestore {
    /// Create a new [`Firestore`] client for the given database.
    pub fn new(
        http: reqwest::Client,
        base: Url,
        credentials: Arc<Credentials>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base,
            credentials,
            database: database.into(),
        }
    }

    fn database_path(&self) -> String {
        format!(
            "projects/{}/databases/{}",
            self.credentials.project_id(),
            self.database
        )
    }
}

#[async_trait]
impl DocumentStore for Firestore {
    async fn set_document(
        &self,
        collection: &str,
        key: &str,
        document: &Document,
    ) -> Result<WriteResult, StoreError> {
        let database = self.database_path();
        let url = self.base.join(&format!("v1/{database}/documents:commit"))?;
        let name = format!("{database}/documents/{collection}/{key}");

        let response = self
            .http
            .post(url)
            .header(
                header::AUTHORIZATION,
                self.credentials.authorization().await?,
            )
            .json(&CommitRequest::set(name, document))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(StoreError::Rejected(
                google_error_message(response).await,
            ));
        }

        let body = response.json::<CommitResponse>().await?;
        tracing::trace!(collection, key, commit_time = ?body.commit_time, "document written");

        Ok(WriteResult {
            commit_time: body.commit_time,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use chrono::TimeZone;
    use serde_json::json;

    use super::*;
    use crate::testing::serve;

    type Commits = Arc<Mutex<Vec<serde_json::Value>>>;

    async fn firestore(router: Router) -> Firestore {
        let credentials = Arc::new(Credentials::Emulator {
            project_id: "demo-project".into(),
        });
        Firestore::new(
            reqwest::Client::new(),
            serve(router).await,
            credentials,
            "(default)",
        )
    }

    fn document() -> Document {
        Document::new()
            .field("uid", "uid-42")
            .field("phone", None::<String>)
            .field("createdAt", Value::ServerTimestamp)
    }

    #[tokio::test]
    async fn test_set_document() {
        let commits = Commits::default();
        let router = Router::new()
            .route(
                "/v1/projects/demo-project/databases/{database}/documents:commit",
                post(
                    |State(commits): State<Commits>,
                     Json(body): Json<serde_json::Value>| async move {
                        commits.lock().unwrap().push(body);
                        Json(json!({
                            "writeResults": [{ "updateTime": "2025-03-01T10:00:00.5Z" }],
                            "commitTime": "2025-03-01T10:00:00.5Z",
                        }))
                    },
                ),
            )
            .with_state(Arc::clone(&commits));
        let store = firestore(router).await;

        let result = store
            .set_document("users", "uid-42", &document())
            .await
            .unwrap();
        assert_eq!(
            result.commit_time,
            Some(
                Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap()
                    + chrono::Duration::milliseconds(500)
            )
        );

        let commits = commits.lock().unwrap();
        assert_eq!(
            commits[0],
            json!({
                "writes": [{
                    "update": {
                        "name": "projects/demo-project/databases/(default)/documents/users/uid-42",
                        "fields": {
                            "phone": { "nullValue": null },
                            "uid": { "stringValue": "uid-42" },
                        },
                    },
                    "updateTransforms": [
                        { "fieldPath": "createdAt", "setToServerValue": "REQUEST_TIME" },
                    ],
                }],
            })
        );
    }

    #[tokio::test]
    async fn test_rejected_write() {
        let router = Router::new().route(
            "/v1/projects/demo-project/databases/{database}/documents:commit",
            post(|| async {
                (
                    StatusCode::FORBIDDEN,
                    Json(json!({
                        "error": {
                            "code": 403,
                            "message": "Missing or insufficient permissions.",
                            "status": "PERMISSION_DENIED",
                        }
                    })),
                )
            }),
        );
        let store = firestore(router).await;

        let err = store
            .set_document("users", "uid-42", &document())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Missing or insufficient permissions.");
    }

    #[test]
    fn test_value_from_option() {
        assert_eq!(Value::from(None::<String>), Value::Null);
        assert_eq!(
            Value::from(Some("admin".to_owned())),
            Value::String("admin".into())
        );
    }
}
