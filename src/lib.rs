//! create-user registers people on Firebase Authentication and stores their
//! profile on Cloud Firestore.

#![forbid(unsafe_code)]

pub mod config;
pub mod credential;
pub mod error;
pub mod identity;
mod router;
pub mod store;
pub mod telemetry;
pub mod user;

#[cfg(test)]
mod testing;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::header;
use axum::{Router, middleware as AxumMiddleware};
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceBuilder;
use tower_http::LatencyUnit;
use tower_http::sensitive_headers::SetSensitiveHeadersLayer;
use tower_http::trace::{
    DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer,
};

use config::{Configuration, Endpoints};
use credential::Credentials;
use identity::IdentityToolkit;
use store::Firestore;
use user::Registration;

pub use error::ServerError;
pub use router::FUNCTION_PATH;

/// MUST NEVER be used in production.
#[cfg(test)]
pub async fn make_request(
    app: Router,
    method: axum::http::Method,
    path: &str,
    body: String,
) -> axum::http::Response<axum::body::Body> {
    use axum::extract::Request;
    use tower::util::ServiceExt;

    app.oneshot(
        Request::builder()
            .method(method)
            .uri(path)
            .header(header::CONTENT_TYPE, "application/json")
            .body(axum::body::Body::from(body))
            .unwrap(),
    )
    .await
    .unwrap()
}

/// State sharing between routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Configuration>,
    pub registration: Arc<Registration>,
    pub metrics: Option<PrometheusHandle>,
}

/// Create router.
pub fn app(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        // Add high level tracing/logging to all requests.
        .layer(
            TraceLayer::new_for_http()
                .on_body_chunk(|chunk: &Bytes, latency: Duration, _span: &tracing::Span| {
                    tracing::trace!(size_bytes = chunk.len(), latency = ?latency, "sending body chunk")
                })
                .make_span_with(DefaultMakeSpan::new().level(tracing::Level::INFO))
                .on_request(DefaultOnRequest::new())
                .on_response(DefaultOnResponse::new().latency_unit(LatencyUnit::Micros)),
        )
        // Remove sensitive headers from trace.
        .layer(SetSensitiveHeadersLayer::new([header::AUTHORIZATION, header::COOKIE]));

    router::router(&state)
        .with_state(state)
        .route_layer(AxumMiddleware::from_fn(telemetry::track))
        .layer(middleware)
}

/// Initialize the application state.
///
/// The service credential is read here, once per process.
pub async fn initialize_state(
    config: Arc<Configuration>,
) -> Result<AppState, Box<dyn std::error::Error>> {
    let endpoints = Endpoints::from_env()?;

    let http = reqwest::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .timeout(config.request_timeout())
        .build()?;

    let credentials = Arc::new(Credentials::from_env(&endpoints, http.clone())?);

    let identity = IdentityToolkit::new(
        http.clone(),
        endpoints.identity.clone(),
        Arc::clone(&credentials),
    );
    let store = Firestore::new(
        http,
        endpoints.firestore.clone(),
        credentials,
        config.database.clone(),
    );
    tracing::info!(
        identity = %endpoints.identity,
        firestore = %endpoints.firestore,
        collection = config.collection,
        rollback = config.rollback,
        "external services configured"
    );

    let registration = Arc::new(Registration::new(
        Arc::new(identity),
        Arc::new(store),
        config.collection.clone(),
        config.rollback,
        config.request_timeout(),
    ));

    let metrics = if config.metrics {
        Some(telemetry::setup_metrics_recorder()?)
    } else {
        None
    };

    Ok(AppState {
        config,
        registration,
        metrics,
    })
}
