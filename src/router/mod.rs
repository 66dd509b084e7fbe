pub mod create;
pub mod status;

use axum::Router;
use axum::routing::{MethodRouter, get, post};

use crate::AppState;
use crate::telemetry;

/// Path the function answers on when deployed on Netlify.
pub const FUNCTION_PATH: &str = "/.netlify/functions/create-user";

fn create() -> MethodRouter<AppState> {
    post(create::handler).fallback(create::method_not_allowed)
}

/// Routes of the application.
pub fn router(state: &AppState) -> Router<AppState> {
    let router = Router::new()
        // `POST /` and `POST /.netlify/functions/create-user` go to `create`.
        .route("/", create())
        .route(FUNCTION_PATH, create())
        // `GET /status.json` goes to `status`.
        .route("/status.json", get(status::status));

    match &state.metrics {
        Some(_) => router.route("/metrics", get(telemetry::render)),
        None => router,
    }
}
