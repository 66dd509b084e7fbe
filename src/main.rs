use create_user::config::Configuration;
use create_user::{FUNCTION_PATH, app, initialize_state, telemetry};
use tokio::net::TcpListener;

const CONFIG_PATH: &str = "CONFIG_PATH";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    telemetry::setup_logging();

    let config = Configuration::default()
        .path(std::env::var(CONFIG_PATH).unwrap_or_default())
        .read();
    let addr = config.socket();

    let state = initialize_state(config).await?;

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, path = FUNCTION_PATH, "server listening");

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutting down");
}
