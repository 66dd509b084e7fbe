//! Configuration manager for create-user.

use std::fs::File;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::FromRef;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::AppState;

const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const VERSION: &str = env!("CARGO_PKG_VERSION");

const DEFAULT_NAME: &str = "create-user";
const DEFAULT_PORT: u16 = 8888;
const DEFAULT_COLLECTION: &str = "users";
const DEFAULT_DATABASE: &str = "(default)";
const DEFAULT_TIMEOUT: u64 = 10;

const IDENTITY_TOOLKIT_URL: &str = "https://identitytoolkit.googleapis.com";
const FIRESTORE_URL: &str = "https://firestore.googleapis.com";

/// Environment variable redirecting Firebase Authentication calls.
pub const AUTH_EMULATOR_HOST: &str = "FIREBASE_AUTH_EMULATOR_HOST";
/// Environment variable redirecting Cloud Firestore calls.
pub const FIRESTORE_EMULATOR_HOST: &str = "FIRESTORE_EMULATOR_HOST";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Instance name.
    pub name: String,
    /// Bind address.
    pub address: IpAddr,
    /// Bind port.
    pub port: u16,
    /// Collection receiving profile records.
    pub collection: String,
    /// Firestore database identifier.
    pub database: String,
    /// Delete the freshly created account when the profile write fails.
    pub rollback: bool,
    /// Request timeout, in seconds.
    pub timeout: u64,
    /// Expose Prometheus metrics on `/metrics`.
    pub metrics: bool,
    #[serde(skip_deserializing)]
    version: String,
    #[serde(skip)]
    path: PathBuf,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_owned(),
            address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            collection: DEFAULT_COLLECTION.to_owned(),
            database: DEFAULT_DATABASE.to_owned(),
            rollback: true,
            timeout: DEFAULT_TIMEOUT,
            metrics: false,
            version: VERSION.to_owned(),
            path: PathBuf::default(),
        }
    }
}

impl FromRef<AppState> for Arc<Configuration> {
    fn from_ref(state: &AppState) -> Arc<Configuration> {
        Arc::clone(&state.config)
    }
}

impl Configuration {
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }

    /// Application version.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Socket the HTTP server listens on.
    pub fn socket(&self) -> SocketAddr {
        SocketAddr::new(self.address, self.port)
    }

    /// Global request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    /// Reads the `config.yaml` file from the specified path or the default
    /// location.
    pub fn read(self) -> Arc<Self> {
        let file_path = if self.path.is_file() {
            &self.path
        } else {
            &Path::new(DEFAULT_CONFIG_PATH).to_path_buf()
        };

        match File::open(file_path) {
            Ok(file) => match serde_yaml::from_reader::<_, Configuration>(file)
            {
                Ok(mut config) => {
                    config.version = VERSION.to_owned();
                    config.path = file_path.clone();
                    if config.timeout == 0 {
                        tracing::warn!(
                            default = DEFAULT_TIMEOUT,
                            "`timeout` must be at least one second, using default"
                        );
                        config.timeout = DEFAULT_TIMEOUT;
                    }
                    Arc::new(config)
                },
                Err(err) => Arc::new(self.error(err)),
            },
            Err(err) => Arc::new(self.error(err)),
        }
    }

    /// Return a default configuration as fallback.
    fn error(&self, err: impl std::error::Error) -> Self {
        tracing::error!(error = %err, "`config.yaml` file not found or invalid, using defaults");
        Self::default()
    }
}

/// Base URLs of the Google APIs.
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoints {
    pub identity: Url,
    pub firestore: Url,
    /// Both services are local emulators.
    pub emulated: bool,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            identity: Url::parse(IDENTITY_TOOLKIT_URL)
                .expect("identity toolkit URL is valid"),
            firestore: Url::parse(FIRESTORE_URL)
                .expect("firestore URL is valid"),
            emulated: false,
        }
    }
}

impl Endpoints {
    /// Resolve endpoints, honouring the Firebase emulator variables.
    pub fn from_env() -> Result<Self, url::ParseError> {
        Self::resolve(
            std::env::var(AUTH_EMULATOR_HOST).ok().as_deref(),
            std::env::var(FIRESTORE_EMULATOR_HOST).ok().as_deref(),
        )
    }

    fn resolve(
        auth_host: Option<&str>,
        firestore_host: Option<&str>,
    ) -> Result<Self, url::ParseError> {
        let mut endpoints = Self::default();

        let auth_host = auth_host.filter(|host| !host.is_empty());
        let firestore_host = firestore_host.filter(|host| !host.is_empty());

        if let Some(host) = auth_host {
            // The auth emulator serves the API under its production host
            // name as a path prefix.
            endpoints.identity = Url::parse(&format!(
                "{}/identitytoolkit.googleapis.com/",
                normalize_host(host)
            ))?;
        }
        if let Some(host) = firestore_host {
            endpoints.firestore = Url::parse(&normalize_host(host))?;
        }
        endpoints.emulated = auth_host.is_some() && firestore_host.is_some();

        Ok(endpoints)
    }
}

/// Emulator hosts are given as `host:port`, without scheme.
fn normalize_host(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_owned()
    } else {
        format!("http://{host}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = Configuration::default()
            .path("/nonexistent/create-user.yaml")
            .read();

        assert_eq!(config.name, DEFAULT_NAME);
        assert_eq!(config.collection, "users");
        assert_eq!(config.database, "(default)");
        assert!(config.rollback);
        assert_eq!(config.version(), VERSION);
        assert_eq!(config.socket().port(), DEFAULT_PORT);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config: Configuration = serde_yaml::from_str(
            "collection: members\nrollback: false\nmetrics: true\n",
        )
        .unwrap();

        assert_eq!(config.collection, "members");
        assert!(!config.rollback);
        assert!(config.metrics);
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_zero_timeout_uses_default() {
        let path = std::env::temp_dir()
            .join(format!("create-user-{}-timeout.yaml", std::process::id()));
        std::fs::write(&path, "timeout: 0\ncollection: members\n").unwrap();

        let config = Configuration::default().path(path.clone()).read();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.collection, "members");
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_production_endpoints() {
        let endpoints = Endpoints::resolve(None, None).unwrap();

        assert_eq!(endpoints, Endpoints::default());
        assert!(!endpoints.emulated);
    }

    #[test]
    fn test_emulator_endpoints() {
        let endpoints =
            Endpoints::resolve(Some("127.0.0.1:9099"), Some("localhost:8080"))
                .unwrap();

        assert_eq!(
            endpoints.identity.as_str(),
            "http://127.0.0.1:9099/identitytoolkit.googleapis.com/"
        );
        assert_eq!(endpoints.firestore.as_str(), "http://localhost:8080/");
        assert!(endpoints.emulated);

        let endpoints =
            Endpoints::resolve(Some("127.0.0.1:9099"), None).unwrap();
        assert!(!endpoints.emulated);
        assert_eq!(endpoints.firestore.as_str(), "https://firestore.googleapis.com/");
    }
}
