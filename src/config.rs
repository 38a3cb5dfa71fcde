//! Configuration types, built from environment variables.
//!
//! Nothing here is required at boot. Missing provider keys degrade the
//! pipeline (placeholder records, low-confidence extractions) instead of
//! preventing startup.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Default timeout applied to every outbound provider call.
const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 60;

/// Full service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub providers: ProviderConfig,
}

impl AppConfig {
    /// Build the full configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            server: ServerConfig::from_env()?,
            database: DatabaseConfig::from_env(),
            storage: StorageConfig::from_env(),
            providers: ProviderConfig::from_env(),
        })
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let raw = std::env::var("INBOX_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
        let bind_addr = raw.parse().map_err(|e| ConfigError::InvalidValue {
            key: "INBOX_BIND_ADDR".to_string(),
            message: format!("{raw}: {e}"),
        })?;
        Ok(Self { bind_addr })
    }
}

/// Tenant store location.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// `libsql://` / `https://` for a remote store, anything else is a local path.
    pub url: String,
    pub auth_token: Option<SecretString>,
}

impl DatabaseConfig {
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "./data/invoice-inbox.db".to_string()),
            auth_token: secret_var("DATABASE_AUTH_TOKEN"),
        }
    }

    /// Whether the URL points at a remote libSQL server.
    pub fn is_remote(&self) -> bool {
        ["libsql://", "https://", "http://", "wss://", "ws://"]
            .iter()
            .any(|scheme| self.url.starts_with(scheme))
    }
}

/// PDF object storage settings.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Base URL of the storage REST API. `None` selects the local-disk store.
    pub url: Option<String>,
    pub service_key: Option<SecretString>,
    pub bucket: String,
    pub local_dir: PathBuf,
    pub public_base_url: String,
}

impl StorageConfig {
    pub fn from_env() -> Self {
        Self {
            url: non_empty_var("STORAGE_URL").map(|u| u.trim_end_matches('/').to_string()),
            service_key: secret_var("STORAGE_SERVICE_KEY"),
            bucket: std::env::var("STORAGE_BUCKET")
                .unwrap_or_else(|_| "supplier-invoices".to_string()),
            local_dir: std::env::var("STORAGE_LOCAL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("./data/pdfs")),
            public_base_url: std::env::var("STORAGE_PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8080/files".to_string()),
        }
    }
}

/// Credentials and endpoints for the external providers.
///
/// Passed into each component at construction time so tests can run the
/// pipeline with mock or absent credentials.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub ocr_api_key: Option<SecretString>,
    pub llm_api_key: Option<SecretString>,
    pub llm_model: String,
    pub email_api_key: Option<SecretString>,
    pub email_api_url: String,
    pub timeout: Duration,
}

impl ProviderConfig {
    pub fn from_env() -> Self {
        let shared_google = non_empty_var("GOOGLE_API_KEY");

        let timeout_secs: u64 = std::env::var("PROVIDER_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_PROVIDER_TIMEOUT_SECS);

        Self {
            ocr_api_key: non_empty_var("GOOGLE_VISION_API_KEY")
                .or_else(|| shared_google.clone())
                .map(SecretString::from),
            llm_api_key: non_empty_var("GEMINI_API_KEY")
                .or(shared_google)
                .map(SecretString::from),
            llm_model: std::env::var("GEMINI_MODEL")
                .unwrap_or_else(|_| "gemini-2.0-flash".to_string()),
            email_api_key: secret_var("RESEND_API_KEY"),
            email_api_url: std::env::var("RESEND_API_URL")
                .unwrap_or_else(|_| "https://api.resend.com".to_string())
                .trim_end_matches('/')
                .to_string(),
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// Configuration with every provider disabled.
    pub fn disabled() -> Self {
        Self {
            ocr_api_key: None,
            llm_api_key: None,
            llm_model: "gemini-2.0-flash".to_string(),
            email_api_key: None,
            email_api_url: "https://api.resend.com".to_string(),
            timeout: Duration::from_secs(DEFAULT_PROVIDER_TIMEOUT_SECS),
        }
    }
}

/// Build a `reqwest::Client` with the provider timeout applied.
pub fn http_client(timeout: Duration) -> Result<reqwest::Client, ConfigError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| ConfigError::HttpClient(e.to_string()))
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn secret_var(key: &str) -> Option<SecretString> {
    non_empty_var(key).map(SecretString::from)
}
