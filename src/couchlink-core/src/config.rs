use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::{Error, Result};

/// How the client authenticates against the account.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuthScheme {
    /// Session cookie obtained from `/_session`, refreshed on 401
    #[default]
    Cookie,
    /// Static `Authorization: Basic` header on every request
    Basic,
    /// No authentication interceptor, even when credentials are present
    None,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    #[serde(default = "default_account_url")]
    pub account_url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub auth: AuthScheme,

    /// Attempts per logical request when response interceptors ask for a replay
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default)]
    pub insecure_skip_verify: bool,

    /// Headers sent with every request
    #[serde(default)]
    pub global_headers: BTreeMap<String, String>,

    /// Database the CLI sample works against
    #[serde(default = "default_database")]
    pub database: String,
}

pub const DEFAULT_MAX_ATTEMPTS: u32 = 10;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

fn default_account_url() -> String {
    "http://localhost:5984".to_string()
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT.as_secs()
}

fn default_database() -> String {
    "couchlink-sample".to_string()
}

impl ClientConfig {
    pub fn load(path: &str) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Configuration(format!("cannot read {}: {}", path, e)))?;
        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        let config: ClientConfig = serde_json::from_str(contents)
            .map_err(|e| Error::Configuration(format!("invalid client configuration: {}", e)))?;
        Ok(config)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            account_url: default_account_url(),
            username: None,
            password: None,
            auth: AuthScheme::default(),
            max_attempts: default_max_attempts(),
            request_timeout_secs: default_request_timeout_secs(),
            insecure_skip_verify: false,
            global_headers: BTreeMap::new(),
            database: default_database(),
        }
    }
}
