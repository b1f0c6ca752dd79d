use std::path::PathBuf;

use anyhow::{Context, Result, bail};

/// Session secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "super_secret_key",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub upload_dir: PathBuf,
    pub upload_url: String,
    pub session_secret: String,
    pub google_client_id: String,
    pub google_client_secret: String,
    pub facebook_app_id: String,
    pub facebook_app_secret: String,
}

impl Config {
    /// Read `STORYTIME_*` variables from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let session_secret = var("STORYTIME_SESSION_SECRET", "");
        if session_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&session_secret.as_str()) {
            bail!("STORYTIME_SESSION_SECRET is unset or still a placeholder");
        }

        let port = var("STORYTIME_PORT", "8000");
        let port: u16 = port
            .parse()
            .with_context(|| format!("STORYTIME_PORT '{}' is not a port number", port))?;

        Ok(Self {
            host: var("STORYTIME_HOST", "0.0.0.0"),
            port,
            db_path: var("STORYTIME_DB_PATH", "storytime.db").into(),
            upload_dir: var("STORYTIME_UPLOAD_DIR", "./uploads/photos").into(),
            upload_url: var("STORYTIME_UPLOAD_URL", "/uploads/photos"),
            session_secret,
            google_client_id: var("STORYTIME_GOOGLE_CLIENT_ID", ""),
            google_client_secret: var("STORYTIME_GOOGLE_CLIENT_SECRET", ""),
            facebook_app_id: var("STORYTIME_FACEBOOK_APP_ID", ""),
            facebook_app_secret: var("STORYTIME_FACEBOOK_APP_SECRET", ""),
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
