use std::{path::Path, time::Duration};

use anyhow::{bail, Context, Result};
use client_core::ClientSettings;
use config::{Config, Environment, File};
use serde::Deserialize;
use url::Url;

const DEFAULT_CONFIG_FILE: &str = "sync_cli.toml";
const ENV_PREFIX: &str = "BUJO_SYNC";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Empty means no API is configured; every intent then fails with
    /// "calendar API is unavailable".
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    pub auth_token: Option<String>,
    pub dispatch_queue_capacity: usize,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_base_url: "http://127.0.0.1:8080".into(),
            request_timeout_secs: 30,
            auth_token: None,
            dispatch_queue_capacity: 64,
            log_filter: "info".into(),
        }
    }
}

impl Settings {
    pub fn client_settings(&self) -> Result<Option<ClientSettings>> {
        if self.api_base_url.trim().is_empty() {
            return Ok(None);
        }
        let base_url = parse_base_url(&self.api_base_url)?;
        Ok(Some(ClientSettings {
            base_url,
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            auth_token: self.auth_token.clone().filter(|token| !token.is_empty()),
        }))
    }
}

/// Defaults, then `sync_cli.toml` (or `path`, which must exist), then
/// `BUJO_SYNC__*` environment variables.
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let env = Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .try_parsing(true);
    load_from(path, env)
}

fn load_from(path: Option<&Path>, env: Environment) -> Result<Settings> {
    let file = match path {
        Some(path) => File::from(path).required(true),
        None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
    };

    let settings: Settings = Config::builder()
        .add_source(file)
        .add_source(env)
        .build()
        .context("failed to read sync settings")?
        .try_deserialize()
        .context("invalid sync settings")?;

    settings.client_settings()?;
    if settings.request_timeout_secs == 0 {
        bail!("request_timeout_secs must be greater than zero");
    }
    Ok(settings)
}

fn parse_base_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw.trim()).with_context(|| format!("invalid api_base_url {raw:?}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!("api_base_url must be http or https, got {raw:?}");
    }
    Ok(url)
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
