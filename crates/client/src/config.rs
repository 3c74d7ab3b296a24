//! Client configuration from the environment.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};
use reqwest::Url;

use storefront_observability::LogFormat;

use crate::store::default_credentials_path;

pub const API_URL_VAR: &str = "STOREFRONT_API_URL";
pub const CREDENTIALS_PATH_VAR: &str = "STOREFRONT_CREDENTIALS_PATH";
pub const REQUEST_TIMEOUT_VAR: &str = "STOREFRONT_REQUEST_TIMEOUT_SECS";
pub const LOG_FORMAT_VAR: &str = "STOREFRONT_LOG_FORMAT";

pub const DEFAULT_API_URL: &str = "http://localhost:8080";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// API base URL without trailing slash.
    pub api_url: String,
    pub credentials_path: PathBuf,
    pub request_timeout: Duration,
    pub log_format: LogFormat,
}

impl ClientConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_url = parse_api_url(&var(API_URL_VAR).unwrap_or_else(|| DEFAULT_API_URL.to_string()))?;

        let credentials_path = match var(CREDENTIALS_PATH_VAR) {
            Some(path) => PathBuf::from(path),
            None => default_credentials_path()?,
        };

        let request_timeout = match var(REQUEST_TIMEOUT_VAR) {
            Some(raw) => {
                let secs: u64 = raw
                    .trim()
                    .parse()
                    .with_context(|| format!("{REQUEST_TIMEOUT_VAR} must be a whole number of seconds, got {raw:?}"))?;
                if secs == 0 {
                    bail!("{REQUEST_TIMEOUT_VAR} must be greater than zero");
                }
                Duration::from_secs(secs)
            }
            None => DEFAULT_REQUEST_TIMEOUT,
        };

        let log_format = match var(LOG_FORMAT_VAR) {
            Some(raw) => raw.parse::<LogFormat>().with_context(|| format!("invalid {LOG_FORMAT_VAR}"))?,
            None => LogFormat::default(),
        };

        Ok(Self {
            api_url,
            credentials_path,
            request_timeout,
            log_format,
        })
    }
}

fn parse_api_url(raw: &str) -> anyhow::Result<String> {
    let url = Url::parse(raw.trim()).with_context(|| format!("invalid {API_URL_VAR}: {raw:?}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        bail!("{API_URL_VAR} must use http or https, got {:?}", url.scheme());
    }
    Ok(url.as_str().trim_end_matches('/').to_string())
}
