use std::time::Duration;

use crate::error::{Error, Result};

pub const BASE_URL_ENV_VAR: &str = "RAGBRIEF_BASE_URL";
pub const API_KEY_ENV_VAR: &str = "RAGBRIEF_API_KEY";
pub const CHAT_MODEL_ENV_VAR: &str = "RAGBRIEF_CHAT_MODEL";
pub const EMBED_MODEL_ENV_VAR: &str = "RAGBRIEF_EMBED_MODEL";
pub const RERANK_URL_ENV_VAR: &str = "RAGBRIEF_RERANK_URL";
pub const TIMEOUT_ENV_VAR: &str = "RAGBRIEF_TIMEOUT_SECS";

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_EMBED_MODEL: &str = "text-embedding-3-large";
pub const DEFAULT_RERANK_URL: &str = "http://localhost:8080";
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Sampling temperature for every chat completion.
pub const TEMPERATURE: f32 = 0.2;

/// Values given explicitly on the command line.
#[derive(Debug, Clone, Default)]
pub struct ApiOverrides {
    pub base_url: Option<String>,
    pub chat_model: Option<String>,
    pub embed_model: Option<String>,
    pub rerank_url: Option<String>,
    pub timeout_secs: Option<u64>,
}

/// Where and how to reach the model services.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub chat_model: String,
    pub embed_model: String,
    pub rerank_url: String,
    pub timeout: Duration,
    pub temperature: f32,
}

impl ApiSettings {
    /// Resolve each setting from, in order of priority:
    /// 1. An explicit value (from the command line)
    /// 2. The matching `RAGBRIEF_*` environment variable
    /// 3. The built-in default
    ///
    /// The API key is only ever read from the environment.
    pub fn resolve(explicit: &ApiOverrides) -> Result<Self> {
        Self::from_lookup(explicit, |key| std::env::var(key).ok())
    }

    /// [`ApiSettings::resolve`] with a custom environment lookup.
    pub fn from_lookup<F>(explicit: &ApiOverrides, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let pick = |value: &Option<String>, key: &str, default: &str| {
            value
                .clone()
                .or_else(|| env(key))
                .unwrap_or_else(|| default.to_string())
        };

        let timeout_secs = match explicit.timeout_secs {
            Some(secs) => secs,
            None => match env(TIMEOUT_ENV_VAR) {
                Some(raw) => raw.trim().parse().map_err(|_| {
                    Error::Config(format!(
                        "{TIMEOUT_ENV_VAR} must be a whole number of seconds, got {raw:?}"
                    ))
                })?,
                None => DEFAULT_TIMEOUT_SECS,
            },
        };
        if timeout_secs == 0 {
            return Err(Error::Config("timeout must be at least one second".into()));
        }

        Ok(Self {
            base_url: trim_slash(pick(&explicit.base_url, BASE_URL_ENV_VAR, DEFAULT_BASE_URL)),
            api_key: env(API_KEY_ENV_VAR),
            chat_model: pick(&explicit.chat_model, CHAT_MODEL_ENV_VAR, DEFAULT_CHAT_MODEL),
            embed_model: pick(&explicit.embed_model, EMBED_MODEL_ENV_VAR, DEFAULT_EMBED_MODEL),
            rerank_url: trim_slash(pick(&explicit.rerank_url, RERANK_URL_ENV_VAR, DEFAULT_RERANK_URL)),
            timeout: Duration::from_secs(timeout_secs),
            temperature: TEMPERATURE,
        })
    }
}

fn trim_slash(mut url: String) -> String {
    while url.ends_with('/') {
        url.pop();
    }
    url
}
