use std::{env, fmt::Display, str::FromStr, time::Duration};

use log::{info, LevelFilter};

use crate::error::ConfigError;

const DEFAULT_API_URL: &str = "http://127.0.0.1:8000/api";
const DEFAULT_WS_URL: &str = "ws://127.0.0.1:8000/ws/live-quiz";
const DEFAULT_RECONNECT_DELAY_MS: &str = "3000";
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone)]
pub struct QuizConfig {
    pub api_url: String,
    pub ws_url: String,
    pub reconnect_delay: Duration,
    pub auth_token: Option<String>,
    pub log_level: LevelFilter,
}

impl Default for QuizConfig {
    fn default() -> Self {
        QuizConfig {
            api_url: DEFAULT_API_URL.to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
            reconnect_delay: Duration::from_millis(3000),
            auth_token: None,
            log_level: LevelFilter::Info,
        }
    }
}

impl QuizConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup, `load` uses the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_url = trim_url(try_load(&lookup, "LIVE_QUIZ_API_URL", DEFAULT_API_URL)?)?;
        let ws_url = trim_url(try_load(&lookup, "LIVE_QUIZ_WS_URL", DEFAULT_WS_URL)?)?;
        if !(ws_url.starts_with("ws://") || ws_url.starts_with("wss://")) {
            return Err(ConfigError::Url(ws_url));
        }

        let reconnect_ms: u64 = try_load(
            &lookup,
            "LIVE_QUIZ_RECONNECT_DELAY_MS",
            DEFAULT_RECONNECT_DELAY_MS,
        )?;
        let log_level: LevelFilter = try_load(&lookup, "LIVE_QUIZ_LOG_LEVEL", DEFAULT_LOG_LEVEL)?;

        Ok(QuizConfig {
            api_url,
            ws_url,
            reconnect_delay: Duration::from_millis(reconnect_ms),
            auth_token: lookup("LIVE_QUIZ_AUTH_TOKEN").filter(|token| !token.is_empty()),
            log_level,
        })
    }

    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    pub fn with_ws_url(mut self, ws_url: impl Into<String>) -> Self {
        self.ws_url = ws_url.into();
        self
    }

    pub fn with_reconnect_delay(mut self, reconnect_delay: Duration) -> Self {
        self.reconnect_delay = reconnect_delay;
        self
    }

    pub fn with_auth_token(mut self, auth_token: impl Into<String>) -> Self {
        self.auth_token = Some(auth_token.into());
        self
    }

    pub fn session_url(&self, session_id: &str) -> String {
        format!("{}/live-quiz/{}/", self.api_url, session_id)
    }

    pub fn answer_url(&self, session_id: &str) -> String {
        format!("{}/live-quiz/{}/answer/", self.api_url, session_id)
    }
}

/// Stream endpoint of one session under the `ws_url` base.
pub fn stream_url(ws_url: &str, session_id: &str) -> String {
    format!("{}/{}/", ws_url.trim_end_matches('/'), session_id)
}

fn try_load<F, T>(lookup: &F, key: &str, default: &str) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: Display,
{
    let raw = lookup(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    raw.trim().parse().map_err(|error: T::Err| ConfigError::Invalid {
        key: key.to_string(),
        reason: error.to_string(),
    })
}

fn trim_url(url: String) -> Result<String, ConfigError> {
    let trimmed = url.trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(ConfigError::Url(url));
    }
    Ok(trimmed.to_string())
}
