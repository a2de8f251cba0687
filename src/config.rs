use std::time::Duration;

const DEFAULT_API_URL: &str = "http://localhost:3001/api";
const DEFAULT_RECONNECT_DELAY_MS: u64 = 5_000;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 15_000;
const DEFAULT_PAGE_SIZE: u32 = 20;

/// Client settings. Read from `BOOKDESK_*` environment variables or built directly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// REST base URL without trailing slash.
    pub api_url: String,
    /// Realtime endpoint; query parameters are appended per connection.
    pub ws_url: String,
    pub reconnect_delay: Duration,
    pub request_timeout: Duration,
    pub page_size: u32,
    pub metrics_port: Option<u16>,
}

impl Config {
    pub fn new(api_url: impl Into<String>) -> Self {
        let api_url = api_url.into().trim_end_matches('/').to_string();
        let ws_url = derive_ws_url(&api_url);
        Self {
            api_url,
            ws_url,
            reconnect_delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            page_size: DEFAULT_PAGE_SIZE,
            metrics_port: None,
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env` but with an injectable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let api_url = lookup("BOOKDESK_API_URL").unwrap_or_else(|| DEFAULT_API_URL.into());
        let mut config = Self::new(api_url);
        if let Some(ws) = lookup("BOOKDESK_WS_URL") {
            config.ws_url = ws;
        }
        let reconnect_ms: u64 = lookup("BOOKDESK_RECONNECT_DELAY_MS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_RECONNECT_DELAY_MS);
        config.reconnect_delay = Duration::from_millis(reconnect_ms);
        let timeout_ms: u64 = lookup("BOOKDESK_REQUEST_TIMEOUT_MS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS);
        config.request_timeout = Duration::from_millis(timeout_ms);
        config.page_size = lookup("BOOKDESK_PAGE_SIZE")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_PAGE_SIZE);
        config.metrics_port = lookup("BOOKDESK_METRICS_PORT").and_then(|s| s.parse().ok());
        config
    }
}

/// `http://host/api` → `ws://host/ws`, `https://…` → `wss://…`.
fn derive_ws_url(api_url: &str) -> String {
    let (scheme, rest) = match api_url.split_once("://") {
        Some(("https", rest)) => ("wss", rest),
        Some((_, rest)) => ("ws", rest),
        None => ("ws", api_url),
    };
    let host = rest.split('/').next().unwrap_or(rest);
    format!("{scheme}://{host}/ws")
}
