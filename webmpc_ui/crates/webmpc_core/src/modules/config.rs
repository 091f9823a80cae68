use crate::error::ClientError;
use std::time::Duration;
use url::Url;

pub const WS_PATH: &str = "/ws";
pub const DEFAULT_ORIGIN: &str = "http://127.0.0.1:8080";
pub const DEFAULT_SUBPROTOCOL: &str = "soap";
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);
pub const DEFAULT_STATUS_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);
pub const DEFAULT_DETAIL_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoint: Url,
    pub subprotocol: String,
    /// Delay between a closed socket and the next connection attempt.
    pub reconnect_delay: Duration,
    /// Quiet period after a status reply before the next status request.
    pub status_interval: Duration,
    pub debounce: Duration,
    /// How long a track-detail request may go unanswered before the
    /// next status tick asks again.
    pub detail_timeout: Duration,
}

impl ClientConfig {
    pub fn new(endpoint: Url) -> Self {
        Self {
            endpoint,
            subprotocol: DEFAULT_SUBPROTOCOL.to_string(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            status_interval: DEFAULT_STATUS_INTERVAL,
            debounce: DEFAULT_DEBOUNCE,
            detail_timeout: DEFAULT_DETAIL_TIMEOUT,
        }
    }

    pub fn for_origin(origin: &str) -> Result<Self, ClientError> {
        Ok(Self::new(endpoint_for_origin(origin)?))
    }

    /// Reads `WEBMPC_URL` (a full ws/wss url) or `WEBMPC_ORIGIN` (a page
    /// origin), plus the optional `WEBMPC_*_MS` timing overrides.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self, ClientError> {
        let mut config = match var("WEBMPC_URL") {
            Some(url) => Self::new(parse_ws_url(url.trim())?),
            None => {
                let origin = var("WEBMPC_ORIGIN").unwrap_or_else(|| DEFAULT_ORIGIN.to_string());
                Self::for_origin(origin.trim())?
            }
        };

        let millis = |name: &'static str| var(name).map(|raw| parse_millis(name, &raw)).transpose();
        if let Some(d) = millis("WEBMPC_RECONNECT_MS")? {
            config.reconnect_delay = d;
        }
        if let Some(d) = millis("WEBMPC_STATUS_MS")? {
            config.status_interval = d;
        }
        if let Some(d) = millis("WEBMPC_DEBOUNCE_MS")? {
            config.debounce = d;
        }
        if let Some(d) = millis("WEBMPC_DETAIL_MS")? {
            config.detail_timeout = d;
        }
        Ok(config)
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_status_interval(mut self, interval: Duration) -> Self {
        self.status_interval = interval;
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_detail_timeout(mut self, timeout: Duration) -> Self {
        self.detail_timeout = timeout;
        self
    }
}

/// Derives the socket endpoint from the page origin: `https` pages talk
/// `wss`, everything served over `http` talks plain `ws`.
pub fn endpoint_for_origin(origin: &str) -> Result<Url, ClientError> {
    let page = Url::parse(origin).map_err(|e| ClientError::InvalidEndpoint(format!("{origin}: {e}")))?;
    let scheme = match page.scheme() {
        "https" => "wss",
        "http" => "ws",
        other => {
            return Err(ClientError::InvalidEndpoint(format!(
                "unsupported page scheme {other:?}"
            )))
        }
    };
    let host = page
        .host_str()
        .ok_or_else(|| ClientError::InvalidEndpoint(format!("{origin}: missing host")))?;

    let mut endpoint = format!("{scheme}://{host}");
    if let Some(port) = page.port() {
        endpoint.push_str(&format!(":{port}"));
    }
    endpoint.push_str(WS_PATH);
    parse_ws_url(&endpoint)
}

pub fn parse_ws_url(raw: &str) -> Result<Url, ClientError> {
    let url = Url::parse(raw).map_err(|e| ClientError::InvalidEndpoint(format!("{raw}: {e}")))?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(ClientError::InvalidEndpoint(format!(
            "{raw}: expected ws or wss, got {other:?}"
        ))),
    }
}

fn parse_millis(name: &'static str, raw: &str) -> Result<Duration, ClientError> {
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|e| ClientError::InvalidSetting {
            name,
            reason: format!("{raw:?}: {e}"),
        })
}
