use std::{net::SocketAddr, num::NonZeroUsize, time::Duration};

use serde::{Deserialize, Serialize};

// Default iouring/epoll entries: 32k
const DEFAULT_ENTRIES: u32 = 32768;
const FALLBACK_PARALLELISM: NonZeroUsize = match NonZeroUsize::new(1) {
    Some(n) => n,
    None => unreachable!(),
};

/// Keep-alive timeout applied when the configured value is negative/unset.
pub const DEFAULT_KEEPALIVE_SECS: i64 = 10;
pub const DEFAULT_SESSION_COOKIE: &str = "sid";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub runtime: RuntimeConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_workers")]
    pub worker_threads: usize,
    #[serde(default = "default_entries")]
    pub entries: u32,
    #[serde(default)]
    pub runtime_type: RuntimeType,
    #[serde(default = "default_cpu_affinity")]
    pub cpu_affinity: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            worker_threads: default_workers(),
            entries: default_entries(),
            runtime_type: Default::default(),
            cpu_affinity: default_cpu_affinity(),
        }
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .unwrap_or(FALLBACK_PARALLELISM)
        .into()
}

const fn default_entries() -> u32 {
    DEFAULT_ENTRIES
}

const fn default_cpu_affinity() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeType {
    #[cfg(target_os = "linux")]
    IoUring,
    Legacy,
}

impl Default for RuntimeType {
    #[cfg(target_os = "linux")]
    fn default() -> Self {
        Self::IoUring
    }
    #[cfg(not(target_os = "linux"))]
    fn default() -> Self {
        Self::Legacy
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub name: String,
    pub listen: SocketAddr,
    /// Keep-alive timeout in seconds. 0 disables keep-alive entirely;
    /// a negative value is normalized to [`DEFAULT_KEEPALIVE_SECS`].
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_timeout_secs: i64,
    /// Keep-alive is shed once this many workers are live. 0 means no bound.
    #[serde(default)]
    pub max_workers: usize,
    /// Paths accepted for websocket upgrades.
    #[serde(default)]
    pub ws_endpoints: Vec<String>,
    #[serde(default = "default_session_cookie")]
    pub session_cookie: String,
}

impl ServerConfig {
    /// Normalized keep-alive policy; computed once at startup and cached
    /// for the life of the process.
    pub fn keepalive(&self) -> KeepAlive {
        KeepAlive::from_secs(self.keepalive_timeout_secs)
    }
}

const fn default_keepalive_secs() -> i64 {
    DEFAULT_KEEPALIVE_SECS
}

fn default_session_cookie() -> String {
    DEFAULT_SESSION_COOKIE.to_string()
}

/// Process-wide keep-alive policy.
///
/// `None` means keep-alive is disabled: the worker closes the connection
/// after a single batch, and the first batch read waits without limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepAlive(Option<Duration>);

impl KeepAlive {
    pub fn from_secs(secs: i64) -> Self {
        let secs = if secs < 0 { DEFAULT_KEEPALIVE_SECS } else { secs };
        match secs {
            0 => Self(None),
            n => Self(Some(Duration::from_secs(n as u64))),
        }
    }

    pub const fn disabled() -> Self {
        Self(None)
    }

    pub const fn from_duration(limit: Duration) -> Self {
        Self(Some(limit))
    }

    pub const fn enabled(&self) -> bool {
        self.0.is_some()
    }

    /// Idle limit, or `None` when keep-alive is disabled.
    pub const fn limit(&self) -> Option<Duration> {
        self.0
    }
}

impl Default for KeepAlive {
    fn default() -> Self {
        Self::from_secs(DEFAULT_KEEPALIVE_SECS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_keepalive_is_normalized_to_default() {
        let ka = KeepAlive::from_secs(-1);
        assert!(ka.enabled());
        assert_eq!(ka.limit(), Some(Duration::from_secs(10)));
    }

    #[test]
    fn zero_keepalive_means_disabled_not_infinite() {
        let ka = KeepAlive::from_secs(0);
        assert!(!ka.enabled());
        assert_eq!(ka.limit(), None);
    }

    #[test]
    fn positive_keepalive_is_kept() {
        let ka = KeepAlive::from_secs(75);
        assert_eq!(ka.limit(), Some(Duration::from_secs(75)));
    }

    #[test]
    fn server_config_defaults() {
        let cfg: ServerConfig = serde_json::from_str(
            r#"{"name": "test", "listen": "0.0.0.0:8080"}"#,
        )
        .unwrap();
        assert_eq!(cfg.keepalive_timeout_secs, DEFAULT_KEEPALIVE_SECS);
        assert_eq!(cfg.max_workers, 0);
        assert_eq!(cfg.session_cookie, "sid");
        assert!(cfg.ws_endpoints.is_empty());
    }
}
