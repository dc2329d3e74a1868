//! Client configuration and the shared session token.
//!
//! [`ClientSettings`] is the plain-data form (deserializable from any serde
//! format). [`ClientConfig`] is the runtime object threaded through every
//! dispatch; besides the settings it owns the session token slot.
//!
//! ## Session token
//!
//! The token is the only mutable state shared between concurrent dispatches.
//! It lives in an [`ArcSwapOption`]: `login` stores a new `Arc`, `logout`
//! stores `None`, and request assembly loads a snapshot. A reader sees either
//! the previous complete token or the new one, and never blocks.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use serde::{Deserialize, Serialize};

/// HTTP proxy used by the transport.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxySettings {
    /// Proxy host name.
    pub hostname: String,
    /// Proxy port.
    pub port: u16,
    /// Proxy user, if the proxy requires authentication.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Proxy password; only used together with `username`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl fmt::Debug for ProxySettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxySettings")
            .field("hostname", &self.hostname)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Plain-data client settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSettings {
    /// Base URL of the API (e.g. `https://salt.example.com:8000`).
    pub base_url: String,
    /// Connection establishment timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connect_timeout_ms: Option<u64>,
    /// Whole-request timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket_timeout_ms: Option<u64>,
    /// Optional HTTP proxy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<ProxySettings>,
}

impl ClientSettings {
    /// Settings with only a base URL.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            connect_timeout_ms: None,
            socket_timeout_ms: None,
            proxy: None,
        }
    }
}

/// Runtime configuration shared by every dispatch of one client.
pub struct ClientConfig {
    settings: ClientSettings,
    token: ArcSwapOption<String>,
}

impl ClientConfig {
    /// Creates a configuration with an empty token slot.
    pub fn new(settings: ClientSettings) -> Self {
        Self {
            settings,
            token: ArcSwapOption::empty(),
        }
    }

    /// Shorthand for a configuration with default settings.
    pub fn from_url(base_url: impl Into<String>) -> Self {
        Self::new(ClientSettings::new(base_url))
    }

    /// The plain settings.
    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.settings.base_url.trim_end_matches('/')
    }

    /// Connection establishment timeout.
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.settings.connect_timeout_ms.map(Duration::from_millis)
    }

    /// Whole-request timeout.
    pub fn socket_timeout(&self) -> Option<Duration> {
        self.settings.socket_timeout_ms.map(Duration::from_millis)
    }

    /// HTTP proxy, if configured.
    pub fn proxy(&self) -> Option<&ProxySettings> {
        self.settings.proxy.as_ref()
    }

    /// Snapshot of the current session token.
    pub fn token(&self) -> Option<Arc<String>> {
        self.token.load_full()
    }

    /// Returns `true` if a session token is held.
    pub fn has_token(&self) -> bool {
        self.token.load().is_some()
    }

    /// Atomically replaces the session token.
    pub fn set_token(&self, token: impl Into<String>) {
        self.token.store(Some(Arc::new(token.into())));
    }

    /// Atomically clears the session token, returning the previous one.
    pub fn clear_token(&self) -> Option<Arc<String>> {
        self.token.swap(None)
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("settings", &self.settings)
            .field("has_token", &self.has_token())
            .finish()
    }
}
