//! Authentication: eauth modules, per-call credentials and session tokens.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// External authentication back-end configured on the master.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthModule {
    /// Let the master pick the back-end.
    Auto,
    /// Pluggable authentication modules.
    Pam,
    /// LDAP directory.
    Ldap,
    /// Django user database.
    Django,
    /// Flat file.
    File,
    /// Kerberos.
    Kerberos,
    /// Yubico one-time passwords.
    Yubico,
    /// MySQL user table.
    Mysql,
    /// Shared secret from the master configuration.
    Sharedsecret,
    /// Delegated REST endpoint.
    Rest,
}

impl AuthModule {
    /// Wire name sent as `eauth`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Pam => "pam",
            Self::Ldap => "ldap",
            Self::Django => "django",
            Self::File => "file",
            Self::Kerberos => "kerberos",
            Self::Yubico => "yubico",
            Self::Mysql => "mysql",
            Self::Sharedsecret => "sharedsecret",
            Self::Rest => "rest",
        }
    }
}

impl fmt::Display for AuthModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Username, password and eauth module sent inline with a single call.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// User name.
    pub username: String,
    /// Password (never printed by `Debug`).
    pub password: String,
    /// Authentication back-end.
    pub module: AuthModule,
}

impl Credentials {
    /// Creates a credential triple.
    pub fn new(username: impl Into<String>, password: impl Into<String>, module: AuthModule) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            module,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("module", &self.module)
            .finish()
    }
}

/// How a single dispatch authenticates.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AuthContext {
    /// Use the session token held by the client configuration.
    #[default]
    Token,
    /// Send credentials with the call; no session is created.
    Inline(Credentials),
}

impl AuthContext {
    /// Shorthand for [`AuthContext::Inline`].
    pub fn inline(username: impl Into<String>, password: impl Into<String>, module: AuthModule) -> Self {
        Self::Inline(Credentials::new(username, password, module))
    }
}

/// Session token returned by `POST /login`.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    /// The token value, sent as `X-Auth-Token`.
    pub token: String,
    /// Issue time, seconds since the Unix epoch.
    #[serde(default)]
    pub start: f64,
    /// Expiry time, seconds since the Unix epoch.
    #[serde(default)]
    pub expire: f64,
    /// Authenticated user.
    #[serde(default)]
    pub user: String,
    /// Back-end that authenticated the user.
    #[serde(default)]
    pub eauth: String,
    /// Permissions granted to the token (strings or nested matcher objects).
    #[serde(default)]
    pub perms: Vec<Value>,
}

impl Token {
    /// Issue time as a UTC timestamp.
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        epoch_to_utc(self.start)
    }

    /// Expiry time as a UTC timestamp.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        epoch_to_utc(self.expire)
    }

    /// Returns `true` if the token has expired at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|expiry| expiry <= now)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Token")
            .field("token", &"<redacted>")
            .field("start", &self.start)
            .field("expire", &self.expire)
            .field("user", &self.user)
            .field("eauth", &self.eauth)
            .field("perms", &self.perms)
            .finish()
    }
}

fn epoch_to_utc(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() {
        return None;
    }
    // Floor, so the fractional part is never negative.
    let whole = seconds.floor();
    let nanos = ((seconds - whole) * 1e9).round() as u32;
    DateTime::from_timestamp(whole as i64, nanos.min(999_999_999))
}
