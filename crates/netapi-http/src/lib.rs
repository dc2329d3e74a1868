//! Blocking HTTP transport for netapi.
//!
//! Implements [`netapi::Transport`] over a [`reqwest::blocking::Client`].
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Connection pooling, timeouts, proxying and TLS live
//! here; the [`netapi`] crate sees only the [`netapi::Transport`] trait.
//!
//! ## Request conventions
//!
//! - `Accept: application/json` on every request;
//! - `Content-Type: application/json` whenever a body is sent;
//! - `X-Auth-Token: <token>` whenever the client holds a session token;
//! - any non-2xx status becomes [`TransportError::Status`] carrying the body.

use netapi::{ClientConfig, Method, ProxySettings, Request, Transport, TransportError};
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Proxy, Url};
use tracing::{debug, warn};

/// Header carrying the session token.
pub const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

const JSON_MEDIA_TYPE: &str = "application/json";

/// [`Transport`] backed by a pooled blocking HTTP client.
///
/// Cheap to share: one instance serves any number of concurrent dispatches.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Builds a transport honouring the timeouts and proxy in `config`.
    pub fn from_config(config: &ClientConfig) -> Result<Self, TransportError> {
        let mut builder = Client::builder().timeout(config.socket_timeout());
        if let Some(timeout) = config.connect_timeout() {
            builder = builder.connect_timeout(timeout);
        }
        if let Some(proxy) = config.proxy() {
            builder = builder.proxy(build_proxy(proxy)?);
        }

        let client = builder.build().map_err(|err| TransportError::Request {
            message: err.to_string(),
        })?;
        Ok(Self { client })
    }

    /// Wraps an existing client, e.g. one with custom TLS roots.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

impl Transport for HttpTransport {
    fn execute(&self, request: &Request<'_>, config: &ClientConfig) -> Result<String, TransportError> {
        let raw_url = format!("{}{}", config.base_url(), request.path);
        let url = Url::parse(&raw_url).map_err(|err| TransportError::InvalidUrl {
            url: raw_url.clone(),
            message: err.to_string(),
        })?;

        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
        };
        let mut builder = self
            .client
            .request(method, url)
            .header(ACCEPT, JSON_MEDIA_TYPE);
        if let Some(body) = request.body {
            builder = builder
                .header(CONTENT_TYPE, JSON_MEDIA_TYPE)
                .body(body.to_string());
        }
        let token = config.token();
        if let Some(token) = &token {
            builder = builder.header(AUTH_TOKEN_HEADER, token.as_str());
        }

        debug!(
            method = %request.method,
            url = %raw_url,
            authenticated = token.is_some(),
            "sending HTTP request"
        );

        let response = builder
            .send()
            .map_err(|err| classify_error(&raw_url, &err))?;
        let status = response.status();
        let text = response
            .text()
            .map_err(|err| classify_error(&raw_url, &err))?;

        if !status.is_success() {
            warn!(url = %raw_url, status = status.as_u16(), "backend returned an error status");
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        debug!(url = %raw_url, status = status.as_u16(), bytes = text.len(), "HTTP response received");
        Ok(text)
    }
}

fn build_proxy(settings: &ProxySettings) -> Result<Proxy, TransportError> {
    let url = format!("http://{}:{}", settings.hostname, settings.port);
    let proxy = Proxy::all(&url).map_err(|err| TransportError::InvalidUrl {
        url: url.clone(),
        message: err.to_string(),
    })?;
    Ok(match (&settings.username, &settings.password) {
        (Some(username), Some(password)) => proxy.basic_auth(username, password),
        (Some(username), None) => proxy.basic_auth(username, ""),
        _ => proxy,
    })
}

fn classify_error(url: &str, err: &reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout {
            url: url.to_string(),
        }
    } else if err.is_connect() {
        TransportError::Connection {
            url: url.to_string(),
            message: err.to_string(),
        }
    } else {
        TransportError::Request {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use netapi::ClientSettings;

    use super::*;

    #[test]
    fn builds_with_proxy_and_timeouts() {
        let config = ClientConfig::new(ClientSettings {
            connect_timeout_ms: Some(250),
            socket_timeout_ms: Some(1000),
            proxy: Some(ProxySettings {
                hostname: "proxy.internal".to_string(),
                port: 3128,
                username: Some("user".to_string()),
                password: Some("pass".to_string()),
            }),
            ..ClientSettings::new("http://salt.test:8000")
        });
        assert!(HttpTransport::from_config(&config).is_ok());
    }

    #[test]
    fn invalid_base_url_is_reported_without_sending() {
        let config = ClientConfig::from_url("not a url");
        let transport = HttpTransport::from_config(&config).unwrap();
        let err = transport
            .execute(&Request::get("/stats"), &config)
            .unwrap_err();
        assert!(matches!(err, TransportError::InvalidUrl { .. }));
    }

    #[test]
    fn unreachable_backend_is_a_connection_error() {
        // Port 9 (discard) on localhost is closed on any sane test host.
        let config = ClientConfig::new(ClientSettings {
            connect_timeout_ms: Some(500),
            ..ClientSettings::new("http://127.0.0.1:9")
        });
        let transport = HttpTransport::from_config(&config).unwrap();
        let err = transport
            .execute(&Request::get("/stats"), &config)
            .unwrap_err();
        assert!(matches!(
            err,
            TransportError::Connection { .. } | TransportError::Timeout { .. }
        ));
    }
}
