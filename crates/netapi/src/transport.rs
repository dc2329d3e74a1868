//! The transport port.
//!
//! The dispatcher never performs I/O itself. It hands a [`Request`] and the
//! [`ClientConfig`] to a [`Transport`] and receives the raw response text.
//! Timeouts, proxying, TLS and connection pooling are entirely the
//! implementation's concern (see the `netapi-http` crate).

use std::fmt;

use crate::{ClientConfig, TransportError};

/// HTTP method of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// `GET`.
    Get,
    /// `POST`.
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Get => "GET",
            Self::Post => "POST",
        })
    }
}

/// One outbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Request<'a> {
    /// HTTP method.
    pub method: Method,
    /// Path relative to the base URL, starting with `/`.
    pub path: &'a str,
    /// JSON body; `None` sends no body.
    pub body: Option<&'a str>,
}

impl<'a> Request<'a> {
    /// A `POST` with `body`.
    pub fn post(path: &'a str, body: &'a str) -> Self {
        Self {
            method: Method::Post,
            path,
            body: Some(body),
        }
    }

    /// A `GET` without a body.
    pub fn get(path: &'a str) -> Self {
        Self {
            method: Method::Get,
            path,
            body: None,
        }
    }
}

/// Carries one request to the backend and returns the response text.
///
/// Implementations must:
/// - send the session token from `config` (if any) with the request;
/// - return [`TransportError::Status`] for any non-success HTTP status;
/// - return the full body text on success, unparsed.
pub trait Transport: Send + Sync {
    /// Executes `request` against `config`'s base URL.
    fn execute(&self, request: &Request<'_>, config: &ClientConfig) -> Result<String, TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn execute(&self, request: &Request<'_>, config: &ClientConfig) -> Result<String, TransportError> {
        (**self).execute(request, config)
    }
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn execute(&self, request: &Request<'_>, config: &ClientConfig) -> Result<String, TransportError> {
        (**self).execute(request, config)
    }
}
