//! The dispatcher.
//!
//! [`SaltClient`] ties the pieces together for every call:
//!
//! 1. [`resolve`] the dispatch request into mode, endpoint and fields;
//! 2. serialize the request body;
//! 3. hand it to the [`Transport`];
//! 4. [`compose`] the expected response shape and run the [`Codec`];
//! 5. convert to the static Rust type and unwrap the envelope per mode.
//!
//! It also carries the session operations (`login`, `logout`, `stats`,
//! `send_event`). Everything is blocking: one request, one fully received
//! response.

use std::collections::HashMap;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::{
    compose, resolve, AsyncJobHandle, AuthContext, AuthError, AuthModule, Batch, CallDescriptor,
    ClientConfig, Codec, DecodeError, Decoded, DispatchRequest, Entrypoint, Envelope,
    ExecutionMode, Json, JsonCodec, NetApiError, NodeId, NodeResult, Request, ReturnType,
    SshConfig, SshResult, SshTarget, Stats, Target, Token, Transport, TransportError,
};

/// Per-node results of one run, keyed by node id.
pub type NodeMap<R> = HashMap<NodeId, NodeResult<R>>;

/// Characters escaped in event tag segments; RFC 3986 unreserved ones pass.
const TAG_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Message the backend returns on a successful logout.
const LOGOUT_CONFIRMATION: &str = "Your token has been cleared";

/// Result of [`SaltClient::dispatch`], one variant per execution mode.
#[derive(Debug, Clone, PartialEq)]
pub enum Dispatched<R> {
    /// Results of a synchronous run.
    Local(NodeMap<R>),
    /// Results of a batched run, one map per wave in received order.
    Batch(Vec<NodeMap<R>>),
    /// Handle of a scheduled job.
    Async(AsyncJobHandle<R>),
    /// Results of a salt-ssh run.
    Ssh(NodeMap<SshResult<R>>),
}

impl<R> Dispatched<R> {
    /// Execution mode the result was produced under.
    pub fn mode(&self) -> ExecutionMode {
        match self {
            Self::Local(_) => ExecutionMode::Local,
            Self::Batch(_) => ExecutionMode::LocalBatch,
            Self::Async(_) => ExecutionMode::LocalAsync,
            Self::Ssh(_) => ExecutionMode::Ssh,
        }
    }
}

/// Typed client for the Salt API.
pub struct SaltClient<T, C = JsonCodec> {
    config: ClientConfig,
    transport: T,
    codec: C,
}

impl<T: Transport> SaltClient<T> {
    /// Creates a client using the JSON codec.
    pub fn new(config: ClientConfig, transport: T) -> Self {
        Self::with_codec(config, transport, JsonCodec)
    }
}

impl<T: Transport, C: Codec> SaltClient<T, C> {
    /// Creates a client with a custom codec.
    pub fn with_codec(config: ClientConfig, transport: T, codec: C) -> Self {
        Self {
            config,
            transport,
            codec,
        }
    }

    /// The configuration (including the session token slot).
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    // -----------------------------------------------------------------------
    // Call dispatch
    // -----------------------------------------------------------------------

    /// Dispatches `call` under the mode derived from `request`.
    ///
    /// Use this when the mode is only known at run time; the typed
    /// `call_*` methods are shorthands for the common cases.
    pub fn dispatch<R: ReturnType>(
        &self,
        call: &CallDescriptor<R>,
        request: &DispatchRequest<'_>,
    ) -> Result<Dispatched<R>, NetApiError> {
        let (mode, decoded) = self.exchange(call, request)?;
        let dispatched = match mode {
            ExecutionMode::Local => Dispatched::Local(single(decoded)?),
            ExecutionMode::LocalBatch => Dispatched::Batch(waves(decoded)?),
            ExecutionMode::LocalAsync => Dispatched::Async(single(decoded)?),
            ExecutionMode::Ssh => Dispatched::Ssh(single(decoded)?),
        };
        Ok(dispatched)
    }

    /// Runs `call` on `target` and waits for the results.
    pub fn call_sync<R: ReturnType>(
        &self,
        call: &CallDescriptor<R>,
        target: &Target,
        auth: &AuthContext,
    ) -> Result<NodeMap<R>, NetApiError> {
        let request = DispatchRequest {
            target,
            batch: None,
            auth,
            entrypoint: Entrypoint::Sync,
        };
        let (_, decoded) = self.exchange(call, &request)?;
        Ok(single(decoded)?)
    }

    /// Runs `call` on `target` in waves and waits for the results.
    ///
    /// Returns one map per wave, in the order the backend reported them.
    pub fn call_batch<R: ReturnType>(
        &self,
        call: &CallDescriptor<R>,
        target: &Target,
        batch: Batch,
        auth: &AuthContext,
    ) -> Result<Vec<NodeMap<R>>, NetApiError> {
        let request = DispatchRequest {
            target,
            batch: Some(batch),
            auth,
            entrypoint: Entrypoint::Sync,
        };
        let (_, decoded) = self.exchange(call, &request)?;
        Ok(waves(decoded)?)
    }

    /// Schedules `call` on `target` and returns the job handle.
    ///
    /// The client still blocks for one round trip; only the backend job runs
    /// asynchronously.
    pub fn call_async<R: ReturnType>(
        &self,
        call: &CallDescriptor<R>,
        target: &Target,
        auth: &AuthContext,
    ) -> Result<AsyncJobHandle<R>, NetApiError> {
        let request = DispatchRequest {
            target,
            batch: None,
            auth,
            entrypoint: Entrypoint::Async,
        };
        let (_, decoded) = self.exchange(call, &request)?;
        Ok(single(decoded)?)
    }

    /// Runs `call` over salt-ssh and waits for the results.
    ///
    /// The [`SshResult`] layer is left intact so callers can inspect the
    /// remote exit status and output streams.
    pub fn call_ssh<R: ReturnType>(
        &self,
        call: &CallDescriptor<R>,
        target: &SshTarget,
        ssh: &SshConfig,
        auth: &AuthContext,
    ) -> Result<NodeMap<SshResult<R>>, NetApiError> {
        let target = Target::Ssh(target.clone());
        let request = DispatchRequest {
            target: &target,
            batch: None,
            auth,
            entrypoint: Entrypoint::Ssh(ssh),
        };
        let (_, decoded) = self.exchange(call, &request)?;
        Ok(single(decoded)?)
    }

    /// Resolves, sends and decodes one call; returns the mode it ran under.
    fn exchange<R: ReturnType>(
        &self,
        call: &CallDescriptor<R>,
        request: &DispatchRequest<'_>,
    ) -> Result<(ExecutionMode, Decoded), NetApiError> {
        let resolution = resolve(call, request)?;
        let body = resolution.request_body(call.payload()).to_string();
        let descriptor = compose(resolution.mode, call.return_type());

        let raw = self.send(&Request::post(resolution.endpoint.path(), &body))?;
        let decoded = self.codec.decode(&raw, &descriptor).inspect_err(|err| {
            debug!(function = call.function(), expected = %descriptor, error = %err, "response shape mismatch");
        })?;
        Ok((resolution.mode, decoded))
    }

    fn send(&self, request: &Request<'_>) -> Result<String, TransportError> {
        debug!(
            method = %request.method,
            path = request.path,
            body_len = request.body.map_or(0, str::len),
            "sending request"
        );
        match self.transport.execute(request, &self.config) {
            Ok(raw) => {
                debug!(path = request.path, response_len = raw.len(), "received response");
                Ok(raw)
            }
            Err(err) => {
                warn!(path = request.path, error = %err, "request failed");
                Err(err)
            }
        }
    }

    fn decode_as<O: ReturnType>(&self, raw: &str) -> Result<O, DecodeError> {
        O::from_decoded(self.codec.decode(raw, &O::descriptor())?)
    }

    // -----------------------------------------------------------------------
    // Session operations
    // -----------------------------------------------------------------------

    /// Logs in and stores the returned session token.
    ///
    /// `POST /login`
    pub fn login(
        &self,
        username: &str,
        password: &str,
        module: AuthModule,
    ) -> Result<Token, NetApiError> {
        let body = json!({
            "username": username,
            "password": password,
            "eauth": module.as_str(),
        })
        .to_string();

        let raw = match self.send(&Request::post("/login", &body)) {
            Ok(raw) => raw,
            Err(TransportError::Status {
                status: status @ (401 | 403),
                ..
            }) => {
                info!(user = username, eauth = %module, status, "login rejected");
                return Err(AuthError::Rejected {
                    username: username.to_string(),
                    status,
                }
                .into());
            }
            Err(err) => return Err(err.into()),
        };

        // The backend answers with a list of tokens; the first one is live.
        let tokens = self.decode_as::<Envelope<Vec<Json<Token>>>>(&raw)?.into_result();
        let token = tokens
            .into_iter()
            .next()
            .ok_or(AuthError::NoToken)?
            .into_inner();

        self.config.set_token(token.token.clone());
        info!(user = %token.user, eauth = %token.eauth, "logged in");
        Ok(token)
    }

    /// Logs out and clears the session token.
    ///
    /// Returns `false` without any request when no token is held, and `false`
    /// when the backend does not confirm the logout.
    ///
    /// `POST /logout`
    pub fn logout(&self) -> Result<bool, NetApiError> {
        if !self.config.has_token() {
            debug!("logout requested without a session token");
            return Ok(false);
        }

        let raw = self.send(&Request::post("/logout", ""))?;
        let message = self.decode_as::<Envelope<String>>(&raw)?.into_result();
        if message == LOGOUT_CONFIRMATION {
            self.config.clear_token();
            info!("logged out");
            Ok(true)
        } else {
            warn!(message = %message, "logout not confirmed by backend");
            Ok(false)
        }
    }

    /// Queries server statistics.
    ///
    /// `GET /stats`
    pub fn stats(&self) -> Result<Stats, NetApiError> {
        let raw = self.send(&Request::get("/stats"))?;
        Ok(self.decode_as::<Json<Stats>>(&raw)?.into_inner())
    }

    /// Fires an event on the backend's event bus.
    ///
    /// `data` is sent verbatim and must be valid JSON. Returns the backend's
    /// `success` flag; `false` means the backend declined, not that the
    /// request failed. Each `/`-separated segment of `tag` is percent-encoded.
    ///
    /// `POST /hook/{tag}`
    pub fn send_event(&self, tag: &str, data: &str) -> Result<bool, NetApiError> {
        let path = format!("/hook/{}", encode_tag(tag));
        let raw = self.send(&Request::post(&path, data))?;
        let response = self.decode_as::<HashMap<String, Value>>(&raw)?;
        let success = matches!(response.get("success"), Some(Value::Bool(true)));
        if !success {
            warn!(tag, "event not accepted by backend");
        }
        Ok(success)
    }
}

fn encode_tag(tag: &str) -> String {
    tag.trim_start_matches('/')
        .split('/')
        .map(|segment| utf8_percent_encode(segment, TAG_SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

/// Unwraps a singleton `return` list.
fn single<T: ReturnType>(decoded: Decoded) -> Result<T, DecodeError> {
    let mut items = waves::<T>(decoded)?;
    if items.len() != 1 {
        return Err(DecodeError::UnexpectedLength {
            path: "return".to_string(),
            expected: 1,
            found: items.len(),
        });
    }
    Ok(items.remove(0))
}

/// Unwraps the full `return` list, preserving order.
fn waves<T: ReturnType>(decoded: Decoded) -> Result<Vec<T>, DecodeError> {
    Ok(Envelope::<Vec<T>>::from_decoded(decoded)?.into_result())
}

impl<T, C> std::fmt::Debug for SaltClient<T, C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaltClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
