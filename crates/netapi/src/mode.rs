//! Execution-mode resolution.
//!
//! The execution mode is never chosen directly. [`resolve`] derives it, with
//! the endpoint and the extra request fields, from the authentication style,
//! the presence of a [`Batch`] and the entrypoint the caller used:
//!
//! 1. Inline credentials → endpoint `/run` plus `username`/`password`/`eauth`;
//!    token auth → endpoint `/`.
//! 2. A batch → [`ExecutionMode::LocalBatch`] plus `batch`, whatever the
//!    entrypoint.
//! 3. Else the async entrypoint → [`ExecutionMode::LocalAsync`].
//! 4. Else the SSH entrypoint → [`ExecutionMode::Ssh`], endpoint `/run`, plus
//!    the [`SshConfig`] pass-through fields.
//! 5. Otherwise → [`ExecutionMode::Local`].
//!
//! Validation happens first; a rejected request builds no payload.

use std::fmt;

use serde_json::{Map, Value};
use tracing::debug;

use crate::{AuthContext, Batch, CallDescriptor, SshConfig, Target, ValidationError};

// ---------------------------------------------------------------------------
// Modes and endpoints
// ---------------------------------------------------------------------------

/// Backend execution strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionMode {
    /// Run and wait for all results.
    Local,
    /// Schedule a job and return its handle immediately.
    LocalAsync,
    /// Run in waves and wait for all results.
    LocalBatch,
    /// Run over salt-ssh and wait for all results.
    Ssh,
}

impl ExecutionMode {
    /// Client id sent as `client`.
    pub fn client_id(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::LocalAsync => "local_async",
            Self::LocalBatch => "local_batch",
            Self::Ssh => "ssh",
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.client_id())
    }
}

/// The dispatch method the caller invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entrypoint<'a> {
    /// Wait for results.
    Sync,
    /// Schedule and return a job handle.
    Async,
    /// Run over salt-ssh with the given settings.
    Ssh(&'a SshConfig),
}

/// Request endpoint for call dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// `POST /`, authenticated by session token.
    Root,
    /// `POST /run`, credentials inline (and always for salt-ssh).
    Run,
}

impl Endpoint {
    /// Request path.
    pub fn path(self) -> &'static str {
        match self {
            Self::Root => "/",
            Self::Run => "/run",
        }
    }
}

// ---------------------------------------------------------------------------
// Resolution
// ---------------------------------------------------------------------------

/// Everything the dispatcher needs besides the call itself.
#[derive(Debug, Clone, Copy)]
pub struct DispatchRequest<'a> {
    /// Nodes to run on.
    pub target: &'a Target,
    /// Optional wave fan-out.
    pub batch: Option<Batch>,
    /// Authentication for this call.
    pub auth: &'a AuthContext,
    /// Entrypoint the caller used.
    pub entrypoint: Entrypoint<'a>,
}

/// Outcome of [`resolve`].
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    /// Derived execution mode.
    pub mode: ExecutionMode,
    /// Request endpoint.
    pub endpoint: Endpoint,
    /// Fields added to the call payload (`tgt`, `expr_form`, auth, batch, ssh).
    pub fields: Map<String, Value>,
}

impl Resolution {
    /// Builds the request body: a one-element array holding the call payload,
    /// the `client` id and the resolved fields.
    pub fn request_body(&self, payload: Map<String, Value>) -> Value {
        let mut object = payload;
        object.insert(
            "client".to_string(),
            Value::String(self.mode.client_id().to_string()),
        );
        object.extend(self.fields.clone());
        Value::Array(vec![Value::Object(object)])
    }
}

/// Derives mode, endpoint and extra fields for dispatching `call`.
pub fn resolve<R>(
    call: &CallDescriptor<R>,
    request: &DispatchRequest<'_>,
) -> Result<Resolution, ValidationError> {
    if call.function().is_empty() {
        return Err(ValidationError::EmptyFunctionName);
    }
    request.target.validate()?;
    if let Some(batch) = request.batch {
        batch.validate()?;
    }
    match (request.entrypoint, request.target.is_ssh()) {
        (Entrypoint::Ssh(_), false) => {
            return Err(ValidationError::SshTargetRequired {
                expr_form: request.target.expr_form(),
            });
        }
        (Entrypoint::Sync | Entrypoint::Async, true) => {
            return Err(ValidationError::SshTargetNotAllowed);
        }
        _ => {}
    }

    let mut fields = Map::new();
    request.target.write_fields(&mut fields);

    let mut endpoint = match request.auth {
        AuthContext::Inline(creds) => {
            fields.insert("username".to_string(), Value::String(creds.username.clone()));
            fields.insert("password".to_string(), Value::String(creds.password.clone()));
            fields.insert(
                "eauth".to_string(),
                Value::String(creds.module.as_str().to_string()),
            );
            Endpoint::Run
        }
        AuthContext::Token => Endpoint::Root,
    };

    let mode = if let Some(batch) = request.batch {
        fields.insert("batch".to_string(), Value::String(batch.to_string()));
        ExecutionMode::LocalBatch
    } else {
        match request.entrypoint {
            Entrypoint::Async => ExecutionMode::LocalAsync,
            Entrypoint::Ssh(config) => {
                fields.extend(config.fields());
                endpoint = Endpoint::Run;
                ExecutionMode::Ssh
            }
            Entrypoint::Sync => ExecutionMode::Local,
        }
    };

    debug!(
        function = call.function(),
        mode = mode.client_id(),
        endpoint = endpoint.path(),
        tgt = %request.target,
        "resolved dispatch"
    );

    Ok(Resolution {
        mode,
        endpoint,
        fields,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{AuthModule, SshTarget};

    fn ping() -> CallDescriptor<bool> {
        CallDescriptor::new("test.ping")
    }

    fn target_for(entrypoint: &Entrypoint<'_>) -> Target {
        match entrypoint {
            Entrypoint::Ssh(_) => Target::Ssh(SshTarget::Glob("*".to_string())),
            _ => Target::glob("*"),
        }
    }

    #[test]
    fn mode_table_holds_for_every_combination() {
        let ssh = SshConfig {
            user: Some("root".to_string()),
            ..SshConfig::default()
        };
        let auths = [
            AuthContext::Token,
            AuthContext::inline("user", "pass", AuthModule::Auto),
        ];
        let batches = [None, Some(Batch::Percent(50))];
        let entrypoints = [Entrypoint::Sync, Entrypoint::Async, Entrypoint::Ssh(&ssh)];

        for auth in &auths {
            for batch in batches {
                for entrypoint in entrypoints {
                    let target = target_for(&entrypoint);
                    let request = DispatchRequest {
                        target: &target,
                        batch,
                        auth,
                        entrypoint,
                    };
                    let resolution = resolve(&ping(), &request).unwrap();
                    let inline = matches!(auth, AuthContext::Inline(_));
                    let ssh_mode = batch.is_none() && matches!(entrypoint, Entrypoint::Ssh(_));

                    let expected_mode = match (batch, entrypoint) {
                        (Some(_), _) => ExecutionMode::LocalBatch,
                        (None, Entrypoint::Async) => ExecutionMode::LocalAsync,
                        (None, Entrypoint::Ssh(_)) => ExecutionMode::Ssh,
                        (None, Entrypoint::Sync) => ExecutionMode::Local,
                    };
                    let expected_endpoint = if inline || ssh_mode {
                        Endpoint::Run
                    } else {
                        Endpoint::Root
                    };

                    let case = format!("auth={auth:?} batch={batch:?} entrypoint={entrypoint:?}");
                    assert_eq!(resolution.mode, expected_mode, "{case}");
                    assert_eq!(resolution.endpoint, expected_endpoint, "{case}");
                    assert_eq!(resolution.fields["tgt"], json!("*"), "{case}");
                    assert_eq!(resolution.fields["expr_form"], json!("glob"), "{case}");
                    assert_eq!(resolution.fields.contains_key("username"), inline, "{case}");
                    assert_eq!(resolution.fields.contains_key("password"), inline, "{case}");
                    assert_eq!(resolution.fields.contains_key("eauth"), inline, "{case}");
                    assert_eq!(
                        resolution.fields.get("batch"),
                        batch.map(|_| json!("50%")).as_ref(),
                        "{case}"
                    );
                    assert_eq!(resolution.fields.contains_key("ssh_user"), ssh_mode, "{case}");
                }
            }
        }
    }

    #[test]
    fn empty_function_name_is_rejected_first() {
        let target = Target::glob("");
        let request = DispatchRequest {
            target: &target,
            batch: None,
            auth: &AuthContext::Token,
            entrypoint: Entrypoint::Sync,
        };
        let call = CallDescriptor::<bool>::new("");
        assert_eq!(
            resolve(&call, &request).unwrap_err(),
            ValidationError::EmptyFunctionName
        );
    }

    #[test]
    fn empty_target_is_rejected() {
        let target = Target::glob("");
        let request = DispatchRequest {
            target: &target,
            batch: None,
            auth: &AuthContext::Token,
            entrypoint: Entrypoint::Sync,
        };
        assert_eq!(
            resolve(&ping(), &request).unwrap_err(),
            ValidationError::EmptyTarget
        );
    }

    #[test]
    fn out_of_range_batch_is_rejected() {
        let target = Target::glob("*");
        let request = DispatchRequest {
            target: &target,
            batch: Some(Batch::Percent(0)),
            auth: &AuthContext::Token,
            entrypoint: Entrypoint::Sync,
        };
        assert!(matches!(
            resolve(&ping(), &request).unwrap_err(),
            ValidationError::InvalidBatch { .. }
        ));
    }

    #[test]
    fn ssh_targets_and_entrypoint_must_agree() {
        let ssh_target = Target::Ssh(SshTarget::Glob("*".to_string()));
        let plain = Target::glob("*");
        let config = SshConfig::default();

        let request = DispatchRequest {
            target: &ssh_target,
            batch: None,
            auth: &AuthContext::Token,
            entrypoint: Entrypoint::Sync,
        };
        assert_eq!(
            resolve(&ping(), &request).unwrap_err(),
            ValidationError::SshTargetNotAllowed
        );

        let request = DispatchRequest {
            target: &plain,
            entrypoint: Entrypoint::Ssh(&config),
            ..request
        };
        assert_eq!(
            resolve(&ping(), &request).unwrap_err(),
            ValidationError::SshTargetRequired { expr_form: "glob" }
        );
    }

    #[test]
    fn request_body_wraps_a_single_object() {
        let target = Target::glob("*");
        let request = DispatchRequest {
            target: &target,
            batch: None,
            auth: &AuthContext::Token,
            entrypoint: Entrypoint::Sync,
        };
        let call = ping();
        let body = resolve(&call, &request).unwrap().request_body(call.payload());
        assert_eq!(
            body,
            json!([{"fun": "test.ping", "client": "local", "tgt": "*", "expr_form": "glob"}])
        );
    }
}
