//! Typed dispatch layer for the Salt HTTP API.
//!
//! A caller describes a remote call once, as a [`CallDescriptor<R>`] carrying
//! the function name, arguments and the Rust type `R` each node returns. The
//! [`SaltClient`] then runs it in one of four execution modes and hands back
//! results whose shape is derived from `R` and the mode:
//!
//! | Entrypoint | Result |
//! |------------|--------|
//! | [`SaltClient::call_sync`] | `HashMap<NodeId, NodeResult<R>>` |
//! | [`SaltClient::call_batch`] | `Vec<HashMap<NodeId, NodeResult<R>>>`, one per wave |
//! | [`SaltClient::call_async`] | [`AsyncJobHandle<R>`] |
//! | [`SaltClient::call_ssh`] | `HashMap<NodeId, NodeResult<SshResult<R>>>` |
//!
//! A node that fails (unknown function, unsupported module, undecodable
//! output) yields a [`NodeError`] in its own slot; the other nodes' results
//! are unaffected.
//!
//! ## Architectural Layer
//!
//! **Domain + port definitions.** This crate performs no I/O. HTTP lives
//! behind the [`Transport`] trait; the `netapi-http` crate supplies the
//! production implementation.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | `NodeId`, `JobId` |
//! | [`errors`] | Call-level error taxonomy |
//! | [`types`] | Runtime type descriptors and per-mode composition |
//! | [`codec`] | Descriptor-driven JSON decoding |
//! | [`results`] | Envelope, per-node results, SSH results, job handles, stats |
//! | [`returns`] | The `ReturnType` trait and its implementations |
//! | [`call`] | `CallDescriptor` |
//! | [`target`] | Target expressions and batch sizes |
//! | [`auth`] | Authentication modules, credentials, tokens |
//! | [`ssh`] | salt-ssh settings |
//! | [`mode`] | Execution-mode resolution |
//! | [`config`] | Client settings and the session token slot |
//! | [`transport`] | The `Transport` port |
//! | [`client`] | `SaltClient` |
//! | [`modules`] | Ready-made descriptors for common functions |

pub mod auth;
pub mod call;
pub mod client;
pub mod codec;
pub mod config;
pub mod errors;
pub mod identifiers;
pub mod mode;
pub mod modules;
pub mod results;
pub mod returns;
pub mod ssh;
pub mod target;
pub mod transport;
pub mod types;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use auth::{AuthContext, AuthModule, Credentials, Token};
pub use call::CallDescriptor;
pub use client::{Dispatched, NodeMap, SaltClient};
pub use codec::{decode_value, Codec, Decoded, JsonCodec};
pub use config::{ClientConfig, ClientSettings, ProxySettings};
pub use errors::{AuthError, DecodeError, NetApiError, TransportError, ValidationError};
pub use identifiers::{JobId, NodeId};
pub use mode::{resolve, DispatchRequest, Endpoint, Entrypoint, ExecutionMode, Resolution};
pub use results::{AsyncJobHandle, Envelope, NodeError, NodeResult, SshResult, Stats};
pub use returns::{Json, MapKey, ReturnType};
pub use ssh::SshConfig;
pub use target::{Batch, KeyMatch, SshTarget, Target};
pub use transport::{Method, Request, Transport};
pub use types::{compose, PrimitiveKind, Schema, TypeDescriptor, WrapperKind};
