//! Wire transports for the two JIRA protocols.
//!
//! This module provides the HTTP plumbing for the REST API and the legacy
//! JSON-RPC service. It knows nothing about issues; the bridges do.

mod auth;
mod client;
pub mod error;
mod rpc;

pub use auth::{get_password, store_password, Auth, KeyringError};
pub use client::{normalize_base_url, resolve_redirect, RestClient, RestTransport};
pub use error::ApiError;
pub use rpc::{JsonRpcClient, RpcTransport};
