//! Omni-Glass plugin supervisor.
//!
//! Everything between "a directory with a manifest" and "a qualified
//! tool the classifier can offer":
//!
//! - [`manifest`]: `omni-glass.plugin.json` parsing and validation
//! - [`risk`]: permission risk assessment shown in the consent flow
//! - [`approval`]: persisted per-plugin approvals bound to a
//!   permissions hash
//! - [`rpc`]: JSON-RPC 2.0 envelopes, NDJSON-framed
//! - [`client`]: the stdio MCP connection (handshake, dispatch,
//!   timeouts)
//! - [`sandbox`]: OS-kernel isolation profiles for plugin processes
//! - [`supervisor`]: discovery, spawn, fault isolation, shutdown

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod approval;
pub mod client;
pub mod error;
pub mod manifest;
mod platform;
pub mod risk;
pub mod rpc;
pub mod sandbox;
pub mod supervisor;

pub use approval::{ApprovalRecord, ApprovalStore, PendingApproval};
pub use client::{PluginConnection, PluginHealth, ToolCallOutcome};
pub use error::{PluginError, PluginResult};
pub use manifest::{
    FsAccess, FsPermission, Permissions, PluginManifest, PluginRuntime, permissions_hash,
};
pub use risk::{RiskLevel, assess_risk};
pub use supervisor::{PluginSet, PluginState};
