//! Omni-Glass host surface.
//!
//! The commands the UI collaborator calls (snip processing, action
//! execution, confirmed command runs, provider settings, plugin
//! approvals), plus provider configuration loading and telemetry
//! initialisation. Everything returns JSON-serialisable values or a
//! structured [`HostError`].

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod config;
pub mod error;
pub mod service;
pub mod telemetry;

pub use config::{GlassConfig, ProviderKind};
pub use error::{HostError, HostResult};
pub use service::HostService;
