//! Omni-Glass Core - Foundation types for the Omni-Glass action pipeline.
//!
//! This crate provides:
//! - The snip context produced by the capture collaborator
//! - Action, action-menu, and action-result wire types
//! - Tool descriptors and qualified tool names
//! - Pipeline phase tracking
//! - Directory scaffolding for the Omni-Glass home directory
//! - The spawn-environment security policy for plugin child processes

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod action;
pub mod dirs;
pub mod env_policy;
pub mod phase;
pub mod result;
pub mod snip;
pub mod tool;

pub use action::{Action, ActionMenu, ContentType, fallback_menu};
pub use dirs::GlassHome;
pub use phase::PipelinePhase;
pub use result::{ActionResult, ActionStatus, ResultBody, ResultMeta, TokenUsage};
pub use snip::{RecognitionLevel, SnipContext, StructuralFlags};
pub use tool::{BUILTIN_PLUGIN_ID, ToolDescriptor, qualified_name, split_qualified_name};
