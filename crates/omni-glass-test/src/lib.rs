//! Test fixtures and mock providers for Omni-Glass.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]

pub mod fixtures;
pub mod scripted;

pub use scripted::ScriptedProvider;
