//! Omni-Glass Safety Filters.
//!
//! Two independent gates:
//!
//! - [`redact`] keeps sensitive strings off the wire before a prompt is
//!   sent to a remote provider.
//! - [`classify_command`] keeps destructive shell fragments away from the
//!   user's screen and the shell spawn.
//!
//! Both are pure functions over fixed, ordered pattern tables.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]

pub mod blocklist;
pub mod redaction;

pub use blocklist::{CommandVerdict, classify_command};
pub use redaction::{Redaction, redact};
