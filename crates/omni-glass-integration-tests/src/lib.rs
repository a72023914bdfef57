//! End-to-end scenarios for the Omni-Glass action pipeline live in
//! `tests/`; this crate has no library surface of its own.
