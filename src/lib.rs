//! Internal messaging core of a university web portal.
//!
//! One SQLite table of messages, with everything else derived from it:
//! folders are predicates over per-message flags, threads form lazily when
//! the first reply arrives, each party soft-deletes their own view, and a
//! broadcast feed tells live sessions to refresh. Attachment bytes live in
//! a pluggable object store; sender and recipient display identities are
//! resolved through a pluggable directory and cached forever.
//!
//! The entry point is [`service::Service`]; everything else supports it.

pub mod attachment;
pub mod config;
pub mod db;
pub mod error;
pub mod identity;
pub mod message;
pub mod notify;
pub mod objects;
pub mod service;
pub mod telemetry;
