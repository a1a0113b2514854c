//! Shared types and helpers for the alerthub workspace.
//!
//! Holds the pieces every other crate needs: the [`types::Severity`] and
//! [`types::AlertStatus`] vocabulary, snowflake ID generation, Go-style
//! duration parsing, and the alert fingerprint used for deduplication.

pub mod duration;
pub mod fingerprint;
pub mod id;
pub mod types;
