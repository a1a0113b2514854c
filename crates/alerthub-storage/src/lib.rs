//! Persistence layer for alerts, rules, channels and their side tables.
//!
//! [`store::AlertStore`] wraps a SeaORM connection pool and exposes one
//! async method family per entity. Every caller-facing type is a plain
//! `Row` struct; SeaORM models never leak out of this crate.

pub mod entities;
pub mod store;

#[cfg(test)]
mod tests;

pub use store::{
    AlertRow, AlertStore, ChannelRow, DatasourceRow, RuleRow, SendRecordRow, TemplateRow,
};
