//! # teamlock-core
//!
//! Coordination kernel for multi-collaborator teams: a TTL-based
//! distributed lock manager over a pluggable backing store, plus a
//! rule-driven conflict detector and resolver with typed outbound
//! events.

pub mod config;
pub mod detect;
pub mod error;
pub mod events;
pub mod manager;
pub mod resolver;
pub mod store;
#[path = "store_in_memory.rs"]
pub mod store_in_memory;
#[cfg(feature = "sqlite")]
#[path = "store_sqlite.rs"]
pub mod store_sqlite;
pub mod strategies;
pub mod types;

#[cfg(test)]
mod manager_test;
#[cfg(test)]
mod strategies_test;
