//! routewatch-store: device and scan job persistence.
//!
//! Every read and write of discovered devices and scan jobs goes through
//! the [`PersistenceStore`] trait. Two backends are provided: an in-process
//! [`MemoryStore`] and a Neo4j-backed [`GraphClient`].

pub mod client;
pub mod memory;
pub mod mutations;
pub mod queries;
pub mod store;

pub use client::{GraphClient, GraphConfig};
pub use memory::MemoryStore;
pub use store::{PersistenceStore, StoreError};
