//! # pginfo
//!
//! Collect a structured snapshot of a PostgreSQL server
//!
//! This crate provides a CLI tool and library for gathering server-wide and
//! per-database information (version, settings, roles, tablespaces,
//! replication, extensions, publications and subscriptions), selected by a
//! wildcard filter over a fixed catalog of subsets.

pub mod capabilities;
pub mod catalog;
pub mod collect;
pub mod config;
pub mod connection;
pub mod decode;
pub mod error;
pub mod filter;
pub mod gateway;
pub mod input;
pub mod orchestrator;
pub mod report;
pub mod snapshot;

#[cfg(test)]
mod testing;

pub mod prelude {
    pub use crate::catalog::Subset;
    pub use crate::config::DbConfig;
    pub use crate::connection::ConnectionManager;
    pub use crate::error::InfoError;
    pub use crate::filter::{resolve, SubsetFilter};
    pub use crate::gateway::{Connector, QueryGateway};
    pub use crate::orchestrator::{gather, CollectionOrchestrator, RunOptions};
    pub use crate::report::{OutputFormat, Reporter};
    pub use crate::snapshot::Snapshot;
}

#[cfg(feature = "postgres")]
pub use gateway::PostgresConnector;
