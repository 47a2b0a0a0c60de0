//! Transparencia Harvester - Download beneficiary records from the Portal da Transparência.
//!
//! The portal serves its beneficiary dataset through a paginated JSON API
//! guarded by an anti-bot challenge. This crate keeps a challenge-backed
//! session alive, walks every year of a region page by page, normalizes the
//! records and writes one CSV file per year.
//!
//! # Example
//!
//! ```
//! use transparencia_harvester::{parse_amount, transform::extract_municipality_id};
//!
//! assert_eq!(parse_amount("2.250,00"), 2250.0);
//! assert_eq!(extract_municipality_id("/consulta?municipio=3304557"), "3304557");
//! ```
//!
//! # Architecture
//!
//! The harvester is organized into several modules:
//!
//! - [`value`]: pt-BR numeric parsing
//! - [`transform`]: raw record to output row mapping
//! - [`credentials`]: challenge solving and credential acquisition
//! - [`http`]: transport capability and the `reqwest` implementation
//! - [`session`]: credential-bound transport with renewal
//! - [`retry`]: per-offset classification and retry
//! - [`pagination`]: offset walk over one partition
//! - [`harvester`]: sequential orchestration over all partitions
//! - [`output`]: per-partition CSV destinations
//! - [`clock`]: wall clock and waits
//! - [`config`]: immutable configuration
//! - [`types`]: core data types
//! - [`error`]: error types and Result alias
//! - [`cli`]: command-line interface

pub mod cli;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod error;
pub mod harvester;
pub mod http;
pub mod output;
pub mod pagination;
pub mod retry;
pub mod session;
pub mod transform;
pub mod types;
pub mod value;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export main functions
pub use harvester::{harvest, harvest_to_csv, HarvestReport};

// Re-export commonly used items
pub use config::HarvestConfig;
pub use error::{HarvesterError, Result};
pub use types::{CredentialSet, NormalizedRow, Partition, PartitionSummary, TerminalReason};
pub use value::parse_amount;
