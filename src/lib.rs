//! nspider core library
//!
//! Links GEO datasets to the publications that describe them and keeps a
//! local, deduplicated registry of datasets, publications and the PDFs of the
//! open-access ones.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`engine`] - Working-directory facade over everything below
//! - [`registry`] - Deduplicating tables, flushed to `SQLite` on commit
//! - [`resolver`] - Staged dataset-to-publication resolution
//! - [`fetcher`] - Publication and dataset metadata from the NCBI pages
//! - [`download`] - Browser-driven PDF retrieval with fallback ordering
//! - [`extract`] - Full text of stored PDFs
//! - [`db`] - Database connection and schema management

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod db;
pub mod download;
pub mod engine;
pub mod extract;
pub mod fetcher;
pub mod http_client;
pub mod identifier;
pub mod registry;
pub mod resolver;
mod user_agent;
pub mod utils;

// Re-export commonly used types
pub use db::{Database, DbError};
pub use download::{DownloadError, DownloadOrchestrator, DownloadReport, PollPolicy};
pub use engine::{Collaborators, Engine, EngineConfig, EngineError};
pub use extract::{ExtractError, PdfTextExtractor, TextExtractor};
pub use fetcher::{DetailFetcher, FetchError, FetchedDetails, NcbiFetcher, QueryTemplate};
pub use identifier::PublicationId;
pub use registry::{
    DatasetRecord, DownloadStatus, PublicationRecord, Registry, RegistryError, SourceRecord,
};
pub use resolver::{ResolutionOutcome, Resolver};
