//! Callwatch
//!
//! Directory-watch ingestion engine for a radio-scanner call archival
//! server. Watches filesystem locations for newly deposited audio
//! recordings, extracts per-call metadata with dialect-specific strategies,
//! and hands validated call records to a downstream ingest channel.
//!
//! # Architecture
//!
//! - [`config`]: Runtime configuration
//! - [`error`]: Error types and Result aliases
//! - [`call`]: The call record and its validity gate
//! - [`mask`]: Filename-mask metadata parser
//! - [`ingest`]: Ingest sink and system registry handed to every watch
//! - [`dialect`]: Per-recorder ingestion strategies
//! - [`watch`]: Directory watch engine and registry
//! - [`access`]: API key registry
//! - [`storage`]: `SQLite` persistence for watches and keys
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use callwatch::ingest::Ingestor;
//! use callwatch::storage::{init_storage, Database};
//! use callwatch::watch::Dirwatches;
//!
//! #[tokio::main]
//! async fn main() -> callwatch::Result<()> {
//!     let db = Database::open("data/callwatch.db")?;
//!     init_storage(&db)?;
//!     let (ingestor, mut calls) = Ingestor::new();
//!     let ingestor = Arc::new(ingestor);
//!     let watches = Dirwatches::new();
//!     watches.read(&db)?;
//!     watches.start_all(&ingestor);
//!     while let Some(call) = calls.recv().await {
//!         // hand off to archival / broadcast
//!         drop(call);
//!     }
//!     Ok(())
//! }
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod access;
pub mod call;
pub mod config;
pub mod dialect;
pub mod error;
pub mod ingest;
pub mod mask;
pub mod observability;
pub mod storage;
pub mod watch;

pub use config::Config;
pub use error::{Error, Result};
