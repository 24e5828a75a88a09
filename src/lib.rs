//! # Model Registry - Versioned Metadata Store for ML Models
//!
//! Stores one row per version of every registered model in a canonical
//! Parquet snapshot, and derives wide "master" export tables from it for
//! dashboards and reporting.
//!
//! ## Quick Start
//!
//! ```no_run
//! use model_registry::config::RegistryConfig;
//! use model_registry::service::ModelService;
//! use model_registry::store::ModelSubmission;
//!
//! # fn example() -> model_registry::error::Result<()> {
//! let service = ModelService::open(RegistryConfig::load(None)?)?;
//!
//! let submission = ModelSubmission::from_json_str(
//!     r#"{"name": "churn", "algorithm": "XGBoost", "metrics": {"accuracy": 0.91}}"#,
//! )?;
//! let created = service.create(submission)?;
//! assert_eq!(created.version, 1);
//!
//! let insights = service.insights()?;
//! println!("{} models, top algorithm {:?}", insights.total_count, insights.most_used_algorithm);
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Modules
//!
//! - [`store`]: Canonical table, record types and latest-version resolution
//! - [`master`]: Flattened `master_all` / `master_latest` exports
//! - [`insights`]: Dashboard statistics and the legacy summary
//! - [`service`]: Operations used by adapters such as the CLI
//! - [`flatten`]: Nested JSON to dotted keys
//! - [`config`]: Storage root and settings
//! - [`error`]: Error types and handling utilities
//! - [`logging`]: Console and rolling file logs
//!
//! ## Key Concepts
//!
//! ### Version by Copy
//!
//! Updates never edit a stored row. Each update appends a new row with the
//! same `id` and `version + 1`. "Latest" is always recomputed from version
//! numbers when reading; the stored `is_latest` flag is only a hint.
//!
//! ### Derived Tables Are Caches
//!
//! Everything under `exports/` is regenerated from the canonical table and
//! can be deleted at any time without losing data.
//!
//! ### No Write Locking
//!
//! Every write is a full read-modify-write of the canonical snapshot.
//! Concurrent writers can lose each other's rows.

#![warn(clippy::all, rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod flatten;
pub mod insights;
pub mod logging;
pub mod master;
pub mod service;
pub mod store;
pub mod utils;
