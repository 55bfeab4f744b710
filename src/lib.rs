//! Probe orchestration and finding aggregation for LLM endpoints.
//!
//! A scan loads the endpoint registry and probe specs, plans one task per
//! (endpoint, probe) pair, runs them through a rate-limited worker pool with
//! retries and a global deadline, and folds the outcomes into a
//! [`RunReport`](models::RunReport) classified by OWASP LLM Top 10 category.

pub mod aggregator;
pub mod api;
pub mod catalog;
pub mod config;
pub mod error;
pub mod models;
pub mod registry;
pub mod scan;
pub mod scheduler;
pub mod utils;

pub use error::{ConfigError, ProbeExecutionError, ScanError};
pub use scan::{ScanRequest, Scanner, run_scan};
