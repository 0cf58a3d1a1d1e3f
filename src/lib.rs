//! Threat Monitor for Zentinel.
//!
//! Periodically pulls the most reported IPs from AbuseIPDB, scores each one,
//! persists the batch, and alerts on entries above a risk threshold.
//!
//! # Features
//!
//! - **Two-stage ingestion** - Fetch the provider blacklist, then check each IP
//! - **Bounded enrichment** - Per-IP lookups run concurrently up to a limit
//! - **Partial-failure tolerance** - Failed lookups are dropped, never fatal
//! - **Atomic persistence** - The latest batch is replaced wholesale on disk
//! - **Threshold alerts** - IPs scoring above the threshold raise alerts
//!
//! The scheduler drives the two entry points, [`ThreatMonitor::ingest`] and
//! [`ThreatMonitor::analyze`]. They communicate only through the result store.
//!
//! # Example Configuration
//!
//! ```yaml
//! abuseipdb:
//!   api_key: "${ABUSE_IPDB_API_KEY}"
//!   candidate_limit: 50
//!   max_age_days: 90
//!
//! thresholds:
//!   malicious_score: 75
//!
//! storage:
//!   results_path: "/var/lib/zentinel/abuseipdb_results.json"
//! ```

pub mod analyzer;
pub mod config;
pub mod monitor;
pub mod pipeline;
pub mod providers;
pub mod record;
pub mod store;

#[cfg(test)]
mod testing;

pub use analyzer::{AnalysisReport, AnalysisStatus};
pub use config::Config;
pub use monitor::ThreatMonitor;
pub use record::{Alert, ReputationRecord, ResultBatch};
