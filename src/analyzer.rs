//! Threat analysis over the latest persisted batch.

use crate::pipeline::RunStage;
use crate::record::Alert;
use crate::store::ResultStore;
use std::sync::Arc;
use tracing::{info, warn};

/// Overall outcome of an analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisStatus {
    /// No ingestion has produced a readable batch yet.
    NoData,
    /// A batch exists and nothing in it is malicious.
    Clear,
    /// At least one malicious IP.
    Alert,
}

/// Alerts produced from one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisReport {
    /// Summary signal.
    pub status: AnalysisStatus,
    /// One alert per malicious record, in batch order.
    pub alerts: Vec<Alert>,
    /// Number of records in the analyzed batch.
    pub records_examined: usize,
    /// Always `Analyzed`; closes the ingest/analyze cycle.
    pub stage: RunStage,
}

impl AnalysisReport {
    pub fn is_alert(&self) -> bool {
        self.status == AnalysisStatus::Alert
    }
}

/// Delivery channel for analysis results.
pub trait AlertSink: Send + Sync {
    fn emit(&self, report: &AnalysisReport) -> anyhow::Result<()>;
}

/// Emits analysis results as tracing events.
#[derive(Debug, Default)]
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn emit(&self, report: &AnalysisReport) -> anyhow::Result<()> {
        match report.status {
            AnalysisStatus::NoData => {
                info!("No data available, skipping analysis");
            }
            AnalysisStatus::Clear => {
                info!(
                    records = report.records_examined,
                    "No high-risk IPs detected"
                );
            }
            AnalysisStatus::Alert => {
                warn!(
                    flagged = report.alerts.len(),
                    records = report.records_examined,
                    "ALERT: Malicious IPs detected"
                );
                for alert in &report.alerts {
                    warn!(
                        ip = %alert.ip,
                        score = alert.abuse_score,
                        reports = alert.total_reports,
                        "{}",
                        alert
                    );
                }
            }
        }
        Ok(())
    }
}

/// Reads the latest batch and raises alerts for malicious entries.
pub struct ThreatAnalyzer {
    store: Arc<dyn ResultStore>,
    sink: Arc<dyn AlertSink>,
}

impl ThreatAnalyzer {
    pub fn new(store: Arc<dyn ResultStore>, sink: Arc<dyn AlertSink>) -> Self {
        Self { store, sink }
    }

    /// Analyze the stored batch. Never fails: an unreadable store counts as
    /// no data, and sink failures are logged.
    pub fn analyze(&self) -> AnalysisReport {
        let report = match self.store.load() {
            Ok(Some(batch)) => {
                let alerts: Vec<Alert> = batch.flagged().map(Alert::from).collect();
                let status = if alerts.is_empty() {
                    AnalysisStatus::Clear
                } else {
                    AnalysisStatus::Alert
                };
                AnalysisReport {
                    status,
                    alerts,
                    records_examined: batch.len(),
                    stage: RunStage::Analyzed,
                }
            }
            Ok(None) => no_data(),
            Err(e) => {
                warn!(
                    store = %self.store.describe(),
                    error = %e,
                    "Stored results unreadable, treating as no data"
                );
                no_data()
            }
        };

        if let Err(e) = self.sink.emit(&report) {
            warn!(error = %e, "Failed to emit analysis result");
        }

        report
    }
}

fn no_data() -> AnalysisReport {
    AnalysisReport {
        status: AnalysisStatus::NoData,
        alerts: Vec::new(),
        records_examined: 0,
        stage: RunStage::Analyzed,
    }
}
