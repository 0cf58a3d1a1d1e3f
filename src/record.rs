//! Reputation records, result batches, and alerts.

use crate::config::Thresholds;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

/// Raw reputation data returned by a provider for one IP.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReputationReport {
    /// Address that was looked up.
    pub ip: IpAddr,
    /// Abuse confidence score (0-100, higher = worse).
    pub abuse_score: u8,
    /// Reports within the configured age window (0 if absent).
    pub total_reports: u32,
}

/// A scored and classified IP, as persisted in a result batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReputationRecord {
    /// Scored address.
    pub ip: IpAddr,
    /// Abuse confidence score (0-100, higher = worse).
    pub abuse_score: u8,
    /// Score was above the malicious threshold at ingestion.
    pub is_malicious: bool,
    /// Reports within the configured age window.
    pub total_reports: u32,
}

impl ReputationRecord {
    /// Classify a provider report against the thresholds.
    pub fn classify(report: ReputationReport, thresholds: &Thresholds) -> Self {
        Self {
            ip: report.ip,
            abuse_score: report.abuse_score,
            is_malicious: thresholds.is_malicious(report.abuse_score),
            total_reports: report.total_reports,
        }
    }
}

/// All records produced by one ingestion run, in candidate order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultBatch {
    records: Vec<ReputationRecord>,
}

impl ResultBatch {
    /// Batch holding `records` in the given order.
    pub fn new(records: Vec<ReputationRecord>) -> Self {
        Self { records }
    }

    /// Batch for a run that produced no records.
    pub fn empty() -> Self {
        Self::default()
    }

    /// All records, in candidate order.
    pub fn records(&self) -> &[ReputationRecord] {
        &self.records
    }

    /// Records classified as malicious.
    pub fn flagged(&self) -> impl Iterator<Item = &ReputationRecord> {
        self.records.iter().filter(|r| r.is_malicious)
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the batch holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Notification for one malicious record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub ip: IpAddr,
    pub abuse_score: u8,
    pub total_reports: u32,
}

impl From<&ReputationRecord> for Alert {
    fn from(record: &ReputationRecord) -> Self {
        Self {
            ip: record.ip,
            abuse_score: record.abuse_score,
            total_reports: record.total_reports,
        }
    }
}

impl std::fmt::Display for Alert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} - Abuse Score: {}, Reports: {}",
            self.ip, self.abuse_score, self.total_reports
        )
    }
}
