//! Ingestion: fetch flagged IPs, enrich each one, persist the batch.

use crate::config::{AllowlistEntry, Config, Thresholds};
use crate::providers::{ProviderError, ReputationProvider};
use crate::record::{ReputationRecord, ResultBatch};
use crate::store::{ResultStore, StorageError};
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Progress of one ingest/analyze cycle. Stages only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RunStage {
    /// Nothing requested from the provider yet.
    NotStarted,
    /// Candidate list obtained (possibly empty).
    CandidatesFetched,
    /// Every candidate looked up or given up on.
    Enriched,
    /// Batch written to the store.
    Persisted,
    /// Stored batch read and alerts emitted.
    Analyzed,
}

impl std::fmt::Display for RunStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunStage::NotStarted => "not-started",
            RunStage::CandidatesFetched => "candidates-fetched",
            RunStage::Enriched => "enriched",
            RunStage::Persisted => "persisted",
            RunStage::Analyzed => "analyzed",
        };
        f.write_str(name)
    }
}

/// Settings fixed for the lifetime of a pipeline.
#[derive(Debug, Clone)]
pub struct IngestSettings {
    /// Maximum number of flagged IPs requested from the provider.
    pub candidate_limit: usize,

    /// Maximum number of lookups in flight.
    pub concurrency: usize,

    /// Classification thresholds applied to each record.
    pub thresholds: Thresholds,

    /// Candidates matching any entry are skipped.
    pub allowlist: Vec<AllowlistEntry>,
}

impl IngestSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            candidate_limit: config.abuseipdb.candidate_limit,
            concurrency: config.abuseipdb.concurrency,
            thresholds: config.thresholds,
            allowlist: config.parse_allowlist(),
        }
    }
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            candidate_limit: 50,
            concurrency: 4,
            thresholds: Thresholds::default(),
            allowlist: Vec::new(),
        }
    }
}

/// A candidate whose lookup failed and was left out of the batch.
#[derive(Debug)]
pub struct FailedLookup {
    /// Candidate that could not be scored.
    pub ip: IpAddr,
    /// Why the lookup failed.
    pub error: ProviderError,
}

/// Result of a single per-IP lookup.
#[derive(Debug)]
pub enum LookupOutcome {
    /// Provider answered; record classified.
    Enriched(ReputationRecord),
    /// Provider call failed or the lookup task died.
    Failed(FailedLookup),
}

/// Summary of one ingestion run.
#[derive(Debug)]
pub struct IngestReport {
    /// The batch that was persisted.
    pub batch: ResultBatch,
    /// Unique candidates returned by the provider.
    pub candidates: usize,
    /// Candidates skipped because they are allowlisted.
    pub skipped: usize,
    /// Lookups that failed.
    pub failed: Vec<FailedLookup>,
    /// Set when the candidate list itself could not be fetched.
    pub listing_error: Option<ProviderError>,
    /// Last stage reached; `Persisted` on success.
    pub stage: RunStage,
}

/// Two-stage ingestion against a reputation provider.
pub struct IngestionPipeline {
    provider: Arc<dyn ReputationProvider>,
    store: Arc<dyn ResultStore>,
    settings: IngestSettings,
}

impl IngestionPipeline {
    pub fn new(
        provider: Arc<dyn ReputationProvider>,
        store: Arc<dyn ResultStore>,
        settings: IngestSettings,
    ) -> Self {
        Self {
            provider,
            store,
            settings,
        }
    }

    /// Run one ingestion and replace the stored batch.
    ///
    /// Provider failures never fail the run: a failed listing persists an
    /// empty batch and failed lookups are left out. Only storage errors are
    /// returned.
    pub async fn ingest(&self) -> Result<IngestReport, StorageError> {
        let mut stage = RunStage::NotStarted;

        let (candidates, listing_error) = match self
            .provider
            .list_flagged(self.settings.candidate_limit)
            .await
        {
            Ok(ips) => (ips, None),
            Err(e) => {
                warn!(
                    provider = self.provider.name(),
                    error = %e,
                    kind = ?e.kind(),
                    "Failed to fetch flagged IPs, persisting empty batch"
                );
                (Vec::new(), Some(e))
            }
        };
        let candidates = dedup(candidates);
        advance(&mut stage, RunStage::CandidatesFetched);
        info!(candidates = candidates.len(), "Flagged IPs fetched");

        let (to_check, skipped): (Vec<IpAddr>, Vec<IpAddr>) = candidates
            .iter()
            .copied()
            .partition(|ip| !self.is_allowlisted(ip));
        for ip in &skipped {
            debug!(ip = %ip, "Skipping allowlisted candidate");
        }

        let outcomes = self.enrich(to_check).await;
        let (batch, failed) = partition(outcomes);
        advance(&mut stage, RunStage::Enriched);

        self.store.replace(&batch)?;
        advance(&mut stage, RunStage::Persisted);

        info!(
            records = batch.len(),
            flagged = batch.flagged().count(),
            failed = failed.len(),
            skipped = skipped.len(),
            store = %self.store.describe(),
            "Threat intelligence results saved"
        );

        Ok(IngestReport {
            batch,
            candidates: candidates.len(),
            skipped: skipped.len(),
            failed,
            listing_error,
            stage,
        })
    }

    fn is_allowlisted(&self, ip: &IpAddr) -> bool {
        self.settings.allowlist.iter().any(|entry| entry.contains(ip))
    }

    /// Look up every candidate with at most `concurrency` requests in
    /// flight. Outcomes come back in candidate order.
    async fn enrich(&self, candidates: Vec<IpAddr>) -> Vec<LookupOutcome> {
        let semaphore = Arc::new(Semaphore::new(self.settings.concurrency.max(1)));

        let handles: Vec<_> = candidates
            .into_iter()
            .map(|ip| {
                let provider = self.provider.clone();
                let semaphore = semaphore.clone();
                let thresholds = self.settings.thresholds;

                let handle = tokio::spawn(async move {
                    let _permit = semaphore.acquire_owned().await.ok();
                    match provider.check(&ip).await {
                        Ok(report) => LookupOutcome::Enriched(ReputationRecord::classify(
                            report,
                            &thresholds,
                        )),
                        Err(error) => {
                            warn!(
                                provider = provider.name(),
                                ip = %ip,
                                error = %error,
                                "Reputation lookup failed"
                            );
                            LookupOutcome::Failed(FailedLookup { ip, error })
                        }
                    }
                });
                (ip, handle)
            })
            .collect();

        let mut outcomes = Vec::with_capacity(handles.len());
        for (ip, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(ip = %ip, error = %e, "Lookup task aborted");
                    LookupOutcome::Failed(FailedLookup {
                        ip,
                        error: ProviderError::Other(format!("lookup task aborted: {}", e)),
                    })
                }
            };
            outcomes.push(outcome);
        }

        outcomes
    }
}

fn advance(stage: &mut RunStage, next: RunStage) {
    debug_assert!(next > *stage);
    debug!(from = %stage, to = %next, "Ingest stage");
    *stage = next;
}

/// Drop repeated addresses, keeping the first occurrence.
fn dedup(ips: Vec<IpAddr>) -> Vec<IpAddr> {
    let mut seen = HashSet::with_capacity(ips.len());
    ips.into_iter().filter(|ip| seen.insert(*ip)).collect()
}

/// Split lookup outcomes into the batch and the failures.
pub fn partition(outcomes: Vec<LookupOutcome>) -> (ResultBatch, Vec<FailedLookup>) {
    let mut records = Vec::new();
    let mut failed = Vec::new();

    for outcome in outcomes {
        match outcome {
            LookupOutcome::Enriched(record) => records.push(record),
            LookupOutcome::Failed(failure) => failed.push(failure),
        }
    }

    (ResultBatch::new(records), failed)
}
