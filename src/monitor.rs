//! Threat monitor entry points invoked by the external scheduler.

use crate::analyzer::{AlertSink, AnalysisReport, LogAlertSink, ThreatAnalyzer};
use crate::config::Config;
use crate::pipeline::{IngestReport, IngestSettings, IngestionPipeline};
use crate::providers::abuseipdb::AbuseIPDBProvider;
use crate::providers::ReputationProvider;
use crate::store::{FileResultStore, ResultStore, StorageError};
use std::sync::Arc;
use tracing::info;

/// Ingestion and analysis wired to one provider and one store.
///
/// `ingest` and `analyze` share nothing in memory: analysis only sees what
/// the store holds, so the two may run in separate processes.
pub struct ThreatMonitor {
    pipeline: IngestionPipeline,
    analyzer: ThreatAnalyzer,
}

impl ThreatMonitor {
    /// Build a monitor backed by AbuseIPDB and the configured results file.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        config.validate()?;

        let provider = AbuseIPDBProvider::new(config.abuseipdb.clone())?;
        let store = FileResultStore::new(config.storage.results_path.clone());

        info!(
            provider = provider.name(),
            store = %store.describe(),
            candidate_limit = config.abuseipdb.candidate_limit,
            malicious_score = config.thresholds.malicious_score,
            allowlist_entries = config.allowlist.len(),
            "Threat monitor initialized"
        );

        Ok(Self::with_components(
            Arc::new(provider),
            Arc::new(store),
            Arc::new(LogAlertSink),
            IngestSettings::from_config(&config),
        ))
    }

    /// Build a monitor from explicit components.
    pub fn with_components(
        provider: Arc<dyn ReputationProvider>,
        store: Arc<dyn ResultStore>,
        sink: Arc<dyn AlertSink>,
        settings: IngestSettings,
    ) -> Self {
        Self {
            pipeline: IngestionPipeline::new(provider, store.clone(), settings),
            analyzer: ThreatAnalyzer::new(store, sink),
        }
    }

    /// Fetch, enrich, classify and persist one batch.
    pub async fn ingest(&self) -> Result<IngestReport, StorageError> {
        self.pipeline.ingest().await
    }

    /// Alert on the latest persisted batch.
    pub fn analyze(&self) -> AnalysisReport {
        self.analyzer.analyze()
    }

    /// Ingest, then analyze what was persisted.
    pub async fn run(&self) -> Result<AnalysisReport, StorageError> {
        self.ingest().await?;
        Ok(self.analyze())
    }
}
