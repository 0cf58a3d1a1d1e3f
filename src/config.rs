//! Configuration types for the threat monitor.

use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

/// Environment variable consulted for the AbuseIPDB API key when no
/// configuration file is given.
pub const API_KEY_ENV: &str = "ABUSE_IPDB_API_KEY";

/// Root configuration for the threat monitor.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// AbuseIPDB provider configuration.
    #[serde(default)]
    pub abuseipdb: AbuseIPDBConfig,

    /// Classification thresholds.
    #[serde(default)]
    pub thresholds: Thresholds,

    /// Result persistence.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Candidates matching these entries are never enriched or alerted on.
    #[serde(default)]
    pub allowlist: Vec<String>,
}

/// AbuseIPDB provider configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AbuseIPDBConfig {
    /// API key (supports ${ENV_VAR} syntax).
    #[serde(default)]
    pub api_key: String,

    /// API base URL, without trailing slash.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Only consider reports from the last N days.
    #[serde(default = "default_max_age_days")]
    pub max_age_days: u32,

    /// Maximum number of flagged IPs requested per run.
    #[serde(default = "default_candidate_limit")]
    pub candidate_limit: usize,

    /// API request timeout in milliseconds.
    #[serde(default = "default_timeout")]
    pub timeout_ms: u64,

    /// Maximum number of concurrent per-IP lookups.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for AbuseIPDBConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
            max_age_days: default_max_age_days(),
            candidate_limit: default_candidate_limit(),
            timeout_ms: default_timeout(),
            concurrency: default_concurrency(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.abuseipdb.com/api/v2".to_string()
}

fn default_max_age_days() -> u32 {
    90
}

fn default_candidate_limit() -> usize {
    50
}

fn default_timeout() -> u64 {
    10_000
}

fn default_concurrency() -> usize {
    4
}

/// Reputation score thresholds.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
pub struct Thresholds {
    /// Classify as malicious if score is strictly greater than this value.
    #[serde(default = "default_malicious_score")]
    pub malicious_score: u8,
}

impl Thresholds {
    /// Whether a score is above the malicious threshold.
    pub fn is_malicious(&self, score: u8) -> bool {
        score > self.malicious_score
    }
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            malicious_score: default_malicious_score(),
        }
    }
}

fn default_malicious_score() -> u8 {
    75
}

/// Where the latest result batch lives.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Path of the JSON results document.
    #[serde(default = "default_results_path")]
    pub results_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            results_path: default_results_path(),
        }
    }
}

fn default_results_path() -> PathBuf {
    PathBuf::from("/var/lib/zentinel/abuseipdb_results.json")
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let expanded = expand_env_vars(&content);
        let config: Config = serde_yaml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    /// Build a default configuration with the API key taken from the
    /// environment.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = Config::default();
        config.abuseipdb.api_key = std::env::var(API_KEY_ENV).unwrap_or_default();
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.abuseipdb.api_key.trim().is_empty() {
            anyhow::bail!(
                "AbuseIPDB api_key is missing. Set it in the config file or via {}",
                API_KEY_ENV
            );
        }

        if self.thresholds.malicious_score > 100 {
            anyhow::bail!(
                "malicious_score ({}) must be <= 100",
                self.thresholds.malicious_score
            );
        }

        if self.abuseipdb.candidate_limit == 0 {
            anyhow::bail!("candidate_limit must be at least 1");
        }

        if self.abuseipdb.concurrency == 0 {
            anyhow::bail!("concurrency must be at least 1");
        }

        // Validate allowlist entries can be parsed
        for entry in &self.allowlist {
            if entry.parse::<IpAddr>().is_err() && entry.parse::<IpNet>().is_err() {
                anyhow::bail!("Invalid allowlist entry: {}", entry);
            }
        }

        Ok(())
    }

    /// Parse allowlist entries into IpAddr or IpNet.
    pub fn parse_allowlist(&self) -> Vec<AllowlistEntry> {
        self.allowlist
            .iter()
            .filter_map(|s| {
                if let Ok(ip) = s.parse::<IpAddr>() {
                    Some(AllowlistEntry::Single(ip))
                } else if let Ok(net) = s.parse::<IpNet>() {
                    Some(AllowlistEntry::Network(net))
                } else {
                    None
                }
            })
            .collect()
    }

    /// Generate example configuration YAML.
    pub fn example() -> String {
        r#"# Threat Monitor Configuration

# AbuseIPDB provider
abuseipdb:
  api_key: "${ABUSE_IPDB_API_KEY}"   # Use environment variable
  base_url: "https://api.abuseipdb.com/api/v2"
  max_age_days: 90             # Only consider reports from last 90 days
  candidate_limit: 50          # Top N flagged IPs fetched per run
  timeout_ms: 10000            # Per-request timeout
  concurrency: 4               # Parallel per-IP lookups

# Classification (0-100, higher = worse)
thresholds:
  malicious_score: 75          # Malicious if score > 75

# Latest result batch, overwritten on every ingest
storage:
  results_path: "/var/lib/zentinel/abuseipdb_results.json"

# Never enrich or alert on these addresses
# Supports single IPs and CIDR notation
allowlist:
  - "127.0.0.1"
  - "10.0.0.0/8"
"#
        .to_string()
    }
}

/// Parsed allowlist entry.
#[derive(Debug, Clone)]
pub enum AllowlistEntry {
    Single(IpAddr),
    Network(IpNet),
}

impl AllowlistEntry {
    /// Check if an IP address matches this allowlist entry.
    pub fn contains(&self, ip: &IpAddr) -> bool {
        match self {
            AllowlistEntry::Single(allowed) => allowed == ip,
            AllowlistEntry::Network(net) => net.contains(ip),
        }
    }
}

/// Expand environment variables in the format ${VAR_NAME}.
fn expand_env_vars(content: &str) -> String {
    static PATTERN: std::sync::OnceLock<regex::Regex> = std::sync::OnceLock::new();
    let re = PATTERN.get_or_init(|| {
        regex::Regex::new(r"\$\{([^}]+)\}").expect("env var pattern is a valid regex")
    });

    re.replace_all(content, |cap: &regex::Captures<'_>| {
        std::env::var(&cap[1]).unwrap_or_default()
    })
    .into_owned()
}
