//! AbuseIPDB threat intelligence provider.

use super::{ProviderError, ReputationProvider};
use crate::config::AbuseIPDBConfig;
use crate::record::ReputationReport;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::net::IpAddr;
use std::time::Duration;
use tracing::{debug, warn};

/// AbuseIPDB blacklist response.
#[derive(Debug, Deserialize)]
struct BlacklistResponse {
    data: Vec<BlacklistEntry>,
}

#[derive(Debug, Deserialize)]
struct BlacklistEntry {
    #[serde(rename = "ipAddress")]
    ip_address: String,
}

/// AbuseIPDB check response.
#[derive(Debug, Deserialize)]
struct CheckResponse {
    data: CheckData,
}

/// AbuseIPDB check response data.
#[derive(Debug, Deserialize)]
struct CheckData {
    /// Abuse confidence score (0-100).
    #[serde(rename = "abuseConfidenceScore", default)]
    abuse_confidence_score: Option<u32>,

    /// Total number of reports.
    #[serde(rename = "totalReports", default)]
    total_reports: Option<u32>,
}

/// AbuseIPDB threat intelligence provider.
pub struct AbuseIPDBProvider {
    config: AbuseIPDBConfig,
    client: Client,
}

impl AbuseIPDBProvider {
    /// Create a new AbuseIPDB provider.
    pub fn new(config: AbuseIPDBConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        Ok(Self { config, client })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn get(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<String, ProviderError> {
        let response = self
            .client
            .get(self.endpoint(path))
            .query(query)
            .header("Key", &self.config.api_key)
            .header("Accept", "application/json")
            .send()
            .await?;

        match response.status() {
            StatusCode::TOO_MANY_REQUESTS => {
                warn!("AbuseIPDB rate limit exceeded");
                return Err(ProviderError::RateLimited);
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(ProviderError::Unauthorized);
            }
            _ => {}
        }

        // Check for other errors
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::InvalidResponse(format!(
                "HTTP {}: {}",
                status, body
            )));
        }

        Ok(response.text().await?)
    }
}

/// Parse a blacklist body into at most `limit` addresses.
fn parse_blacklist(body: &str, limit: usize) -> Result<Vec<IpAddr>, ProviderError> {
    let parsed: BlacklistResponse = serde_json::from_str(body).map_err(|e| {
        ProviderError::InvalidResponse(format!("Failed to parse blacklist: {}", e))
    })?;

    let ips = parsed
        .data
        .into_iter()
        .filter_map(|entry| match entry.ip_address.trim().parse() {
            Ok(ip) => Some(ip),
            Err(_) => {
                debug!(value = %entry.ip_address, "Skipping unparseable blacklist entry");
                None
            }
        })
        .take(limit)
        .collect();

    Ok(ips)
}

/// Parse a check body for `ip`.
fn parse_check(ip: IpAddr, body: &str) -> Result<ReputationReport, ProviderError> {
    let parsed: CheckResponse = serde_json::from_str(body).map_err(|e| {
        ProviderError::InvalidResponse(format!("Failed to parse response: {}", e))
    })?;

    let score = parsed.data.abuse_confidence_score.unwrap_or(0).min(100) as u8;

    Ok(ReputationReport {
        ip,
        abuse_score: score,
        total_reports: parsed.data.total_reports.unwrap_or(0),
    })
}

#[async_trait]
impl ReputationProvider for AbuseIPDBProvider {
    async fn list_flagged(&self, limit: usize) -> Result<Vec<IpAddr>, ProviderError> {
        debug!(limit, "Fetching AbuseIPDB blacklist");

        let body = self
            .get("blacklist", &[("limit", limit.to_string())])
            .await?;
        let ips = parse_blacklist(&body, limit)?;

        debug!(count = ips.len(), "AbuseIPDB blacklist fetched");
        Ok(ips)
    }

    async fn check(&self, ip: &IpAddr) -> Result<ReputationReport, ProviderError> {
        debug!(ip = %ip, "Querying AbuseIPDB");

        let body = self
            .get(
                "check",
                &[
                    ("ipAddress", ip.to_string()),
                    ("maxAgeInDays", self.config.max_age_days.to_string()),
                ],
            )
            .await?;
        let report = parse_check(*ip, &body)?;

        debug!(
            ip = %ip,
            score = report.abuse_score,
            reports = report.total_reports,
            "AbuseIPDB lookup complete"
        );

        Ok(report)
    }

    fn name(&self) -> &str {
        "abuseipdb"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::ProviderErrorKind;
    use crate::testing::{serve, HANG};
    use std::time::Instant;
    use tokio::net::TcpListener;

    fn create_test_config(base_url: &str) -> AbuseIPDBConfig {
        AbuseIPDBConfig {
            api_key: "test-key".to_string(),
            base_url: base_url.to_string(),
            timeout_ms: 2000,
            ..AbuseIPDBConfig::default()
        }
    }

    #[test]
    fn test_provider_name() {
        let provider = AbuseIPDBProvider::new(create_test_config("http://localhost")).unwrap();
        assert_eq!(provider.name(), "abuseipdb");
    }

    #[test]
    fn test_endpoint_trims_slash() {
        let provider = AbuseIPDBProvider::new(create_test_config("http://localhost/api/v2/")).unwrap();
        assert_eq!(provider.endpoint("check"), "http://localhost/api/v2/check");
    }

    #[test]
    fn test_parse_blacklist() {
        let body = r#"{"meta":{"generatedAt":"2025-01-01T00:00:00+00:00"},"data":[
            {"ipAddress":"1.2.3.4","abuseConfidenceScore":100},
            {"ipAddress":"not-an-ip","abuseConfidenceScore":100},
            {"ipAddress":"2001:db8::1","abuseConfidenceScore":100},
            {"ipAddress":"5.6.7.8","abuseConfidenceScore":100}
        ]}"#;

        let ips = parse_blacklist(body, 2).unwrap();
        assert_eq!(
            ips,
            vec![
                "1.2.3.4".parse::<IpAddr>().unwrap(),
                "2001:db8::1".parse::<IpAddr>().unwrap()
            ]
        );
    }

    #[test]
    fn test_parse_blacklist_missing_data() {
        let err = parse_blacklist(r#"{"errors":[{"detail":"nope"}]}"#, 50).unwrap_err();
        assert_eq!(err.kind(), ProviderErrorKind::Malformed);
    }

    #[test]
    fn test_parse_check() {
        let ip: IpAddr = "1.2.3.4".parse().unwrap();
        let body = r#"{"data":{"ipAddress":"1.2.3.4","abuseConfidenceScore":90,"totalReports":12,"isTor":false}}"#;

        let report = parse_check(ip, body).unwrap();
        assert_eq!(report.abuse_score, 90);
        assert_eq!(report.total_reports, 12);
    }

    #[test]
    fn test_parse_check_defaults_missing_numbers() {
        let ip: IpAddr = "1.2.3.4".parse().unwrap();
        let report = parse_check(ip, r#"{"data":{"ipAddress":"1.2.3.4"}}"#).unwrap();
        assert_eq!(report.abuse_score, 0);
        assert_eq!(report.total_reports, 0);
    }

    #[test]
    fn test_parse_check_clamps_score() {
        let ip: IpAddr = "1.2.3.4".parse().unwrap();
        let report = parse_check(ip, r#"{"data":{"abuseConfidenceScore":300}}"#).unwrap();
        assert_eq!(report.abuse_score, 100);
    }

    #[test]
    fn test_parse_check_missing_data() {
        let ip: IpAddr = "1.2.3.4".parse().unwrap();
        let err = parse_check(ip, "{}").unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn test_list_flagged_over_http() {
        let (base_url, seen) = serve(vec![(
            "/api/v2/blacklist",
            200,
            r#"{"data":[{"ipAddress":"1.2.3.4"},{"ipAddress":"5.6.7.8"}]}"#.to_string(),
        )])
        .await;

        let provider = AbuseIPDBProvider::new(create_test_config(&base_url)).unwrap();
        let ips = provider.list_flagged(50).await.unwrap();
        assert_eq!(ips.len(), 2);

        let heads = seen.lock().unwrap();
        assert!(heads[0].contains("limit=50"));
        assert!(heads[0].to_lowercase().contains("key: test-key"));
    }

    #[tokio::test]
    async fn test_check_over_http() {
        let (base_url, seen) = serve(vec![(
            "/api/v2/check",
            200,
            r#"{"data":{"abuseConfidenceScore":10,"totalReports":1}}"#.to_string(),
        )])
        .await;

        let provider = AbuseIPDBProvider::new(create_test_config(&base_url)).unwrap();
        let report = provider.check(&"5.6.7.8".parse().unwrap()).await.unwrap();
        assert_eq!(report.abuse_score, 10);
        assert_eq!(report.total_reports, 1);

        let heads = seen.lock().unwrap();
        assert!(heads[0].contains("ipAddress=5.6.7.8"));
        assert!(heads[0].contains("maxAgeInDays=90"));
    }

    #[tokio::test]
    async fn test_rate_limited() {
        let (base_url, _) = serve(vec![("/api/v2/check", 429, "{}".to_string())]).await;

        let provider = AbuseIPDBProvider::new(create_test_config(&base_url)).unwrap();
        let err = provider.check(&"1.2.3.4".parse().unwrap()).await.unwrap_err();
        assert!(matches!(err, ProviderError::RateLimited));
        assert_eq!(err.kind(), ProviderErrorKind::Unavailable);
    }

    #[tokio::test]
    async fn test_unauthorized() {
        let (base_url, _) = serve(vec![("/api/v2/blacklist", 401, "{}".to_string())]).await;

        let provider = AbuseIPDBProvider::new(create_test_config(&base_url)).unwrap();
        let err = provider.list_flagged(10).await.unwrap_err();
        assert!(matches!(err, ProviderError::Unauthorized));
    }

    #[tokio::test]
    async fn test_server_error_is_malformed() {
        let (base_url, _) = serve(vec![(
            "/api/v2/check",
            500,
            r#"{"errors":[{"detail":"upstream failure"}]}"#.to_string(),
        )])
        .await;

        let provider = AbuseIPDBProvider::new(create_test_config(&base_url)).unwrap();
        let err = provider.check(&"1.2.3.4".parse().unwrap()).await.unwrap_err();
        assert_eq!(err.kind(), ProviderErrorKind::Malformed);
        match err {
            ProviderError::InvalidResponse(msg) => {
                assert!(msg.starts_with("HTTP 500"));
                assert!(msg.contains("upstream failure"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_hanging_server_times_out() {
        let (base_url, _) = serve(vec![("/api/v2/check", HANG, String::new())]).await;

        let mut config = create_test_config(&base_url);
        config.timeout_ms = 200;
        let provider = AbuseIPDBProvider::new(config).unwrap();

        let started = Instant::now();
        let err = provider.check(&"1.2.3.4".parse().unwrap()).await.unwrap_err();
        assert!(matches!(err, ProviderError::Timeout));
        assert_eq!(err.kind(), ProviderErrorKind::Unavailable);
        assert!(started.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_connection_refused_is_unavailable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let provider =
            AbuseIPDBProvider::new(create_test_config(&format!("http://{}/api/v2", addr))).unwrap();
        let err = provider.list_flagged(10).await.unwrap_err();
        assert_eq!(err.kind(), ProviderErrorKind::Unavailable);
    }
}
