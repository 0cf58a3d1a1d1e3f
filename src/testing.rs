//! Scripted provider and HTTP stub shared by unit tests.

use crate::providers::{ProviderError, ReputationProvider};
use crate::record::ReputationReport;
use async_trait::async_trait;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

#[derive(Clone, Copy)]
pub enum Scripted {
    Score(u8, u32),
    Timeout,
    Garbage,
    Panic,
}

pub struct StaticProvider {
    candidates: Option<Vec<IpAddr>>,
    answers: HashMap<IpAddr, Scripted>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub checked: Mutex<Vec<IpAddr>>,
}

impl StaticProvider {
    /// Provider whose blacklist endpoint returns `candidates`.
    pub fn new(candidates: &[&str]) -> Self {
        Self {
            candidates: Some(candidates.iter().map(|s| s.parse().unwrap()).collect()),
            answers: HashMap::new(),
            delay: None,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            checked: Mutex::new(Vec::new()),
        }
    }

    /// Provider whose blacklist endpoint is unreachable.
    pub fn unavailable() -> Self {
        let mut provider = Self::new(&[]);
        provider.candidates = None;
        provider
    }

    pub fn answer(mut self, ip: &str, answer: Scripted) -> Self {
        self.answers.insert(ip.parse().unwrap(), answer);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl ReputationProvider for StaticProvider {
    async fn list_flagged(&self, limit: usize) -> Result<Vec<IpAddr>, ProviderError> {
        match &self.candidates {
            Some(ips) => Ok(ips.iter().take(limit).copied().collect()),
            None => Err(ProviderError::Timeout),
        }
    }

    async fn check(&self, ip: &IpAddr) -> Result<ReputationReport, ProviderError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        self.checked.lock().unwrap().push(*ip);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match self.answers.get(ip).copied().unwrap_or(Scripted::Timeout) {
            Scripted::Score(abuse_score, total_reports) => Ok(ReputationReport {
                ip: *ip,
                abuse_score,
                total_reports,
            }),
            Scripted::Timeout => Err(ProviderError::Timeout),
            Scripted::Garbage => Err(ProviderError::InvalidResponse("missing data".to_string())),
            Scripted::Panic => panic!("scripted lookup panic for {}", ip),
        }
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// Status that makes [`serve`] accept the connection and never answer.
pub const HANG: u16 = 0;

/// Serve canned responses keyed by path prefix (first match wins). Returns
/// the base URL and the request heads seen so far.
pub async fn serve(routes: Vec<(&'static str, u16, String)>) -> (String, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_task = seen.clone();

    tokio::spawn(async move {
        loop {
            let (mut socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => return,
            };

            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                match socket.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => buf.extend_from_slice(&chunk[..n]),
                }
            }

            let head = String::from_utf8_lossy(&buf).to_string();
            let path = head.split_whitespace().nth(1).unwrap_or("/").to_string();
            seen_task.lock().unwrap().push(head);

            let (status, body) = routes
                .iter()
                .find(|(prefix, _, _)| path.starts_with(prefix))
                .map(|(_, status, body)| (*status, body.clone()))
                .unwrap_or((404, String::new()));

            if status == HANG {
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_secs(30)).await;
                    drop(socket);
                });
                continue;
            }

            let response = format!(
                "HTTP/1.1 {} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });

    (format!("http://{}/api/v2", addr), seen)
}
