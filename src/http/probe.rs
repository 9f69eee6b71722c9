//! Probe client that exercises a running server and reports each verdict.

use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::error::Result;

/// What happened to one probe request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    /// Admitted by the server.
    Allowed {
        /// HTTP status code
        status: u16,
        /// Trimmed response body
        body: String,
    },
    /// Rejected with 429.
    Blocked {
        /// HTTP status code
        status: u16,
        /// Trimmed response body
        body: String,
        /// Advertised `Retry-After` seconds, if present
        retry_after: Option<u64>,
    },
    /// The request never produced a response.
    Failed(String),
}

/// One probe request and its timing.
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    /// 1-based position in the run
    pub index: usize,
    /// What the server said
    pub result: ProbeResult,
    /// Round-trip time
    pub elapsed: Duration,
}

/// Send `count` sequential GET requests to `url`, pausing `delay` between
/// them.
///
/// Requests go straight to the target, bypassing any system proxy, so the
/// server sees the probe's own address. Transport failures are recorded per
/// request and never end the run.
pub async fn probe(url: &str, count: usize, delay: Duration) -> Result<Vec<ProbeOutcome>> {
    let client = reqwest::Client::builder().no_proxy().build()?;
    let mut outcomes = Vec::with_capacity(count);

    info!(url = %url, count = count, delay_ms = delay.as_millis() as u64, "Starting probe");

    for index in 1..=count {
        let start = Instant::now();
        let result = match client.get(url).send().await {
            Ok(response) => {
                let status = response.status();
                let retry_after = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|value| value.to_str().ok())
                    .and_then(|value| value.trim().parse::<u64>().ok());
                let body = match response.text().await {
                    Ok(text) => text.trim().to_string(),
                    Err(e) => {
                        warn!(index = index, error = %e, "Failed to read probe response body");
                        String::new()
                    }
                };

                if status == StatusCode::TOO_MANY_REQUESTS {
                    ProbeResult::Blocked {
                        status: status.as_u16(),
                        body,
                        retry_after,
                    }
                } else {
                    ProbeResult::Allowed {
                        status: status.as_u16(),
                        body,
                    }
                }
            }
            Err(e) => ProbeResult::Failed(e.to_string()),
        };
        let elapsed = start.elapsed();

        match &result {
            ProbeResult::Allowed { status, .. } => {
                info!(index = index, status = status, elapsed_ms = elapsed.as_millis() as u64, "Probe allowed")
            }
            ProbeResult::Blocked {
                status,
                retry_after,
                ..
            } => info!(
                index = index,
                status = status,
                retry_after = ?retry_after,
                elapsed_ms = elapsed.as_millis() as u64,
                "Probe blocked"
            ),
            ProbeResult::Failed(error) => {
                warn!(index = index, error = %error, "Probe request failed")
            }
        }

        outcomes.push(ProbeOutcome {
            index,
            result,
            elapsed,
        });

        if index < count && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    Ok(outcomes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_server_is_recorded_not_fatal() {
        // Bind then drop to get a port with nothing listening.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let outcomes = probe(&format!("http://{}/", addr), 2, Duration::from_millis(1))
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].index, 1);
        assert_eq!(outcomes[1].index, 2);
        assert!(outcomes
            .iter()
            .all(|o| matches!(o.result, ProbeResult::Failed(_))));
    }

    #[tokio::test]
    async fn test_zero_count_sends_nothing() {
        let outcomes = probe("http://127.0.0.1:9/", 0, Duration::ZERO).await.unwrap();
        assert!(outcomes.is_empty());
    }
}
