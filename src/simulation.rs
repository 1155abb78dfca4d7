//! Synthetic load against a limiter.
//!
//! Each simulated client runs as its own task and issues admission checks at
//! a fixed pace, which is how an embedding service would drive the limiter
//! from concurrent request handlers.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use rand::Rng;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{Result, TurnstileError};
use crate::ratelimit::{RateLimiter, GLOBAL_CLIENT_KEY};

/// Shape of a simulated workload.
#[derive(Debug, Clone)]
pub struct SimulationPlan {
    /// Number of concurrent clients
    pub clients: usize,
    /// Checks issued by each client
    pub requests_per_client: usize,
    /// Pause between a client's checks
    pub interval: Duration,
    /// Upper bound of random extra delay added to each pause
    pub jitter: Duration,
    /// Client keys are `<prefix>-<n>`
    pub key_prefix: String,
    /// Send every check through the shared global budget instead
    pub use_global_key: bool,
}

impl Default for SimulationPlan {
    fn default() -> Self {
        Self {
            clients: 4,
            requests_per_client: 20,
            interval: Duration::from_millis(50),
            jitter: Duration::ZERO,
            key_prefix: "client".to_string(),
            use_global_key: false,
        }
    }
}

impl SimulationPlan {
    fn client_key(&self, index: usize) -> String {
        if self.use_global_key {
            GLOBAL_CLIENT_KEY.to_string()
        } else {
            format!("{}-{}", self.key_prefix, index)
        }
    }
}

/// Outcome for one simulated client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientReport {
    pub client: String,
    pub admitted: usize,
    pub rejected: usize,
}

/// Outcome of a whole run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SimulationReport {
    pub policy: String,
    pub admitted: usize,
    pub rejected: usize,
    pub tracked_clients: usize,
    pub clients: Vec<ClientReport>,
}

/// Drive `limiter` with the workload described by `plan`.
pub async fn run(limiter: Arc<dyn RateLimiter>, plan: &SimulationPlan) -> Result<SimulationReport> {
    info!(
        policy = %limiter.policy(),
        clients = plan.clients,
        requests_per_client = plan.requests_per_client,
        "Starting simulation"
    );

    let tasks = (0..plan.clients).map(|index| {
        let limiter = Arc::clone(&limiter);
        let key = plan.client_key(index);
        let requests = plan.requests_per_client;
        let interval = plan.interval;
        let jitter = plan.jitter;

        tokio::spawn(async move {
            let mut report = ClientReport {
                client: key,
                admitted: 0,
                rejected: 0,
            };

            for attempt in 0..requests {
                if limiter.is_request_allowed(&report.client)? {
                    report.admitted += 1;
                } else {
                    report.rejected += 1;
                }

                if attempt + 1 < requests {
                    tokio::time::sleep(interval + random_jitter(jitter)).await;
                }
            }

            debug!(
                client = %report.client,
                admitted = report.admitted,
                rejected = report.rejected,
                "Simulated client finished"
            );
            Ok::<_, TurnstileError>(report)
        })
    });

    let mut clients = Vec::with_capacity(plan.clients);
    for outcome in join_all(tasks).await {
        clients.push(outcome??);
    }

    let admitted: usize = clients.iter().map(|c| c.admitted).sum();
    let rejected: usize = clients.iter().map(|c| c.rejected).sum();
    info!(admitted = admitted, rejected = rejected, "Simulation finished");

    Ok(SimulationReport {
        policy: limiter.policy().to_string(),
        admitted,
        rejected,
        tracked_clients: limiter.client_count(),
        clients,
    })
}

fn random_jitter(max: Duration) -> Duration {
    if max.is_zero() {
        return Duration::ZERO;
    }
    let millis = rand::thread_rng().gen_range(0..=max.as_millis() as u64);
    Duration::from_millis(millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LimiterConfig, SlidingWindowConfig, TokenBucketConfig};
    use crate::ratelimit::build_limiter;

    fn burst_plan(clients: usize, requests: usize) -> SimulationPlan {
        SimulationPlan {
            clients,
            requests_per_client: requests,
            interval: Duration::ZERO,
            ..SimulationPlan::default()
        }
    }

    #[tokio::test]
    async fn test_each_client_gets_its_own_budget() {
        let limiter = build_limiter(&LimiterConfig::SlidingWindow(SlidingWindowConfig::new(
            60_000, 5,
        )))
        .unwrap();

        let report = run(limiter, &burst_plan(3, 8)).await.unwrap();

        assert_eq!(report.policy, "sliding_window");
        assert_eq!(report.tracked_clients, 3);
        assert_eq!(report.admitted, 15);
        assert_eq!(report.rejected, 9);
        for client in &report.clients {
            assert_eq!(client.admitted, 5);
            assert_eq!(client.rejected, 3);
        }
    }

    #[tokio::test]
    async fn test_global_key_shares_one_budget() {
        let limiter = build_limiter(&LimiterConfig::TokenBucket(TokenBucketConfig::new(
            10, 60_000,
        )))
        .unwrap();
        let plan = SimulationPlan {
            use_global_key: true,
            ..burst_plan(4, 5)
        };

        let report = run(limiter, &plan).await.unwrap();

        assert_eq!(report.tracked_clients, 1);
        assert_eq!(report.admitted, 10);
        assert_eq!(report.rejected, 10);
        assert!(report.clients.iter().all(|c| c.client == GLOBAL_CLIENT_KEY));
    }

    #[tokio::test]
    async fn test_empty_prefix_still_yields_valid_keys() {
        let limiter =
            build_limiter(&LimiterConfig::TokenBucket(TokenBucketConfig::default())).unwrap();
        let plan = SimulationPlan {
            key_prefix: String::new(),
            ..burst_plan(2, 1)
        };

        let report = run(limiter, &plan).await.unwrap();
        assert_eq!(report.clients[0].client, "-0");
        assert_eq!(report.clients[1].client, "-1");
        assert_eq!(report.admitted, 2);
    }

    #[test]
    fn test_report_serializes_to_json() {
        let report = SimulationReport {
            policy: "token_bucket".to_string(),
            admitted: 1,
            rejected: 0,
            tracked_clients: 1,
            clients: vec![ClientReport {
                client: "a".to_string(),
                admitted: 1,
                rejected: 0,
            }],
        };

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["policy"], "token_bucket");
        assert_eq!(json["clients"][0]["client"], "a");
    }

    #[test]
    fn test_random_jitter_stays_in_bounds() {
        assert_eq!(random_jitter(Duration::ZERO), Duration::ZERO);
        for _ in 0..100 {
            assert!(random_jitter(Duration::from_millis(5)) <= Duration::from_millis(5));
        }
    }
}
