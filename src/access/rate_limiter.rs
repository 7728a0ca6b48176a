use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::error::RateLimited;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Rejected { retry_after: Duration },
}

impl Admission {
    pub fn into_result(self) -> Result<(), RateLimited> {
        match self {
            Admission::Admitted => Ok(()),
            Admission::Rejected { retry_after } => Err(RateLimited {
                retry_after_secs: whole_seconds(retry_after),
            }),
        }
    }
}

/// Retry hints are rounded up so a client that waits exactly that long is admitted.
fn whole_seconds(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}

/// Per-client minimum interval between admitted requests.
pub struct RateLimiter {
    interval: Duration,
    last_admitted: Mutex<HashMap<String, Instant>>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_admitted: Mutex::new(HashMap::new()),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub async fn admit(&self, client_id: &str) -> Admission {
        self.admit_at(client_id, Instant::now()).await
    }

    pub async fn admit_at(&self, client_id: &str, now: Instant) -> Admission {
        let mut last_admitted = self.last_admitted.lock().await;

        if let Some(last) = last_admitted.get(client_id) {
            let elapsed = now.saturating_duration_since(*last);
            if elapsed < self.interval {
                let retry_after = self.interval - elapsed;
                tracing::warn!(
                    "Rate limited {}: retry after {:.1}s",
                    client_id,
                    retry_after.as_secs_f64()
                );
                return Admission::Rejected { retry_after };
            }
        }

        last_admitted.insert(client_id.to_string(), now);
        Admission::Admitted
    }

    /// Drop clients whose last admission is older than `max_idle`. Returns how many were removed.
    pub async fn sweep_at(&self, now: Instant, max_idle: Duration) -> usize {
        let mut last_admitted = self.last_admitted.lock().await;
        let before = last_admitted.len();
        last_admitted.retain(|_, last| now.saturating_duration_since(*last) <= max_idle);
        before - last_admitted.len()
    }

    pub async fn tracked_clients(&self) -> usize {
        self.last_admitted.lock().await.len()
    }

    /// Periodically evict idle clients so the map does not grow without bound.
    pub fn spawn_sweeper(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = self.sweep_at(Instant::now(), every).await;
                if removed > 0 {
                    tracing::debug!(
                        "Rate limiter swept {} idle clients, {} remain",
                        removed,
                        self.tracked_clients().await
                    );
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INTERVAL: Duration = Duration::from_secs(2);

    #[tokio::test]
    async fn enforces_minimum_interval() {
        let limiter = RateLimiter::new(INTERVAL);
        let t0 = Instant::now();

        assert_eq!(limiter.admit_at("C", t0).await, Admission::Admitted);
        assert_eq!(
            limiter.admit_at("C", t0 + Duration::from_secs(1)).await,
            Admission::Rejected {
                retry_after: Duration::from_secs(1)
            }
        );
        assert_eq!(
            limiter.admit_at("C", t0 + Duration::from_millis(2500)).await,
            Admission::Admitted
        );
    }

    #[tokio::test]
    async fn rejection_does_not_reset_the_window() {
        let limiter = RateLimiter::new(INTERVAL);
        let t0 = Instant::now();

        limiter.admit_at("C", t0).await;
        limiter.admit_at("C", t0 + Duration::from_millis(1900)).await;
        assert_eq!(
            limiter.admit_at("C", t0 + INTERVAL).await,
            Admission::Admitted
        );
    }

    #[tokio::test]
    async fn clients_are_independent() {
        let limiter = RateLimiter::new(INTERVAL);
        let t0 = Instant::now();

        assert_eq!(limiter.admit_at("a", t0).await, Admission::Admitted);
        assert_eq!(limiter.admit_at("b", t0).await, Admission::Admitted);
        assert!(matches!(
            limiter.admit_at("a", t0).await,
            Admission::Rejected { .. }
        ));
    }

    #[test]
    fn retry_hint_uses_full_duration() {
        let hint = |ms| {
            Admission::Rejected {
                retry_after: Duration::from_millis(ms),
            }
            .into_result()
            .unwrap_err()
            .retry_after_secs
        };
        assert_eq!(hint(1000), 1);
        assert_eq!(hint(1001), 2);
        assert_eq!(hint(100), 1);
        assert!(Admission::Admitted.into_result().is_ok());
    }

    #[tokio::test]
    async fn sweep_removes_idle_clients_only() {
        let limiter = RateLimiter::new(INTERVAL);
        let t0 = Instant::now();

        limiter.admit_at("old", t0).await;
        limiter.admit_at("fresh", t0 + Duration::from_secs(50)).await;

        let removed = limiter
            .sweep_at(t0 + Duration::from_secs(60), Duration::from_secs(30))
            .await;
        assert_eq!(removed, 1);
        assert_eq!(limiter.tracked_clients().await, 1);
        assert!(matches!(
            limiter.admit_at("fresh", t0 + Duration::from_secs(51)).await,
            Admission::Rejected { .. }
        ));
    }

    #[tokio::test]
    async fn concurrent_first_contacts_admit_exactly_once() {
        let limiter = Arc::new(RateLimiter::new(INTERVAL));
        let now = Instant::now();

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move { limiter.admit_at("C", now).await })
            })
            .collect();

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() == Admission::Admitted {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 1);
    }
}
