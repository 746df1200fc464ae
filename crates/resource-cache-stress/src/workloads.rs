use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use rand::Rng;
use resource_cache::{AsyncResourceCache, RequestOptions, RequestState};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct WorkloadsConfig {
    pub workloads: Vec<Workload>,
}

impl WorkloadsConfig {
    pub fn get(path: &Path) -> Result<Self> {
        let file = fs::File::open(path).context("failed to open workloads file")?;
        let config: Self =
            serde_yaml::from_reader(file).context("failed to parse workloads YAML")?;
        for (i, workload) in config.workloads.iter().enumerate() {
            workload
                .validate()
                .with_context(|| format!("invalid workload {i}"))?;
        }
        Ok(config)
    }
}

/// A synthetic load pattern run against one cache.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Workload {
    /// Maximum number of requests in flight at once.
    pub concurrency: usize,
    /// Requests pick their key uniformly from `key-0` to `key-{keys - 1}`.
    pub keys: usize,
    /// Simulated producer latency.
    #[serde(with = "humantime_serde")]
    pub latency: Duration,
    /// Probability that a single producer attempt fails.
    pub failure_rate: f64,
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    pub max_retries: u32,
    #[serde(with = "humantime_serde")]
    pub retry_backoff_base: Duration,
    /// Probability that a request is cancelled before it finishes.
    pub cancel_rate: f64,
}

impl Default for Workload {
    fn default() -> Self {
        let options = RequestOptions::default();
        Self {
            concurrency: 16,
            keys: 100,
            latency: Duration::from_millis(20),
            failure_rate: 0.0,
            ttl: options.ttl,
            max_retries: options.max_retries,
            retry_backoff_base: options.retry_backoff_base,
            cancel_rate: 0.0,
        }
    }
}

impl Workload {
    fn validate(&self) -> Result<()> {
        ensure!(self.concurrency > 0, "concurrency must be positive");
        ensure!(self.keys > 0, "keys must be positive");
        ensure!(
            (0.0..=1.0).contains(&self.failure_rate),
            "failure_rate must be between 0 and 1"
        );
        ensure!(
            (0.0..=1.0).contains(&self.cancel_rate),
            "cancel_rate must be between 0 and 1"
        );
        self.options().validate()?;
        Ok(())
    }

    pub fn options(&self) -> RequestOptions {
        RequestOptions::default()
            .with_ttl(self.ttl)
            .with_max_retries(self.max_retries)
            .with_retry_backoff_base(self.retry_backoff_base)
    }
}

/// How a single request of a workload ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Hit,
    Fetched,
    Failed,
    Cancelled,
}

/// Outcome counters of a workload, shared between all of its requests.
#[derive(Debug, Default)]
pub struct WorkloadStats {
    hits: AtomicUsize,
    fetched: AtomicUsize,
    failed: AtomicUsize,
    cancelled: AtomicUsize,
    /// Number of producer invocations, including retries.
    producer_calls: AtomicUsize,
}

impl WorkloadStats {
    fn record(&self, outcome: Outcome) {
        let counter = match outcome {
            Outcome::Hit => &self.hits,
            Outcome::Fetched => &self.fetched,
            Outcome::Failed => &self.failed,
            Outcome::Cancelled => &self.cancelled,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn producer_calls(&self) -> usize {
        self.producer_calls.load(Ordering::Relaxed)
    }

    pub fn summary(&self) -> String {
        format!(
            "hits: {}; fetched: {}; failed: {}; cancelled: {}",
            self.hits.load(Ordering::Relaxed),
            self.fetched.load(Ordering::Relaxed),
            self.failed.load(Ordering::Relaxed),
            self.cancelled.load(Ordering::Relaxed),
        )
    }
}

/// Issues one request of `workload` and waits for it, or cancels it early.
///
/// The outcome is recorded in `stats` before it is returned.
pub async fn process_request(
    cache: &AsyncResourceCache<String>,
    workload: &Workload,
    stats: &Arc<WorkloadStats>,
) -> Outcome {
    // `ThreadRng` must not be held across an await point
    let (key, cancel) = {
        let mut rng = rand::rng();
        let key = format!("key-{}", rng.random_range(0..workload.keys));
        (key, rng.random_bool(workload.cancel_rate))
    };

    let producer = {
        let stats = Arc::clone(stats);
        let latency = workload.latency;
        let failure_rate = workload.failure_rate;
        let key = key.clone();
        move || {
            stats.producer_calls.fetch_add(1, Ordering::Relaxed);
            let fail = rand::rng().random_bool(failure_rate);
            let key = key.clone();
            async move {
                tokio::time::sleep(latency).await;
                if fail {
                    Err(format!("simulated failure fetching {key}"))
                } else {
                    Ok(format!("value of {key}"))
                }
            }
        }
    };

    let mut subscription = match cache.request(&key, producer, workload.options()) {
        Ok(subscription) => subscription,
        Err(error) => {
            tracing::error!(%error, "Invalid request");
            stats.record(Outcome::Failed);
            return Outcome::Failed;
        }
    };

    let state = if cancel {
        match tokio::time::timeout(workload.latency / 2, subscription.wait()).await {
            Ok(state) => state,
            Err(_) => {
                subscription.cancel();
                subscription.state()
            }
        }
    } else {
        subscription.wait().await
    };

    let outcome = match state {
        RequestState::Success {
            from_cache: true, ..
        } => Outcome::Hit,
        RequestState::Success { .. } => Outcome::Fetched,
        RequestState::Failed(_) => Outcome::Failed,
        RequestState::Idle | RequestState::Loading | RequestState::Cancelled => {
            Outcome::Cancelled
        }
    };
    stats.record(outcome);
    outcome
}
