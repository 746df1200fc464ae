use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use resource_cache::AsyncResourceCache;
use resource_cache::config::{CacheConfig, Config};
use sentry::SentryFutureExt;
use sketches_ddsketch::DDSketch;
use tokio::sync::Semaphore;

use crate::workloads::{Outcome, Workload, WorkloadStats, WorkloadsConfig, process_request};

struct PreparedWorkload {
    workload: Workload,
    cache: AsyncResourceCache<String>,
    stats: Arc<WorkloadStats>,
}

pub async fn perform_stresstest(
    config: Config,
    workloads: WorkloadsConfig,
    duration: Duration,
) -> Result<()> {
    // every workload gets its own cache, so their key spaces and metrics do not overlap
    let workloads: Vec<_> = workloads
        .workloads
        .into_iter()
        .enumerate()
        .map(|(i, workload)| {
            let cache = AsyncResourceCache::new(CacheConfig {
                name: format!("{}-{i}", config.cache.name),
                ..config.cache.clone()
            });
            Arc::new(PreparedWorkload {
                workload,
                cache,
                stats: Default::default(),
            })
        })
        .collect();

    // warmup: run each workload once to make sure the runtime is up
    {
        let start = Instant::now();

        let futures = workloads.iter().map(|prepared| {
            let prepared = Arc::clone(prepared);
            tokio::spawn(async move {
                let PreparedWorkload {
                    workload, cache, ..
                } = &*prepared;
                // the warmup records into throwaway stats, so it does not count towards the results
                process_request(cache, workload, &Default::default()).await;
            })
        });

        let _results = futures::future::join_all(futures).await;

        println!("Warmup: {:?}", start.elapsed());
    };
    println!();

    // run the workloads concurrently
    let mut tasks = Vec::with_capacity(workloads.len());
    for prepared in workloads.into_iter() {
        let start = Instant::now();
        let deadline = tokio::time::Instant::from_std(start + duration);
        let concurrency = prepared.workload.concurrency;

        let task = tokio::spawn(async move {
            let task_durations = Arc::new(Mutex::new(DDSketch::default()));
            let semaphore = Arc::new(Semaphore::new(concurrency));

            // See <https://docs.rs/tokio/latest/tokio/time/struct.Sleep.html#examples>
            let sleep = tokio::time::sleep_until(deadline);
            tokio::pin!(sleep);

            loop {
                if deadline.elapsed() > Duration::ZERO {
                    break;
                }
                tokio::select! {
                    permit = semaphore.clone().acquire_owned() => {
                        let prepared = Arc::clone(&prepared);
                        let task_durations = Arc::clone(&task_durations);
                        let task_start = Instant::now();

                        let hub = sentry::Hub::new_from_top(sentry::Hub::current());
                        let ctx = sentry::TransactionContext::new("stresstest", "stresstest");
                        let transaction = hub.start_transaction(ctx);

                        let future = async move {
                            let outcome = process_request(
                                &prepared.cache,
                                &prepared.workload,
                                &prepared.stats,
                            )
                            .await;

                            transaction.finish();

                            if outcome != Outcome::Cancelled {
                                task_durations
                                    .lock()
                                    .unwrap_or_else(PoisonError::into_inner)
                                    .add(task_start.elapsed().as_secs_f64());
                            }

                            drop(permit);
                        };
                        let future = future.bind_hub(hub);

                        tokio::spawn(future);
                    }
                    _ = &mut sleep => {
                        break;
                    }
                }
            }

            // by acquiring *all* the semaphores, we essentially wait for all outstanding tasks to finish
            let _permits = semaphore.acquire_many(concurrency as u32).await;

            let task_durations: DDSketch = {
                let mut task_durations = task_durations
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                std::mem::take(&mut task_durations)
            };

            (prepared, task_durations)
        });
        tasks.push(task);
    }

    let finished_tasks = futures::future::join_all(tasks).await;

    for (i, task) in finished_tasks.into_iter().enumerate() {
        let (prepared, task_durations) = task.context("workload task panicked")?;
        let concurrency = prepared.workload.concurrency;

        let ops = task_durations.count();
        let ops_ps = ops as f64 / duration.as_secs_f64();
        println!("Workload {i} (concurrency: {concurrency}): {ops} operations, {ops_ps:.2} ops/s");

        if let Some(line) = format_latencies(&task_durations) {
            println!("  {line}");
        }

        let stats = &prepared.stats;
        let calls = stats.producer_calls();
        let calls_per_op = calls as f64 / ops.max(1) as f64;
        println!("  {}", stats.summary());
        println!("  producer invocations: {calls} ({calls_per_op:.2} per request)");
        println!(
            "  cache entries: {}; in flight: {}",
            prepared.cache.entry_count(),
            prepared.cache.in_flight_count()
        );
    }

    Ok(())
}

/// Formats average and percentile latencies, or `None` if nothing was recorded.
fn format_latencies(task_durations: &DDSketch) -> Option<String> {
    let ops = task_durations.count();
    if ops == 0 {
        return None;
    }

    let quantile = |q| {
        let secs = task_durations.quantile(q).ok().flatten()?;
        Some(Duration::from_secs_f64(secs))
    };
    let avg = Duration::from_secs_f64(task_durations.sum()? / ops as f64);
    let p50 = quantile(0.5)?;
    let p90 = quantile(0.9)?;
    let p99 = quantile(0.99)?;
    Some(format!(
        "avg: {avg:.2?}; p50: {p50:.2?}; p90: {p90:.2?}; p99: {p99:.2?}"
    ))
}
