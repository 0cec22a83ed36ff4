// crates/sentinel-worker/src/scheduler.rs
// ============================================================================
// Module: Worker Scheduler
// Description: Fans a job's regions out across a bounded pool of concurrent
// tasks.
// Purpose: Implement the "parallel across regions, bounded pool" scheduling
// model without spawning one OS thread per region.
// Dependencies: sentinel-core, sentinel-rules, tokio, tokio-util
// ============================================================================

//! ## Overview
//! [`run_job`] spawns one async task per region behind a
//! [`tokio::sync::Semaphore`] sized `min(tenant_regions, cpu*2)`, mirroring
//! `spec.md` §4.6's per-region subprocess/goroutine model while staying
//! in-process. Each task runs its own [`RegionPipeline`]; every region shares
//! the same [`CancellationToken`] so a job-level `terminate` stops every
//! region at its next suspension point.

use std::sync::Arc;

use sentinel_core::CloudProvider;
use sentinel_core::JobStatistics;
use sentinel_core::Rule;
use sentinel_core::Timestamp;
use sentinel_credentials::ResolvedCredentials;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::pipeline::PipelineConfig;
use crate::pipeline::RegionOutcome;
use crate::pipeline::RegionPipeline;
use crate::provider::CloudResourceProvider;

/// Picks the pool size for a job's region fan-out: never more regions than
/// requested, never more than `cpu_count * 2` concurrent tasks.
#[must_use]
pub fn pool_size(region_count: usize, cpu_count: usize) -> usize {
    region_count.min(cpu_count.saturating_mul(2)).max(1)
}

/// Runs every region in `regions` against `rules`, bounded by a semaphore
/// sized via [`pool_size`], and merges their [`JobStatistics`].
pub async fn run_job<P: CloudResourceProvider + 'static>(
    provider: Arc<P>,
    cloud: CloudProvider,
    regions: &[String],
    rules: Arc<Vec<Rule>>,
    credentials: Arc<ResolvedCredentials>,
    cancellation: CancellationToken,
    config: PipelineConfig,
    now: Timestamp,
) -> Vec<RegionOutcome> {
    let cpu_count = std::thread::available_parallelism().map_or(1, std::num::NonZero::get);
    let semaphore = Arc::new(Semaphore::new(pool_size(regions.len(), cpu_count)));

    let mut handles = Vec::with_capacity(regions.len());
    for region in regions {
        let provider = Arc::clone(&provider);
        let rules = Arc::clone(&rules);
        let credentials = Arc::clone(&credentials);
        let cancellation = cancellation.clone();
        let semaphore = Arc::clone(&semaphore);
        let region = region.clone();
        handles.push(tokio::spawn(async move {
            let Ok(permit) = semaphore.acquire_owned().await else {
                return None;
            };
            let pipeline = RegionPipeline::new(provider.as_ref(), config);
            let outcome = pipeline.run(cloud, &region, &rules, &credentials, &cancellation, now).await;
            drop(permit);
            Some(outcome)
        }));
    }

    let mut outcomes = Vec::with_capacity(handles.len());
    for handle in handles {
        if let Ok(Some(outcome)) = handle.await {
            outcomes.push(outcome);
        }
    }
    outcomes
}

/// Merges every region's statistics into one job-level aggregate.
#[must_use]
pub fn aggregate_statistics(outcomes: &[RegionOutcome]) -> JobStatistics {
    let mut aggregate = JobStatistics::default();
    for outcome in outcomes {
        aggregate.accumulate(outcome.statistics);
    }
    aggregate
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_size_never_exceeds_region_count() {
        assert_eq!(pool_size(3, 16), 3);
    }

    #[test]
    fn pool_size_is_bounded_by_cpu_count() {
        assert_eq!(pool_size(64, 2), 4);
    }

    #[test]
    fn pool_size_is_never_zero() {
        assert_eq!(pool_size(0, 4), 1);
    }
}
