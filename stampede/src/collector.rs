use crate::vu::{ScenarioResult, VuState};
use metrics_util::AtomicBucket;
use stampede_core::{
    SampleSet, Snapshot, ITERATIONS_ABORTED, ITERATIONS_COMPLETED, ITERATION_DURATION,
    INTERRUPTED_ITERATIONS, SCENARIO_FAILURE, SCENARIO_SUCCESS,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::time::Instant;
#[allow(unused_imports)]
use tracing::{debug, error, info, trace, warn};

/// One recorded value and when it was recorded, relative to the collector's creation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MetricSample {
    pub value: f64,
    pub at: Duration,
}

/// Run-wide accumulator of trend samples and counters.
///
/// Cloning is cheap and every clone writes to the same storage. Writers never block each other
/// once a metric exists: samples go to a lock-free bucket and counters are atomics. The map
/// locks are only taken for writing the first time a name is seen.
#[derive(Clone)]
pub struct MetricCollector {
    inner: Arc<Inner>,
}

struct Inner {
    started: Instant,
    trends: RwLock<HashMap<String, Arc<AtomicBucket<MetricSample>>>>,
    counters: RwLock<HashMap<String, Arc<AtomicU64>>>,
}

impl Default for MetricCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricCollector {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                started: Instant::now(),
                trends: RwLock::new(HashMap::new()),
                counters: RwLock::new(HashMap::new()),
            }),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.inner.started.elapsed()
    }

    pub fn record_sample(&self, name: &str, value: f64) {
        self.bucket(name).push(MetricSample {
            value,
            at: self.elapsed(),
        });

        #[cfg(feature = "metrics")]
        metrics::histogram!(name.to_string()).record(value);
    }

    /// Durations are stored in milliseconds.
    pub fn record_duration(&self, name: &str, duration: Duration) {
        self.record_sample(name, duration.as_secs_f64() * 1_000.);
    }

    pub fn increment(&self, name: &str, delta: u64) {
        self.counter_cell(name).fetch_add(delta, Ordering::Relaxed);

        #[cfg(feature = "metrics")]
        metrics::counter!(name.to_string()).increment(delta);
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.inner
            .counters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn samples(&self, name: &str) -> Vec<MetricSample> {
        let bucket = self
            .inner
            .trends
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned();

        let mut samples = vec![];
        if let Some(bucket) = bucket {
            bucket.data_with(|block| samples.extend_from_slice(block));
        }
        samples.sort_by(|a, b| a.at.cmp(&b.at));
        samples
    }

    /// Fold one finished iteration into the engine counters.
    pub fn record_result(&self, result: &ScenarioResult) {
        match result.status {
            VuState::Completed => self.increment(ITERATIONS_COMPLETED, 1),
            VuState::Aborted => self.increment(ITERATIONS_ABORTED, 1),
            VuState::Interrupted => {
                self.increment(INTERRUPTED_ITERATIONS, 1);
                return;
            }
            VuState::Init | VuState::Running(_) => {
                warn!(
                    "Iteration {} of VU {} reported while still {:?}",
                    result.iteration, result.vu, result.status
                );
                return;
            }
        }

        self.record_duration(ITERATION_DURATION, result.elapsed);
        if result.success {
            self.increment(SCENARIO_SUCCESS, 1);
        } else {
            self.increment(SCENARIO_FAILURE, 1);
        }
    }

    /// Copy out everything recorded so far. Taken after every VU has stopped, this is exact.
    pub fn snapshot(&self) -> Snapshot {
        let buckets: Vec<_> = self
            .inner
            .trends
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, bucket)| (name.clone(), bucket.clone()))
            .collect();

        let trends = buckets
            .into_iter()
            .map(|(name, bucket)| {
                let mut set = SampleSet::new();
                bucket.data_with(|block| set.extend(block.iter().map(|s| s.value)));
                (name, set)
            })
            .collect();

        let counters = self
            .inner
            .counters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, c)| (name.clone(), c.load(Ordering::Relaxed)))
            .collect();

        Snapshot { trends, counters }
    }

    fn bucket(&self, name: &str) -> Arc<AtomicBucket<MetricSample>> {
        if let Some(bucket) = self
            .inner
            .trends
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
        {
            return bucket.clone();
        }

        self.inner
            .trends
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(AtomicBucket::new()))
            .clone()
    }

    fn counter_cell(&self, name: &str) -> Arc<AtomicU64> {
        if let Some(counter) = self
            .inner
            .counters
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
        {
            return counter.clone();
        }

        self.inner
            .counters
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(AtomicU64::new(0)))
            .clone()
    }
}
