use crate::collector::MetricCollector;
use crate::threshold::evaluate;
use crate::timer::Timer;
use stampede_core::{
    Threshold, Verdict, DROPPED_ITERATIONS, INTERRUPTED_ITERATIONS, ITERATIONS,
    ITERATIONS_ABORTED, ITERATIONS_COMPLETED,
};
use std::time::Duration;
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, trace, warn};

/// Log progress and interim threshold verdicts every `interval` until cancelled.
#[instrument(name = "monitor", skip_all)]
pub(crate) async fn run(collector: MetricCollector, thresholds: Vec<Threshold>, interval: Duration) {
    let mut timer = Timer::new(interval).await;
    debug!("Reporting progress every {timer}");

    loop {
        timer.tick().await;

        let snapshot = collector.snapshot();
        let elapsed = Duration::from_secs(collector.elapsed().as_secs());
        info!(
            elapsed = %humantime::format_duration(elapsed),
            started = snapshot.counter(ITERATIONS),
            completed = snapshot.counter(ITERATIONS_COMPLETED),
            aborted = snapshot.counter(ITERATIONS_ABORTED),
            interrupted = snapshot.counter(INTERRUPTED_ITERATIONS),
            dropped = snapshot.counter(DROPPED_ITERATIONS),
            "Progress"
        );

        for result in evaluate(&thresholds, &snapshot) {
            if result.verdict == Verdict::Fail {
                warn!(
                    "Threshold {} {} currently failing (observed {:?})",
                    result.metric, result.expression, result.observed
                );
            }
        }

        trace!("Next report in {}", humantime::format_duration(timer.interval_dur()));
    }
}
