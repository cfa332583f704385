use super::{join_all, reap, wind_down, IterationTally, Runner};
use crate::stop::stopped;
use crate::vu::{VirtualUser, VuSignal};
use stampede_core::{ArrivalRate, ProfileConfig, ProfileStats, DROPPED_ITERATIONS, VUS};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::Instant;
#[allow(unused_imports)]
use tracing::{debug, error, info, trace, warn};

/// Start `rate` iterations per `time_unit`, evenly spaced over the profile's duration, regardless
/// of how long each iteration takes.
///
/// Each start borrows an idle VU, allocating a new one while fewer than `max_concurrency` exist.
/// When every VU is busy and none may be added, the start is dropped and counted.
pub(super) async fn run<D, S>(
    runner: &Runner<D, S>,
    profile: &ProfileConfig,
    rate: &ArrivalRate,
) -> ProfileStats
where
    D: Send + Sync + 'static,
    S: Default + Send + 'static,
{
    let requested = rate.requested();
    let mut stats = ProfileStats {
        requested: Some(requested),
        ..ProfileStats::new(&profile.name)
    };
    let mut stop = runner.stop.subscribe();
    let (kill_tx, kill_rx) = watch::channel(VuSignal::Run);
    let (idle_tx, mut idle_rx) = mpsc::unbounded_channel::<VirtualUser<D, S>>();

    let mut idle: Vec<_> = (0..rate.pre_allocated)
        .map(|_| runner.new_vu(&profile.name))
        .collect();
    let mut allocated = rate.pre_allocated;
    let mut tasks = JoinSet::new();
    let mut tally = IterationTally::default();

    debug!(
        requested,
        pre_allocated = rate.pre_allocated,
        max = rate.max_concurrency,
        "Scheduling arrivals"
    );

    let start = Instant::now();
    for i in 0..requested {
        tokio::select! {
            _ = tokio::time::sleep_until(start + rate.nth_start(i)) => {}
            _ = stopped(&mut stop) => break,
        }

        while let Ok(vu) = idle_rx.try_recv() {
            idle.push(vu);
        }
        reap(&mut tasks, &mut tally);

        let mut vu = match idle.pop() {
            Some(vu) => vu,
            None if allocated < rate.max_concurrency => {
                allocated += 1;
                debug!(allocated, "All VUs busy, allocating another");
                runner.new_vu(&profile.name)
            }
            None => {
                trace!(iteration = i, "All {allocated} VUs busy, dropping iteration");
                stats.dropped += 1;
                runner.collector.increment(DROPPED_ITERATIONS, 1);
                continue;
            }
        };

        let busy = (allocated as usize).saturating_sub(idle.len());
        stats.peak_vus = stats.peak_vus.max(busy as u64);
        runner.collector.record_sample(VUS, busy as f64);

        let scenario = runner.scenario.clone();
        let idle_tx = idle_tx.clone();
        let mut signal = kill_rx.clone();
        tasks.spawn(async move {
            let result = vu.run_iteration(&scenario, &mut signal).await;
            let _ = idle_tx.send(vu);
            IterationTally::of(&result)
        });
    }

    // Admission ends with the profile's duration, not with its last scheduled start.
    if !runner.stop.is_stopped() {
        tokio::select! {
            _ = tokio::time::sleep_until(start + rate.duration) => {}
            _ = stopped(&mut stop) => {}
        }
    }

    let grace = if runner.stop.is_stopped() {
        Duration::ZERO
    } else {
        profile.graceful_stop
    };
    wind_down(&mut tasks, &mut tally, grace, &mut stop).await;
    kill_tx.send_replace(VuSignal::Kill);
    join_all(&mut tasks, &mut tally).await;

    tally.apply(&mut stats);
    stats
}
