use super::{join_all, reap, wind_down, IterationTally, Runner};
use crate::scenario::Scenario;
use crate::stop::stopped;
use crate::timer::Timer;
use crate::vu::{VirtualUser, VuSignal, VuState};
use stampede_core::{ProfileConfig, ProfileStats, Stage, DEFAULT_TICK, VUS, VUS_TARGET};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::Instant;
#[allow(unused_imports)]
use tracing::{debug, error, info, trace, warn};

/// Interpolated VU target `elapsed` into a ramping profile, or `None` once every stage is over.
///
/// Each stage moves linearly from the previous target (`start_vus` for the first stage) to its
/// own target. A zero-length stage jumps straight to its target.
pub fn target_at(start_vus: u32, stages: &[Stage], elapsed: Duration) -> Option<f64> {
    let mut from = f64::from(start_vus);
    let mut stage_start = Duration::ZERO;

    for stage in stages {
        let stage_end = stage_start.saturating_add(stage.duration);
        if elapsed < stage_end {
            let progress = (elapsed - stage_start).as_secs_f64() / stage.duration.as_secs_f64();
            let to = f64::from(stage.target);
            return Some(from + (to - from) * progress);
        }
        from = f64::from(stage.target);
        stage_start = stage_end;
    }

    None
}

/// Run one VU until it is told to stop, one iteration after another.
async fn vu_loop<D, S>(
    mut vu: VirtualUser<D, S>,
    scenario: Arc<Scenario<D, S>>,
    mut signal: watch::Receiver<VuSignal>,
) -> IterationTally
where
    D: Send + Sync,
    S: Default + Send,
{
    let mut tally = IterationTally::default();
    while *signal.borrow() == VuSignal::Run {
        let result = vu.run_iteration(&scenario, &mut signal).await;
        tally.record(&result);
        if result.status == VuState::Interrupted {
            break;
        }
        tokio::task::yield_now().await;
    }
    trace!(vu = vu.id(), iterations = tally.started, "VU stopped");
    tally
}

/// Track the interpolated target every tick: admit new VUs while below it, retire the newest
/// ones while above it. A retired VU finishes its iteration unless `graceful_ramp_down` runs out.
pub(super) async fn run<D, S>(
    runner: &Runner<D, S>,
    profile: &ProfileConfig,
    start_vus: u32,
    stages: &[Stage],
) -> ProfileStats
where
    D: Send + Sync + 'static,
    S: Default + Send + 'static,
{
    let mut stats = ProfileStats::new(&profile.name);
    let mut stop = runner.stop.subscribe();
    let mut tasks = JoinSet::new();
    let mut tally = IterationTally::default();
    let mut active: Vec<watch::Sender<VuSignal>> = vec![];
    let mut retiring: Vec<(Instant, watch::Sender<VuSignal>)> = vec![];

    let start = Instant::now();
    let mut timer = Timer::new(DEFAULT_TICK).await;
    trace!("Admission tick every {timer}");

    loop {
        if runner.stop.is_stopped() {
            break;
        }
        let now = Instant::now();
        let Some(target) = target_at(start_vus, stages, now - start) else {
            break;
        };

        reap(&mut tasks, &mut tally);
        retiring.retain(|(deadline, tx)| {
            if tx.is_closed() {
                false
            } else if now >= *deadline {
                debug!("Graceful ramp-down over, interrupting VU");
                tx.send_replace(VuSignal::Kill);
                false
            } else {
                true
            }
        });

        let desired = target.max(0.).floor() as usize;
        if active.len() < desired {
            trace!(from = active.len(), to = desired, "Admitting VUs");
        }
        while active.len() < desired {
            let (tx, rx) = watch::channel(VuSignal::Run);
            let vu = runner.new_vu(&profile.name);
            tasks.spawn(vu_loop(vu, runner.scenario.clone(), rx));
            active.push(tx);
        }
        if active.len() > desired {
            trace!(from = active.len(), to = desired, "Retiring VUs");
            for tx in active.split_off(desired).into_iter().rev() {
                tx.send_replace(VuSignal::Retire);
                retiring.push((now + profile.graceful_ramp_down, tx));
            }
        }

        stats.peak_vus = stats.peak_vus.max(active.len() as u64);
        runner.collector.record_sample(VUS, active.len() as f64);
        runner.collector.record_sample(VUS_TARGET, target);

        tokio::select! {
            _ = timer.tick() => {}
            _ = stopped(&mut stop) => {}
        }
    }

    let forced = runner.stop.is_stopped();
    for tx in &active {
        tx.send_replace(VuSignal::Retire);
    }
    let grace = if forced {
        Duration::ZERO
    } else {
        profile.graceful_stop
    };
    wind_down(&mut tasks, &mut tally, grace, &mut stop).await;

    for tx in active.iter().chain(retiring.iter().map(|(_, tx)| tx)) {
        tx.send_replace(VuSignal::Kill);
    }
    join_all(&mut tasks, &mut tally).await;

    tally.apply(&mut stats);
    stats
}
