//! Load-pattern schedulers: they alone decide how many VUs exist and when iterations start.
use crate::collector::MetricCollector;
use crate::context::VuContext;
use crate::http::HttpClient;
use crate::scenario::Scenario;
use crate::stop::{stopped, StopHandle};
use crate::vu::{ScenarioResult, VirtualUser, VuState};
use stampede_core::{LoadProfile, ProfileConfig, ProfileStats};
use std::ops::AddAssign;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, trace, warn};

mod arrival_rate;
mod ramping;

pub use ramping::target_at;

/// Everything a profile needs to create VUs, shared by all profiles of a run.
pub(crate) struct Runner<D, S> {
    pub scenario: Arc<Scenario<D, S>>,
    pub shared: Arc<D>,
    pub client: Arc<dyn HttpClient>,
    pub collector: MetricCollector,
    pub seed: Option<u64>,
    pub stop: StopHandle,
    next_vu: Arc<AtomicU64>,
}

impl<D, S> Clone for Runner<D, S> {
    fn clone(&self) -> Self {
        Self {
            scenario: self.scenario.clone(),
            shared: self.shared.clone(),
            client: self.client.clone(),
            collector: self.collector.clone(),
            seed: self.seed,
            stop: self.stop.clone(),
            next_vu: self.next_vu.clone(),
        }
    }
}

impl<D, S> Runner<D, S>
where
    D: Send + Sync + 'static,
    S: Default + Send + 'static,
{
    pub fn new(
        scenario: Scenario<D, S>,
        shared: Arc<D>,
        client: Arc<dyn HttpClient>,
        collector: MetricCollector,
        seed: Option<u64>,
        stop: StopHandle,
    ) -> Self {
        Self {
            scenario: Arc::new(scenario),
            shared,
            client,
            collector,
            seed,
            stop,
            next_vu: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn new_vu(&self, profile: &str) -> VirtualUser<D, S> {
        let id = self.next_vu.fetch_add(1, Ordering::Relaxed);
        VirtualUser::new(VuContext::new(
            id,
            profile,
            self.shared.clone(),
            self.client.clone(),
            self.collector.clone(),
            self.seed,
        ))
    }
}

/// Per-task count of iteration outcomes, summed into [`ProfileStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct IterationTally {
    pub started: u64,
    pub completed: u64,
    pub aborted: u64,
    pub interrupted: u64,
}

impl IterationTally {
    pub fn record(&mut self, result: &ScenarioResult) {
        self.started += 1;
        match result.status {
            VuState::Completed => self.completed += 1,
            VuState::Aborted => self.aborted += 1,
            VuState::Interrupted => self.interrupted += 1,
            VuState::Init | VuState::Running(_) => {}
        }
    }

    pub fn of(result: &ScenarioResult) -> Self {
        let mut tally = Self::default();
        tally.record(result);
        tally
    }

    pub fn apply(&self, stats: &mut ProfileStats) {
        stats.started += self.started;
        stats.completed += self.completed;
        stats.aborted += self.aborted;
        stats.interrupted += self.interrupted;
    }
}

impl AddAssign for IterationTally {
    fn add_assign(&mut self, rhs: Self) {
        self.started += rhs.started;
        self.completed += rhs.completed;
        self.aborted += rhs.aborted;
        self.interrupted += rhs.interrupted;
    }
}

pub(crate) fn joined(tally: &mut IterationTally, res: Result<IterationTally, JoinError>) {
    match res {
        Ok(t) => *tally += t,
        Err(err) => error!("VU task failed: {err}"),
    }
}

/// Drain every finished task without waiting.
pub(crate) fn reap(tasks: &mut JoinSet<IterationTally>, tally: &mut IterationTally) {
    while let Some(res) = tasks.try_join_next() {
        joined(tally, res);
    }
}

/// Wait for `start_offset`, then drive one profile to the end of its graceful stop.
#[instrument(name = "profile", skip_all, fields(name = %profile.name))]
pub(crate) async fn run_profile<D, S>(runner: Runner<D, S>, profile: ProfileConfig) -> ProfileStats
where
    D: Send + Sync + 'static,
    S: Default + Send + 'static,
{
    let mut stop = runner.stop.subscribe();
    if !profile.start_offset.is_zero() {
        debug!(
            "Waiting {} before starting",
            humantime::format_duration(profile.start_offset)
        );
        tokio::select! {
            _ = tokio::time::sleep(profile.start_offset) => {}
            _ = stopped(&mut stop) => {
                info!("Run stopped before the profile started");
                return ProfileStats::new(&profile.name);
            }
        }
    }

    info!("Starting");
    let start = Instant::now();
    let mut stats = match &profile.profile {
        LoadProfile::RampingVus { start_vus, stages } => {
            ramping::run(&runner, &profile, *start_vus, stages).await
        }
        LoadProfile::ConstantArrivalRate(rate) => {
            arrival_rate::run(&runner, &profile, rate).await
        }
    };
    stats.elapsed = start.elapsed();

    info!(
        started = stats.started,
        completed = stats.completed,
        aborted = stats.aborted,
        interrupted = stats.interrupted,
        dropped = stats.dropped,
        "Finished"
    );
    stats
}

/// Let in-flight iterations finish for up to `grace`, or until the run is stopped.
pub(crate) async fn wind_down(
    tasks: &mut JoinSet<IterationTally>,
    tally: &mut IterationTally,
    grace: Duration,
    stop: &mut watch::Receiver<bool>,
) {
    if tasks.is_empty() {
        return;
    }

    debug!(
        in_flight = tasks.len(),
        "Waiting up to {} for in-flight iterations",
        humantime::format_duration(grace)
    );
    let deadline = tokio::time::sleep(grace);
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            res = tasks.join_next() => match res {
                Some(res) => joined(tally, res),
                None => return,
            },
            _ = &mut deadline => return,
            _ = stopped(stop) => return,
        }
    }
}

/// Wait for every remaining task after the kill signal has gone out.
pub(crate) async fn join_all(tasks: &mut JoinSet<IterationTally>, tally: &mut IterationTally) {
    while let Some(res) = tasks.join_next().await {
        joined(tally, res);
    }
}
