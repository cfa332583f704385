use crate::context::VuContext;
use crate::scenario::Scenario;
use crate::step::{CheckResult, Flow};
use stampede_core::ITERATIONS;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
#[allow(unused_imports)]
use tracing::{debug, error, info, trace, warn};

/// Lifecycle of one VU iteration: `Init -> Running(step) -> {Completed | Aborted | Interrupted}`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VuState {
    Init,
    Running(usize),
    Completed,
    Aborted,
    /// Killed by the scheduler (graceful period over, or the run was stopped).
    Interrupted,
}

/// Instruction from the scheduler to a VU.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VuSignal {
    Run,
    /// Finish the current iteration, then stop.
    Retire,
    /// Stop now; the current iteration is interrupted.
    Kill,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StepRecord {
    pub step: String,
    pub success: bool,
    pub duration: Duration,
    pub checks: Vec<CheckResult>,
    pub error: Option<String>,
}

/// Terminal record of one iteration, emitted exactly once.
#[derive(Clone, Debug, PartialEq)]
pub struct ScenarioResult {
    pub vu: u64,
    pub iteration: u64,
    pub profile: String,
    pub status: VuState,
    pub success: bool,
    pub steps: Vec<StepRecord>,
    pub elapsed: Duration,
}

pub struct VirtualUser<D, S> {
    state: VuState,
    ctx: VuContext<D, S>,
}

impl<D, S> VirtualUser<D, S>
where
    D: Send + Sync,
    S: Default + Send,
{
    pub fn new(ctx: VuContext<D, S>) -> Self {
        Self {
            state: VuState::Init,
            ctx,
        }
    }

    pub fn id(&self) -> u64 {
        self.ctx.vu
    }

    pub fn state(&self) -> VuState {
        self.state
    }

    pub fn context(&self) -> &VuContext<D, S> {
        &self.ctx
    }

    /// Run `scenario` once from a fresh iteration state.
    ///
    /// Steps run in order and are never retried. A `Kill` on `signal` interrupts whatever step is
    /// in flight. The result is also folded into the collector.
    pub async fn run_iteration(
        &mut self,
        scenario: &Scenario<D, S>,
        signal: &mut watch::Receiver<VuSignal>,
    ) -> ScenarioResult {
        self.state = VuState::Init;
        self.ctx.state = S::default();
        self.ctx.collector().increment(ITERATIONS, 1);

        let started = Instant::now();
        let mut steps = Vec::with_capacity(scenario.len());
        let mut status = VuState::Completed;

        for (index, step) in scenario.steps().iter().enumerate() {
            self.state = VuState::Running(index);

            let outcome = tokio::select! {
                biased;
                _ = killed(signal) => None,
                outcome = step.execute(&mut self.ctx) => Some(outcome),
            };

            let Some(outcome) = outcome else {
                debug!(vu = self.ctx.vu, step = step.name(), "Iteration interrupted");
                status = VuState::Interrupted;
                break;
            };

            let flow = outcome.flow;
            steps.push(StepRecord {
                step: outcome.step,
                success: outcome.success,
                duration: outcome.duration,
                checks: outcome.checks,
                error: outcome.error.map(|e| e.to_string()),
            });

            match flow {
                Flow::Continue => {}
                Flow::Stop => break,
                Flow::Abort => {
                    status = VuState::Aborted;
                    break;
                }
            }
        }

        self.state = status;
        let result = ScenarioResult {
            vu: self.ctx.vu,
            iteration: self.ctx.iteration,
            profile: self.ctx.profile.clone(),
            status,
            success: status == VuState::Completed && steps.iter().all(|s| s.success),
            steps,
            elapsed: started.elapsed(),
        };
        self.ctx.iteration += 1;

        trace!(
            vu = result.vu,
            iteration = result.iteration,
            "Iteration finished: {:?}",
            result.status
        );
        self.ctx.collector().record_result(&result);
        result
    }
}

/// Resolves once the scheduler sends `Kill`. A closed channel never resolves.
pub(crate) async fn killed(signal: &mut watch::Receiver<VuSignal>) {
    loop {
        if *signal.borrow_and_update() == VuSignal::Kill {
            return;
        }
        if signal.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
