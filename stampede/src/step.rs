//! Scenario steps: HTTP calls, think-time pauses and local computations.
use crate::context::VuContext;
use crate::error::StepError;
use crate::http::{HttpRequest, HttpResponse};
use futures_util::future::BoxFuture;
use rand::Rng;
use stampede_core::{CHECKS_FAILED, CHECKS_PASSED};
use std::time::Duration;
use tokio::time::Instant;
#[allow(unused_imports)]
use tracing::{debug, error, info, trace, warn};

/// What the runner should do after a step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// End the iteration early as Completed.
    Stop,
    /// End the iteration as Aborted.
    Abort,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckResult {
    pub name: String,
    pub passed: bool,
}

#[derive(Debug)]
pub struct StepOutcome {
    pub step: String,
    pub success: bool,
    pub duration: Duration,
    pub checks: Vec<CheckResult>,
    pub flow: Flow,
    pub error: Option<StepError>,
    pub response: Option<HttpResponse>,
}

impl StepOutcome {
    pub fn new(step: &str) -> Self {
        Self {
            step: step.to_string(),
            success: true,
            duration: Duration::ZERO,
            checks: vec![],
            flow: Flow::Continue,
            error: None,
            response: None,
        }
    }

    pub fn failed(mut self, error: StepError, flow: Flow) -> Self {
        self.success = false;
        self.error = Some(error);
        self.flow = flow;
        self
    }
}

pub trait Step<D, S>: Send + Sync {
    fn name(&self) -> &str;

    fn execute<'a>(&'a self, ctx: &'a mut VuContext<D, S>) -> BoxFuture<'a, StepOutcome>;
}

/// A named predicate over a response. A failing check marks the step failed but never throws.
pub struct Check {
    name: String,
    predicate: Box<dyn Fn(&HttpResponse) -> bool + Send + Sync>,
}

impl Check {
    pub fn new<F>(name: &str, predicate: F) -> Self
    where
        F: Fn(&HttpResponse) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            predicate: Box::new(predicate),
        }
    }

    pub fn status(expected: u16) -> Self {
        Self::new(&format!("status is {expected}"), move |res| {
            res.status == expected
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn passes(&self, response: &HttpResponse) -> bool {
        (self.predicate)(response)
    }
}

type RequestFn<D, S> =
    Box<dyn Fn(&mut VuContext<D, S>) -> Result<HttpRequest, StepError> + Send + Sync>;
type ResponseFn<D, S> =
    Box<dyn Fn(&mut VuContext<D, S>, &HttpResponse) -> Result<Flow, StepError> + Send + Sync>;

/// An HTTP call whose duration is recorded (in milliseconds) to `metric`.
///
/// The request is built from the VU context, the checks run against the response, and when they
/// all pass the response handler may fold the body back into the context or end the iteration.
/// A handler error (for example a body that does not decode) aborts the iteration.
pub struct Http<D, S> {
    name: String,
    metric: String,
    request: RequestFn<D, S>,
    checks: Vec<Check>,
    on_response: Option<ResponseFn<D, S>>,
    fatal: bool,
}

impl<D, S> Http<D, S> {
    pub fn new<F>(name: &str, metric: &str, request: F) -> Self
    where
        F: Fn(&mut VuContext<D, S>) -> Result<HttpRequest, StepError> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            metric: metric.to_string(),
            request: Box::new(request),
            checks: vec![],
            on_response: None,
            fatal: false,
        }
    }

    pub fn check(mut self, check: Check) -> Self {
        self.checks.push(check);
        self
    }

    pub fn on_response<F>(mut self, handler: F) -> Self
    where
        F: Fn(&mut VuContext<D, S>, &HttpResponse) -> Result<Flow, StepError>
            + Send
            + Sync
            + 'static,
    {
        self.on_response = Some(Box::new(handler));
        self
    }

    /// A failed check or transport error on this step aborts the iteration.
    pub fn fatal(mut self) -> Self {
        self.fatal = true;
        self
    }

    pub fn metric(&self) -> &str {
        &self.metric
    }

    fn failure_flow(&self) -> Flow {
        if self.fatal {
            Flow::Abort
        } else {
            Flow::Continue
        }
    }
}

impl<D, S> Step<D, S> for Http<D, S>
where
    D: Send + Sync,
    S: Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn execute<'a>(&'a self, ctx: &'a mut VuContext<D, S>) -> BoxFuture<'a, StepOutcome> {
        Box::pin(async move {
            let outcome = StepOutcome::new(&self.name);

            let request = match (self.request)(ctx) {
                Ok(request) => request,
                Err(err) => {
                    debug!(step = %self.name, "Request not sent: {err}");
                    return outcome.failed(err, Flow::Abort);
                }
            };

            trace!(step = %self.name, "{} {}", request.method, request.url);
            let client = ctx.client();
            let started = Instant::now();
            let result = client.send(request).await;
            let duration = started.elapsed();

            let collector = ctx.collector().clone();
            let mut outcome = StepOutcome {
                duration,
                ..outcome
            };

            let response = match result {
                Ok(response) => response,
                Err(err) => {
                    debug!(step = %self.name, "Transport error: {err}");
                    for check in &self.checks {
                        collector.increment(CHECKS_FAILED, 1);
                        outcome.checks.push(CheckResult {
                            name: check.name.clone(),
                            passed: false,
                        });
                    }
                    return outcome.failed(StepError::Network(err), self.failure_flow());
                }
            };

            collector.record_duration(&self.metric, duration);

            for check in &self.checks {
                let passed = check.passes(&response);
                collector.increment(if passed { CHECKS_PASSED } else { CHECKS_FAILED }, 1);
                outcome.checks.push(CheckResult {
                    name: check.name.clone(),
                    passed,
                });
            }

            if outcome.checks.iter().any(|c| !c.passed) {
                debug!(step = %self.name, status = response.status, "Check failed");
                let status = response.status;
                outcome.response = Some(response);
                return outcome.failed(StepError::UnexpectedStatus(status), self.failure_flow());
            }

            if let Some(handler) = &self.on_response {
                match handler(ctx, &response) {
                    Ok(flow) => outcome.flow = flow,
                    Err(err) => {
                        if matches!(err, StepError::MalformedResponse { .. }) {
                            warn!(step = %self.name, "JSON parse failed: {err}");
                        } else {
                            debug!(step = %self.name, "{err}");
                        }
                        outcome.response = Some(response);
                        return outcome.failed(err, Flow::Abort);
                    }
                }
            }

            outcome.response = Some(response);
            outcome
        })
    }
}

/// Think time: suspends only the calling VU.
pub struct Sleep {
    name: String,
    min: Duration,
    max: Duration,
}

impl Sleep {
    pub fn fixed(duration: Duration) -> Self {
        Self {
            name: format!("sleep {}", humantime::format_duration(duration)),
            min: duration,
            max: duration,
        }
    }

    /// Pause for a uniformly random duration in `[min, max]`.
    pub fn uniform(min: Duration, max: Duration) -> Self {
        let (min, max) = if min <= max { (min, max) } else { (max, min) };
        Self {
            name: format!(
                "sleep {}..{}",
                humantime::format_duration(min),
                humantime::format_duration(max)
            ),
            min,
            max,
        }
    }
}

impl<D, S> Step<D, S> for Sleep
where
    D: Send + Sync,
    S: Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn execute<'a>(&'a self, ctx: &'a mut VuContext<D, S>) -> BoxFuture<'a, StepOutcome> {
        Box::pin(async move {
            let pause = if self.max > self.min {
                ctx.rng.gen_range(self.min..=self.max)
            } else {
                self.min
            };
            if !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }

            StepOutcome {
                duration: pause,
                ..StepOutcome::new(&self.name)
            }
        })
    }
}

type ComputeFn<D, S> = Box<dyn Fn(&mut VuContext<D, S>) -> Result<Flow, StepError> + Send + Sync>;

/// Local work on the VU context: derive data for later steps or branch on earlier results.
pub struct Compute<D, S> {
    name: String,
    f: ComputeFn<D, S>,
}

impl<D, S> Compute<D, S> {
    pub fn new<F>(name: &str, f: F) -> Self
    where
        F: Fn(&mut VuContext<D, S>) -> Result<Flow, StepError> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            f: Box::new(f),
        }
    }
}

impl<D, S> Step<D, S> for Compute<D, S>
where
    D: Send + Sync,
    S: Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn execute<'a>(&'a self, ctx: &'a mut VuContext<D, S>) -> BoxFuture<'a, StepOutcome> {
        Box::pin(async move {
            let started = Instant::now();
            let result = (self.f)(ctx);
            let outcome = StepOutcome {
                duration: started.elapsed(),
                ..StepOutcome::new(&self.name)
            };

            match result {
                Ok(flow) => StepOutcome { flow, ..outcome },
                Err(err) => {
                    debug!(step = %self.name, "{err}");
                    outcome.failed(err, Flow::Abort)
                }
            }
        })
    }
}
