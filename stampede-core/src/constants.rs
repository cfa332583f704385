use std::time::Duration;

/// How often the ramping scheduler re-evaluates its target and admits or retires VUs.
pub const DEFAULT_TICK: Duration = Duration::from_millis(100);

/// Time given to in-flight iterations once a profile's duration has elapsed.
pub const DEFAULT_GRACEFUL_STOP: Duration = Duration::from_secs(30);

/// Time given to a retiring VU to finish its iteration when a ramping target drops.
pub const DEFAULT_GRACEFUL_RAMP_DOWN: Duration = Duration::from_secs(30);

/// Default arrival-rate time unit: `rate` iterations per second.
pub const DEFAULT_TIME_UNIT: Duration = Duration::from_secs(1);

/// Longest a single profile may last, offset and grace periods included.
pub const MAX_PROFILE_SPAN: Duration = Duration::from_secs(365 * 24 * 60 * 60);

pub const ITERATIONS: &str = "iterations";
pub const ITERATIONS_COMPLETED: &str = "iterations_completed";
pub const ITERATIONS_ABORTED: &str = "iterations_aborted";
pub const INTERRUPTED_ITERATIONS: &str = "interrupted_iterations";
pub const DROPPED_ITERATIONS: &str = "dropped_iterations";
pub const ITERATION_DURATION: &str = "iteration_duration";

pub const SCENARIO_SUCCESS: &str = "scenario_success";
pub const SCENARIO_FAILURE: &str = "scenario_failure";

pub const CHECKS_PASSED: &str = "checks_passed";
pub const CHECKS_FAILED: &str = "checks_failed";

pub const VUS: &str = "vus";
pub const VUS_TARGET: &str = "vus_target";
