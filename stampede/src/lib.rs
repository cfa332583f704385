#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod collector;
mod context;
mod error;
mod http;
mod monitor;
mod scenario;
mod scheduler;
mod step;
mod stop;
mod threshold;
mod timer;
mod vu;

#[cfg(test)]
pub(crate) mod testing;

pub use collector::{MetricCollector, MetricSample};
pub use context::VuContext;
pub use error::{RunError, StepError, TransportError};
pub use http::{HttpClient, HttpRequest, HttpResponse, Method};
pub use load_test::LoadTest;
pub use scenario::Scenario;
pub use scheduler::target_at;
pub use step::{Check, CheckResult, Compute, Flow, Http, Sleep, Step, StepOutcome};
pub use stop::StopHandle;
pub use threshold::{evaluate, passed};
pub use vu::{ScenarioResult, StepRecord, VirtualUser, VuSignal, VuState};

#[cfg(feature = "reqwest")]
pub use http::ReqwestClient;

/// Configuration and summary types.
pub use stampede_core as core;

pub mod prelude {
    pub use crate::{
        Check, Compute, Flow, Http, HttpClient, HttpRequest, HttpResponse, LoadTest, RunError,
        Scenario, Sleep, StepError, StopHandle, VuContext,
    };
    #[cfg(feature = "reqwest")]
    pub use crate::ReqwestClient;

    pub use stampede_core::{
        ArrivalRate, LoadProfile, ProfileConfig, RunSummary, Stage, TestConfig, Threshold, Verdict,
    };
}
