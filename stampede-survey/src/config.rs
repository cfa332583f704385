use crate::error::SurveyError;
use crate::scenario::{
    SURVEY_DETAILS_DURATION, SURVEY_MAKE_INFO_DURATION, SURVEY_PARTICIPANT_LIST_DURATION,
    SURVEY_PROGRESS_DURATION, SURVEY_RESPONSE_DURATION, SURVEY_RESULT_DURATION,
};
use clap::{Parser, ValueEnum};
use stampede_core::{
    ArrivalRate, Comparison, LoadProfile, ProfileConfig, Stage, Statistic, TestConfig,
    ThresholdExpr,
};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Journey {
    /// Random surveys from the survey list, with the result management views.
    Participant,
    /// One fixed survey (`SURVEY_ID`), answered with think time.
    Respond,
}

/// Synthetic survey-taking load against a survey service.
#[derive(Clone, Debug, Parser)]
#[command(name = "stampede-survey", version, about)]
pub struct Cli {
    #[arg(long, env = "BASE_URL", default_value = "http://localhost:8080")]
    pub base_url: String,

    /// Survey answered by the respond journey.
    #[arg(long, env = "SURVEY_ID")]
    pub survey_id: Option<String>,

    #[arg(long, env = "JOURNEY", value_enum, default_value_t = Journey::Participant)]
    pub journey: Journey,

    /// JSON test configuration replacing the built-in profiles and thresholds.
    #[arg(long, env = "LOAD_CONFIG")]
    pub load_config: Option<PathBuf>,

    /// Where to write the JSON run summary.
    #[arg(long, env = "SUMMARY_PATH")]
    pub summary_path: Option<PathBuf>,

    #[arg(long, env = "SEED")]
    pub seed: Option<u64>,

    #[arg(long, env = "SURVEY_LIST_SIZE", default_value_t = 5000)]
    pub survey_list_size: u32,

    #[arg(long, env = "REQUEST_TIMEOUT", default_value = "60s", value_parser = humantime::parse_duration)]
    pub request_timeout: Duration,

    /// Skip the think-time pauses of the respond journey.
    #[arg(long, env = "NO_THINK_TIME")]
    pub no_think_time: bool,

    /// How often progress is logged. `0s` disables it.
    #[arg(long, env = "PROGRESS_INTERVAL", default_value = "10s", value_parser = humantime::parse_duration)]
    pub progress_interval: Duration,
}

impl Cli {
    /// The test configuration from `LOAD_CONFIG`, or the journey's defaults.
    pub fn test_config(&self) -> Result<TestConfig, SurveyError> {
        let Some(path) = &self.load_config else {
            return Ok(match self.journey {
                Journey::Participant => participant_defaults(),
                Journey::Respond => respond_defaults(),
            });
        };

        let json = std::fs::read_to_string(path).map_err(|err| SurveyError::LoadConfig {
            path: path.display().to_string(),
            reason: err.to_string(),
        })?;
        Ok(TestConfig::from_json(&json)?)
    }
}

fn avg_below(ms: f64) -> Vec<ThresholdExpr> {
    vec![ThresholdExpr::new(Statistic::Avg, Comparison::Lt, ms)]
}

fn minutes(n: u64) -> Duration {
    Duration::from_secs(60 * n)
}

/// An off-peak and a peak arrival rate, one after the other, with average latency budgets.
pub fn participant_defaults() -> TestConfig {
    let off_peak = ProfileConfig::new(
        "off_peak_load",
        LoadProfile::ConstantArrivalRate(ArrivalRate {
            rate: 10,
            time_unit: minutes(1),
            duration: minutes(5),
            pre_allocated: 2,
            max_concurrency: 10,
        }),
    );
    let peak = ProfileConfig::new(
        "peak_load",
        LoadProfile::ConstantArrivalRate(ArrivalRate {
            rate: 50,
            time_unit: minutes(1),
            duration: minutes(5),
            pre_allocated: 10,
            max_concurrency: 40,
        }),
    )
    .start_offset(minutes(5));

    let thresholds = [
        (SURVEY_DETAILS_DURATION, 200.),
        (SURVEY_PROGRESS_DURATION, 200.),
        (SURVEY_RESPONSE_DURATION, 400.),
        (SURVEY_MAKE_INFO_DURATION, 200.),
        (SURVEY_RESULT_DURATION, 200.),
        (SURVEY_PARTICIPANT_LIST_DURATION, 200.),
    ]
    .into_iter()
    .map(|(metric, ms)| (metric.to_string(), avg_below(ms)))
    .collect();

    TestConfig {
        name: "survey_participant".to_string(),
        profiles: vec![off_peak, peak],
        thresholds,
    }
}

/// A ramp to 200 VUs, a plateau at 400, then back to zero.
pub fn respond_defaults() -> TestConfig {
    let stages = vec![
        Stage::new(minutes(2), 200),
        Stage::new(minutes(1), 400),
        Stage::new(minutes(1), 400),
        Stage::new(minutes(1), 0),
    ];

    TestConfig {
        name: "survey_respond".to_string(),
        profiles: vec![ProfileConfig::new("respond", LoadProfile::ramping(stages))],
        thresholds: Default::default(),
    }
}
