mod utils;
use utils::*;

use mock_service::prelude::*;
use stampede::{LoadTest, RunError};
use stampede_core::{ArrivalRate, LoadProfile, ProfileConfig, RunSummary, Threshold, Verdict};
use stampede_survey::scenario::fetch_surveys;
use stampede_survey::{participant_journey, SurveyApi};
use anyhow::Context;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

fn arrival(rate: u32) -> ProfileConfig {
    ProfileConfig::new(
        "arrival",
        LoadProfile::ConstantArrivalRate(ArrivalRate {
            rate,
            time_unit: Duration::from_secs(1),
            duration: Duration::from_secs(2),
            pre_allocated: 2,
            max_concurrency: 5,
        }),
    )
    .graceful_stop(Duration::from_secs(5))
}

async fn participants(service: &MockService, thresholds: &[(&str, &str)]) -> RunSummary {
    let api = Arc::new(SurveyApi::new(&service.base_url()).unwrap());
    let setup_api = api.clone();

    let mut test = LoadTest::with_setup(participant_journey(api), move |client| {
        fetch_surveys(client, setup_api, 10)
    })
    .profile(arrival(4))
    .seed(1);
    for (metric, expr) in thresholds {
        test = test.threshold(Threshold::parse(metric, expr).unwrap());
    }
    test.run(client()).await.unwrap()
}

#[tokio::test]
#[ntest::timeout(30_000)]
async fn participant_journey_with_open_results() {
    let service = mock(MockConfig::default()).await;
    let summary = participants(&service, &[("survey_details_duration", "avg<1000")]).await;

    let profile = &summary.profiles[0];
    assert_eq!(profile.requested, Some(8));
    assert_eq!(profile.started + profile.dropped, 8);
    assert!(profile.started > 0);
    assert_eq!(profile.completed, profile.started);
    assert_eq!(profile.aborted, 0);
    assert_eq!(summary.counters["scenario_success"], profile.completed);
    assert_eq!(summary.failure_rate, 0.);
    assert!(summary.passed);

    let started = profile.started;
    let state = &service.state;
    assert_eq!(state.calls("list"), 1);
    assert_eq!(state.calls("info"), 2 * started);
    assert_eq!(state.calls("progress"), started);
    assert_eq!(state.calls("make-info"), started);
    assert_eq!(state.calls("result"), 4 * started);
    assert_eq!(state.calls("participants"), 2 * started);
    assert_eq!(summary.trends["survey_result_duration"].count, 4 * started);

    let submissions = state.submissions();
    assert_eq!(submissions.len() as u64, started);
    for submission in &submissions {
        let sections = submission["sectionResponses"].as_array().unwrap();
        assert_eq!(sections.len(), 2);
        let first = &sections[0]["questionResponses"][0];
        assert_eq!(first["questionId"], 10);
        let answer = &first["responses"][0]["content"];
        assert!(answer == "A" || answer == "B");
    }
}

#[tokio::test]
#[ntest::timeout(30_000)]
async fn closed_results_stop_after_the_submission() {
    let mut config = MockConfig::default();
    config.fixtures.result_open = false;
    let service = mock(config).await;

    let summary = participants(&service, &[("survey_result_duration", "avg<1")]).await;
    let profile = &summary.profiles[0];
    assert_eq!(profile.completed, profile.started);
    assert_eq!(profile.aborted, 0);
    assert!(summary.passed, "an unrecorded metric is skipped");
    assert_eq!(summary.thresholds[0].verdict, Verdict::Skip);

    let state = &service.state;
    assert_eq!(state.calls("info"), profile.started);
    assert_eq!(state.submissions().len() as u64, profile.started);
    assert_eq!(state.calls("make-info"), 0);
    assert_eq!(state.calls("result"), 0);
    assert_eq!(state.calls("participants"), 0);
}

#[tokio::test]
#[ntest::timeout(30_000)]
async fn slow_service_fails_the_latency_threshold() {
    let service = mock(MockConfig {
        latency: Some(Latency {
            mean: Duration::from_millis(40),
            std_dev: Duration::ZERO,
        }),
        ..Default::default()
    })
    .await;

    let summary = participants(&service, &[("survey_details_duration", "avg<10")]).await;
    assert_eq!(summary.thresholds[0].verdict, Verdict::Fail);
    assert!(summary.thresholds[0].observed.unwrap() >= 40.);
    assert!(!summary.passed);
    assert_eq!(summary.failed_thresholds().count(), 1);
}

#[tokio::test]
#[ntest::timeout(30_000)]
async fn server_errors_fail_checks_but_not_the_run() {
    let service = mock(MockConfig {
        max_tps: NonZeroU32::new(2),
        ..Default::default()
    })
    .await;

    let summary = participants(&service, &[]).await;
    assert!(summary.counters["checks_failed"] > 0);
    assert!(summary.failure_rate > 0.);
    let profile = &summary.profiles[0];
    assert_eq!(profile.completed + profile.aborted, profile.started);
    assert!(summary.passed, "no thresholds");
}

#[tokio::test]
#[ntest::timeout(30_000)]
async fn empty_survey_list_fails_setup() {
    let mut config = MockConfig::default();
    config.fixtures.surveys.clear();
    let service = mock(config).await;

    let test = stampede_survey::load_test(&cli(&service, &[])).unwrap();
    let result = test.run(client()).await;
    assert!(matches!(result, Err(RunError::Setup(_))));
}

async fn respond(
    service: &MockService,
    survey: &str,
    config: &Value,
) -> anyhow::Result<RunSummary> {
    let path = load_config(survey, config)?;
    let cli = cli(
        service,
        &[
            "--journey",
            "respond",
            "--survey-id",
            survey,
            "--no-think-time",
            "--load-config",
            path.to_str().context("temp path is not UTF-8")?,
        ],
    );
    let result = stampede_survey::load_test(&cli)?.run(client()).await;
    let _ = std::fs::remove_file(&path);
    Ok(result?)
}

fn short_ramp() -> Value {
    json!({
        "profiles": [{
            "name": "ramp",
            "executor": "ramping-vus",
            "stages": [{ "duration": "1s", "target": 2 }],
            "graceful_stop": "2s"
        }],
        "thresholds": {
            "survey_details_duration": ["avg<1000"],
            "survey_result_duration": ["avg<1"]
        }
    })
}

#[tokio::test]
#[ntest::timeout(30_000)]
async fn respond_journey_from_a_load_config() {
    let service = mock(MockConfig::default()).await;
    let summary = respond(&service, "S2", &short_ramp()).await.unwrap();

    assert!(summary.passed);
    let verdicts: Vec<Verdict> = summary.thresholds.iter().map(|t| t.verdict).collect();
    assert_eq!(verdicts, vec![Verdict::Pass, Verdict::Skip]);

    let state = &service.state;
    assert_eq!(state.calls("list"), 0);
    let submissions = state.submissions();
    assert!(!submissions.is_empty());
    let visitors: HashSet<&str> = submissions
        .iter()
        .filter_map(|s| s["visitorId"].as_str())
        .collect();
    assert_eq!(visitors.len(), submissions.len());
    assert!(submissions
        .iter()
        .all(|s| s["sectionResponses"].as_array().map(Vec::len) == Some(2)));
}

#[tokio::test]
#[ntest::timeout(30_000)]
async fn respond_setup_rejects_an_unknown_survey() {
    let service = mock(MockConfig::default()).await;
    let err = respond(&service, "NOPE", &short_ramp()).await.unwrap_err();

    assert!(matches!(
        err.downcast_ref::<RunError>(),
        Some(RunError::Setup(_))
    ));
    assert_eq!(service.state.calls("info"), 1);
    assert!(service.state.submissions().is_empty());
}
