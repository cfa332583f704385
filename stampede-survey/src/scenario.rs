//! The survey journeys, assembled from engine steps.

use crate::api::SurveyApi;
use crate::generate;
use crate::model::{
    ParticipantList, Progress, ResultQuery, Submission, SurveyInfo, SurveyList, SurveyResult,
};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use stampede::{
    Check, Compute, Flow, Http, HttpClient, HttpRequest, HttpResponse, Scenario, Sleep,
    StepError, VuContext,
};
use std::sync::Arc;
use std::time::Duration;
#[allow(unused_imports)]
use tracing::{debug, error, info, trace, warn};

pub const SURVEY_DETAILS_DURATION: &str = "survey_details_duration";
pub const SURVEY_PROGRESS_DURATION: &str = "survey_progress_duration";
pub const SURVEY_RESPONSE_DURATION: &str = "survey_response_duration";
pub const SURVEY_MAKE_INFO_DURATION: &str = "survey_make_info_duration";
pub const SURVEY_RESULT_DURATION: &str = "survey_result_duration";
pub const SURVEY_PARTICIPANT_LIST_DURATION: &str = "survey_participant_list_duration";

/// Surveys the VUs draw from. Read-only once the run starts.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Surveys {
    pub ids: Vec<String>,
}

/// Per-iteration state of one VU; reset before every iteration.
#[derive(Debug, Default)]
pub struct SurveyState {
    pub survey_id: Option<String>,
    pub visitor_id: Option<String>,
    pub result_open: Option<bool>,
    pub progress: Option<Progress>,
    pub submission: Option<Submission>,
    pub result: Option<SurveyResult>,
    pub participants: Vec<String>,
}

pub type SurveyContext = VuContext<Surveys, SurveyState>;

/// Fetch the survey list once before the run.
///
/// A non-200 answer or an empty list fails the setup.
pub async fn fetch_surveys(
    client: Arc<dyn HttpClient>,
    api: Arc<SurveyApi>,
    size: u32,
) -> Result<Surveys, StepError> {
    let response = client.send(HttpRequest::get(api.list(size))).await?;
    if response.status != 200 {
        return Err(StepError::UnexpectedStatus(response.status));
    }
    let list: SurveyList = response
        .json()
        .map_err(|err| StepError::malformed("survey list", err))?;

    let ids: Vec<String> = list.surveys.into_iter().map(|s| s.survey_id.0).collect();
    if ids.is_empty() {
        return Err(StepError::missing("the survey list is empty"));
    }
    info!("Fetched {} surveys", ids.len());
    Ok(Surveys { ids })
}

/// Check once before the run that the respond journey's survey answers.
///
/// Anything but a 200 with readable survey details fails the setup.
pub async fn check_survey(
    client: Arc<dyn HttpClient>,
    api: Arc<SurveyApi>,
    survey_id: String,
) -> Result<Surveys, StepError> {
    let response = client.send(HttpRequest::get(api.info(&survey_id))).await?;
    if response.status != 200 {
        return Err(StepError::UnexpectedStatus(response.status));
    }
    let info: SurveyInfo = decode("survey details", &response)?;
    info!(survey = %survey_id, result_open = info.is_result_open, "Survey is reachable");
    Ok(Surveys {
        ids: vec![survey_id],
    })
}

/// A random survey from setup: details, progress, answer submission, then (only when results
/// are public) the result management views.
pub fn participant_journey(api: Arc<SurveyApi>) -> Scenario<Surveys, SurveyState> {
    Scenario::new("survey_participant")
        .step(pick_survey())
        .step(details(&api, true))
        .step(progress(&api))
        .step(answer())
        .step(submit(&api))
        .step(result_gate())
        .step(details(&api, false))
        .step(make_info(&api))
        .step(result(&api))
        .step(filtered_result(&api, "filtered result 1"))
        .step(filtered_result(&api, "filtered result 2"))
        .step(participants(&api, false))
        .step(participants(&api, true))
        .step(participant_result(&api))
}

/// A fixed survey: details, progress and a submission with think time in between.
pub fn respond_journey(api: Arc<SurveyApi>, think_time: bool) -> Scenario<Surveys, SurveyState> {
    let think = |secs: f64| {
        Sleep::fixed(Duration::from_secs_f64(if think_time { secs } else { 0. }))
    };

    Scenario::new("survey_respond")
        .step(pick_survey())
        .step(details(&api, false))
        .step(think(0.5))
        .step(progress(&api))
        .step(think(10.))
        .step(answer())
        .step(submit(&api))
        .step(think(0.5))
}

fn survey_id(ctx: &SurveyContext) -> Result<&str, StepError> {
    ctx.state
        .survey_id
        .as_deref()
        .ok_or_else(|| StepError::missing("survey id"))
}

fn visitor_id(ctx: &SurveyContext) -> Result<&str, StepError> {
    ctx.state
        .visitor_id
        .as_deref()
        .ok_or_else(|| StepError::missing("visitor id"))
}

fn json_body(value: &impl Serialize) -> Result<serde_json::Value, StepError> {
    serde_json::to_value(value).map_err(|err| StepError::Request(err.to_string()))
}

fn decode<T: serde::de::DeserializeOwned>(
    step: &str,
    response: &HttpResponse,
) -> Result<T, StepError> {
    response.json().map_err(|err| StepError::malformed(step, err))
}

fn pick_survey() -> Compute<Surveys, SurveyState> {
    Compute::new("pick survey", |ctx: &mut SurveyContext| {
        let count = ctx.shared().ids.len();
        if count == 0 {
            return Err(StepError::missing("no surveys to pick from"));
        }
        let pick = ctx.rng.gen_range(0..count);
        let survey = ctx.shared().ids[pick].clone();
        let visitor = uuid::Builder::from_random_bytes(ctx.rng.gen()).into_uuid();

        ctx.state.survey_id = Some(survey);
        ctx.state.visitor_id = Some(visitor.to_string());
        Ok(Flow::Continue)
    })
}

/// Survey details. The first call of an iteration remembers whether results are public.
fn details(api: &Arc<SurveyApi>, remember: bool) -> Http<Surveys, SurveyState> {
    let api = api.clone();
    let step = Http::new(
        "survey details",
        SURVEY_DETAILS_DURATION,
        move |ctx: &mut SurveyContext| Ok(HttpRequest::get(api.info(survey_id(ctx)?))),
    )
    .check(Check::status(200));

    if !remember {
        return step;
    }
    step.on_response(|ctx: &mut SurveyContext, response| {
        let info: SurveyInfo = decode("survey details", response)?;
        ctx.state.result_open = Some(info.is_result_open);
        Ok(Flow::Continue)
    })
}

fn progress(api: &Arc<SurveyApi>) -> Http<Surveys, SurveyState> {
    let api = api.clone();
    Http::new(
        "survey progress",
        SURVEY_PROGRESS_DURATION,
        move |ctx: &mut SurveyContext| Ok(HttpRequest::get(api.progress(survey_id(ctx)?))),
    )
    .check(Check::status(200))
    .on_response(|ctx: &mut SurveyContext, response| {
        let progress: Progress = decode("survey progress", response)?;
        ctx.state.progress = Some(progress);
        Ok(Flow::Continue)
    })
}

/// Random answers for the survey's questions. Without a progress payload the submission is
/// still sent, with no sections.
fn answer() -> Compute<Surveys, SurveyState> {
    Compute::new("generate answers", |ctx: &mut SurveyContext| {
        let visitor = visitor_id(ctx)?.to_string();
        let empty = Progress::default();
        let progress = ctx.state.progress.as_ref().unwrap_or(&empty);
        let submission = generate::submission(progress, &visitor, &mut ctx.rng);
        ctx.state.submission = Some(submission);
        Ok(Flow::Continue)
    })
}

fn submit(api: &Arc<SurveyApi>) -> Http<Surveys, SurveyState> {
    let api = api.clone();
    Http::new(
        "submit response",
        SURVEY_RESPONSE_DURATION,
        move |ctx: &mut SurveyContext| {
            let submission = ctx
                .state
                .submission
                .as_ref()
                .ok_or_else(|| StepError::missing("generated answers"))?;
            Ok(HttpRequest::post(api.submit(survey_id(ctx)?))
                .header("Content-Type", "application/json")
                .json(json_body(submission)?))
        },
    )
    .check(Check::status(200))
}

/// Ends the iteration, successfully, unless the survey's results are public.
fn result_gate() -> Compute<Surveys, SurveyState> {
    Compute::new("result gate", |ctx: &mut SurveyContext| {
        if ctx.state.result_open == Some(true) {
            Ok(Flow::Continue)
        } else {
            trace!(vu = ctx.vu, "Results closed, ending iteration");
            Ok(Flow::Stop)
        }
    })
}

fn make_info(api: &Arc<SurveyApi>) -> Http<Surveys, SurveyState> {
    let api = api.clone();
    Http::new(
        "survey make info",
        SURVEY_MAKE_INFO_DURATION,
        move |ctx: &mut SurveyContext| Ok(HttpRequest::get(api.make_info(survey_id(ctx)?))),
    )
    .check(Check::status(200))
}

fn result(api: &Arc<SurveyApi>) -> Http<Surveys, SurveyState> {
    let api = api.clone();
    Http::new(
        "survey result",
        SURVEY_RESULT_DURATION,
        move |ctx: &mut SurveyContext| {
            let url = api.result(survey_id(ctx)?, visitor_id(ctx)?, None);
            Ok(HttpRequest::post(url).json(json_body(&ResultQuery::default())?))
        },
    )
    .check(Check::status(200))
    .on_response(|ctx: &mut SurveyContext, response| {
        let result: SurveyResult = decode("survey result", response)?;
        ctx.state.result = Some(result);
        Ok(Flow::Continue)
    })
}

/// The result again, filtered on answers found in the unfiltered result.
fn filtered_result(api: &Arc<SurveyApi>, name: &str) -> Http<Surveys, SurveyState> {
    let api = api.clone();
    Http::new(name, SURVEY_RESULT_DURATION, move |ctx: &mut SurveyContext| {
        let url = api.result(survey_id(ctx)?, visitor_id(ctx)?, None);
        let result = ctx
            .state
            .result
            .as_ref()
            .ok_or_else(|| StepError::missing("survey result"))?;
        let query = ResultQuery {
            question_filters: generate::filters(result, &mut ctx.rng),
        };
        Ok(HttpRequest::post(url).json(json_body(&query)?))
    })
    .check(Check::status(200))
}

/// The participant list. The second call of an iteration remembers the participant ids.
fn participants(api: &Arc<SurveyApi>, remember: bool) -> Http<Surveys, SurveyState> {
    let api = api.clone();
    let step = Http::new(
        "participant list",
        SURVEY_PARTICIPANT_LIST_DURATION,
        move |ctx: &mut SurveyContext| {
            Ok(HttpRequest::get(
                api.participants(survey_id(ctx)?, visitor_id(ctx)?),
            ))
        },
    )
    .check(Check::status(200));

    if !remember {
        return step;
    }
    step.on_response(|ctx: &mut SurveyContext, response| {
        let list: ParticipantList = decode("participant list", response)?;
        ctx.state.participants = list
            .participants
            .into_iter()
            .map(|p| p.participant_id.0)
            .collect();
        Ok(Flow::Continue)
    })
}

/// One participant's answers. Without any participant the query goes out unscoped.
fn participant_result(api: &Arc<SurveyApi>) -> Http<Surveys, SurveyState> {
    let api = api.clone();
    Http::new(
        "participant result",
        SURVEY_RESULT_DURATION,
        move |ctx: &mut SurveyContext| {
            let participant = ctx.state.participants.choose(&mut ctx.rng).cloned();
            let url = api.result(survey_id(ctx)?, visitor_id(ctx)?, participant.as_deref());
            Ok(HttpRequest::post(url).json(json_body(&ResultQuery::default())?))
        },
    )
    .check(Check::status(200))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::future::BoxFuture;
    use serde_json::{json, Value};
    use stampede::{MetricCollector, TransportError, VirtualUser, VuSignal, VuState};
    use std::sync::Mutex;
    use tokio::sync::watch;

    struct FakeClient<F>(F);

    impl<F> FakeClient<F>
    where
        F: Fn(HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync + 'static,
    {
        fn shared(f: F) -> Arc<dyn HttpClient> {
            Arc::new(Self(f))
        }
    }

    impl<F> HttpClient for FakeClient<F>
    where
        F: Fn(HttpRequest) -> Result<HttpResponse, TransportError> + Send + Sync,
    {
        fn send(&self, request: HttpRequest) -> BoxFuture<'_, Result<HttpResponse, TransportError>> {
            let response = (self.0)(request);
            Box::pin(async move { response })
        }
    }

    fn progress_body() -> Value {
        json!({"sections": [{"sectionId": 1, "questions": [
            {"questionId": 10, "type": "SINGLE_CHOICE", "isRequired": true, "choices": ["A", "B"]}
        ]}]})
    }

    fn result_body() -> Value {
        json!({"sectionResults": [{"questionResults": [
            {"questionId": 10, "responses": [{"content": "A"}, {"content": "B"}]}
        ]}]})
    }

    struct Service {
        calls: Mutex<Vec<HttpRequest>>,
        result_open: bool,
        participants: Value,
    }

    impl Service {
        fn answer(&self, request: HttpRequest) -> HttpResponse {
            let url = request.url.clone();
            self.calls.lock().unwrap().push(request);
            let body = if url.contains("/info/") {
                json!({"isResultOpen": self.result_open})
            } else if url.contains("/progress/") {
                progress_body()
            } else if url.contains("/management/result/") {
                result_body()
            } else if url.contains("/management/participants/") {
                self.participants.clone()
            } else {
                json!({})
            };
            HttpResponse::json_body(200, &body)
        }

        fn urls(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|r| r.url.clone())
                .collect()
        }
    }

    async fn run_once(
        scenario: &Scenario<Surveys, SurveyState>,
        service: Arc<Service>,
    ) -> stampede::ScenarioResult {
        let fake = service.clone();
        let client = FakeClient::shared(move |request| Ok(fake.answer(request)));
        let ctx = VuContext::new(
            0,
            "test",
            Arc::new(Surveys {
                ids: vec!["S1".to_string()],
            }),
            client,
            MetricCollector::new(),
            Some(7),
        );
        let (_tx, mut rx) = watch::channel(VuSignal::Run);
        let mut vu = VirtualUser::new(ctx);
        vu.run_iteration(scenario, &mut rx).await
    }

    fn api() -> Arc<SurveyApi> {
        Arc::new(SurveyApi::new("http://svc").unwrap())
    }

    #[tokio::test]
    async fn closed_results_end_after_submission() {
        let service = Arc::new(Service {
            calls: Mutex::new(vec![]),
            result_open: false,
            participants: json!({"participants": []}),
        });

        let result = run_once(&participant_journey(api()), service.clone()).await;
        assert_eq!(result.status, VuState::Completed);
        assert!(result.success);

        let urls = service.urls();
        assert_eq!(
            urls,
            vec![
                "http://svc/api/v1/surveys/info/S1",
                "http://svc/api/v1/surveys/progress/S1",
                "http://svc/api/v1/surveys/response/fake/S1",
            ]
        );
    }

    #[tokio::test]
    async fn submission_answers_the_single_choice_question() {
        let service = Arc::new(Service {
            calls: Mutex::new(vec![]),
            result_open: false,
            participants: json!({"participants": []}),
        });
        run_once(&participant_journey(api()), service.clone()).await;

        let calls = service.calls.lock().unwrap();
        let submit = &calls[2];
        assert_eq!(submit.method, stampede::Method::Post);
        let body = submit.body.clone().unwrap();
        let answers = &body["sectionResponses"][0]["questionResponses"];
        assert_eq!(answers.as_array().unwrap().len(), 1);
        let responses = answers[0]["responses"].as_array().unwrap();
        assert_eq!(responses.len(), 1);
        assert!(responses[0]["content"] == "A" || responses[0]["content"] == "B");
        assert_eq!(responses[0]["isOther"], false);

        let visitor = body["visitorId"].as_str().unwrap();
        assert_eq!(uuid::Uuid::parse_str(visitor).unwrap().get_version_num(), 4);
    }

    #[tokio::test]
    async fn open_results_walk_the_whole_journey() {
        let service = Arc::new(Service {
            calls: Mutex::new(vec![]),
            result_open: true,
            participants: json!({"participants": [{"participantId": 99}]}),
        });

        let result = run_once(&participant_journey(api()), service.clone()).await;
        assert_eq!(result.status, VuState::Completed);
        assert!(result.success);
        assert_eq!(result.steps.len(), 14);

        let urls = service.urls();
        assert_eq!(urls.len(), 11);
        assert!(urls[3].ends_with("/info/S1"));
        assert!(urls[4].ends_with("/make-info/S1"));
        assert_eq!(
            urls.iter().filter(|u| u.contains("/participants/")).count(),
            2
        );
        assert!(urls[10].ends_with("&participantId=99"));

        let calls = service.calls.lock().unwrap();
        let filtered = calls[6].body.clone().unwrap();
        let filters = filtered["questionFilters"].as_array().unwrap();
        assert_eq!(filters.len(), 1);
        assert_eq!(filters[0]["questionId"], 10);
    }

    #[tokio::test]
    async fn no_participants_leaves_the_result_unscoped() {
        let service = Arc::new(Service {
            calls: Mutex::new(vec![]),
            result_open: true,
            participants: json!({"participants": []}),
        });

        run_once(&participant_journey(api()), service.clone()).await;
        let urls = service.urls();
        assert!(!urls[10].contains("participantId"));
    }

    #[tokio::test]
    async fn malformed_details_abort_the_iteration() {
        let client = FakeClient::shared(|request| {
            if request.url.contains("/info/") {
                Ok(HttpResponse::new(200, "<html>"))
            } else {
                Ok(HttpResponse::json_body(200, &json!({})))
            }
        });
        let ctx = VuContext::new(
            0,
            "test",
            Arc::new(Surveys {
                ids: vec!["S1".to_string()],
            }),
            client,
            MetricCollector::new(),
            None,
        );
        let (_tx, mut rx) = watch::channel(VuSignal::Run);
        let mut vu = VirtualUser::new(ctx);

        let result = vu.run_iteration(&participant_journey(api()), &mut rx).await;
        assert_eq!(result.status, VuState::Aborted);
        assert_eq!(result.steps.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    #[ntest::timeout(5_000)]
    async fn respond_journey_thinks_between_calls() {
        let service = Arc::new(Service {
            calls: Mutex::new(vec![]),
            result_open: false,
            participants: json!({}),
        });

        let start = tokio::time::Instant::now();
        let result = run_once(&respond_journey(api(), true), service.clone()).await;
        assert_eq!(result.status, VuState::Completed);
        assert!(start.elapsed() >= Duration::from_secs(11));
        assert_eq!(service.urls().len(), 3);

        let start = tokio::time::Instant::now();
        run_once(&respond_journey(api(), false), service).await;
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn setup_needs_a_non_empty_list() {
        let client = FakeClient::shared(|_| {
            Ok(HttpResponse::json_body(
                200,
                &json!({"surveys": [{"surveyId": "S1"}, {"surveyId": 2}]}),
            ))
        });
        let surveys = fetch_surveys(client, api(), 10).await.unwrap();
        assert_eq!(surveys.ids, vec!["S1", "2"]);

        let client =
            FakeClient::shared(|_| Ok(HttpResponse::json_body(200, &json!({"surveys": []}))));
        assert!(matches!(
            fetch_surveys(client, api(), 10).await,
            Err(StepError::MissingData(_))
        ));

        let client = FakeClient::shared(|_| Ok(HttpResponse::new(503, "")));
        assert_eq!(
            fetch_surveys(client, api(), 10).await,
            Err(StepError::UnexpectedStatus(503))
        );
    }

    #[tokio::test]
    async fn respond_setup_checks_the_survey() {
        let service = Arc::new(Service {
            calls: Mutex::new(vec![]),
            result_open: false,
            participants: json!({}),
        });
        let fake = service.clone();
        let client = FakeClient::shared(move |request| Ok(fake.answer(request)));
        let surveys = check_survey(client, api(), "S9".to_string()).await.unwrap();
        assert_eq!(surveys.ids, vec!["S9"]);
        assert_eq!(service.urls(), vec!["http://svc/api/v1/surveys/info/S9"]);

        let client = FakeClient::shared(|_| Ok(HttpResponse::new(404, "")));
        assert_eq!(
            check_survey(client, api(), "S9".to_string()).await,
            Err(StepError::UnexpectedStatus(404))
        );

        let client = FakeClient::shared(|_| Err(TransportError::new("connection refused")));
        assert!(matches!(
            check_survey(client, api(), "S9".to_string()).await,
            Err(StepError::Network(_))
        ));
    }
}
