//! Survey-taking journeys for the Stampede engine, and the wiring behind the `stampede-survey`
//! binary.
pub mod api;
pub mod config;
mod error;
pub mod generate;
pub mod model;
pub mod scenario;

pub use api::SurveyApi;
pub use config::{Cli, Journey};
pub use error::SurveyError;
pub use scenario::{participant_journey, respond_journey, SurveyState, Surveys};

use stampede::LoadTest;
use std::sync::Arc;

/// The load test `cli` describes, ready to run.
///
/// The participant journey fetches its surveys during setup; the respond journey needs
/// `SURVEY_ID` and checks during setup that it answers.
pub fn load_test(cli: &Cli) -> Result<LoadTest<Surveys, SurveyState>, SurveyError> {
    let api = Arc::new(SurveyApi::new(&cli.base_url)?);
    let config = cli.test_config()?;

    let test = match cli.journey {
        Journey::Participant => {
            let setup_api = api.clone();
            let size = cli.survey_list_size;
            LoadTest::with_setup(participant_journey(api), move |client| {
                scenario::fetch_surveys(client, setup_api, size)
            })
        }
        Journey::Respond => {
            let survey = cli
                .survey_id
                .clone()
                .filter(|id| !id.is_empty())
                .ok_or(SurveyError::MissingSurveyId)?;
            let setup_api = api.clone();
            LoadTest::with_setup(respond_journey(api, !cli.no_think_time), move |client| {
                scenario::check_survey(client, setup_api, survey)
            })
        }
    };

    let mut test = test
        .config(config)
        .progress_interval(cli.progress_interval);
    if let Some(seed) = cli.seed {
        test = test.seed(seed);
    }
    Ok(test)
}
