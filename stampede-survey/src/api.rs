use crate::error::SurveyError;
use url::Url;

/// Builds the survey service endpoint URLs under `{base}/api/v1/surveys`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SurveyApi {
    base: Url,
}

impl SurveyApi {
    pub fn new(base_url: &str) -> Result<Self, SurveyError> {
        let base = Url::parse(base_url)
            .map_err(|err| SurveyError::InvalidBaseUrl(format!("{base_url}: {err}")))?;
        if base.cannot_be_a_base() || !matches!(base.scheme(), "http" | "https") {
            return Err(SurveyError::InvalidBaseUrl(format!(
                "{base_url}: expected an http(s) URL"
            )));
        }
        Ok(Self { base })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        url.set_query(None);
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty()
                .extend(["api", "v1", "surveys"])
                .extend(segments);
        }
        url
    }

    pub fn list(&self, size: u32) -> String {
        let mut url = self.endpoint(&["list"]);
        url.query_pairs_mut().append_pair("size", &size.to_string());
        url.into()
    }

    pub fn info(&self, survey: &str) -> String {
        self.endpoint(&["info", survey]).into()
    }

    pub fn progress(&self, survey: &str) -> String {
        self.endpoint(&["progress", survey]).into()
    }

    pub fn submit(&self, survey: &str) -> String {
        self.endpoint(&["response", "fake", survey]).into()
    }

    pub fn make_info(&self, survey: &str) -> String {
        self.endpoint(&["make-info", survey]).into()
    }

    pub fn result(&self, survey: &str, visitor: &str, participant: Option<&str>) -> String {
        let mut url = self.endpoint(&["management", "result", survey]);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("visitorId", visitor);
            if let Some(participant) = participant {
                query.append_pair("participantId", participant);
            }
        }
        url.into()
    }

    pub fn participants(&self, survey: &str, visitor: &str) -> String {
        let mut url = self.endpoint(&["management", "participants", survey]);
        url.query_pairs_mut().append_pair("visitorId", visitor);
        url.into()
    }
}
