//! Wire models of the survey API.
//!
//! Only the fields the journeys read are modelled; everything else in a payload is ignored.
//! Section and question ids are kept as raw JSON values because they are echoed back verbatim.

use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// A survey or participant identifier. The service returns these as strings or numbers.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Id(pub String);

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::String(id) => Ok(Id(id)),
            Value::Number(id) => Ok(Id(id.to_string())),
            other => Err(de::Error::custom(format!(
                "expected a string or numeric id, got {other}"
            ))),
        }
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Id {
    fn from(id: &str) -> Self {
        Id(id.to_string())
    }
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SurveyInfo {
    #[serde(default)]
    pub is_result_open: bool,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct SurveyList {
    #[serde(default)]
    pub surveys: Vec<SurveyListItem>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SurveyListItem {
    pub survey_id: Id,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct Progress {
    #[serde(default)]
    pub sections: Vec<Section>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub section_id: Value,
    #[serde(default)]
    pub questions: Vec<Question>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub question_id: Value,
    #[serde(rename = "type")]
    pub kind: QuestionType,
    #[serde(default)]
    pub is_required: bool,
    #[serde(default)]
    pub choices: Vec<String>,
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionType {
    SingleChoice,
    MultipleChoice,
    TextResponse,
    /// Answered with nothing.
    #[serde(other)]
    Unknown,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub section_responses: Vec<SectionResponse>,
    pub visitor_id: String,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SectionResponse {
    pub section_id: Value,
    pub question_responses: Vec<QuestionResponse>,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuestionResponse {
    pub question_id: Value,
    pub responses: Vec<ResponseContent>,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResponseContent {
    pub content: String,
    pub is_other: bool,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SurveyResult {
    #[serde(default)]
    pub section_results: Vec<SectionResult>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SectionResult {
    #[serde(default)]
    pub question_results: Vec<QuestionResult>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuestionResult {
    pub question_id: Value,
    #[serde(default)]
    pub responses: Vec<ResultResponse>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct ResultResponse {
    pub content: Value,
}

#[derive(Clone, Debug, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResultQuery {
    pub question_filters: Vec<QuestionFilter>,
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuestionFilter {
    pub question_id: Value,
    pub contents: Vec<Value>,
    pub is_positive: bool,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct ParticipantList {
    #[serde(default)]
    pub participants: Vec<Participant>,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub participant_id: Id,
}
