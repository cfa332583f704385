//! Randomised survey answers and result filters.

use crate::model::{
    Progress, Question, QuestionFilter, QuestionResponse, QuestionType, ResponseContent,
    Section, SectionResponse, Submission, SurveyResult,
};
use rand::seq::{index, SliceRandom};
use rand::Rng;

/// Content submitted for free-text questions.
pub const TEXT_PLACEHOLDER: &str = "This is a text response.";

/// Chance that an optional question gets answered.
pub const OPTIONAL_ANSWER_PROBABILITY: f64 = 0.7;

/// Chance that a generated result filter is positive (include) rather than negative.
pub const POSITIVE_FILTER_PROBABILITY: f64 = 0.7;

/// Answers every section of `progress` for `visitor_id`.
pub fn submission<R: Rng + ?Sized>(
    progress: &Progress,
    visitor_id: &str,
    rng: &mut R,
) -> Submission {
    Submission {
        section_responses: progress
            .sections
            .iter()
            .map(|section| section_response(section, rng))
            .collect(),
        visitor_id: visitor_id.to_string(),
    }
}

/// Required questions are always answered, optional ones with [`OPTIONAL_ANSWER_PROBABILITY`].
/// Questions that end up with no answer are left out.
pub fn section_response<R: Rng + ?Sized>(section: &Section, rng: &mut R) -> SectionResponse {
    let mut question_responses = Vec::with_capacity(section.questions.len());
    for question in &section.questions {
        if !question.is_required && !rng.gen_bool(OPTIONAL_ANSWER_PROBABILITY) {
            continue;
        }
        if let Some(response) = question_response(question, rng) {
            question_responses.push(response);
        }
    }

    SectionResponse {
        section_id: section.section_id.clone(),
        question_responses,
    }
}

pub fn question_response<R: Rng + ?Sized>(
    question: &Question,
    rng: &mut R,
) -> Option<QuestionResponse> {
    let contents: Vec<String> = match question.kind {
        QuestionType::SingleChoice => question.choices.choose(rng).cloned().into_iter().collect(),
        QuestionType::MultipleChoice => {
            let mut distinct: Vec<&String> = Vec::with_capacity(question.choices.len());
            for choice in &question.choices {
                if !distinct.contains(&choice) {
                    distinct.push(choice);
                }
            }
            if distinct.is_empty() {
                vec![]
            } else {
                let picks = rng.gen_range(1..=distinct.len());
                index::sample(rng, distinct.len(), picks)
                    .into_iter()
                    .map(|i| distinct[i].clone())
                    .collect()
            }
        }
        QuestionType::TextResponse => vec![TEXT_PLACEHOLDER.to_string()],
        QuestionType::Unknown => vec![],
    };

    if contents.is_empty() {
        return None;
    }

    Some(QuestionResponse {
        question_id: question.question_id.clone(),
        responses: contents
            .into_iter()
            .map(|content| ResponseContent {
                content,
                is_other: false,
            })
            .collect(),
    })
}

/// One or two filters on questions of a random section of `result`, each keeping one of the
/// contents that question was answered with.
pub fn filters<R: Rng + ?Sized>(result: &SurveyResult, rng: &mut R) -> Vec<QuestionFilter> {
    let Some(section) = result.section_results.choose(rng) else {
        return vec![];
    };
    let questions = &section.question_results;
    if questions.is_empty() {
        return vec![];
    }

    let count = rng.gen_range(1..=2usize).min(questions.len());
    index::sample(rng, questions.len(), count)
        .into_iter()
        .filter_map(|i| {
            let question = &questions[i];
            let response = question.responses.choose(rng)?;
            Some(QuestionFilter {
                question_id: question.question_id.clone(),
                contents: vec![response.content.clone()],
                is_positive: rng.gen_bool(POSITIVE_FILTER_PROBABILITY),
            })
        })
        .collect()
}
