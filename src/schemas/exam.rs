use serde::de::Error as _;
use serde::{Deserialize, Serialize};
use time::{
    format_description::well_known::Rfc3339, macros::format_description, OffsetDateTime,
    PrimitiveDateTime,
};

pub(crate) use crate::core::time::format_primitive;
use crate::db::models::{Exam, Question};
use crate::db::types::{ExamStatus, QuestionKind};

#[derive(Debug, Deserialize)]
pub(crate) struct QuestionCreate {
    pub(crate) kind: QuestionKind,
    pub(crate) prompt: String,
    #[serde(default)]
    pub(crate) options: Vec<String>,
    #[serde(default)]
    #[serde(alias = "correctAnswer")]
    pub(crate) correct_answer: Option<String>,
    pub(crate) points: f64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ExamCreate {
    pub(crate) title: String,
    #[serde(default)]
    pub(crate) description: Option<String>,
    #[serde(alias = "startTime", deserialize_with = "deserialize_offset_datetime_flexible")]
    pub(crate) start_time: OffsetDateTime,
    #[serde(alias = "endTime", deserialize_with = "deserialize_offset_datetime_flexible")]
    pub(crate) end_time: OffsetDateTime,
    #[serde(alias = "durationMinutes")]
    pub(crate) duration_minutes: i32,
    #[serde(default)]
    pub(crate) questions: Vec<QuestionCreate>,
}

#[derive(Debug, Serialize)]
pub(crate) struct QuestionResponse {
    pub(crate) id: String,
    pub(crate) order_index: i32,
    pub(crate) kind: QuestionKind,
    pub(crate) prompt: String,
    pub(crate) options: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) correct_answer: Option<String>,
    pub(crate) points: f64,
}

impl QuestionResponse {
    /// Students never see the expected answer.
    pub(crate) fn from_db(question: Question, reveal_answer: bool) -> Self {
        Self {
            id: question.id,
            order_index: question.order_index,
            kind: question.kind,
            prompt: question.prompt,
            options: question.options.0,
            correct_answer: if reveal_answer { question.correct_answer } else { None },
            points: question.points,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct ExamResponse {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) description: Option<String>,
    pub(crate) status: ExamStatus,
    pub(crate) start_time: String,
    pub(crate) end_time: String,
    pub(crate) duration_minutes: i32,
    pub(crate) created_by: String,
    pub(crate) published_at: Option<String>,
    pub(crate) max_score: f64,
    pub(crate) questions: Vec<QuestionResponse>,
}

impl ExamResponse {
    pub(crate) fn from_db(exam: Exam, questions: Vec<Question>, reveal_answers: bool) -> Self {
        let max_score = questions.iter().map(|question| question.points).sum();
        Self {
            id: exam.id,
            title: exam.title,
            description: exam.description,
            status: exam.status,
            start_time: format_primitive(exam.start_time),
            end_time: format_primitive(exam.end_time),
            duration_minutes: exam.duration_minutes,
            created_by: exam.created_by,
            published_at: exam.published_at.map(format_primitive),
            max_score,
            questions: questions
                .into_iter()
                .map(|question| QuestionResponse::from_db(question, reveal_answers))
                .collect(),
        }
    }
}

fn parse_offset_datetime_flexible(raw: &str) -> Option<OffsetDateTime> {
    if let Ok(value) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(value);
    }

    // datetime-local inputs arrive without a timezone; treat them as UTC.
    if let Ok(value) =
        PrimitiveDateTime::parse(raw, &format_description!("[year]-[month]-[day]T[hour]:[minute]"))
    {
        return Some(value.assume_utc());
    }
    if let Ok(value) = PrimitiveDateTime::parse(
        raw,
        &format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
    ) {
        return Some(value.assume_utc());
    }

    None
}

fn deserialize_offset_datetime_flexible<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_offset_datetime_flexible(&raw)
        .ok_or_else(|| D::Error::custom(format!("invalid datetime: {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_rfc3339_and_local_datetimes() {
        let with_offset = parse_offset_datetime_flexible("2025-03-01T13:00:00+03:00").expect("rfc");
        let local = parse_offset_datetime_flexible("2025-03-01T10:00").expect("local");
        assert_eq!(with_offset, local);
        assert!(parse_offset_datetime_flexible("2025-03-01T10:00:30").is_some());
        assert!(parse_offset_datetime_flexible("yesterday").is_none());
    }
}
