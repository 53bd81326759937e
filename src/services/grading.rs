use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use crate::core::time::Clock;
use crate::db::models::{Answer, ExamAttempt, Question};
use crate::db::types::{AttemptStatus, QuestionKind};
use crate::services::errors::AttemptError;
use crate::services::store::{AttemptStore, ExamCatalog};

#[derive(Debug)]
pub(crate) enum MarkingOutcome {
    Graded(ExamAttempt),
    /// Some questions still need a teacher's mark.
    NeedsReview { pending: usize },
    /// The attempt is not in a state the marker acts on.
    Skipped(AttemptStatus),
}

#[derive(Debug)]
pub(crate) struct GradeOutcome {
    pub(crate) answer: Answer,
    pub(crate) attempt_status: AttemptStatus,
    pub(crate) total_score: Option<f64>,
    pub(crate) pending: usize,
}

/// Points for an objective question, `None` when the question needs manual marking.
/// Unanswered objective questions score zero.
pub(crate) fn score_objective(question: &Question, response: Option<&Value>) -> Option<f64> {
    if !question.kind.is_objective() {
        return None;
    }
    let expected = question.correct_answer.as_deref()?;

    let correct = match (question.kind, response) {
        (_, None) | (_, Some(Value::Null)) => false,
        (QuestionKind::TrueFalse, Some(Value::Bool(value))) => {
            expected.trim().eq_ignore_ascii_case(if *value { "true" } else { "false" })
        }
        (QuestionKind::TrueFalse, Some(Value::String(value))) => {
            value.trim().eq_ignore_ascii_case(expected.trim())
        }
        (QuestionKind::SingleChoice, Some(Value::String(value))) => value.trim() == expected.trim(),
        (QuestionKind::SingleChoice, Some(Value::Number(index))) => index
            .as_u64()
            .and_then(|index| question.options.0.get(index as usize))
            .is_some_and(|option| option.trim() == expected.trim()),
        (QuestionKind::ShortText, Some(Value::String(value))) => {
            normalize_text(value) == normalize_text(expected)
        }
        _ => false,
    };

    Some(if correct { question.points } else { 0.0 })
}

fn normalize_text(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

#[derive(Clone)]
pub(crate) struct Grader {
    catalog: Arc<dyn ExamCatalog>,
    store: Arc<dyn AttemptStore>,
    clock: Arc<dyn Clock>,
}

impl Grader {
    pub(crate) fn new(
        catalog: Arc<dyn ExamCatalog>,
        store: Arc<dyn AttemptStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { catalog, store, clock }
    }

    /// Marks every objective question of a finalized attempt and grades it when nothing is
    /// left for a teacher.
    pub(crate) async fn auto_mark(&self, attempt_id: &str) -> Result<MarkingOutcome, AttemptError> {
        let attempt =
            self.store.find_attempt(attempt_id).await?.ok_or(AttemptError::AttemptNotFound)?;
        if !attempt.status.is_finalized() {
            return Ok(MarkingOutcome::Skipped(attempt.status));
        }

        let questions = self.catalog.list_questions(&attempt.exam_id).await?;
        let answers = self.answers_by_question(attempt_id).await?;
        let now = self.clock.now();

        for question in &questions {
            let answer = answers.get(question.id.as_str());
            if answer.is_some_and(|answer| answer.points_awarded.is_some()) {
                continue;
            }
            let Some(points) =
                score_objective(question, answer.map(|answer| &answer.response_value.0))
            else {
                continue;
            };
            let answer_id = Uuid::new_v4().to_string();
            self.store.award_points(&answer_id, attempt_id, &question.id, points, now).await?;
        }

        match self.complete_if_marked(&attempt, &questions).await? {
            (Some(graded), _) => {
                tracing::info!(
                    attempt_id,
                    total_score = graded.total_score.unwrap_or_default(),
                    "Attempt graded automatically"
                );
                Ok(MarkingOutcome::Graded(graded))
            }
            (None, pending) => Ok(MarkingOutcome::NeedsReview { pending }),
        }
    }

    /// Teacher-assigned points for one question. Allowed once the attempt is finalized,
    /// including regrades of an already graded attempt.
    pub(crate) async fn grade_answer(
        &self,
        attempt_id: &str,
        question_id: &str,
        points: f64,
    ) -> Result<GradeOutcome, AttemptError> {
        let attempt =
            self.store.find_attempt(attempt_id).await?.ok_or(AttemptError::AttemptNotFound)?;
        if !attempt.status.is_terminal() {
            return Err(AttemptError::AttemptNotFinalized);
        }

        let question = self
            .catalog
            .find_question(&attempt.exam_id, question_id)
            .await?
            .ok_or(AttemptError::QuestionNotFound)?;
        if !points.is_finite() || points < 0.0 || points > question.points {
            return Err(AttemptError::InvalidPoints { max: question.points });
        }

        let answer_id = Uuid::new_v4().to_string();
        let answer = self
            .store
            .award_points(&answer_id, attempt_id, question_id, points, self.clock.now())
            .await?;

        let questions = self.catalog.list_questions(&attempt.exam_id).await?;
        let (graded, pending) = self.complete_if_marked(&attempt, &questions).await?;
        let (attempt_status, total_score) = match graded {
            Some(graded) => (graded.status, graded.total_score),
            None => (attempt.status, attempt.total_score),
        };

        tracing::info!(attempt_id, question_id, points, pending, "Answer graded");

        Ok(GradeOutcome { answer, attempt_status, total_score, pending })
    }

    async fn answers_by_question(
        &self,
        attempt_id: &str,
    ) -> Result<HashMap<String, Answer>, AttemptError> {
        Ok(self
            .store
            .list_answers(attempt_id)
            .await?
            .into_iter()
            .map(|answer| (answer.question_id.clone(), answer))
            .collect())
    }

    async fn complete_if_marked(
        &self,
        attempt: &ExamAttempt,
        questions: &[Question],
    ) -> Result<(Option<ExamAttempt>, usize), AttemptError> {
        let answers = self.answers_by_question(&attempt.id).await?;

        let mut total = 0.0;
        let mut pending = 0;
        for question in questions {
            match answers.get(question.id.as_str()).and_then(|answer| answer.points_awarded) {
                Some(points) => total += points,
                None => pending += 1,
            }
        }

        if pending > 0 {
            return Ok((None, pending));
        }

        let graded =
            self.store.complete_grading(&attempt.id, total, self.clock.now()).await?;
        Ok((graded, 0))
    }
}
