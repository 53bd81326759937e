use std::future::Future;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use time::PrimitiveDateTime;
use uuid::Uuid;

use crate::core::time::Clock;
use crate::db::models::{Answer, Exam, ExamAttempt, Question};
use crate::db::types::{AttemptStatus, ExamStatus, SubmitTrigger};
use crate::services::errors::AttemptError;
use crate::services::marking::{notify_finalized, MarkingQueue};
use crate::services::store::{AttemptStore, ExamCatalog, StoreError};
use crate::services::timing;

/// Upper bound on the marking hand-off inside a submit request.
pub(crate) const MARKING_NOTIFY_TIMEOUT: StdDuration = StdDuration::from_secs(2);

#[derive(Debug)]
pub(crate) struct StartedAttempt {
    pub(crate) attempt: ExamAttempt,
    pub(crate) exam: Exam,
    pub(crate) questions: Vec<Question>,
    pub(crate) remaining_seconds: i64,
    pub(crate) deadline: Option<PrimitiveDateTime>,
}

#[derive(Debug)]
pub(crate) struct SubmitOutcome {
    pub(crate) attempt: ExamAttempt,
    /// `true` only for the caller whose write performed the terminal transition.
    pub(crate) transitioned: bool,
}

#[derive(Debug)]
pub(crate) struct AttemptView {
    pub(crate) attempt: ExamAttempt,
    pub(crate) effective_status: AttemptStatus,
    pub(crate) remaining_seconds: i64,
    pub(crate) deadline: Option<PrimitiveDateTime>,
    pub(crate) answers: Vec<Answer>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct SweepReport {
    pub(crate) expired: usize,
    pub(crate) forced: usize,
    pub(crate) requeued: usize,
}

/// Owns every status transition of an attempt.
#[derive(Clone)]
pub(crate) struct SubmissionController {
    catalog: Arc<dyn ExamCatalog>,
    store: Arc<dyn AttemptStore>,
    marking: Arc<dyn MarkingQueue>,
    clock: Arc<dyn Clock>,
    notify_timeout: StdDuration,
}

impl SubmissionController {
    pub(crate) fn new(
        catalog: Arc<dyn ExamCatalog>,
        store: Arc<dyn AttemptStore>,
        marking: Arc<dyn MarkingQueue>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { catalog, store, marking, clock, notify_timeout: MARKING_NOTIFY_TIMEOUT }
    }

    #[cfg(test)]
    pub(crate) fn with_notify_timeout(mut self, timeout: StdDuration) -> Self {
        self.notify_timeout = timeout;
        self
    }

    pub(crate) fn now(&self) -> PrimitiveDateTime {
        self.clock.now()
    }

    /// Fails unless the attempt accepts answers right now.
    pub(crate) fn check_writable(&self, attempt: &ExamAttempt) -> Result<(), AttemptError> {
        ensure_writable(attempt, self.clock.now())
    }

    pub(crate) async fn find_attempt(&self, attempt_id: &str) -> Result<ExamAttempt, AttemptError> {
        let store = self.store.as_ref();
        retry_once("find_attempt", move || store.find_attempt(attempt_id))
            .await?
            .ok_or(AttemptError::AttemptNotFound)
    }

    pub(crate) async fn find_attempt_for_student(
        &self,
        exam_id: &str,
        student_id: &str,
    ) -> Result<ExamAttempt, AttemptError> {
        self.store
            .find_attempt_for_student(exam_id, student_id)
            .await?
            .ok_or(AttemptError::AttemptNotFound)
    }

    /// Creates the NOT_STARTED attempt for the pair if it does not exist yet.
    pub(crate) async fn open(
        &self,
        exam_id: &str,
        student_id: &str,
    ) -> Result<ExamAttempt, AttemptError> {
        let exam = self.catalog.find_exam(exam_id).await?.ok_or(AttemptError::ExamNotFound)?;
        if exam.status != ExamStatus::Published {
            return Err(AttemptError::ExamNotActive);
        }

        let now = self.clock.now();
        let attempt_id = Uuid::new_v4().to_string();
        Ok(self.store.open_attempt(&attempt_id, exam_id, student_id, now).await?)
    }

    /// NOT_STARTED -> IN_PROGRESS.
    ///
    /// A second start never resets the clock: it fails with `AlreadyStarted` carrying the
    /// original `started_at`.
    pub(crate) async fn start(
        &self,
        exam_id: &str,
        student_id: &str,
    ) -> Result<StartedAttempt, AttemptError> {
        let now = self.clock.now();
        let exam = self.catalog.find_exam(exam_id).await?.ok_or(AttemptError::ExamNotFound)?;

        if let Some(existing) = self.store.find_attempt_for_student(exam_id, student_id).await? {
            if existing.status != AttemptStatus::NotStarted {
                return Err(already_started(&existing));
            }
        }

        if exam.status != ExamStatus::Published || !exam.window_contains(now) {
            return Err(AttemptError::ExamNotActive);
        }

        let attempt_id = Uuid::new_v4().to_string();
        let opened = self.store.open_attempt(&attempt_id, exam_id, student_id, now).await?;
        if opened.status != AttemptStatus::NotStarted {
            return Err(already_started(&opened));
        }

        let store = self.store.as_ref();
        let opened_id = opened.id.as_str();
        let duration = exam.duration_minutes;
        let attempt =
            match retry_once("begin_attempt", move || store.begin_attempt(opened_id, now, duration))
                .await?
            {
                Some(attempt) => attempt,
                None => {
                    let current = self.find_attempt(opened_id).await?;
                    return Err(already_started(&current));
                }
            };

        metrics::counter!("attempts_started_total").increment(1);
        tracing::info!(
            attempt_id = %attempt.id,
            exam_id,
            student_id,
            duration_minutes = duration,
            "Attempt started"
        );

        let questions = self.catalog.list_questions(exam_id).await?;
        Ok(StartedAttempt {
            remaining_seconds: timing::remaining_seconds(&attempt, now),
            deadline: timing::deadline(&attempt),
            attempt,
            exam,
            questions,
        })
    }

    /// Upserts the answer for `question_id`. Rejected once the attempt left IN_PROGRESS or its
    /// deadline passed, even if the expiry was never persisted.
    pub(crate) async fn save_answer(
        &self,
        attempt_id: &str,
        question_id: &str,
        value: &serde_json::Value,
    ) -> Result<Answer, AttemptError> {
        let now = self.clock.now();
        let attempt = self.find_attempt(attempt_id).await?;
        ensure_writable(&attempt, now)?;

        self.catalog
            .find_question(&attempt.exam_id, question_id)
            .await?
            .ok_or(AttemptError::QuestionNotFound)?;

        let answer_id = Uuid::new_v4().to_string();
        if let Some(answer) =
            self.store.save_answer(&answer_id, attempt_id, question_id, value, now).await?
        {
            return Ok(answer);
        }

        // The conditional write lost against a concurrent transition or the deadline.
        let current = self.find_attempt(attempt_id).await?;
        ensure_writable(&current, self.clock.now())?;
        Err(AttemptError::AttemptExpired)
    }

    pub(crate) async fn submit_for_student(
        &self,
        exam_id: &str,
        student_id: &str,
        trigger: SubmitTrigger,
    ) -> Result<SubmitOutcome, AttemptError> {
        let attempt = self.find_attempt_for_student(exam_id, student_id).await?;
        self.submit(&attempt.id, trigger).await
    }

    /// IN_PROGRESS -> SUBMITTED / AUTO_SUBMITTED / EXPIRED.
    ///
    /// Idempotent: an attempt that is already terminal is returned unchanged, whichever trigger
    /// finalized it. Of several concurrent calls exactly one reports `transitioned`.
    pub(crate) async fn submit(
        &self,
        attempt_id: &str,
        trigger: SubmitTrigger,
    ) -> Result<SubmitOutcome, AttemptError> {
        let now = self.clock.now();
        let attempt = self.find_attempt(attempt_id).await?;

        match attempt.status {
            AttemptStatus::NotStarted => return Err(AttemptError::NotStarted),
            AttemptStatus::InProgress => {}
            _ => return Ok(SubmitOutcome { attempt, transitioned: false }),
        }

        let target = target_status(&attempt, trigger, now)?;

        let store = self.store.as_ref();
        let finalized = retry_once("finalize_attempt", move || {
            store.finalize_attempt(attempt_id, target, trigger, now)
        })
        .await?;

        let Some(attempt) = finalized else {
            let current = self.find_attempt(attempt_id).await?;
            if current.status.is_terminal() {
                tracing::debug!(
                    attempt_id,
                    trigger = trigger.as_str(),
                    status = current.status.as_str(),
                    "Attempt already finalized by a concurrent submit"
                );
                return Ok(SubmitOutcome { attempt: current, transitioned: false });
            }
            return Err(AttemptError::AttemptNotInProgress);
        };

        metrics::counter!(
            "attempts_finalized_total",
            "status" => attempt.status.as_str(),
            "trigger" => trigger.as_str()
        )
        .increment(1);
        tracing::info!(
            attempt_id,
            exam_id = %attempt.exam_id,
            student_id = %attempt.student_id,
            status = attempt.status.as_str(),
            trigger = trigger.as_str(),
            "Attempt finalized"
        );

        notify_finalized(self.marking.as_ref(), attempt_id, now, self.notify_timeout).await;

        Ok(SubmitOutcome { attempt, transitioned: true })
    }

    pub(crate) async fn view(&self, attempt_id: &str) -> Result<AttemptView, AttemptError> {
        let now = self.clock.now();
        let attempt = self.find_attempt(attempt_id).await?;
        let answers = self.store.list_answers(attempt_id).await?;

        Ok(AttemptView {
            effective_status: timing::effective_status(&attempt, now),
            remaining_seconds: timing::remaining_seconds(&attempt, now),
            deadline: timing::deadline(&attempt),
            attempt,
            answers,
        })
    }

    pub(crate) async fn soft_delete(&self, attempt_id: &str) -> Result<(), AttemptError> {
        let now = self.clock.now();
        if !self.store.soft_delete_attempt(attempt_id, now).await? {
            return Err(AttemptError::AttemptNotFound);
        }
        tracing::info!(attempt_id, "Attempt soft-deleted");
        Ok(())
    }

    /// Finalizes overdue and over-threshold attempts and re-enqueues finalized attempts that
    /// never reached the marking queue. Per-attempt failures are logged and skipped.
    pub(crate) async fn sweep(
        &self,
        violation_threshold: u32,
        batch: i64,
    ) -> Result<SweepReport, AttemptError> {
        let mut report = SweepReport::default();
        let now = self.clock.now();

        for attempt in self.store.list_overdue_attempts(now, batch).await? {
            match self.submit(&attempt.id, SubmitTrigger::Timer).await {
                Ok(outcome) if outcome.transitioned => report.expired += 1,
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(error = %err, attempt_id = %attempt.id, "Failed to expire attempt");
                }
            }
        }

        let threshold = i32::try_from(violation_threshold).unwrap_or(i32::MAX);
        for attempt in self.store.list_over_violation_threshold(threshold, batch).await? {
            match self.submit(&attempt.id, SubmitTrigger::Violation).await {
                Ok(outcome) if outcome.transitioned => {
                    metrics::counter!("forced_submissions_total").increment(1);
                    report.forced += 1;
                }
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(
                        error = %err,
                        attempt_id = %attempt.id,
                        "Failed to force-submit attempt over violation threshold"
                    );
                }
            }
        }

        report.requeued = self.marking.enqueue_missing(self.clock.now(), batch).await?.len();

        if report.expired > 0 {
            metrics::counter!("expired_attempts_swept_total").increment(report.expired as u64);
        }

        Ok(report)
    }
}

fn already_started(attempt: &ExamAttempt) -> AttemptError {
    AttemptError::AlreadyStarted { attempt_id: attempt.id.clone(), started_at: attempt.started_at }
}

fn ensure_writable(attempt: &ExamAttempt, now: PrimitiveDateTime) -> Result<(), AttemptError> {
    match timing::effective_status(attempt, now) {
        AttemptStatus::InProgress => Ok(()),
        AttemptStatus::NotStarted => Err(AttemptError::NotStarted),
        AttemptStatus::Expired => Err(AttemptError::AttemptExpired),
        _ => Err(AttemptError::AttemptNotInProgress),
    }
}

/// Terminal status for an IN_PROGRESS attempt. From the deadline on every trigger yields EXPIRED.
fn target_status(
    attempt: &ExamAttempt,
    trigger: SubmitTrigger,
    now: PrimitiveDateTime,
) -> Result<AttemptStatus, AttemptError> {
    let overdue = timing::is_overdue(attempt, now);
    match (trigger, overdue) {
        (_, true) => Ok(AttemptStatus::Expired),
        (SubmitTrigger::Timer, false) => Err(AttemptError::DeadlineNotReached),
        (SubmitTrigger::User, false) => Ok(AttemptStatus::Submitted),
        (SubmitTrigger::Violation, false) => Ok(AttemptStatus::AutoSubmitted),
    }
}

async fn retry_once<T, F, Fut>(operation: &'static str, mut call: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    match call().await {
        Ok(value) => Ok(value),
        Err(err) => {
            tracing::warn!(error = %err, operation, "Persistence failure, retrying once");
            call().await
        }
    }
}
