use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use time::PrimitiveDateTime;
use uuid::Uuid;

use crate::db::models::{ExamAttempt, ViolationEvent};
use crate::db::types::{AttemptStatus, SubmitTrigger, ViolationType};
use crate::services::errors::AttemptError;
use crate::services::store::{AttemptStore, ExamCatalog, NewFlag, NewViolation};
use crate::services::submission::SubmissionController;
use crate::services::timing;

/// Events shown per attempt on the live monitor.
pub(crate) const MONITOR_RECENT_EVENTS: i64 = 10;

#[derive(Debug)]
pub(crate) struct ViolationOutcome {
    pub(crate) event: ViolationEvent,
    pub(crate) violation_count: i32,
    pub(crate) threshold_exceeded: bool,
    /// `true` only when this recording caused the forced submission.
    pub(crate) forced_submission: bool,
    pub(crate) attempt: ExamAttempt,
}

#[derive(Debug)]
pub(crate) struct ViolationReport {
    pub(crate) attempt: ExamAttempt,
    pub(crate) events: Vec<ViolationEvent>,
    pub(crate) counts: BTreeMap<&'static str, usize>,
    pub(crate) threshold: u32,
    pub(crate) threshold_reached: bool,
}

#[derive(Debug)]
pub(crate) struct MonitoredAttempt {
    pub(crate) attempt: ExamAttempt,
    pub(crate) effective_status: AttemptStatus,
    pub(crate) remaining_seconds: i64,
    pub(crate) deadline: Option<PrimitiveDateTime>,
    /// Newest first, at most `MONITOR_RECENT_EVENTS`.
    pub(crate) recent_violations: Vec<ViolationEvent>,
}

#[derive(Debug)]
pub(crate) struct FlagOutcome {
    pub(crate) event: ViolationEvent,
    pub(crate) attempt: ExamAttempt,
}

/// Append-only proctoring log with a threshold-triggered forced submission.
#[derive(Clone)]
pub(crate) struct ViolationTracker {
    catalog: Arc<dyn ExamCatalog>,
    store: Arc<dyn AttemptStore>,
    submissions: SubmissionController,
    threshold: u32,
}

impl ViolationTracker {
    pub(crate) fn new(
        catalog: Arc<dyn ExamCatalog>,
        store: Arc<dyn AttemptStore>,
        submissions: SubmissionController,
        threshold: u32,
    ) -> Self {
        Self { catalog, store, submissions, threshold }
    }

    pub(crate) fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Records the event regardless of attempt status. Reaching the threshold on an
    /// IN_PROGRESS attempt force-submits it with trigger VIOLATION.
    pub(crate) async fn record_violation(
        &self,
        attempt_id: &str,
        violation_type: ViolationType,
        details: serde_json::Value,
    ) -> Result<ViolationOutcome, AttemptError> {
        let (event, attempt) = self
            .store
            .record_violation(NewViolation {
                id: Uuid::new_v4().to_string(),
                attempt_id: attempt_id.to_string(),
                violation_type,
                details,
                occurred_at: self.submissions.now(),
            })
            .await?
            .ok_or(AttemptError::AttemptNotFound)?;

        metrics::counter!("violations_recorded_total", "type" => violation_type.as_str())
            .increment(1);

        let violation_count = attempt.violation_count;
        let threshold_exceeded = violation_count.max(0) as u32 >= self.threshold;
        tracing::info!(
            attempt_id,
            violation_type = violation_type.as_str(),
            violation_count,
            threshold = self.threshold,
            "Violation recorded"
        );

        if !threshold_exceeded || attempt.status != AttemptStatus::InProgress {
            return Ok(ViolationOutcome {
                event,
                violation_count,
                threshold_exceeded,
                forced_submission: false,
                attempt,
            });
        }

        // The event is already durable. A failed submission is picked up by the sweep.
        match self.submissions.submit(attempt_id, SubmitTrigger::Violation).await {
            Ok(outcome) => {
                if outcome.transitioned {
                    metrics::counter!("forced_submissions_total").increment(1);
                    tracing::warn!(
                        attempt_id,
                        violation_count,
                        status = outcome.attempt.status.as_str(),
                        "Attempt force-submitted after violation threshold"
                    );
                }
                Ok(ViolationOutcome {
                    event,
                    violation_count,
                    threshold_exceeded,
                    forced_submission: outcome.transitioned,
                    attempt: outcome.attempt,
                })
            }
            Err(err) => {
                tracing::error!(
                    error = %err,
                    attempt_id,
                    "Forced submission failed after violation threshold"
                );
                Ok(ViolationOutcome {
                    event,
                    violation_count,
                    threshold_exceeded,
                    forced_submission: false,
                    attempt,
                })
            }
        }
    }

    pub(crate) async fn report(&self, attempt_id: &str) -> Result<ViolationReport, AttemptError> {
        let attempt = self.submissions.find_attempt(attempt_id).await?;
        let events = self.store.list_violations(attempt_id).await?;

        let mut counts = BTreeMap::new();
        for event in &events {
            *counts.entry(event.violation_type.as_str()).or_insert(0) += 1;
        }

        Ok(ViolationReport {
            threshold_reached: attempt.violation_count.max(0) as u32 >= self.threshold,
            threshold: self.threshold,
            attempt,
            events,
            counts,
        })
    }

    /// Attempts of an exam with their latest proctoring events.
    ///
    /// `status` matches the status as observed now, so an overdue IN_PROGRESS attempt is listed
    /// under `expired` and not under `in_progress`.
    pub(crate) async fn monitor(
        &self,
        exam_id: &str,
        status: Option<AttemptStatus>,
    ) -> Result<Vec<MonitoredAttempt>, AttemptError> {
        self.catalog.find_exam(exam_id).await?.ok_or(AttemptError::ExamNotFound)?;

        let stored = match status {
            Some(AttemptStatus::Expired) => None,
            other => other,
        };
        let now = self.submissions.now();
        let attempts = self.store.list_exam_attempts(exam_id, stored).await?;

        let mut recent: HashMap<String, Vec<ViolationEvent>> = HashMap::new();
        for event in self.store.list_recent_violations(exam_id, MONITOR_RECENT_EVENTS).await? {
            recent.entry(event.attempt_id.clone()).or_default().push(event);
        }

        Ok(attempts
            .into_iter()
            .filter_map(|attempt| {
                let effective_status = timing::effective_status(&attempt, now);
                if status.is_some_and(|wanted| wanted != effective_status) {
                    return None;
                }
                Some(MonitoredAttempt {
                    effective_status,
                    remaining_seconds: timing::remaining_seconds(&attempt, now),
                    deadline: timing::deadline(&attempt),
                    recent_violations: recent.remove(&attempt.id).unwrap_or_default(),
                    attempt,
                })
            })
            .collect())
    }

    /// Sets or clears the staff review flag and logs it as an `other` event.
    ///
    /// Allowed in any status. The flag never counts toward the violation threshold and never
    /// changes the attempt status.
    pub(crate) async fn flag(
        &self,
        attempt_id: &str,
        flagged: bool,
        reason: &str,
        flagged_by: &str,
    ) -> Result<FlagOutcome, AttemptError> {
        let details = serde_json::json!({
            "flagged": flagged,
            "reason": reason,
            "flagged_by": flagged_by,
        });
        let (event, attempt) = self
            .store
            .flag_attempt(NewFlag {
                event_id: Uuid::new_v4().to_string(),
                attempt_id: attempt_id.to_string(),
                flagged,
                reason: reason.to_string(),
                flagged_by: flagged_by.to_string(),
                details,
                now: self.submissions.now(),
            })
            .await?
            .ok_or(AttemptError::AttemptNotFound)?;

        let label = if flagged { "set" } else { "cleared" };
        metrics::counter!("attempts_flagged_total", "action" => label).increment(1);
        tracing::warn!(attempt_id, flagged, flagged_by, reason, "Attempt review flag changed");

        Ok(FlagOutcome { event, attempt })
    }
}
