use time::{Duration, PrimitiveDateTime};

use crate::db::models::ExamAttempt;
use crate::db::types::AttemptStatus;

/// `started_at + duration`. `None` for attempts that never started.
pub(crate) fn deadline(attempt: &ExamAttempt) -> Option<PrimitiveDateTime> {
    let started_at = attempt.started_at?;
    let duration = attempt.duration_minutes?;
    Some(started_at + Duration::minutes(duration as i64))
}

/// `now` has reached the deadline. Attempts that never started are never overdue.
pub(crate) fn is_overdue(attempt: &ExamAttempt, now: PrimitiveDateTime) -> bool {
    deadline(attempt).is_some_and(|deadline| now >= deadline)
}

/// Seconds left on the clock, clamped at zero.
///
/// A partial second rounds up, so the value is positive exactly while the attempt is still
/// before its deadline. Returns the full duration for NOT_STARTED attempts and zero once the
/// attempt is terminal.
pub(crate) fn remaining_seconds(attempt: &ExamAttempt, now: PrimitiveDateTime) -> i64 {
    match attempt.status {
        AttemptStatus::NotStarted => {
            attempt.duration_minutes.map(|minutes| minutes as i64 * 60).unwrap_or(0)
        }
        AttemptStatus::InProgress => match deadline(attempt) {
            Some(deadline) => ceil_seconds(deadline - now),
            None => 0,
        },
        _ => 0,
    }
}

fn ceil_seconds(left: Duration) -> i64 {
    if left <= Duration::ZERO {
        return 0;
    }
    let whole = left.whole_seconds();
    if left.subsec_nanoseconds() > 0 {
        whole + 1
    } else {
        whole
    }
}

/// Status as observed at `now`: an IN_PROGRESS attempt at or past its deadline reads as
/// EXPIRED even before the transition is persisted.
pub(crate) fn effective_status(attempt: &ExamAttempt, now: PrimitiveDateTime) -> AttemptStatus {
    if attempt.status == AttemptStatus::InProgress && is_overdue(attempt, now) {
        AttemptStatus::Expired
    } else {
        attempt.status
    }
}
