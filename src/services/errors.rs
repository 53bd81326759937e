use thiserror::Error;
use time::PrimitiveDateTime;

use crate::services::store::StoreError;

#[derive(Debug, Error)]
pub(crate) enum AttemptError {
    #[error("exam not found")]
    ExamNotFound,
    #[error("attempt not found")]
    AttemptNotFound,
    #[error("question not found")]
    QuestionNotFound,
    #[error("exam is not open for attempts")]
    ExamNotActive,
    #[error("attempt already started")]
    AlreadyStarted { attempt_id: String, started_at: Option<PrimitiveDateTime> },
    #[error("attempt has not been started")]
    NotStarted,
    #[error("attempt has expired")]
    AttemptExpired,
    #[error("attempt is not in progress")]
    AttemptNotInProgress,
    #[error("attempt deadline has not been reached")]
    DeadlineNotReached,
    #[error("attempt is not finalized")]
    AttemptNotFinalized,
    #[error("points must be between 0 and {max}")]
    InvalidPoints { max: f64 },
    #[error("exam cannot be published")]
    ExamNotPublishable,
    #[error("persistence failure: {0}")]
    Persistence(#[from] StoreError),
}
