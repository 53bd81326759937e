use serde::{Deserialize, Serialize};
use sqlx::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "examstatus", rename_all = "lowercase")]
pub(crate) enum ExamStatus {
    Draft,
    Published,
    Archived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "questionkind", rename_all = "snake_case")]
pub(crate) enum QuestionKind {
    SingleChoice,
    TrueFalse,
    ShortText,
    Essay,
}

impl QuestionKind {
    /// Objective questions are marked by comparing against `correct_answer`.
    pub(crate) fn is_objective(self) -> bool {
        !matches!(self, QuestionKind::Essay)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "attemptstatus", rename_all = "snake_case")]
pub(crate) enum AttemptStatus {
    NotStarted,
    InProgress,
    Submitted,
    AutoSubmitted,
    Expired,
    Graded,
}

impl AttemptStatus {
    /// Submitted, auto-submitted or expired: the attempt has a `submitted_at`.
    pub(crate) fn is_finalized(self) -> bool {
        matches!(self, AttemptStatus::Submitted | AttemptStatus::AutoSubmitted | AttemptStatus::Expired)
    }

    pub(crate) fn is_terminal(self) -> bool {
        self.is_finalized() || self == AttemptStatus::Graded
    }

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            AttemptStatus::NotStarted => "not_started",
            AttemptStatus::InProgress => "in_progress",
            AttemptStatus::Submitted => "submitted",
            AttemptStatus::AutoSubmitted => "auto_submitted",
            AttemptStatus::Expired => "expired",
            AttemptStatus::Graded => "graded",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "submittrigger", rename_all = "lowercase")]
pub(crate) enum SubmitTrigger {
    User,
    Timer,
    Violation,
}

impl SubmitTrigger {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            SubmitTrigger::User => "user",
            SubmitTrigger::Timer => "timer",
            SubmitTrigger::Violation => "violation",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "violationtype", rename_all = "snake_case")]
pub(crate) enum ViolationType {
    TabSwitch,
    WindowBlur,
    FaceMismatch,
    NoFace,
    MultipleFaces,
    CopyPaste,
    FullscreenExit,
    Other,
}

impl ViolationType {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            ViolationType::TabSwitch => "tab_switch",
            ViolationType::WindowBlur => "window_blur",
            ViolationType::FaceMismatch => "face_mismatch",
            ViolationType::NoFace => "no_face",
            ViolationType::MultipleFaces => "multiple_faces",
            ViolationType::CopyPaste => "copy_paste",
            ViolationType::FullscreenExit => "fullscreen_exit",
            ViolationType::Other => "other",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "markingjobstatus", rename_all = "snake_case")]
pub(crate) enum MarkingJobStatus {
    Pending,
    Processing,
    Completed,
    NeedsReview,
    Failed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finalized_statuses_carry_submitted_at() {
        let finalized = [AttemptStatus::Submitted, AttemptStatus::AutoSubmitted, AttemptStatus::Expired];
        for status in finalized {
            assert!(status.is_finalized());
            assert!(status.is_terminal());
        }
        assert!(!AttemptStatus::Graded.is_finalized());
        assert!(AttemptStatus::Graded.is_terminal());
        assert!(!AttemptStatus::InProgress.is_terminal());
        assert!(!AttemptStatus::NotStarted.is_terminal());
    }

    #[test]
    fn serde_names_match_database_labels() {
        let json = serde_json::to_value(AttemptStatus::AutoSubmitted).unwrap();
        assert_eq!(json, serde_json::json!(AttemptStatus::AutoSubmitted.as_str()));
        let parsed: ViolationType = serde_json::from_value(serde_json::json!("tab_switch")).unwrap();
        assert_eq!(parsed, ViolationType::TabSwitch);
        assert!(serde_json::from_value::<ViolationType>(serde_json::json!("sneezing")).is_err());
    }
}
