mod attempts;
mod catalog;
mod monitoring;

pub(super) use attempts::{open_attempt, start_attempt, submit_attempt};
pub(super) use catalog::{create_exam, get_exam, publish_exam};
pub(super) use monitoring::list_exam_attempts;
