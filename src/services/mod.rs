pub(crate) mod errors;
pub(crate) mod grading;
pub(crate) mod marking;
pub(crate) mod store;
pub(crate) mod submission;
pub(crate) mod timing;
pub(crate) mod violations;
