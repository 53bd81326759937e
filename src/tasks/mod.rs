pub(crate) mod maintenance;
pub(crate) mod marking;
pub(crate) mod scheduler;
