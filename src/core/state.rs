use std::sync::Arc;

use sqlx::PgPool;

use crate::core::time::{Clock, SystemClock};
use crate::core::{config::Settings, redis::RedisHandle};
use crate::services::grading::Grader;
use crate::services::marking::{MarkingQueue, PgMarkingQueue};
use crate::services::store::{AttemptStore, ExamCatalog, PgStore};
use crate::services::submission::SubmissionController;
use crate::services::violations::ViolationTracker;

/// Storage and time sources the lifecycle services are built on.
pub(crate) struct Components {
    pub(crate) catalog: Arc<dyn ExamCatalog>,
    pub(crate) store: Arc<dyn AttemptStore>,
    pub(crate) marking: Arc<dyn MarkingQueue>,
    pub(crate) clock: Arc<dyn Clock>,
}

impl Components {
    pub(crate) fn postgres(db: &PgPool) -> Self {
        let store = Arc::new(PgStore::new(db.clone()));
        Self {
            catalog: store.clone(),
            store,
            marking: Arc::new(PgMarkingQueue::new(db.clone())),
            clock: Arc::new(SystemClock),
        }
    }
}

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    db: PgPool,
    redis: RedisHandle,
    catalog: Arc<dyn ExamCatalog>,
    clock: Arc<dyn Clock>,
    submissions: SubmissionController,
    violations: ViolationTracker,
    grader: Grader,
}

impl AppState {
    pub(crate) fn new(settings: Settings, db: PgPool, redis: RedisHandle) -> Self {
        let components = Components::postgres(&db);
        Self::from_components(settings, db, redis, components)
    }

    pub(crate) fn from_components(
        settings: Settings,
        db: PgPool,
        redis: RedisHandle,
        components: Components,
    ) -> Self {
        let Components { catalog, store, marking, clock } = components;

        let submissions =
            SubmissionController::new(catalog.clone(), store.clone(), marking, clock.clone());
        let violations = ViolationTracker::new(
            catalog.clone(),
            store.clone(),
            submissions.clone(),
            settings.exam().violation_threshold,
        );
        let grader = Grader::new(catalog.clone(), store, clock.clone());

        Self {
            inner: Arc::new(InnerState {
                settings,
                db,
                redis,
                catalog,
                clock,
                submissions,
                violations,
                grader,
            }),
        }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn db(&self) -> &PgPool {
        &self.inner.db
    }

    pub(crate) fn redis(&self) -> &RedisHandle {
        &self.inner.redis
    }

    pub(crate) fn catalog(&self) -> &dyn ExamCatalog {
        self.inner.catalog.as_ref()
    }

    pub(crate) fn clock(&self) -> &dyn Clock {
        self.inner.clock.as_ref()
    }

    pub(crate) fn submissions(&self) -> &SubmissionController {
        &self.inner.submissions
    }

    pub(crate) fn violations(&self) -> &ViolationTracker {
        &self.inner.violations
    }

    pub(crate) fn grader(&self) -> &Grader {
        &self.inner.grader
    }
}
