use std::sync::Arc;

use crate::db::DbPool;

pub mod companion_repository;
pub mod plan_change_repository;
pub mod plan_repository;
pub mod settings_repository;

use companion_repository::{
    CompanionRepository, InMemoryCompanionRepository, SqliteCompanionRepository,
};
use plan_change_repository::{InMemoryPlanChangeLog, PlanChangeLog, SqlitePlanChangeLog};
use plan_repository::{InMemoryPlanRepository, PlanRepository, SqlitePlanRepository};

/// The storage seams the planner facade depends on.
#[derive(Clone)]
pub struct PlannerRepositories {
    pub plans: Arc<dyn PlanRepository>,
    pub changes: Arc<dyn PlanChangeLog>,
    pub companions: Arc<dyn CompanionRepository>,
}

impl PlannerRepositories {
    pub fn sqlite(db: DbPool) -> Self {
        Self {
            plans: Arc::new(SqlitePlanRepository::new(db.clone())),
            changes: Arc::new(SqlitePlanChangeLog::new(db.clone())),
            companions: Arc::new(SqliteCompanionRepository::new(db)),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            plans: Arc::new(InMemoryPlanRepository::new()),
            changes: Arc::new(InMemoryPlanChangeLog::new()),
            companions: Arc::new(InMemoryCompanionRepository::new()),
        }
    }

    pub fn with_plans(mut self, plans: Arc<dyn PlanRepository>) -> Self {
        self.plans = plans;
        self
    }
}
