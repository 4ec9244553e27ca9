use std::collections::HashMap;
use std::convert::TryFrom;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{named_params, Connection, OptionalExtension, Row};
use tracing::debug;

use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::study_plan::StudyPlan;

/// Storage for the single active plan of each user.
///
/// `save` is a compare-and-swap on [`StudyPlan::version`]: the stored version must
/// equal the one carried by the plan, otherwise [`AppError::Conflict`] is returned.
/// A plan with no stored row is inserted. On success the new version is returned.
pub trait PlanRepository: Send + Sync {
    fn get(&self, user_id: &str) -> AppResult<Option<StudyPlan>>;
    fn save(&self, plan: &StudyPlan) -> AppResult<i64>;
}

#[derive(Debug, Clone)]
pub struct StudyPlanRow {
    pub user_id: String,
    pub plan_id: String,
    pub payload: String,
    pub version: i64,
    pub updated_at: String,
}

impl TryFrom<&Row<'_>> for StudyPlanRow {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'_>) -> Result<Self, Self::Error> {
        Ok(Self {
            user_id: row.get("user_id")?,
            plan_id: row.get("plan_id")?,
            payload: row.get("payload")?,
            version: row.get("version")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

impl StudyPlanRow {
    pub fn into_plan(self) -> AppResult<StudyPlan> {
        let mut plan: StudyPlan = serde_json::from_str(&self.payload)?;
        // The column is authoritative; the payload may lag one write behind.
        plan.version = self.version;
        Ok(plan)
    }
}

#[derive(Debug, Clone)]
pub struct SqlitePlanRepository {
    db: DbPool,
}

impl SqlitePlanRepository {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    pub fn find_row(conn: &Connection, user_id: &str) -> AppResult<Option<StudyPlanRow>> {
        let row = conn
            .query_row(
                "SELECT user_id, plan_id, payload, version, updated_at FROM study_plans WHERE user_id = ?1",
                [user_id],
                |row| StudyPlanRow::try_from(row),
            )
            .optional()?;
        Ok(row)
    }

    fn insert(conn: &Connection, plan: &StudyPlan, payload: &str, version: i64) -> AppResult<()> {
        conn.execute(
            r#"
                INSERT INTO study_plans (
                    user_id, plan_id, payload, version, updated_at,
                    progress_percentage, session_count
                ) VALUES (
                    :user_id, :plan_id, :payload, :version, :updated_at,
                    :progress, :session_count
                )
            "#,
            named_params! {
                ":user_id": plan.user_id,
                ":plan_id": plan.id,
                ":payload": payload,
                ":version": version,
                ":updated_at": Utc::now().to_rfc3339(),
                ":progress": plan.progress_percentage,
                ":session_count": plan.sessions.len() as i64,
            },
        )?;
        Ok(())
    }

    fn compare_and_swap(conn: &Connection, plan: &StudyPlan, payload: &str) -> AppResult<usize> {
        let updated = conn.execute(
            r#"
                UPDATE study_plans SET
                    plan_id = :plan_id,
                    payload = :payload,
                    version = version + 1,
                    updated_at = :updated_at,
                    progress_percentage = :progress,
                    session_count = :session_count
                WHERE user_id = :user_id AND version = :expected
            "#,
            named_params! {
                ":user_id": plan.user_id,
                ":plan_id": plan.id,
                ":payload": payload,
                ":updated_at": Utc::now().to_rfc3339(),
                ":progress": plan.progress_percentage,
                ":session_count": plan.sessions.len() as i64,
                ":expected": plan.version,
            },
        )?;
        Ok(updated)
    }
}

impl PlanRepository for SqlitePlanRepository {
    fn get(&self, user_id: &str) -> AppResult<Option<StudyPlan>> {
        self.db.with_connection(|conn| {
            Self::find_row(conn, user_id)?
                .map(StudyPlanRow::into_plan)
                .transpose()
        })
    }

    fn save(&self, plan: &StudyPlan) -> AppResult<i64> {
        let payload = serde_json::to_string(plan)?;
        self.db.with_transaction(|tx| {
            let Some(stored) = Self::find_row(tx, &plan.user_id)? else {
                let version = plan.version + 1;
                Self::insert(tx, plan, &payload, version)?;
                debug!(target: "app::db", user_id = %plan.user_id, version, "inserted study plan");
                return Ok(version);
            };

            if Self::compare_and_swap(tx, plan, &payload)? == 0 {
                return Err(AppError::conflict(format!(
                    "plan for user {} is at version {}, write was based on {}",
                    plan.user_id, stored.version, plan.version
                )));
            }
            let version = plan.version + 1;
            debug!(target: "app::db", user_id = %plan.user_id, version, "updated study plan");
            Ok(version)
        })
    }
}

/// Process-local repository used by tests and embedders without a database.
#[derive(Debug, Default)]
pub struct InMemoryPlanRepository {
    plans: Mutex<HashMap<String, StudyPlan>>,
}

impl InMemoryPlanRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PlanRepository for InMemoryPlanRepository {
    fn get(&self, user_id: &str) -> AppResult<Option<StudyPlan>> {
        let plans = self
            .plans
            .lock()
            .map_err(|_| AppError::other("plan store lock poisoned"))?;
        Ok(plans.get(user_id).cloned())
    }

    fn save(&self, plan: &StudyPlan) -> AppResult<i64> {
        let mut plans = self
            .plans
            .lock()
            .map_err(|_| AppError::other("plan store lock poisoned"))?;

        if let Some(stored) = plans.get(&plan.user_id) {
            if stored.version != plan.version {
                return Err(AppError::conflict(format!(
                    "plan for user {} is at version {}, write was based on {}",
                    plan.user_id, stored.version, plan.version
                )));
            }
        }

        let mut stored = plan.clone();
        stored.version = plan.version + 1;
        let version = stored.version;
        plans.insert(plan.user_id.clone(), stored);
        Ok(version)
    }
}
