use std::convert::TryFrom;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{named_params, Row};

use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::plan_change::{PlanChange, PlanChangeKind};

/// Append-only audit log of plan mutations.
pub trait PlanChangeLog: Send + Sync {
    fn append(&self, change: &PlanChange) -> AppResult<()>;
    /// Most recent first.
    fn list_recent(&self, user_id: &str, limit: usize) -> AppResult<Vec<PlanChange>>;
}

#[derive(Debug, Clone)]
struct PlanChangeRow {
    id: String,
    user_id: String,
    plan_id: String,
    kind: String,
    session_ids: String,
    reason: Option<String>,
    recorded_at: String,
}

impl TryFrom<&Row<'_>> for PlanChangeRow {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'_>) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            plan_id: row.get("plan_id")?,
            kind: row.get("kind")?,
            session_ids: row.get("session_ids")?,
            reason: row.get("reason")?,
            recorded_at: row.get("recorded_at")?,
        })
    }
}

impl TryFrom<PlanChangeRow> for PlanChange {
    type Error = AppError;

    fn try_from(row: PlanChangeRow) -> Result<Self, Self::Error> {
        let kind = PlanChangeKind::try_from(row.kind.as_str()).map_err(AppError::database)?;
        let recorded_at = DateTime::parse_from_rfc3339(&row.recorded_at)
            .map_err(|err| AppError::database(format!("invalid recorded_at: {err}")))?
            .with_timezone(&Utc);
        Ok(PlanChange {
            id: row.id,
            user_id: row.user_id,
            plan_id: row.plan_id,
            kind,
            session_ids: serde_json::from_str(&row.session_ids)?,
            reason: row.reason.unwrap_or_default(),
            recorded_at,
        })
    }
}

#[derive(Debug, Clone)]
pub struct SqlitePlanChangeLog {
    db: DbPool,
}

impl SqlitePlanChangeLog {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

impl PlanChangeLog for SqlitePlanChangeLog {
    fn append(&self, change: &PlanChange) -> AppResult<()> {
        let session_ids = serde_json::to_string(&change.session_ids)?;
        self.db.with_connection(|conn| {
            conn.execute(
                r#"
                    INSERT INTO plan_changes (
                        id, user_id, plan_id, kind, session_ids, reason, recorded_at
                    ) VALUES (
                        :id, :user_id, :plan_id, :kind, :session_ids, :reason, :recorded_at
                    )
                "#,
                named_params! {
                    ":id": change.id,
                    ":user_id": change.user_id,
                    ":plan_id": change.plan_id,
                    ":kind": change.kind.as_str(),
                    ":session_ids": session_ids,
                    ":reason": change.reason,
                    ":recorded_at": change.recorded_at.to_rfc3339(),
                },
            )?;
            Ok(())
        })
    }

    fn list_recent(&self, user_id: &str, limit: usize) -> AppResult<Vec<PlanChange>> {
        self.db.with_connection(|conn| {
            let mut stmt = conn.prepare(
                r#"
                    SELECT id, user_id, plan_id, kind, session_ids, reason, recorded_at
                    FROM plan_changes
                    WHERE user_id = :user_id
                    ORDER BY recorded_at DESC, rowid DESC
                    LIMIT :limit
                "#,
            )?;
            let rows = stmt
                .query_map(
                    named_params! {":user_id": user_id, ":limit": limit as i64},
                    |row| PlanChangeRow::try_from(row),
                )?
                .collect::<Result<Vec<_>, _>>()?;

            rows.into_iter().map(PlanChange::try_from).collect()
        })
    }
}

#[derive(Debug, Default)]
pub struct InMemoryPlanChangeLog {
    entries: Mutex<Vec<PlanChange>>,
}

impl InMemoryPlanChangeLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PlanChangeLog for InMemoryPlanChangeLog {
    fn append(&self, change: &PlanChange) -> AppResult<()> {
        self.entries
            .lock()
            .map_err(|_| AppError::other("change log lock poisoned"))?
            .push(change.clone());
        Ok(())
    }

    fn list_recent(&self, user_id: &str, limit: usize) -> AppResult<Vec<PlanChange>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| AppError::other("change log lock poisoned"))?;
        Ok(entries
            .iter()
            .rev()
            .filter(|change| change.user_id == user_id)
            .take(limit)
            .cloned()
            .collect())
    }
}
