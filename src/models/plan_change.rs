use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::study_plan::StudyPlan;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum PlanChangeKind {
    Generated,
    CourseMerged,
    MergeSkipped,
    SessionCompleted,
    SessionReopened,
    SessionMissed,
    SessionRescheduled,
    SuggestionApplied,
    SessionRemoved,
}

impl PlanChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlanChangeKind::Generated => "generated",
            PlanChangeKind::CourseMerged => "course-merged",
            PlanChangeKind::MergeSkipped => "merge-skipped",
            PlanChangeKind::SessionCompleted => "session-completed",
            PlanChangeKind::SessionReopened => "session-reopened",
            PlanChangeKind::SessionMissed => "session-missed",
            PlanChangeKind::SessionRescheduled => "session-rescheduled",
            PlanChangeKind::SuggestionApplied => "suggestion-applied",
            PlanChangeKind::SessionRemoved => "session-removed",
        }
    }
}

impl fmt::Display for PlanChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for PlanChangeKind {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "generated" => Ok(PlanChangeKind::Generated),
            "course-merged" => Ok(PlanChangeKind::CourseMerged),
            "merge-skipped" => Ok(PlanChangeKind::MergeSkipped),
            "session-completed" => Ok(PlanChangeKind::SessionCompleted),
            "session-reopened" => Ok(PlanChangeKind::SessionReopened),
            "session-missed" => Ok(PlanChangeKind::SessionMissed),
            "session-rescheduled" => Ok(PlanChangeKind::SessionRescheduled),
            "suggestion-applied" => Ok(PlanChangeKind::SuggestionApplied),
            "session-removed" => Ok(PlanChangeKind::SessionRemoved),
            other => Err(format!("unsupported plan change kind: {other}")),
        }
    }
}

/// Audit entry describing one mutation of a plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlanChange {
    pub id: String,
    pub user_id: String,
    pub plan_id: String,
    pub kind: PlanChangeKind,
    #[serde(default)]
    pub session_ids: Vec<String>,
    pub reason: String,
    pub recorded_at: DateTime<Utc>,
}

impl PlanChange {
    pub fn new(
        plan: &StudyPlan,
        kind: PlanChangeKind,
        session_ids: Vec<String>,
        reason: impl Into<String>,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: plan.user_id.clone(),
            plan_id: plan.id.clone(),
            kind,
            session_ids,
            reason: reason.into(),
            recorded_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum PersistenceStatus {
    Saved,
    Failed { message: String },
}

impl PersistenceStatus {
    pub fn is_saved(&self) -> bool {
        matches!(self, PersistenceStatus::Saved)
    }
}

/// Result of a mutating planner operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlanOutcome {
    pub plan: StudyPlan,
    pub change: PlanChange,
    pub persistence: PersistenceStatus,
}
