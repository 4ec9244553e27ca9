use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::models::study_plan::StudySession;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum SuggestionType {
    AheadSchedule,
    BehindSchedule,
    Optimization,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ActionType {
    AddBonus,
    BonusPractice,
    Keep,
    AutoReschedule,
    ManualReschedule,
    Optimize,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::AddBonus => "add-bonus",
            ActionType::BonusPractice => "bonus-practice",
            ActionType::Keep => "keep",
            ActionType::AutoReschedule => "auto-reschedule",
            ActionType::ManualReschedule => "manual-reschedule",
            ActionType::Optimize => "optimize",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionAction {
    pub id: String,
    #[serde(rename = "type")]
    pub action_type: ActionType,
    pub label: String,
    #[serde(default)]
    pub payload: JsonValue,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AdaptationSuggestion {
    pub id: String,
    #[serde(rename = "type")]
    pub suggestion_type: SuggestionType,
    pub title: String,
    pub message: String,
    pub actions: Vec<SuggestionAction>,
    pub expected_progress: f64,
    pub actual_progress: f64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl AdaptationSuggestion {
    pub fn dismiss(&mut self) {
        self.is_active = false;
    }

    pub fn action(&self, action_id: &str) -> Option<&SuggestionAction> {
        self.actions.iter().find(|action| action.id == action_id)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RescheduleMode {
    Manual,
    Automatic,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MissedSessionAlert {
    pub id: String,
    pub session: StudySession,
    pub suggested_dates: Vec<NaiveDate>,
    pub created_at: DateTime<Utc>,
}

impl MissedSessionAlert {
    /// No slot fits before the exam; only a manual date can resolve it.
    pub fn requires_manual_date(&self) -> bool {
        self.suggested_dates.is_empty()
    }
}
