use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum BadgeType {
    Discipline,
    Resilience,
    Coaching,
    Progress,
}

impl BadgeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BadgeType::Discipline => "discipline",
            BadgeType::Resilience => "resilience",
            BadgeType::Coaching => "coaching",
            BadgeType::Progress => "progress",
        }
    }
}

impl fmt::Display for BadgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Thresholds for a badge; only the field matching the badge type is consulted.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BadgeCriteria {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consecutive_days: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rescheduled_completed: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notifications_sent: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_sessions: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlannerBadge {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub badge_type: BadgeType,
    pub criteria: BadgeCriteria,
    #[serde(default)]
    pub is_earned: bool,
    #[serde(default)]
    pub earned_at: Option<DateTime<Utc>>,
}

impl PlannerBadge {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        badge_type: BadgeType,
        criteria: BadgeCriteria,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            badge_type,
            criteria,
            is_earned: false,
            earned_at: None,
        }
    }
}
