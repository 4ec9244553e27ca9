use serde::{Deserialize, Serialize};

/// Tunable planner parameters. Stored field-by-field in `app_settings`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct PlannerSettings {
    /// Horizon used when preferences carry no exam date.
    pub default_horizon_days: i64,
    /// How far the generator walks forward looking for an available weekday.
    pub placement_search_days: i64,
    pub review_every_n_lessons: usize,
    /// Sessions per day above which a date is not offered as a reschedule slot.
    pub reschedule_daily_cap: usize,
    pub reschedule_search_days: i64,
    pub max_reschedule_suggestions: usize,
    pub ahead_threshold: f64,
    pub behind_threshold: f64,
    pub behind_missed_sessions: usize,
    pub optimization_min_completed: usize,
    pub bonus_session_minutes: i64,
    pub bonus_spacing_days: i64,
    pub intensify_step_minutes: i64,
    pub intensify_cap_minutes: i64,
    pub buddy_missed_threshold: usize,
    pub buddy_lookback_days: i64,
}

impl Default for PlannerSettings {
    fn default() -> Self {
        Self {
            default_horizon_days: 30,
            placement_search_days: 14,
            review_every_n_lessons: 3,
            reschedule_daily_cap: 3,
            reschedule_search_days: 14,
            max_reschedule_suggestions: 5,
            ahead_threshold: 15.0,
            behind_threshold: 10.0,
            behind_missed_sessions: 2,
            optimization_min_completed: 5,
            bonus_session_minutes: 60,
            bonus_spacing_days: 2,
            intensify_step_minutes: 15,
            intensify_cap_minutes: 120,
            buddy_missed_threshold: 2,
            buddy_lookback_days: 3,
        }
    }
}
