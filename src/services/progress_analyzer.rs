use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::AppResult;
use crate::models::adaptation::{
    ActionType, AdaptationSuggestion, SuggestionAction, SuggestionType,
};
use crate::models::course::Difficulty;
use crate::models::settings::PlannerSettings;
use crate::models::study_plan::{NewStudySession, SessionType, StudyPlan, StudySession};
use crate::services::schedule_utils;
use crate::services::subject_classifier;

const DEFAULT_BONUS_COUNT: u64 = 3;
const DEFAULT_PRACTICE_COUNT: u64 = 2;
const MAX_BONUS_COUNT: u64 = 10;

/// Compares completion against elapsed time and proposes plan adjustments.
#[derive(Debug, Clone)]
pub struct ProgressAnalyzer {
    settings: PlannerSettings,
}

impl ProgressAnalyzer {
    pub fn new(settings: PlannerSettings) -> Self {
        Self { settings }
    }

    /// Share of the start→exam interval that has elapsed, in percent.
    pub fn expected_progress(&self, plan: &StudyPlan, now: DateTime<Utc>) -> f64 {
        let start = day_start(plan.start_date);
        let exam = day_start(plan.exam_date);
        let total = exam.signed_duration_since(start).num_seconds();
        if total <= 0 {
            return 100.0;
        }
        let elapsed = now.signed_duration_since(start).num_seconds();
        (elapsed as f64 / total as f64 * 100.0).clamp(0.0, 100.0)
    }

    pub fn actual_progress(&self, plan: &StudyPlan) -> f64 {
        if plan.sessions.is_empty() {
            return 0.0;
        }
        plan.completed_count() as f64 / plan.sessions.len() as f64 * 100.0
    }

    /// At most one suggestion: ahead, then behind, then optimization.
    pub fn analyze(&self, plan: &StudyPlan, now: DateTime<Utc>) -> Vec<AdaptationSuggestion> {
        let expected = self.expected_progress(plan, now);
        let actual = self.actual_progress(plan);
        let missed = plan.missed_count();
        let completed = plan.completed_count();
        debug!(
            target: "app::planner",
            user_id = %plan.user_id,
            expected,
            actual,
            missed,
            completed,
            "analyzing progress"
        );

        if actual - expected > self.settings.ahead_threshold {
            return vec![suggestion(
                SuggestionType::AheadSchedule,
                "You're ahead of schedule",
                format!(
                    "You've completed {actual:.0}% of your plan while {expected:.0}% of the time has passed."
                ),
                vec![
                    action(ActionType::AddBonus, "Add bonus review sessions", json!({"count": DEFAULT_BONUS_COUNT})),
                    action(ActionType::BonusPractice, "Practice hard topics", json!({"count": DEFAULT_PRACTICE_COUNT})),
                    action(ActionType::Keep, "Keep my plan as is", json!({})),
                ],
                expected,
                actual,
                now,
            )];
        }

        if expected - actual > self.settings.behind_threshold
            || missed > self.settings.behind_missed_sessions
        {
            let missed_ids: Vec<&str> = plan
                .sessions
                .iter()
                .filter(|session| session.is_missed)
                .map(|session| session.id.as_str())
                .collect();
            return vec![suggestion(
                SuggestionType::BehindSchedule,
                "Let's get you back on track",
                format!(
                    "You're at {actual:.0}% with {expected:.0}% of the time elapsed and {missed} missed sessions."
                ),
                vec![
                    action(ActionType::AutoReschedule, "Intensify upcoming sessions", json!({})),
                    action(
                        ActionType::ManualReschedule,
                        "Pick new slots myself",
                        json!({"missedSessionIds": missed_ids}),
                    ),
                ],
                expected,
                actual,
                now,
            )];
        }

        if completed >= self.settings.optimization_min_completed {
            return vec![suggestion(
                SuggestionType::Optimization,
                "Fine-tune your rhythm",
                format!("You're on track at {actual:.0}%. Adjust the intensity if it doesn't feel right."),
                vec![
                    action(ActionType::Optimize, "Reduce intensity", json!({"direction": "reduce"})),
                    action(ActionType::Optimize, "Increase intensity", json!({"direction": "increase"})),
                ],
                expected,
                actual,
                now,
            )];
        }

        Vec::new()
    }

    /// Applies one chosen action to the plan. Returns the ids of sessions it created
    /// or modified.
    pub fn apply_suggestion(
        &self,
        plan: &mut StudyPlan,
        chosen: &SuggestionAction,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> AppResult<Vec<String>> {
        let touched = match chosen.action_type {
            ActionType::AddBonus => {
                let count = payload_count(chosen, DEFAULT_BONUS_COUNT);
                let ids = self.add_bonus_sessions(plan, SessionType::BonusReview, count, today);
                plan.adaptation_reason = Some(format!("Added {} bonus review sessions", ids.len()));
                ids
            }
            ActionType::BonusPractice => {
                let count = payload_count(chosen, DEFAULT_PRACTICE_COUNT);
                let ids = self.add_bonus_sessions(plan, SessionType::Practice, count, today);
                plan.adaptation_reason =
                    Some(format!("Added {} practice sessions on hard topics", ids.len()));
                ids
            }
            ActionType::AutoReschedule => {
                let ids = self.intensify(plan);
                plan.adaptation_reason = Some(format!(
                    "Intensified {} upcoming sessions by {} minutes (capped at {} minutes)",
                    ids.len(),
                    self.settings.intensify_step_minutes,
                    self.settings.intensify_cap_minutes
                ));
                ids
            }
            ActionType::Optimize => {
                let direction = chosen
                    .payload
                    .get("direction")
                    .and_then(|value| value.as_str())
                    .unwrap_or("adjust");
                plan.adaptation_reason =
                    Some(format!("Requested to {direction} overall study intensity"));
                Vec::new()
            }
            ActionType::ManualReschedule => {
                plan.adaptation_reason =
                    Some("Chose to reschedule missed sessions manually".to_string());
                Vec::new()
            }
            ActionType::Keep => {
                plan.adaptation_reason = Some("Kept the current plan unchanged".to_string());
                Vec::new()
            }
        };

        if !touched.is_empty() {
            plan.recompute_total_hours();
        }
        plan.refresh(now);

        info!(
            target: "app::planner",
            user_id = %plan.user_id,
            action = chosen.action_type.as_str(),
            touched = touched.len(),
            "applied adaptation suggestion"
        );
        Ok(touched)
    }

    /// Adds `count` bonus sessions from tomorrow, spaced `bonus_spacing_days` apart.
    fn add_bonus_sessions(
        &self,
        plan: &mut StudyPlan,
        session_type: SessionType,
        count: u64,
        today: NaiveDate,
    ) -> Vec<String> {
        let targets = bonus_targets(plan, session_type);
        if targets.is_empty() {
            return Vec::new();
        }
        let start_time = plan
            .sessions
            .first()
            .map(|session| session.start_time)
            .unwrap_or_else(|| NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN));

        let mut ids = Vec::new();
        for index in 0..count {
            let (course_id, course_title) = &targets[index as usize % targets.len()];
            let date = schedule_utils::add_days(
                today,
                1 + index as i64 * self.settings.bonus_spacing_days,
            );
            let (label, difficulty) = match session_type {
                SessionType::Practice => ("Bonus practice: hard topics", Difficulty::Hard),
                _ => ("Bonus review", Difficulty::Medium),
            };
            let mut session = StudySession::schedule(
                NewStudySession {
                    course_id: course_id.clone(),
                    course_title: course_title.clone(),
                    lesson_id: None,
                    lesson_title: Some(label.to_string()),
                    session_type,
                    is_optional: true,
                    difficulty,
                    minutes: self.settings.bonus_session_minutes,
                },
                date,
                start_time,
            );
            subject_classifier::classify_session(&mut session);
            ids.push(session.id.clone());
            plan.sessions.push(session);
        }
        ids
    }

    /// Lengthens every pending session by one step, never past the cap.
    fn intensify(&self, plan: &mut StudyPlan) -> Vec<String> {
        let step = self.settings.intensify_step_minutes;
        let cap = self.settings.intensify_cap_minutes;
        plan.sessions
            .iter_mut()
            .filter(|session| session.is_pending() && session.duration < cap)
            .map(|session| {
                session.set_duration((session.duration + step).min(cap));
                session.id.clone()
            })
            .collect()
    }
}

fn day_start(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

fn payload_count(chosen: &SuggestionAction, default: u64) -> u64 {
    chosen
        .payload
        .get("count")
        .and_then(|value| value.as_u64())
        .unwrap_or(default)
        .min(MAX_BONUS_COUNT)
}

/// Courses to attach bonus work to: every planned course in order for reviews, the
/// hardest course for practice.
fn bonus_targets(plan: &StudyPlan, session_type: SessionType) -> Vec<(String, String)> {
    let mut courses: Vec<(String, String, Difficulty)> = Vec::new();
    for session in &plan.sessions {
        match courses.iter_mut().find(|(id, _, _)| id == &session.course_id) {
            Some(entry) => entry.2 = entry.2.max(session.difficulty),
            None => courses.push((
                session.course_id.clone(),
                session.course_title.clone(),
                session.difficulty,
            )),
        }
    }

    if session_type == SessionType::Practice {
        let hardest = courses.iter().map(|(_, _, difficulty)| *difficulty).max();
        courses.retain(|(_, _, difficulty)| Some(*difficulty) == hardest);
        courses.truncate(1);
    }

    courses
        .into_iter()
        .map(|(id, title, _)| (id, title))
        .collect()
}

fn suggestion(
    suggestion_type: SuggestionType,
    title: &str,
    message: String,
    actions: Vec<SuggestionAction>,
    expected_progress: f64,
    actual_progress: f64,
    now: DateTime<Utc>,
) -> AdaptationSuggestion {
    AdaptationSuggestion {
        id: Uuid::new_v4().to_string(),
        suggestion_type,
        title: title.to_string(),
        message,
        actions,
        expected_progress,
        actual_progress,
        is_active: true,
        created_at: now,
    }
}

fn action(action_type: ActionType, label: &str, payload: serde_json::Value) -> SuggestionAction {
    SuggestionAction {
        id: Uuid::new_v4().to_string(),
        action_type,
        label: label.to_string(),
        payload,
    }
}
