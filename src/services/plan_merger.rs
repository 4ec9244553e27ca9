use chrono::{DateTime, NaiveDate, Utc};
use tracing::{info, warn};

use crate::models::course::{Course, StudyPreferences};
use crate::models::study_plan::{plan_name, StudyPlan, StudySession};
use crate::services::schedule_utils;
use crate::services::session_generator::{resolve_start_time, SessionGenerator};
use crate::services::subject_classifier;

#[derive(Debug, Clone, PartialEq)]
pub enum MergeResult {
    /// The course was already planned, or nothing could be scheduled.
    Skipped { reason: String },
    Merged { session_ids: Vec<String> },
}

/// Appends a newly unlocked course after the last scheduled session, or from
/// today when every session is already in the past. Existing sessions are never
/// moved.
pub fn merge_course(
    generator: &SessionGenerator,
    plan: &mut StudyPlan,
    course: &Course,
    preferences: &StudyPreferences,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> MergeResult {
    if plan.course_ids().contains(course.id.as_str()) {
        info!(
            target: "app::planner",
            user_id = %plan.user_id,
            course_id = %course.id,
            "course already planned, skipping merge"
        );
        return MergeResult::Skipped {
            reason: format!("'{}' is already part of the plan", course.title),
        };
    }

    let available = schedule_utils::parse_available_days(&preferences.available_days);
    if available.is_empty() {
        warn!(target: "app::planner", user_id = %plan.user_id, "no available weekdays, cannot merge course");
        return MergeResult::Skipped {
            reason: "no available weekdays to place new sessions".to_string(),
        };
    }

    let hours = course_budget(generator, plan, preferences, today);
    let blueprints = generator.course_blueprints(course, hours);
    let anchor = plan
        .latest_session_date()
        .map(|latest| schedule_utils::add_days(latest, 1).max(today))
        .unwrap_or_else(|| today.max(plan.start_date));
    let start_time = resolve_start_time(&preferences.preferred_start_time);

    let new_sessions: Vec<StudySession> = blueprints
        .into_iter()
        .enumerate()
        .map(|(index, blueprint)| {
            let date = generator.place(anchor, index, &available);
            let mut session = StudySession::schedule(blueprint, date, start_time);
            subject_classifier::classify_session(&mut session);
            session
        })
        .collect();

    let session_ids: Vec<String> = new_sessions.iter().map(|s| s.id.clone()).collect();
    let past_exam = new_sessions
        .iter()
        .filter(|session| session.date >= plan.exam_date)
        .count();

    plan.sessions.extend(new_sessions);
    plan.name = plan_name(plan.course_ids().len());
    plan.recompute_total_hours();
    plan.adaptation_reason = Some(if past_exam > 0 {
        format!(
            "Added '{}' ({} sessions); {} fall on or after the exam date",
            course.title,
            session_ids.len(),
            past_exam
        )
    } else {
        format!("Added '{}' ({} sessions)", course.title, session_ids.len())
    });
    plan.refresh(now);

    info!(
        target: "app::planner",
        user_id = %plan.user_id,
        course_id = %course.id,
        added = session_ids.len(),
        "merged course into plan"
    );
    MergeResult::Merged { session_ids }
}

/// Average hours already given to each planned course; a fresh single-course budget
/// when the plan is empty.
fn course_budget(
    generator: &SessionGenerator,
    plan: &StudyPlan,
    preferences: &StudyPreferences,
    today: NaiveDate,
) -> f64 {
    let planned_courses = plan.course_ids().len();
    if planned_courses > 0 && plan.total_estimated_hours > 0.0 {
        return plan.total_estimated_hours / planned_courses as f64;
    }

    let available = schedule_utils::parse_available_days(&preferences.available_days);
    let exam_date = generator.exam_date_for(preferences, today);
    let study_days = schedule_utils::count_available_days(today, exam_date, &available);
    preferences.daily_study_hours.max(0.0) * study_days as f64
}
