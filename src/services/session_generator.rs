use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc, Weekday};
use tracing::{debug, info, warn};

use crate::models::course::{Course, Difficulty, StudyPreferences};
use crate::models::settings::PlannerSettings;
use crate::models::study_plan::{plan_name, NewStudySession, SessionType, StudyPlan, StudySession};
use crate::services::schedule_utils;
use crate::services::subject_classifier;

const MIN_SESSION_MINUTES: i64 = 15;
const DEFAULT_START_TIME: &str = "09:00";
/// Spacing factor between consecutive sessions; slightly front-loads the plan.
const PLACEMENT_STRIDE: f64 = 1.2;

/// Turns unlocked courses and preferences into a dated set of study sessions.
#[derive(Debug, Clone)]
pub struct SessionGenerator {
    settings: PlannerSettings,
}

impl SessionGenerator {
    pub fn new(settings: PlannerSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &PlannerSettings {
        &self.settings
    }

    /// Builds a plan starting `today`. Degenerate input (no weekdays, no complete
    /// courses, exam not after today) yields a plan without sessions.
    pub fn generate(
        &self,
        courses: &[Course],
        complete_course_ids: &[String],
        preferences: &StudyPreferences,
        user_id: &str,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> StudyPlan {
        let start_date = today;
        let exam_date = self.exam_date_for(preferences, start_date);
        let available = schedule_utils::parse_available_days(&preferences.available_days);
        let start_time = resolve_start_time(&preferences.preferred_start_time);

        let eligible: Vec<&Course> = courses
            .iter()
            .filter(|course| {
                course.is_complete || complete_course_ids.iter().any(|id| id == &course.id)
            })
            .collect();

        let mut plan = StudyPlan::new(user_id, plan_name(eligible.len()), start_date, exam_date, now);

        if available.is_empty() {
            warn!(target: "app::planner", %user_id, "no available weekdays, producing empty plan");
            return plan;
        }
        if eligible.is_empty() {
            info!(target: "app::planner", %user_id, "no complete courses to schedule");
            return plan;
        }
        if exam_date <= start_date {
            warn!(target: "app::planner", %user_id, %exam_date, "exam date is not after start date");
            return plan;
        }

        let study_days = schedule_utils::count_available_days(start_date, exam_date, &available);
        if study_days == 0 {
            warn!(target: "app::planner", %user_id, "no study days before the exam");
            return plan;
        }

        let total_hours = preferences.daily_study_hours.max(0.0) * study_days as f64;
        let hours_per_course = total_hours / eligible.len() as f64;
        debug!(
            target: "app::planner",
            study_days,
            total_hours,
            hours_per_course,
            courses = eligible.len(),
            "distributing study budget"
        );

        let blueprints: Vec<NewStudySession> = eligible
            .iter()
            .flat_map(|course| self.course_blueprints(course, hours_per_course))
            .collect();

        plan.sessions = blueprints
            .into_iter()
            .enumerate()
            .map(|(index, blueprint)| {
                let placed = self.place(start_date, index, &available);
                let date = clamp_before_exam(placed, start_date, exam_date, &available);
                let mut session = StudySession::schedule(blueprint, date, start_time);
                subject_classifier::classify_session(&mut session);
                session
            })
            .collect();

        plan.total_estimated_hours = schedule_utils::round_to_tenth(total_hours);
        plan.refresh(now);

        info!(
            target: "app::planner",
            %user_id,
            sessions = plan.sessions.len(),
            total_hours = plan.total_estimated_hours,
            "generated study plan"
        );
        plan
    }

    pub fn exam_date_for(&self, preferences: &StudyPreferences, start_date: NaiveDate) -> NaiveDate {
        preferences.exam_date.unwrap_or_else(|| {
            schedule_utils::add_days(start_date, self.settings.default_horizon_days)
        })
    }

    /// Sessions for one course, undated. Lessons get an even share of `hours`; an
    /// optional review follows every Nth lesson. A course without lessons becomes
    /// a single session spanning the whole share.
    pub fn course_blueprints(&self, course: &Course, hours: f64) -> Vec<NewStudySession> {
        let total_minutes = (hours * 60.0).round() as i64;

        if course.lessons.is_empty() {
            return vec![NewStudySession {
                course_id: course.id.clone(),
                course_title: course.title.clone(),
                lesson_id: None,
                lesson_title: None,
                session_type: SessionType::Lesson,
                is_optional: false,
                difficulty: Difficulty::Medium,
                minutes: total_minutes.max(MIN_SESSION_MINUTES),
            }];
        }

        let lesson_minutes =
            ((hours * 60.0) / course.lessons.len() as f64).round() as i64;
        let lesson_minutes = lesson_minutes.max(MIN_SESSION_MINUTES);
        let review_minutes = (lesson_minutes / 2).max(MIN_SESSION_MINUTES);
        let every = self.settings.review_every_n_lessons.max(1);

        let mut blueprints = Vec::with_capacity(course.lessons.len() + course.lessons.len() / every);
        for (index, lesson) in course.lessons.iter().enumerate() {
            blueprints.push(NewStudySession {
                course_id: course.id.clone(),
                course_title: course.title.clone(),
                lesson_id: Some(lesson.id.clone()),
                lesson_title: Some(lesson.title.clone()),
                session_type: SessionType::Lesson,
                is_optional: false,
                difficulty: lesson.difficulty,
                minutes: lesson_minutes,
            });

            let position = index + 1;
            if position % every == 0 {
                let reviewed = &course.lessons[position - every..position];
                let difficulty = reviewed
                    .iter()
                    .map(|lesson| lesson.difficulty)
                    .max()
                    .unwrap_or_default();
                blueprints.push(NewStudySession {
                    course_id: course.id.clone(),
                    course_title: course.title.clone(),
                    lesson_id: None,
                    lesson_title: Some(format!(
                        "Review: lessons {}-{}",
                        position - every + 1,
                        position
                    )),
                    session_type: SessionType::Review,
                    is_optional: true,
                    difficulty,
                    minutes: review_minutes,
                });
            }
        }

        blueprints
    }

    /// Date for the `index`-th session counted from `anchor`: step `floor(index * 1.2)`
    /// days, then walk to an available weekday. Falls back to the raw step when the
    /// walk exceeds the search window.
    pub fn place(&self, anchor: NaiveDate, index: usize, available: &HashSet<Weekday>) -> NaiveDate {
        let offset = (index as f64 * PLACEMENT_STRIDE).floor() as i64;
        let candidate = schedule_utils::add_days(anchor, offset);
        schedule_utils::next_available_day(candidate, available, self.settings.placement_search_days)
            .unwrap_or(candidate)
    }
}

pub fn resolve_start_time(raw: &str) -> NaiveTime {
    schedule_utils::parse_time_of_day(raw).unwrap_or_else(|_| {
        warn!(target: "app::planner", value = %raw, "invalid preferred start time, using default");
        schedule_utils::parse_time_of_day(DEFAULT_START_TIME).unwrap_or(NaiveTime::MIN)
    })
}

fn clamp_before_exam(
    date: NaiveDate,
    start_date: NaiveDate,
    exam_date: NaiveDate,
    available: &HashSet<Weekday>,
) -> NaiveDate {
    if date < exam_date {
        return date;
    }
    let last_study_day = schedule_utils::add_days(exam_date, -1);
    schedule_utils::latest_available_on_or_before(last_study_day, start_date, available)
        .unwrap_or(last_study_day)
}
