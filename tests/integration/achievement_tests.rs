use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use study_planner_lib::db::repositories::PlannerRepositories;
use study_planner_lib::db::DbPool;
use study_planner_lib::models::adaptation::RescheduleMode;
use study_planner_lib::models::badge::{BadgeCriteria, BadgeType, PlannerBadge};
use study_planner_lib::models::buddy::{AlertFrequency, BuddySystem};
use study_planner_lib::models::course::{Course, Difficulty, Lesson, StudyPreferences};
use study_planner_lib::models::settings::PlannerSettings;
use study_planner_lib::models::study_plan::{NewStudySession, SessionType, StudyPlan, StudySession};
use study_planner_lib::services::badge_evaluator::{self, ACCOUNTABILITY, COMEBACK, STREAK_7};
use study_planner_lib::services::buddy_notifier::LogNotificationSink;
use study_planner_lib::services::study_planner_service::StudyPlannerService;
use study_planner_lib::utils::clock::{Clock, FixedClock};
use tempfile::tempdir;

fn base() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 2, 3).expect("date")
}

fn evening(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_hms_opt(20, 0, 0).expect("time"))
}

fn plan_completed_on_consecutive_days(days: i64) -> StudyPlan {
    let mut plan = StudyPlan::new("u1", "plan", base(), base() + Duration::days(30), evening(base()));
    for offset in 0..days {
        let date = base() + Duration::days(offset);
        let mut session = StudySession::schedule(
            NewStudySession {
                course_id: "c1".into(),
                course_title: "Physics".into(),
                lesson_id: None,
                lesson_title: Some(format!("Day {offset}")),
                session_type: SessionType::Lesson,
                is_optional: false,
                difficulty: Difficulty::Medium,
                minutes: 30,
            },
            date,
            NaiveTime::from_hms_opt(18, 0, 0).expect("time"),
        );
        session.mark_completed(evening(date));
        plan.sessions.push(session);
    }
    plan.refresh(evening(base()));
    plan
}

fn week_streak_badge() -> PlannerBadge {
    PlannerBadge::new(
        "week",
        "Seven Day Streak",
        "Seven consecutive study days.",
        BadgeType::Discipline,
        BadgeCriteria {
            consecutive_days: Some(7),
            ..Default::default()
        },
    )
}

#[test]
fn eight_consecutive_days_earn_the_seven_day_badge() {
    let now = evening(base() + Duration::days(8));
    let earned = badge_evaluator::evaluate(
        &[week_streak_badge()],
        &plan_completed_on_consecutive_days(8),
        None,
        now,
    );
    assert!(earned[0].is_earned);
    assert_eq!(earned[0].earned_at, Some(now));

    let not_yet = badge_evaluator::evaluate(
        &[week_streak_badge()],
        &plan_completed_on_consecutive_days(6),
        None,
        now,
    );
    assert!(!not_yet[0].is_earned);
    assert_eq!(not_yet[0].earned_at, None);
}

#[test]
fn earned_badges_never_revert() {
    let first_now = evening(base() + Duration::days(8));
    let earned = badge_evaluator::evaluate(
        &[week_streak_badge()],
        &plan_completed_on_consecutive_days(8),
        None,
        first_now,
    );

    let mut regressed = plan_completed_on_consecutive_days(8);
    for session in &mut regressed.sessions {
        session.mark_incomplete(base() + Duration::days(11));
    }
    let later = badge_evaluator::evaluate(&earned, &regressed, None, first_now + Duration::days(3));
    assert!(later[0].is_earned);
    assert_eq!(later[0].earned_at, Some(first_now));
}

fn course() -> Course {
    Course {
        id: "geo".into(),
        title: "Geography".into(),
        lessons: (1..=6)
            .map(|n| Lesson {
                id: format!("geo-{n}"),
                title: format!("Region {n}"),
                difficulty: Difficulty::Easy,
                video_id: None,
                is_completed: false,
            })
            .collect(),
        is_owned: true,
        is_complete: true,
    }
}

fn preferences(today: NaiveDate) -> StudyPreferences {
    StudyPreferences {
        daily_study_hours: 1.0,
        preferred_start_time: "17:00".into(),
        exam_date: Some(today + Duration::days(42)),
        available_days: vec!["monday".into(), "wednesday".into(), "friday".into()],
    }
}

#[test]
fn facade_persists_badges_and_reports_fresh_unlocks() {
    let dir = tempdir().expect("temp dir");
    let db_path = dir.path().join("planner.sqlite");
    // Monday.
    let clock = Arc::new(FixedClock::new(evening(NaiveDate::from_ymd_opt(2025, 9, 1).expect("date"))));
    let service = StudyPlannerService::new(
        PlannerRepositories::sqlite(DbPool::new(&db_path).expect("db pool")),
        PlannerSettings::default(),
        clock.clone(),
    );
    let plan = service
        .generate_plan("u1", &[course()], &[], &preferences(clock.today()))
        .expect("generate")
        .plan;

    let initial = service.evaluate_badges("u1").expect("evaluate");
    assert!(initial.newly_earned.is_empty());
    assert_eq!(initial.badges.len(), badge_evaluator::default_badges().len());

    // Three sessions moved and then completed unlock the resilience badge.
    let tomorrow = clock.today() + Duration::days(1);
    for session in plan.sessions.iter().take(3) {
        service
            .reschedule_session("u1", &session.id, tomorrow, RescheduleMode::Manual)
            .expect("reschedule");
        service
            .toggle_session_completion("u1", &session.id)
            .expect("complete");
    }

    let report = service.evaluate_badges("u1").expect("evaluate");
    let fresh: Vec<&str> = report.newly_earned.iter().map(|b| b.id.as_str()).collect();
    assert!(fresh.contains(&COMEBACK));
    assert!(!fresh.contains(&STREAK_7));

    let again = service.evaluate_badges("u1").expect("evaluate again");
    assert!(again.newly_earned.is_empty());
    let comeback = again.badges.iter().find(|b| b.id == COMEBACK).expect("badge");
    assert!(comeback.is_earned);
    assert_eq!(comeback.earned_at, Some(clock.now()));
}

#[test]
fn buddy_alert_unlocks_the_coaching_badge() {
    let clock = Arc::new(FixedClock::new(evening(NaiveDate::from_ymd_opt(2025, 9, 1).expect("date"))));
    let service = StudyPlannerService::new(
        PlannerRepositories::in_memory(),
        PlannerSettings::default(),
        clock.clone(),
    );
    service
        .generate_plan("u1", &[course()], &[], &preferences(clock.today()))
        .expect("generate");
    service
        .configure_buddy(BuddySystem::new("u1", "Jordan", "jordan@example.com", AlertFrequency::Daily))
        .expect("configure buddy");

    // Saturday: Wednesday and Friday fall inside the lookback window.
    clock.advance(Duration::days(5));
    while service
        .create_missed_alert("u1")
        .expect("alert")
        .is_some()
    {}

    let sent = service
        .notify_buddy("u1", &LogNotificationSink, &mut StdRng::seed_from_u64(3))
        .expect("notify");
    assert!(sent.is_some());

    let report = service.evaluate_badges("u1").expect("evaluate");
    assert!(report.newly_earned.iter().any(|b| b.id == ACCOUNTABILITY));
}
