use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use serde_json::json;
use study_planner_lib::db::repositories::PlannerRepositories;
use study_planner_lib::models::adaptation::{
    ActionType, AdaptationSuggestion, SuggestionAction, SuggestionType,
};
use study_planner_lib::models::course::{Course, Difficulty, Lesson, StudyPreferences};
use study_planner_lib::models::plan_change::PlanChangeKind;
use study_planner_lib::models::settings::PlannerSettings;
use study_planner_lib::models::study_plan::{NewStudySession, SessionType, StudyPlan, StudySession};
use study_planner_lib::services::progress_analyzer::ProgressAnalyzer;
use study_planner_lib::services::study_planner_service::StudyPlannerService;
use study_planner_lib::utils::clock::{Clock, FixedClock};
use study_planner_lib::AppError;

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 4, 14).expect("date")
}

/// Plan spanning `[today - before, today + after)` with `total` sessions, the first
/// `completed` of them done and the next `missed` flagged missed.
fn plan_with_progress(before: i64, after: i64, total: usize, completed: usize, missed: usize) -> StudyPlan {
    let now = midnight(today());
    let mut plan = StudyPlan::new(
        "u1",
        "Study plan · 1 course",
        today() - Duration::days(before),
        today() + Duration::days(after),
        now,
    );
    for index in 0..total {
        let mut session = StudySession::schedule(
            NewStudySession {
                course_id: "c1".into(),
                course_title: "Organic Chemistry".into(),
                lesson_id: Some(format!("c1-{index}")),
                lesson_title: Some(format!("Lesson {index}")),
                session_type: SessionType::Lesson,
                is_optional: false,
                difficulty: Difficulty::Medium,
                minutes: 60,
            },
            plan.start_date + Duration::days(index as i64 % (before + after)),
            NaiveTime::from_hms_opt(9, 0, 0).expect("time"),
        );
        if index < completed {
            session.mark_completed(now);
        } else if index < completed + missed {
            session.mark_missed();
        }
        plan.sessions.push(session);
    }
    plan.refresh(now);
    plan
}

#[test]
fn far_ahead_yields_one_ahead_suggestion() {
    let analyzer = ProgressAnalyzer::new(PlannerSettings::default());
    let plan = plan_with_progress(10, 10, 10, 9, 0);
    let now = midnight(today());

    assert!((analyzer.expected_progress(&plan, now) - 50.0).abs() < 1e-9);
    assert!((analyzer.actual_progress(&plan) - 90.0).abs() < 1e-9);

    let suggestions = analyzer.analyze(&plan, now);
    assert_eq!(suggestions.len(), 1);
    let suggestion = &suggestions[0];
    assert_eq!(suggestion.suggestion_type, SuggestionType::AheadSchedule);
    assert!(suggestion.is_active);
    let kinds: Vec<ActionType> = suggestion.actions.iter().map(|a| a.action_type).collect();
    assert_eq!(kinds, vec![ActionType::AddBonus, ActionType::BonusPractice, ActionType::Keep]);
}

#[test]
fn behind_with_missed_sessions_beats_optimization() {
    let analyzer = ProgressAnalyzer::new(PlannerSettings::default());
    let plan = plan_with_progress(11, 9, 20, 6, 3);
    let now = midnight(today());

    assert!((analyzer.expected_progress(&plan, now) - 55.0).abs() < 1e-9);
    assert!((analyzer.actual_progress(&plan) - 30.0).abs() < 1e-9);
    assert_eq!(plan.missed_count(), 3);

    let suggestions = analyzer.analyze(&plan, now);
    assert_eq!(suggestions.len(), 1);
    assert_eq!(suggestions[0].suggestion_type, SuggestionType::BehindSchedule);
    let kinds: Vec<ActionType> = suggestions[0].actions.iter().map(|a| a.action_type).collect();
    assert_eq!(kinds, vec![ActionType::AutoReschedule, ActionType::ManualReschedule]);
}

#[test]
fn on_track_with_enough_completions_suggests_optimization() {
    let analyzer = ProgressAnalyzer::new(PlannerSettings::default());
    let plan = plan_with_progress(10, 10, 10, 5, 0);
    let suggestions = analyzer.analyze(&plan, midnight(today()));
    assert_eq!(suggestions.len(), 1);
    assert_eq!(suggestions[0].suggestion_type, SuggestionType::Optimization);

    let quiet = plan_with_progress(10, 10, 20, 4, 0);
    assert!(analyzer.analyze(&quiet, midnight(today()) - Duration::days(8)).is_empty());
}

fn service(clock: Arc<FixedClock>) -> StudyPlannerService {
    StudyPlannerService::new(PlannerRepositories::in_memory(), PlannerSettings::default(), clock)
}

/// Wraps a single action in a fresh, active suggestion.
fn offering(action: &SuggestionAction) -> AdaptationSuggestion {
    AdaptationSuggestion {
        id: format!("offer-{}", action.id),
        suggestion_type: SuggestionType::Optimization,
        title: action.label.clone(),
        message: String::new(),
        actions: vec![action.clone()],
        expected_progress: 0.0,
        actual_progress: 0.0,
        is_active: true,
        created_at: Utc::now(),
    }
}

fn course() -> Course {
    Course {
        id: "hist".into(),
        title: "World History".into(),
        lessons: (1..=6)
            .map(|n| Lesson {
                id: format!("hist-{n}"),
                title: format!("Era {n}"),
                difficulty: if n == 6 { Difficulty::Hard } else { Difficulty::Easy },
                video_id: None,
                is_completed: false,
            })
            .collect(),
        is_owned: true,
        is_complete: true,
    }
}

fn preferences(today: NaiveDate, daily_hours: f64) -> StudyPreferences {
    StudyPreferences {
        daily_study_hours: daily_hours,
        preferred_start_time: "07:00".into(),
        exam_date: Some(today + Duration::days(21)),
        available_days: vec!["monday".into(), "wednesday".into(), "friday".into()],
    }
}

#[test]
fn applying_add_bonus_schedules_spaced_sessions() {
    let clock = Arc::new(FixedClock::new(midnight(NaiveDate::from_ymd_opt(2025, 9, 1).expect("date"))));
    let service = service(clock.clone());
    let plan = service
        .generate_plan("u1", &[course()], &[], &preferences(clock.today(), 2.0))
        .expect("generate")
        .plan;
    for session in plan.sessions.iter().take(3) {
        service
            .toggle_session_completion("u1", &session.id)
            .expect("complete");
    }

    let mut suggestions = service.analyze_progress("u1").expect("analyze");
    assert_eq!(suggestions.len(), 1);
    assert_eq!(suggestions[0].suggestion_type, SuggestionType::AheadSchedule);
    let add_bonus = suggestions[0]
        .actions
        .iter()
        .find(|action| action.action_type == ActionType::AddBonus)
        .map(|action| action.id.clone())
        .expect("add-bonus action");

    let outcome = service
        .apply_suggestion("u1", &mut suggestions[0], &add_bonus)
        .expect("apply");
    assert!(!suggestions[0].is_active);
    assert_eq!(outcome.change.kind, PlanChangeKind::SuggestionApplied);
    assert_eq!(outcome.change.session_ids.len(), 3);
    let tomorrow = clock.today() + Duration::days(1);
    let dates: Vec<NaiveDate> = outcome
        .change
        .session_ids
        .iter()
        .map(|id| outcome.plan.session(id).expect("bonus session").date)
        .collect();
    assert_eq!(
        dates,
        vec![tomorrow, tomorrow + Duration::days(2), tomorrow + Duration::days(4)]
    );
    for id in &outcome.change.session_ids {
        let session = outcome.plan.session(id).expect("bonus session");
        assert_eq!(session.session_type, SessionType::BonusReview);
        assert_eq!(session.duration, 60);
        assert!(session.is_optional);
    }
    assert_eq!(outcome.plan.sessions.len(), plan.sessions.len() + 3);

    // A second apply is refused and adds nothing.
    let again = service.apply_suggestion("u1", &mut suggestions[0], &add_bonus);
    assert!(matches!(again, Err(AppError::Validation { .. })));
    let stored = service.get_plan("u1").expect("load").expect("plan");
    assert_eq!(stored.sessions.len(), plan.sessions.len() + 3);
    let applied = service
        .recent_changes("u1", 10)
        .expect("changes")
        .iter()
        .filter(|change| change.kind == PlanChangeKind::SuggestionApplied)
        .count();
    assert_eq!(applied, 1);
}

#[test]
fn dismissed_suggestions_cannot_be_applied() {
    let clock = Arc::new(FixedClock::new(midnight(NaiveDate::from_ymd_opt(2025, 9, 1).expect("date"))));
    let service = service(clock.clone());
    let plan = service
        .generate_plan("u1", &[course()], &[], &preferences(clock.today(), 2.0))
        .expect("generate")
        .plan;
    for session in plan.sessions.iter().take(3) {
        service
            .toggle_session_completion("u1", &session.id)
            .expect("complete");
    }

    let mut suggestions = service.analyze_progress("u1").expect("analyze");
    assert_eq!(suggestions.len(), 1);
    let suggestion = &mut suggestions[0];
    let action_id = suggestion.actions[0].id.clone();

    let unknown = service.apply_suggestion("u1", suggestion, "no-such-action");
    assert!(matches!(unknown, Err(AppError::NotFound)));
    assert!(suggestion.is_active);

    service.dismiss_suggestion(suggestion);
    assert!(!suggestion.is_active);
    let refused = service.apply_suggestion("u1", suggestion, &action_id);
    assert!(matches!(refused, Err(AppError::Validation { .. })));

    let stored = service.get_plan("u1").expect("load").expect("plan");
    assert_eq!(stored.sessions.len(), plan.sessions.len());
}

#[test]
fn bonus_practice_targets_the_hardest_course() {
    let clock = Arc::new(FixedClock::new(midnight(NaiveDate::from_ymd_opt(2025, 9, 1).expect("date"))));
    let service = service(clock.clone());
    let mut easy = course();
    easy.id = "easy".into();
    easy.title = "Poetry".into();
    for lesson in &mut easy.lessons {
        lesson.difficulty = Difficulty::Easy;
    }
    service
        .generate_plan("u1", &[easy, course()], &[], &preferences(clock.today(), 2.0))
        .expect("generate");

    let practice = SuggestionAction {
        id: "practice".into(),
        action_type: ActionType::BonusPractice,
        label: "Practice hard topics".into(),
        payload: json!({"count": 2}),
    };
    let outcome = service
        .apply_suggestion("u1", &mut offering(&practice), &practice.id)
        .expect("apply");
    assert_eq!(outcome.change.session_ids.len(), 2);
    for id in &outcome.change.session_ids {
        let session = outcome.plan.session(id).expect("practice session");
        assert_eq!(session.course_id, "hist");
        assert_eq!(session.session_type, SessionType::Practice);
    }
}

#[test]
fn intensify_is_bounded_and_idempotent_at_cap() {
    let clock = Arc::new(FixedClock::new(midnight(NaiveDate::from_ymd_opt(2025, 9, 1).expect("date"))));
    let service = service(clock.clone());
    service
        .generate_plan("u1", &[course()], &[], &preferences(clock.today(), 1.0))
        .expect("generate");

    let intensify = SuggestionAction {
        id: "intensify".into(),
        action_type: ActionType::AutoReschedule,
        label: "Intensify upcoming sessions".into(),
        payload: json!({}),
    };

    let first = service
        .apply_suggestion("u1", &mut offering(&intensify), &intensify.id)
        .expect("apply");
    assert!(!first.change.session_ids.is_empty());
    let lesson = first
        .plan
        .sessions
        .iter()
        .find(|s| s.session_type == SessionType::Lesson)
        .expect("lesson");
    assert_eq!(lesson.duration, 105);
    assert_eq!(lesson.estimated_minutes, lesson.duration);

    for _ in 0..9 {
        service
            .apply_suggestion("u1", &mut offering(&intensify), &intensify.id)
            .expect("apply");
    }
    let last = service
        .apply_suggestion("u1", &mut offering(&intensify), &intensify.id)
        .expect("apply");
    assert!(last.change.session_ids.is_empty());
    assert!(last.plan.sessions.iter().all(|s| s.duration == 120));

    let settled = service
        .apply_suggestion("u1", &mut offering(&intensify), &intensify.id)
        .expect("apply");
    assert_eq!(
        settled.plan.sessions.iter().map(|s| s.duration).collect::<Vec<_>>(),
        last.plan.sessions.iter().map(|s| s.duration).collect::<Vec<_>>()
    );
}

#[test]
fn optimize_only_records_a_reason() {
    let clock = Arc::new(FixedClock::new(midnight(NaiveDate::from_ymd_opt(2025, 9, 1).expect("date"))));
    let service = service(clock.clone());
    let plan = service
        .generate_plan("u1", &[course()], &[], &preferences(clock.today(), 2.0))
        .expect("generate")
        .plan;

    let optimize = SuggestionAction {
        id: "opt".into(),
        action_type: ActionType::Optimize,
        label: "Reduce intensity".into(),
        payload: json!({"direction": "reduce"}),
    };
    let outcome = service
        .apply_suggestion("u1", &mut offering(&optimize), &optimize.id)
        .expect("apply");
    assert_eq!(outcome.plan.sessions, plan.sessions);
    assert!(outcome
        .plan
        .adaptation_reason
        .as_deref()
        .is_some_and(|reason| reason.contains("reduce")));
}
