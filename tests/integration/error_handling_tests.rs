// Failure paths: storage outages, write conflicts and bad input.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use study_planner_lib::db::repositories::plan_repository::{
    InMemoryPlanRepository, PlanRepository, SqlitePlanRepository,
};
use study_planner_lib::db::repositories::PlannerRepositories;
use study_planner_lib::db::DbPool;
use study_planner_lib::models::adaptation::RescheduleMode;
use study_planner_lib::models::course::{Course, Difficulty, Lesson, StudyPreferences};
use study_planner_lib::models::plan_change::PersistenceStatus;
use study_planner_lib::models::settings::PlannerSettings;
use study_planner_lib::models::study_plan::StudyPlan;
use study_planner_lib::services::plan_cache::CachedPlanRepository;
use study_planner_lib::services::study_planner_service::StudyPlannerService;
use study_planner_lib::utils::clock::{Clock, FixedClock};
use study_planner_lib::{AppError, AppResult};
use tempfile::tempdir;

/// Delegates reads to memory and fails the first `failures` saves.
struct FlakyPlanRepository {
    inner: InMemoryPlanRepository,
    failures: usize,
    save_calls: AtomicUsize,
    conflict: bool,
}

impl FlakyPlanRepository {
    fn failing(failures: usize) -> Self {
        Self {
            inner: InMemoryPlanRepository::new(),
            failures,
            save_calls: AtomicUsize::new(0),
            conflict: false,
        }
    }

    fn conflicting() -> Self {
        Self {
            conflict: true,
            ..Self::failing(usize::MAX)
        }
    }

    fn save_calls(&self) -> usize {
        self.save_calls.load(Ordering::SeqCst)
    }
}

impl PlanRepository for FlakyPlanRepository {
    fn get(&self, user_id: &str) -> AppResult<Option<StudyPlan>> {
        self.inner.get(user_id)
    }

    fn save(&self, plan: &StudyPlan) -> AppResult<i64> {
        let call = self.save_calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            return Err(if self.conflict {
                AppError::conflict("stale plan version")
            } else {
                AppError::database("disk I/O error")
            });
        }
        self.inner.save(plan)
    }
}

fn clock() -> Arc<FixedClock> {
    Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2025, 9, 1, 8, 0, 0)
            .single()
            .expect("monday"),
    ))
}

fn course() -> Course {
    Course {
        id: "econ".into(),
        title: "Economics".into(),
        lessons: (1..=3)
            .map(|n| Lesson {
                id: format!("econ-{n}"),
                title: format!("Markets {n}"),
                difficulty: Difficulty::Medium,
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
        daily_study_hours: 2.0,
        preferred_start_time: "10:00".into(),
        exam_date: Some(today + Duration::days(14)),
        available_days: vec!["tuesday".into(), "thursday".into()],
    }
}

fn service_with(plans: Arc<dyn PlanRepository>, clock: Arc<FixedClock>) -> StudyPlannerService {
    StudyPlannerService::new(
        PlannerRepositories::in_memory().with_plans(plans),
        PlannerSettings::default(),
        clock,
    )
}

#[test]
fn transient_storage_error_is_retried_once() {
    let clock = clock();
    let repo = Arc::new(FlakyPlanRepository::failing(1));
    let service = service_with(repo.clone(), clock.clone());

    let outcome = service
        .generate_plan("u1", &[course()], &[], &preferences(clock.today()))
        .expect("generate");
    assert!(outcome.persistence.is_saved());
    assert_eq!(repo.save_calls(), 2);
    assert_eq!(outcome.plan.version, 1);
    assert_eq!(service.recent_changes("u1", 5).expect("changes").len(), 1);
}

#[test]
fn persistent_storage_error_still_returns_the_plan() {
    let clock = clock();
    let repo = Arc::new(FlakyPlanRepository::failing(usize::MAX));
    let service = service_with(repo.clone(), clock.clone());

    let outcome = service
        .generate_plan("u1", &[course()], &[], &preferences(clock.today()))
        .expect("generate");
    assert_eq!(repo.save_calls(), 2);
    assert!(!outcome.persistence.is_saved());
    match &outcome.persistence {
        PersistenceStatus::Failed { message } => assert!(message.contains("disk I/O error")),
        PersistenceStatus::Saved => panic!("save should have failed"),
    }
    assert!(!outcome.plan.sessions.is_empty());
    assert_eq!(outcome.plan.version, 0);

    // Nothing was stored, so neither the plan nor a change entry exists.
    assert!(service.get_plan("u1").expect("load").is_none());
    assert!(service.recent_changes("u1", 5).expect("changes").is_empty());
}

#[test]
fn conflicts_are_not_retried() {
    let clock = clock();
    let repo = Arc::new(FlakyPlanRepository::conflicting());
    let service = service_with(repo.clone(), clock.clone());

    let outcome = service
        .generate_plan("u1", &[course()], &[], &preferences(clock.today()))
        .expect("generate");
    assert_eq!(repo.save_calls(), 1);
    match outcome.persistence {
        PersistenceStatus::Failed { message } => assert!(message.contains("conflict")),
        PersistenceStatus::Saved => panic!("conflict should surface"),
    }
}

#[test]
fn operations_on_missing_plans_report_not_found() {
    let clock = clock();
    let service = service_with(Arc::new(InMemoryPlanRepository::new()), clock.clone());

    assert!(matches!(
        service.toggle_session_completion("ghost", "s1"),
        Err(AppError::NotFound)
    ));
    assert!(matches!(service.remove_session("ghost", "s1"), Err(AppError::NotFound)));
    assert!(matches!(service.analyze_progress("ghost"), Err(AppError::NotFound)));
    assert!(matches!(service.auto_reschedule_missed("ghost"), Err(AppError::NotFound)));
    assert!(service.get_plan("ghost").expect("load").is_none());

    let badges = service.evaluate_badges("ghost").expect("badges without plan");
    assert!(badges.newly_earned.is_empty());
    assert!(badges.badges.iter().all(|badge| !badge.is_earned));
}

#[test]
fn invalid_reschedules_are_rejected() {
    let clock = clock();
    let service = service_with(Arc::new(InMemoryPlanRepository::new()), clock.clone());
    let plan = service
        .generate_plan("u1", &[course()], &[], &preferences(clock.today()))
        .expect("generate")
        .plan;
    let session_id = plan.sessions[0].id.clone();

    let past = service.reschedule_session(
        "u1",
        &session_id,
        clock.today() - Duration::days(1),
        RescheduleMode::Manual,
    );
    assert!(matches!(past, Err(AppError::Validation { .. })));

    service
        .toggle_session_completion("u1", &session_id)
        .expect("complete");
    let completed = service.reschedule_session(
        "u1",
        &session_id,
        clock.today() + Duration::days(3),
        RescheduleMode::Manual,
    );
    assert!(matches!(completed, Err(AppError::Validation { .. })));

    let unchanged = service.get_plan("u1").expect("load").expect("plan");
    assert_eq!(unchanged.session(&session_id).map(|s| s.date), Some(plan.sessions[0].date));
}

#[test]
fn concurrent_writers_detect_the_stale_plan() {
    let dir = tempdir().expect("temp dir");
    let db_path = dir.path().join("planner.sqlite");
    let clock = clock();

    let cached = |path: &std::path::Path| -> Arc<dyn PlanRepository> {
        let db = DbPool::new(path).expect("db pool");
        Arc::new(CachedPlanRepository::new(SqlitePlanRepository::new(db), 8))
    };
    let first = StudyPlannerService::new(
        PlannerRepositories::sqlite(DbPool::new(&db_path).expect("db pool")).with_plans(cached(&db_path)),
        PlannerSettings::default(),
        clock.clone(),
    );
    let second = StudyPlannerService::new(
        PlannerRepositories::sqlite(DbPool::new(&db_path).expect("db pool")).with_plans(cached(&db_path)),
        PlannerSettings::default(),
        clock.clone(),
    );

    let plan = first
        .generate_plan("u1", &[course()], &[], &preferences(clock.today()))
        .expect("generate")
        .plan;
    let ids: Vec<String> = plan.sessions.iter().map(|s| s.id.clone()).collect();

    // Both caches now hold version 1.
    assert_eq!(second.get_plan("u1").expect("load").map(|p| p.version), Some(1));

    let winner = first
        .toggle_session_completion("u1", &ids[0])
        .expect("first writer");
    assert!(winner.persistence.is_saved());
    assert_eq!(winner.plan.version, 2);

    let loser = second
        .toggle_session_completion("u1", &ids[1])
        .expect("second writer");
    assert!(matches!(loser.persistence, PersistenceStatus::Failed { .. }));

    // The failed save evicted the stale entry; a retry sees the winner's write.
    let retried = second
        .toggle_session_completion("u1", &ids[1])
        .expect("retry");
    assert!(retried.persistence.is_saved());
    assert_eq!(retried.plan.version, 3);
    let stored = retried.plan;
    assert!(stored.session(&ids[0]).is_some_and(|s| s.is_completed));
    assert!(stored.session(&ids[1]).is_some_and(|s| s.is_completed));
}

#[test]
fn unreadable_database_path_fails_to_open() {
    let dir = tempdir().expect("temp dir");
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"plain file").expect("write blocker");

    let result = StudyPlannerService::open(&blocker.join("planner.sqlite"));
    assert!(result.is_err());
}
