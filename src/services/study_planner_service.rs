use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDate;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::db::repositories::plan_repository::SqlitePlanRepository;
use crate::db::repositories::PlannerRepositories;
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::adaptation::{AdaptationSuggestion, MissedSessionAlert, RescheduleMode};
use crate::models::badge::PlannerBadge;
use crate::models::buddy::BuddySystem;
use crate::models::course::{Course, StudyPreferences};
use crate::models::plan_change::{PersistenceStatus, PlanChange, PlanChangeKind, PlanOutcome};
use crate::models::settings::PlannerSettings;
use crate::models::study_plan::{StudyPlan, StudySession};
use crate::services::badge_evaluator;
use crate::services::buddy_notifier::{BuddyNotifier, NotificationSink};
use crate::services::plan_cache::{CachedPlanRepository, DEFAULT_PLAN_CACHE_CAPACITY};
use crate::services::plan_merger::{self, MergeResult};
use crate::services::progress_analyzer::ProgressAnalyzer;
use crate::services::reschedule_service::Rescheduler;
use crate::services::session_generator::SessionGenerator;
use crate::services::settings_service::SettingsService;
use crate::utils::clock::{Clock, SystemClock};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MissedAlertOutcome {
    pub alert: MissedSessionAlert,
    pub outcome: PlanOutcome,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BadgeReport {
    pub badges: Vec<PlannerBadge>,
    pub newly_earned: Vec<PlannerBadge>,
}

/// Entry point for embedders. Every mutating call loads the user's plan, applies
/// one component, saves write-through and returns a [`PlanOutcome`].
pub struct StudyPlannerService {
    repos: PlannerRepositories,
    settings: PlannerSettings,
    clock: Arc<dyn Clock>,
    generator: SessionGenerator,
    rescheduler: Rescheduler,
    analyzer: ProgressAnalyzer,
    notifier: BuddyNotifier,
}

impl StudyPlannerService {
    pub fn new(repos: PlannerRepositories, settings: PlannerSettings, clock: Arc<dyn Clock>) -> Self {
        Self {
            generator: SessionGenerator::new(settings.clone()),
            rescheduler: Rescheduler::new(settings.clone()),
            analyzer: ProgressAnalyzer::new(settings.clone()),
            notifier: BuddyNotifier::new(settings.clone()),
            repos,
            settings,
            clock,
        }
    }

    /// SQLite-backed service with cached plan reads and settings loaded from the
    /// same database.
    pub fn open(db_path: &Path) -> AppResult<Self> {
        let db = DbPool::new(db_path)?;
        let settings = SettingsService::new(db.clone()).get()?;
        let plans = CachedPlanRepository::new(
            SqlitePlanRepository::new(db.clone()),
            DEFAULT_PLAN_CACHE_CAPACITY,
        );
        let repos = PlannerRepositories::sqlite(db).with_plans(Arc::new(plans));
        Ok(Self::new(repos, settings, Arc::new(SystemClock)))
    }

    pub fn settings(&self) -> &PlannerSettings {
        &self.settings
    }

    pub fn get_plan(&self, user_id: &str) -> AppResult<Option<StudyPlan>> {
        self.repos.plans.get(user_id)
    }

    pub fn recent_changes(&self, user_id: &str, limit: usize) -> AppResult<Vec<PlanChange>> {
        self.repos.changes.list_recent(user_id, limit)
    }

    /// Builds a fresh plan and replaces the user's current one, keeping its id.
    pub fn generate_plan(
        &self,
        user_id: &str,
        courses: &[Course],
        complete_course_ids: &[String],
        preferences: &StudyPreferences,
    ) -> AppResult<PlanOutcome> {
        let now = self.clock.now();
        let mut plan = self.generator.generate(
            courses,
            complete_course_ids,
            preferences,
            user_id,
            self.clock.today(),
            now,
        );

        match self.repos.plans.get(user_id) {
            Ok(Some(existing)) => {
                plan.id = existing.id;
                plan.version = existing.version;
            }
            Ok(None) => {}
            Err(err) => warn!(
                target: "app::planner",
                %user_id,
                error = %err,
                "could not read existing plan before regenerating"
            ),
        }

        let session_ids = plan.sessions.iter().map(|s| s.id.clone()).collect();
        let reason = format!(
            "Generated {} sessions across {} courses",
            plan.sessions.len(),
            plan.course_ids().len()
        );
        Ok(self.commit(plan, PlanChangeKind::Generated, session_ids, reason))
    }

    /// Adds a newly unlocked course after the current schedule. Falls back to
    /// generating a plan when the user has none.
    pub fn merge_new_course(
        &self,
        user_id: &str,
        course: &Course,
        preferences: &StudyPreferences,
    ) -> AppResult<PlanOutcome> {
        let Some(mut plan) = self.repos.plans.get(user_id)? else {
            info!(target: "app::planner", %user_id, course_id = %course.id, "no plan yet, generating from new course");
            return self.generate_plan(
                user_id,
                std::slice::from_ref(course),
                &[course.id.clone()],
                preferences,
            );
        };

        let now = self.clock.now();
        match plan_merger::merge_course(
            &self.generator,
            &mut plan,
            course,
            preferences,
            self.clock.today(),
            now,
        ) {
            MergeResult::Skipped { reason } => {
                let change = PlanChange::new(&plan, PlanChangeKind::MergeSkipped, Vec::new(), reason, now);
                self.record_change(&change);
                Ok(PlanOutcome {
                    plan,
                    change,
                    persistence: PersistenceStatus::Saved,
                })
            }
            MergeResult::Merged { session_ids } => {
                let reason = plan.adaptation_reason.clone().unwrap_or_default();
                Ok(self.commit(plan, PlanChangeKind::CourseMerged, session_ids, reason))
            }
        }
    }

    /// Flips completion of one session; toggling twice restores the plan's progress.
    /// Reopening a past session flags it missed again.
    pub fn toggle_session_completion(&self, user_id: &str, session_id: &str) -> AppResult<PlanOutcome> {
        let mut plan = self.load(user_id)?;
        let now = self.clock.now();
        let today = self.clock.today();
        let session = plan.session_mut(session_id).ok_or_else(AppError::not_found)?;

        let kind = if session.is_completed {
            session.mark_incomplete(today);
            PlanChangeKind::SessionReopened
        } else {
            session.mark_completed(now);
            PlanChangeKind::SessionCompleted
        };
        let reason = format!("'{}' marked {}", session.display_title(), session.status);
        plan.refresh(now);

        Ok(self.commit(plan, kind, vec![session_id.to_string()], reason))
    }

    pub fn remove_session(&self, user_id: &str, session_id: &str) -> AppResult<PlanOutcome> {
        let mut plan = self.load(user_id)?;
        let index = plan
            .sessions
            .iter()
            .position(|session| session.id == session_id)
            .ok_or_else(AppError::not_found)?;

        let removed = plan.sessions.remove(index);
        plan.recompute_total_hours();
        plan.name = crate::models::study_plan::plan_name(plan.course_ids().len());
        plan.refresh(self.clock.now());

        let reason = format!("Removed '{}' on {}", removed.display_title(), removed.date);
        Ok(self.commit(plan, PlanChangeKind::SessionRemoved, vec![removed.id], reason))
    }

    pub fn check_missed_sessions(&self, user_id: &str) -> AppResult<Vec<StudySession>> {
        let plan = self.load(user_id)?;
        Ok(self
            .rescheduler
            .check_missed_sessions(&plan, self.clock.today())
            .into_iter()
            .cloned()
            .collect())
    }

    /// Flags the first missed session and persists the flag. `None` when nothing
    /// is overdue.
    pub fn create_missed_alert(&self, user_id: &str) -> AppResult<Option<MissedAlertOutcome>> {
        let mut plan = self.load(user_id)?;
        let Some(alert) = self
            .rescheduler
            .create_missed_alert(&mut plan, self.clock.today(), self.clock.now())
        else {
            return Ok(None);
        };

        let reason = format!(
            "'{}' on {} was missed; {} slots proposed",
            alert.session.display_title(),
            alert.session.date,
            alert.suggested_dates.len()
        );
        let outcome = self.commit(
            plan,
            PlanChangeKind::SessionMissed,
            vec![alert.session.id.clone()],
            reason,
        );
        Ok(Some(MissedAlertOutcome { alert, outcome }))
    }

    pub fn reschedule_session(
        &self,
        user_id: &str,
        session_id: &str,
        new_date: NaiveDate,
        mode: RescheduleMode,
    ) -> AppResult<PlanOutcome> {
        let today = self.clock.today();
        if new_date < today {
            return Err(AppError::validation(format!(
                "cannot reschedule into the past ({new_date} is before {today})"
            )));
        }

        let mut plan = self.load(user_id)?;
        self.rescheduler
            .reschedule_session(&mut plan, session_id, new_date, mode, self.clock.now())?;
        let reason = plan.adaptation_reason.clone().unwrap_or_default();
        Ok(self.commit(
            plan,
            PlanChangeKind::SessionRescheduled,
            vec![session_id.to_string()],
            reason,
        ))
    }

    pub fn auto_reschedule_missed(&self, user_id: &str) -> AppResult<PlanOutcome> {
        let mut plan = self.load(user_id)?;
        let moved = self
            .rescheduler
            .auto_reschedule_missed(&mut plan, self.clock.today(), self.clock.now());
        let reason = if moved.is_empty() {
            "No missed sessions could be rescheduled automatically".to_string()
        } else {
            plan.adaptation_reason.clone().unwrap_or_default()
        };
        Ok(self.commit(plan, PlanChangeKind::SessionRescheduled, moved, reason))
    }

    pub fn analyze_progress(&self, user_id: &str) -> AppResult<Vec<AdaptationSuggestion>> {
        let plan = self.load(user_id)?;
        Ok(self.analyzer.analyze(&plan, self.clock.now()))
    }

    /// Applies one of the suggestion's actions and deactivates the suggestion.
    /// Inactive suggestions are rejected so an action is never applied twice.
    pub fn apply_suggestion(
        &self,
        user_id: &str,
        suggestion: &mut AdaptationSuggestion,
        action_id: &str,
    ) -> AppResult<PlanOutcome> {
        if !suggestion.is_active {
            return Err(AppError::validation(format!(
                "suggestion {} is no longer active",
                suggestion.id
            )));
        }
        let chosen = suggestion.action(action_id).cloned().ok_or(AppError::NotFound)?;

        let mut plan = self.load(user_id)?;
        let touched =
            self.analyzer
                .apply_suggestion(&mut plan, &chosen, self.clock.today(), self.clock.now())?;
        suggestion.dismiss();
        let reason = plan.adaptation_reason.clone().unwrap_or_default();
        Ok(self.commit(plan, PlanChangeKind::SuggestionApplied, touched, reason))
    }

    /// Suggestions are not stored; dismissal only flips the flag on the caller's copy.
    pub fn dismiss_suggestion(&self, suggestion: &mut AdaptationSuggestion) {
        suggestion.dismiss();
    }

    /// Evaluates the user's badges against their plan and buddy, persisting newly
    /// earned ones. Users without stored badges start from the default catalogue.
    pub fn evaluate_badges(&self, user_id: &str) -> AppResult<BadgeReport> {
        let mut current = self.repos.companions.get_badges(user_id)?;
        if current.is_empty() {
            current = badge_evaluator::default_badges();
        }

        let Some(plan) = self.repos.plans.get(user_id)? else {
            return Ok(BadgeReport {
                badges: current,
                newly_earned: Vec::new(),
            });
        };
        let buddy = self.repos.companions.get_buddy(user_id)?;

        let evaluated = badge_evaluator::evaluate(&current, &plan, buddy.as_ref(), self.clock.now());
        let newly_earned: Vec<PlannerBadge> = badge_evaluator::newly_earned(&current, &evaluated)
            .into_iter()
            .cloned()
            .collect();

        self.repos.companions.save_badges(user_id, &evaluated)?;
        Ok(BadgeReport {
            badges: evaluated,
            newly_earned,
        })
    }

    /// Stores the buddy configuration. Notification history of an existing
    /// configuration is kept.
    pub fn configure_buddy(&self, mut buddy: BuddySystem) -> AppResult<BuddySystem> {
        if buddy.buddy_name.trim().is_empty() {
            return Err(AppError::validation("buddy name cannot be empty"));
        }
        if buddy.buddy_contact.trim().is_empty() {
            return Err(AppError::validation("buddy contact cannot be empty"));
        }

        if let Some(existing) = self.repos.companions.get_buddy(&buddy.user_id)? {
            if buddy.last_notification_sent.is_none() {
                buddy.last_notification_sent = existing.last_notification_sent;
            }
            buddy.notifications_sent = buddy.notifications_sent.max(existing.notifications_sent);
        }

        self.repos.companions.save_buddy(&buddy)?;
        info!(
            target: "app::planner",
            user_id = %buddy.user_id,
            frequency = %buddy.alert_frequency,
            active = buddy.is_active,
            "buddy configured"
        );
        Ok(buddy)
    }

    pub fn get_buddy(&self, user_id: &str) -> AppResult<Option<BuddySystem>> {
        self.repos.companions.get_buddy(user_id)
    }

    /// Sends a buddy alert when the user qualifies. Returns the message sent.
    pub fn notify_buddy<R: Rng + ?Sized>(
        &self,
        user_id: &str,
        sink: &dyn NotificationSink,
        rng: &mut R,
    ) -> AppResult<Option<String>> {
        let Some(mut buddy) = self.repos.companions.get_buddy(user_id)? else {
            return Ok(None);
        };
        let Some(plan) = self.repos.plans.get(user_id)? else {
            return Ok(None);
        };

        let now = self.clock.now();
        if !self.notifier.should_notify(&plan, &buddy, now) {
            return Ok(None);
        }

        let message = self.notifier.message(&plan, &buddy, now, rng);
        sink.send(&buddy.buddy_contact, &message)
            .map_err(|err| AppError::notification(buddy.buddy_contact.clone(), err.to_string()))?;

        buddy.record_notification(now);
        self.repos.companions.save_buddy(&buddy)?;
        info!(
            target: "app::planner",
            %user_id,
            total = buddy.notifications_sent,
            "buddy notified"
        );
        Ok(Some(message))
    }

    fn load(&self, user_id: &str) -> AppResult<StudyPlan> {
        self.repos.plans.get(user_id)?.ok_or_else(AppError::not_found)
    }

    /// Saves the plan and records the change. Storage failures are retried once;
    /// conflicts are not. Either way the caller still gets the in-memory plan.
    fn commit(
        &self,
        mut plan: StudyPlan,
        kind: PlanChangeKind,
        session_ids: Vec<String>,
        reason: String,
    ) -> PlanOutcome {
        let persistence = match self.save_with_retry(&plan) {
            Ok(version) => {
                plan.version = version;
                PersistenceStatus::Saved
            }
            Err(err) => {
                warn!(
                    target: "app::planner",
                    user_id = %plan.user_id,
                    change = %kind,
                    error = %err,
                    "plan change not persisted"
                );
                PersistenceStatus::Failed {
                    message: err.to_string(),
                }
            }
        };

        let change = PlanChange::new(&plan, kind, session_ids, reason, self.clock.now());
        if persistence.is_saved() {
            self.record_change(&change);
        }
        PlanOutcome {
            plan,
            change,
            persistence,
        }
    }

    fn save_with_retry(&self, plan: &StudyPlan) -> AppResult<i64> {
        match self.repos.plans.save(plan) {
            Ok(version) => Ok(version),
            Err(err) if err.is_conflict() => Err(err),
            Err(err) => {
                warn!(target: "app::planner", user_id = %plan.user_id, error = %err, "plan save failed, retrying once");
                self.repos.plans.save(plan)
            }
        }
    }

    fn record_change(&self, change: &PlanChange) {
        if let Err(err) = self.repos.changes.append(change) {
            warn!(
                target: "app::planner",
                user_id = %change.user_id,
                change = %change.kind,
                error = %err,
                "failed to append plan change"
            );
        }
    }
}
