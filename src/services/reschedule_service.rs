use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::adaptation::{MissedSessionAlert, RescheduleMode};
use crate::models::settings::PlannerSettings;
use crate::models::study_plan::{StudyPlan, StudySession};
use crate::services::schedule_utils;

/// Detects sessions whose day has passed and moves them to lightly loaded days.
#[derive(Debug, Clone)]
pub struct Rescheduler {
    settings: PlannerSettings,
}

impl Rescheduler {
    pub fn new(settings: PlannerSettings) -> Self {
        Self { settings }
    }

    /// Sessions dated before `today` that are neither completed nor already flagged.
    /// Pure scan; nothing is mutated.
    pub fn check_missed_sessions<'a>(
        &self,
        plan: &'a StudyPlan,
        today: NaiveDate,
    ) -> Vec<&'a StudySession> {
        plan.sessions
            .iter()
            .filter(|session| session.date < today && session.is_pending())
            .collect()
    }

    /// Flags the first missed session and proposes reschedule dates for it.
    pub fn create_missed_alert(
        &self,
        plan: &mut StudyPlan,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Option<MissedSessionAlert> {
        let session_id = self
            .check_missed_sessions(plan, today)
            .first()
            .map(|session| session.id.clone())?;

        let session = plan.session_mut(&session_id)?;
        session.mark_missed();
        let snapshot = session.clone();
        plan.refresh(now);

        let suggested_dates = self.suggest_dates(plan, today);
        debug!(
            target: "app::planner",
            session_id = %snapshot.id,
            slots = suggested_dates.len(),
            "created missed session alert"
        );

        Some(MissedSessionAlert {
            id: Uuid::new_v4().to_string(),
            session: snapshot,
            suggested_dates,
            created_at: now,
        })
    }

    /// Up to `max_reschedule_suggestions` days from tomorrow, before the exam and within
    /// the search window, that hold fewer than `reschedule_daily_cap` live sessions.
    pub fn suggest_dates(&self, plan: &StudyPlan, today: NaiveDate) -> Vec<NaiveDate> {
        let mut slots = Vec::new();
        for offset in 1..=self.settings.reschedule_search_days {
            if slots.len() >= self.settings.max_reschedule_suggestions {
                break;
            }
            let date = schedule_utils::add_days(today, offset);
            if date >= plan.exam_date {
                break;
            }
            let load = plan
                .sessions_on(date)
                .filter(|session| !session.is_missed)
                .count();
            if load < self.settings.reschedule_daily_cap {
                slots.push(date);
            }
        }
        slots
    }

    pub fn reschedule_session(
        &self,
        plan: &mut StudyPlan,
        session_id: &str,
        new_date: NaiveDate,
        mode: RescheduleMode,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        let session = plan.session_mut(session_id).ok_or_else(AppError::not_found)?;
        if session.is_completed {
            return Err(AppError::validation("completed sessions cannot be rescheduled"));
        }

        let previous = session.date;
        session.reschedule_to(new_date);
        let title = session.display_title().to_string();

        plan.adaptation_reason = Some(match mode {
            RescheduleMode::Automatic => format!(
                "Automatically rescheduled '{title}' from {previous} to {new_date} after it was missed"
            ),
            RescheduleMode::Manual => {
                format!("Manually rescheduled '{title}' from {previous} to {new_date}")
            }
        });
        plan.refresh(now);

        info!(
            target: "app::planner",
            user_id = %plan.user_id,
            %session_id,
            %previous,
            %new_date,
            ?mode,
            "session rescheduled"
        );
        Ok(())
    }

    /// Flags every missed session and moves each to its first free slot. Sessions
    /// without a slot stay missed. Returns the ids that were moved.
    pub fn auto_reschedule_missed(
        &self,
        plan: &mut StudyPlan,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> Vec<String> {
        let mut moved = Vec::new();
        while let Some(alert) = self.create_missed_alert(plan, today, now) {
            if let Some(date) = alert.suggested_dates.first().copied() {
                if self
                    .reschedule_session(plan, &alert.session.id, date, RescheduleMode::Automatic, now)
                    .is_ok()
                {
                    moved.push(alert.session.id);
                }
            }
        }

        if moved.len() > 1 {
            plan.adaptation_reason = Some(format!(
                "Automatically rescheduled {} missed sessions",
                moved.len()
            ));
        }
        moved
    }
}
