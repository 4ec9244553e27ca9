use chrono::{DateTime, Utc};
use rand::Rng;
use tracing::{debug, info};

use crate::error::AppResult;
use crate::models::buddy::BuddySystem;
use crate::models::settings::PlannerSettings;
use crate::models::study_plan::StudyPlan;
use crate::services::schedule_utils;

const TEMPLATES: [&str; 4] = [
    "Hey {buddy}, your study partner has missed {count} sessions in the last few days. A quick check-in could help!",
    "{buddy}, {count} study sessions slipped by recently. Maybe send some encouragement?",
    "Accountability ping for {buddy}: {count} missed sessions lately. Time for a friendly nudge.",
    "{buddy}, your buddy could use a boost. They've missed {count} sessions this week.",
];

/// Outbound channel for buddy alerts.
pub trait NotificationSink: Send + Sync {
    fn send(&self, target: &str, message: &str) -> AppResult<()>;
}

/// Sink that only writes the alert to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotificationSink;

impl NotificationSink for LogNotificationSink {
    fn send(&self, target: &str, message: &str) -> AppResult<()> {
        info!(target: "app::notify", %target, %message, "buddy notification");
        Ok(())
    }
}

/// Decides when an accountability buddy should hear about missed sessions.
#[derive(Debug, Clone)]
pub struct BuddyNotifier {
    settings: PlannerSettings,
}

impl BuddyNotifier {
    pub fn new(settings: PlannerSettings) -> Self {
        Self { settings }
    }

    /// Sessions flagged missed whose date lies within the lookback window ending today.
    pub fn recent_missed_count(&self, plan: &StudyPlan, now: DateTime<Utc>) -> usize {
        let today = now.date_naive();
        let window_start = schedule_utils::add_days(today, -self.settings.buddy_lookback_days);
        plan.sessions
            .iter()
            .filter(|session| session.is_missed)
            .filter(|session| session.date >= window_start && session.date <= today)
            .count()
    }

    pub fn cooldown_elapsed(&self, buddy: &BuddySystem, now: DateTime<Utc>) -> bool {
        let Some(last_sent) = buddy.last_notification_sent else {
            return true;
        };
        match buddy.alert_frequency.cooldown() {
            Some(cooldown) => now - last_sent >= cooldown,
            None => false,
        }
    }

    pub fn should_notify(&self, plan: &StudyPlan, buddy: &BuddySystem, now: DateTime<Utc>) -> bool {
        if !buddy.is_active {
            return false;
        }

        let missed = self.recent_missed_count(plan, now);
        if missed < self.settings.buddy_missed_threshold {
            return false;
        }

        if !self.cooldown_elapsed(buddy, now) {
            debug!(
                target: "app::notify",
                user_id = %buddy.user_id,
                frequency = %buddy.alert_frequency,
                "buddy alert suppressed by cooldown"
            );
            return false;
        }
        true
    }

    pub fn message<R: Rng + ?Sized>(
        &self,
        plan: &StudyPlan,
        buddy: &BuddySystem,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> String {
        let index = rng.gen_range(0..TEMPLATES.len());
        self.message_with_index(plan, buddy, now, index)
    }

    /// Renders template `index` (wrapped into range).
    pub fn message_with_index(
        &self,
        plan: &StudyPlan,
        buddy: &BuddySystem,
        now: DateTime<Utc>,
        index: usize,
    ) -> String {
        let count = self.recent_missed_count(plan, now);
        TEMPLATES[index % TEMPLATES.len()]
            .replace("{buddy}", &buddy.buddy_name)
            .replace("{count}", &count.to_string())
    }

    pub fn template_count() -> usize {
        TEMPLATES.len()
    }
}
