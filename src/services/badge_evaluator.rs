use chrono::{DateTime, NaiveDate, Utc};
use tracing::info;

use crate::models::badge::{BadgeCriteria, BadgeType, PlannerBadge};
use crate::models::buddy::BuddySystem;
use crate::models::study_plan::StudyPlan;
use crate::services::schedule_utils;

pub const STREAK_3: &str = "streak_3";
pub const STREAK_7: &str = "streak_7";
pub const COMEBACK: &str = "comeback";
pub const ACCOUNTABILITY: &str = "accountability";
pub const SESSIONS_10: &str = "sessions_10";
pub const SESSIONS_50: &str = "sessions_50";

/// The built-in badge catalogue, all unearned.
pub fn default_badges() -> Vec<PlannerBadge> {
    vec![
        PlannerBadge::new(
            STREAK_3,
            "Warming Up",
            "Studied three days in a row.",
            BadgeType::Discipline,
            BadgeCriteria {
                consecutive_days: Some(3),
                ..Default::default()
            },
        ),
        PlannerBadge::new(
            STREAK_7,
            "Iron Discipline",
            "Studied seven days in a row.",
            BadgeType::Discipline,
            BadgeCriteria {
                consecutive_days: Some(7),
                ..Default::default()
            },
        ),
        PlannerBadge::new(
            COMEBACK,
            "Comeback Kid",
            "Completed three sessions after rescheduling them.",
            BadgeType::Resilience,
            BadgeCriteria {
                rescheduled_completed: Some(3),
                ..Default::default()
            },
        ),
        PlannerBadge::new(
            ACCOUNTABILITY,
            "Accountability Partner",
            "Your study buddy checked in on you.",
            BadgeType::Coaching,
            BadgeCriteria {
                notifications_sent: Some(1),
                ..Default::default()
            },
        ),
        PlannerBadge::new(
            SESSIONS_10,
            "Ten Down",
            "Completed ten study sessions.",
            BadgeType::Progress,
            BadgeCriteria {
                completed_sessions: Some(10),
                ..Default::default()
            },
        ),
        PlannerBadge::new(
            SESSIONS_50,
            "Half Century",
            "Completed fifty study sessions.",
            BadgeType::Progress,
            BadgeCriteria {
                completed_sessions: Some(50),
                ..Default::default()
            },
        ),
    ]
}

/// Longest run of consecutive calendar days with at least one completed session.
pub fn longest_streak(plan: &StudyPlan) -> u32 {
    let mut days: Vec<NaiveDate> = plan
        .sessions
        .iter()
        .filter(|session| session.is_completed)
        .map(|session| session.date)
        .collect();
    days.sort();
    days.dedup();

    let mut longest = 0u32;
    let mut current = 0u32;
    let mut previous: Option<NaiveDate> = None;
    for day in days {
        current = match previous {
            Some(prev) if schedule_utils::days_between(prev, day) == 1 => current + 1,
            _ => 1,
        };
        longest = longest.max(current);
        previous = Some(day);
    }
    longest
}

fn is_satisfied(badge: &PlannerBadge, plan: &StudyPlan, buddy: Option<&BuddySystem>) -> bool {
    let criteria = &badge.criteria;
    match badge.badge_type {
        BadgeType::Discipline => criteria
            .consecutive_days
            .is_some_and(|days| longest_streak(plan) >= days),
        BadgeType::Resilience => criteria.rescheduled_completed.is_some_and(|threshold| {
            let count = plan
                .sessions
                .iter()
                .filter(|session| session.is_rescheduled && session.is_completed)
                .count();
            count >= threshold as usize
        }),
        // Any notification ever sent counts; the threshold is not a true count.
        BadgeType::Coaching => buddy.is_some_and(|buddy| buddy.last_notification_sent.is_some()),
        BadgeType::Progress => criteria
            .completed_sessions
            .is_some_and(|threshold| plan.completed_count() >= threshold as usize),
    }
}

/// Returns the badge set with newly satisfied badges stamped. Earned badges are
/// carried over untouched and never re-evaluated.
pub fn evaluate(
    badges: &[PlannerBadge],
    plan: &StudyPlan,
    buddy: Option<&BuddySystem>,
    now: DateTime<Utc>,
) -> Vec<PlannerBadge> {
    badges
        .iter()
        .map(|badge| {
            if badge.is_earned || !is_satisfied(badge, plan, buddy) {
                return badge.clone();
            }
            info!(
                target: "app::planner",
                user_id = %plan.user_id,
                badge = %badge.id,
                "badge earned"
            );
            PlannerBadge {
                is_earned: true,
                earned_at: Some(now),
                ..badge.clone()
            }
        })
        .collect()
}

/// Badges earned in `after` that were not earned in `before`.
pub fn newly_earned<'a>(before: &[PlannerBadge], after: &'a [PlannerBadge]) -> Vec<&'a PlannerBadge> {
    after
        .iter()
        .filter(|badge| badge.is_earned)
        .filter(|badge| {
            !before
                .iter()
                .any(|previous| previous.id == badge.id && previous.is_earned)
        })
        .collect()
}
