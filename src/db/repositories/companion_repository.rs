use std::collections::HashMap;
use std::convert::TryFrom;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{named_params, OptionalExtension, Row};

use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::badge::PlannerBadge;
use crate::models::buddy::{AlertFrequency, BuddySystem};

/// Buddy configuration and badge state, keyed by user.
pub trait CompanionRepository: Send + Sync {
    fn get_buddy(&self, user_id: &str) -> AppResult<Option<BuddySystem>>;
    fn save_buddy(&self, buddy: &BuddySystem) -> AppResult<()>;
    /// Empty when the user has never been evaluated.
    fn get_badges(&self, user_id: &str) -> AppResult<Vec<PlannerBadge>>;
    fn save_badges(&self, user_id: &str, badges: &[PlannerBadge]) -> AppResult<()>;
}

#[derive(Debug, Clone)]
struct BuddyRow {
    user_id: String,
    buddy_name: String,
    buddy_contact: String,
    is_active: bool,
    alert_frequency: String,
    last_notification_sent: Option<String>,
    notifications_sent: u32,
}

impl TryFrom<&Row<'_>> for BuddyRow {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'_>) -> Result<Self, Self::Error> {
        Ok(Self {
            user_id: row.get("user_id")?,
            buddy_name: row.get("buddy_name")?,
            buddy_contact: row.get("buddy_contact")?,
            is_active: row.get("is_active")?,
            alert_frequency: row.get("alert_frequency")?,
            last_notification_sent: row.get("last_notification_sent")?,
            notifications_sent: row.get("notifications_sent")?,
        })
    }
}

impl TryFrom<BuddyRow> for BuddySystem {
    type Error = AppError;

    fn try_from(row: BuddyRow) -> Result<Self, Self::Error> {
        let last_notification_sent = row
            .last_notification_sent
            .as_deref()
            .map(|raw| {
                DateTime::parse_from_rfc3339(raw)
                    .map(|value| value.with_timezone(&Utc))
                    .map_err(|err| AppError::database(format!("invalid last_notification_sent: {err}")))
            })
            .transpose()?;

        Ok(BuddySystem {
            user_id: row.user_id,
            buddy_name: row.buddy_name,
            buddy_contact: row.buddy_contact,
            is_active: row.is_active,
            alert_frequency: AlertFrequency::from(row.alert_frequency),
            last_notification_sent,
            notifications_sent: row.notifications_sent,
        })
    }
}

#[derive(Debug, Clone)]
pub struct SqliteCompanionRepository {
    db: DbPool,
}

impl SqliteCompanionRepository {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

impl CompanionRepository for SqliteCompanionRepository {
    fn get_buddy(&self, user_id: &str) -> AppResult<Option<BuddySystem>> {
        self.db.with_connection(|conn| {
            let row = conn
                .query_row(
                    r#"
                        SELECT user_id, buddy_name, buddy_contact, is_active, alert_frequency,
                               last_notification_sent, notifications_sent
                        FROM buddy_configs WHERE user_id = ?1
                    "#,
                    [user_id],
                    |row| BuddyRow::try_from(row),
                )
                .optional()?;
            row.map(BuddySystem::try_from).transpose()
        })
    }

    fn save_buddy(&self, buddy: &BuddySystem) -> AppResult<()> {
        self.db.with_connection(|conn| {
            conn.execute(
                r#"
                    INSERT INTO buddy_configs (
                        user_id, buddy_name, buddy_contact, is_active, alert_frequency,
                        last_notification_sent, notifications_sent
                    ) VALUES (
                        :user_id, :buddy_name, :buddy_contact, :is_active, :alert_frequency,
                        :last_sent, :sent
                    )
                    ON CONFLICT(user_id) DO UPDATE SET
                        buddy_name = excluded.buddy_name,
                        buddy_contact = excluded.buddy_contact,
                        is_active = excluded.is_active,
                        alert_frequency = excluded.alert_frequency,
                        last_notification_sent = excluded.last_notification_sent,
                        notifications_sent = excluded.notifications_sent
                "#,
                named_params! {
                    ":user_id": buddy.user_id,
                    ":buddy_name": buddy.buddy_name,
                    ":buddy_contact": buddy.buddy_contact,
                    ":is_active": buddy.is_active,
                    ":alert_frequency": buddy.alert_frequency.as_str(),
                    ":last_sent": buddy.last_notification_sent.map(|at| at.to_rfc3339()),
                    ":sent": buddy.notifications_sent,
                },
            )?;
            Ok(())
        })
    }

    fn get_badges(&self, user_id: &str) -> AppResult<Vec<PlannerBadge>> {
        self.db.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT payload FROM planner_badges WHERE user_id = ?1 ORDER BY rowid ASC",
            )?;
            let payloads = stmt
                .query_map([user_id], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;

            payloads
                .iter()
                .map(|payload| serde_json::from_str(payload).map_err(AppError::from))
                .collect()
        })
    }

    fn save_badges(&self, user_id: &str, badges: &[PlannerBadge]) -> AppResult<()> {
        self.db.with_transaction(|tx| {
            for badge in badges {
                tx.execute(
                    r#"
                        INSERT INTO planner_badges (user_id, badge_id, payload, is_earned, earned_at)
                        VALUES (:user_id, :badge_id, :payload, :is_earned, :earned_at)
                        ON CONFLICT(user_id, badge_id) DO UPDATE SET
                            payload = excluded.payload,
                            is_earned = excluded.is_earned,
                            earned_at = excluded.earned_at
                    "#,
                    named_params! {
                        ":user_id": user_id,
                        ":badge_id": badge.id,
                        ":payload": serde_json::to_string(badge)?,
                        ":is_earned": badge.is_earned,
                        ":earned_at": badge.earned_at.map(|at| at.to_rfc3339()),
                    },
                )?;
            }
            Ok(())
        })
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCompanionRepository {
    buddies: Mutex<HashMap<String, BuddySystem>>,
    badges: Mutex<HashMap<String, Vec<PlannerBadge>>>,
}

impl InMemoryCompanionRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CompanionRepository for InMemoryCompanionRepository {
    fn get_buddy(&self, user_id: &str) -> AppResult<Option<BuddySystem>> {
        let buddies = self
            .buddies
            .lock()
            .map_err(|_| AppError::other("buddy store lock poisoned"))?;
        Ok(buddies.get(user_id).cloned())
    }

    fn save_buddy(&self, buddy: &BuddySystem) -> AppResult<()> {
        self.buddies
            .lock()
            .map_err(|_| AppError::other("buddy store lock poisoned"))?
            .insert(buddy.user_id.clone(), buddy.clone());
        Ok(())
    }

    fn get_badges(&self, user_id: &str) -> AppResult<Vec<PlannerBadge>> {
        let badges = self
            .badges
            .lock()
            .map_err(|_| AppError::other("badge store lock poisoned"))?;
        Ok(badges.get(user_id).cloned().unwrap_or_default())
    }

    fn save_badges(&self, user_id: &str, badges: &[PlannerBadge]) -> AppResult<()> {
        self.badges
            .lock()
            .map_err(|_| AppError::other("badge store lock poisoned"))?
            .insert(user_id.to_string(), badges.to_vec());
        Ok(())
    }
}
