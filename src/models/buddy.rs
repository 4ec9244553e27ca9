use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AlertFrequency {
    Immediate,
    Daily,
    Weekly,
    /// Unrecognised value kept verbatim so it round-trips through storage.
    Other(String),
}

impl AlertFrequency {
    pub fn as_str(&self) -> &str {
        match self {
            AlertFrequency::Immediate => "immediate",
            AlertFrequency::Daily => "daily",
            AlertFrequency::Weekly => "weekly",
            AlertFrequency::Other(raw) => raw.as_str(),
        }
    }

    /// Minimum gap between two alerts; `None` means the frequency never allows one.
    pub fn cooldown(&self) -> Option<Duration> {
        match self {
            AlertFrequency::Immediate => Some(Duration::hours(1)),
            AlertFrequency::Daily => Some(Duration::hours(24)),
            AlertFrequency::Weekly => Some(Duration::hours(168)),
            AlertFrequency::Other(_) => None,
        }
    }
}

impl From<String> for AlertFrequency {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "immediate" => AlertFrequency::Immediate,
            "daily" => AlertFrequency::Daily,
            "weekly" => AlertFrequency::Weekly,
            _ => AlertFrequency::Other(value),
        }
    }
}

impl From<AlertFrequency> for String {
    fn from(value: AlertFrequency) -> Self {
        match value {
            AlertFrequency::Other(raw) => raw,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for AlertFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BuddySystem {
    pub user_id: String,
    pub buddy_name: String,
    /// Identifier handed to the notification sink (chat handle, email, device id).
    pub buddy_contact: String,
    pub is_active: bool,
    pub alert_frequency: AlertFrequency,
    #[serde(default)]
    pub last_notification_sent: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notifications_sent: u32,
}

impl BuddySystem {
    pub fn new(
        user_id: impl Into<String>,
        buddy_name: impl Into<String>,
        buddy_contact: impl Into<String>,
        alert_frequency: AlertFrequency,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            buddy_name: buddy_name.into(),
            buddy_contact: buddy_contact.into(),
            is_active: true,
            alert_frequency,
            last_notification_sent: None,
            notifications_sent: 0,
        }
    }

    pub fn record_notification(&mut self, at: DateTime<Utc>) {
        self.last_notification_sent = Some(at);
        self.notifications_sent = self.notifications_sent.saturating_add(1);
    }
}
