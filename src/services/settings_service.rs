use std::fs;
use std::path::Path;
use std::sync::RwLock;

use serde_json::{json, Map as JsonMap, Value as JsonValue};
use tracing::{info, warn};

use crate::db::repositories::settings_repository::SettingsRepository;
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::settings::PlannerSettings;

const KEY_PREFIX: &str = "planner.";
/// Upper bound for day-count settings.
const MAX_DAY_SPAN: i64 = 3650;

/// Planner tunables backed by the `app_settings` table, one row per field
/// (`planner.<fieldName>` holding a JSON value).
pub struct SettingsService {
    db: DbPool,
    cache: RwLock<Option<PlannerSettings>>,
}

impl SettingsService {
    pub fn new(db: DbPool) -> Self {
        Self {
            db,
            cache: RwLock::new(None),
        }
    }

    pub fn get(&self) -> AppResult<PlannerSettings> {
        if let Ok(guard) = self.cache.read() {
            if let Some(settings) = guard.as_ref() {
                return Ok(settings.clone());
            }
        }

        let settings = self.load_settings_from_db()?;
        self.store_in_cache(&settings);
        Ok(settings)
    }

    /// Validates and persists a complete settings value.
    pub fn update(&self, settings: PlannerSettings) -> AppResult<PlannerSettings> {
        validate(&settings)?;
        self.persist(&settings)?;
        self.store_in_cache(&settings);
        info!(target: "app::settings", "planner settings updated");
        Ok(settings)
    }

    /// Merges camelCase fields from a YAML document over the current settings.
    pub fn apply_yaml_overrides(&self, path: &Path) -> AppResult<PlannerSettings> {
        let raw = fs::read_to_string(path)?;
        let overrides: JsonMap<String, JsonValue> = if raw.trim().is_empty() {
            JsonMap::new()
        } else {
            serde_yaml::from_str(&raw)?
        };

        let mut merged = settings_to_map(&self.get()?)?;
        let mut unknown = Vec::new();
        for (key, value) in overrides {
            if merged.contains_key(&key) {
                merged.insert(key, value);
            } else {
                unknown.push(key);
            }
        }
        if !unknown.is_empty() {
            return Err(AppError::validation_with_details(
                "unknown planner settings in override file",
                json!({ "keys": unknown, "path": path.display().to_string() }),
            ));
        }

        let settings: PlannerSettings = serde_json::from_value(JsonValue::Object(merged))?;
        info!(target: "app::settings", path = %path.display(), "applying settings overrides");
        self.update(settings)
    }

    /// Drops every stored override; subsequent reads return defaults.
    pub fn reset(&self) -> AppResult<PlannerSettings> {
        self.db
            .with_connection(|conn| SettingsRepository::delete_with_prefix(conn, KEY_PREFIX))?;
        let defaults = PlannerSettings::default();
        self.store_in_cache(&defaults);
        Ok(defaults)
    }

    fn load_settings_from_db(&self) -> AppResult<PlannerSettings> {
        let rows = self
            .db
            .with_connection(|conn| SettingsRepository::list_with_prefix(conn, KEY_PREFIX))?;

        let mut merged = settings_to_map(&PlannerSettings::default())?;
        for row in rows {
            let field = row.key.trim_start_matches(KEY_PREFIX);
            if !merged.contains_key(field) {
                warn!(target: "app::settings", key = %row.key, "ignoring unknown planner setting");
                continue;
            }
            match serde_json::from_str::<JsonValue>(&row.value) {
                Ok(value) => {
                    merged.insert(field.to_string(), value);
                }
                Err(err) => warn!(
                    target: "app::settings",
                    key = %row.key,
                    error = %err,
                    "ignoring unreadable planner setting"
                ),
            }
        }

        let settings: PlannerSettings = serde_json::from_value(JsonValue::Object(merged))?;
        if let Err(err) = validate(&settings) {
            warn!(target: "app::settings", error = %err, "stored planner settings invalid, using defaults");
            return Ok(PlannerSettings::default());
        }
        Ok(settings)
    }

    fn persist(&self, settings: &PlannerSettings) -> AppResult<()> {
        let fields = settings_to_map(settings)?;
        self.db.with_transaction(|tx| {
            for (field, value) in &fields {
                let key = format!("{KEY_PREFIX}{field}");
                SettingsRepository::upsert(tx, &key, &value.to_string())?;
            }
            Ok(())
        })
    }

    fn store_in_cache(&self, settings: &PlannerSettings) {
        if let Ok(mut guard) = self.cache.write() {
            *guard = Some(settings.clone());
        }
    }
}

fn settings_to_map(settings: &PlannerSettings) -> AppResult<JsonMap<String, JsonValue>> {
    match serde_json::to_value(settings)? {
        JsonValue::Object(map) => Ok(map),
        other => Err(AppError::other(format!(
            "planner settings serialized to non-object: {other}"
        ))),
    }
}

fn ensure_positive(name: &str, value: i64) -> AppResult<()> {
    if value <= 0 {
        return Err(AppError::validation_with_details(
            format!("{name} must be greater than zero"),
            json!({ "field": name, "value": value }),
        ));
    }
    Ok(())
}

fn ensure_day_span(name: &str, value: i64) -> AppResult<()> {
    if !(1..=MAX_DAY_SPAN).contains(&value) {
        return Err(AppError::validation_with_details(
            format!("{name} must be between 1 and {MAX_DAY_SPAN} days"),
            json!({ "field": name, "value": value }),
        ));
    }
    Ok(())
}

fn ensure_percentage(name: &str, value: f64) -> AppResult<()> {
    if !(0.0..=100.0).contains(&value) {
        return Err(AppError::validation_with_details(
            format!("{name} must be between 0 and 100"),
            json!({ "field": name, "value": value }),
        ));
    }
    Ok(())
}

pub fn validate(settings: &PlannerSettings) -> AppResult<()> {
    ensure_day_span("defaultHorizonDays", settings.default_horizon_days)?;
    ensure_day_span("placementSearchDays", settings.placement_search_days)?;
    ensure_positive("reviewEveryNLessons", settings.review_every_n_lessons as i64)?;
    ensure_positive("rescheduleDailyCap", settings.reschedule_daily_cap as i64)?;
    ensure_day_span("rescheduleSearchDays", settings.reschedule_search_days)?;
    ensure_positive("maxRescheduleSuggestions", settings.max_reschedule_suggestions as i64)?;
    ensure_percentage("aheadThreshold", settings.ahead_threshold)?;
    ensure_percentage("behindThreshold", settings.behind_threshold)?;
    ensure_positive("bonusSessionMinutes", settings.bonus_session_minutes)?;
    ensure_day_span("bonusSpacingDays", settings.bonus_spacing_days)?;
    ensure_positive("intensifyStepMinutes", settings.intensify_step_minutes)?;
    ensure_positive("buddyMissedThreshold", settings.buddy_missed_threshold as i64)?;
    ensure_day_span("buddyLookbackDays", settings.buddy_lookback_days)?;

    if settings.intensify_cap_minutes < settings.intensify_step_minutes {
        return Err(AppError::validation(
            "intensifyCapMinutes must be at least intensifyStepMinutes",
        ));
    }
    Ok(())
}
