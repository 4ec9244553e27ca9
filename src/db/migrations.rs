use chrono::{DateTime, Utc};
use rusqlite::{Connection, Row};
use tracing::{info, warn};

use crate::error::AppResult;

const USER_VERSION: i32 = 4;

#[derive(Debug)]
pub struct MigrationInfo {
    pub version: i32,
    pub description: String,
    pub applied_at: DateTime<Utc>,
}

pub fn run(conn: &Connection) -> AppResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS migration_history (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL,
            rollback_sql TEXT
        );
        "#,
    )?;

    let mut current_version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    if current_version < 1 {
        info!(target: "app::db", version = current_version, "running migration v1");
        migrate_to_v1(conn)?;
        current_version = 1;
        set_user_version(conn, current_version)?;
        record_migration(conn, 1, "Add study plans", Some("DROP TABLE IF EXISTS study_plans;"))?;
    }

    if current_version < 2 {
        info!(target: "app::db", version = current_version, "running migration v2");
        migrate_to_v2(conn)?;
        current_version = 2;
        set_user_version(conn, current_version)?;
        record_migration(conn, 2, "Add plan change log", Some("DROP TABLE IF EXISTS plan_changes;"))?;
    }

    if current_version < 3 {
        info!(target: "app::db", version = current_version, "running migration v3");
        migrate_to_v3(conn)?;
        current_version = 3;
        set_user_version(conn, current_version)?;
        record_migration(
            conn,
            3,
            "Add buddy configs and planner badges",
            Some(
                r#"
                DROP TABLE IF EXISTS planner_badges;
                DROP TABLE IF EXISTS buddy_configs;
                "#,
            ),
        )?;
    }

    if current_version < 4 {
        info!(target: "app::db", version = current_version, "running migration v4");
        migrate_to_v4(conn)?;
        current_version = 4;
        set_user_version(conn, current_version)?;
        // SQLite cannot drop columns portably; the summary columns are left in place.
        record_migration(conn, 4, "Add plan summary columns", None)?;
    }

    if current_version != USER_VERSION {
        set_user_version(conn, USER_VERSION)?;
    }

    Ok(())
}

fn set_user_version(conn: &Connection, version: i32) -> AppResult<()> {
    conn.execute_batch(&format!("PRAGMA user_version = {version};"))?;
    Ok(())
}

fn record_migration(
    conn: &Connection,
    version: i32,
    description: &str,
    rollback_sql: Option<&str>,
) -> AppResult<()> {
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT OR REPLACE INTO migration_history (version, description, applied_at, rollback_sql) VALUES (?1, ?2, ?3, ?4)",
        (version, description, now, rollback_sql),
    )?;
    Ok(())
}

/// Runs recorded rollback scripts newest-first down to `target_version`.
pub fn rollback_to_version(conn: &Connection, target_version: i32) -> AppResult<()> {
    let current_version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    if target_version >= current_version {
        warn!(
            target: "app::db",
            target_version,
            current_version,
            "rollback target is not below current version"
        );
        return Ok(());
    }

    let mut stmt = conn.prepare(
        "SELECT version, rollback_sql FROM migration_history WHERE version > ?1 ORDER BY version DESC",
    )?;
    let scripts = stmt
        .query_map([target_version], |row| {
            Ok((row.get::<_, i32>(0)?, row.get::<_, Option<String>>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    for (version, rollback_sql) in scripts {
        match rollback_sql {
            Some(sql) => {
                info!(target: "app::db", version, "rolling back migration");
                conn.execute_batch(&sql)?;
            }
            None => warn!(target: "app::db", version, "no rollback script for migration"),
        }
    }

    set_user_version(conn, target_version)?;
    conn.execute("DELETE FROM migration_history WHERE version > ?1", [target_version])?;

    Ok(())
}

pub fn get_migration_history(conn: &Connection) -> AppResult<Vec<MigrationInfo>> {
    let mut stmt = conn
        .prepare("SELECT version, description, applied_at FROM migration_history ORDER BY version")?;

    let rows = stmt.query_map([], |row| {
        let applied_at_str: String = row.get(2)?;
        let applied_at = DateTime::parse_from_rfc3339(&applied_at_str)
            .map_err(|err| {
                rusqlite::Error::FromSqlConversionFailure(
                    2,
                    rusqlite::types::Type::Text,
                    Box::new(err),
                )
            })?
            .with_timezone(&Utc);

        Ok(MigrationInfo {
            version: row.get(0)?,
            description: row.get(1)?,
            applied_at,
        })
    })?;

    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

fn migrate_to_v1(conn: &Connection) -> AppResult<()> {
    // One active plan per user; the full plan is stored as a JSON document.
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS study_plans (
            user_id TEXT PRIMARY KEY,
            plan_id TEXT NOT NULL,
            payload TEXT NOT NULL,
            version INTEGER NOT NULL DEFAULT 1,
            updated_at TEXT NOT NULL
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_study_plans_plan_id
            ON study_plans(plan_id);
        "#,
    )?;
    Ok(())
}

fn migrate_to_v2(conn: &Connection) -> AppResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS plan_changes (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            plan_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            session_ids TEXT NOT NULL DEFAULT '[]',
            reason TEXT,
            recorded_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_plan_changes_user_recorded
            ON plan_changes(user_id, recorded_at DESC);
        "#,
    )?;
    Ok(())
}

fn migrate_to_v3(conn: &Connection) -> AppResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS buddy_configs (
            user_id TEXT PRIMARY KEY,
            buddy_name TEXT NOT NULL,
            buddy_contact TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            alert_frequency TEXT NOT NULL,
            last_notification_sent TEXT,
            notifications_sent INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS planner_badges (
            user_id TEXT NOT NULL,
            badge_id TEXT NOT NULL,
            payload TEXT NOT NULL,
            is_earned INTEGER NOT NULL DEFAULT 0,
            earned_at TEXT,
            PRIMARY KEY (user_id, badge_id)
        );
        "#,
    )?;
    Ok(())
}

fn migrate_to_v4(conn: &Connection) -> AppResult<()> {
    ensure_column(conn, "study_plans", "progress_percentage", "REAL NOT NULL DEFAULT 0")?;
    ensure_column(conn, "study_plans", "session_count", "INTEGER NOT NULL DEFAULT 0")?;
    Ok(())
}

fn ensure_column(conn: &Connection, table: &str, column: &str, definition: &str) -> AppResult<()> {
    if !column_exists(conn, table, column)? {
        let sql = format!("ALTER TABLE {table} ADD COLUMN {column} {definition};");
        conn.execute(&sql, [])?;
    }
    Ok(())
}

pub(crate) fn column_exists(conn: &Connection, table: &str, column: &str) -> AppResult<bool> {
    let pragma = format!("PRAGMA table_info({table})");
    let mut stmt = conn.prepare(&pragma)?;
    let mut rows = stmt.query([])?;

    while let Some(row) = rows.next()? {
        if equals_name(row, column)? {
            return Ok(true);
        }
    }

    Ok(false)
}

fn equals_name(row: &Row<'_>, column: &str) -> Result<bool, rusqlite::Error> {
    let name: String = row.get(1)?;
    Ok(name.eq_ignore_ascii_case(column))
}
