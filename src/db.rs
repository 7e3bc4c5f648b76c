//! Database module for tempo-server
//!
//! Instants are stored as RFC3339 UTC TEXT in one canonical format
//! (second precision, `Z` suffix) so range queries compare correctly.

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, Row, params};
use std::path::Path;
use std::sync::Mutex;

use crate::models::{
    Category, CategoryAverage, DailyAnalytics, Event, EventSource, FocusRatio, Reminder, Task,
    Theme, User, UserPreferences, WeeklyAnalytics,
};

/// Canonical storage format for instants.
pub fn fmt_ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn get_ts(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
        })
}

fn get_opt_ts(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(idx)? {
        None => Ok(None),
        Some(s) => DateTime::parse_from_rfc3339(&s)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    idx,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            }),
    }
}

const TASK_COLS: &str = "id, user_id, title, category_id, category_name, date, start_at, end_at, \
     duration_min, done, notes, is_event, is_reminder, carryover, created_at, updated_at";

const EVENT_COLS: &str =
    "id, user_id, title, location, start_at, end_at, all_day, notes, source, ics_uid, \
     created_at, updated_at";

const CATEGORY_COLS: &str =
    "id, user_id, name, color, is_system, position, created_at, updated_at";

const REMINDER_COLS: &str = "id, user_id, title, description, due_at, created_at, updated_at";

const USER_COLS: &str = "id, username, email, password_hash, name, profile_picture, timezone, \
     daily_budget_min, theme, created_at, updated_at";

/// Thread-safe database wrapper
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create the database
    pub fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).context("Failed to create database directory")?;
        }

        let conn = Connection::open(path).context("Failed to open database")?;

        let db = Self {
            conn: Mutex::new(conn),
        };
        db.init()?;

        Ok(db)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let db = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        db.init()?;
        Ok(db)
    }

    /// Initialize the database schema
    fn init(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            -- Accounts
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                username TEXT NOT NULL UNIQUE,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                name TEXT NOT NULL,
                profile_picture TEXT,
                timezone TEXT NOT NULL DEFAULT 'Asia/Ho_Chi_Minh',
                daily_budget_min INTEGER NOT NULL DEFAULT 720,
                theme TEXT NOT NULL DEFAULT 'system',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            -- Task categories, unique per user by name
            CREATE TABLE IF NOT EXISTS categories (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                name TEXT NOT NULL,
                color TEXT,
                is_system INTEGER NOT NULL DEFAULT 0,
                position INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (user_id, name),
                FOREIGN KEY (user_id) REFERENCES users(id)
            );

            -- Tasks; date is the UTC instant of local midnight
            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                title TEXT NOT NULL,
                category_id TEXT,
                category_name TEXT,
                date TEXT NOT NULL,
                start_at TEXT,
                end_at TEXT,
                duration_min INTEGER,
                done INTEGER NOT NULL DEFAULT 0,
                notes TEXT,
                is_event INTEGER NOT NULL DEFAULT 0,
                is_reminder INTEGER NOT NULL DEFAULT 0,
                carryover INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id),
                FOREIGN KEY (category_id) REFERENCES categories(id)
            );

            -- Calendar events
            CREATE TABLE IF NOT EXISTS events (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                title TEXT NOT NULL,
                location TEXT,
                start_at TEXT NOT NULL,
                end_at TEXT NOT NULL,
                all_day INTEGER NOT NULL DEFAULT 0,
                notes TEXT,
                source TEXT NOT NULL DEFAULT 'manual',
                ics_uid TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id)
            );

            -- Reminders
            CREATE TABLE IF NOT EXISTS reminders (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT,
                due_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id)
            );

            -- Cached weekly aggregates; daily and by_category are JSON
            CREATE TABLE IF NOT EXISTS weekly_analytics (
                user_id TEXT NOT NULL,
                week_start TEXT NOT NULL,
                daily TEXT NOT NULL DEFAULT '[]',
                total_minutes INTEGER NOT NULL DEFAULT 0,
                by_category TEXT NOT NULL DEFAULT '[]',
                focus_active_min REAL NOT NULL DEFAULT 0,
                focus_rest_min REAL NOT NULL DEFAULT 0,
                streak INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (user_id, week_start),
                FOREIGN KEY (user_id) REFERENCES users(id)
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_tasks_user_date ON tasks(user_id, date);
            CREATE INDEX IF NOT EXISTS idx_events_user_start ON events(user_id, start_at);
            CREATE INDEX IF NOT EXISTS idx_categories_user ON categories(user_id, position);
            CREATE INDEX IF NOT EXISTS idx_reminders_user ON reminders(user_id);
            "#,
        )?;

        Ok(())
    }

    // ── Users ────────────────────────────────────────────────────────

    pub fn create_user(&self, user: &User) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            &format!("INSERT INTO users ({USER_COLS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"),
            params![
                &user.id,
                &user.username,
                &user.email,
                &user.password_hash,
                &user.name,
                &user.profile_picture,
                &user.preferences.timezone,
                user.preferences.daily_budget_min,
                theme_str(user.preferences.theme),
                fmt_ts(&user.created_at),
                fmt_ts(&user.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn username_exists(&self, username: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM users WHERE username = ?1",
            params![username],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare(&format!("SELECT {USER_COLS} FROM users WHERE username = ?1"))?;
        let mut rows = stmt.query_map(params![username], map_user)?;
        rows.next().transpose().map_err(Into::into)
    }

    /// Configured daily budget for a user, with the stock 720-minute
    /// fallback when the account is missing.
    pub fn daily_budget_min(&self, user_id: &str) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let budget: Option<i64> = conn
            .query_row(
                "SELECT daily_budget_min FROM users WHERE id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .ok();
        Ok(budget.unwrap_or(crate::models::DEFAULT_DAILY_BUDGET_MIN))
    }

    // ── Tasks ────────────────────────────────────────────────────────

    pub fn insert_task(&self, task: &Task) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        insert_task_inner(&conn, task)
    }

    pub fn get_task(&self, user_id: &str, id: &str) -> Result<Option<Task>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {TASK_COLS} FROM tasks WHERE id = ?1 AND user_id = ?2"
        ))?;
        let mut rows = stmt.query_map(params![id, user_id], map_task)?;
        rows.next().transpose().map_err(Into::into)
    }

    pub fn update_task(&self, task: &Task) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"UPDATE tasks SET title = ?3, category_id = ?4, category_name = ?5, date = ?6,
               start_at = ?7, end_at = ?8, duration_min = ?9, done = ?10, notes = ?11,
               is_event = ?12, is_reminder = ?13, carryover = ?14, updated_at = ?15
               WHERE id = ?1 AND user_id = ?2"#,
            params![
                &task.id,
                &task.user_id,
                &task.title,
                &task.category_id,
                &task.category_name,
                fmt_ts(&task.date),
                task.start.as_ref().map(fmt_ts),
                task.end.as_ref().map(fmt_ts),
                task.duration_min,
                task.done as i64,
                &task.notes,
                task.is_event as i64,
                task.is_reminder as i64,
                task.carryover as i64,
                fmt_ts(&task.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn delete_task(&self, user_id: &str, id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute(
            "DELETE FROM tasks WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;
        Ok(n > 0)
    }

    /// Tasks whose `date` falls in `[start, end)`. The day-summary and
    /// trends calculators read through this.
    pub fn tasks_dated_in(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Task>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {TASK_COLS} FROM tasks WHERE user_id = ?1 AND date >= ?2 AND date < ?3"
        ))?;
        self.collect_tasks(&mut stmt, params![user_id, fmt_ts(&start), fmt_ts(&end)])
    }

    /// Day view: tasks dated in the window or whose own span overlaps it,
    /// sorted by start.
    pub fn day_tasks(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        done: Option<bool>,
    ) -> Result<Vec<Task>> {
        let conn = self.conn.lock().unwrap();
        let base = format!(
            "SELECT {TASK_COLS} FROM tasks WHERE user_id = ?1 \
             AND ((date >= ?2 AND date < ?3) OR (start_at < ?3 AND end_at > ?2))"
        );
        let (s, e) = (fmt_ts(&start), fmt_ts(&end));

        if let Some(done) = done {
            let mut stmt = conn.prepare(&format!("{base} AND done = ?4 ORDER BY start_at"))?;
            self.collect_tasks(&mut stmt, params![user_id, s, e, done as i64])
        } else {
            let mut stmt = conn.prepare(&format!("{base} ORDER BY start_at"))?;
            self.collect_tasks(&mut stmt, params![user_id, s, e])
        }
    }

    fn collect_tasks<P: rusqlite::Params>(
        &self,
        stmt: &mut rusqlite::Statement,
        params: P,
    ) -> Result<Vec<Task>> {
        let rows = stmt.query_map(params, map_task)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ── Events ───────────────────────────────────────────────────────

    pub fn insert_event(&self, event: &Event) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            &format!(
                "INSERT INTO events ({EVENT_COLS}) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
            ),
            params![
                &event.id,
                &event.user_id,
                &event.title,
                &event.location,
                fmt_ts(&event.start),
                fmt_ts(&event.end),
                event.all_day as i64,
                &event.notes,
                source_str(event.source),
                &event.ics_uid,
                fmt_ts(&event.created_at),
                fmt_ts(&event.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_event(&self, user_id: &str, id: &str) -> Result<Option<Event>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {EVENT_COLS} FROM events WHERE id = ?1 AND user_id = ?2"
        ))?;
        let mut rows = stmt.query_map(params![id, user_id], map_event)?;
        rows.next().transpose().map_err(Into::into)
    }

    pub fn update_event(&self, event: &Event) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"UPDATE events SET title = ?3, location = ?4, start_at = ?5, end_at = ?6,
               all_day = ?7, notes = ?8, source = ?9, ics_uid = ?10, updated_at = ?11
               WHERE id = ?1 AND user_id = ?2"#,
            params![
                &event.id,
                &event.user_id,
                &event.title,
                &event.location,
                fmt_ts(&event.start),
                fmt_ts(&event.end),
                event.all_day as i64,
                &event.notes,
                source_str(event.source),
                &event.ics_uid,
                fmt_ts(&event.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn delete_event(&self, user_id: &str, id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute(
            "DELETE FROM events WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;
        Ok(n > 0)
    }

    /// Events overlapping `[from, to)`: `start < to AND end > from`.
    pub fn events_overlapping(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Event>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {EVENT_COLS} FROM events \
             WHERE user_id = ?1 AND start_at < ?3 AND end_at > ?2"
        ))?;
        let rows = stmt.query_map(params![user_id, fmt_ts(&from), fmt_ts(&to)], map_event)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Events whose start lies inside `[from, to)`.
    pub fn events_starting_in(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Event>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {EVENT_COLS} FROM events \
             WHERE user_id = ?1 AND start_at >= ?2 AND start_at < ?3"
        ))?;
        let rows = stmt.query_map(params![user_id, fmt_ts(&from), fmt_ts(&to)], map_event)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    // ── Categories ───────────────────────────────────────────────────

    pub fn categories(&self, user_id: &str) -> Result<Vec<Category>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {CATEGORY_COLS} FROM categories WHERE user_id = ?1 ORDER BY position, name"
        ))?;
        let rows = stmt.query_map(params![user_id], map_category)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn get_category(&self, user_id: &str, id: &str) -> Result<Option<Category>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {CATEGORY_COLS} FROM categories WHERE id = ?1 AND user_id = ?2"
        ))?;
        let mut rows = stmt.query_map(params![id, user_id], map_category)?;
        rows.next().transpose().map_err(Into::into)
    }

    pub fn find_category_by_name(&self, user_id: &str, name: &str) -> Result<Option<Category>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {CATEGORY_COLS} FROM categories WHERE user_id = ?1 AND name = ?2"
        ))?;
        let mut rows = stmt.query_map(params![user_id, name], map_category)?;
        rows.next().transpose().map_err(Into::into)
    }

    /// Next insertion-ordered position: `max(position) + 1`, 0 for the first.
    pub fn next_category_position(&self, user_id: &str) -> Result<i64> {
        let conn = self.conn.lock().unwrap();
        let pos: Option<i64> = conn.query_row(
            "SELECT MAX(position) FROM categories WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(pos.map(|p| p + 1).unwrap_or(0))
    }

    pub fn insert_category(&self, category: &Category) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        insert_category_inner(&conn, category)
    }

    pub fn update_category(&self, category: &Category) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"UPDATE categories SET name = ?3, color = ?4, is_system = ?5, position = ?6,
               updated_at = ?7 WHERE id = ?1 AND user_id = ?2"#,
            params![
                &category.id,
                &category.user_id,
                &category.name,
                &category.color,
                category.is_system as i64,
                category.position,
                fmt_ts(&category.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn delete_category(&self, user_id: &str, id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute(
            "DELETE FROM categories WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;
        Ok(n > 0)
    }

    // ── Reminders ────────────────────────────────────────────────────

    pub fn reminders(&self, user_id: &str) -> Result<Vec<Reminder>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {REMINDER_COLS} FROM reminders WHERE user_id = ?1 ORDER BY created_at"
        ))?;
        let rows = stmt.query_map(params![user_id], map_reminder)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn get_reminder(&self, user_id: &str, id: &str) -> Result<Option<Reminder>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {REMINDER_COLS} FROM reminders WHERE id = ?1 AND user_id = ?2"
        ))?;
        let mut rows = stmt.query_map(params![id, user_id], map_reminder)?;
        rows.next().transpose().map_err(Into::into)
    }

    pub fn insert_reminder(&self, reminder: &Reminder) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            &format!("INSERT INTO reminders ({REMINDER_COLS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
            params![
                &reminder.id,
                &reminder.user_id,
                &reminder.title,
                &reminder.description,
                reminder.due_at.as_ref().map(fmt_ts),
                fmt_ts(&reminder.created_at),
                fmt_ts(&reminder.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn update_reminder(&self, reminder: &Reminder) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"UPDATE reminders SET title = ?3, description = ?4, due_at = ?5, updated_at = ?6
               WHERE id = ?1 AND user_id = ?2"#,
            params![
                &reminder.id,
                &reminder.user_id,
                &reminder.title,
                &reminder.description,
                reminder.due_at.as_ref().map(fmt_ts),
                fmt_ts(&reminder.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn delete_reminder(&self, user_id: &str, id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute(
            "DELETE FROM reminders WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;
        Ok(n > 0)
    }

    /// Reminder conversion: create the task and drop the reminder in one
    /// transaction so clients never observe both or neither.
    pub fn convert_reminder_to_task(
        &self,
        user_id: &str,
        reminder_id: &str,
        task: &Task,
        new_category: Option<&Category>,
    ) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        if let Some(category) = new_category {
            insert_category_inner(&tx, category)?;
        }
        insert_task_inner(&tx, task)?;
        tx.execute(
            "DELETE FROM reminders WHERE id = ?1 AND user_id = ?2",
            params![reminder_id, user_id],
        )?;
        tx.commit().context("Failed to commit reminder conversion")?;
        Ok(())
    }

    // ── Weekly analytics ─────────────────────────────────────────────

    pub fn weekly_analytics(
        &self,
        user_id: &str,
        week_start: &str,
    ) -> Result<Option<WeeklyAnalytics>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT user_id, week_start, daily, total_minutes, by_category, \
             focus_active_min, focus_rest_min, streak \
             FROM weekly_analytics WHERE user_id = ?1 AND week_start = ?2",
        )?;
        let mut rows = stmt.query_map(params![user_id, week_start], |row| {
            let daily_json: String = row.get(2)?;
            let by_category_json: String = row.get(4)?;
            Ok((
                WeeklyAnalytics {
                    user_id: row.get(0)?,
                    week_start: row.get(1)?,
                    daily: Vec::new(),
                    total_minutes: row.get(3)?,
                    by_category: Vec::new(),
                    focus_ratio: FocusRatio {
                        active_min: row.get(5)?,
                        rest_min: row.get(6)?,
                    },
                    streak: row.get(7)?,
                },
                daily_json,
                by_category_json,
            ))
        })?;

        match rows.next().transpose()? {
            None => Ok(None),
            Some((mut analytics, daily_json, by_category_json)) => {
                analytics.daily = serde_json::from_str::<Vec<DailyAnalytics>>(&daily_json)
                    .context("Corrupt daily analytics JSON")?;
                analytics.by_category =
                    serde_json::from_str::<Vec<CategoryAverage>>(&by_category_json)
                        .context("Corrupt category analytics JSON")?;
                Ok(Some(analytics))
            }
        }
    }

    pub fn upsert_weekly_analytics(&self, analytics: &WeeklyAnalytics) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"INSERT OR REPLACE INTO weekly_analytics
               (user_id, week_start, daily, total_minutes, by_category,
                focus_active_min, focus_rest_min, streak)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"#,
            params![
                &analytics.user_id,
                &analytics.week_start,
                serde_json::to_string(&analytics.daily)?,
                analytics.total_minutes,
                serde_json::to_string(&analytics.by_category)?,
                analytics.focus_ratio.active_min,
                analytics.focus_ratio.rest_min,
                analytics.streak,
            ],
        )?;
        Ok(())
    }
}

fn insert_task_inner(conn: &Connection, task: &Task) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO tasks ({TASK_COLS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"
        ),
        params![
            &task.id,
            &task.user_id,
            &task.title,
            &task.category_id,
            &task.category_name,
            fmt_ts(&task.date),
            task.start.as_ref().map(fmt_ts),
            task.end.as_ref().map(fmt_ts),
            task.duration_min,
            task.done as i64,
            &task.notes,
            task.is_event as i64,
            task.is_reminder as i64,
            task.carryover as i64,
            fmt_ts(&task.created_at),
            fmt_ts(&task.updated_at),
        ],
    )?;
    Ok(())
}

fn insert_category_inner(conn: &Connection, category: &Category) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO categories ({CATEGORY_COLS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
        ),
        params![
            &category.id,
            &category.user_id,
            &category.name,
            &category.color,
            category.is_system as i64,
            category.position,
            fmt_ts(&category.created_at),
            fmt_ts(&category.updated_at),
        ],
    )?;
    Ok(())
}

fn theme_str(theme: Theme) -> &'static str {
    match theme {
        Theme::Light => "light",
        Theme::Dark => "dark",
        Theme::System => "system",
    }
}

fn source_str(source: EventSource) -> &'static str {
    match source {
        EventSource::Manual => "manual",
        EventSource::Ics => "ics",
    }
}

fn map_user(row: &Row) -> rusqlite::Result<User> {
    let theme_raw: String = row.get(8)?;
    let theme = match theme_raw.as_str() {
        "light" => Theme::Light,
        "dark" => Theme::Dark,
        _ => Theme::System,
    };

    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        name: row.get(4)?,
        profile_picture: row.get(5)?,
        preferences: UserPreferences {
            timezone: row.get(6)?,
            daily_budget_min: row.get(7)?,
            theme,
        },
        created_at: get_ts(row, 9)?,
        updated_at: get_ts(row, 10)?,
    })
}

fn map_task(row: &Row) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        category_id: row.get(3)?,
        category_name: row.get(4)?,
        date: get_ts(row, 5)?,
        start: get_opt_ts(row, 6)?,
        end: get_opt_ts(row, 7)?,
        duration_min: row.get(8)?,
        done: row.get::<_, i64>(9)? != 0,
        notes: row.get(10)?,
        is_event: row.get::<_, i64>(11)? != 0,
        is_reminder: row.get::<_, i64>(12)? != 0,
        carryover: row.get::<_, i64>(13)? != 0,
        created_at: get_ts(row, 14)?,
        updated_at: get_ts(row, 15)?,
    })
}

fn map_event(row: &Row) -> rusqlite::Result<Event> {
    let source_raw: String = row.get(8)?;
    let source = match source_raw.as_str() {
        "ics" => EventSource::Ics,
        _ => EventSource::Manual,
    };

    Ok(Event {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        location: row.get(3)?,
        start: get_ts(row, 4)?,
        end: get_ts(row, 5)?,
        all_day: row.get::<_, i64>(6)? != 0,
        notes: row.get(7)?,
        source,
        ics_uid: row.get(9)?,
        created_at: get_ts(row, 10)?,
        updated_at: get_ts(row, 11)?,
    })
}

fn map_category(row: &Row) -> rusqlite::Result<Category> {
    Ok(Category {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        color: row.get(3)?,
        is_system: row.get::<_, i64>(4)? != 0,
        position: row.get(5)?,
        created_at: get_ts(row, 6)?,
        updated_at: get_ts(row, 7)?,
    })
}

fn map_reminder(row: &Row) -> rusqlite::Result<Reminder> {
    Ok(Reminder {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        due_at: get_opt_ts(row, 4)?,
        created_at: get_ts(row, 5)?,
        updated_at: get_ts(row, 6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn test_user(db: &Database, username: &str) -> User {
        let now = Utc::now();
        let user = User {
            id: uuid::Uuid::new_v4().to_string(),
            username: username.to_string(),
            email: format!("{username}@example.com"),
            password_hash: "hash".to_string(),
            name: "Test Person".to_string(),
            profile_picture: None,
            preferences: UserPreferences::default(),
            created_at: now,
            updated_at: now,
        };
        db.create_user(&user).unwrap();
        user
    }

    fn test_category(db: &Database, user_id: &str, name: &str) -> Category {
        let now = Utc::now();
        let category = Category {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            name: name.to_string(),
            color: None,
            is_system: false,
            position: db.next_category_position(user_id).unwrap(),
            created_at: now,
            updated_at: now,
        };
        db.insert_category(&category).unwrap();
        category
    }

    #[test]
    fn open_creates_database_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("tempo.sqlite");
        let db = Database::open(&path).unwrap();
        assert!(path.exists());
        assert!(!db.username_exists("nobody-here").unwrap());
    }

    #[test]
    fn user_round_trip_keeps_preferences() {
        let db = Database::open_in_memory().unwrap();
        let user = test_user(&db, "alicesmith");

        let found = db.find_user_by_username("alicesmith").unwrap().unwrap();
        assert_eq!(found.id, user.id);
        assert_eq!(found.preferences.daily_budget_min, 720);
        assert_eq!(found.preferences.theme, Theme::System);

        assert_eq!(db.daily_budget_min(&user.id).unwrap(), 720);
        // missing users fall back to the stock budget
        assert_eq!(db.daily_budget_min("ghost").unwrap(), 720);
    }

    #[test]
    fn category_positions_are_insertion_ordered_per_user() {
        let db = Database::open_in_memory().unwrap();
        let a = test_user(&db, "firstuser");
        let b = test_user(&db, "seconduser");

        let c0 = test_category(&db, &a.id, "Work");
        let c1 = test_category(&db, &a.id, "Rest");
        let other = test_category(&db, &b.id, "Work");

        assert_eq!(c0.position, 0);
        assert_eq!(c1.position, 1);
        assert_eq!(other.position, 0);

        let listed = db.categories(&a.id).unwrap();
        assert_eq!(
            listed.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            vec!["Work", "Rest"]
        );
    }

    #[test]
    fn duplicate_category_name_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        let user = test_user(&db, "firstuser");
        test_category(&db, &user.id, "Work");

        let now = Utc::now();
        let dup = Category {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user.id.clone(),
            name: "Work".to_string(),
            color: None,
            is_system: false,
            position: 1,
            created_at: now,
            updated_at: now,
        };
        assert!(db.insert_category(&dup).is_err());
    }

    #[test]
    fn convert_reminder_is_atomic() {
        let db = Database::open_in_memory().unwrap();
        let user = test_user(&db, "firstuser");
        let category = test_category(&db, &user.id, "Work");

        let now = Utc::now();
        let reminder = Reminder {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user.id.clone(),
            title: "Call the bank".to_string(),
            description: None,
            due_at: Some(now),
            created_at: now,
            updated_at: now,
        };
        db.insert_reminder(&reminder).unwrap();

        let task = Task {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user.id.clone(),
            title: reminder.title.clone(),
            category_id: Some(category.id.clone()),
            category_name: Some(category.name.clone()),
            date: now,
            start: Some(now),
            end: Some(now + Duration::hours(1)),
            duration_min: Some(60),
            done: false,
            notes: None,
            is_event: false,
            is_reminder: true,
            carryover: false,
            created_at: now,
            updated_at: now,
        };

        db.convert_reminder_to_task(&user.id, &reminder.id, &task, None)
            .unwrap();

        assert!(db.get_reminder(&user.id, &reminder.id).unwrap().is_none());
        let stored = db.get_task(&user.id, &task.id).unwrap().unwrap();
        assert!(stored.is_reminder);
        assert_eq!(stored.duration_min, Some(60));
    }

    #[test]
    fn day_tasks_matches_date_or_span_overlap() {
        let db = Database::open_in_memory().unwrap();
        let user = test_user(&db, "firstuser");

        let day_start = DateTime::parse_from_rfc3339("2025-09-10T17:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let day_end = day_start + Duration::hours(24);
        let now = Utc::now();

        let base = Task {
            id: String::new(),
            user_id: user.id.clone(),
            title: String::new(),
            category_id: None,
            category_name: None,
            date: day_start,
            start: None,
            end: None,
            duration_min: None,
            done: false,
            notes: None,
            is_event: false,
            is_reminder: false,
            carryover: false,
            created_at: now,
            updated_at: now,
        };

        // dated inside the day, no span
        let dated = Task {
            id: "dated".to_string(),
            title: "dated".to_string(),
            ..base.clone()
        };
        // dated the previous day but spanning into this one
        let spanning = Task {
            id: "spanning".to_string(),
            title: "spanning".to_string(),
            date: day_start - Duration::hours(24),
            start: Some(day_start - Duration::hours(1)),
            end: Some(day_start + Duration::hours(1)),
            ..base.clone()
        };
        // unrelated day
        let outside = Task {
            id: "outside".to_string(),
            title: "outside".to_string(),
            date: day_end + Duration::hours(24),
            ..base.clone()
        };
        for t in [&dated, &spanning, &outside] {
            db.insert_task(t).unwrap();
        }

        let found = db.day_tasks(&user.id, day_start, day_end, None).unwrap();
        let mut ids: Vec<_> = found.iter().map(|t| t.id.as_str()).collect();
        ids.sort();
        assert_eq!(ids, vec!["dated", "spanning"]);
    }
}
