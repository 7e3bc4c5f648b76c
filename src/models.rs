//! Domain models (shared between the store, the aggregation core, and the API)
//!
//! Wire format is camelCase JSON to match the Tempo clients. Instants are
//! UTC `DateTime`s end to end; only the day-window helpers know about the
//! fixed local offset.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// UI theme preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    #[default]
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPreferences {
    pub timezone: String,
    pub daily_budget_min: i64,
    pub theme: Theme,
}

impl Default for UserPreferences {
    fn default() -> Self {
        Self {
            timezone: "Asia/Ho_Chi_Minh".to_string(),
            daily_budget_min: DEFAULT_DAILY_BUDGET_MIN,
            theme: Theme::System,
        }
    }
}

/// Daily time budget when the user never configured one, in minutes.
pub const DEFAULT_DAILY_BUDGET_MIN: i64 = 720;

/// A registered account. `password_hash` never leaves the server.
#[derive(Debug, Clone)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub profile_picture: Option<String>,
    pub preferences: UserPreferences,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A scheduled unit of work.
///
/// `date` is the UTC instant of local midnight for the task's calendar day;
/// it is re-derived whenever `start` changes. `duration_min` is derived from
/// `start`/`end` and never independently authoritative once both exist.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub category_id: Option<String>,
    pub category_name: Option<String>,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_min: Option<i64>,
    pub done: bool,
    #[serde(default)]
    pub notes: Option<String>,
    pub is_event: bool,
    pub is_reminder: bool,
    pub carryover: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Where an event came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSource {
    #[default]
    Manual,
    Ics,
}

/// A calendar event. Events carry no category and no stored duration;
/// their day contribution is computed by clipping to the day window.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub user_id: String,
    pub title: String,
    #[serde(default)]
    pub location: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub all_day: bool,
    #[serde(default)]
    pub notes: Option<String>,
    pub source: EventSource,
    #[serde(default)]
    pub ics_uid: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A per-user task category. `position` is insertion-ordered, assigned
/// `max(position) + 1` at creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub user_id: String,
    pub name: String,
    #[serde(default)]
    pub color: Option<String>,
    pub is_system: bool,
    pub position: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
    pub id: String,
    pub user_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub due_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Minutes attributed to one category (integer day-level sums).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryMinutes {
    pub category_id: String,
    pub name: String,
    pub minutes: i64,
}

/// Minutes attributed to one category at week level. Fractional: the write
/// path restores these from per-day averages (average × 7).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryAverage {
    pub category_id: String,
    pub name: String,
    pub minutes: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FocusRatio {
    pub active_min: f64,
    pub rest_min: f64,
}

/// One day's slice of the weekly aggregate.
///
/// `by_category` is written once when the entry is first created; later
/// refreshes overwrite only the minute fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyAnalytics {
    pub date: String,
    pub spent_min: i64,
    pub task_minutes: i64,
    pub event_minutes: i64,
    pub productive_minutes: i64,
    pub by_category: Vec<CategoryMinutes>,
}

/// Cached per-user-per-week projection over task/event records. Rebuildable
/// at any time; mutated only by the weekly analytics persister.
#[derive(Debug, Clone)]
pub struct WeeklyAnalytics {
    pub user_id: String,
    /// Monday of the week, `YYYY-MM-DD`
    pub week_start: String,
    pub daily: Vec<DailyAnalytics>,
    pub total_minutes: i64,
    pub by_category: Vec<CategoryAverage>,
    pub focus_ratio: FocusRatio,
    pub streak: i64,
}

impl WeeklyAnalytics {
    pub fn empty(user_id: &str, week_start: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            week_start: week_start.to_string(),
            daily: Vec::new(),
            total_minutes: 0,
            by_category: Vec::new(),
            focus_ratio: FocusRatio::default(),
            streak: 0,
        }
    }
}
