//! Day/week time-accounting engine
//!
//! Converts task and event records into budget consumption, category
//! breakdowns, streaks, and weekly trend summaries. These are plain
//! functions over the store returning data; the HTTP handlers and the
//! weekly analytics persister both call them directly.

use anyhow::Result;
use chrono::{Duration, NaiveDate};
use serde::Serialize;

use crate::db::Database;
use crate::models::{
    CategoryAverage, CategoryMinutes, DailyAnalytics, FocusRatio, Task, WeeklyAnalytics,
};
use crate::timewindow::{clamp_to_day, day_bounds_for, minutes_between, week_monday};

/// Minimum productive minutes for a day to extend the streak.
const STREAK_THRESHOLD_MIN: i64 = 60;

const WEEK_DAYS: i64 = 7;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskProgress {
    /// done / total task count, 0 when there are no tasks
    pub simple: f64,
    /// done minutes / total task minutes, 0 when there are no tasks or
    /// no task carries a duration
    pub time_weighted: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DaySummary {
    pub budget_min: i64,
    pub spent_min: i64,
    /// May be negative; over-budget is a reportable state, not an error.
    pub remaining_min: i64,
    pub task_minutes: i64,
    pub event_minutes: i64,
    pub task_progress: TaskProgress,
    pub breakdown_by_category: Vec<CategoryMinutes>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DayMinutes {
    pub date: String,
    pub minutes: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyTrends {
    /// Per-day averages: each category's week sum divided by 7.
    pub by_category: Vec<CategoryAverage>,
    pub daily: Vec<DayMinutes>,
    /// Average productive hours per day, counting only days with activity.
    pub focus_ratio: f64,
    /// Longest run of threshold-meeting days within the week.
    pub streak: i64,
}

/// Stored aggregate plus display-only fields derived on read.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyAnalyticsView {
    pub week_start: String,
    pub total_minutes: i64,
    pub daily: Vec<DailyAnalytics>,
    pub by_category: Vec<CategoryAverage>,
    pub focus_ratio: FocusRatio,
    pub streak: i64,
    pub average_productive_hours: f64,
    /// `7*24*60 - total_minutes`; negative when the week overflows.
    pub total_rest_minutes: i64,
}

struct DayLoad {
    tasks: Vec<Task>,
    task_minutes: i64,
    event_minutes: i64,
}

impl DayLoad {
    fn total_minutes(&self) -> i64 {
        self.task_minutes + self.event_minutes
    }
}

/// Fetch one local day's tasks and events and sum their minutes.
/// Task minutes come from stored durations; event minutes from clipping
/// each event to the day window.
fn load_day(db: &Database, user_id: &str, date: NaiveDate) -> Result<DayLoad> {
    let (day_start, day_end) = day_bounds_for(date);

    let tasks = db.tasks_dated_in(user_id, day_start, day_end)?;
    let events = db.events_overlapping(user_id, day_start, day_end)?;

    let task_minutes = tasks.iter().map(|t| t.duration_min.unwrap_or(0)).sum();
    let event_minutes = events
        .iter()
        .filter_map(|ev| clamp_to_day(ev.start, ev.end, day_start, day_end))
        .map(|(s, e)| minutes_between(s, e))
        .sum();

    Ok(DayLoad {
        tasks,
        task_minutes,
        event_minutes,
    })
}

fn accumulate_category(acc: &mut Vec<CategoryMinutes>, task: &Task) {
    let category_id = task.category_id.as_deref().unwrap_or("uncategorized");
    let name = task.category_name.as_deref().unwrap_or("Uncategorized");
    let minutes = task.duration_min.unwrap_or(0);

    match acc.iter_mut().find(|c| c.category_id == category_id) {
        Some(entry) => entry.minutes += minutes,
        None => acc.push(CategoryMinutes {
            category_id: category_id.to_string(),
            name: name.to_string(),
            minutes,
        }),
    }
}

/// Day Summary: minutes spent against the daily budget, completion
/// ratios, and the per-category breakdown (first-appearance order).
pub fn day_summary(db: &Database, user_id: &str, date: NaiveDate) -> Result<DaySummary> {
    let load = load_day(db, user_id, date)?;
    let budget_min = db.daily_budget_min(user_id)?;

    let spent_min = load.total_minutes();
    let remaining_min = budget_min - spent_min;

    let total_tasks = load.tasks.len() as i64;
    let done_count = load.tasks.iter().filter(|t| t.done).count() as i64;
    let done_minutes: i64 = load
        .tasks
        .iter()
        .filter(|t| t.done)
        .map(|t| t.duration_min.unwrap_or(0))
        .sum();

    let simple = if total_tasks > 0 {
        done_count as f64 / total_tasks as f64
    } else {
        0.0
    };
    // Guard the durationless-tasks case: total > 0 with zero summed minutes.
    let time_weighted = if total_tasks > 0 && load.task_minutes > 0 {
        done_minutes as f64 / load.task_minutes as f64
    } else {
        0.0
    };

    let mut breakdown_by_category = Vec::new();
    for task in &load.tasks {
        accumulate_category(&mut breakdown_by_category, task);
    }

    Ok(DaySummary {
        budget_min,
        spent_min,
        remaining_min,
        task_minutes: load.task_minutes,
        event_minutes: load.event_minutes,
        task_progress: TaskProgress {
            simple,
            time_weighted,
        },
        breakdown_by_category,
    })
}

/// Weekly Trends over the Monday-aligned week containing `date`.
///
/// Category totals count tasks only (events carry no category), but event
/// minutes still count toward the daily totals and the streak.
pub fn weekly_trends(db: &Database, user_id: &str, date: NaiveDate) -> Result<WeeklyTrends> {
    let monday = week_monday(date);

    let mut daily = Vec::with_capacity(WEEK_DAYS as usize);
    let mut by_category: Vec<CategoryMinutes> = Vec::new();
    let mut streak = 0i64;
    let mut current_streak = 0i64;
    let mut total_spent = 0i64;
    let mut days_with_data = 0i64;

    for i in 0..WEEK_DAYS {
        let day = monday + Duration::days(i);
        let load = load_day(db, user_id, day)?;
        let total = load.total_minutes();

        total_spent += total;
        daily.push(DayMinutes {
            date: day.format("%Y-%m-%d").to_string(),
            minutes: total,
        });

        if total > 0 {
            days_with_data += 1;
        }

        for task in &load.tasks {
            accumulate_category(&mut by_category, task);
        }

        if total >= STREAK_THRESHOLD_MIN {
            current_streak += 1;
        } else {
            streak = streak.max(current_streak);
            current_streak = 0;
        }
    }
    streak = streak.max(current_streak);

    let focus_ratio = if days_with_data > 0 {
        total_spent as f64 / days_with_data as f64 / 60.0
    } else {
        0.0
    };

    let by_category = by_category
        .into_iter()
        .map(|c| CategoryAverage {
            category_id: c.category_id,
            name: c.name,
            minutes: c.minutes as f64 / WEEK_DAYS as f64,
        })
        .collect();

    Ok(WeeklyTrends {
        by_category,
        daily,
        focus_ratio,
        streak,
    })
}

/// Weekly Analytics write path: recompute today's summary and the week's
/// trends, merge them into the stored aggregate, and persist.
///
/// Week-level fields are overwritten wholesale from a fresh 7-day scan on
/// every call; only the `daily` list is merged entry-by-entry, so repeat
/// calls for the same date are idempotent.
pub fn update_weekly_analytics(
    db: &Database,
    user_id: &str,
    today: NaiveDate,
) -> Result<WeeklyAnalytics> {
    let today_str = today.format("%Y-%m-%d").to_string();
    let monday_str = week_monday(today).format("%Y-%m-%d").to_string();

    let summary = day_summary(db, user_id, today)?;
    let trends = weekly_trends(db, user_id, today)?;

    let mut analytics = db
        .weekly_analytics(user_id, &monday_str)?
        .unwrap_or_else(|| WeeklyAnalytics::empty(user_id, &monday_str));

    match analytics.daily.iter_mut().find(|d| d.date == today_str) {
        Some(entry) => {
            entry.spent_min = summary.spent_min;
            entry.task_minutes = summary.task_minutes;
            entry.event_minutes = summary.event_minutes;
            entry.productive_minutes = summary.spent_min;
        }
        None => analytics.daily.push(DailyAnalytics {
            date: today_str,
            spent_min: summary.spent_min,
            task_minutes: summary.task_minutes,
            event_minutes: summary.event_minutes,
            productive_minutes: summary.spent_min,
            by_category: summary.breakdown_by_category.clone(),
        }),
    }

    analytics.total_minutes = trends.daily.iter().map(|d| d.minutes).sum();
    // Restore week totals from the per-day averages
    analytics.by_category = trends
        .by_category
        .iter()
        .map(|c| CategoryAverage {
            category_id: c.category_id.clone(),
            name: c.name.clone(),
            minutes: c.minutes * WEEK_DAYS as f64,
        })
        .collect();
    analytics.focus_ratio = FocusRatio {
        active_min: trends.focus_ratio * 60.0,
        rest_min: 0.0,
    };
    analytics.streak = trends.streak;

    db.upsert_weekly_analytics(&analytics)?;

    Ok(analytics)
}

/// Weekly Analytics read path: fetch the stored aggregate for the week
/// containing `date` and derive the display fields. Returns an all-zero
/// structure when nothing is stored; never writes.
pub fn weekly_analytics_view(
    db: &Database,
    user_id: &str,
    date: NaiveDate,
) -> Result<WeeklyAnalyticsView> {
    let week_start = week_monday(date).format("%Y-%m-%d").to_string();

    let analytics = db
        .weekly_analytics(user_id, &week_start)?
        .unwrap_or_else(|| WeeklyAnalytics::empty(user_id, &week_start));

    let average_productive_hours = analytics.total_minutes as f64 / 60.0 / WEEK_DAYS as f64;
    let total_rest_minutes = WEEK_DAYS * 24 * 60 - analytics.total_minutes;

    Ok(WeeklyAnalyticsView {
        week_start: analytics.week_start,
        total_minutes: analytics.total_minutes,
        daily: analytics.daily,
        by_category: analytics.by_category,
        focus_ratio: analytics.focus_ratio,
        streak: analytics.streak,
        average_productive_hours,
        total_rest_minutes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Category, Event, EventSource, User, UserPreferences};
    use chrono::{DateTime, Utc};
    use uuid::Uuid;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn db_with_user() -> (Database, String) {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4().to_string(),
            username: "trackeruser".to_string(),
            email: "tracker@example.com".to_string(),
            password_hash: "hash".to_string(),
            name: "Tracker Person".to_string(),
            profile_picture: None,
            preferences: UserPreferences::default(),
            created_at: now,
            updated_at: now,
        };
        db.create_user(&user).unwrap();
        let id = user.id.clone();
        (db, id)
    }

    fn put_task(
        db: &Database,
        user_id: &str,
        day: &str,
        duration_min: Option<i64>,
        done: bool,
        category: Option<(&str, &str)>,
    ) {
        let (day_start, _) = day_bounds_for(date(day));
        let now = Utc::now();
        if let Some((cat_id, cat_name)) = category {
            // Satisfy the tasks.category_id foreign key; ignore the error when
            // the same category is reused across put_task calls.
            let cat = Category {
                id: cat_id.to_string(),
                user_id: user_id.to_string(),
                name: cat_name.to_string(),
                color: None,
                is_system: false,
                position: 0,
                created_at: now,
                updated_at: now,
            };
            let _ = db.insert_category(&cat);
        }
        let task = Task {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            title: "work block".to_string(),
            category_id: category.map(|(id, _)| id.to_string()),
            category_name: category.map(|(_, name)| name.to_string()),
            date: day_start,
            start: None,
            end: None,
            duration_min,
            done,
            notes: None,
            is_event: false,
            is_reminder: false,
            carryover: false,
            created_at: now,
            updated_at: now,
        };
        db.insert_task(&task).unwrap();
    }

    fn put_event(db: &Database, user_id: &str, start: &str, end: &str) {
        let now = Utc::now();
        let event = Event {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            title: "meeting".to_string(),
            location: None,
            start: utc(start),
            end: utc(end),
            all_day: false,
            notes: None,
            source: EventSource::Manual,
            ics_uid: None,
            created_at: now,
            updated_at: now,
        };
        db.insert_event(&event).unwrap();
    }

    #[test]
    fn day_summary_sums_tasks_and_clipped_events() {
        let (db, user) = db_with_user();
        // 2025-09-11 local runs 2025-09-10T17:00Z .. 2025-09-11T17:00Z
        put_task(&db, &user, "2025-09-11", Some(90), false, None);
        // 30 minutes entirely inside the day
        put_event(&db, &user, "2025-09-11T02:00:00Z", "2025-09-11T02:30:00Z");

        let summary = day_summary(&db, &user, date("2025-09-11")).unwrap();
        assert_eq!(summary.spent_min, 120);
        assert_eq!(summary.task_minutes, 90);
        assert_eq!(summary.event_minutes, 30);
        assert_eq!(summary.budget_min, 720);
        assert_eq!(summary.remaining_min, 720 - 120);
    }

    #[test]
    fn day_summary_clips_events_at_the_day_boundary() {
        let (db, user) = db_with_user();
        // two hours, but only one falls inside the local day
        put_event(&db, &user, "2025-09-10T16:00:00Z", "2025-09-10T18:00:00Z");

        let summary = day_summary(&db, &user, date("2025-09-11")).unwrap();
        assert_eq!(summary.event_minutes, 60);
        // the leading hour belongs to the previous local day
        let previous = day_summary(&db, &user, date("2025-09-10")).unwrap();
        assert_eq!(previous.event_minutes, 60);
    }

    #[test]
    fn day_summary_progress_ratios() {
        let (db, user) = db_with_user();
        put_task(&db, &user, "2025-09-11", Some(60), true, None);
        put_task(&db, &user, "2025-09-11", Some(30), false, None);

        let progress = day_summary(&db, &user, date("2025-09-11"))
            .unwrap()
            .task_progress;
        assert!((progress.simple - 0.5).abs() < 1e-9);
        assert!((progress.time_weighted - 60.0 / 90.0).abs() < 1e-9);
    }

    #[test]
    fn day_summary_guards_durationless_done_tasks() {
        let (db, user) = db_with_user();
        // done but no recorded duration alongside another durationless task
        put_task(&db, &user, "2025-09-11", None, true, None);
        put_task(&db, &user, "2025-09-11", Some(0), false, None);

        let progress = day_summary(&db, &user, date("2025-09-11"))
            .unwrap()
            .task_progress;
        assert!((progress.simple - 0.5).abs() < 1e-9);
        assert_eq!(progress.time_weighted, 0.0);
    }

    #[test]
    fn day_summary_of_empty_day_is_all_zero_but_budgeted() {
        let (db, user) = db_with_user();
        let summary = day_summary(&db, &user, date("2025-09-11")).unwrap();
        assert_eq!(summary.spent_min, 0);
        assert_eq!(summary.remaining_min, 720);
        assert_eq!(summary.task_progress.simple, 0.0);
        assert_eq!(summary.task_progress.time_weighted, 0.0);
        assert!(summary.breakdown_by_category.is_empty());
    }

    #[test]
    fn breakdown_keeps_first_appearance_order_with_sentinel() {
        let (db, user) = db_with_user();
        put_task(&db, &user, "2025-09-11", Some(30), false, Some(("c2", "Deep Work")));
        put_task(&db, &user, "2025-09-11", Some(15), false, None);
        put_task(&db, &user, "2025-09-11", Some(45), false, Some(("c2", "Deep Work")));

        let breakdown = day_summary(&db, &user, date("2025-09-11"))
            .unwrap()
            .breakdown_by_category;
        assert_eq!(breakdown.len(), 2);
        assert_eq!(breakdown[0].category_id, "c2");
        assert_eq!(breakdown[0].minutes, 75);
        assert_eq!(breakdown[1].category_id, "uncategorized");
        assert_eq!(breakdown[1].name, "Uncategorized");
        assert_eq!(breakdown[1].minutes, 15);
    }

    // 2025-09-08 is a Monday.
    const WEEK: [&str; 7] = [
        "2025-09-08",
        "2025-09-09",
        "2025-09-10",
        "2025-09-11",
        "2025-09-12",
        "2025-09-13",
        "2025-09-14",
    ];

    #[test]
    fn streak_is_the_longest_run_not_the_total() {
        let (db, user) = db_with_user();
        let minutes = [70, 70, 70, 0, 70, 70, 70];
        for (day, min) in WEEK.iter().zip(minutes) {
            if min > 0 {
                put_task(&db, &user, day, Some(min), false, None);
            }
        }

        let trends = weekly_trends(&db, &user, date("2025-09-08")).unwrap();
        assert_eq!(trends.streak, 3);
        assert_eq!(trends.daily.len(), 7);
        assert_eq!(trends.daily[3].minutes, 0);
    }

    #[test]
    fn sub_threshold_days_break_the_streak() {
        let (db, user) = db_with_user();
        // 59 is under the 60-minute threshold even though it is activity
        let minutes = [70, 59, 70, 70, 0, 0, 0];
        for (day, min) in WEEK.iter().zip(minutes) {
            if min > 0 {
                put_task(&db, &user, day, Some(min), false, None);
            }
        }

        let trends = weekly_trends(&db, &user, date("2025-09-08")).unwrap();
        assert_eq!(trends.streak, 2);
    }

    #[test]
    fn weekly_trends_normalizes_to_monday() {
        let (db, user) = db_with_user();
        put_task(&db, &user, "2025-09-08", Some(90), false, None);

        // Thursday input resolves to the same week
        let trends = weekly_trends(&db, &user, date("2025-09-11")).unwrap();
        assert_eq!(trends.daily[0].date, "2025-09-08");
        assert_eq!(trends.daily[0].minutes, 90);
    }

    #[test]
    fn focus_ratio_counts_only_active_days() {
        let (db, user) = db_with_user();
        put_task(&db, &user, "2025-09-08", Some(120), false, None);
        put_task(&db, &user, "2025-09-09", Some(60), false, None);

        let trends = weekly_trends(&db, &user, date("2025-09-08")).unwrap();
        // 180 minutes over 2 active days = 1.5 hours/day
        assert!((trends.focus_ratio - 1.5).abs() < 1e-9);

        let (empty_db, other) = db_with_user();
        let empty = weekly_trends(&empty_db, &other, date("2025-09-08")).unwrap();
        assert_eq!(empty.focus_ratio, 0.0);
    }

    #[test]
    fn category_averages_divide_by_seven_regardless_of_coverage() {
        let (db, user) = db_with_user();
        // one category active on just two days
        put_task(&db, &user, "2025-09-08", Some(70), false, Some(("c1", "Study")));
        put_task(&db, &user, "2025-09-10", Some(70), false, Some(("c1", "Study")));

        let trends = weekly_trends(&db, &user, date("2025-09-08")).unwrap();
        assert_eq!(trends.by_category.len(), 1);
        assert!((trends.by_category[0].minutes - 140.0 / 7.0).abs() < 1e-9);
        // events never show up in the category breakdown
        put_event(&db, &user, "2025-09-08T02:00:00Z", "2025-09-08T03:00:00Z");
        let with_event = weekly_trends(&db, &user, date("2025-09-08")).unwrap();
        assert_eq!(with_event.by_category.len(), 1);
        assert_eq!(with_event.daily[0].minutes, 70 + 60);
    }

    #[test]
    fn update_weekly_analytics_is_idempotent() {
        let (db, user) = db_with_user();
        let today = date("2025-09-11");
        put_task(&db, &user, "2025-09-11", Some(90), true, Some(("c1", "Study")));
        put_event(&db, &user, "2025-09-11T02:00:00Z", "2025-09-11T02:30:00Z");

        let first = update_weekly_analytics(&db, &user, today).unwrap();
        let second = update_weekly_analytics(&db, &user, today).unwrap();

        assert_eq!(second.daily.len(), 1);
        assert_eq!(first.daily.len(), second.daily.len());
        assert_eq!(first.total_minutes, second.total_minutes);
        assert_eq!(first.streak, second.streak);
        assert_eq!(first.by_category, second.by_category);

        let stored = db.weekly_analytics(&user, "2025-09-08").unwrap().unwrap();
        assert_eq!(stored.daily.len(), 1);
        assert_eq!(stored.total_minutes, 120);
    }

    #[test]
    fn update_carries_the_true_task_event_split() {
        let (db, user) = db_with_user();
        let today = date("2025-09-11");
        put_task(&db, &user, "2025-09-11", Some(90), false, None);
        put_event(&db, &user, "2025-09-11T02:00:00Z", "2025-09-11T02:30:00Z");

        let analytics = update_weekly_analytics(&db, &user, today).unwrap();
        let entry = &analytics.daily[0];
        assert_eq!(entry.date, "2025-09-11");
        assert_eq!(entry.spent_min, 120);
        assert_eq!(entry.task_minutes, 90);
        assert_eq!(entry.event_minutes, 30);
        assert_eq!(entry.productive_minutes, 120);
    }

    #[test]
    fn stored_category_totals_round_trip_through_averages() {
        let (db, user) = db_with_user();
        let today = date("2025-09-11");
        put_task(&db, &user, "2025-09-11", Some(100), false, Some(("c1", "Study")));

        let trends = weekly_trends(&db, &user, today).unwrap();
        let analytics = update_weekly_analytics(&db, &user, today).unwrap();

        assert_eq!(analytics.by_category.len(), 1);
        assert_eq!(
            analytics.by_category[0].minutes,
            trends.by_category[0].minutes * 7.0
        );
        assert!((analytics.focus_ratio.active_min - trends.focus_ratio * 60.0).abs() < 1e-9);
        assert_eq!(analytics.focus_ratio.rest_min, 0.0);
    }

    #[test]
    fn read_path_returns_zero_defaults_without_writing() {
        let (db, user) = db_with_user();
        let view = weekly_analytics_view(&db, &user, date("2025-09-11")).unwrap();

        assert_eq!(view.week_start, "2025-09-08");
        assert_eq!(view.total_minutes, 0);
        assert!(view.daily.is_empty());
        assert_eq!(view.average_productive_hours, 0.0);
        assert_eq!(view.total_rest_minutes, 7 * 24 * 60);

        // reading must not create the aggregate
        assert!(db.weekly_analytics(&user, "2025-09-08").unwrap().is_none());
    }

    #[test]
    fn read_path_derives_display_fields_from_the_stored_week() {
        let (db, user) = db_with_user();
        put_task(&db, &user, "2025-09-11", Some(420), false, None);
        update_weekly_analytics(&db, &user, date("2025-09-11")).unwrap();

        let view = weekly_analytics_view(&db, &user, date("2025-09-13")).unwrap();
        assert_eq!(view.total_minutes, 420);
        assert!((view.average_productive_hours - 420.0 / 60.0 / 7.0).abs() < 1e-9);
        assert_eq!(view.total_rest_minutes, 7 * 24 * 60 - 420);
        assert_eq!(view.daily.len(), 1);
    }
}
