//! Streak transitions: completion, explicit miss and passive staleness.
//!
//! Every write is a versioned read-modify-write against the injected store. A lost race
//! is retried once against a fresh read; a second loss is reported to the caller.

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::db::{StoreError, StreakScope, StreakStore};
use crate::models::{StreakRecord, StreakUpdate};
use crate::services::calendar::Calendar;
use shared::Streak;

#[derive(Debug, Error)]
pub enum StreakError {
    #[error("Streak not found")]
    NotFound,
    #[error("Streak was modified concurrently")]
    ConcurrentModification,
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for StreakError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => StreakError::NotFound,
            StoreError::ConcurrentModification => StreakError::ConcurrentModification,
            other => StreakError::Store(other),
        }
    }
}

/// Counter values after completing `day` on top of `record`.
///
/// Exactly the next calendar day extends the streak; anything else (first completion,
/// a gap, the same day again, an earlier day) starts over at 1.
pub fn apply_completion(record: &StreakRecord, day: DateTime<Utc>, calendar: &Calendar) -> StreakUpdate {
    let current_streak = match record.last_task_date {
        Some(last) if calendar.is_next_calendar_day(last, day) => record.current_streak.saturating_add(1),
        _ => 1,
    };

    StreakUpdate {
        current_streak,
        best_streak: record.best_streak.max(current_streak),
        last_task_date: Some(day),
    }
}

/// Whether more than one full calendar day has passed since the streak was last extended
pub fn is_stale(record: &StreakRecord, calendar: &Calendar, now: DateTime<Utc>) -> bool {
    if record.current_streak == 0 {
        return false;
    }
    match record.last_task_date {
        Some(last) => calendar.days_between(last, now) > 1,
        None => true,
    }
}

enum Modified {
    Missing,
    Unchanged(StreakRecord),
    Updated(StreakRecord),
}

/// Read, compute and conditionally write one streak. `change` returning `None` skips the write.
async fn modify_streak<F>(
    store: &dyn StreakStore,
    user_id: Uuid,
    group_id: Uuid,
    create_missing: bool,
    now: DateTime<Utc>,
    change: F,
) -> Result<Modified, StreakError>
where
    F: Fn(&StreakRecord) -> Option<StreakUpdate>,
{
    let mut retried = false;
    loop {
        let record = match store.find_streak(user_id, group_id).await? {
            Some(record) => record,
            None if create_missing => store.create_streak(user_id, group_id, now).await?,
            None => return Ok(Modified::Missing),
        };

        let update = match change(&record) {
            Some(update) => update,
            None => return Ok(Modified::Unchanged(record)),
        };

        match store.update_streak(record.id, record.version, &update, now).await {
            Ok(updated) => return Ok(Modified::Updated(updated)),
            Err(StoreError::ConcurrentModification) if !retried => {
                log::warn!(
                    "Streak {} for user {} in group {} changed concurrently, retrying",
                    record.id,
                    user_id,
                    group_id
                );
                retried = true;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Extend or restart the streak for a completion on `day`.
///
/// `day` may be any instant of the completed calendar day; it is normalized to the start
/// of that day before it is compared or stored. The streak is created on first use.
pub async fn record_completion(
    store: &dyn StreakStore,
    user_id: Uuid,
    group_id: Uuid,
    day: DateTime<Utc>,
    calendar: &Calendar,
    now: DateTime<Utc>,
) -> Result<Streak, StreakError> {
    let day = calendar.start_of_day(day);
    let modified = modify_streak(store, user_id, group_id, true, now, |record| {
        Some(apply_completion(record, day, calendar))
    })
    .await?;

    match modified {
        Modified::Updated(record) | Modified::Unchanged(record) => {
            log::debug!(
                "Streak for user {} in group {} is now {} (best {})",
                user_id,
                group_id,
                record.current_streak,
                record.best_streak
            );
            Ok(record.to_shared())
        }
        Modified::Missing => Err(StreakError::NotFound),
    }
}

/// Reset the current streak after an explicit miss. Best streak and last completion date
/// are kept. Returns `None` when the user never had a streak in this group.
pub async fn break_streak(
    store: &dyn StreakStore,
    user_id: Uuid,
    group_id: Uuid,
    now: DateTime<Utc>,
) -> Result<Option<Streak>, StreakError> {
    let modified = modify_streak(store, user_id, group_id, false, now, |record| {
        Some(StreakUpdate {
            current_streak: 0,
            best_streak: record.best_streak,
            last_task_date: record.last_task_date,
        })
    })
    .await?;

    Ok(match modified {
        Modified::Updated(record) | Modified::Unchanged(record) => Some(record.to_shared()),
        Modified::Missing => None,
    })
}

/// Reset every streak in `scope` that has gone stale. Returns how many were reset.
///
/// Staleness is judged on the owner's calendar, whoever triggers the sweep. Streaks whose
/// owner has an unknown timezone are skipped.
pub async fn sweep_stale_streaks(
    store: &dyn StreakStore,
    scope: StreakScope,
    now: DateTime<Utc>,
) -> Result<usize, StreakError> {
    let mut reset = 0;

    for record in store.list_streaks(scope).await? {
        let calendar = match Calendar::new(&record.timezone) {
            Ok(calendar) => calendar,
            Err(e) => {
                log::warn!("Skipping streak {} in sweep: {}", record.id, e);
                continue;
            }
        };
        if !is_stale(&record, &calendar, now) {
            continue;
        }

        let modified = modify_streak(store, record.user_id, record.group_id, false, now, |current| {
            is_stale(current, &calendar, now).then(|| StreakUpdate {
                current_streak: 0,
                best_streak: current.best_streak,
                last_task_date: current.last_task_date,
            })
        })
        .await?;

        if let Modified::Updated(_) = modified {
            reset += 1;
        }
    }

    if reset > 0 {
        log::info!("Reset {} stale streak(s) in {:?}", reset, scope);
    }
    Ok(reset)
}

pub async fn get_streak(
    store: &dyn StreakStore,
    user_id: Uuid,
    group_id: Uuid,
) -> Result<Option<Streak>, StreakError> {
    Ok(store
        .find_streak(user_id, group_id)
        .await?
        .map(|record| record.to_shared()))
}

/// Streaks in `scope`, longest current streak first
pub async fn list_streaks(store: &dyn StreakStore, scope: StreakScope) -> Result<Vec<Streak>, StreakError> {
    Ok(store
        .list_streaks(scope)
        .await?
        .iter()
        .map(StreakRecord::to_shared)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory::MemoryStore;
    use chrono::{Duration, NaiveDate, TimeZone};

    fn new_york() -> Calendar {
        Calendar::new("America/New_York").unwrap()
    }

    fn local_day(calendar: &Calendar, y: i32, m: u32, d: u32) -> DateTime<Utc> {
        calendar.start_of_date(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    fn record(current: u32, best: u32, last: Option<DateTime<Utc>>) -> StreakRecord {
        StreakRecord {
            id: Uuid::new_v4(),
            group_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            current_streak: current,
            best_streak: best,
            last_task_date: last,
            version: 0,
            updated_at: Utc::now(),
            timezone: "UTC".to_string(),
        }
    }

    #[test]
    fn test_apply_completion_rules() {
        let cal = new_york();
        let d = local_day(&cal, 2024, 1, 10);

        let first = apply_completion(&record(0, 0, None), d, &cal);
        assert_eq!((first.current_streak, first.best_streak), (1, 1));
        assert_eq!(first.last_task_date, Some(d));

        let next = apply_completion(&record(4, 4, Some(d - Duration::days(1))), d, &cal);
        assert_eq!((next.current_streak, next.best_streak), (5, 5));

        let gap = apply_completion(&record(4, 6, Some(d - Duration::days(2))), d, &cal);
        assert_eq!((gap.current_streak, gap.best_streak), (1, 6));

        let same_day = apply_completion(&record(2, 2, Some(d)), d, &cal);
        assert_eq!(same_day.current_streak, 1);

        let earlier = apply_completion(&record(3, 3, Some(d + Duration::days(1))), d, &cal);
        assert_eq!((earlier.current_streak, earlier.best_streak), (1, 3));
    }

    #[tokio::test]
    async fn test_three_consecutive_days() {
        let store = MemoryStore::new();
        let cal = new_york();
        let (user_id, group_id) = (Uuid::new_v4(), Uuid::new_v4());

        let mut streak = None;
        for day in 1..=3 {
            let d = local_day(&cal, 2024, 3, day);
            streak = Some(record_completion(&store, user_id, group_id, d, &cal, d).await.unwrap());
        }
        let streak = streak.unwrap();
        assert_eq!(streak.current_streak, 3);
        assert_eq!(streak.best_streak, 3);
    }

    #[tokio::test]
    async fn test_gap_restarts_and_keeps_best() {
        let store = MemoryStore::new();
        let cal = new_york();
        let (user_id, group_id) = (Uuid::new_v4(), Uuid::new_v4());

        for day in [1, 2, 6] {
            let d = local_day(&cal, 2024, 1, day);
            record_completion(&store, user_id, group_id, d, &cal, d).await.unwrap();
        }
        let streak = get_streak(&store, user_id, group_id).await.unwrap().unwrap();
        assert_eq!(streak.current_streak, 1);
        assert_eq!(streak.best_streak, 2);
    }

    #[tokio::test]
    async fn test_completion_normalizes_day() {
        let store = MemoryStore::new();
        let cal = new_york();
        let (user_id, group_id) = (Uuid::new_v4(), Uuid::new_v4());

        // 2024-01-02 03:00 UTC is the evening of Jan 1 in New York
        let late_evening = Utc.with_ymd_and_hms(2024, 1, 2, 3, 0, 0).unwrap();
        let streak = record_completion(&store, user_id, group_id, late_evening, &cal, late_evening)
            .await
            .unwrap();
        assert_eq!(streak.last_task_date, Some(local_day(&cal, 2024, 1, 1)));
    }

    #[tokio::test]
    async fn test_consecutive_across_spring_forward() {
        let store = MemoryStore::new();
        let cal = new_york();
        let (user_id, group_id) = (Uuid::new_v4(), Uuid::new_v4());

        let march_10 = local_day(&cal, 2024, 3, 10);
        let march_11 = local_day(&cal, 2024, 3, 11);
        record_completion(&store, user_id, group_id, march_10, &cal, march_10).await.unwrap();
        let streak = record_completion(&store, user_id, group_id, march_11, &cal, march_11)
            .await
            .unwrap();
        assert_eq!(streak.current_streak, 2);
    }

    #[tokio::test]
    async fn test_break_streak_keeps_best_and_last_date() {
        let store = MemoryStore::new();
        let cal = new_york();
        let (user_id, group_id) = (Uuid::new_v4(), Uuid::new_v4());

        for day in 1..=4 {
            let d = local_day(&cal, 2024, 1, day);
            record_completion(&store, user_id, group_id, d, &cal, d).await.unwrap();
        }

        let broken = break_streak(&store, user_id, group_id, Utc::now()).await.unwrap().unwrap();
        assert_eq!(broken.current_streak, 0);
        assert_eq!(broken.best_streak, 4);
        assert_eq!(broken.last_task_date, Some(local_day(&cal, 2024, 1, 4)));
    }

    #[tokio::test]
    async fn test_break_streak_without_record() {
        let store = MemoryStore::new();
        let result = break_streak(&store, Uuid::new_v4(), Uuid::new_v4(), Utc::now()).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_sweep_resets_only_stale_streaks() {
        let store = MemoryStore::new();
        let cal = new_york();
        let group_id = Uuid::new_v4();
        let today = local_day(&cal, 2024, 2, 10) + Duration::hours(15);

        let mut stale = record(5, 7, Some(local_day(&cal, 2024, 2, 7)));
        stale.group_id = group_id;
        stale.timezone = "America/New_York".to_string();
        let mut fresh = record(2, 2, Some(local_day(&cal, 2024, 2, 9)));
        fresh.group_id = group_id;
        fresh.timezone = "America/New_York".to_string();
        let mut already_zero = record(0, 3, Some(local_day(&cal, 2024, 1, 1)));
        already_zero.group_id = group_id;
        store.insert_streak(stale.clone());
        store.insert_streak(fresh.clone());
        store.insert_streak(already_zero.clone());

        let reset = sweep_stale_streaks(&store, StreakScope::Group(group_id), today)
            .await
            .unwrap();
        assert_eq!(reset, 1);

        let swept = get_streak(&store, stale.user_id, group_id).await.unwrap().unwrap();
        assert_eq!(swept.current_streak, 0);
        assert_eq!(swept.best_streak, 7);

        let untouched = get_streak(&store, fresh.user_id, group_id).await.unwrap().unwrap();
        assert_eq!(untouched.current_streak, 2);
    }

    #[tokio::test]
    async fn test_sweep_is_scoped() {
        let store = MemoryStore::new();
        let now = Utc.with_ymd_and_hms(2024, 5, 20, 12, 0, 0).unwrap();
        let stale = record(3, 3, Some(now - Duration::days(5)));
        store.insert_streak(stale.clone());

        let other_user = StreakScope::User(Uuid::new_v4());
        assert_eq!(sweep_stale_streaks(&store, other_user, now).await.unwrap(), 0);
        assert_eq!(
            sweep_stale_streaks(&store, StreakScope::User(stale.user_id), now).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_sweep_uses_each_owners_calendar() {
        let store = MemoryStore::new();
        let honolulu = Calendar::new("Pacific/Honolulu").unwrap();
        let group_id = Uuid::new_v4();
        let (island_user, city_user) = (Uuid::new_v4(), Uuid::new_v4());
        store.set_timezone(island_user, "Pacific/Honolulu");
        store.set_timezone(city_user, "Asia/Kolkata");

        for day in 1..=3 {
            let d = local_day(&honolulu, 2024, 1, day);
            record_completion(&store, island_user, group_id, d, &honolulu, d).await.unwrap();
        }
        let kolkata = Calendar::new("Asia/Kolkata").unwrap();
        let jan_2 = local_day(&kolkata, 2024, 1, 2);
        record_completion(&store, city_user, group_id, jan_2, &kolkata, jan_2).await.unwrap();

        // Still Jan 4 in Honolulu but already Jan 5 in Kolkata
        let now = Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap();
        let reset = sweep_stale_streaks(&store, StreakScope::Group(group_id), now).await.unwrap();
        assert_eq!(reset, 1);

        let island = get_streak(&store, island_user, group_id).await.unwrap().unwrap();
        assert_eq!(island.current_streak, 3);
        let city = get_streak(&store, city_user, group_id).await.unwrap().unwrap();
        assert_eq!((city.current_streak, city.best_streak), (0, 1));

        let jan_4 = local_day(&honolulu, 2024, 1, 4);
        let extended = record_completion(&store, island_user, group_id, jan_4, &honolulu, now)
            .await
            .unwrap();
        assert_eq!((extended.current_streak, extended.best_streak), (4, 4));
    }

    #[tokio::test]
    async fn test_sweep_skips_unknown_owner_timezone() {
        let store = MemoryStore::new();
        let now = Utc.with_ymd_and_hms(2024, 5, 20, 12, 0, 0).unwrap();
        let mut lost = record(3, 3, Some(now - Duration::days(5)));
        lost.timezone = "Mars/Olympus_Mons".to_string();
        store.insert_streak(lost.clone());

        assert_eq!(sweep_stale_streaks(&store, StreakScope::User(lost.user_id), now).await.unwrap(), 0);
    }

    #[test]
    fn test_streak_without_date_is_stale() {
        let cal = Calendar::new("UTC").unwrap();
        assert!(is_stale(&record(2, 2, None), &cal, Utc::now()));
        assert!(!is_stale(&record(0, 2, None), &cal, Utc::now()));
    }

    #[tokio::test]
    async fn test_single_conflict_is_retried() {
        let store = MemoryStore::new();
        let cal = Calendar::new("UTC").unwrap();
        let (user_id, group_id) = (Uuid::new_v4(), Uuid::new_v4());
        let d = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        record_completion(&store, user_id, group_id, d, &cal, d).await.unwrap();

        store.inject_conflicts(1);
        let next = d + Duration::days(1);
        let streak = record_completion(&store, user_id, group_id, next, &cal, next).await.unwrap();
        assert_eq!(streak.current_streak, 2);
    }

    #[tokio::test]
    async fn test_second_conflict_is_surfaced() {
        let store = MemoryStore::new();
        let cal = Calendar::new("UTC").unwrap();
        let (user_id, group_id) = (Uuid::new_v4(), Uuid::new_v4());
        let d = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        record_completion(&store, user_id, group_id, d, &cal, d).await.unwrap();

        store.inject_conflicts(2);
        let result = break_streak(&store, user_id, group_id, d).await;
        assert!(matches!(result, Err(StreakError::ConcurrentModification)));
    }

    #[tokio::test]
    async fn test_new_york_end_to_end() {
        let store = MemoryStore::new();
        let cal = new_york();
        let (user_id, group_id) = (Uuid::new_v4(), Uuid::new_v4());

        for day in 1..=3 {
            let d = local_day(&cal, 2024, 1, day);
            // completed late in the local evening of the same day
            let now = d + Duration::hours(21);
            record_completion(&store, user_id, group_id, d, &cal, now).await.unwrap();
        }

        let streak = get_streak(&store, user_id, group_id).await.unwrap().unwrap();
        assert_eq!(streak.current_streak, 3);
        assert_eq!(streak.best_streak, 3);
        assert_eq!(
            streak.last_task_date,
            Some(Utc.with_ymd_and_hms(2024, 1, 3, 5, 0, 0).unwrap())
        );

        let missed_at = local_day(&cal, 2024, 1, 5) + Duration::hours(20);
        let broken = break_streak(&store, user_id, group_id, missed_at).await.unwrap().unwrap();
        assert_eq!(broken.current_streak, 0);
        assert_eq!(broken.best_streak, 3);

        let listed = list_streaks(&store, StreakScope::User(user_id)).await.unwrap();
        assert_eq!(listed, vec![broken]);
    }
}
