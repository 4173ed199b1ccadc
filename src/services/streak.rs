use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use sqlx::Row;

use crate::db::DatabaseProxy;
use crate::services::stats;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreakUpdate {
    pub current_streak: i32,
    pub max_streak: i32,
    pub was_incremented: bool,
}

/// Streak day for a qualifying day given yesterday's streak day: continue
/// the run or start over at 1. Never negative, never zero on an active day.
pub fn next_streak_day(yesterday_streak: Option<i32>) -> i32 {
    match yesterday_streak {
        Some(n) if n > 0 => n + 1,
        _ => 1,
    }
}

/// The streak a reader should see today. A run that missed a day is already
/// over even though the stored counter has not been reset yet.
pub fn effective_streak(current: i32, last_active: Option<NaiveDate>, today: NaiveDate) -> i32 {
    match last_active {
        Some(date) if date == today || date + Duration::days(1) == today => current,
        _ => 0,
    }
}

/// Advances the streak for a qualifying day. Only the first qualifying
/// event of the user-local day mutates anything; re-entrant calls on the
/// same day return the current values unchanged.
pub async fn update_streak(
    proxy: &DatabaseProxy,
    user_id: &str,
    date: NaiveDate,
    first_event_of_day: bool,
) -> Result<StreakUpdate, sqlx::Error> {
    if !first_event_of_day {
        let (current_streak, max_streak) = snapshot(proxy, user_id, date).await?;
        return Ok(StreakUpdate {
            current_streak,
            max_streak,
            was_incremented: false,
        });
    }

    let yesterday_streak = match date.pred_opt() {
        Some(yesterday) => stats::fetch_day(proxy, user_id, yesterday)
            .await?
            .map(|day| day.streak_day),
        None => None,
    };
    let today_streak = next_streak_day(yesterday_streak);

    sqlx::query(
        r#"
        UPDATE "daily_stats"
        SET "streakDay" = $3, "updatedAt" = NOW()
        WHERE "userId" = $1 AND "date" = $2
        "#,
    )
    .bind(user_id)
    .bind(date)
    .bind(today_streak)
    .execute(proxy.pool())
    .await?;

    let row = sqlx::query(
        r#"
        INSERT INTO "user_progress" ("userId", "currentStreak", "maxStreak", "lastActiveDate", "updatedAt")
        VALUES ($1, $2, $2, $3, NOW())
        ON CONFLICT ("userId") DO UPDATE SET
            "currentStreak" = $2,
            "maxStreak" = GREATEST("user_progress"."maxStreak", $2),
            "lastActiveDate" = $3,
            "updatedAt" = NOW()
        RETURNING "currentStreak", "maxStreak"
        "#,
    )
    .bind(user_id)
    .bind(today_streak)
    .bind(date)
    .fetch_one(proxy.pool())
    .await?;

    let update = StreakUpdate {
        current_streak: row.try_get("currentStreak")?,
        max_streak: row.try_get("maxStreak")?,
        was_incremented: true,
    };

    tracing::debug!(
        user_id,
        streak = update.current_streak,
        max = update.max_streak,
        "streak advanced"
    );

    Ok(update)
}

/// Current (effective) and max streak without mutating anything.
pub async fn snapshot(
    proxy: &DatabaseProxy,
    user_id: &str,
    today: NaiveDate,
) -> Result<(i32, i32), sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT "currentStreak", "maxStreak", "lastActiveDate"
        FROM "user_progress"
        WHERE "userId" = $1
        "#,
    )
    .bind(user_id)
    .fetch_optional(proxy.pool())
    .await?;

    let Some(row) = row else {
        return Ok((0, 0));
    };

    let current: i32 = row.try_get("currentStreak")?;
    let max: i32 = row.try_get("maxStreak")?;
    let last_active: Option<NaiveDate> = row.try_get("lastActiveDate")?;

    Ok((effective_streak(current, last_active, today), max))
}

/// Nightly sweep: zero the stored counter for every user whose last active
/// day is already more than one day behind. Redundant with the lazy reset
/// on the next qualifying event, so running it twice is harmless.
pub async fn sweep_expired(proxy: &DatabaseProxy, today: NaiveDate) -> Result<u64, sqlx::Error> {
    let cutoff = today - Duration::days(1);

    let result = sqlx::query(
        r#"
        UPDATE "user_progress"
        SET "currentStreak" = 0, "updatedAt" = NOW()
        WHERE "currentStreak" > 0
          AND ("lastActiveDate" IS NULL OR "lastActiveDate" < $1)
        "#,
    )
    .bind(cutoff)
    .execute(proxy.pool())
    .await?;

    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn test_next_streak_day_continues_run() {
        assert_eq!(next_streak_day(Some(6)), 7);
        assert_eq!(next_streak_day(Some(1)), 2);
    }

    #[test]
    fn test_next_streak_day_restarts_after_gap() {
        assert_eq!(next_streak_day(None), 1);
        assert_eq!(next_streak_day(Some(0)), 1);
    }

    #[test]
    fn test_consecutive_days_reach_n() {
        let mut streak = 0;
        for _ in 0..10 {
            streak = next_streak_day(Some(streak));
        }
        assert_eq!(streak, 10);
    }

    #[test]
    fn test_effective_streak_active_today_or_yesterday() {
        let today = date(2025, 1, 15);
        assert_eq!(effective_streak(5, Some(date(2025, 1, 15)), today), 5);
        assert_eq!(effective_streak(5, Some(date(2025, 1, 14)), today), 5);
    }

    #[test]
    fn test_effective_streak_zero_after_missed_day() {
        let today = date(2025, 1, 15);
        assert_eq!(effective_streak(5, Some(date(2025, 1, 13)), today), 0);
        assert_eq!(effective_streak(5, None, today), 0);
    }
}
