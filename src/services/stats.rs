use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use sqlx::Row;
use uuid::Uuid;

use crate::db::DatabaseProxy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    Message,
    WordSaved,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Message => "MESSAGE",
            Self::WordSaved => "WORD_SAVED",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "WORD_SAVED" => Self::WordSaved,
            _ => Self::Message,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyStatRecord {
    pub user_id: String,
    pub date: NaiveDate,
    pub messages_count: i32,
    pub words_said: i32,
    pub high_accuracy_count: i32,
    pub correct_percent: f64,
    pub streak_day: i32,
}

/// Resolves an IANA timezone name. Anything unparseable falls back to UTC;
/// the caller never fails on a bad timezone.
pub fn resolve_timezone(timezone: &str) -> Tz {
    timezone.parse::<Tz>().unwrap_or_else(|_| {
        tracing::debug!(timezone, "unparseable timezone, falling back to UTC");
        Tz::UTC
    })
}

/// The user-local calendar day an instant belongs to.
pub fn local_date(at: DateTime<Utc>, timezone: &str) -> NaiveDate {
    at.with_timezone(&resolve_timezone(timezone)).date_naive()
}

/// Folds one processed message into the per-day record. The increment is a
/// single upsert so same-day races never lose an event, and the returned
/// `messages_count == 1` identifies the first qualifying event of the day.
pub async fn apply_message(
    proxy: &DatabaseProxy,
    user_id: &str,
    at: DateTime<Utc>,
    date: NaiveDate,
    score: i32,
    topic: Option<&str>,
    high_score_threshold: i32,
) -> Result<DailyStatRecord, sqlx::Error> {
    let score = score.clamp(0, 100);
    let high = if score >= high_score_threshold { 1 } else { 0 };

    insert_event(proxy, user_id, EventType::Message, Some(score), topic, at, date).await?;

    let row = sqlx::query(
        r#"
        INSERT INTO "daily_stats"
            ("id", "userId", "date", "messagesCount", "wordsSaid", "highAccuracyCount", "correctPercent", "streakDay", "updatedAt")
        VALUES ($1, $2, $3, 1, 0, $4, $5, 0, NOW())
        ON CONFLICT ("userId", "date") DO UPDATE SET
            "messagesCount" = "daily_stats"."messagesCount" + 1,
            "highAccuracyCount" = "daily_stats"."highAccuracyCount" + $4,
            "correctPercent" =
                ("daily_stats"."correctPercent" * "daily_stats"."messagesCount" + $5)
                    / ("daily_stats"."messagesCount" + 1),
            "updatedAt" = NOW()
        RETURNING "messagesCount", "wordsSaid", "highAccuracyCount", "correctPercent", "streakDay"
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(date)
    .bind(high)
    .bind(score as f64)
    .fetch_one(proxy.pool())
    .await?;

    parse_stat_row(user_id, date, &row)
}

/// Folds one saved word into the per-day record. Does not qualify a day for
/// streak purposes.
pub async fn apply_saved_word(
    proxy: &DatabaseProxy,
    user_id: &str,
    at: DateTime<Utc>,
    date: NaiveDate,
) -> Result<DailyStatRecord, sqlx::Error> {
    insert_event(proxy, user_id, EventType::WordSaved, None, None, at, date).await?;

    let row = sqlx::query(
        r#"
        INSERT INTO "daily_stats"
            ("id", "userId", "date", "messagesCount", "wordsSaid", "updatedAt")
        VALUES ($1, $2, $3, 0, 1, NOW())
        ON CONFLICT ("userId", "date") DO UPDATE SET
            "wordsSaid" = "daily_stats"."wordsSaid" + 1,
            "updatedAt" = NOW()
        RETURNING "messagesCount", "wordsSaid", "highAccuracyCount", "correctPercent", "streakDay"
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(date)
    .fetch_one(proxy.pool())
    .await?;

    parse_stat_row(user_id, date, &row)
}

pub async fn fetch_day(
    proxy: &DatabaseProxy,
    user_id: &str,
    date: NaiveDate,
) -> Result<Option<DailyStatRecord>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT "messagesCount", "wordsSaid", "highAccuracyCount", "correctPercent", "streakDay"
        FROM "daily_stats"
        WHERE "userId" = $1 AND "date" = $2
        "#,
    )
    .bind(user_id)
    .bind(date)
    .fetch_optional(proxy.pool())
    .await?;

    match row {
        Some(row) => Ok(Some(parse_stat_row(user_id, date, &row)?)),
        None => Ok(None),
    }
}

/// Re-folds one calendar day's aggregates from the raw event log. Safe to
/// run redundantly: the result depends only on the log. `streakDay` is left
/// untouched; it belongs to the streak tracker.
pub async fn refresh_date(
    proxy: &DatabaseProxy,
    date: NaiveDate,
    high_score_threshold: i32,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE "daily_stats" d
        SET "messagesCount" = s."messages",
            "highAccuracyCount" = s."high",
            "correctPercent" = s."avgScore",
            "wordsSaid" = s."words",
            "updatedAt" = NOW()
        FROM (
            SELECT "userId",
                   COUNT(*) FILTER (WHERE "eventType" = 'MESSAGE') AS "messages",
                   COUNT(*) FILTER (WHERE "eventType" = 'MESSAGE' AND "score" >= $2) AS "high",
                   COALESCE(AVG("score") FILTER (WHERE "eventType" = 'MESSAGE'), 0) AS "avgScore",
                   COUNT(*) FILTER (WHERE "eventType" = 'WORD_SAVED') AS "words"
            FROM "learning_events"
            WHERE "localDate" = $1
            GROUP BY "userId"
        ) s
        WHERE d."userId" = s."userId" AND d."date" = $1
        "#,
    )
    .bind(date)
    .bind(high_score_threshold)
    .execute(proxy.pool())
    .await?;

    Ok(result.rows_affected())
}

async fn insert_event(
    proxy: &DatabaseProxy,
    user_id: &str,
    event_type: EventType,
    score: Option<i32>,
    topic: Option<&str>,
    occurred_at: DateTime<Utc>,
    local_date: NaiveDate,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO "learning_events"
            ("id", "userId", "eventType", "score", "topic", "occurredAt", "localDate")
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(event_type.as_str())
    .bind(score)
    .bind(topic)
    .bind(occurred_at)
    .bind(local_date)
    .execute(proxy.pool())
    .await?;

    Ok(())
}

fn parse_stat_row(
    user_id: &str,
    date: NaiveDate,
    row: &sqlx::postgres::PgRow,
) -> Result<DailyStatRecord, sqlx::Error> {
    Ok(DailyStatRecord {
        user_id: user_id.to_string(),
        date,
        messages_count: row.try_get("messagesCount")?,
        words_said: row.try_get("wordsSaid")?,
        high_accuracy_count: row.try_get("highAccuracyCount")?,
        correct_percent: row.try_get("correctPercent")?,
        streak_day: row.try_get("streakDay")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_timezone_falls_back_to_utc() {
        assert_eq!(resolve_timezone("Mars/Olympus"), Tz::UTC);
        assert_eq!(resolve_timezone(""), Tz::UTC);
        assert_eq!(resolve_timezone("Europe/Madrid"), chrono_tz::Europe::Madrid);
    }

    #[test]
    fn test_local_date_crosses_midnight() {
        // 03:00 UTC is still the previous evening in New York.
        let at = DateTime::parse_from_rfc3339("2025-01-15T03:00:00Z")
            .expect("valid timestamp")
            .with_timezone(&Utc);
        assert_eq!(
            local_date(at, "America/New_York"),
            NaiveDate::from_ymd_opt(2025, 1, 14).expect("valid date")
        );
        assert_eq!(
            local_date(at, "UTC"),
            NaiveDate::from_ymd_opt(2025, 1, 15).expect("valid date")
        );
        assert_eq!(
            local_date(at, "not-a-timezone"),
            NaiveDate::from_ymd_opt(2025, 1, 15).expect("valid date")
        );
    }
}
