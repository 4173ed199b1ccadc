use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::Row;
use uuid::Uuid;

use crate::db::DatabaseProxy;
use crate::services::spaced_repetition::Scheduled;

/// How many recent review qualities a card remembers.
const QUALITY_HISTORY_LIMIT: usize = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VocabularyCard {
    pub id: String,
    pub user_id: String,
    pub word: String,
    pub ease_factor: f64,
    pub interval_days: i32,
    pub next_review_date: Option<NaiveDate>,
    pub review_count: i32,
    pub quality_history: Vec<i32>,
}

/// Creates the card for a newly saved word. Saving the same word twice is a
/// no-op; the returned flag says whether a card was created.
pub async fn save_word(
    proxy: &DatabaseProxy,
    user_id: &str,
    word: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO "vocabulary_cards" ("id", "userId", "word")
        VALUES ($1, $2, $3)
        ON CONFLICT ("userId", "word") DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(word)
    .execute(proxy.pool())
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn fetch_card(
    proxy: &DatabaseProxy,
    card_id: &str,
) -> Result<Option<VocabularyCard>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT "id", "userId", "word", "easeFactor", "intervalDays", "nextReviewDate",
               "reviewCount", "qualityHistory"
        FROM "vocabulary_cards"
        WHERE "id" = $1
        "#,
    )
    .bind(card_id)
    .fetch_optional(proxy.pool())
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let history: serde_json::Value = row.try_get("qualityHistory")?;
    let quality_history: Vec<i32> = serde_json::from_value(history).unwrap_or_default();

    Ok(Some(VocabularyCard {
        id: row.try_get("id")?,
        user_id: row.try_get("userId")?,
        word: row.try_get("word")?,
        ease_factor: row.try_get("easeFactor")?,
        interval_days: row.try_get("intervalDays")?,
        next_review_date: row.try_get("nextReviewDate")?,
        review_count: row.try_get("reviewCount")?,
        quality_history,
    }))
}

/// Persists a review outcome onto the card and appends the quality to the
/// bounded history.
pub async fn apply_review(
    proxy: &DatabaseProxy,
    card: &VocabularyCard,
    scheduled: &Scheduled,
    quality: i32,
) -> Result<(), sqlx::Error> {
    let history = push_quality(&card.quality_history, quality);
    let history_json = serde_json::to_value(&history).unwrap_or_else(|_| serde_json::json!([]));

    sqlx::query(
        r#"
        UPDATE "vocabulary_cards"
        SET "easeFactor" = $2,
            "intervalDays" = $3,
            "nextReviewDate" = $4,
            "reviewCount" = "reviewCount" + 1,
            "qualityHistory" = $5,
            "updatedAt" = NOW()
        WHERE "id" = $1
        "#,
    )
    .bind(&card.id)
    .bind(scheduled.ease_factor)
    .bind(scheduled.interval_days)
    .bind(scheduled.next_review_date)
    .bind(history_json)
    .execute(proxy.pool())
    .await?;

    Ok(())
}

/// Cards due for review on or before `date`, oldest due first.
pub async fn due_cards(
    proxy: &DatabaseProxy,
    user_id: &str,
    date: NaiveDate,
    limit: i64,
) -> Result<Vec<VocabularyCard>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT "id", "userId", "word", "easeFactor", "intervalDays", "nextReviewDate",
               "reviewCount", "qualityHistory"
        FROM "vocabulary_cards"
        WHERE "userId" = $1 AND "nextReviewDate" IS NOT NULL AND "nextReviewDate" <= $2
        ORDER BY "nextReviewDate" ASC
        LIMIT $3
        "#,
    )
    .bind(user_id)
    .bind(date)
    .bind(limit)
    .fetch_all(proxy.pool())
    .await?;

    rows.iter()
        .map(|row| {
            let history: serde_json::Value = row.try_get("qualityHistory")?;
            Ok(VocabularyCard {
                id: row.try_get("id")?,
                user_id: row.try_get("userId")?,
                word: row.try_get("word")?,
                ease_factor: row.try_get("easeFactor")?,
                interval_days: row.try_get("intervalDays")?,
                next_review_date: row.try_get("nextReviewDate")?,
                review_count: row.try_get("reviewCount")?,
                quality_history: serde_json::from_value(history).unwrap_or_default(),
            })
        })
        .collect()
}

fn push_quality(history: &[i32], quality: i32) -> Vec<i32> {
    let mut next: Vec<i32> = history.to_vec();
    next.push(quality);
    if next.len() > QUALITY_HISTORY_LIMIT {
        let overflow = next.len() - QUALITY_HISTORY_LIMIT;
        next.drain(0..overflow);
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_quality_keeps_last_five() {
        let mut history = Vec::new();
        for q in 0..8 {
            history = push_quality(&history, q);
        }
        assert_eq!(history, vec![3, 4, 5, 6, 7]);
    }

    #[test]
    fn test_push_quality_short_history() {
        assert_eq!(push_quality(&[], 2), vec![2]);
        assert_eq!(push_quality(&[1, 2], 3), vec![1, 2, 3]);
    }
}
