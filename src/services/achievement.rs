use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Row;
use uuid::Uuid;

use crate::db::DatabaseProxy;

/// A vocabulary card counts as mastered once its review interval has grown
/// to three weeks.
const MASTERED_INTERVAL_DAYS: i32 = 21;
/// Accuracy achievements stay locked until the sample is meaningful.
const ACCURACY_MIN_MESSAGES: i64 = 50;
const ACCURACY_WINDOW_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AchievementCategory {
    Streak,
    Messages,
    Vocabulary,
    Stars,
    Mastery,
    Accuracy,
}

impl AchievementCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Streak => "STREAK",
            Self::Messages => "MESSAGES",
            Self::Vocabulary => "VOCABULARY",
            Self::Stars => "STARS",
            Self::Mastery => "MASTERY",
            Self::Accuracy => "ACCURACY",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "MESSAGES" => Self::Messages,
            "VOCABULARY" => Self::Vocabulary,
            "STARS" => Self::Stars,
            "MASTERY" => Self::Mastery,
            "ACCURACY" => Self::Accuracy,
            _ => Self::Streak,
        }
    }
}

#[derive(Debug, Clone)]
struct AchievementRow {
    id: String,
    code: String,
    title: String,
    description: String,
    category: AchievementCategory,
    threshold: i64,
    stars_reward: i64,
    is_hidden: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AchievementView {
    pub code: String,
    pub title: String,
    pub description: String,
    pub category: AchievementCategory,
    pub threshold: i64,
    pub stars_reward: i64,
    pub unlocked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unlocked_at: Option<String>,
    pub progress: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockedAchievement {
    pub code: String,
    pub title: String,
    pub stars_reward: i64,
    pub unlocked_at: String,
}

/// Aggregated lifetime counters the category evaluators read. One snapshot
/// per evaluation pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct UserCounters {
    pub max_streak: i64,
    pub total_messages: i64,
    pub vocabulary_size: i64,
    pub lifetime_stars: i64,
    pub mastered_words: i64,
    pub recent_accuracy: f64,
}

/// Current counter value for a category, in threshold units.
pub fn current_value(category: AchievementCategory, counters: &UserCounters) -> i64 {
    match category {
        AchievementCategory::Streak => counters.max_streak,
        AchievementCategory::Messages => counters.total_messages,
        AchievementCategory::Vocabulary => counters.vocabulary_size,
        AchievementCategory::Stars => counters.lifetime_stars,
        AchievementCategory::Mastery => counters.mastered_words,
        AchievementCategory::Accuracy => {
            if counters.total_messages < ACCURACY_MIN_MESSAGES {
                0
            } else {
                counters.recent_accuracy.round() as i64
            }
        }
    }
}

pub fn meets_threshold(
    category: AchievementCategory,
    threshold: i64,
    counters: &UserCounters,
) -> bool {
    current_value(category, counters) >= threshold
}

/// Evaluates every active achievement the user has not unlocked yet,
/// optionally narrowed to one category. Each unlock is an append-only
/// insert plus a ledger credit in one transaction; re-evaluating after an
/// unlock is a no-op.
pub async fn evaluate(
    proxy: &DatabaseProxy,
    user_id: &str,
    category: Option<AchievementCategory>,
) -> Result<Vec<UnlockedAchievement>, sqlx::Error> {
    let definitions = active_achievements(proxy, category).await?;
    if definitions.is_empty() {
        return Ok(Vec::new());
    }

    let existing = existing_unlock_ids(proxy, user_id).await?;
    let counters = load_counters(proxy, user_id).await?;

    let mut unlocked = Vec::new();

    for achievement in definitions {
        if existing.contains(&achievement.id) {
            continue;
        }
        if !meets_threshold(achievement.category, achievement.threshold, &counters) {
            continue;
        }

        let progress = current_value(achievement.category, &counters);
        if let Some(at) = unlock(proxy, user_id, &achievement, progress).await? {
            tracing::info!(
                user_id,
                achievement = %achievement.code,
                stars = achievement.stars_reward,
                "achievement unlocked"
            );
            unlocked.push(UnlockedAchievement {
                code: achievement.code,
                title: achievement.title,
                stars_reward: achievement.stars_reward,
                unlocked_at: at.to_rfc3339(),
            });
        }
    }

    Ok(unlocked)
}

/// All active achievements with the caller's unlock status. Hidden
/// achievements are omitted until unlocked.
pub async fn list_achievements(
    proxy: &DatabaseProxy,
    user_id: &str,
) -> Result<Vec<AchievementView>, sqlx::Error> {
    let definitions = active_achievements(proxy, None).await?;
    let unlocks = unlock_times(proxy, user_id).await?;
    let counters = load_counters(proxy, user_id).await?;

    Ok(definitions
        .into_iter()
        .filter_map(|achievement| {
            let unlocked_at = unlocks
                .iter()
                .find(|(id, _)| *id == achievement.id)
                .map(|(_, at)| at.to_rfc3339());
            let unlocked = unlocked_at.is_some();

            if achievement.is_hidden && !unlocked {
                return None;
            }

            let progress = if unlocked {
                achievement.threshold
            } else {
                current_value(achievement.category, &counters).min(achievement.threshold)
            };

            Some(AchievementView {
                code: achievement.code,
                title: achievement.title,
                description: achievement.description,
                category: achievement.category,
                threshold: achievement.threshold,
                stars_reward: achievement.stars_reward,
                unlocked,
                unlocked_at,
                progress,
            })
        })
        .collect())
}

async fn unlock(
    proxy: &DatabaseProxy,
    user_id: &str,
    achievement: &AchievementRow,
    progress_at_unlock: i64,
) -> Result<Option<DateTime<Utc>>, sqlx::Error> {
    let mut tx = proxy.pool().begin().await?;

    let inserted: Option<DateTime<Utc>> = sqlx::query_scalar(
        r#"
        INSERT INTO "user_achievements"
            ("id", "userId", "achievementId", "unlockedAt", "progressAtUnlock")
        VALUES ($1, $2, $3, NOW(), $4)
        ON CONFLICT ("userId", "achievementId") DO NOTHING
        RETURNING "unlockedAt"
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(&achievement.id)
    .bind(progress_at_unlock)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(unlocked_at) = inserted else {
        // Lost the race to a concurrent evaluation; nothing to credit.
        tx.rollback().await?;
        return Ok(None);
    };

    sqlx::query(
        r#"
        INSERT INTO "reward_ledgers" ("userId", "total", "available", "lifetime", "updatedAt")
        VALUES ($1, $2, $2, $2, NOW())
        ON CONFLICT ("userId") DO UPDATE SET
            "total" = "reward_ledgers"."total" + $2,
            "available" = "reward_ledgers"."available" + $2,
            "lifetime" = "reward_ledgers"."lifetime" + $2,
            "updatedAt" = NOW()
        "#,
    )
    .bind(user_id)
    .bind(achievement.stars_reward)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    Ok(Some(unlocked_at))
}

async fn active_achievements(
    proxy: &DatabaseProxy,
    category: Option<AchievementCategory>,
) -> Result<Vec<AchievementRow>, sqlx::Error> {
    let rows = match category {
        Some(category) => {
            sqlx::query(
                r#"
                SELECT "id", "code", "title", "description", "category", "threshold",
                       "starsReward", "isHidden"
                FROM "achievements"
                WHERE "isActive" = TRUE AND "category" = $1
                ORDER BY "category", "threshold"
                "#,
            )
            .bind(category.as_str())
            .fetch_all(proxy.pool())
            .await?
        }
        None => {
            sqlx::query(
                r#"
                SELECT "id", "code", "title", "description", "category", "threshold",
                       "starsReward", "isHidden"
                FROM "achievements"
                WHERE "isActive" = TRUE
                ORDER BY "category", "threshold"
                "#,
            )
            .fetch_all(proxy.pool())
            .await?
        }
    };

    rows.iter()
        .map(|row| {
            Ok(AchievementRow {
                id: row.try_get("id")?,
                code: row.try_get("code")?,
                title: row.try_get("title")?,
                description: row.try_get("description")?,
                category: AchievementCategory::parse(
                    row.try_get::<String, _>("category")?.as_str(),
                ),
                threshold: row.try_get("threshold")?,
                stars_reward: row.try_get::<i32, _>("starsReward")? as i64,
                is_hidden: row.try_get("isHidden")?,
            })
        })
        .collect()
}

async fn existing_unlock_ids(
    proxy: &DatabaseProxy,
    user_id: &str,
) -> Result<HashSet<String>, sqlx::Error> {
    let ids: Vec<String> = sqlx::query_scalar(
        r#"SELECT "achievementId" FROM "user_achievements" WHERE "userId" = $1"#,
    )
    .bind(user_id)
    .fetch_all(proxy.pool())
    .await?;

    Ok(ids.into_iter().collect())
}

async fn unlock_times(
    proxy: &DatabaseProxy,
    user_id: &str,
) -> Result<Vec<(String, DateTime<Utc>)>, sqlx::Error> {
    let rows = sqlx::query(
        r#"SELECT "achievementId", "unlockedAt" FROM "user_achievements" WHERE "userId" = $1"#,
    )
    .bind(user_id)
    .fetch_all(proxy.pool())
    .await?;

    rows.iter()
        .map(|row| Ok((row.try_get("achievementId")?, row.try_get("unlockedAt")?)))
        .collect()
}

async fn load_counters(proxy: &DatabaseProxy, user_id: &str) -> Result<UserCounters, sqlx::Error> {
    let pool = proxy.pool();

    let max_streak: i32 = sqlx::query_scalar(
        r#"SELECT COALESCE(MAX("maxStreak"), 0) FROM "user_progress" WHERE "userId" = $1"#,
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    let total_messages: i64 = sqlx::query_scalar(
        r#"SELECT COALESCE(SUM("messagesCount"), 0) FROM "daily_stats" WHERE "userId" = $1"#,
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    let vocabulary_size: i64 =
        sqlx::query_scalar(r#"SELECT COUNT(*) FROM "vocabulary_cards" WHERE "userId" = $1"#)
            .bind(user_id)
            .fetch_one(pool)
            .await?;

    let mastered_words: i64 = sqlx::query_scalar(
        r#"SELECT COUNT(*) FROM "vocabulary_cards" WHERE "userId" = $1 AND "intervalDays" >= $2"#,
    )
    .bind(user_id)
    .bind(MASTERED_INTERVAL_DAYS)
    .fetch_one(pool)
    .await?;

    let lifetime_stars: i64 = sqlx::query_scalar(
        r#"SELECT COALESCE(MAX("lifetime"), 0) FROM "reward_ledgers" WHERE "userId" = $1"#,
    )
    .bind(user_id)
    .fetch_one(pool)
    .await?;

    let recent_accuracy: f64 = sqlx::query_scalar(
        r#"
        SELECT COALESCE(AVG("correctPercent"), 0) FROM (
            SELECT "correctPercent" FROM "daily_stats"
            WHERE "userId" = $1 AND "messagesCount" > 0
            ORDER BY "date" DESC
            LIMIT $2
        ) recent
        "#,
    )
    .bind(user_id)
    .bind(ACCURACY_WINDOW_DAYS)
    .fetch_one(pool)
    .await?;

    Ok(UserCounters {
        max_streak: max_streak as i64,
        total_messages,
        vocabulary_size,
        lifetime_stars,
        mastered_words,
        recent_accuracy,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counters() -> UserCounters {
        UserCounters {
            max_streak: 12,
            total_messages: 480,
            vocabulary_size: 130,
            lifetime_stars: 990,
            mastered_words: 24,
            recent_accuracy: 87.4,
        }
    }

    #[test]
    fn test_current_value_per_category() {
        let c = counters();
        assert_eq!(current_value(AchievementCategory::Streak, &c), 12);
        assert_eq!(current_value(AchievementCategory::Messages, &c), 480);
        assert_eq!(current_value(AchievementCategory::Vocabulary, &c), 130);
        assert_eq!(current_value(AchievementCategory::Stars, &c), 990);
        assert_eq!(current_value(AchievementCategory::Mastery, &c), 24);
        assert_eq!(current_value(AchievementCategory::Accuracy, &c), 87);
    }

    #[test]
    fn test_accuracy_needs_sample_volume() {
        let mut c = counters();
        c.total_messages = ACCURACY_MIN_MESSAGES - 1;
        assert_eq!(current_value(AchievementCategory::Accuracy, &c), 0);
        assert!(!meets_threshold(AchievementCategory::Accuracy, 80, &c));
    }

    #[test]
    fn test_threshold_boundaries() {
        let c = counters();
        assert!(meets_threshold(AchievementCategory::Streak, 12, &c));
        assert!(!meets_threshold(AchievementCategory::Streak, 13, &c));
        assert!(meets_threshold(AchievementCategory::Stars, 990, &c));
        assert!(!meets_threshold(AchievementCategory::Stars, 1000, &c));
    }

    #[test]
    fn test_category_parse_round_trip() {
        for category in [
            AchievementCategory::Streak,
            AchievementCategory::Messages,
            AchievementCategory::Vocabulary,
            AchievementCategory::Stars,
            AchievementCategory::Mastery,
            AchievementCategory::Accuracy,
        ] {
            assert_eq!(AchievementCategory::parse(category.as_str()), category);
        }
    }
}
