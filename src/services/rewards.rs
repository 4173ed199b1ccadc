use serde::{Deserialize, Serialize};
use sqlx::Row;

use crate::db::DatabaseProxy;

/// Star bonus tiers by streak length, longest first.
const STREAK_BONUS_TIERS: &[(i32, i64)] = &[(30, 5), (14, 3), (7, 2), (3, 1)];

#[derive(Debug, Clone)]
pub struct StarsConfig {
    pub base_per_message: i64,
    pub high_score_bonus: i64,
    pub high_score_threshold: i32,
}

impl Default for StarsConfig {
    fn default() -> Self {
        Self {
            base_per_message: 1,
            high_score_bonus: 1,
            high_score_threshold: 80,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StarBalance {
    pub total: i64,
    pub available: i64,
    pub lifetime: i64,
}

pub fn streak_bonus(streak: i32) -> i64 {
    STREAK_BONUS_TIERS
        .iter()
        .find(|(days, _)| streak >= *days)
        .map(|(_, bonus)| *bonus)
        .unwrap_or(0)
}

/// Stars earned by a single processed message at the given streak length.
pub fn message_stars(score: i32, streak: i32, config: &StarsConfig) -> i64 {
    let mut stars = config.base_per_message;
    if score >= config.high_score_threshold {
        stars += config.high_score_bonus;
    }
    stars + streak_bonus(streak)
}

/// The only write path into a user's star balance. Additive atomic
/// increment; `lifetime` never decreases.
pub async fn credit_stars(
    proxy: &DatabaseProxy,
    user_id: &str,
    amount: i64,
    reason: &str,
) -> Result<StarBalance, sqlx::Error> {
    let row = sqlx::query(
        r#"
        INSERT INTO "reward_ledgers" ("userId", "total", "available", "lifetime", "updatedAt")
        VALUES ($1, $2, $2, $2, NOW())
        ON CONFLICT ("userId") DO UPDATE SET
            "total" = "reward_ledgers"."total" + $2,
            "available" = "reward_ledgers"."available" + $2,
            "lifetime" = "reward_ledgers"."lifetime" + $2,
            "updatedAt" = NOW()
        RETURNING "total", "available", "lifetime"
        "#,
    )
    .bind(user_id)
    .bind(amount)
    .fetch_one(proxy.pool())
    .await?;

    let balance = StarBalance {
        total: row.try_get("total")?,
        available: row.try_get("available")?,
        lifetime: row.try_get("lifetime")?,
    };

    tracing::debug!(user_id, amount, reason, total = balance.total, "stars credited");

    Ok(balance)
}

/// Spends from the available balance. Returns `None` when the balance is
/// insufficient; the guard and the decrement are a single statement, so
/// concurrent spends cannot overdraw.
pub async fn spend_stars(
    proxy: &DatabaseProxy,
    user_id: &str,
    amount: i64,
) -> Result<Option<StarBalance>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        UPDATE "reward_ledgers"
        SET "total" = "total" - $2,
            "available" = "available" - $2,
            "updatedAt" = NOW()
        WHERE "userId" = $1 AND "available" >= $2
        RETURNING "total", "available", "lifetime"
        "#,
    )
    .bind(user_id)
    .bind(amount)
    .fetch_optional(proxy.pool())
    .await?;

    Ok(match row {
        Some(row) => Some(StarBalance {
            total: row.try_get("total")?,
            available: row.try_get("available")?,
            lifetime: row.try_get("lifetime")?,
        }),
        None => None,
    })
}

pub async fn balance(proxy: &DatabaseProxy, user_id: &str) -> Result<StarBalance, sqlx::Error> {
    let row = sqlx::query(
        r#"SELECT "total", "available", "lifetime" FROM "reward_ledgers" WHERE "userId" = $1"#,
    )
    .bind(user_id)
    .fetch_optional(proxy.pool())
    .await?;

    Ok(match row {
        Some(row) => StarBalance {
            total: row.try_get("total")?,
            available: row.try_get("available")?,
            lifetime: row.try_get("lifetime")?,
        },
        None => StarBalance {
            total: 0,
            available: 0,
            lifetime: 0,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_streak_bonus_tiers() {
        assert_eq!(streak_bonus(0), 0);
        assert_eq!(streak_bonus(2), 0);
        assert_eq!(streak_bonus(3), 1);
        assert_eq!(streak_bonus(6), 1);
        assert_eq!(streak_bonus(7), 2);
        assert_eq!(streak_bonus(13), 2);
        assert_eq!(streak_bonus(14), 3);
        assert_eq!(streak_bonus(30), 5);
        assert_eq!(streak_bonus(365), 5);
    }

    #[test]
    fn test_message_stars_high_score_on_week_streak() {
        // Day seven of a streak, score 85: 1 base + 1 high-score + 2 streak.
        let config = StarsConfig::default();
        assert_eq!(message_stars(85, 7, &config), 4);
    }

    #[test]
    fn test_message_stars_low_score_no_streak() {
        let config = StarsConfig::default();
        assert_eq!(message_stars(40, 1, &config), 1);
        assert_eq!(message_stars(79, 1, &config), 1);
        assert_eq!(message_stars(80, 1, &config), 2);
    }
}
