use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::Row;
use uuid::Uuid;

use crate::db::DatabaseProxy;
use crate::engine::EngineError;
use crate::services::streak;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChallengeType {
    Daily,
    Weekly,
}

impl ChallengeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "DAILY",
            Self::Weekly => "WEEKLY",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "WEEKLY" => Self::Weekly,
            _ => Self::Daily,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalType {
    Messages,
    HighAccuracyMessages,
    SavedWords,
    TopicMessage,
    StreakDays,
    WeeklyMessages,
    WeeklyAccuracy,
    WeeklySavedWords,
}

impl GoalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Messages => "messages",
            Self::HighAccuracyMessages => "high_accuracy_messages",
            Self::SavedWords => "saved_words",
            Self::TopicMessage => "topic_message",
            Self::StreakDays => "streak_days",
            Self::WeeklyMessages => "weekly_messages",
            Self::WeeklyAccuracy => "weekly_accuracy",
            Self::WeeklySavedWords => "weekly_saved_words",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "high_accuracy_messages" => Self::HighAccuracyMessages,
            "saved_words" => Self::SavedWords,
            "topic_message" => Self::TopicMessage,
            "streak_days" => Self::StreakDays,
            "weekly_messages" => Self::WeeklyMessages,
            "weekly_accuracy" => Self::WeeklyAccuracy,
            "weekly_saved_words" => Self::WeeklySavedWords,
            _ => Self::Messages,
        }
    }
}

/// Lifecycle of one user/challenge/period row. The only legal path is
/// PENDING -> COMPLETED -> CLAIMED; completion and claiming never roll back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChallengeState {
    Pending,
    Completed,
    Claimed,
}

impl ChallengeState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Completed => "COMPLETED",
            Self::Claimed => "CLAIMED",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "COMPLETED" => Self::Completed,
            "CLAIMED" => Self::Claimed,
            _ => Self::Pending,
        }
    }

    pub fn can_transition_to(self, target: ChallengeState) -> bool {
        matches!(
            (self, target),
            (ChallengeState::Pending, ChallengeState::Completed)
                | (ChallengeState::Completed, ChallengeState::Claimed)
        )
    }
}

#[derive(Debug, Clone)]
pub struct ChallengeRow {
    pub id: String,
    pub code: String,
    pub title: String,
    pub description: String,
    pub challenge_type: ChallengeType,
    pub goal_type: GoalType,
    pub goal_value: i64,
    pub goal_topic: Option<String>,
    pub reward_stars: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeView {
    pub id: String,
    pub code: String,
    pub title: String,
    pub description: String,
    pub challenge_type: ChallengeType,
    pub goal_type: GoalType,
    pub goal_value: i64,
    pub reward_stars: i64,
    pub period_key: String,
    pub progress: i64,
    pub completed: bool,
    pub reward_claimed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeBoard {
    pub daily: Option<ChallengeView>,
    pub weekly: Vec<ChallengeView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimOutcome {
    pub stars_earned: i64,
    pub total_stars: i64,
}

/// Stable 64-bit selection seed. SHA-256 keeps the choice identical across
/// processes, restarts and replicas, unlike a runtime-randomized string
/// hash.
pub fn selection_seed(user_id: &str, date: NaiveDate) -> u64 {
    let digest = Sha256::digest(format!("{user_id}:{date}").as_bytes());
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(buf)
}

pub fn daily_period_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Monday of the week containing `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

pub fn weekly_period_key(date: NaiveDate) -> String {
    daily_period_key(week_start(date))
}

pub fn parse_period_key(key: &str) -> Result<NaiveDate, EngineError> {
    NaiveDate::parse_from_str(key, "%Y-%m-%d")
        .map_err(|_| EngineError::InvalidPeriodKey(key.to_string()))
}

/// The one daily challenge for this user and day, with progress evaluated.
/// Same `(user_id, date)` always resolves to the same definition.
pub async fn daily_challenge(
    proxy: &DatabaseProxy,
    user_id: &str,
    date: NaiveDate,
    high_score_threshold: i32,
) -> Result<Option<(ChallengeView, bool)>, sqlx::Error> {
    let active = active_challenges(proxy, ChallengeType::Daily).await?;
    if active.is_empty() {
        return Ok(None);
    }

    let index = (selection_seed(user_id, date) % active.len() as u64) as usize;
    let challenge = &active[index];

    let evaluated =
        evaluate_challenge(proxy, user_id, challenge, date, high_score_threshold).await?;
    Ok(Some(evaluated))
}

/// Every active weekly challenge evaluated against the Monday-anchored week
/// containing `date`.
pub async fn weekly_challenges(
    proxy: &DatabaseProxy,
    user_id: &str,
    date: NaiveDate,
    high_score_threshold: i32,
) -> Result<Vec<(ChallengeView, bool)>, sqlx::Error> {
    let active = active_challenges(proxy, ChallengeType::Weekly).await?;

    let mut views = Vec::with_capacity(active.len());
    for challenge in &active {
        views.push(evaluate_challenge(proxy, user_id, challenge, date, high_score_threshold).await?);
    }
    Ok(views)
}

/// Exactly-once reward claim. The COMPLETED -> CLAIMED flip and the ledger
/// credit share one transaction; under concurrent claims a single caller
/// wins the compare-and-set and every other caller sees `AlreadyClaimed`.
pub async fn claim_reward(
    proxy: &DatabaseProxy,
    user_id: &str,
    challenge_id: &str,
    period_key: &str,
) -> Result<ClaimOutcome, EngineError> {
    parse_period_key(period_key)?;

    let challenge = fetch_challenge(proxy, challenge_id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("challenge {challenge_id}")))?;

    let status = fetch_progress_status(proxy, user_id, challenge_id, period_key)
        .await?
        .ok_or_else(|| {
            EngineError::NotFound(format!("no progress for challenge {challenge_id}"))
        })?;

    match status {
        ChallengeState::Pending => Err(EngineError::NotCompleted),
        ChallengeState::Claimed => Err(EngineError::AlreadyClaimed),
        ChallengeState::Completed => {
            debug_assert!(status.can_transition_to(ChallengeState::Claimed));

            let mut tx = proxy.pool().begin().await?;

            let updated = sqlx::query(
                r#"
                UPDATE "user_challenges"
                SET "status" = 'CLAIMED', "claimedAt" = NOW()
                WHERE "userId" = $1 AND "challengeId" = $2 AND "periodKey" = $3
                  AND "status" = 'COMPLETED'
                "#,
            )
            .bind(user_id)
            .bind(challenge_id)
            .bind(period_key)
            .execute(&mut *tx)
            .await?;

            if updated.rows_affected() == 0 {
                tx.rollback().await?;
                return Err(EngineError::AlreadyClaimed);
            }

            let total: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO "reward_ledgers" ("userId", "total", "available", "lifetime", "updatedAt")
                VALUES ($1, $2, $2, $2, NOW())
                ON CONFLICT ("userId") DO UPDATE SET
                    "total" = "reward_ledgers"."total" + $2,
                    "available" = "reward_ledgers"."available" + $2,
                    "lifetime" = "reward_ledgers"."lifetime" + $2,
                    "updatedAt" = NOW()
                RETURNING "total"
                "#,
            )
            .bind(user_id)
            .bind(challenge.reward_stars)
            .fetch_one(&mut *tx)
            .await?;

            tx.commit().await?;

            tracing::info!(
                user_id,
                challenge = %challenge.code,
                period_key,
                stars = challenge.reward_stars,
                "challenge reward claimed"
            );

            Ok(ClaimOutcome {
                stars_earned: challenge.reward_stars,
                total_stars: total,
            })
        }
    }
}

async fn evaluate_challenge(
    proxy: &DatabaseProxy,
    user_id: &str,
    challenge: &ChallengeRow,
    date: NaiveDate,
    high_score_threshold: i32,
) -> Result<(ChallengeView, bool), sqlx::Error> {
    let (period_key, from, to) = match challenge.challenge_type {
        ChallengeType::Daily => (daily_period_key(date), date, date),
        ChallengeType::Weekly => {
            let monday = week_start(date);
            (weekly_period_key(date), monday, monday + Duration::days(6))
        }
    };

    let progress =
        compute_progress(proxy, user_id, challenge, from, to, date, high_score_threshold).await?;

    let status = upsert_progress(proxy, user_id, &challenge.id, &period_key, progress).await?;

    let mut newly_completed = false;
    if status.can_transition_to(ChallengeState::Completed) && progress >= challenge.goal_value {
        newly_completed = mark_completed(proxy, user_id, &challenge.id, &period_key).await?;
        if newly_completed {
            tracing::info!(
                user_id,
                challenge = %challenge.code,
                period_key = %period_key,
                "challenge completed"
            );
        }
    }

    let effective = if newly_completed {
        ChallengeState::Completed
    } else {
        status
    };

    let view = ChallengeView {
        id: challenge.id.clone(),
        code: challenge.code.clone(),
        title: challenge.title.clone(),
        description: challenge.description.clone(),
        challenge_type: challenge.challenge_type,
        goal_type: challenge.goal_type,
        goal_value: challenge.goal_value,
        reward_stars: challenge.reward_stars,
        period_key,
        progress,
        completed: effective != ChallengeState::Pending,
        reward_claimed: effective == ChallengeState::Claimed,
    };

    Ok((view, newly_completed))
}

async fn compute_progress(
    proxy: &DatabaseProxy,
    user_id: &str,
    challenge: &ChallengeRow,
    from: NaiveDate,
    to: NaiveDate,
    today: NaiveDate,
    high_score_threshold: i32,
) -> Result<i64, sqlx::Error> {
    match challenge.goal_type {
        GoalType::Messages | GoalType::WeeklyMessages => {
            count_events(proxy, user_id, from, to, "MESSAGE").await
        }
        GoalType::SavedWords | GoalType::WeeklySavedWords => {
            count_events(proxy, user_id, from, to, "WORD_SAVED").await
        }
        GoalType::HighAccuracyMessages => {
            count_high_accuracy(proxy, user_id, from, to, high_score_threshold).await
        }
        GoalType::TopicMessage => {
            let topic = challenge.goal_topic.as_deref().unwrap_or_default();
            count_topic_messages(proxy, user_id, from, to, topic).await
        }
        GoalType::StreakDays => {
            let (current, _) = streak::snapshot(proxy, user_id, today).await?;
            Ok(current as i64)
        }
        GoalType::WeeklyAccuracy => mean_accuracy(proxy, user_id, from, to).await,
    }
}

async fn active_challenges(
    proxy: &DatabaseProxy,
    challenge_type: ChallengeType,
) -> Result<Vec<ChallengeRow>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT "id", "code", "title", "description", "challengeType", "goalType",
               "goalValue", "goalTopic", "rewardStars"
        FROM "challenges"
        WHERE "isActive" = TRUE AND "challengeType" = $1
        ORDER BY "code"
        "#,
    )
    .bind(challenge_type.as_str())
    .fetch_all(proxy.pool())
    .await?;

    rows.iter().map(parse_challenge_row).collect()
}

async fn fetch_challenge(
    proxy: &DatabaseProxy,
    challenge_id: &str,
) -> Result<Option<ChallengeRow>, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT "id", "code", "title", "description", "challengeType", "goalType",
               "goalValue", "goalTopic", "rewardStars"
        FROM "challenges"
        WHERE "id" = $1
        "#,
    )
    .bind(challenge_id)
    .fetch_optional(proxy.pool())
    .await?;

    row.as_ref().map(parse_challenge_row).transpose()
}

fn parse_challenge_row(row: &sqlx::postgres::PgRow) -> Result<ChallengeRow, sqlx::Error> {
    Ok(ChallengeRow {
        id: row.try_get("id")?,
        code: row.try_get("code")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        challenge_type: ChallengeType::parse(row.try_get::<String, _>("challengeType")?.as_str()),
        goal_type: GoalType::parse(row.try_get::<String, _>("goalType")?.as_str()),
        goal_value: row.try_get::<i32, _>("goalValue")? as i64,
        goal_topic: row.try_get("goalTopic")?,
        reward_stars: row.try_get::<i32, _>("rewardStars")? as i64,
    })
}

/// Creates or refreshes the progress row. Progress is frozen once the row
/// has left PENDING, so a stale recomputation can never walk a completed
/// challenge backwards.
async fn upsert_progress(
    proxy: &DatabaseProxy,
    user_id: &str,
    challenge_id: &str,
    period_key: &str,
    progress: i64,
) -> Result<ChallengeState, sqlx::Error> {
    let status: String = sqlx::query_scalar(
        r#"
        INSERT INTO "user_challenges" ("id", "userId", "challengeId", "periodKey", "progress")
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT ("userId", "challengeId", "periodKey") DO UPDATE SET
            "progress" = CASE
                WHEN "user_challenges"."status" = 'PENDING' THEN EXCLUDED."progress"
                ELSE "user_challenges"."progress"
            END
        RETURNING "status"
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(challenge_id)
    .bind(period_key)
    .bind(progress)
    .fetch_one(proxy.pool())
    .await?;

    Ok(ChallengeState::parse(&status))
}

/// PENDING -> COMPLETED, exactly once; the status guard makes concurrent
/// evaluations race safely.
async fn mark_completed(
    proxy: &DatabaseProxy,
    user_id: &str,
    challenge_id: &str,
    period_key: &str,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE "user_challenges"
        SET "status" = 'COMPLETED', "completedAt" = NOW()
        WHERE "userId" = $1 AND "challengeId" = $2 AND "periodKey" = $3
          AND "status" = 'PENDING'
        "#,
    )
    .bind(user_id)
    .bind(challenge_id)
    .bind(period_key)
    .execute(proxy.pool())
    .await?;

    Ok(result.rows_affected() > 0)
}

async fn fetch_progress_status(
    proxy: &DatabaseProxy,
    user_id: &str,
    challenge_id: &str,
    period_key: &str,
) -> Result<Option<ChallengeState>, sqlx::Error> {
    let status: Option<String> = sqlx::query_scalar(
        r#"
        SELECT "status" FROM "user_challenges"
        WHERE "userId" = $1 AND "challengeId" = $2 AND "periodKey" = $3
        "#,
    )
    .bind(user_id)
    .bind(challenge_id)
    .bind(period_key)
    .fetch_optional(proxy.pool())
    .await?;

    Ok(status.as_deref().map(ChallengeState::parse))
}

async fn count_events(
    proxy: &DatabaseProxy,
    user_id: &str,
    from: NaiveDate,
    to: NaiveDate,
    event_type: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM "learning_events"
        WHERE "userId" = $1 AND "eventType" = $2
          AND "localDate" BETWEEN $3 AND $4
        "#,
    )
    .bind(user_id)
    .bind(event_type)
    .bind(from)
    .bind(to)
    .fetch_one(proxy.pool())
    .await
}

async fn count_high_accuracy(
    proxy: &DatabaseProxy,
    user_id: &str,
    from: NaiveDate,
    to: NaiveDate,
    threshold: i32,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM "learning_events"
        WHERE "userId" = $1 AND "eventType" = 'MESSAGE' AND "score" >= $2
          AND "localDate" BETWEEN $3 AND $4
        "#,
    )
    .bind(user_id)
    .bind(threshold)
    .bind(from)
    .bind(to)
    .fetch_one(proxy.pool())
    .await
}

async fn count_topic_messages(
    proxy: &DatabaseProxy,
    user_id: &str,
    from: NaiveDate,
    to: NaiveDate,
    topic: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM "learning_events"
        WHERE "userId" = $1 AND "eventType" = 'MESSAGE' AND "topic" = $2
          AND "localDate" BETWEEN $3 AND $4
        "#,
    )
    .bind(user_id)
    .bind(topic)
    .bind(from)
    .bind(to)
    .fetch_one(proxy.pool())
    .await
}

async fn mean_accuracy(
    proxy: &DatabaseProxy,
    user_id: &str,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<i64, sqlx::Error> {
    let mean: f64 = sqlx::query_scalar(
        r#"
        SELECT COALESCE(AVG("score"), 0)::FLOAT8 FROM "learning_events"
        WHERE "userId" = $1 AND "eventType" = 'MESSAGE'
          AND "localDate" BETWEEN $2 AND $3
        "#,
    )
    .bind(user_id)
    .bind(from)
    .bind(to)
    .fetch_one(proxy.pool())
    .await?;

    Ok(mean.round() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn test_selection_seed_is_stable() {
        let a = selection_seed("42", date(2025, 1, 15));
        let b = selection_seed("42", date(2025, 1, 15));
        assert_eq!(a, b);
        assert_ne!(a, selection_seed("42", date(2025, 1, 16)));
        assert_ne!(a, selection_seed("43", date(2025, 1, 15)));
    }

    #[test]
    fn test_selection_index_in_range() {
        for user in ["1", "7", "42", "9001"] {
            for day in 1..=28 {
                let seed = selection_seed(user, date(2025, 2, day));
                assert!((seed % 5) < 5);
            }
        }
    }

    #[test]
    fn test_week_start_is_monday_anchored() {
        // 2025-01-15 is a Wednesday.
        assert_eq!(week_start(date(2025, 1, 15)), date(2025, 1, 13));
        // Monday maps to itself.
        assert_eq!(week_start(date(2025, 1, 13)), date(2025, 1, 13));
        // Sunday still belongs to the week started the previous Monday.
        assert_eq!(week_start(date(2025, 1, 19)), date(2025, 1, 13));
    }

    #[test]
    fn test_period_keys() {
        assert_eq!(daily_period_key(date(2025, 1, 15)), "2025-01-15");
        assert_eq!(weekly_period_key(date(2025, 1, 15)), "2025-01-13");
        assert!(parse_period_key("2025-01-15").is_ok());
        assert!(parse_period_key("2025/01/15").is_err());
        assert!(parse_period_key("last-week").is_err());
    }

    #[test]
    fn test_state_machine_forward_only() {
        assert!(ChallengeState::Pending.can_transition_to(ChallengeState::Completed));
        assert!(ChallengeState::Completed.can_transition_to(ChallengeState::Claimed));

        assert!(!ChallengeState::Pending.can_transition_to(ChallengeState::Claimed));
        assert!(!ChallengeState::Completed.can_transition_to(ChallengeState::Pending));
        assert!(!ChallengeState::Claimed.can_transition_to(ChallengeState::Completed));
        assert!(!ChallengeState::Claimed.can_transition_to(ChallengeState::Pending));
    }

    #[test]
    fn test_state_parse_round_trip() {
        for state in [
            ChallengeState::Pending,
            ChallengeState::Completed,
            ChallengeState::Claimed,
        ] {
            assert_eq!(ChallengeState::parse(state.as_str()), state);
        }
        assert_eq!(ChallengeState::parse("garbage"), ChallengeState::Pending);
    }
}
