use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cache::{keys, RedisCache};
use crate::clock::Clock;
use crate::db::{self, DatabaseProxy};
use crate::services::achievement::{self, AchievementCategory, AchievementView, UnlockedAchievement};
use crate::services::challenge::{self, ChallengeBoard, ChallengeView, ClaimOutcome};
use crate::services::rewards::{self, StarBalance, StarsConfig};
use crate::services::spaced_repetition::{self, CardState, ReviewQuality};
use crate::services::stats;
use crate::services::streak;
use crate::services::vocabulary::{self, VocabularyCard};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub stars: StarsConfig,
    pub max_txn_retries: u32,
    pub retry_backoff: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            stars: StarsConfig::default(),
            max_txn_retries: 3,
            retry_backoff: Duration::from_millis(50),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(threshold) = env_i32("HIGH_SCORE_THRESHOLD") {
            config.stars.high_score_threshold = threshold;
        }
        if let Some(retries) = env_u32("ENGINE_MAX_TXN_RETRIES") {
            config.max_txn_retries = retries;
        }
        if let Some(backoff_ms) = env_u64("ENGINE_RETRY_BACKOFF_MS") {
            config.retry_backoff = Duration::from_millis(backoff_ms);
        }

        config
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("challenge reward already claimed")]
    AlreadyClaimed,
    #[error("challenge not completed")]
    NotCompleted,
    #[error("invalid review quality: {0}")]
    InvalidQuality(i32),
    #[error("invalid period key: {0}")]
    InvalidPeriodKey(String),
    #[error("insufficient star balance")]
    InsufficientStars,
    #[error("persistence conflict, the operation can be retried")]
    Conflict,
    #[error("sql error: {0}")]
    Sql(#[from] sqlx::Error),
}

/// One event consumed from the message pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    MessageSent {
        score: i32,
        #[serde(default)]
        topic: Option<String>,
    },
    WordSaved {
        word: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineResult {
    pub stars_earned: i64,
    pub current_streak: i32,
    pub max_streak: i32,
    pub unlocked_achievements: Vec<UnlockedAchievement>,
    pub completed_challenges: Vec<ChallengeView>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewOutcome {
    pub ease_factor: f64,
    pub interval_days: i32,
    pub next_review_date: NaiveDate,
}

/// Facade over the progress subsystem. Everything it needs arrives at
/// construction; it owns no background tasks and keeps no per-user state in
/// process memory.
pub struct EngagementEngine {
    config: EngineConfig,
    proxy: Arc<DatabaseProxy>,
    cache: Option<Arc<RedisCache>>,
    clock: Arc<dyn Clock>,
}

impl EngagementEngine {
    pub fn new(
        config: EngineConfig,
        proxy: Arc<DatabaseProxy>,
        cache: Option<Arc<RedisCache>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            proxy,
            cache,
            clock,
        }
    }

    pub fn proxy(&self) -> Arc<DatabaseProxy> {
        Arc::clone(&self.proxy)
    }

    /// Consumes one pipeline event: folds stats, advances the streak,
    /// credits stars and reports everything that newly completed or
    /// unlocked. Transient persistence conflicts are retried a bounded
    /// number of times before surfacing `Conflict`.
    pub async fn record_event(
        &self,
        user_id: &str,
        event: EngineEvent,
        timezone: &str,
    ) -> Result<EngineResult, EngineError> {
        let mut attempt: u32 = 0;
        loop {
            match self.record_event_once(user_id, event.clone(), timezone).await {
                Err(EngineError::Sql(err)) if db::is_retryable(&err) => {
                    attempt += 1;
                    if attempt > self.config.max_txn_retries {
                        return Err(EngineError::Conflict);
                    }
                    tracing::warn!(
                        user_id,
                        attempt,
                        error = %err,
                        "transient persistence failure, retrying"
                    );
                    tokio::time::sleep(self.config.retry_backoff * attempt).await;
                }
                other => return other,
            }
        }
    }

    async fn record_event_once(
        &self,
        user_id: &str,
        event: EngineEvent,
        timezone: &str,
    ) -> Result<EngineResult, EngineError> {
        let now = self.clock.now();
        let date = stats::local_date(now, timezone);
        let threshold = self.config.stars.high_score_threshold;

        let result = match event {
            EngineEvent::MessageSent { score, topic } => {
                let day = stats::apply_message(
                    &self.proxy,
                    user_id,
                    now,
                    date,
                    score,
                    topic.as_deref(),
                    threshold,
                )
                .await?;

                let streak_update =
                    streak::update_streak(&self.proxy, user_id, date, day.messages_count == 1)
                        .await?;

                let stars = rewards::message_stars(
                    score.clamp(0, 100),
                    streak_update.current_streak,
                    &self.config.stars,
                );
                rewards::credit_stars(&self.proxy, user_id, stars, "message").await?;

                let completed_challenges = self.evaluate_challenges(user_id, date).await?;
                let unlocked_achievements =
                    achievement::evaluate(&self.proxy, user_id, None).await?;

                EngineResult {
                    stars_earned: stars,
                    current_streak: streak_update.current_streak,
                    max_streak: streak_update.max_streak,
                    unlocked_achievements,
                    completed_challenges,
                }
            }
            EngineEvent::WordSaved { word } => {
                stats::apply_saved_word(&self.proxy, user_id, now, date).await?;
                vocabulary::save_word(&self.proxy, user_id, &word).await?;

                let (current_streak, max_streak) =
                    streak::snapshot(&self.proxy, user_id, date).await?;

                let completed_challenges = self.evaluate_challenges(user_id, date).await?;
                let unlocked_achievements =
                    achievement::evaluate(&self.proxy, user_id, None).await?;

                EngineResult {
                    stars_earned: 0,
                    current_streak,
                    max_streak,
                    unlocked_achievements,
                    completed_challenges,
                }
            }
        };

        self.invalidate_user_views(user_id, date).await;

        Ok(result)
    }

    /// The user's challenge board for a day: the deterministic daily pick
    /// plus every active weekly challenge.
    pub async fn get_challenges(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<ChallengeBoard, EngineError> {
        let key = keys::challenge_board_key(user_id, date);
        if let Some(cache) = &self.cache {
            if let Some(board) = cache.get::<ChallengeBoard>(&key).await {
                return Ok(board);
            }
        }

        let threshold = self.config.stars.high_score_threshold;
        let daily = challenge::daily_challenge(&self.proxy, user_id, date, threshold)
            .await?
            .map(|(view, _)| view);
        let weekly = challenge::weekly_challenges(&self.proxy, user_id, date, threshold)
            .await?
            .into_iter()
            .map(|(view, _)| view)
            .collect();

        let board = ChallengeBoard { daily, weekly };

        if let Some(cache) = &self.cache {
            cache.set(&key, &board, keys::CHALLENGE_BOARD_TTL).await;
        }

        Ok(board)
    }

    pub async fn claim_reward(
        &self,
        user_id: &str,
        challenge_id: &str,
        period_key: &str,
    ) -> Result<ClaimOutcome, EngineError> {
        let outcome =
            challenge::claim_reward(&self.proxy, user_id, challenge_id, period_key).await?;

        // The credit may have pushed the lifetime balance over a stars
        // threshold.
        achievement::evaluate(&self.proxy, user_id, Some(AchievementCategory::Stars)).await?;

        let today = self.clock.now().date_naive();
        self.invalidate_user_views(user_id, today).await;

        Ok(outcome)
    }

    pub async fn get_achievements(
        &self,
        user_id: &str,
    ) -> Result<Vec<AchievementView>, EngineError> {
        let key = keys::achievement_list_key(user_id);
        if let Some(cache) = &self.cache {
            if let Some(views) = cache.get::<Vec<AchievementView>>(&key).await {
                return Ok(views);
            }
        }

        let views = achievement::list_achievements(&self.proxy, user_id).await?;

        if let Some(cache) = &self.cache {
            cache.set(&key, &views, keys::ACHIEVEMENT_LIST_TTL).await;
        }

        Ok(views)
    }

    /// Runs one review outcome through SM-2 and persists the new schedule.
    pub async fn schedule_review(
        &self,
        card_id: &str,
        quality: i32,
    ) -> Result<ReviewOutcome, EngineError> {
        let quality =
            ReviewQuality::from_i32(quality).ok_or(EngineError::InvalidQuality(quality))?;

        let card = vocabulary::fetch_card(&self.proxy, card_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("vocabulary card {card_id}")))?;

        let state = CardState {
            ease_factor: card.ease_factor,
            interval_days: card.interval_days,
            review_count: card.review_count,
        };
        let today = self.clock.now().date_naive();
        let scheduled = spaced_repetition::schedule_next(&state, quality, today);

        vocabulary::apply_review(&self.proxy, &card, &scheduled, quality.as_i32()).await?;

        // A grown interval may have crossed the mastery bar.
        achievement::evaluate(&self.proxy, &card.user_id, Some(AchievementCategory::Mastery))
            .await?;

        Ok(ReviewOutcome {
            ease_factor: scheduled.ease_factor,
            interval_days: scheduled.interval_days,
            next_review_date: scheduled.next_review_date,
        })
    }

    /// Cards due for review today, oldest due first.
    pub async fn due_reviews(
        &self,
        user_id: &str,
        limit: i64,
    ) -> Result<Vec<VocabularyCard>, EngineError> {
        let today = self.clock.now().date_naive();
        Ok(vocabulary::due_cards(&self.proxy, user_id, today, limit).await?)
    }

    pub async fn star_balance(&self, user_id: &str) -> Result<StarBalance, EngineError> {
        Ok(rewards::balance(&self.proxy, user_id).await?)
    }

    /// Spends stars from the available balance, e.g. on catalog cosmetics.
    /// The lifetime counter is untouched.
    pub async fn spend_stars(
        &self,
        user_id: &str,
        amount: i64,
    ) -> Result<StarBalance, EngineError> {
        rewards::spend_stars(&self.proxy, user_id, amount)
            .await?
            .ok_or(EngineError::InsufficientStars)
    }

    /// Nightly maintenance entry point; safe to invoke redundantly.
    pub async fn sweep_expired_streaks(&self) -> Result<u64, EngineError> {
        let today = self.clock.now().date_naive();
        Ok(streak::sweep_expired(&self.proxy, today).await?)
    }

    /// Hourly maintenance entry point: re-folds aggregates for every
    /// user-local day that can currently be in flight. Safe to invoke
    /// redundantly.
    pub async fn refresh_daily_aggregates(&self) -> Result<u64, EngineError> {
        let today = self.clock.now().date_naive();
        let threshold = self.config.stars.high_score_threshold;

        let mut refreshed = 0;
        for date in [today.pred_opt(), Some(today), today.succ_opt()]
            .into_iter()
            .flatten()
        {
            refreshed += stats::refresh_date(&self.proxy, date, threshold).await?;
        }

        Ok(refreshed)
    }

    /// Evaluates the daily pick and all weekly challenges, returning the
    /// views that newly completed on this pass.
    async fn evaluate_challenges(
        &self,
        user_id: &str,
        date: NaiveDate,
    ) -> Result<Vec<ChallengeView>, EngineError> {
        let threshold = self.config.stars.high_score_threshold;
        let mut completed = Vec::new();

        if let Some((view, newly_completed)) =
            challenge::daily_challenge(&self.proxy, user_id, date, threshold).await?
        {
            if newly_completed {
                completed.push(view);
            }
        }

        for (view, newly_completed) in
            challenge::weekly_challenges(&self.proxy, user_id, date, threshold).await?
        {
            if newly_completed {
                completed.push(view);
            }
        }

        Ok(completed)
    }

    async fn invalidate_user_views(&self, user_id: &str, date: NaiveDate) {
        if let Some(cache) = &self.cache {
            cache.delete(&keys::challenge_board_key(user_id, date)).await;
            cache.delete(&keys::achievement_list_key(user_id)).await;
        }
    }
}

fn env_i32(key: &str) -> Option<i32> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
