use sqlx::PgPool;
use uuid::Uuid;

use crate::services::achievement::AchievementCategory;
use crate::services::challenge::{ChallengeType, GoalType};

struct ChallengeSeed {
    code: &'static str,
    title: &'static str,
    description: &'static str,
    challenge_type: ChallengeType,
    goal_type: GoalType,
    goal_value: i32,
    goal_topic: Option<&'static str>,
    reward_stars: i32,
}

struct AchievementSeed {
    code: &'static str,
    title: &'static str,
    description: &'static str,
    category: AchievementCategory,
    threshold: i64,
    stars_reward: i32,
    is_hidden: bool,
}

const CHALLENGES: &[ChallengeSeed] = &[
    ChallengeSeed {
        code: "daily_messages_10",
        title: "Chatterbox",
        description: "Send 10 messages today",
        challenge_type: ChallengeType::Daily,
        goal_type: GoalType::Messages,
        goal_value: 10,
        goal_topic: None,
        reward_stars: 5,
    },
    ChallengeSeed {
        code: "daily_high_accuracy_5",
        title: "Sharpshooter",
        description: "Score 80% or better on 5 messages today",
        challenge_type: ChallengeType::Daily,
        goal_type: GoalType::HighAccuracyMessages,
        goal_value: 5,
        goal_topic: None,
        reward_stars: 8,
    },
    ChallengeSeed {
        code: "daily_saved_words_3",
        title: "Collector",
        description: "Save 3 new words today",
        challenge_type: ChallengeType::Daily,
        goal_type: GoalType::SavedWords,
        goal_value: 3,
        goal_topic: None,
        reward_stars: 5,
    },
    ChallengeSeed {
        code: "daily_topic_food",
        title: "Table Talk",
        description: "Practice the food topic today",
        challenge_type: ChallengeType::Daily,
        goal_type: GoalType::TopicMessage,
        goal_value: 1,
        goal_topic: Some("food"),
        reward_stars: 4,
    },
    ChallengeSeed {
        code: "daily_topic_travel",
        title: "Wanderer",
        description: "Practice the travel topic today",
        challenge_type: ChallengeType::Daily,
        goal_type: GoalType::TopicMessage,
        goal_value: 1,
        goal_topic: Some("travel"),
        reward_stars: 4,
    },
    ChallengeSeed {
        code: "daily_streak_3",
        title: "Keep It Going",
        description: "Hold a 3-day practice streak",
        challenge_type: ChallengeType::Daily,
        goal_type: GoalType::StreakDays,
        goal_value: 3,
        goal_topic: None,
        reward_stars: 6,
    },
    ChallengeSeed {
        code: "weekly_messages_50",
        title: "Marathon Week",
        description: "Send 50 messages this week",
        challenge_type: ChallengeType::Weekly,
        goal_type: GoalType::WeeklyMessages,
        goal_value: 50,
        goal_topic: None,
        reward_stars: 20,
    },
    ChallengeSeed {
        code: "weekly_accuracy_85",
        title: "Precision Week",
        description: "Average 85% accuracy this week",
        challenge_type: ChallengeType::Weekly,
        goal_type: GoalType::WeeklyAccuracy,
        goal_value: 85,
        goal_topic: None,
        reward_stars: 25,
    },
    ChallengeSeed {
        code: "weekly_saved_words_15",
        title: "Word Harvest",
        description: "Save 15 new words this week",
        challenge_type: ChallengeType::Weekly,
        goal_type: GoalType::WeeklySavedWords,
        goal_value: 15,
        goal_topic: None,
        reward_stars: 15,
    },
];

const ACHIEVEMENTS: &[AchievementSeed] = &[
    AchievementSeed {
        code: "streak_3",
        title: "First Spark",
        description: "Practice 3 days in a row",
        category: AchievementCategory::Streak,
        threshold: 3,
        stars_reward: 10,
        is_hidden: false,
    },
    AchievementSeed {
        code: "streak_7",
        title: "One Full Week",
        description: "Practice 7 days in a row",
        category: AchievementCategory::Streak,
        threshold: 7,
        stars_reward: 25,
        is_hidden: false,
    },
    AchievementSeed {
        code: "streak_30",
        title: "Month of Momentum",
        description: "Practice 30 days in a row",
        category: AchievementCategory::Streak,
        threshold: 30,
        stars_reward: 100,
        is_hidden: false,
    },
    AchievementSeed {
        code: "streak_100",
        title: "Unstoppable",
        description: "Practice 100 days in a row",
        category: AchievementCategory::Streak,
        threshold: 100,
        stars_reward: 365,
        is_hidden: true,
    },
    AchievementSeed {
        code: "messages_10",
        title: "Breaking the Ice",
        description: "Send your first 10 messages",
        category: AchievementCategory::Messages,
        threshold: 10,
        stars_reward: 5,
        is_hidden: false,
    },
    AchievementSeed {
        code: "messages_100",
        title: "Conversationalist",
        description: "Send 100 messages",
        category: AchievementCategory::Messages,
        threshold: 100,
        stars_reward: 20,
        is_hidden: false,
    },
    AchievementSeed {
        code: "messages_1000",
        title: "Thousand Voices",
        description: "Send 1000 messages",
        category: AchievementCategory::Messages,
        threshold: 1000,
        stars_reward: 100,
        is_hidden: false,
    },
    AchievementSeed {
        code: "vocabulary_10",
        title: "Word Gatherer",
        description: "Save 10 words",
        category: AchievementCategory::Vocabulary,
        threshold: 10,
        stars_reward: 5,
        is_hidden: false,
    },
    AchievementSeed {
        code: "vocabulary_100",
        title: "Lexicon Builder",
        description: "Save 100 words",
        category: AchievementCategory::Vocabulary,
        threshold: 100,
        stars_reward: 25,
        is_hidden: false,
    },
    AchievementSeed {
        code: "vocabulary_500",
        title: "Living Dictionary",
        description: "Save 500 words",
        category: AchievementCategory::Vocabulary,
        threshold: 500,
        stars_reward: 75,
        is_hidden: false,
    },
    AchievementSeed {
        code: "stars_100",
        title: "Star Collector",
        description: "Earn 100 lifetime stars",
        category: AchievementCategory::Stars,
        threshold: 100,
        stars_reward: 10,
        is_hidden: false,
    },
    AchievementSeed {
        code: "stars_1000",
        title: "Constellation",
        description: "Earn 1000 lifetime stars",
        category: AchievementCategory::Stars,
        threshold: 1000,
        stars_reward: 50,
        is_hidden: false,
    },
    AchievementSeed {
        code: "mastery_10",
        title: "Taking Root",
        description: "Master 10 words",
        category: AchievementCategory::Mastery,
        threshold: 10,
        stars_reward: 15,
        is_hidden: false,
    },
    AchievementSeed {
        code: "mastery_50",
        title: "Deep Roots",
        description: "Master 50 words",
        category: AchievementCategory::Mastery,
        threshold: 50,
        stars_reward: 60,
        is_hidden: false,
    },
    AchievementSeed {
        code: "accuracy_90",
        title: "Sharp Ear",
        description: "Hold 90% accuracy over your last month of practice",
        category: AchievementCategory::Accuracy,
        threshold: 90,
        stars_reward: 40,
        is_hidden: false,
    },
    AchievementSeed {
        code: "accuracy_95",
        title: "Perfectionist",
        description: "Hold 95% accuracy over your last month of practice",
        category: AchievementCategory::Accuracy,
        threshold: 95,
        stars_reward: 80,
        is_hidden: true,
    },
];

/// Installs the default challenge and achievement catalogs. Existing codes
/// are left untouched, so the seeder can run on every startup.
pub async fn seed_catalogs(pool: &PgPool) -> Result<(), sqlx::Error> {
    let mut inserted_challenges = 0u64;
    for seed in CHALLENGES {
        let result = sqlx::query(
            r#"
            INSERT INTO "challenges"
                ("id", "code", "title", "description", "challengeType", "goalType",
                 "goalValue", "goalTopic", "rewardStars")
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT ("code") DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(seed.code)
        .bind(seed.title)
        .bind(seed.description)
        .bind(seed.challenge_type.as_str())
        .bind(seed.goal_type.as_str())
        .bind(seed.goal_value)
        .bind(seed.goal_topic)
        .bind(seed.reward_stars)
        .execute(pool)
        .await?;
        inserted_challenges += result.rows_affected();
    }

    let mut inserted_achievements = 0u64;
    for seed in ACHIEVEMENTS {
        let result = sqlx::query(
            r#"
            INSERT INTO "achievements"
                ("id", "code", "title", "description", "category", "threshold",
                 "starsReward", "isHidden")
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT ("code") DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(seed.code)
        .bind(seed.title)
        .bind(seed.description)
        .bind(seed.category.as_str())
        .bind(seed.threshold)
        .bind(seed.stars_reward)
        .bind(seed.is_hidden)
        .execute(pool)
        .await?;
        inserted_achievements += result.rows_affected();
    }

    if inserted_challenges > 0 || inserted_achievements > 0 {
        tracing::info!(
            challenges = inserted_challenges,
            achievements = inserted_achievements,
            "seeded catalog definitions"
        );
    } else {
        tracing::debug!("catalogs already seeded");
    }

    Ok(())
}
