use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

pub const MIN_EASE_FACTOR: f64 = 1.3;
pub const MAX_EASE_FACTOR: f64 = 3.0;
pub const MAX_INTERVAL_DAYS: i32 = 365;

const SECOND_INTERVAL_DAYS: i32 = 6;
const EASY_INTERVAL_MULTIPLIER: f64 = 1.3;
const HARD_INTERVAL_MULTIPLIER: f64 = 0.6;

/// Review outcome reported by the caller. Mapped internally onto the
/// classical SM-2 quality scale {0, 2, 4, 5}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewQuality {
    Again,
    Hard,
    Good,
    Easy,
}

impl ReviewQuality {
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Again),
            1 => Some(Self::Hard),
            2 => Some(Self::Good),
            3 => Some(Self::Easy),
            _ => None,
        }
    }

    pub fn as_i32(self) -> i32 {
        match self {
            Self::Again => 0,
            Self::Hard => 1,
            Self::Good => 2,
            Self::Easy => 3,
        }
    }

    fn sm2_grade(self) -> f64 {
        match self {
            Self::Again => 0.0,
            Self::Hard => 2.0,
            Self::Good => 4.0,
            Self::Easy => 5.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CardState {
    pub ease_factor: f64,
    pub interval_days: i32,
    pub review_count: i32,
}

impl Default for CardState {
    fn default() -> Self {
        Self {
            ease_factor: 2.5,
            interval_days: 1,
            review_count: 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Scheduled {
    pub ease_factor: f64,
    pub interval_days: i32,
    pub next_review_date: NaiveDate,
}

pub fn next_ease_factor(ease_factor: f64, quality: ReviewQuality) -> f64 {
    let q = quality.sm2_grade();
    let adjusted = ease_factor + (0.1 - (5.0 - q) * (0.08 + (5.0 - q) * 0.02));
    adjusted.clamp(MIN_EASE_FACTOR, MAX_EASE_FACTOR)
}

/// Computes the next review schedule for a card. Pure: no I/O, fully
/// determined by the inputs.
pub fn schedule_next(state: &CardState, quality: ReviewQuality, today: NaiveDate) -> Scheduled {
    let ease_factor = next_ease_factor(state.ease_factor, quality);

    let base_interval = if quality == ReviewQuality::Again {
        1
    } else if state.review_count == 0 {
        1
    } else if state.review_count == 1 {
        SECOND_INTERVAL_DAYS
    } else {
        (state.interval_days as f64 * ease_factor).round() as i32
    };

    let adjusted = match quality {
        ReviewQuality::Easy => (base_interval as f64 * EASY_INTERVAL_MULTIPLIER).round() as i32,
        ReviewQuality::Hard => {
            ((base_interval as f64 * HARD_INTERVAL_MULTIPLIER).round() as i32).max(1)
        }
        _ => base_interval,
    };

    let interval_days = adjusted.clamp(1, MAX_INTERVAL_DAYS);

    Scheduled {
        ease_factor,
        interval_days,
        next_review_date: today + Duration::days(interval_days as i64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn test_good_review_keeps_ease_factor_at_default() {
        // EF 2.5, interval 6, third review, GOOD: EF' = 2.5, interval = 15.
        let state = CardState {
            ease_factor: 2.5,
            interval_days: 6,
            review_count: 2,
        };
        let result = schedule_next(&state, ReviewQuality::Good, date(2025, 1, 15));
        assert!((result.ease_factor - 2.5).abs() < 1e-9);
        assert_eq!(result.interval_days, 15);
        assert_eq!(result.next_review_date, date(2025, 1, 30));
    }

    #[test]
    fn test_again_always_resets_interval() {
        let state = CardState {
            ease_factor: 2.8,
            interval_days: 180,
            review_count: 9,
        };
        let result = schedule_next(&state, ReviewQuality::Again, date(2025, 3, 1));
        assert_eq!(result.interval_days, 1);
        assert_eq!(result.next_review_date, date(2025, 3, 2));
    }

    #[test]
    fn test_first_two_reviews_use_fixed_intervals() {
        let fresh = CardState::default();
        let first = schedule_next(&fresh, ReviewQuality::Good, date(2025, 1, 1));
        assert_eq!(first.interval_days, 1);

        let second_state = CardState {
            ease_factor: first.ease_factor,
            interval_days: first.interval_days,
            review_count: 1,
        };
        let second = schedule_next(&second_state, ReviewQuality::Good, date(2025, 1, 2));
        assert_eq!(second.interval_days, 6);
    }

    #[test]
    fn test_ease_factor_clamped_low() {
        // AGAIN subtracts 0.8 before the clamp.
        assert!((next_ease_factor(1.3, ReviewQuality::Again) - MIN_EASE_FACTOR).abs() < 1e-9);
        assert!((next_ease_factor(1.5, ReviewQuality::Again) - MIN_EASE_FACTOR).abs() < 1e-9);
    }

    #[test]
    fn test_ease_factor_clamped_high() {
        assert!((next_ease_factor(3.0, ReviewQuality::Easy) - MAX_EASE_FACTOR).abs() < 1e-9);
    }

    #[test]
    fn test_interval_capped_at_one_year() {
        let state = CardState {
            ease_factor: 3.0,
            interval_days: 300,
            review_count: 12,
        };
        let result = schedule_next(&state, ReviewQuality::Good, date(2025, 6, 1));
        assert_eq!(result.interval_days, MAX_INTERVAL_DAYS);
    }

    #[test]
    fn test_hard_shrinks_interval_with_floor() {
        let state = CardState {
            ease_factor: 2.5,
            interval_days: 10,
            review_count: 4,
        };
        let result = schedule_next(&state, ReviewQuality::Hard, date(2025, 1, 1));
        // HARD: EF' = 2.5 - 0.32 = 2.18; base = round(10 * 2.18) = 22; * 0.6 = 13.
        assert_eq!(result.interval_days, 13);

        let fresh = schedule_next(&CardState::default(), ReviewQuality::Hard, date(2025, 1, 1));
        assert_eq!(fresh.interval_days, 1);
    }

    #[test]
    fn test_easy_stretches_interval() {
        let state = CardState {
            ease_factor: 2.0,
            interval_days: 10,
            review_count: 4,
        };
        let result = schedule_next(&state, ReviewQuality::Easy, date(2025, 1, 1));
        // EASY: EF' = 2.1; base = round(10 * 2.1) = 21; * 1.3 = 27.3 -> 27.
        assert_eq!(result.interval_days, 27);
    }

    #[test]
    fn test_quality_parsing_bounds() {
        assert_eq!(ReviewQuality::from_i32(0), Some(ReviewQuality::Again));
        assert_eq!(ReviewQuality::from_i32(3), Some(ReviewQuality::Easy));
        assert_eq!(ReviewQuality::from_i32(4), None);
        assert_eq!(ReviewQuality::from_i32(-1), None);
    }
}
