//! Property-based tests for the SM-2 scheduler invariants:
//! - the ease factor never leaves [1.3, 3.0]
//! - intervals never leave [1, 365]
//! - AGAIN always collapses the interval to 1

use chrono::NaiveDate;
use proptest::prelude::*;

use lingo_progress::services::spaced_repetition::{
    next_ease_factor, schedule_next, CardState, ReviewQuality, MAX_EASE_FACTOR, MAX_INTERVAL_DAYS,
    MIN_EASE_FACTOR,
};

fn arb_quality() -> impl Strategy<Value = ReviewQuality> {
    prop_oneof![
        Just(ReviewQuality::Again),
        Just(ReviewQuality::Hard),
        Just(ReviewQuality::Good),
        Just(ReviewQuality::Easy),
    ]
}

fn arb_card_state() -> impl Strategy<Value = CardState> {
    (
        MIN_EASE_FACTOR..=MAX_EASE_FACTOR,
        1i32..=MAX_INTERVAL_DAYS,
        0i32..=200,
    )
        .prop_map(|(ease_factor, interval_days, review_count)| CardState {
            ease_factor,
            interval_days,
            review_count,
        })
}

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
}

proptest! {
    #[test]
    fn single_review_stays_in_bounds(state in arb_card_state(), quality in arb_quality()) {
        let scheduled = schedule_next(&state, quality, today());

        prop_assert!(scheduled.ease_factor >= MIN_EASE_FACTOR);
        prop_assert!(scheduled.ease_factor <= MAX_EASE_FACTOR);
        prop_assert!(scheduled.interval_days >= 1);
        prop_assert!(scheduled.interval_days <= MAX_INTERVAL_DAYS);
        prop_assert_eq!(
            scheduled.next_review_date,
            today() + chrono::Duration::days(scheduled.interval_days as i64)
        );
    }

    #[test]
    fn again_always_resets_interval(state in arb_card_state()) {
        let scheduled = schedule_next(&state, ReviewQuality::Again, today());
        prop_assert_eq!(scheduled.interval_days, 1);
    }

    #[test]
    fn review_sequences_never_escape_bounds(
        qualities in proptest::collection::vec(arb_quality(), 1..80)
    ) {
        let mut state = CardState::default();

        for quality in qualities {
            let scheduled = schedule_next(&state, quality, today());

            prop_assert!(scheduled.ease_factor >= MIN_EASE_FACTOR);
            prop_assert!(scheduled.ease_factor <= MAX_EASE_FACTOR);
            prop_assert!(scheduled.interval_days >= 1);
            prop_assert!(scheduled.interval_days <= MAX_INTERVAL_DAYS);

            if quality == ReviewQuality::Again {
                prop_assert_eq!(scheduled.interval_days, 1);
            }

            state = CardState {
                ease_factor: scheduled.ease_factor,
                interval_days: scheduled.interval_days,
                review_count: state.review_count + 1,
            };
        }
    }

    #[test]
    fn ease_factor_adjustment_is_clamped(ease in 0.5f64..=4.0, quality in arb_quality()) {
        let adjusted = next_ease_factor(ease, quality);
        prop_assert!(adjusted >= MIN_EASE_FACTOR);
        prop_assert!(adjusted <= MAX_EASE_FACTOR);
    }
}
