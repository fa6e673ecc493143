// tests/property/backoff_test.rs

//! Property-based tests for the reconnect backoff schedule

use linebroker::core::upstream::Backoff;
use proptest::prelude::*;
use std::time::Duration;

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 200,
        ..ProptestConfig::default()
    })]

    #[test]
    fn test_backoff_is_monotonic_and_bounded(
        min_ms in 1u64..5_000,
        extra_ms in 0u64..120_000,
        steps in 0usize..40
    ) {
        let min = Duration::from_millis(min_ms);
        let max = Duration::from_millis(min_ms + extra_ms);
        let mut backoff = Backoff::new(min, max);

        let mut previous = backoff.current();
        prop_assert_eq!(previous, min);
        for _ in 0..steps {
            backoff.advance();
            let current = backoff.current();
            prop_assert!(current >= previous);
            prop_assert!(current <= max);
            prop_assert!(current == max || current == previous * 2);
            previous = current;
        }

        backoff.reset();
        prop_assert_eq!(backoff.current(), min);
    }

    #[test]
    fn test_backoff_reaches_cap(min_ms in 1u64..1_000, factor in 1u64..64) {
        let min = Duration::from_millis(min_ms);
        let max = Duration::from_millis(min_ms * factor);
        let mut backoff = Backoff::new(min, max);
        // Doubling from min passes any cap within 64 steps.
        for _ in 0..64 {
            backoff.advance();
        }
        prop_assert_eq!(backoff.current(), max);
    }
}
