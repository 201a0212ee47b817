use std::time::Duration;

use buildwarden::retry::{backoff_delay, RetryPolicy, MAX_BACKOFF};
use proptest::prelude::*;

fn policy_strategy() -> impl Strategy<Value = RetryPolicy> {
    (1u32..10, 1u64..5_000, 0u64..2_000, 1u64..120_000).prop_map(
        |(attempts, base_ms, jitter_ms, max_ms)| {
            RetryPolicy::attempts(attempts)
                .with_base_delay(Duration::from_millis(base_ms))
                .with_max_jitter(Duration::from_millis(jitter_ms))
                .with_max_delay(Duration::from_millis(max_ms))
        },
    )
}

fn uncapped(policy: &RetryPolicy, attempt: u32) -> Duration {
    policy.base_delay.saturating_mul(1u32 << (attempt - 1).min(31))
}

proptest! {
    #[test]
    fn delay_never_exceeds_hard_cap(policy in policy_strategy(), attempt in 1u32..64) {
        let delay = policy.delay_for(attempt);
        prop_assert!(delay <= MAX_BACKOFF);
        prop_assert!(delay <= policy.max_delay);
    }

    #[test]
    fn delay_without_jitter_is_non_decreasing(policy in policy_strategy(), attempt in 1u32..40) {
        let current = backoff_delay(&policy, attempt, Duration::ZERO);
        let next = backoff_delay(&policy, attempt + 1, Duration::ZERO);
        prop_assert!(current <= next, "attempt {attempt}: {current:?} > {next:?}");
    }

    #[test]
    fn jitter_stays_below_its_bound(policy in policy_strategy(), attempt in 1u32..12) {
        let delay = policy.delay_for(attempt);
        let floor = uncapped(&policy, attempt).min(policy.max_delay);
        prop_assert!(delay >= floor, "{delay:?} below {floor:?}");
        if !policy.max_jitter.is_zero() {
            prop_assert!(delay < uncapped(&policy, attempt) + policy.max_jitter);
        }
    }

    #[test]
    fn explicit_jitter_is_added_before_capping(
        base_ms in 1u64..1_000,
        attempt in 1u32..6,
        jitter_ms in 0u64..1_000,
    ) {
        let policy = RetryPolicy::attempts(10).with_base_delay(Duration::from_millis(base_ms));
        let jitter = Duration::from_millis(jitter_ms);
        let expected = (uncapped(&policy, attempt) + jitter).min(MAX_BACKOFF);
        prop_assert_eq!(backoff_delay(&policy, attempt, jitter), expected);
    }
}

#[test]
fn max_delay_setter_clamps_to_hard_cap() {
    let policy = RetryPolicy::default().with_max_delay(Duration::from_secs(600));
    assert_eq!(policy.max_delay, MAX_BACKOFF);
}

#[test]
fn zero_attempts_still_runs_once() {
    assert_eq!(RetryPolicy::attempts(0).effective_attempts(), 1);
}
