//! Property tests for runner invariants.
//!
//! Uses proptest to verify:
//! 1. Slot alignment: every instant maps to the slot that contains it
//! 2. Config validation: out-of-range leverage and sizing always fail fast
//! 3. Fingerprint: stable for equal configs, blind to the bot token

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use swingtrader_core::domain::{CandleInterval, RunId};
use swingtrader_runner::{slot_start, AgentConfig, ConfigError};

fn arb_interval() -> impl Strategy<Value = CandleInterval> {
    prop::sample::select(CandleInterval::ALL.to_vec())
}

// ── 1. Slot alignment ────────────────────────────────────────────────

proptest! {
    #[test]
    fn slot_contains_instant(secs in 1_500_000_000i64..2_000_000_000, interval in arb_interval()) {
        let now = Utc.timestamp_opt(secs, 0).unwrap();
        let slot = slot_start(now, interval);
        prop_assert!(slot <= now);
        prop_assert!(now < slot + interval.duration());
        prop_assert_eq!(slot.timestamp() % (i64::from(interval.minutes()) * 60), 0);
    }

    #[test]
    fn same_slot_same_run_id(secs in 1_500_000_000i64..2_000_000_000, offset in 0i64..3600) {
        let slot = slot_start(Utc.timestamp_opt(secs, 0).unwrap(), CandleInterval::H1);
        let later = slot + Duration::seconds(offset);
        prop_assert_eq!(
            RunId::for_slot("ADAUSD", slot_start(later, CandleInterval::H1)),
            RunId::for_slot("ADAUSD", slot)
        );
    }
}

// ── 2. Config validation ─────────────────────────────────────────────

proptest! {
    #[test]
    fn leverage_outside_bounds_is_rejected(leverage in prop_oneof![Just(0u8), 6u8..=255]) {
        let mut config = AgentConfig::default();
        config.sizing.leverage = leverage;
        let rejected = matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "sizing.leverage", .. })
        );
        prop_assert!(rejected);
    }

    #[test]
    fn position_fraction_above_one_is_rejected(pct in 1.0001f64..100.0) {
        let mut config = AgentConfig::default();
        config.sizing.position_size_pct = pct;
        prop_assert!(config.validate().is_err());
    }

    #[test]
    fn in_range_sizing_is_accepted(pct in 0.0f64..=1.0, leverage in 1u8..=5) {
        let mut config = AgentConfig::default();
        config.sizing.position_size_pct = pct;
        config.sizing.leverage = leverage;
        prop_assert!(config.validate().is_ok());
    }
}

// ── 3. Fingerprint ───────────────────────────────────────────────────

proptest! {
    #[test]
    fn fingerprint_ignores_token(token in "[A-Za-z0-9:_-]{8,48}") {
        let base = AgentConfig::default();
        let mut with_token = base.clone();
        with_token.notify.telegram_bot_token = Some(token);
        let mut masked = base.clone();
        masked.notify.telegram_bot_token = Some("other-token".into());
        prop_assert_eq!(with_token.fingerprint(), masked.fingerprint());
        prop_assert_eq!(base.fingerprint().len(), 16);
    }
}
