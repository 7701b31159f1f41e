// SPDX-License-Identifier: Apache-2.0 OR MIT

use ::std::time::Duration;

use ::tokio_waitfor::WaitForConfig;
use ::tokio_waitfor::config::{DEFAULT_INTERVAL, MIN_INTERVAL};

#[test]
fn default_polls_every_50ms_forever() {
    let config = WaitForConfig::default();
    assert_eq!(config.interval(), Duration::from_millis(50));
    assert_eq!(config.interval(), DEFAULT_INTERVAL);
    assert_eq!(config.timeout(), None);
}

#[test]
fn short_intervals_are_clamped() {
    assert_eq!(WaitForConfig::new(Duration::ZERO, None).interval(), MIN_INTERVAL);
    assert_eq!(WaitForConfig::from_millis(-5, None).interval(), MIN_INTERVAL);
    assert_eq!(
        WaitForConfig::default()
            .with_interval(Duration::from_micros(10))
            .interval(),
        MIN_INTERVAL
    );
}

#[test]
fn falsy_timeout_means_no_timeout() {
    assert_eq!(WaitForConfig::from_millis(10, Some(0)).timeout(), None);
    assert_eq!(WaitForConfig::from_millis(10, Some(-1)).timeout(), None);
    assert_eq!(
        WaitForConfig::default().with_timeout(Duration::ZERO).timeout(),
        None
    );
    assert_eq!(
        WaitForConfig::from_millis(10, Some(250)).timeout(),
        Some(Duration::from_millis(250))
    );
}

#[test]
fn equality_uses_normalised_values() {
    assert_eq!(
        WaitForConfig::from_millis(0, Some(0)),
        WaitForConfig::new(MIN_INTERVAL, None)
    );
    assert_ne!(
        WaitForConfig::from_millis(10, Some(100)),
        WaitForConfig::from_millis(10, Some(100)).without_timeout()
    );
}

#[cfg(feature = "serde")]
mod serde {
    use super::*;

    #[test]
    fn deserializes_millisecond_fields() {
        let config: WaitForConfig =
            ::serde_json::from_str(r#"{ "interval_ms": 20, "timeout_ms": 500 }"#)
                .expect("config should parse");
        assert_eq!(
            config,
            WaitForConfig::new(Duration::from_millis(20), Some(Duration::from_millis(500)))
        );
    }

    #[test]
    fn missing_fields_take_defaults() {
        let config: WaitForConfig =
            ::serde_json::from_str("{}").expect("empty config should parse");
        assert_eq!(config, WaitForConfig::default());
    }

    #[test]
    fn falsy_values_are_normalised() {
        let config: WaitForConfig =
            ::serde_json::from_str(r#"{ "interval_ms": -3, "timeout_ms": 0 }"#)
                .expect("config should parse");
        assert_eq!(config, WaitForConfig::new(MIN_INTERVAL, None));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result = ::serde_json::from_str::<WaitForConfig>(r#"{ "interval": 20 }"#);
        assert!(result.is_err());
    }

    #[test]
    fn sub_millisecond_durations_round_up() {
        let config = WaitForConfig::new(
            Duration::from_micros(1500),
            Some(Duration::from_micros(500)),
        );
        let json = ::serde_json::to_string(&config).expect("config should serialize");
        let parsed: WaitForConfig = ::serde_json::from_str(&json).expect("config should parse");

        assert_eq!(parsed.interval(), Duration::from_millis(2));
        assert_eq!(parsed.timeout(), Some(Duration::from_millis(1)));
    }

    #[test]
    fn whole_milliseconds_survive_serialization() {
        let config = WaitForConfig::from_millis(20, Some(500));
        let json = ::serde_json::to_string(&config).expect("config should serialize");
        let parsed: WaitForConfig = ::serde_json::from_str(&json).expect("config should parse");
        assert_eq!(parsed, config);
    }

    #[test]
    fn serializes_as_milliseconds() {
        let config = WaitForConfig::from_millis(75, None);
        let json = ::serde_json::to_value(config).expect("config should serialize");
        assert_eq!(
            json,
            ::serde_json::json!({ "interval_ms": 75, "timeout_ms": null })
        );
    }
}
