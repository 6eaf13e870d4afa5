//! Property-based tests for settings validation and conversion

use std::time::Duration;

use portwarden_config::RunnerSettings;
use proptest::prelude::*;

/// Strategy for settings whose every numeric field is usable
fn valid_settings() -> impl Strategy<Value = RunnerSettings> {
    (
        (1u64..60_000, 1u64..60_000, 1u64..60_000, 1u64..60_000),
        (1u32..1_000, 1u32..100, 0u64..60_000),
        (prop::option::of(1u16..=u16::MAX), "[a-z:/.]{1,24}"),
    )
        .prop_map(
            |(
                (monitor, readiness_interval, probe_timeout, kill_grace),
                (attempts, hang_threshold, respawn_delay),
                (port, startup_target),
            )| RunnerSettings {
                port,
                startup_target,
                monitor_interval_ms: monitor,
                readiness_attempts: attempts,
                readiness_interval_ms: readiness_interval,
                probe_timeout_ms: probe_timeout,
                respawn_delay_ms: respawn_delay,
                hang_threshold,
                kill_grace_ms: kill_grace,
                ..Default::default()
            },
        )
}

/// Valid settings always pass validation and keep their values in the launch config
#[test]
fn prop_valid_settings_convert_faithfully() {
    proptest!(|(settings in valid_settings())| {
        prop_assert!(settings.validate().is_ok());

        let config = settings.to_launch_config();
        prop_assert_eq!(config.port, settings.port);
        prop_assert_eq!(&config.startup_target, &settings.startup_target);
        prop_assert_eq!(config.monitor_interval, Duration::from_millis(settings.monitor_interval_ms));
        prop_assert_eq!(config.readiness_attempts, settings.readiness_attempts);
        prop_assert_eq!(config.readiness_interval, Duration::from_millis(settings.readiness_interval_ms));
        prop_assert_eq!(config.probe_timeout, Duration::from_millis(settings.probe_timeout_ms));
        prop_assert_eq!(config.respawn_delay, Duration::from_millis(settings.respawn_delay_ms));
        prop_assert_eq!(config.hang_threshold, settings.hang_threshold);
        prop_assert_eq!(config.kill_grace, Duration::from_millis(settings.kill_grace_ms));
    });
}

/// A single zeroed interval is enough to reject otherwise valid settings
#[test]
fn prop_zero_interval_is_rejected() {
    proptest!(|(settings in valid_settings(), field in 0usize..4)| {
        let mut settings = settings;
        match field {
            0 => settings.monitor_interval_ms = 0,
            1 => settings.readiness_interval_ms = 0,
            2 => settings.probe_timeout_ms = 0,
            _ => settings.kill_grace_ms = 0,
        }
        prop_assert!(settings.validate().is_err());
    });
}
