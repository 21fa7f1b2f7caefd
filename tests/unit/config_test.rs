//! Tests for configuration validation

use craftkernel::config::{BusConfig, KernelConfig, PoolConfig, WheelConfig};
use craftkernel::core::ConfigError;

#[test]
fn test_pool_config_validation() {
    assert!(PoolConfig::with_workers(4).validate().is_ok());
    assert!(PoolConfig::with_workers(0).validate().is_err());
}

#[test]
fn test_pool_config_stack_size_minimum() {
    let tiny = PoolConfig {
        workers: 1,
        stack_size: Some(4096),
    };
    assert!(tiny.validate().is_err());

    let roomy = PoolConfig {
        workers: 1,
        stack_size: Some(2 * 1024 * 1024),
    };
    assert!(roomy.validate().is_ok());
}

#[test]
fn test_bus_config_invalid_batch() {
    let invalid = BusConfig {
        batch_size: 0,
        ..BusConfig::default()
    };
    assert!(invalid.validate().is_err());
}

#[test]
fn test_wheel_config_invalid() {
    let no_slots = WheelConfig {
        slot_count: 0,
        tick_millis: 1000,
    };
    assert!(no_slots.validate().is_err());

    let no_tick = WheelConfig {
        slot_count: 60,
        tick_millis: 0,
    };
    assert!(no_tick.validate().is_err());
}

#[test]
fn test_kernel_config_requires_a_pool() {
    let mut cfg = KernelConfig::default();
    cfg.pools.clear();
    assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
}

#[test]
fn test_empty_json_yields_defaults() {
    let cfg = KernelConfig::from_json_str("{}").expect("empty object is valid");
    assert_eq!(cfg, KernelConfig::default());
}

#[test]
fn test_partial_json_keeps_section_defaults() {
    let cfg = KernelConfig::from_json_str(
        r#"{ "bus": { "history_capacity": 10 }, "wheel": { "tick_millis": 250 } }"#,
    )
    .expect("partial config is valid");
    assert_eq!(cfg.bus.history_capacity, 10);
    assert_eq!(cfg.bus.queue_capacity, 50);
    assert_eq!(cfg.wheel.tick_millis, 250);
    assert_eq!(cfg.wheel.slot_count, 60);
}

#[test]
fn test_malformed_json_is_parse_error() {
    let err = KernelConfig::from_json_str("{ pools: ").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn test_invalid_pool_in_json_names_pool() {
    let err = KernelConfig::from_json_str(r#"{ "pools": { "io": { "workers": 0 } } }"#)
        .unwrap_err();
    assert!(err.to_string().contains("io"));
}

#[test]
fn test_from_json_file() {
    let path = std::env::temp_dir().join(format!("craftkernel-config-{}.json", std::process::id()));
    std::fs::write(&path, r#"{ "pools": { "net": { "workers": 6 } } }"#).expect("write config");
    let cfg = KernelConfig::from_json_file(&path).expect("config file loads");
    let _ = std::fs::remove_file(&path);
    assert_eq!(cfg.pools["net"].workers, 6);

    let missing = KernelConfig::from_json_file("/definitely/not/here.json").unwrap_err();
    assert!(matches!(missing, ConfigError::Io(_)));
}
