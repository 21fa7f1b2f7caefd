//! Tests for builder modules

use craftkernel::builders::KernelBuilder;
use craftkernel::config::{BusConfig, PoolConfig};
use craftkernel::core::KernelError;

#[test]
fn test_kernel_builder_defaults() {
    let kernel = KernelBuilder::new().build().expect("default kernel builds");
    assert_eq!(kernel.config().pools.len(), 8);
    assert_eq!(kernel.wheel().slot_count(), 60);
}

#[test]
fn test_kernel_builder_pool_config() {
    let kernel = KernelBuilder::empty()
        .with_pool_config(
            "index",
            PoolConfig {
                workers: 2,
                stack_size: Some(256 * 1024),
            },
        )
        .build()
        .expect("kernel builds");
    let stats = kernel.scheduler().pool_stats("index").expect("pool exists");
    assert_eq!(stats.worker_count, 2);
    assert!(!stats.running);
}

#[test]
fn test_kernel_builder_rejects_bad_transient_pattern() {
    let bus = BusConfig {
        transient_patterns: vec!["[unclosed".into()],
        ..BusConfig::default()
    };
    let err = KernelBuilder::new().with_bus(bus).build().unwrap_err();
    assert!(matches!(err, KernelError::Bus(_)));
}
