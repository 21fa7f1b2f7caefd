//! Builder assembling a [`Kernel`] from configuration.

use std::sync::Arc;

use tracing::debug;

use crate::bus::{EventBus, EventSink};
use crate::config::{BusConfig, KernelConfig, PoolConfig, WheelConfig};
use crate::core::error::KernelError;
use crate::core::Scheduler;
use crate::runtime::Kernel;
use crate::timer::TimeWheel;

/// Fluent builder for [`Kernel`].
#[derive(Debug, Clone, Default)]
pub struct KernelBuilder {
    config: KernelConfig,
}

impl KernelBuilder {
    /// Builder seeded with the stock configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder seeded with `config`.
    #[must_use]
    pub const fn from_config(config: KernelConfig) -> Self {
        Self { config }
    }

    /// Builder with no pools; add them with [`with_pool`](Self::with_pool).
    #[must_use]
    pub fn empty() -> Self {
        let mut config = KernelConfig::default();
        config.pools.clear();
        Self { config }
    }

    /// Add or replace a pool with `workers` workers.
    #[must_use]
    pub fn with_pool(mut self, name: impl Into<String>, workers: usize) -> Self {
        self.config
            .pools
            .insert(name.into(), PoolConfig::with_workers(workers));
        self
    }

    /// Add or replace a pool with a full configuration.
    #[must_use]
    pub fn with_pool_config(mut self, name: impl Into<String>, pool: PoolConfig) -> Self {
        self.config.pools.insert(name.into(), pool);
        self
    }

    /// Replace the bus settings.
    #[must_use]
    pub fn with_bus(mut self, bus: BusConfig) -> Self {
        self.config.bus = bus;
        self
    }

    /// Replace the wheel settings.
    #[must_use]
    pub const fn with_wheel(mut self, wheel: WheelConfig) -> Self {
        self.config.wheel = wheel;
        self
    }

    /// Set the event pump interval.
    #[must_use]
    pub const fn with_pump_interval_millis(mut self, millis: u64) -> Self {
        self.config.pump.interval_millis = millis;
        self
    }

    /// Validate the configuration and create every component.
    ///
    /// Pools are created in name order, each publishing
    /// `scheduler.poolCreated`. Nothing is started.
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::Config`] for invalid configuration,
    /// [`KernelError::Bus`] for a malformed transient pattern and
    /// [`KernelError::Scheduler`] if a pool cannot be created.
    pub fn build(self) -> Result<Kernel, KernelError> {
        let config = self.config;
        config.validate()?;

        let bus = Arc::new(EventBus::new(config.bus.clone())?);
        let sink: Arc<dyn EventSink> = bus.clone();
        let scheduler = Arc::new(Scheduler::new(Arc::clone(&sink)));
        for (name, pool) in &config.pools {
            scheduler.create_pool_with(name, pool.clone())?;
        }
        let wheel = Arc::new(TimeWheel::new(config.wheel.clone(), Some(sink)));

        debug!(pools = config.pools.len(), "kernel assembled");
        Ok(Kernel::from_parts(config, bus, scheduler, wheel))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::POOL_CREATED;

    #[test]
    fn test_build_creates_configured_pools() {
        let kernel = KernelBuilder::empty()
            .with_pool("io", 2)
            .with_pool("ui", 1)
            .build()
            .unwrap();

        assert_eq!(kernel.scheduler().pool_names(), vec!["io", "ui"]);
        assert_eq!(kernel.bus().event_types()[POOL_CREATED], 2);
        assert!(!kernel.is_running());
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let err = KernelBuilder::empty().build().unwrap_err();
        assert!(matches!(err, KernelError::Config(_)));

        let err = KernelBuilder::empty().with_pool("io", 0).build().unwrap_err();
        assert!(matches!(err, KernelError::Config(_)));
    }
}
