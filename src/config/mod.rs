//! Configuration models for pools, the event bus, the time wheel and pumps.

pub mod kernel;

pub use kernel::{BusConfig, KernelConfig, PoolConfig, PumpConfig, WheelConfig};
