//! Builders to construct kernel components from configuration.

pub mod kernel_builder;

pub use kernel_builder::KernelBuilder;
