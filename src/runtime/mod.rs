//! Kernel assembly, lifecycle and diagnostics.

pub mod diagnostics;
pub mod kernel;

pub use diagnostics::{Health, KernelSnapshot};
pub use kernel::Kernel;
