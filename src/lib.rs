//! # craftkernel
//!
//! A cooperative concurrency kernel for long-running automation hosts.
//!
//! The kernel gives every subsystem of a host (storage, indexing, UI,
//! networking, sound) three shared services so none of them blocks another:
//!
//! - **Scheduler**: named worker pools, each a fixed set of OS threads
//!   draining one FIFO queue. `submit` returns a [`TaskFuture`] that settles
//!   exactly once.
//! - **EventBus**: pattern-keyed publish/subscribe with immediate dispatch, a
//!   bounded history, a bounded redelivery queue and suppression of
//!   high-frequency "transient" event names.
//! - **TimeWheel**: sixty one-second slots for coarse delayed callbacks.
//!
//! ## Core Problem Solved
//!
//! A host running many independent subsystems needs:
//!
//! - **Isolation**: a slow disk scan must not stall UI refresh work
//! - **Loose coupling**: subsystems observe each other through events rather
//!   than direct calls
//! - **Failure containment**: a failing task or listener must never take the
//!   kernel down
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use craftkernel::builders::KernelBuilder;
//! use serde_json::json;
//!
//! # fn main() -> craftkernel::core::AppResult<()> {
//! let kernel = KernelBuilder::new().build()?;
//! kernel.start()?;
//!
//! kernel.bus().subscribe("^task%.end$", |event| {
//!     println!("finished: {}", event.data);
//!     Ok(())
//! })?;
//!
//! let answer = kernel.scheduler().submit("io", "compute", || Ok(6 * 7))?;
//! assert_eq!(answer.wait()?, 42);
//!
//! kernel.wheel().schedule(3, || println!("three seconds later"));
//! kernel.bus().publish("storage.changed", json!({ "slot": 4 }));
//!
//! kernel.shutdown();
//! # Ok(())
//! # }
//! ```
//!
//! For complete examples, see `tests/kernel_test.rs`.

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Scheduler, worker pools, task futures and error types.
pub mod core;
/// Publish/subscribe event bus.
pub mod bus;
/// Coarse time wheel.
pub mod timer;
/// Configuration models for pools, the bus, the wheel and pumps.
pub mod config;
/// Builders to construct a kernel from configuration.
pub mod builders;
/// Kernel lifecycle and diagnostics.
pub mod runtime;
/// Shared utilities.
pub mod util;

pub use crate::builders::KernelBuilder;
pub use crate::bus::{Event, EventBus, EventSink};
pub use crate::config::KernelConfig;
pub use crate::core::{Scheduler, TaskError, TaskFuture};
pub use crate::runtime::Kernel;
pub use crate::timer::TimeWheel;
