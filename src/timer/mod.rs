//! Coarse timer for delayed callbacks.

pub mod time_wheel;

pub use time_wheel::{TickReport, TimeWheel, WheelCallback, WheelSnapshot, WheelState};
