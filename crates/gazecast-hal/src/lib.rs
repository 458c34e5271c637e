//! `gazecast-hal` – eye-tracker driver boundary.
//!
//! # Modules
//!
//! - [`driver`] – the [`EyeTrackerDriver`][driver::EyeTrackerDriver] trait
//!   every native driver binding implements, plus its handle and status
//!   types.
//! - [`mailbox`] – [`SampleMailbox`][mailbox::SampleMailbox]: single-slot
//!   latch between the driver's delivery context and the tick loop.
//! - [`connection`] – [`DeviceConnection`][connection::DeviceConnection]:
//!   open, tick, throttled reconnect and close for one device.
//! - [`sim`] – [`SimDriver`][sim::SimDriver]: scripted in-process driver for
//!   tests and headless runs.

pub mod connection;
pub mod driver;
pub mod mailbox;
pub mod sim;

pub use connection::{ConnectionConfig, DeviceConnection};
pub use driver::{DriverError, EyeTrackerDriver};
pub use sim::SimDriver;
