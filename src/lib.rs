//! Bit-banged ARM Serial Wire Debug host for FTDI USB bridges.
//!
//! This crate drives a target's Debug Access Port over plain GPIO bitbang
//! on an FT2232-family bridge, with no debug-probe firmware involved. Wire
//! operations are built as pure [`swd`] requests, queued to a dedicated
//! executor thread that owns the GPIO and keeps SWCLK alive, and decoded
//! with the [`decode`] helpers.
//!
//! **Note:**
//! This is strictly a development tool. The clock is software-timed (about
//! 500 Hz by default), which is fine for poking a DAP and reading memory,
//! and useless for anything high-throughput.
//!
//! # Hardware connection
//!
//! * SWCLK: AD0 (pin mask 0x01)
//! * SWDIO: AD1 (pin mask 0x02)
//! * VCC: 3.3V, GND: ground
//!
//! Both pin masks and the clock rate are configurable through
//! [`ExecutorConfig`].
//!
//! # Quickstart
//!
//! * Linux users only: Add [udev rules].
//! * See the `swdinit` example for interface bring-up.

#![forbid(unsafe_code)]

pub mod bits;
pub mod decode;
mod executor;
mod ftdaye;
mod gpio;
mod list;
pub mod swd;

pub use executor::{Executor, ExecutorConfig, Response, SwdHost};
pub use ftdaye::{FtdiError, Interface};
pub use gpio::{FtdiGpio, GpioPort};
pub use list::{FtdiDeviceInfo, all_devices};
pub use swd::{Action, Request, SwdError};
