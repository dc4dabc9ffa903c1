//! Peripheral drivers for NXP LPC23xx / LPC24xx microcontrollers
//!
//! `lpc24xx-periph` drives three on-chip peripherals:
//!
//! - [`i2c`], an interrupt-driven I2C master with blocking transfers,
//! - [`usb`], the full-speed USB device controller's endpoint engine,
//! - [`power`], sleep modes and watchdog-forced reset.
//!
//! The drivers don't own pins or the interrupt controller. They borrow
//! those services through a [`Platform`](platform::Platform) you supply.
//! Shared state is guarded with [`critical-section`], so your application
//! must provide a critical section implementation for the target.
//!
//! The [`api`] module wraps the drivers in table-style entry points that
//! report [`ResultCode`](api::ResultCode)s, for callers that manage
//! controllers by handle.
//!
//! # Example
//!
//! Write, then read, from an I2C EEPROM at address `0x50`.
//!
//! ```no_run
//! use lpc24xx_periph::{i2c, platform, ral};
//! # struct Board;
//! # impl platform::Platform for Board {
//! #     fn open_pin(&mut self, _: platform::Pin) -> bool { true }
//! #     fn configure_pin(&mut self, _: platform::Pin) {}
//! #     fn close_pin(&mut self, _: platform::Pin) {}
//! #     fn activate_interrupt(&mut self, _: platform::Interrupt) {}
//! #     fn deactivate_interrupt(&mut self, _: platform::Interrupt) {}
//! #     fn interrupts_masked() -> bool { false }
//! # }
//! # struct Delay;
//! # impl embedded_hal::delay::DelayNs for Delay { fn delay_ns(&mut self, _: u32) {} }
//!
//! static I2C0: i2c::I2c<Board> = i2c::I2c::new(
//!     // Safety: the only I2C0 instance.
//!     unsafe { ral::Instance::new(ral::i2c::I2C0 as *const _) },
//!     i2c::I2cPins::I2C0,
//!     platform::Interrupt::I2c0,
//!     Board,
//! );
//!
//! // In the I2C0 interrupt handler: I2C0.on_interrupt();
//!
//! I2C0.acquire().unwrap();
//! I2C0.set_active_settings(0x50, i2c::BusSpeed::Fast);
//!
//! let mut data = [0; 4];
//! let report = I2C0.write_read(&mut Delay, &[0x00, 0x10], &mut data).unwrap();
//! assert_eq!(report.status, i2c::TransferStatus::Full);
//! ```
//!
//! [`critical-section`]: https://crates.io/crates/critical-section

#![no_std]

#[cfg(test)]
extern crate std;

#[cfg(feature = "defmt-03")]
extern crate defmt_03 as defmt;

#[macro_use]
mod log;

mod vcell;

pub mod api;
pub mod i2c;
pub mod platform;
pub mod power;
pub mod ral;
pub mod usb;

/// Errors reported by the drivers
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
pub enum Error {
    /// No controller was supplied
    ArgumentNull,
    /// A pin is owned by someone else
    SharingViolation,
    /// The requested setting isn't supported by the hardware
    NotSupported,
    /// The operation did not finish in time
    TimedOut,
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let message = match self {
            Error::ArgumentNull => "no controller",
            Error::SharingViolation => "pin already in use",
            Error::NotSupported => "not supported",
            Error::TimedOut => "timed out",
        };
        f.write_str(message)
    }
}
