//! Interrupt-driven I2C master
//!
//! An [`I2c`] owns one of the three I2C interfaces. Its blocking transfers
//! arm a transaction, request a START, and poll until the interrupt
//! handler finishes the transaction or a two second deadline passes. Call
//! [`I2c::on_interrupt`] from the interface's interrupt handler.
//!
//! [`Blocking`] adapts a controller and a delay to `embedded-hal`'s I2C
//! traits.

pub(crate) mod controller;
mod engine;
mod hal;
pub mod status;
mod transaction;

pub use controller::I2c;
pub use hal::{Blocking, BusError};
pub use transaction::{TimedOut, Transfer, TransferStatus, WriteRead};

use crate::platform::Pin;
use crate::Error;

/// Peripheral clock feeding the I2C interfaces, in kHz
pub const I2C_CLOCK_KHZ: u32 = 18_000;

/// Deadline for a blocking transfer, in 1 ms polling ticks
pub const TRANSACTION_TIMEOUT_MS: u32 = 2_000;

/// SDA and SCL pins for an interface
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
pub struct I2cPins {
    pub sda: Pin,
    pub scl: Pin,
}

impl I2cPins {
    /// I2C0 on P0.27 / P0.28
    pub const I2C0: I2cPins = I2cPins {
        sda: Pin::new(0, 27, 1),
        scl: Pin::new(0, 28, 1),
    };
    /// I2C1 on P0.0 / P0.1
    pub const I2C1: I2cPins = I2cPins {
        sda: Pin::new(0, 0, 3),
        scl: Pin::new(0, 1, 3),
    };
    /// I2C2 on P0.10 / P0.11
    pub const I2C2: I2cPins = I2cPins {
        sda: Pin::new(0, 10, 2),
        scl: Pin::new(0, 11, 2),
    };
}

/// Supported bus clock rates
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
#[repr(u32)]
pub enum BusSpeed {
    /// 100 kHz
    Standard = 0,
    /// 400 kHz
    Fast = 1,
}

impl BusSpeed {
    pub const fn rate_khz(self) -> u32 {
        match self {
            BusSpeed::Standard => 100,
            BusSpeed::Fast => 400,
        }
    }

    /// SCL divider for this rate, split across the high and low halves of
    /// the clock period
    pub const fn divider(self) -> u32 {
        I2C_CLOCK_KHZ / (2 * self.rate_khz())
    }
}

impl TryFrom<u32> for BusSpeed {
    type Error = Error;
    fn try_from(raw: u32) -> Result<Self, Error> {
        match raw {
            0 => Ok(BusSpeed::Standard),
            1 => Ok(BusSpeed::Fast),
            _ => Err(Error::NotSupported),
        }
    }
}
