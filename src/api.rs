//! Table-style entry points
//!
//! These wrap the drivers for callers that manage controllers by handle.
//! Every entry point reports a [`ResultCode`]. A missing handle is
//! [`ResultCode::ArgumentNull`]. Lengths are in/out: the caller passes the
//! requested length and receives the number of bytes moved, even when the
//! call fails.

use crate::i2c::{BusSpeed, I2c, TimedOut, TransferStatus};
use crate::platform::Platform;
use crate::power::{Power, PowerHandlers, SleepLevel};
use crate::Error;

use embedded_hal::delay::DelayNs;

/// Kinds of controller in the table
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
pub enum ApiType {
    I2cController,
    UsbClientController,
    PowerController,
}

/// Describes one controller in the table
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ApiInfo {
    pub author: &'static str,
    pub name: &'static str,
    pub kind: ApiType,
    pub version: u32,
}

const AUTHOR: &str = "GHI Electronics, LLC";

pub const I2C_API: ApiInfo = ApiInfo {
    author: AUTHOR,
    name: "GHIElectronics.TinyCLR.NativeApis.LPC24.I2cController",
    kind: ApiType::I2cController,
    version: 0,
};

pub const USB_CLIENT_API: ApiInfo = ApiInfo {
    author: AUTHOR,
    name: "GHIElectronics.TinyCLR.NativeApis.LPC24.UsbClientController",
    kind: ApiType::UsbClientController,
    version: 0,
};

pub const POWER_API: ApiInfo = ApiInfo {
    author: AUTHOR,
    name: "GHIElectronics.TinyCLR.NativeApis.LPC24.PowerController",
    kind: ApiType::PowerController,
    version: 0,
};

/// The outcome of an entry point
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
pub enum ResultCode {
    Success,
    ArgumentNull,
    SharingViolation,
    NotSupported,
    TimedOut,
}

impl From<Error> for ResultCode {
    fn from(error: Error) -> Self {
        match error {
            Error::ArgumentNull => ResultCode::ArgumentNull,
            Error::SharingViolation => ResultCode::SharingViolation,
            Error::NotSupported => ResultCode::NotSupported,
            Error::TimedOut => ResultCode::TimedOut,
        }
    }
}

impl From<Result<(), Error>> for ResultCode {
    fn from(result: Result<(), Error>) -> Self {
        match result {
            Ok(()) => ResultCode::Success,
            Err(error) => error.into(),
        }
    }
}

fn timed_out<T>(result: Result<T, TimedOut<T>>) -> (T, ResultCode) {
    match result {
        Ok(report) => (report, ResultCode::Success),
        Err(TimedOut(report)) => (report, ResultCode::TimedOut),
    }
}

pub fn i2c_acquire<P: Platform>(i2c: Option<&I2c<P>>) -> ResultCode {
    match i2c {
        Some(i2c) => i2c.acquire().into(),
        None => ResultCode::ArgumentNull,
    }
}

pub fn i2c_release<P: Platform>(i2c: Option<&I2c<P>>) -> ResultCode {
    match i2c {
        Some(i2c) => {
            i2c.release();
            ResultCode::Success
        }
        None => ResultCode::ArgumentNull,
    }
}

/// `speed` is the raw bus speed: 0 for standard mode, 1 for fast mode
pub fn i2c_set_active_settings<P: Platform>(i2c: Option<&I2c<P>>, address: u8, speed: u32) -> ResultCode {
    let Some(i2c) = i2c else {
        return ResultCode::ArgumentNull;
    };
    match BusSpeed::try_from(speed) {
        Ok(speed) => {
            i2c.set_active_settings(address, speed);
            ResultCode::Success
        }
        Err(error) => error.into(),
    }
}

/// Read `*length` bytes into `buffer`
///
/// `length` is clamped to the buffer.
pub fn i2c_read<P: Platform>(
    i2c: Option<&I2c<P>>,
    delay: &mut impl DelayNs,
    buffer: &mut [u8],
    length: &mut usize,
    status: &mut TransferStatus,
) -> ResultCode {
    let Some(i2c) = i2c else {
        return ResultCode::ArgumentNull;
    };
    let requested = (*length).min(buffer.len());
    let (transfer, code) = timed_out(i2c.read(delay, &mut buffer[..requested]));
    *length = transfer.length;
    *status = transfer.status;
    code
}

/// Write the first `*length` bytes of `buffer`
///
/// `length` is clamped to the buffer.
pub fn i2c_write<P: Platform>(
    i2c: Option<&I2c<P>>,
    delay: &mut impl DelayNs,
    buffer: &[u8],
    length: &mut usize,
    status: &mut TransferStatus,
) -> ResultCode {
    let Some(i2c) = i2c else {
        return ResultCode::ArgumentNull;
    };
    let requested = (*length).min(buffer.len());
    let (transfer, code) = timed_out(i2c.write(delay, &buffer[..requested]));
    *length = transfer.length;
    *status = transfer.status;
    code
}

/// Write, then read after a repeated START
///
/// `read_length` is left untouched if the write came up short.
pub fn i2c_write_read<P: Platform>(
    i2c: Option<&I2c<P>>,
    delay: &mut impl DelayNs,
    output: &[u8],
    write_length: &mut usize,
    input: &mut [u8],
    read_length: &mut usize,
    status: &mut TransferStatus,
) -> ResultCode {
    let Some(i2c) = i2c else {
        return ResultCode::ArgumentNull;
    };
    let write_requested = (*write_length).min(output.len());
    let read_requested = (*read_length).min(input.len());
    let (report, code) = timed_out(i2c.write_read(
        delay,
        &output[..write_requested],
        &mut input[..read_requested],
    ));
    *write_length = report.written;
    if let Some(read) = report.read {
        *read_length = read;
    }
    *status = report.status;
    code
}

pub fn power_initialize<H: PowerHandlers>(power: Option<&mut Power<H>>) -> ResultCode {
    match power {
        Some(power) => power.initialize().into(),
        None => ResultCode::ArgumentNull,
    }
}

pub fn power_uninitialize<H: PowerHandlers>(power: Option<&mut Power<H>>) -> ResultCode {
    match power {
        Some(power) => power.uninitialize().into(),
        None => ResultCode::ArgumentNull,
    }
}

pub fn power_sleep<H: PowerHandlers>(power: Option<&mut Power<H>>, level: SleepLevel) -> ResultCode {
    match power {
        Some(power) => {
            power.sleep(level);
            ResultCode::Success
        }
        None => ResultCode::ArgumentNull,
    }
}

/// Reset the chip through the watchdog
///
/// Only returns when there's no controller.
pub fn power_reset<H: PowerHandlers>(power: Option<&mut Power<H>>, run_core_after: bool) -> ResultCode {
    match power {
        Some(power) => power.reset(run_core_after),
        None => ResultCode::ArgumentNull,
    }
}
