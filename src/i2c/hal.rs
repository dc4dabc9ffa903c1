//! `embedded-hal` I2C adapter

use super::{I2c, TimedOut, Transfer, TransferStatus};
use crate::platform::Platform;

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::{self, ErrorKind, NoAcknowledgeSource, Operation};

/// Errors from a [`Blocking`] transaction
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
pub enum BusError {
    /// The transfer did not finish in time
    TimedOut,
    /// The slave stopped the transfer early, or arbitration was lost
    Incomplete { transferred: usize },
    /// The controller can't perform this sequence of operations
    Unsupported,
}

impl i2c::Error for BusError {
    fn kind(&self) -> ErrorKind {
        match self {
            BusError::TimedOut | BusError::Unsupported => ErrorKind::Other,
            BusError::Incomplete { .. } => ErrorKind::NoAcknowledge(NoAcknowledgeSource::Unknown),
        }
    }
}

/// Blocking `embedded-hal` I2C on top of an [`I2c`]
///
/// The adapter supports a single read, a single write, or a write followed
/// by a read. The bus speed comes from the controller's active settings.
/// The transaction's address applies to that transaction only. The
/// controller's active address is restored afterwards.
pub struct Blocking<'a, P, D> {
    i2c: &'a I2c<P>,
    delay: D,
}

impl<'a, P: Platform, D: DelayNs> Blocking<'a, P, D> {
    pub fn new(i2c: &'a I2c<P>, delay: D) -> Self {
        Blocking { i2c, delay }
    }

    /// Release the delay
    pub fn release(self) -> D {
        self.delay
    }
}

fn complete(result: Result<Transfer, TimedOut<Transfer>>) -> Result<(), BusError> {
    match result {
        Ok(Transfer {
            status: TransferStatus::Full,
            ..
        }) => Ok(()),
        Ok(Transfer { length, .. }) => Err(BusError::Incomplete { transferred: length }),
        Err(_) => Err(BusError::TimedOut),
    }
}

impl<P, D> i2c::ErrorType for Blocking<'_, P, D> {
    type Error = BusError;
}

impl<P: Platform, D: DelayNs> i2c::I2c for Blocking<'_, P, D> {
    fn transaction(&mut self, address: u8, operations: &mut [Operation<'_>]) -> Result<(), BusError> {
        let delay = &mut self.delay;
        self.i2c.with_address(address, |i2c| match operations {
            [] => Ok(()),
            [Operation::Read(buffer)] => complete(i2c.read(delay, buffer)),
            [Operation::Write(bytes)] => complete(i2c.write(delay, bytes)),
            [Operation::Write(bytes), Operation::Read(buffer)] => match i2c.write_read(delay, bytes, buffer) {
                Ok(report) if report.status == TransferStatus::Full => Ok(()),
                Ok(report) => Err(BusError::Incomplete {
                    transferred: report.read.unwrap_or(report.written),
                }),
                Err(_) => Err(BusError::TimedOut),
            },
            _ => Err(BusError::Unsupported),
        })
    }
}
