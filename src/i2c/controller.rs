use super::engine::{Engine, Slot};
use super::transaction::{TimedOut, Transfer, TransferStatus, WriteRead};
use super::{BusSpeed, I2cPins, TRANSACTION_TIMEOUT_MS};
use crate::platform::{Interrupt, Platform};
use crate::{ral, Error};

use core::cell::RefCell;
use critical_section::Mutex;
use embedded_hal::delay::DelayNs;

struct Inner<P> {
    engine: Engine,
    platform: P,
    pins: I2cPins,
    irq: Interrupt,
}

/// An I2C master
///
/// Share it between the application and the interrupt handler through a
/// `static`, or any other `'static` reference.
pub struct I2c<P> {
    inner: Mutex<RefCell<Inner<P>>>,
}

impl<P> I2c<P> {
    /// Create a controller for the interface at `regs`
    ///
    /// The controller does nothing until [`acquire`](I2c::acquire).
    pub const fn new(regs: ral::i2c::Instance, pins: I2cPins, irq: Interrupt, platform: P) -> Self {
        I2c {
            inner: Mutex::new(RefCell::new(Inner {
                engine: Engine::new(regs),
                platform,
                pins,
                irq,
            })),
        }
    }

    fn with_inner<R>(&self, func: impl FnOnce(&mut Inner<P>) -> R) -> R {
        critical_section::with(|cs| func(&mut *self.inner.borrow_ref_mut(cs)))
    }
}

impl<P: Platform> I2c<P> {
    /// Claim the pins, route the interrupt, and enable the interface
    ///
    /// Fails with [`Error::SharingViolation`] if either pin is owned by
    /// someone else. Nothing stays claimed on failure.
    pub fn acquire(&self) -> Result<(), Error> {
        self.with_inner(|inner| {
            let Inner {
                engine,
                platform,
                pins,
                irq,
            } = inner;

            if !platform.open_pin(pins.sda) {
                return Err(Error::SharingViolation);
            }
            if !platform.open_pin(pins.scl) {
                platform.close_pin(pins.sda);
                return Err(Error::SharingViolation);
            }
            platform.configure_pin(pins.sda);
            platform.configure_pin(pins.scl);

            engine.clear();
            platform.activate_interrupt(*irq);
            engine.enable();
            engine.config.opened = true;
            debug!("I2C ACQUIRE");
            Ok(())
        })
    }

    /// Disable the interface and give back the pins
    pub fn release(&self) {
        self.with_inner(|inner| {
            inner.platform.deactivate_interrupt(inner.irq);
            inner.engine.disable();
            inner.engine.clear();
            if inner.engine.config.opened {
                inner.platform.close_pin(inner.pins.sda);
                inner.platform.close_pin(inner.pins.scl);
            }
            inner.engine.config.opened = false;
            debug!("I2C RELEASE");
        })
    }

    /// Release the controller, and forget its settings
    pub fn reset(&self) {
        self.release();
        self.with_inner(|inner| inner.engine.config = super::engine::Configuration::new());
    }

    /// Set the slave address and bus clock used by the next transfers
    pub fn set_active_settings(&self, address: u8, speed: BusSpeed) {
        let divider = speed.divider();
        self.with_inner(|inner| {
            let config = &mut inner.engine.config;
            config.address = address;
            config.clock_rate = divider as u8;
            config.clock_rate2 = (divider >> 8) as u8;
        });
        debug!("I2C ADDRESS {} DIVIDER {}", address, divider);
    }

    /// Run `func` with `address` as the slave address, then restore the
    /// active settings
    pub(crate) fn with_address<R>(&self, address: u8, func: impl FnOnce(&Self) -> R) -> R {
        let active = self.with_inner(|inner| core::mem::replace(&mut inner.engine.config.address, address));
        let result = func(self);
        self.with_inner(|inner| inner.engine.config.address = active);
        result
    }

    /// Handle the interface's interrupt
    pub fn on_interrupt(&self) {
        self.with_inner(|inner| inner.engine.on_interrupt());
    }

    /// Read into `buffer`
    pub fn read(&self, delay: &mut impl DelayNs, buffer: &mut [u8]) -> Result<Transfer, TimedOut<Transfer>> {
        let requested = buffer.len();
        self.with_inner(|inner| {
            // Safety: detached by `conclude` before this call returns.
            unsafe {
                inner
                    .engine
                    .slot_mut(Slot::Read)
                    .arm(true, buffer.as_mut_ptr(), requested, false)
            };
            inner.engine.begin(Slot::Read);
        });

        let completed = self.wait_for_completion(delay);
        let (_, read) = self.with_inner(|inner| inner.engine.conclude());
        let transfer = Transfer::new(read, requested);
        if completed {
            Ok(transfer)
        } else {
            Err(TimedOut(transfer))
        }
    }

    /// Write `buffer`
    pub fn write(&self, delay: &mut impl DelayNs, buffer: &[u8]) -> Result<Transfer, TimedOut<Transfer>> {
        let requested = buffer.len();
        self.with_inner(|inner| {
            // Safety: detached by `conclude` before this call returns, and
            // never written through.
            unsafe {
                inner
                    .engine
                    .slot_mut(Slot::Write)
                    .arm(false, buffer.as_ptr() as *mut u8, requested, false)
            };
            inner.engine.begin(Slot::Write);
        });

        let completed = self.wait_for_completion(delay);
        let (written, _) = self.with_inner(|inner| inner.engine.conclude());
        let transfer = Transfer::new(written, requested);
        if completed {
            Ok(transfer)
        } else {
            Err(TimedOut(transfer))
        }
    }

    /// Write `output`, then read into `input` after a repeated START
    ///
    /// If the write comes up short, the read is not reported.
    pub fn write_read(
        &self,
        delay: &mut impl DelayNs,
        output: &[u8],
        input: &mut [u8],
    ) -> Result<WriteRead, TimedOut<WriteRead>> {
        let (write_requested, read_requested) = (output.len(), input.len());
        self.with_inner(|inner| {
            // Safety: both slots are detached by `conclude` before this call
            // returns. The write buffer is never written through.
            unsafe {
                inner
                    .engine
                    .slot_mut(Slot::Write)
                    .arm(false, output.as_ptr() as *mut u8, write_requested, true);
                inner
                    .engine
                    .slot_mut(Slot::Read)
                    .arm(true, input.as_mut_ptr(), read_requested, false);
            }
            inner.engine.begin(Slot::Write);
        });

        let completed = self.wait_for_completion(delay);
        let (written, read) = self.with_inner(|inner| inner.engine.conclude());

        let report = if written != write_requested {
            WriteRead {
                written,
                read: None,
                status: TransferStatus::Partial,
            }
        } else {
            WriteRead {
                written,
                read: Some(read),
                status: TransferStatus::classify(read, read_requested),
            }
        };
        if completed {
            Ok(report)
        } else {
            Err(TimedOut(report))
        }
    }

    /// Poll for the end of the current transaction in 1 ms ticks
    ///
    /// Returns `false` if the deadline passed first.
    fn wait_for_completion(&self, delay: &mut impl DelayNs) -> bool {
        for _ in 0..TRANSACTION_TIMEOUT_MS {
            if !self.with_inner(|inner| inner.engine.is_busy()) {
                return true;
            }
            delay.delay_ms(1);
        }
        let completed = !self.with_inner(|inner| inner.engine.is_busy());
        if !completed {
            warn!("I2C TIMEOUT");
        }
        completed
    }
}
