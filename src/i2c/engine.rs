//! The interrupt-driven I2C master state machine

use super::status::{Action, Status};
use super::transaction::Transaction;
use crate::ral;

/// Which slot is moving on the bus
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
pub(crate) enum Slot {
    Read,
    Write,
}

/// Slave address and bus clock settings
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Configuration {
    pub address: u8,
    /// Low and high bytes of the SCL divider
    pub clock_rate: u8,
    pub clock_rate2: u8,
    pub opened: bool,
}

impl Configuration {
    pub const fn new() -> Self {
        Configuration {
            address: 0,
            clock_rate: 0,
            clock_rate2: 0,
            opened: false,
        }
    }

    fn divider(&self) -> u32 {
        u32::from(self.clock_rate) | (u32::from(self.clock_rate2) << 8)
    }
}

pub(crate) struct Engine {
    regs: ral::i2c::Instance,
    pub config: Configuration,
    read: Transaction,
    write: Transaction,
    current: Option<Slot>,
}

impl Engine {
    pub const fn new(regs: ral::i2c::Instance) -> Self {
        Engine {
            regs,
            config: Configuration::new(),
            read: Transaction::new(),
            write: Transaction::new(),
            current: None,
        }
    }

    pub fn slot(&self, slot: Slot) -> &Transaction {
        match slot {
            Slot::Read => &self.read,
            Slot::Write => &self.write,
        }
    }

    pub fn slot_mut(&mut self, slot: Slot) -> &mut Transaction {
        match slot {
            Slot::Read => &mut self.read,
            Slot::Write => &mut self.write,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.current.is_some()
    }

    /// Turn on the interface, with a fixed own-address
    pub fn enable(&mut self) {
        ral::write_reg!(ral::i2c, self.regs, I2ADR, ADDRESS: 0x3F, GC: 0);
        ral::write_reg!(ral::i2c, self.regs, I2CONSET, I2EN: 1);
    }

    pub fn disable(&mut self) {
        ral::write_reg!(ral::i2c, self.regs, I2CONCLR, AAC: 1, SIC: 1, STAC: 1, I2ENC: 1);
    }

    /// Forget both slots and any transaction in flight
    pub fn clear(&mut self) {
        self.read.reset();
        self.write.reset();
        self.current = None;
    }

    /// Start the transaction armed in `slot`
    pub fn begin(&mut self, slot: Slot) {
        self.current = Some(slot);
        self.start_transaction(false);
    }

    /// Handle the interface interrupt
    pub fn on_interrupt(&mut self) {
        let status = Status::from_raw(ral::read_reg!(ral::i2c, self.regs, I2STAT, STATUS) as u8);
        match self.current {
            Some(slot) => self.advance(slot, status),
            None => trace!("I2C IDLE {:#X}", status.raw()),
        }
        ral::write_reg!(ral::i2c, self.regs, I2CONCLR, SIC: 1);
    }

    pub fn advance(&mut self, slot: Slot, status: Status) {
        trace!("I2C {:#X}", status.raw());
        match status.action() {
            Action::SendAddress => {
                let direction = self.slot(slot).is_read() as u8;
                let address = ((self.config.address << 1) & 0xFE) | direction;
                ral::write_reg!(ral::i2c, self.regs, I2DAT, DATA: u32::from(address));
                ral::write_reg!(ral::i2c, self.regs, I2CONCLR, STAC: 1);
            }
            Action::Transmit => {
                if self.slot(slot).remaining() == 0 {
                    self.finish_or_chain(slot);
                } else if let Some(byte) = self.slot_mut(slot).next_byte() {
                    ral::write_reg!(ral::i2c, self.regs, I2DAT, DATA: u32::from(byte));
                } else {
                    self.stop_transaction();
                }
            }
            Action::PrepareReceive => match self.slot(slot).remaining() {
                0 => self.stop_transaction(),
                1 => ral::write_reg!(ral::i2c, self.regs, I2CONCLR, AAC: 1),
                _ => ral::write_reg!(ral::i2c, self.regs, I2CONSET, AA: 1),
            },
            Action::Receive => {
                let byte = ral::read_reg!(ral::i2c, self.regs, I2DAT, DATA) as u8;
                let transaction = self.slot_mut(slot);
                if !transaction.store(byte) {
                    self.stop_transaction();
                    return;
                }
                match transaction.remaining() {
                    0 => self.finish_or_chain(slot),
                    1 => ral::write_reg!(ral::i2c, self.regs, I2CONCLR, AAC: 1),
                    _ => {}
                }
            }
            Action::ClearBusError => {
                warn!("I2C BUS ERROR");
                ral::write_reg!(ral::i2c, self.regs, I2CONSET, STO: 1);
                self.stop_transaction();
            }
            Action::Stop => self.stop_transaction(),
        }
    }

    fn finish_or_chain(&mut self, slot: Slot) {
        if slot == Slot::Write && self.write.repeated_start() {
            self.write.complete();
            self.current = Some(Slot::Read);
            self.start_transaction(true);
        } else {
            self.stop_transaction();
        }
    }

    /// Request a START, programming the clock unless this is the read half
    /// of a chained write-read
    fn start_transaction(&mut self, chained: bool) {
        if !chained {
            let divider = self.config.divider();
            ral::write_reg!(ral::i2c, self.regs, I2SCLH, SCLH: divider);
            ral::write_reg!(ral::i2c, self.regs, I2SCLL, SCLL: divider);
        }
        ral::write_reg!(ral::i2c, self.regs, I2CONSET, STA: 1);
    }

    fn stop_transaction(&mut self) {
        ral::write_reg!(ral::i2c, self.regs, I2CONSET, STO: 1);
        ral::write_reg!(ral::i2c, self.regs, I2CONCLR, AAC: 1, SIC: 1, STAC: 1);
        if let Some(slot) = self.current.take() {
            self.slot_mut(slot).complete();
        }
    }

    /// Stop anything in flight, detach the caller's buffers, and report
    /// `(written, read)`
    pub fn conclude(&mut self) -> (usize, usize) {
        if self.current.is_some() {
            debug!("I2C ABORT");
            self.stop_transaction();
        }
        self.read.detach();
        self.write.detach();
        (self.write.transferred(), self.read.transferred())
    }
}
