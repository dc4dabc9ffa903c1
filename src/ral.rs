//! Register access layer for the LPC24xx peripherals used by this crate
//!
//! Register blocks are plain `#[repr(C)]` structs of [`VCell`]s. Each
//! register has a companion module describing its fields, so that the
//! `ral-registers` macros work on them:
//!
//! ```ignore
//! ral::write_reg!(ral::i2c, regs, I2CONSET, STA: 1);
//! ```
//!
//! An [`Instance`] points a block at a peripheral address.

#![allow(non_snake_case, non_upper_case_globals)]

use crate::vcell::VCell;
use core::ops::Deref;

pub use ral_registers::{modify_reg, read_reg, write_reg};

/// Describes single-register fields as `offset` / `mask` pairs, with empty
/// enumerated-value modules.
macro_rules! fields {
    ($($field:ident : $offset:expr, $width:expr;)+) => {
        $(
            pub mod $field {
                pub const offset: u32 = $offset;
                pub const mask: u32 = (((1u64 << $width) - 1) as u32) << offset;
                pub mod R {}
                pub mod W {}
                pub mod RW {}
            }
        )+
    };
}

/// A handle to a register block
///
/// Dereferences to the register block found at the instance's address.
pub struct Instance<T> {
    block: *const T,
}

// Safety: an instance only hands out shared references to volatile cells.
// Callers of `new` guarantee exclusive ownership of the peripheral.
unsafe impl<T> Send for Instance<T> {}

impl<T> Instance<T> {
    /// Create an instance for the register block at `block`
    ///
    /// # Safety
    ///
    /// `block` must point to a register block of type `T` that stays valid
    /// for the life of the instance. The caller must make sure that no
    /// other driver is using the same registers.
    pub const unsafe fn new(block: *const T) -> Self {
        Instance { block }
    }
}

impl<T> Deref for Instance<T> {
    type Target = T;
    fn deref(&self) -> &T {
        // Safety: guaranteed by the caller of `new`.
        unsafe { &*self.block }
    }
}

/// I2C interfaces
pub mod i2c {
    use super::VCell;

    pub const I2C0: usize = 0xE001_C000;
    pub const I2C1: usize = 0xE005_C000;
    pub const I2C2: usize = 0xE008_0000;

    pub type Instance = super::Instance<RegisterBlock>;

    #[repr(C)]
    pub struct RegisterBlock {
        pub I2CONSET: VCell<u32>,
        pub I2STAT: VCell<u32>,
        pub I2DAT: VCell<u32>,
        pub I2ADR: VCell<u32>,
        pub I2SCLH: VCell<u32>,
        pub I2SCLL: VCell<u32>,
        pub I2CONCLR: VCell<u32>,
    }

    impl RegisterBlock {
        /// A register block in ordinary memory, with all registers zeroed
        pub const fn new() -> Self {
            RegisterBlock {
                I2CONSET: VCell::new(0),
                I2STAT: VCell::new(0),
                I2DAT: VCell::new(0),
                I2ADR: VCell::new(0),
                I2SCLH: VCell::new(0),
                I2SCLL: VCell::new(0),
                I2CONCLR: VCell::new(0),
            }
        }
    }

    pub mod I2CONSET {
        fields! {
            AA: 2, 1;
            SI: 3, 1;
            STO: 4, 1;
            STA: 5, 1;
            I2EN: 6, 1;
        }
    }

    pub mod I2CONCLR {
        fields! {
            AAC: 2, 1;
            SIC: 3, 1;
            STAC: 5, 1;
            I2ENC: 6, 1;
        }
    }

    pub mod I2STAT {
        fields! {
            STATUS: 0, 8;
        }
    }

    pub mod I2DAT {
        fields! {
            DATA: 0, 8;
        }
    }

    pub mod I2ADR {
        fields! {
            GC: 0, 1;
            ADDRESS: 1, 7;
        }
    }

    pub mod I2SCLH {
        fields! {
            SCLH: 0, 16;
        }
    }

    pub mod I2SCLL {
        fields! {
            SCLL: 0, 16;
        }
    }

    const _: [(); 1] = [(); (core::mem::size_of::<RegisterBlock>() == 0x1C) as usize];
}

/// USB device controller
pub mod usb {
    use super::VCell;

    /// The receive data register. Host tests queue words into it.
    #[cfg(not(test))]
    pub type RxData = VCell<u32>;
    #[cfg(test)]
    pub type RxData = super::testing::Fifo;

    /// Address of the device interrupt status register, the first register
    /// in the block.
    pub const USB: usize = 0xFFE0_C200;

    pub type Instance = super::Instance<RegisterBlock>;

    #[repr(C)]
    pub struct RegisterBlock {
        pub DEVINTST: VCell<u32>,
        pub DEVINTEN: VCell<u32>,
        pub DEVINTCLR: VCell<u32>,
        pub DEVINTSET: VCell<u32>,
        pub CMDCODE: VCell<u32>,
        pub CMDDATA: VCell<u32>,
        pub RXDATA: RxData,
        pub TXDATA: VCell<u32>,
        pub RXPLEN: VCell<u32>,
        pub TXPLEN: VCell<u32>,
        pub CTRL: VCell<u32>,
        pub DEVINTPRI: VCell<u32>,
        pub EPINTST: VCell<u32>,
        pub EPINTEN: VCell<u32>,
        pub EPINTCLR: VCell<u32>,
        pub EPINTSET: VCell<u32>,
        pub EPINTPRI: VCell<u32>,
        pub REEP: VCell<u32>,
        pub EPIND: VCell<u32>,
        pub MAXPSIZE: VCell<u32>,
        _reserved0: [u32; 873],
        pub CLKCTRL: VCell<u32>,
        pub CLKST: VCell<u32>,
    }

    impl RegisterBlock {
        /// A register block in ordinary memory, with all registers zeroed
        pub const fn new() -> Self {
            RegisterBlock {
                DEVINTST: VCell::new(0),
                DEVINTEN: VCell::new(0),
                DEVINTCLR: VCell::new(0),
                DEVINTSET: VCell::new(0),
                CMDCODE: VCell::new(0),
                CMDDATA: VCell::new(0),
                RXDATA: RxData::new(0),
                TXDATA: VCell::new(0),
                RXPLEN: VCell::new(0),
                TXPLEN: VCell::new(0),
                CTRL: VCell::new(0),
                DEVINTPRI: VCell::new(0),
                EPINTST: VCell::new(0),
                EPINTEN: VCell::new(0),
                EPINTCLR: VCell::new(0),
                EPINTSET: VCell::new(0),
                EPINTPRI: VCell::new(0),
                REEP: VCell::new(0),
                EPIND: VCell::new(0),
                MAXPSIZE: VCell::new(0),
                _reserved0: [0; 873],
                CLKCTRL: VCell::new(0),
                CLKST: VCell::new(0),
            }
        }
    }

    /// Serial interface engine command / data register
    pub mod CMDCODE {
        pub mod CMD_PHASE {
            pub const offset: u32 = 8;
            pub const mask: u32 = 0xFF << offset;
            pub mod R {}
            pub mod W {
                pub const WRITE: u32 = 0x01;
                pub const READ: u32 = 0x02;
                pub const COMMAND: u32 = 0x05;
            }
            pub mod RW {}
        }
        fields! {
            CMD_CODE_WDATA: 16, 8;
        }
    }

    pub mod RXPLEN {
        fields! {
            PKT_LNGTH: 0, 10;
            DV: 10, 1;
            PKT_RDY: 11, 1;
        }
    }

    pub mod TXPLEN {
        fields! {
            PKT_LNGTH: 0, 10;
        }
    }

    pub mod CTRL {
        fields! {
            RD_EN: 0, 1;
            WR_EN: 1, 1;
            LOG_ENDPOINT: 2, 4;
        }
    }

    pub mod MAXPSIZE {
        fields! {
            MPS: 0, 10;
        }
    }

    pub mod CLKCTRL {
        fields! {
            DEV_CLK_EN: 1, 1;
            PORTSEL_CLK_EN: 3, 1;
            AHB_CLK_EN: 4, 1;
        }
    }

    #[cfg(not(test))]
    const _: [(); 1] = [(); (core::mem::size_of::<RegisterBlock>() == 0xDFC) as usize];
}

/// System control: power control and peripheral power
pub mod sc {
    use super::VCell;

    pub const SC: usize = 0xE01F_C0C0;

    pub type Instance = super::Instance<RegisterBlock>;

    #[repr(C)]
    pub struct RegisterBlock {
        pub PCON: VCell<u32>,
        pub PCONP: VCell<u32>,
    }

    impl RegisterBlock {
        /// A register block in ordinary memory, with all registers zeroed
        pub const fn new() -> Self {
            RegisterBlock {
                PCON: VCell::new(0),
                PCONP: VCell::new(0),
            }
        }
    }

    pub mod PCON {
        fields! {
            PM0: 0, 1;
            PM1: 1, 1;
        }
    }

    pub mod PCONP {
        fields! {
            PCI2C0: 7, 1;
            PCI2C1: 19, 1;
            PCI2C2: 26, 1;
            PCUSB: 31, 1;
        }
    }
}

/// Watchdog timer
pub mod wdt {
    use super::VCell;

    pub const WDT: usize = 0xE000_0000;

    pub type Instance = super::Instance<RegisterBlock>;

    #[repr(C)]
    pub struct RegisterBlock {
        pub WDMOD: VCell<u32>,
        pub WDTC: VCell<u32>,
        pub WDFEED: VCell<u32>,
        pub WDTV: VCell<u32>,
    }

    impl RegisterBlock {
        /// A register block in ordinary memory, with all registers zeroed
        pub const fn new() -> Self {
            RegisterBlock {
                WDMOD: VCell::new(0),
                WDTC: VCell::new(0),
                WDFEED: VCell::new(0),
                WDTV: VCell::new(0),
            }
        }
    }

    pub mod WDMOD {
        fields! {
            WDEN: 0, 1;
            WDRESET: 1, 1;
            WDTOF: 2, 1;
            WDINT: 3, 1;
        }
    }

    pub mod WDFEED {
        pub mod FEED {
            pub const offset: u32 = 0;
            pub const mask: u32 = 0xFF << offset;
            pub mod R {}
            pub mod W {
                pub const FIRST: u32 = 0xAA;
                pub const SECOND: u32 = 0x55;
            }
            pub mod RW {}
        }
    }
}

#[cfg(test)]
pub mod testing {
    //! Leaked, in-memory register blocks for host-side tests

    extern crate std;
    use core::cell::RefCell;
    use std::{boxed::Box, collections::VecDeque};

    /// A FIFO data register: every read pops a word that a write queued
    ///
    /// Reading an empty FIFO returns zero.
    pub struct Fifo(RefCell<VecDeque<u32>>);

    impl Fifo {
        pub const fn new(_: u32) -> Self {
            Fifo(RefCell::new(VecDeque::new()))
        }

        pub fn read(&self) -> u32 {
            self.0.borrow_mut().pop_front().unwrap_or(0)
        }

        pub fn write(&self, word: u32) {
            self.0.borrow_mut().push_back(word);
        }
    }

    /// Allocate a zeroed register block that lives for the rest of the test
    pub fn leak<T>(block: T) -> (&'static T, super::Instance<T>) {
        let block: &'static T = Box::leak(Box::new(block));
        // Safety: leaked memory is never freed.
        (block, unsafe { super::Instance::new(block) })
    }
}
