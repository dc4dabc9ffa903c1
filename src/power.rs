//! Sleep modes, and watchdog-forced reset

use crate::{ral, Error};

/// Board hooks for the deeper sleep levels
///
/// The handlers stop and restart the peripherals that can't ride through
/// a stop level. Both default to doing nothing.
pub trait PowerHandlers {
    fn stop(&mut self) {}
    fn restart(&mut self) {}
}

impl PowerHandlers for () {}

/// How deeply to sleep
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
pub enum SleepLevel {
    /// Idle the CPU until the next interrupt
    Sleep,
    /// Stop the peripherals
    Hibernate,
    /// Stop the peripherals, for standby
    Off,
}

/// A memory word that tells the bootloader to stay resident after a reset
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BootloaderHold {
    address: usize,
    value: u32,
}

impl BootloaderHold {
    /// # Safety
    ///
    /// `address` must be a valid, aligned `u32` location that survives
    /// reset, and that nothing else uses.
    pub const unsafe fn new(address: usize, value: u32) -> Self {
        BootloaderHold { address, value }
    }

    fn write(&self) {
        let word = self.address as *mut u32;
        // Safety: valid per `new`. The write-back buffer holds the last
        // write, so the second write pushes the first to memory.
        unsafe {
            word.write_volatile(self.value);
            word.write_volatile(self.value);
        }
    }
}

/// The power controller
pub struct Power<H> {
    sc: ral::sc::Instance,
    wdt: ral::wdt::Instance,
    handlers: H,
    hold: Option<BootloaderHold>,
}

impl<H: PowerHandlers> Power<H> {
    pub const fn new(
        sc: ral::sc::Instance,
        wdt: ral::wdt::Instance,
        handlers: H,
        hold: Option<BootloaderHold>,
    ) -> Self {
        Power {
            sc,
            wdt,
            handlers,
            hold,
        }
    }

    pub fn initialize(&mut self) -> Result<(), Error> {
        Ok(())
    }

    pub fn uninitialize(&mut self) -> Result<(), Error> {
        Ok(())
    }

    pub fn sleep(&mut self, level: SleepLevel) {
        debug!("SLEEP {:?}", level);
        match level {
            SleepLevel::Hibernate | SleepLevel::Off => self.handlers.stop(),
            SleepLevel::Sleep => ral::modify_reg!(ral::sc, self.sc, PCON, PM0: 1),
        }
    }

    /// Run the restart handler, after waking from a stop level
    pub fn wake(&mut self) {
        self.handlers.restart();
    }

    /// Reset the chip through the watchdog
    ///
    /// Unless `run_core_after`, the bootloader-hold marker is written so the
    /// bootloader stays resident. Interrupts stay masked until the reset.
    pub fn reset(&mut self, run_core_after: bool) -> ! {
        if !run_core_after {
            if let Some(hold) = &self.hold {
                hold.write();
            }
        }
        // Safety: never released. The watchdog resets the chip.
        let _restore = unsafe { critical_section::acquire() };
        self.arm_watchdog();
        loop {
            core::hint::spin_loop();
        }
    }

    /// Load the smallest timeout, and start the watchdog with reset enabled
    fn arm_watchdog(&mut self) {
        ral::write_reg!(ral::wdt, self.wdt, WDTC, 0xFF);
        ral::write_reg!(ral::wdt, self.wdt, WDMOD, WDEN: 1, WDRESET: 1);
        ral::write_reg!(ral::wdt, self.wdt, WDFEED, FEED: FIRST);
        ral::write_reg!(ral::wdt, self.wdt, WDFEED, FEED: SECOND);
    }
}
