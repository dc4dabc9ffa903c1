//! Board services that the drivers borrow, but don't implement
//!
//! Pin multiplexing, the vectored interrupt controller, and the CPU's
//! interrupt mask belong to other drivers. The peripheral drivers in this
//! crate receive them through a [`Platform`] at construction.

/// A GPIO pin, and the alternate function that routes it to a peripheral
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
pub struct Pin {
    /// Pin number, `port * 32 + bit`
    pub number: u32,
    /// Pin function select value
    pub function: u8,
}

impl Pin {
    pub const fn new(port: u32, bit: u32, function: u8) -> Self {
        Pin {
            number: port * 32 + bit,
            function,
        }
    }
}

/// Vectored interrupt controller channels used by this crate
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
#[repr(u8)]
pub enum Interrupt {
    I2c0 = 9,
    I2c1 = 19,
    Usb = 22,
    I2c2 = 30,
}

/// Pin, interrupt controller, and CPU services
pub trait Platform {
    /// Claim `pin` for exclusive use
    ///
    /// Returns `false` if someone else already owns the pin.
    fn open_pin(&mut self, pin: Pin) -> bool;

    /// Route an opened pin to its peripheral function, as an input with
    /// no pull resistor
    fn configure_pin(&mut self, pin: Pin);

    /// Give up ownership of `pin`
    fn close_pin(&mut self, pin: Pin);

    /// Enable `irq` in the interrupt controller
    fn activate_interrupt(&mut self, irq: Interrupt);

    /// Disable `irq` in the interrupt controller
    fn deactivate_interrupt(&mut self, irq: Interrupt);

    /// Indicates if the CPU currently has IRQs masked
    ///
    /// Drivers call this before they enter their own critical sections,
    /// so it reports the caller's context.
    fn interrupts_masked() -> bool;
}
