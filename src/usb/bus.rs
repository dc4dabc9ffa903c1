//! Interrupt-safe access to a [`Driver`]

use super::client::UsbClient;
use super::driver::Driver;
use crate::platform::Platform;
use crate::Error;

use core::cell::RefCell;
use critical_section::Mutex;
use embedded_hal::delay::DelayNs;

/// A USB device, shared between the application and the USB interrupt
pub struct Device<C, P> {
    driver: Mutex<RefCell<Driver<C, P>>>,
}

impl<C, P> Device<C, P> {
    /// Wrap a driver
    ///
    /// Call [`initialize_configuration`](Device::initialize_configuration)
    /// and [`initialize`](Device::initialize) before expecting traffic.
    pub const fn new(driver: Driver<C, P>) -> Self {
        Device {
            driver: Mutex::new(RefCell::new(driver)),
        }
    }

    /// Interrupt-safe, immutable access to the driver
    fn with_driver<R>(&self, func: impl FnOnce(&Driver<C, P>) -> R) -> R {
        critical_section::with(|cs| func(&*self.driver.borrow_ref(cs)))
    }

    /// Interrupt-safe, mutable access to the driver
    fn with_driver_mut<R>(&self, func: impl FnOnce(&mut Driver<C, P>) -> R) -> R {
        critical_section::with(|cs| func(&mut *self.driver.borrow_ref_mut(cs)))
    }

    /// Access the client, with interrupts masked
    pub fn with_client<R>(&self, func: impl FnOnce(&mut C) -> R) -> R {
        self.with_driver_mut(|driver| func(driver.client_mut()))
    }

    pub fn state(&self) -> super::DeviceState {
        self.with_driver(|driver| driver.state())
    }
}

impl<C: UsbClient, P: Platform + DelayNs> Device<C, P> {
    pub fn initialize_configuration(&self) {
        self.with_driver_mut(|driver| driver.initialize_configuration());
    }

    pub fn initialize(&self) -> Result<(), Error> {
        self.with_driver_mut(|driver| driver.initialize())
    }

    pub fn uninitialize(&self) {
        self.with_driver_mut(|driver| driver.uninitialize());
    }

    pub fn reset(&self) {
        self.with_driver_mut(|driver| driver.reset());
    }

    /// Kick transmission on `endpoint`
    ///
    /// Returns `false` if the endpoint is out of range.
    pub fn start_output(&self, endpoint: usize) -> bool {
        let interrupts_masked = P::interrupts_masked();
        self.with_driver_mut(|driver| driver.start_output(endpoint, interrupts_masked))
    }

    /// Retry a held-back receive on `endpoint`
    ///
    /// Returns `false` if the endpoint is out of range.
    pub fn rx_enable(&self, endpoint: usize) -> bool {
        self.with_driver_mut(|driver| driver.rx_enable(endpoint))
    }

    /// Handle the USB interrupt
    pub fn on_interrupt(&self) {
        self.with_driver_mut(|driver| driver.on_interrupt());
    }
}
