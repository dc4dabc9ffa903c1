//! Full-speed USB device controller
//!
//! The [`Driver`] runs the endpoint engine. It answers device events
//! (reset, suspend, and resume), runs the three stages of control
//! transfers on endpoint 0, and moves packets between the bulk endpoints
//! and a [`UsbClient`]. The client owns the descriptors and the packet
//! queues.
//!
//! Wrap the driver in a [`Device`] to share it with the USB interrupt
//! handler.

mod bus;
mod client;
mod driver;
mod endpoint;
mod setup;
mod sie;

pub use bus::Device;
pub use client::{Capabilities, ControlState, DeviceState, Packet, Pipe, UsbClient};
pub use driver::Driver;
pub use endpoint::{physical, EndpointConfig, BULK};
pub use setup::SetupPacket;

use crate::platform::Pin;

/// Logical endpoints
pub const ENDPOINT_COUNT: usize = 16;
/// Control endpoint max packet size
pub const ENDPOINT0_SIZE: u16 = 64;
/// Max packet size for every other endpoint
pub const ENDPOINT_SIZE: u16 = 64;
/// Packets the client should buffer per queue
pub const PACKET_FIFO_COUNT: usize = 32;
/// Pipes the client may describe
pub const PIPE_COUNT: usize = 4;

/// Max packet size for a logical endpoint
pub const fn endpoint_size(endpoint: usize) -> u16 {
    if endpoint == 0 {
        ENDPOINT0_SIZE
    } else {
        ENDPOINT_SIZE
    }
}

/// Pins used by the device controller
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
pub struct UsbPins {
    pub d_plus: Pin,
    pub d_minus: Pin,
    /// Soft-connect
    pub connect: Pin,
    pub vbus: Pin,
}

impl UsbPins {
    /// USB port 1: D+ on P0.29, D- on P0.30, CONNECT on P2.9, VBUS on P1.30
    pub const DEFAULT: UsbPins = UsbPins {
        d_plus: Pin::new(0, 29, 1),
        d_minus: Pin::new(0, 30, 1),
        connect: Pin::new(2, 9, 1),
        vbus: Pin::new(1, 30, 2),
    };

    pub const fn all(&self) -> [Pin; 4] {
        [self.d_plus, self.d_minus, self.connect, self.vbus]
    }
}

impl Default for UsbPins {
    fn default() -> Self {
        Self::DEFAULT
    }
}
