//! The boundary between the endpoint engine and the USB client layer
//!
//! The client layer owns descriptors, standard request handling, and the
//! packet queues. The [`Driver`](super::Driver) calls into it through
//! [`UsbClient`].

use super::setup::SetupPacket;

/// USB device states
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
pub enum DeviceState {
    #[default]
    Uninitialized,
    Attached,
    Default,
    Addressed,
    Configured,
    Suspended,
}

/// What the client decided about a SETUP packet
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
pub enum ControlState {
    /// A data stage follows
    Data,
    /// Apply this address after the status stage
    Address(u8),
    /// Request complete, no data stage
    Done,
    /// Stall the control endpoint
    Stall,
    /// The host selected a configuration
    Configuration,
}

/// A full-speed packet buffer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Packet {
    pub size: usize,
    pub buffer: [u8; 64],
}

impl Packet {
    pub const fn new() -> Self {
        Packet {
            size: 0,
            buffer: [0; 64],
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.buffer[..self.size.min(self.buffer.len())]
    }
}

impl Default for Packet {
    fn default() -> Self {
        Self::new()
    }
}

/// Logical endpoints that carry one client stream
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
pub struct Pipe {
    /// OUT endpoint
    pub rx: Option<u8>,
    /// IN endpoint
    pub tx: Option<u8>,
}

/// Controller limits, handed to the client when it binds
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
pub struct Capabilities {
    pub packet_fifo_count: usize,
    pub endpoint_count: usize,
    pub pipe_count: usize,
    pub ep0_max_packet_size: u16,
}

/// The USB client layer
///
/// Endpoint arguments are logical endpoint numbers, less than
/// [`ENDPOINT_COUNT`](super::ENDPOINT_COUNT).
pub trait UsbClient {
    /// Receive the controller's limits
    fn bind(&mut self, capabilities: Capabilities);

    /// The client's pipes
    fn pipes(&self) -> &[Pipe];

    fn max_packet_size(&self, endpoint: usize) -> u16;

    /// Take the next outbound packet
    ///
    /// Zero-length entries are placeholders, and are skipped.
    fn tx_dequeue(&mut self, endpoint: usize) -> Option<&[u8]>;

    /// Find space for an inbound packet
    ///
    /// Returns `None` when the queue is full. The driver holds the packet in
    /// hardware until [`rx_enable`](super::Driver::rx_enable).
    fn rx_enqueue(&mut self, endpoint: usize) -> Option<&mut Packet>;

    /// Classify a SETUP packet
    ///
    /// `raw` is everything the host sent, usually the 8 SETUP bytes.
    fn control_request(&mut self, setup: &SetupPacket, raw: &[u8]) -> ControlState;

    /// Produce the next chunk of the control data stage
    ///
    /// Returns `None` if there's no data stage in progress, and an empty
    /// slice once everything is sent.
    fn control_data(&mut self) -> Option<&[u8]>;

    /// End the control data stage
    fn finish_control_data(&mut self);

    fn state_changed(&mut self, state: DeviceState);

    /// Indicates if the host halted the endpoint
    fn is_halted(&self, endpoint: usize) -> bool;

    /// Drop everything queued on the endpoint
    fn clear_endpoint(&mut self, endpoint: usize);

    /// Indicates if the endpoint has a transmit queue
    fn is_tx_queue(&self, endpoint: usize) -> bool;

    /// Clear pending client events
    fn clear_events(&mut self, events: u32);

    /// Return the client layer to its power-on state
    fn reset(&mut self);
}
