//! The USB device controller's endpoint engine

use super::client::{Capabilities, ControlState, DeviceState, UsbClient};
use super::endpoint::{physical, EndpointConfig, EndpointFlags, BULK};
use super::setup::SetupPacket;
use super::sie::{DeviceInterrupt, DeviceStatus, EndpointSelect, Sie};
use super::{endpoint_size, UsbPins, ENDPOINT0_SIZE, ENDPOINT_COUNT, PACKET_FIFO_COUNT, PIPE_COUNT};
use crate::platform::{Interrupt, Platform};
use crate::{ral, Error};

use embedded_hal::delay::DelayNs;
use usb_device::UsbDirection;

/// Pending marker in `device_address`
const ADDRESS_PENDING: u8 = 0x80;

/// Physical endpoints, two per logical endpoint
const PHYSICAL_COUNT: usize = ENDPOINT_COUNT * 2;

/// Soft-disconnect time before reconnecting, so the host notices
const RECONNECT_DELAY_MS: u32 = 120;

/// A USB device driver
///
/// The driver moves packets between the controller's endpoints and a
/// [`UsbClient`]. After creating the driver,
///
/// - call [`initialize_configuration()`](Driver::initialize_configuration)
///   to bind the client,
/// - call [`initialize()`](Driver::initialize) to connect to the host,
/// - call [`on_interrupt()`](Driver::on_interrupt) from the USB interrupt.
///
/// To share the driver with the interrupt handler, wrap it in a
/// [`Device`](super::Device).
pub struct Driver<C, P> {
    sie: Sie,
    sc: ral::sc::Instance,
    client: C,
    platform: P,
    pins: UsbPins,
    /// The driver owns the pins
    opened: bool,
    endpoints: [EndpointFlags; ENDPOINT_COUNT],
    /// Indexed by physical endpoint
    configs: [EndpointConfig; PHYSICAL_COUNT],
    /// Address to apply after the status stage, with the pending marker
    device_address: u8,
    state: DeviceState,
    previous_state: DeviceState,
    /// The current control transfer answers a short GET_DESCRIPTOR(DEVICE)
    first_descriptor_packet: bool,
    control_buffer: [u8; ENDPOINT0_SIZE as usize],
}

impl<C, P> Driver<C, P> {
    /// Create a driver
    ///
    /// Creation only assigns the register blocks. `sc` is used to power
    /// the controller.
    pub const fn new(usb: ral::usb::Instance, sc: ral::sc::Instance, pins: UsbPins, client: C, platform: P) -> Self {
        Driver {
            sie: Sie::new(usb),
            sc,
            client,
            platform,
            pins,
            opened: false,
            endpoints: [EndpointFlags {
                tx_running: false,
                tx_needs_zlp: false,
                rx_nacking: false,
            }; ENDPOINT_COUNT],
            configs: [EndpointConfig::UNUSED; PHYSICAL_COUNT],
            device_address: 0,
            state: DeviceState::Uninitialized,
            previous_state: DeviceState::Uninitialized,
            first_descriptor_packet: false,
            control_buffer: [0; ENDPOINT0_SIZE as usize],
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut C {
        &mut self.client
    }

    pub fn state(&self) -> DeviceState {
        self.state
    }

    /// The address waiting for the status stage, if any
    pub fn pending_address(&self) -> Option<u8> {
        (self.device_address & ADDRESS_PENDING != 0).then_some(self.device_address & !ADDRESS_PENDING)
    }

    /// The configuration word for a physical endpoint
    pub fn endpoint_config(&self, physical: usize) -> Option<EndpointConfig> {
        self.configs.get(physical).copied()
    }
}

impl<C: UsbClient, P: Platform + DelayNs> Driver<C, P> {
    /// Hand the controller's limits to the client
    pub fn initialize_configuration(&mut self) {
        self.client.bind(Capabilities {
            packet_fifo_count: PACKET_FIFO_COUNT,
            endpoint_count: ENDPOINT_COUNT,
            pipe_count: PIPE_COUNT,
            ep0_max_packet_size: endpoint_size(0),
        });
    }

    /// Build the endpoint configuration from the client's pipes, then
    /// power up and connect
    ///
    /// Fails with [`Error::SharingViolation`] if a USB pin is owned by
    /// someone else.
    pub fn initialize(&mut self) -> Result<(), Error> {
        self.platform.activate_interrupt(Interrupt::Usb);

        self.configs = [EndpointConfig::UNUSED; PHYSICAL_COUNT];
        for pipe in self.client.pipes() {
            let halves = [(pipe.rx, UsbDirection::Out), (pipe.tx, UsbDirection::In)];
            for (endpoint, direction) in halves {
                let Some(endpoint) = endpoint.map(usize::from) else {
                    continue;
                };
                if endpoint == 0 || endpoint >= ENDPOINT_COUNT {
                    warn!("USB PIPE ENDPOINT {} IGNORED", endpoint);
                    continue;
                }
                let max_packet_size = self.client.max_packet_size(endpoint);
                self.configs[physical(endpoint, direction)] = configuration_word(endpoint, direction, max_packet_size);
            }
        }

        self.set_state(DeviceState::Attached);
        if let Err(error) = self.start_hardware() {
            self.platform.deactivate_interrupt(Interrupt::Usb);
            self.set_state(DeviceState::Uninitialized);
            return Err(error);
        }
        Ok(())
    }

    /// Disconnect, and power down the endpoint engine
    pub fn uninitialize(&mut self) {
        self.platform.deactivate_interrupt(Interrupt::Usb);
        self.sie.hardware_reset(ENDPOINT0_SIZE);
        self.device_address = 0;
        self.stop_hardware();
        self.set_state(DeviceState::Uninitialized);
    }

    /// Reset the client layer
    pub fn reset(&mut self) {
        self.client.reset();
    }

    fn start_hardware(&mut self) -> Result<(), Error> {
        self.sie.enable_clocks(&self.sc);

        let pins = self.pins.all();
        for (idx, pin) in pins.iter().enumerate() {
            if !self.platform.open_pin(*pin) {
                for opened in &pins[..idx] {
                    self.platform.close_pin(*opened);
                }
                return Err(Error::SharingViolation);
            }
            self.platform.configure_pin(*pin);
        }
        self.opened = true;

        self.sie.hardware_reset(ENDPOINT0_SIZE);
        self.sie.set_address(0);
        self.sie.enable_interrupts(DeviceInterrupt::DEV_STAT);

        self.sie.connect(false);
        self.platform.delay_ms(RECONNECT_DELAY_MS);
        self.sie.connect(true);
        debug!("USB CONNECT");
        Ok(())
    }

    fn stop_hardware(&mut self) {
        self.sie.connect(false);
        if self.opened {
            for pin in self.pins.all() {
                self.platform.close_pin(pin);
            }
        }
        self.opened = false;
    }

    /// Kick transmission on an endpoint
    ///
    /// If the endpoint is halted, its queue is dropped instead. If a
    /// transmission is already running, the TX interrupt drains the queue.
    /// When the caller already has interrupts masked, a pending completion
    /// can't be delivered, so it's serviced here.
    pub fn start_output(&mut self, endpoint: usize, interrupts_masked: bool) -> bool {
        if endpoint >= ENDPOINT_COUNT {
            return false;
        }

        if self.client.is_halted(endpoint) {
            self.client.clear_endpoint(endpoint);
            return true;
        }

        if !self.endpoints[endpoint].tx_running {
            self.endpoints[endpoint].tx_running = true;
            self.tx_packet(endpoint);
        } else if interrupts_masked {
            let n = physical(endpoint, UsbDirection::In);
            if self.sie.endpoint_interrupts() & (1 << n) != 0 {
                if endpoint == 0 {
                    self.service_control(n);
                } else if self.client.is_tx_queue(endpoint) {
                    self.tx_interrupt(endpoint);
                } else {
                    self.sie.clear_endpoint_interrupt(physical(endpoint, UsbDirection::Out));
                    self.rx_packet(endpoint);
                }
            }
        }
        true
    }

    /// Retry a receive that was held back for lack of queue space
    pub fn rx_enable(&mut self, endpoint: usize) -> bool {
        if endpoint >= ENDPOINT_COUNT {
            return false;
        }
        if self.endpoints[endpoint].rx_nacking {
            self.rx_packet(endpoint);
        }
        true
    }

    /// Handle the USB interrupt
    pub fn on_interrupt(&mut self) {
        let status = self.sie.interrupt_status();
        self.sie.clear_interrupts(status);

        if status.contains(DeviceInterrupt::DEV_STAT) {
            let device = self.sie.device_status();
            if device.contains(DeviceStatus::RST) {
                self.reset_event();
            }
            if device.contains(DeviceStatus::SUS_CH) {
                if device.contains(DeviceStatus::SUS) {
                    self.suspend_event();
                } else {
                    self.resume_event();
                }
            }
            return;
        }

        if status.contains(DeviceInterrupt::EP_SLOW) {
            for n in 0..PHYSICAL_COUNT {
                if self.sie.endpoint_interrupts() & (1 << n) != 0 {
                    self.service_endpoint(n);
                }
            }
        }
    }

    fn service_endpoint(&mut self, n: usize) {
        let endpoint = n / 2;
        if endpoint == 0 {
            self.service_control(n);
        } else if n % 2 == 0 {
            self.sie.clear_endpoint_interrupt(n);
            self.rx_packet(endpoint);
        } else {
            self.tx_interrupt(endpoint);
        }
    }

    fn service_control(&mut self, n: usize) {
        let select = self.sie.clear_endpoint_interrupt(n);
        if select.contains(EndpointSelect::STP) {
            self.control_setup();
        } else if n % 2 == 1 {
            self.control_in();
        } else {
            trace!("EP0 OUT");
        }
    }

    fn control_setup(&mut self) {
        let length = self.sie.read_endpoint(0, &mut self.control_buffer);
        let mut raw = [0u8; 8];
        let copied = length.min(raw.len());
        raw[..copied].copy_from_slice(&self.control_buffer[..copied]);
        let setup = SetupPacket::from_bytes(&raw);
        self.first_descriptor_packet = setup.is_short_device_descriptor_request();

        let result = self.client.control_request(&setup, &self.control_buffer[..length]);
        debug!("EP0 SETUP {:?}", result);
        match result {
            ControlState::Address(address) => self.device_address = address | ADDRESS_PENDING,
            ControlState::Done => self.client.finish_control_data(),
            ControlState::Stall => {
                self.sie.stall(physical(0, UsbDirection::Out));
                self.sie.stall(physical(0, UsbDirection::In));
                return;
            }
            ControlState::Configuration => self.configure(),
            ControlState::Data => {}
        }

        self.control_next();

        if result == ControlState::Configuration {
            for endpoint in 0..ENDPOINT_COUNT {
                if self.client.is_tx_queue(endpoint) {
                    self.start_output(endpoint, true);
                }
            }
        }
    }

    /// Realize every configured endpoint
    fn configure(&mut self) {
        self.sie.configure_device(true);
        for n in 0..PHYSICAL_COUNT {
            let config = self.configs[n];
            if config.is_enabled() {
                self.sie.realize(n, config.max_packet_size() as u16);
                self.sie.enable_endpoint(n);
            }
        }
        self.set_state(DeviceState::Configured);
        debug!("CONFIGURED");
    }

    /// Send the next chunk of the control data stage
    fn control_next(&mut self) {
        let Some(chunk) = self.client.control_data() else {
            return;
        };
        let length = chunk.len();
        if length == 0 {
            self.sie.write_endpoint(0, &[]);
            self.client.finish_control_data();
        } else {
            self.sie.write_endpoint(0, chunk);
            if length < usize::from(ENDPOINT0_SIZE) || self.first_descriptor_packet {
                self.client.finish_control_data();
            }
        }
    }

    fn control_in(&mut self) {
        self.control_next();
        if let Some(address) = self.pending_address() {
            self.device_address = address;
            self.sie.set_address(address);
            debug!("ADDRESS {}", address);
            self.set_state(if address == 0 {
                DeviceState::Default
            } else {
                DeviceState::Addressed
            });
        }
    }

    fn tx_interrupt(&mut self, endpoint: usize) {
        let n = physical(endpoint, UsbDirection::In);
        if self.sie.endpoint_interrupts() & (1 << n) != 0 {
            self.sie.clear_endpoint_interrupt(n);
            self.tx_packet(endpoint);
        }
    }

    /// Write the next queued packet, or finish the transfer
    fn tx_packet(&mut self, endpoint: usize) {
        let max_packet_size = usize::from(self.client.max_packet_size(endpoint));
        let written = loop {
            match self.client.tx_dequeue(endpoint) {
                None => break None,
                Some([]) => continue,
                Some(packet) => {
                    self.sie.write_endpoint(endpoint, packet);
                    break Some(packet.len());
                }
            }
        };

        let flags = &mut self.endpoints[endpoint];
        match written {
            Some(length) => flags.tx_needs_zlp = length == max_packet_size,
            None => {
                if flags.tx_needs_zlp {
                    self.sie.write_endpoint(endpoint, &[]);
                    flags.tx_needs_zlp = false;
                }
                flags.tx_running = false;
            }
        }
    }

    fn rx_packet(&mut self, endpoint: usize) {
        match self.client.rx_enqueue(endpoint) {
            Some(packet) => {
                packet.size = self.sie.read_endpoint(endpoint, &mut packet.buffer);
                self.endpoints[endpoint].rx_nacking = false;
            }
            None => {
                trace!("EP{} OUT NAK", endpoint);
                self.endpoints[endpoint].rx_nacking = true;
            }
        }
    }

    fn reset_event(&mut self) {
        self.sie.hardware_reset(ENDPOINT0_SIZE);
        self.device_address = 0;
        self.client.clear_events(u32::MAX);
        self.endpoints = [EndpointFlags::default(); ENDPOINT_COUNT];
        debug!("RESET");
        self.set_state(DeviceState::Default);
    }

    fn suspend_event(&mut self) {
        if self.state != DeviceState::Suspended {
            self.previous_state = self.state;
        }
        self.set_state(DeviceState::Suspended);
    }

    fn resume_event(&mut self) {
        if self.state == DeviceState::Suspended {
            self.set_state(self.previous_state);
        }
    }

    fn set_state(&mut self, state: DeviceState) {
        self.state = state;
        self.client.state_changed(state);
    }
}

/// A bulk endpoint in configuration 1, interface 0. OUT endpoints are
/// single buffered, and IN endpoints are double buffered.
fn configuration_word(endpoint: usize, direction: UsbDirection, max_packet_size: u16) -> EndpointConfig {
    let is_in = matches!(direction, UsbDirection::In) as u32;
    EndpointConfig::UNUSED
        .with_enable(1)
        .with_double_buffered(is_in)
        .with_max_packet_size(u32::from(max_packet_size))
        .with_direction(is_in)
        .with_kind(BULK)
        .with_number(endpoint as u32)
        .with_alternate_interface(0)
        .with_interface(0)
        .with_configuration(1)
}

#[cfg(test)]
pub(crate) mod tests {
    extern crate std;

    use super::Driver;
    use crate::platform::{fake::FakePlatform, Interrupt};
    use crate::ral::{self, testing::leak};
    use crate::usb::client::{Capabilities, ControlState, DeviceState, Packet, Pipe, UsbClient};
    use crate::usb::endpoint::physical;
    use crate::usb::setup::SetupPacket;
    use crate::usb::sie::{DeviceInterrupt, DeviceStatus, EndpointSelect};
    use crate::usb::UsbPins;
    use crate::Error;
    use std::{collections::VecDeque, vec, vec::Vec};
    use usb_device::UsbDirection;

    /// A client with scripted answers, that records what the driver did
    #[derive(Default)]
    pub struct FakeClient {
        pub capabilities: Option<Capabilities>,
        pub pipes: Vec<Pipe>,
        pub tx: [VecDeque<Vec<u8>>; 16],
        pub current_tx: Vec<u8>,
        pub rx: Vec<Packet>,
        pub rx_space: usize,
        pub control: VecDeque<ControlState>,
        pub setups: Vec<SetupPacket>,
        pub data: VecDeque<Vec<u8>>,
        pub current_data: Vec<u8>,
        pub data_active: bool,
        pub states: Vec<DeviceState>,
        pub halted: u16,
        pub cleared: Vec<usize>,
        pub events_cleared: u32,
        pub resets: usize,
    }

    impl UsbClient for FakeClient {
        fn bind(&mut self, capabilities: Capabilities) {
            self.capabilities = Some(capabilities);
        }
        fn pipes(&self) -> &[Pipe] {
            &self.pipes
        }
        fn max_packet_size(&self, _: usize) -> u16 {
            64
        }
        fn tx_dequeue(&mut self, endpoint: usize) -> Option<&[u8]> {
            self.current_tx = self.tx[endpoint].pop_front()?;
            Some(&self.current_tx)
        }
        fn rx_enqueue(&mut self, _: usize) -> Option<&mut Packet> {
            if self.rx_space == 0 {
                return None;
            }
            self.rx_space -= 1;
            self.rx.push(Packet::new());
            self.rx.last_mut()
        }
        fn control_request(&mut self, setup: &SetupPacket, _: &[u8]) -> ControlState {
            self.setups.push(*setup);
            let state = self.control.pop_front().unwrap_or(ControlState::Done);
            self.data_active = state == ControlState::Data;
            state
        }
        fn control_data(&mut self) -> Option<&[u8]> {
            if !self.data_active {
                return None;
            }
            self.current_data = self.data.pop_front().unwrap_or_default();
            Some(&self.current_data)
        }
        fn finish_control_data(&mut self) {
            self.data_active = false;
        }
        fn state_changed(&mut self, state: DeviceState) {
            self.states.push(state);
        }
        fn is_halted(&self, endpoint: usize) -> bool {
            self.halted & (1 << endpoint) != 0
        }
        fn clear_endpoint(&mut self, endpoint: usize) {
            self.tx[endpoint].clear();
            self.cleared.push(endpoint);
        }
        fn is_tx_queue(&self, endpoint: usize) -> bool {
            self.pipes.iter().any(|pipe| pipe.tx == Some(endpoint as u8))
        }
        fn clear_events(&mut self, events: u32) {
            self.events_cleared = events;
        }
        fn reset(&mut self) {
            self.resets += 1;
        }
    }

    const HANDSHAKE: u32 = DeviceInterrupt::CCEMTY.bits() | DeviceInterrupt::CDFULL.bits() | DeviceInterrupt::EP_RLZED.bits();
    const SENTINEL: u32 = 0xDEAD;

    pub fn driver(
        client: FakeClient,
    ) -> (
        &'static ral::usb::RegisterBlock,
        &'static ral::sc::RegisterBlock,
        Driver<FakeClient, FakePlatform>,
        FakePlatform,
    ) {
        let (usb, usb_instance) = leak(ral::usb::RegisterBlock::new());
        let (sc, sc_instance) = leak(ral::sc::RegisterBlock::new());
        usb.DEVINTST.write(HANDSHAKE);
        let platform = FakePlatform::default();
        let driver = Driver::new(usb_instance, sc_instance, UsbPins::DEFAULT, client, platform.clone());
        (usb, sc, driver, platform)
    }

    fn bulk_client() -> FakeClient {
        FakeClient {
            pipes: vec![Pipe {
                rx: Some(2),
                tx: Some(1),
            }],
            rx_space: 1,
            ..FakeClient::default()
        }
    }

    /// Raise an endpoint interrupt, with a select-endpoint result
    fn endpoint_event(usb: &ral::usb::RegisterBlock, physical: usize, select: EndpointSelect) {
        usb.DEVINTST.write(HANDSHAKE | DeviceInterrupt::EP_SLOW.bits());
        usb.EPINTST.write(1 << physical);
        usb.CMDDATA.write(select.bits());
    }

    fn device_event(usb: &ral::usb::RegisterBlock, status: DeviceStatus) {
        usb.DEVINTST.write(HANDSHAKE | DeviceInterrupt::DEV_STAT.bits());
        usb.CMDDATA.write(status.bits());
    }

    /// Load a SETUP packet with a zero index into the receive FIFO
    fn setup_packet(usb: &ral::usb::RegisterBlock, request: u8, value_high: u8, length: u16) {
        let [length_low, length_high] = length.to_le_bytes();
        usb.RXPLEN.write((1 << 11) | 8);
        usb.RXDATA.write(u32::from_le_bytes([0x80, request, 0x00, value_high]));
        usb.RXDATA.write(u32::from_le_bytes([0x00, 0x00, length_low, length_high]));
    }

    #[test]
    fn bind_reports_limits() {
        let (_, _, mut driver, _) = driver(FakeClient::default());
        driver.initialize_configuration();
        let capabilities = driver.client().capabilities.unwrap();
        assert_eq!(capabilities.endpoint_count, 16);
        assert_eq!(capabilities.ep0_max_packet_size, 64);
    }

    #[test]
    fn initialize_connects() {
        let (usb, sc, mut driver, platform) = driver(bulk_client());
        driver.initialize().unwrap();

        assert_eq!(sc.PCONP.read(), 1 << 31);
        assert_eq!(usb.CLKCTRL.read(), 0b1_1010);
        assert_eq!(usb.DEVINTEN.read(), DeviceInterrupt::DEV_STAT.bits());
        assert_eq!(usb.CMDCODE.read(), 0x0001_0100, "connected");
        assert_eq!(driver.state(), DeviceState::Attached);
        assert_eq!(driver.client().states, [DeviceState::Attached]);

        let log = platform.log();
        assert_eq!(log.active, [Interrupt::Usb]);
        assert_eq!(log.open.len(), 4);
        assert_eq!(log.delays_ns, 120_000_000);
    }

    #[test]
    fn pipes_become_configuration_words() {
        let (_, _, mut driver, _) = driver(bulk_client());
        driver.initialize().unwrap();

        let tx = driver.endpoint_config(physical(1, UsbDirection::In)).unwrap();
        assert!(tx.is_enabled() && tx.is_in());
        assert_eq!(tx.double_buffered(), 1);
        assert_eq!(tx.number(), 1);

        let rx = driver.endpoint_config(physical(2, UsbDirection::Out)).unwrap();
        assert!(rx.is_enabled() && !rx.is_in());
        assert_eq!(rx.double_buffered(), 0);
        assert_eq!(rx.max_packet_size(), 64);
        assert_eq!(rx.configuration(), 1);

        assert!(!driver.endpoint_config(physical(3, UsbDirection::In)).unwrap().is_enabled());
    }

    #[test]
    fn busy_pin_fails_initialize() {
        let (_, _, mut driver, platform) = driver(bulk_client());
        platform.0.borrow_mut().busy.push(UsbPins::DEFAULT.connect.number);
        assert_eq!(driver.initialize(), Err(Error::SharingViolation));
        assert_eq!(driver.state(), DeviceState::Uninitialized);
        let log = platform.log();
        assert!(log.open.is_empty());
        assert!(log.active.is_empty());
    }

    #[test]
    fn uninitialize_leaves_foreign_pins() {
        let (_, _, mut driver, platform) = driver(bulk_client());
        let connect = UsbPins::DEFAULT.connect.number;
        platform.0.borrow_mut().open.push(connect);

        assert_eq!(driver.initialize(), Err(Error::SharingViolation));
        assert_eq!(platform.log().open, [connect]);
        driver.uninitialize();
        assert_eq!(platform.log().open, [connect]);

        let (_, _, mut idle, platform) = self::driver(bulk_client());
        platform.0.borrow_mut().open.push(connect);
        idle.uninitialize();
        assert_eq!(platform.log().open, [connect]);
    }

    #[test]
    fn uninitialize_disconnects() {
        let (usb, _, mut driver, platform) = driver(bulk_client());
        driver.initialize().unwrap();
        driver.uninitialize();
        assert_eq!(usb.CMDCODE.read(), 0x0000_0100, "disconnected");
        assert_eq!(driver.state(), DeviceState::Uninitialized);
        assert!(platform.log().open.is_empty());
    }

    #[test]
    fn reset_event_clears_endpoints() {
        let mut client = bulk_client();
        client.tx[1].push_back(vec![0; 64]);
        let (usb, _, mut driver, _) = driver(client);
        driver.start_output(1, false);
        assert!(driver.endpoints[1].tx_running);
        assert!(driver.endpoints[1].tx_needs_zlp);

        device_event(usb, DeviceStatus::RST | DeviceStatus::CON);
        driver.on_interrupt();

        assert!(driver.endpoints.iter().all(|ep| !ep.tx_running && !ep.tx_needs_zlp));
        assert_eq!(driver.state(), DeviceState::Default);
        assert_eq!(driver.client().events_cleared, u32::MAX);
        assert_eq!(
            usb.DEVINTEN.read(),
            (DeviceInterrupt::DEV_STAT | DeviceInterrupt::EP_SLOW).bits()
        );
    }

    #[test]
    fn suspend_and_resume() {
        let (usb, _, mut driver, _) = driver(FakeClient::default());
        device_event(usb, DeviceStatus::RST);
        driver.on_interrupt();

        device_event(usb, DeviceStatus::SUS_CH | DeviceStatus::SUS);
        driver.on_interrupt();
        assert_eq!(driver.state(), DeviceState::Suspended);
        driver.on_interrupt();

        device_event(usb, DeviceStatus::SUS_CH);
        driver.on_interrupt();
        assert_eq!(driver.state(), DeviceState::Default);
        assert_eq!(
            driver.client().states,
            [
                DeviceState::Default,
                DeviceState::Suspended,
                DeviceState::Suspended,
                DeviceState::Default
            ]
        );
    }

    #[test]
    fn device_event_skips_endpoints() {
        let mut client = bulk_client();
        client.tx[1].push_back(vec![1]);
        let (usb, _, mut driver, _) = driver(client);
        usb.DEVINTST
            .write(HANDSHAKE | (DeviceInterrupt::DEV_STAT | DeviceInterrupt::EP_SLOW).bits());
        usb.EPINTST.write(1 << physical(1, UsbDirection::In));
        usb.CMDDATA.write(0);
        driver.on_interrupt();
        assert_eq!(driver.client().tx[1].len(), 1);
    }

    #[test]
    fn set_address_after_status_stage() {
        let mut client = FakeClient::default();
        client.control.push_back(ControlState::Address(5));
        let (usb, _, mut driver, _) = driver(client);

        setup_packet(usb, 0x05, 0x00, 0);
        endpoint_event(usb, 0, EndpointSelect::STP);
        driver.on_interrupt();
        assert_eq!(driver.pending_address(), Some(5));
        assert_ne!(usb.CMDCODE.read(), 0x0085_0100);

        endpoint_event(usb, 1, EndpointSelect::empty());
        driver.on_interrupt();
        assert_eq!(driver.pending_address(), None);
        assert_eq!(usb.CMDCODE.read(), 0x0085_0100);
        assert_eq!(driver.state(), DeviceState::Addressed);
    }

    #[test]
    fn stall_both_directions() {
        let mut client = FakeClient::default();
        client.control.push_back(ControlState::Stall);
        let (usb, _, mut driver, _) = driver(client);

        setup_packet(usb, 0x01, 0x00, 0);
        endpoint_event(usb, 0, EndpointSelect::STP);
        driver.on_interrupt();
        // Set endpoint status (0x41), data ST
        assert_eq!(usb.CMDCODE.read(), 0x0001_0100);
        assert_eq!(driver.client().setups.len(), 1);
    }

    #[test]
    fn control_data_stage() {
        let mut client = FakeClient::default();
        client.control.push_back(ControlState::Data);
        client.data.push_back(vec![0xAB; 64]);
        client.data.push_back(vec![0xCD; 10]);
        let (usb, _, mut driver, _) = driver(client);

        setup_packet(usb, 0x06, 0x02, 74);
        endpoint_event(usb, 0, EndpointSelect::STP);
        driver.on_interrupt();
        assert_eq!(usb.TXPLEN.read(), 64);
        assert!(driver.client().data_active);

        endpoint_event(usb, 1, EndpointSelect::empty());
        driver.on_interrupt();
        assert_eq!(usb.TXPLEN.read(), 10);
        assert!(!driver.client().data_active, "short packet ends the stage");
    }

    #[test]
    fn short_device_descriptor_sends_one_packet() {
        let mut client = FakeClient::default();
        client.control.push_back(ControlState::Data);
        client.data.push_back(vec![0x12; 64]);
        let (usb, _, mut driver, _) = driver(client);

        setup_packet(usb, 0x06, 0x01, 8);
        endpoint_event(usb, 0, EndpointSelect::STP);
        driver.on_interrupt();
        assert_eq!(driver.client().setups[0].length, 8);
        assert!(driver.first_descriptor_packet);
        assert_eq!(usb.TXPLEN.read(), 64);
        assert!(!driver.client().data_active);
    }

    #[test]
    fn full_device_descriptor_keeps_data_stage() {
        let mut client = FakeClient::default();
        client.control.push_back(ControlState::Data);
        client.data.push_back(vec![0x12; 64]);
        let (usb, _, mut driver, _) = driver(client);

        setup_packet(usb, 0x06, 0x01, 18);
        endpoint_event(usb, 0, EndpointSelect::STP);
        driver.on_interrupt();
        assert_eq!(driver.client().setups[0].length, 18);
        assert!(!driver.first_descriptor_packet);
        assert_eq!(usb.TXPLEN.read(), 64);
        assert!(driver.client().data_active, "a full packet continues the stage");
    }

    #[test]
    fn empty_control_data_sends_zlp() {
        let mut client = FakeClient::default();
        client.control.push_back(ControlState::Data);
        let (usb, _, mut driver, _) = driver(client);

        usb.TXPLEN.write(SENTINEL);
        setup_packet(usb, 0x06, 0x02, 74);
        endpoint_event(usb, 0, EndpointSelect::STP);
        driver.on_interrupt();
        assert_eq!(usb.TXPLEN.read(), 0);
        assert!(!driver.client().data_active);
    }

    #[test]
    fn configuration_realizes_and_flushes() {
        let mut client = bulk_client();
        client.control.push_back(ControlState::Configuration);
        client.tx[1].push_back(vec![7; 3]);
        let (usb, _, mut driver, _) = driver(client);
        driver.initialize().unwrap();

        setup_packet(usb, 0x09, 0x00, 0);
        endpoint_event(usb, 0, EndpointSelect::STP);
        driver.on_interrupt();

        assert_eq!(
            usb.REEP.read(),
            0b11 | 1 << physical(1, UsbDirection::In) | 1 << physical(2, UsbDirection::Out)
        );
        assert_eq!(driver.state(), DeviceState::Configured);
        assert!(driver.client().tx[1].is_empty(), "queued data flushed");
        assert_eq!(usb.TXPLEN.read(), 3);
        assert!(driver.endpoints[1].tx_running);
    }

    #[test]
    fn tx_zlp_after_full_packet() {
        let mut client = bulk_client();
        client.tx[1].push_back(vec![]);
        client.tx[1].push_back(vec![1; 64]);
        let (usb, _, mut driver, _) = driver(client);

        assert!(driver.start_output(1, false));
        assert_eq!(usb.TXPLEN.read(), 64, "placeholder skipped");

        usb.TXPLEN.write(SENTINEL);
        endpoint_event(usb, physical(1, UsbDirection::In), EndpointSelect::empty());
        driver.on_interrupt();
        assert_eq!(usb.TXPLEN.read(), 0);
        assert!(!driver.endpoints[1].tx_running);
        assert!(!driver.endpoints[1].tx_needs_zlp);
    }

    #[test]
    fn tx_no_zlp_after_short_packet() {
        let mut client = bulk_client();
        client.tx[1].push_back(vec![1; 10]);
        let (usb, _, mut driver, _) = driver(client);

        driver.start_output(1, false);
        usb.TXPLEN.write(SENTINEL);
        endpoint_event(usb, physical(1, UsbDirection::In), EndpointSelect::empty());
        driver.on_interrupt();
        assert_eq!(usb.TXPLEN.read(), SENTINEL);
        assert!(!driver.endpoints[1].tx_running);
    }

    #[test]
    fn halted_endpoint_drops_queue() {
        let mut client = bulk_client();
        client.halted = 1 << 1;
        client.tx[1].push_back(vec![1; 10]);
        let (usb, _, mut driver, _) = driver(client);

        usb.TXPLEN.write(SENTINEL);
        assert!(driver.start_output(1, false));
        assert_eq!(usb.TXPLEN.read(), SENTINEL);
        assert_eq!(driver.client().cleared, [1]);
        assert!(!driver.endpoints[1].tx_running);
    }

    #[test]
    fn masked_start_output_services_completion() {
        let mut client = bulk_client();
        client.tx[1].push_back(vec![1; 10]);
        client.tx[1].push_back(vec![2; 20]);
        let (usb, _, mut driver, _) = driver(client);

        driver.start_output(1, false);
        usb.EPINTST.write(1 << physical(1, UsbDirection::In));

        driver.start_output(1, false);
        assert_eq!(usb.TXPLEN.read(), 10, "unmasked callers wait for the interrupt");

        driver.start_output(1, true);
        assert_eq!(usb.TXPLEN.read(), 20);
    }

    #[test]
    fn rx_back_pressure() {
        let mut client = bulk_client();
        client.rx_space = 0;
        let (usb, _, mut driver, _) = driver(client);

        usb.RXPLEN.write((1 << 11) | 4);
        usb.RXDATA.write(u32::from_le_bytes([1, 2, 3, 4]));
        endpoint_event(usb, physical(2, UsbDirection::Out), EndpointSelect::F);
        driver.on_interrupt();
        assert!(driver.endpoints[2].rx_nacking);
        assert!(driver.client().rx.is_empty());

        driver.client_mut().rx_space = 1;
        assert!(driver.rx_enable(2));
        assert!(!driver.endpoints[2].rx_nacking);
        assert_eq!(driver.client().rx[0].data(), [1, 2, 3, 4]);
    }

    #[test]
    fn out_of_range_endpoints() {
        let (_, _, mut driver, _) = driver(FakeClient::default());
        assert!(!driver.start_output(16, false));
        assert!(!driver.rx_enable(16));
    }

    #[test]
    fn reset_resets_client() {
        let (_, _, mut driver, _) = driver(FakeClient::default());
        driver.reset();
        assert_eq!(driver.client().resets, 1);
    }
}
