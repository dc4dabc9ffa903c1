//! Serial interface engine commands, and endpoint FIFO access
//!
//! The device controller exposes most of its state through commands
//! written to `CMDCODE`. Each command, and each data phase, handshakes on
//! the command-code-empty (`CCEMTY`) or command-data-full (`CDFULL`)
//! interrupt bits.

use crate::ral;
use bitflags::bitflags;
use usb_device::UsbDirection;

use super::endpoint::physical;

bitflags! {
    /// Device interrupt status / enable / clear bits
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct DeviceInterrupt: u32 {
        const FRAME = 1 << 0;
        const EP_FAST = 1 << 1;
        const EP_SLOW = 1 << 2;
        const DEV_STAT = 1 << 3;
        const CCEMTY = 1 << 4;
        const CDFULL = 1 << 5;
        const RX_ENDPKT = 1 << 6;
        const TX_ENDPKT = 1 << 7;
        const EP_RLZED = 1 << 8;
        const ERR = 1 << 9;
    }

    /// Result of the get-device-status command
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct DeviceStatus: u32 {
        const CON = 1 << 0;
        const CON_CH = 1 << 1;
        const SUS = 1 << 2;
        const SUS_CH = 1 << 3;
        const RST = 1 << 4;
    }

    /// Result of the select-endpoint command
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct EndpointSelect: u32 {
        /// A receive buffer is full, or a transmit buffer is empty
        const F = 1 << 0;
        const ST = 1 << 1;
        /// The last received packet was a SETUP
        const STP = 1 << 2;
        const PO = 1 << 3;
        const EPN = 1 << 4;
        const B_1_FULL = 1 << 5;
        const B_2_FULL = 1 << 6;
    }

    /// Argument to the set-endpoint-status command
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct EndpointStatus: u32 {
        const ST = 1 << 0;
        const DA = 1 << 5;
        const RF_MO = 1 << 6;
        const CND_ST = 1 << 7;
    }
}

/// Command codes
mod code {
    pub const SET_ADDR: u32 = 0xD0;
    pub const CFG_DEV: u32 = 0xD8;
    pub const SET_DEV_STAT: u32 = 0xFE;
    pub const GET_DEV_STAT: u32 = 0xFE;
    pub const CLR_BUF: u32 = 0xF2;
    pub const VALID_BUF: u32 = 0xFA;

    pub const fn select_endpoint(physical: usize) -> u32 {
        physical as u32
    }

    pub const fn set_endpoint_status(physical: usize) -> u32 {
        0x40 + physical as u32
    }
}

/// Enable bit for `SET_ADDR`
const DEV_EN: u32 = 0x80;

/// Logical endpoints that are isochronous, and have no buffer to clear
const ISOCHRONOUS: u32 = 0x1248;

pub(crate) struct Sie {
    regs: ral::usb::Instance,
}

impl Sie {
    pub const fn new(regs: ral::usb::Instance) -> Self {
        Sie { regs }
    }

    fn wait_for(&self, bits: DeviceInterrupt) {
        while ral::read_reg!(ral::usb, self.regs, DEVINTST) & bits.bits() == 0 {
            core::hint::spin_loop();
        }
    }

    pub fn interrupt_status(&self) -> DeviceInterrupt {
        DeviceInterrupt::from_bits_truncate(ral::read_reg!(ral::usb, self.regs, DEVINTST))
    }

    pub fn clear_interrupts(&self, bits: DeviceInterrupt) {
        ral::write_reg!(ral::usb, self.regs, DEVINTCLR, bits.bits());
    }

    pub fn enable_interrupts(&self, bits: DeviceInterrupt) {
        ral::write_reg!(ral::usb, self.regs, DEVINTEN, bits.bits());
    }

    pub fn command(&self, code: u32) {
        self.clear_interrupts(DeviceInterrupt::CCEMTY | DeviceInterrupt::CDFULL);
        ral::write_reg!(ral::usb, self.regs, CMDCODE, CMD_PHASE: COMMAND, CMD_CODE_WDATA: code);
        self.wait_for(DeviceInterrupt::CCEMTY);
    }

    pub fn command_write(&self, code: u32, data: u32) {
        self.clear_interrupts(DeviceInterrupt::CCEMTY);
        ral::write_reg!(ral::usb, self.regs, CMDCODE, CMD_PHASE: COMMAND, CMD_CODE_WDATA: code);
        self.wait_for(DeviceInterrupt::CCEMTY);
        self.clear_interrupts(DeviceInterrupt::CCEMTY);
        ral::write_reg!(ral::usb, self.regs, CMDCODE, CMD_PHASE: WRITE, CMD_CODE_WDATA: data);
        self.wait_for(DeviceInterrupt::CCEMTY);
    }

    pub fn command_read(&self, code: u32) -> u32 {
        self.clear_interrupts(DeviceInterrupt::CCEMTY | DeviceInterrupt::CDFULL);
        ral::write_reg!(ral::usb, self.regs, CMDCODE, CMD_PHASE: READ, CMD_CODE_WDATA: code);
        self.wait_for(DeviceInterrupt::CDFULL);
        ral::read_reg!(ral::usb, self.regs, CMDDATA)
    }

    pub fn device_status(&self) -> DeviceStatus {
        self.command(code::GET_DEV_STAT);
        DeviceStatus::from_bits_truncate(self.command_read(code::GET_DEV_STAT))
    }

    /// Apply a device address
    ///
    /// The controller wants the command twice. The first takes effect
    /// immediately, and the second covers the status stage.
    pub fn set_address(&self, address: u8) {
        let data = DEV_EN | u32::from(address & 0x7F);
        self.command_write(code::SET_ADDR, data);
        self.command_write(code::SET_ADDR, data);
    }

    /// Drive the soft-connect pin
    pub fn connect(&self, connect: bool) {
        let status = if connect { DeviceStatus::CON } else { DeviceStatus::empty() };
        self.command_write(code::SET_DEV_STAT, status.bits());
    }

    /// Mark the device configured, and realize only the control endpoints
    pub fn configure_device(&self, configured: bool) {
        self.command_write(code::CFG_DEV, configured as u32);
        ral::write_reg!(ral::usb, self.regs, REEP, 0b11);
        self.wait_for(DeviceInterrupt::EP_RLZED);
        self.clear_interrupts(DeviceInterrupt::EP_RLZED);
    }

    /// Realize a physical endpoint with a max packet size
    pub fn realize(&self, physical: usize, max_packet_size: u16) {
        ral::modify_reg!(ral::usb, self.regs, REEP, |reep| reep | (1 << physical));
        ral::write_reg!(ral::usb, self.regs, EPIND, physical as u32);
        ral::write_reg!(ral::usb, self.regs, MAXPSIZE, MPS: u32::from(max_packet_size));
        self.wait_for(DeviceInterrupt::EP_RLZED);
        self.clear_interrupts(DeviceInterrupt::EP_RLZED);
    }

    pub fn set_endpoint_status(&self, physical: usize, status: EndpointStatus) {
        self.command_write(code::set_endpoint_status(physical), status.bits());
    }

    /// Clear an endpoint's stall and disabled state, which also resets its
    /// data toggle
    pub fn enable_endpoint(&self, physical: usize) {
        self.set_endpoint_status(physical, EndpointStatus::empty());
    }

    pub fn stall(&self, physical: usize) {
        self.set_endpoint_status(physical, EndpointStatus::ST);
    }

    /// Endpoints with pending interrupts, one bit per physical endpoint
    pub fn endpoint_interrupts(&self) -> u32 {
        ral::read_reg!(ral::usb, self.regs, EPINTST)
    }

    /// Clear a physical endpoint's interrupt, and collect the
    /// select-endpoint result the controller loads in response
    pub fn clear_endpoint_interrupt(&self, physical: usize) -> EndpointSelect {
        ral::write_reg!(ral::usb, self.regs, EPINTCLR, 1 << physical);
        self.wait_for(DeviceInterrupt::CDFULL);
        EndpointSelect::from_bits_truncate(ral::read_reg!(ral::usb, self.regs, CMDDATA))
    }

    /// Reset the control endpoints' packet sizes, and every endpoint and
    /// device interrupt
    pub fn hardware_reset(&self, ep0_size: u16) {
        for physical in 0..2 {
            ral::write_reg!(ral::usb, self.regs, EPIND, physical);
            ral::write_reg!(ral::usb, self.regs, MAXPSIZE, MPS: u32::from(ep0_size));
        }
        self.wait_for(DeviceInterrupt::EP_RLZED);

        ral::write_reg!(ral::usb, self.regs, EPINTCLR, u32::MAX);
        ral::write_reg!(ral::usb, self.regs, EPINTEN, u32::MAX);
        ral::write_reg!(ral::usb, self.regs, DEVINTCLR, u32::MAX);
        self.enable_interrupts(DeviceInterrupt::DEV_STAT | DeviceInterrupt::EP_SLOW);
    }

    /// Power and clock the controller
    pub fn enable_clocks(&self, sc: &ral::sc::Instance) {
        ral::modify_reg!(ral::sc, sc, PCONP, PCUSB: 1);
        ral::write_reg!(ral::usb, self.regs, CLKCTRL, DEV_CLK_EN: 1, PORTSEL_CLK_EN: 1, AHB_CLK_EN: 1);
    }

    /// Read the next packet from a logical OUT endpoint into `buffer`
    ///
    /// Bytes beyond the end of `buffer` are drained from the FIFO, and
    /// dropped. Returns the number of bytes stored.
    pub fn read_endpoint(&self, endpoint: usize, buffer: &mut [u8]) -> usize {
        ral::write_reg!(ral::usb, self.regs, CTRL, LOG_ENDPOINT: endpoint as u32, RD_EN: 1);
        let length = loop {
            let rxplen = ral::read_reg!(ral::usb, self.regs, RXPLEN);
            if rxplen & ral::usb::RXPLEN::PKT_RDY::mask != 0 {
                break ((rxplen & ral::usb::RXPLEN::PKT_LNGTH::mask) >> ral::usb::RXPLEN::PKT_LNGTH::offset) as usize;
            }
        };

        let stored = length.min(buffer.len());
        for word_start in (0..length).step_by(4) {
            let word = ral::read_reg!(ral::usb, self.regs, RXDATA).to_le_bytes();
            for (idx, byte) in word.into_iter().enumerate() {
                if let Some(slot) = buffer[..stored].get_mut(word_start + idx) {
                    *slot = byte;
                }
            }
        }
        ral::write_reg!(ral::usb, self.regs, CTRL, 0);

        if (ISOCHRONOUS >> endpoint) & 1 == 0 {
            self.command(code::select_endpoint(physical(endpoint, UsbDirection::Out)));
            self.command(code::CLR_BUF);
        }
        stored
    }

    /// Write one packet to a logical IN endpoint, and validate the buffer
    pub fn write_endpoint(&self, endpoint: usize, data: &[u8]) {
        ral::write_reg!(ral::usb, self.regs, CTRL, LOG_ENDPOINT: endpoint as u32, WR_EN: 1);
        ral::write_reg!(ral::usb, self.regs, TXPLEN, PKT_LNGTH: data.len() as u32);
        for chunk in data.chunks(4) {
            let mut word = [0u8; 4];
            word[..chunk.len()].copy_from_slice(chunk);
            ral::write_reg!(ral::usb, self.regs, TXDATA, u32::from_le_bytes(word));
        }
        ral::write_reg!(ral::usb, self.regs, CTRL, 0);

        self.command(code::select_endpoint(physical(endpoint, UsbDirection::In)));
        self.command(code::VALID_BUF);
    }
}

#[cfg(test)]
mod tests {
    use super::{DeviceInterrupt, EndpointSelect, Sie};
    use crate::ral::{self, testing::leak};

    fn sie() -> (&'static ral::usb::RegisterBlock, Sie) {
        let (regs, instance) = leak(ral::usb::RegisterBlock::new());
        regs.DEVINTST
            .write((DeviceInterrupt::CCEMTY | DeviceInterrupt::CDFULL | DeviceInterrupt::EP_RLZED).bits());
        (regs, Sie::new(instance))
    }

    #[test]
    fn set_address_writes_data_phase() {
        let (regs, sie) = sie();
        sie.set_address(5);
        assert_eq!(regs.CMDCODE.read(), 0x0085_0100);
        assert_eq!(regs.DEVINTCLR.read(), DeviceInterrupt::CCEMTY.bits());
    }

    #[test]
    fn command_read() {
        let (regs, sie) = sie();
        regs.CMDDATA.write(0x11);
        assert_eq!(sie.device_status().bits(), 0x11);
        assert_eq!(regs.CMDCODE.read(), 0x00FE_0200);
    }

    #[test]
    fn realize_accumulates() {
        let (regs, sie) = sie();
        regs.REEP.write(0b11);
        sie.realize(4, 64);
        assert_eq!(regs.REEP.read(), 0b1_0011);
        assert_eq!(regs.EPIND.read(), 4);
        assert_eq!(regs.MAXPSIZE.read(), 64);
        assert_eq!(regs.DEVINTCLR.read(), DeviceInterrupt::EP_RLZED.bits());
    }

    #[test]
    fn read_never_overflows() {
        let (regs, sie) = sie();
        regs.RXPLEN.write((1 << 11) | 6);
        regs.RXDATA.write(0x4433_2211);
        let mut buffer = [0u8; 3];
        assert_eq!(sie.read_endpoint(2, &mut buffer), 3);
        assert_eq!(buffer, [0x11, 0x22, 0x33]);
        assert_eq!(regs.CTRL.read(), 0);
        assert_eq!(regs.CMDCODE.read(), 0x00F2_0500, "buffer cleared");
    }

    #[test]
    fn isochronous_buffer_not_cleared() {
        let (regs, sie) = sie();
        regs.RXPLEN.write(1 << 11);
        sie.read_endpoint(3, &mut [0u8; 4]);
        assert_eq!(regs.CMDCODE.read(), 0);
    }

    #[test]
    fn write_pads_last_word() {
        let (regs, sie) = sie();
        sie.write_endpoint(1, &[1, 2, 3, 4, 5]);
        assert_eq!(regs.TXPLEN.read(), 5);
        assert_eq!(regs.TXDATA.read(), 5);
        assert_eq!(regs.CMDCODE.read(), 0x00FA_0500);
    }

    #[test]
    fn endpoint_interrupt_select_result() {
        let (regs, sie) = sie();
        regs.CMDDATA.write(EndpointSelect::STP.bits());
        let select = sie.clear_endpoint_interrupt(0);
        assert!(select.contains(EndpointSelect::STP));
        assert_eq!(regs.EPINTCLR.read(), 1);
    }
}
