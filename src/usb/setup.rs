use usb_device::control::Request;
use usb_device::descriptor::descriptor_type;

/// Length of a device descriptor
const DEVICE_DESCRIPTOR_LENGTH: u16 = 18;

/// An 8 byte control SETUP packet
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
pub struct SetupPacket {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub length: u16,
}

impl SetupPacket {
    pub const fn from_bytes(raw: &[u8; 8]) -> Self {
        SetupPacket {
            request_type: raw[0],
            request: raw[1],
            value: u16::from_le_bytes([raw[2], raw[3]]),
            index: u16::from_le_bytes([raw[4], raw[5]]),
            length: u16::from_le_bytes([raw[6], raw[7]]),
        }
    }

    /// Indicates a GET_DESCRIPTOR(DEVICE) that asks for less than the
    /// whole descriptor
    ///
    /// Hosts send this during enumeration, before they assign an address.
    /// The answer must be a single packet.
    pub const fn is_short_device_descriptor_request(&self) -> bool {
        self.request == Request::GET_DESCRIPTOR
            && (self.value >> 8) as u8 == descriptor_type::DEVICE
            && self.length != DEVICE_DESCRIPTOR_LENGTH
    }
}

#[cfg(test)]
mod tests {
    use super::SetupPacket;

    #[test]
    fn short_device_descriptor() {
        let setup = SetupPacket::from_bytes(&[0x80, 0x06, 0x00, 0x01, 0x00, 0x00, 0x40, 0x00]);
        assert_eq!(setup.length, 64);
        assert!(setup.is_short_device_descriptor_request());

        let full = SetupPacket::from_bytes(&[0x80, 0x06, 0x00, 0x01, 0x00, 0x00, 0x12, 0x00]);
        assert!(!full.is_short_device_descriptor_request());

        let config = SetupPacket::from_bytes(&[0x80, 0x06, 0x00, 0x02, 0x00, 0x00, 0x40, 0x00]);
        assert!(!config.is_short_device_descriptor_request());
    }
}
