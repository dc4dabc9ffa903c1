//! Endpoint addressing, configuration words, and per-endpoint state

use usb_device::UsbDirection;

/// The physical endpoint index of a logical endpoint
///
/// Every logical endpoint has an OUT and IN half, at even and odd indices.
pub const fn physical(endpoint: usize, direction: UsbDirection) -> usize {
    (endpoint & 0x0F) * 2 + matches!(direction, UsbDirection::In) as usize
}

/// Bulk transfer type, for [`EndpointConfig::kind`]
pub const BULK: u32 = 2;

/// A packed endpoint configuration word
///
/// | Bits  | Field |
/// | ----- | ----- |
/// | 0     | enable |
/// | 1     | double buffered |
/// | 2..12 | max packet size |
/// | 12    | direction, set for IN |
/// | 13..15| transfer type |
/// | 15..19| endpoint number |
/// | 19..22| alternate interface |
/// | 22..25| interface |
/// | 25..27| configuration |
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
pub struct EndpointConfig(u32);

macro_rules! field {
    ($get:ident, $set:ident, $offset:expr, $width:expr) => {
        pub const fn $get(self) -> u32 {
            (self.0 >> $offset) & ((1 << $width) - 1)
        }
        pub const fn $set(self, value: u32) -> Self {
            let mask = ((1 << $width) - 1) << $offset;
            EndpointConfig((self.0 & !mask) | ((value << $offset) & mask))
        }
    };
}

impl EndpointConfig {
    /// Unused
    pub const UNUSED: Self = EndpointConfig(0);

    pub const fn is_enabled(self) -> bool {
        self.enable() != 0
    }

    pub const fn is_in(self) -> bool {
        self.direction() != 0
    }

    field!(enable, with_enable, 0, 1);
    field!(double_buffered, with_double_buffered, 1, 1);
    field!(max_packet_size, with_max_packet_size, 2, 10);
    field!(direction, with_direction, 12, 1);
    field!(kind, with_kind, 13, 2);
    field!(number, with_number, 15, 4);
    field!(alternate_interface, with_alternate_interface, 19, 3);
    field!(interface, with_interface, 22, 3);
    field!(configuration, with_configuration, 25, 2);
}

/// Per-endpoint driver state
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct EndpointFlags {
    /// A TX completion interrupt is still expected
    pub tx_running: bool,
    /// The last packet filled the max packet size
    pub tx_needs_zlp: bool,
    /// A received packet is waiting for queue space
    pub rx_nacking: bool,
}

#[cfg(test)]
mod tests {
    use super::{physical, EndpointConfig, BULK};
    use usb_device::UsbDirection;

    #[test]
    fn physical_index() {
        assert_eq!(physical(0, UsbDirection::Out), 0);
        assert_eq!(physical(0, UsbDirection::In), 1);
        assert_eq!(physical(5, UsbDirection::In), 11);
    }

    #[test]
    fn bulk_in_word() {
        let config = EndpointConfig::UNUSED
            .with_enable(1)
            .with_double_buffered(1)
            .with_max_packet_size(64)
            .with_direction(1)
            .with_kind(BULK)
            .with_number(2)
            .with_configuration(1);
        assert_eq!(config.0, 1 | 1 << 1 | 64 << 2 | 1 << 12 | 2 << 13 | 2 << 15 | 1 << 25);
        assert!(config.is_in());
        assert_eq!(config.max_packet_size(), 64);
    }

    #[test]
    fn fields_do_not_bleed() {
        let config = EndpointConfig::UNUSED.with_number(0xFF);
        assert_eq!(config.number(), 0xF);
        assert_eq!(config.alternate_interface(), 0);
        assert_eq!(config.kind(), 0);
    }
}
