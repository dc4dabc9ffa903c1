//! I2C master status codes, and what the engine does for each

/// The bus condition reported in `I2STAT` when the interrupt fires
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
pub enum Status {
    /// Illegal START or STOP on the bus
    BusError,
    Start,
    RepeatedStart,
    AddressWriteAck,
    AddressWriteNack,
    DataWriteAck,
    DataWriteNack,
    ArbitrationLost,
    AddressReadAck,
    AddressReadNack,
    /// Data byte received, ACK returned
    DataReadAck,
    /// Data byte received, NACK returned
    DataReadNack,
    /// Any code the master engine doesn't expect, including slave-mode
    /// codes and `0xF8` (no relevant state)
    Unknown(u8),
}

/// The engine's response to a [`Status`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-03", derive(defmt_03::Format))]
pub enum Action {
    /// Load the slave address and direction, and drop the START request
    SendAddress,
    /// Load the next output byte, or finish the write
    Transmit,
    /// Decide whether the first received byte gets an ACK
    PrepareReceive,
    /// Store the received byte, and decide what to do with the next one
    Receive,
    /// Give up on the transaction
    Stop,
    /// Request a STOP to recover the bus, then give up
    ClearBusError,
}

impl Status {
    pub const fn from_raw(code: u8) -> Self {
        match code {
            0x00 => Status::BusError,
            0x08 => Status::Start,
            0x10 => Status::RepeatedStart,
            0x18 => Status::AddressWriteAck,
            0x20 => Status::AddressWriteNack,
            0x28 => Status::DataWriteAck,
            0x30 => Status::DataWriteNack,
            0x38 => Status::ArbitrationLost,
            0x40 => Status::AddressReadAck,
            0x48 => Status::AddressReadNack,
            0x50 => Status::DataReadAck,
            0x58 => Status::DataReadNack,
            other => Status::Unknown(other),
        }
    }

    pub const fn raw(self) -> u8 {
        match self {
            Status::BusError => 0x00,
            Status::Start => 0x08,
            Status::RepeatedStart => 0x10,
            Status::AddressWriteAck => 0x18,
            Status::AddressWriteNack => 0x20,
            Status::DataWriteAck => 0x28,
            Status::DataWriteNack => 0x30,
            Status::ArbitrationLost => 0x38,
            Status::AddressReadAck => 0x40,
            Status::AddressReadNack => 0x48,
            Status::DataReadAck => 0x50,
            Status::DataReadNack => 0x58,
            Status::Unknown(code) => code,
        }
    }

    pub const fn action(self) -> Action {
        match self {
            Status::Start | Status::RepeatedStart => Action::SendAddress,
            Status::AddressWriteAck | Status::DataWriteAck => Action::Transmit,
            Status::AddressWriteNack
            | Status::DataWriteNack
            | Status::AddressReadNack
            | Status::ArbitrationLost => Action::Stop,
            Status::AddressReadAck => Action::PrepareReceive,
            Status::DataReadAck | Status::DataReadNack => Action::Receive,
            Status::BusError => Action::ClearBusError,
            Status::Unknown(_) => Action::Stop,
        }
    }
}
