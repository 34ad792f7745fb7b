//! Channel selection on the two 8-way bus multiplexers.

use log::debug;

use super::bus_io::BusIo;
use crate::{error::BusError, sensors::SensorAddress};

/// Fixed address that receives the all-channels-off byte.
pub const MUX_RESET_ADDR: u8 = 0x71;

/// Channels per multiplexer chip.
const CHANNELS_PER_MUX: u8 = 8;

/// Routes one sensor slot onto the shared bus.
///
/// Slots 1-8 are selected on the first chip, slots 9-16 on the second chip
/// using `slot - 8` as the chip-local index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MuxController {
    mux1_addr: u8,
    mux2_addr: u8,
}

impl MuxController {
    pub fn new(mux1_addr: u8, mux2_addr: u8) -> Self {
        Self {
            mux1_addr,
            mux2_addr,
        }
    }

    /// Selects `channel` (`0..=16`) with exactly one bus write.
    ///
    /// Channel 0 writes `0x00` to [`MUX_RESET_ADDR`], disconnecting every sensor.
    pub fn select_channel<B: BusIo>(&self, bus: &mut B, channel: u8) -> Result<(), BusError> {
        let (addr, control) = self.route(channel)?;
        debug!("mux select channel {channel}: 0x{addr:02X} <- 0x{control:02X}");
        bus.write_byte(addr, control)
    }

    pub fn select<B: BusIo>(&self, bus: &mut B, address: SensorAddress) -> Result<(), BusError> {
        self.select_channel(bus, address.get())
    }

    pub fn reset<B: BusIo>(&self, bus: &mut B) -> Result<(), BusError> {
        self.select_channel(bus, 0)
    }

    /// Bus address and control byte for a channel.
    fn route(&self, channel: u8) -> Result<(u8, u8), BusError> {
        match channel {
            0 => Ok((MUX_RESET_ADDR, 0x00)),
            1..=CHANNELS_PER_MUX => Ok((self.mux1_addr, 1 << (channel - 1))),
            9..=16 => Ok((self.mux2_addr, 1 << (channel - CHANNELS_PER_MUX - 1))),
            _ => Err(BusError::InvalidChannel(channel)),
        }
    }
}
