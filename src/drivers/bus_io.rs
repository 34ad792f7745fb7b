use embedded_hal::i2c::I2c;
use linux_embedded_hal::I2cdev;
use log::debug;

use crate::error::BusError;

/// Minimal bus surface the acquisition pipeline needs.
pub trait BusIo {
    fn write_byte(&mut self, addr: u8, byte: u8) -> Result<(), BusError>;
    fn read_bytes(&mut self, addr: u8, buf: &mut [u8]) -> Result<(), BusError>;
}

impl<T: I2c> BusIo for T {
    fn write_byte(&mut self, addr: u8, byte: u8) -> Result<(), BusError> {
        debug!("bus write 0x{addr:02X} <- 0x{byte:02X}");
        self.write(addr, &[byte]).map_err(|e| BusError::Write {
            addr,
            reason: format!("{e:?}"),
        })
    }

    fn read_bytes(&mut self, addr: u8, buf: &mut [u8]) -> Result<(), BusError> {
        self.read(addr, buf).map_err(|e| BusError::Read {
            addr,
            reason: format!("{e:?}"),
        })?;
        debug!("bus read 0x{addr:02X} -> {buf:02X?}");
        Ok(())
    }
}

/// Opens `/dev/i2c-<bus_nr>`. The handle is closed when dropped.
pub fn open_bus(bus_nr: u8) -> Result<I2cdev, BusError> {
    let path = format!("/dev/i2c-{bus_nr}");
    I2cdev::new(&path).map_err(|e| BusError::Open {
        path,
        reason: e.to_string(),
    })
}
