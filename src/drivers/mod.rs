//! Bus-level drivers: the bus seam, the channel multiplexers and the SHT21 sensor.

pub mod bus_io;
pub mod mux;
pub mod sht21;

pub use bus_io::{BusIo, open_bus};
pub use mux::{MUX_RESET_ADDR, MuxController};
pub use sht21::SensorReader;
