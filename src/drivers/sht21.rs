//! SHT21 humidity/temperature sensor behind the currently selected mux channel.

pub mod protocol;

use embedded_hal::delay::DelayNs;
use log::{debug, info};

use self::protocol::{Command, RawSample, SHT21_ADDR};
use super::bus_io::BusIo;
use crate::error::BusError;

/// Runs the trigger, settle, read sequence against the selected sensor.
///
/// Settle waits block the calling thread; the bus is borrowed mutably for the
/// whole sequence so no other operation can interleave.
#[derive(Debug)]
pub struct SensorReader<D> {
    delay: D,
}

impl<D: DelayNs> SensorReader<D> {
    pub fn new(delay: D) -> Self {
        Self { delay }
    }

    /// Soft-resets whichever sensor currently answers on the bus address.
    pub fn soft_reset<B: BusIo>(&mut self, bus: &mut B) -> Result<(), BusError> {
        info!("Soft-resetting sensor at 0x{SHT21_ADDR:02X}");
        bus.write_byte(SHT21_ADDR, Command::SoftReset.to_byte())?;
        self.settle(Command::SoftReset);
        Ok(())
    }

    /// Degrees Celsius.
    pub fn measure_temperature<B: BusIo>(&mut self, bus: &mut B) -> Result<f64, BusError> {
        let temperature = self
            .measure(bus, Command::TriggerTemperature)?
            .temperature();
        debug!("temperature: {temperature}");
        Ok(temperature)
    }

    /// Percent relative humidity.
    pub fn measure_humidity<B: BusIo>(&mut self, bus: &mut B) -> Result<f64, BusError> {
        let humidity = self.measure(bus, Command::TriggerHumidity)?.humidity();
        debug!("humidity: {humidity}");
        Ok(humidity)
    }

    fn measure<B: BusIo>(&mut self, bus: &mut B, trigger: Command) -> Result<RawSample, BusError> {
        bus.write_byte(SHT21_ADDR, trigger.to_byte())?;
        self.settle(trigger);

        let mut buf = [0u8; 2];
        bus.read_bytes(SHT21_ADDR, &mut buf)?;
        Ok(RawSample::from(buf))
    }

    fn settle(&mut self, command: Command) {
        let ms = u32::try_from(command.settle_time().as_millis()).unwrap_or(u32::MAX);
        self.delay.delay_ms(ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::bus_io::fake::{FakeBus, FakeDelay, Op};
    use pretty_assertions::assert_eq;

    #[test]
    fn temperature_protocol_sequence() {
        let mut bus = FakeBus::new();
        bus.respond([0x00, 0x00]);
        let delay = FakeDelay::default();
        let mut reader = SensorReader::new(delay.clone());

        let t = reader.measure_temperature(&mut bus).unwrap();

        assert_eq!(t, -46.85);
        assert_eq!(
            bus.ops(),
            vec![Op::Write(0x40, vec![0xF3]), Op::Read(0x40, 2)]
        );
        assert_eq!(delay.waits_ms(), vec![86]);
    }

    #[test]
    fn humidity_protocol_sequence() {
        let mut bus = FakeBus::new();
        bus.respond([0x7C, 0x80]);
        let delay = FakeDelay::default();
        let mut reader = SensorReader::new(delay.clone());

        let h = reader.measure_humidity(&mut bus).unwrap();

        assert!((h - 54.791).abs() < 1e-3);
        assert_eq!(
            bus.ops(),
            vec![Op::Write(0x40, vec![0xF5]), Op::Read(0x40, 2)]
        );
        assert_eq!(delay.waits_ms(), vec![30]);
    }

    #[test]
    fn failed_trigger_skips_wait_and_read() {
        let mut bus = FakeBus::new();
        bus.fail_write(0x40, 0xF3, 1);
        let delay = FakeDelay::default();
        let mut reader = SensorReader::new(delay.clone());

        let err = reader.measure_temperature(&mut bus).unwrap_err();

        assert!(matches!(err, BusError::Write { addr: 0x40, .. }));
        assert_eq!(bus.ops(), vec![Op::Write(0x40, vec![0xF3])]);
        assert!(delay.waits_ms().is_empty());
    }

    #[test]
    fn failed_read_is_an_error_not_a_sentinel() {
        let mut bus = FakeBus::new();
        let mut reader = SensorReader::new(FakeDelay::default());

        let err = reader.measure_humidity(&mut bus).unwrap_err();
        assert!(matches!(err, BusError::Read { addr: 0x40, .. }));
    }

    #[test]
    fn soft_reset_writes_reset_byte_and_waits() {
        let mut bus = FakeBus::new();
        let delay = FakeDelay::default();
        let mut reader = SensorReader::new(delay.clone());

        reader.soft_reset(&mut bus).unwrap();

        assert_eq!(bus.ops(), vec![Op::Write(0x40, vec![0xFE])]);
        assert_eq!(delay.waits_ms(), vec![15]);
    }
}
