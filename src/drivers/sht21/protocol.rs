use std::time::Duration;

/// Fixed bus address of every SHT21 behind the multiplexers.
pub const SHT21_ADDR: u8 = 0x40;

/// Wait after a soft reset before the sensor accepts commands.
pub const SOFT_RESET_WAIT: Duration = Duration::from_millis(15);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    SoftReset,
    /// No-hold-master temperature trigger.
    TriggerTemperature,
    /// No-hold-master humidity trigger.
    TriggerHumidity,
}

impl Command {
    pub const fn to_byte(self) -> u8 {
        match self {
            Command::SoftReset => 0xFE,
            Command::TriggerTemperature => 0xF3,
            Command::TriggerHumidity => 0xF5,
        }
    }

    /// Time between the trigger and a valid result, just above the datasheet worst case.
    pub const fn settle_time(self) -> Duration {
        match self {
            Command::SoftReset => SOFT_RESET_WAIT,
            // max 85 ms
            Command::TriggerTemperature => Duration::from_millis(86),
            // max 29 ms
            Command::TriggerHumidity => Duration::from_millis(30),
        }
    }
}

/// Two bytes read back after a measurement trigger.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RawSample {
    pub msb: u8,
    pub lsb: u8,
}

impl From<[u8; 2]> for RawSample {
    fn from(buf: [u8; 2]) -> Self {
        Self {
            msb: buf[0],
            lsb: buf[1],
        }
    }
}

impl RawSample {
    /// Measurement value with the two status bits of the low byte cleared.
    pub const fn value(self) -> u16 {
        ((self.msb as u16) << 8) | (self.lsb & 0xFC) as u16
    }

    /// Degrees Celsius.
    pub fn temperature(self) -> f64 {
        -46.85 + 175.72 * f64::from(self.value()) / 65536.0
    }

    /// Percent relative humidity. Not clamped; values slightly outside
    /// 0..100 are legal sensor output.
    pub fn humidity(self) -> f64 {
        -6.0 + 125.0 * f64::from(self.value()) / 65536.0
    }
}
