//! Sensor addressing and the per-cycle reading model.

use std::{fmt, slice::Iter as SliceIter};

/// Logical sensor slot on the shield, `1..=16`.
///
/// This is not a bus address: slots 1-8 sit behind multiplexer 1, slots 9-16
/// behind multiplexer 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SensorAddress(u8);

impl SensorAddress {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 16;

    pub fn new(address: u8) -> Option<Self> {
        (Self::MIN..=Self::MAX)
            .contains(&address)
            .then_some(Self(address))
    }

    pub const fn get(self) -> u8 {
        self.0
    }
}

impl From<SensorAddress> for u8 {
    fn from(address: SensorAddress) -> Self {
        address.0
    }
}

impl fmt::Display for SensorAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ordered set of installed sensors, built once from the presence bitmask.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SensorRegistry(Vec<SensorAddress>);

impl SensorRegistry {
    /// Bit `i` set means slot `i + 1` is installed.
    pub fn from_mask(mask: u16) -> Self {
        Self(
            (0..16u8)
                .filter(|bit| (mask >> bit) & 0x1 == 1)
                .filter_map(|bit| SensorAddress::new(bit + 1))
                .collect(),
        )
    }

    pub fn iter(&self) -> SliceIter<'_, SensorAddress> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, address: SensorAddress) -> bool {
        self.0.binary_search(&address).is_ok()
    }

    pub fn mask(&self) -> u16 {
        self.0
            .iter()
            .fold(0u16, |mask, address| mask | 1 << (address.get() - 1))
    }
}

impl<'a> IntoIterator for &'a SensorRegistry {
    type Item = &'a SensorAddress;
    type IntoIter = SliceIter<'a, SensorAddress>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// One sensor's result for one cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    /// Seconds since the Unix epoch.
    pub timestamp: u64,
    pub address: SensorAddress,
    /// Degrees Celsius.
    pub temperature: f64,
    /// Percent relative humidity.
    pub humidity: f64,
}

/// Readings of one poll cycle in ascending address order.
///
/// Sensors that failed to read are absent, never zero-filled.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Batch(Vec<Reading>);

impl Batch {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, reading: Reading) {
        debug_assert!(
            self.0.last().is_none_or(|last| last.address < reading.address),
            "batch must stay in ascending address order"
        );
        self.0.push(reading);
    }

    pub fn iter(&self) -> SliceIter<'_, Reading> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[Reading] {
        &self.0
    }
}

impl FromIterator<Reading> for Batch {
    fn from_iter<I: IntoIterator<Item = Reading>>(iter: I) -> Self {
        let mut readings: Vec<Reading> = iter.into_iter().collect();
        readings.sort_by_key(|reading| reading.address);
        Self(readings)
    }
}

impl<'a> IntoIterator for &'a Batch {
    type Item = &'a Reading;
    type IntoIter = SliceIter<'a, Reading>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
