//! Humidity threshold evaluation for the indicator channels.

use std::slice::Iter as SliceIter;

use log::debug;

use crate::sensors::Batch;

/// Per-channel count of sensors above the humidity threshold.
///
/// Counts are raw; the indicator sink decides how to clamp them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndicatorState(Vec<usize>);

impl IndicatorState {
    pub fn zeroed(channel_count: usize) -> Self {
        Self(vec![0; channel_count])
    }

    pub fn channel_count(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> SliceIter<'_, usize> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }
}

impl From<Vec<usize>> for IndicatorState {
    fn from(counts: Vec<usize>) -> Self {
        Self(counts)
    }
}

/// Maps every reading above the threshold onto channel `address % channel_count`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdEvaluator {
    threshold: f64,
    channel_count: usize,
}

impl ThresholdEvaluator {
    pub fn new(threshold: f64, channel_count: usize) -> Self {
        Self {
            threshold,
            channel_count,
        }
    }

    /// Examines every reading of the batch; hits on the same channel accumulate.
    pub fn evaluate(&self, batch: &Batch) -> IndicatorState {
        let mut state = IndicatorState::zeroed(self.channel_count);
        if self.channel_count == 0 {
            return state;
        }

        for reading in batch.iter().filter(|r| r.humidity > self.threshold) {
            let channel = usize::from(reading.address.get()) % self.channel_count;
            debug!(
                "sensor {} at {:.2} %RH exceeds {} -> channel {channel}",
                reading.address, reading.humidity, self.threshold
            );
            state.0[channel] += 1;
        }
        state
    }
}
