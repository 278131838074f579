//! Adaptive energy thresholds.
//!
//! Buffers a rolling day of energy samples and periodically derives the
//! three decision thresholds the state machine compares against. New
//! estimates are smoothed with an EMA so thresholds drift at a bounded
//! rate, and the triple is persisted at most once per hour.

use heapless::HistoryBuffer;

use crate::errors::Error;

/// One sample per minute for 24 hours.
const BUFFER_SIZE: usize = 1440;

/// Minimum interval between persisted saves.
const SAVE_INTERVAL_MS: u64 = 3_600_000;

/// EMA smoothing factor applied to each new raw threshold estimate.
const ALPHA: f32 = 0.1;

pub const DEFAULT_TH1: f32 = 50.0;
pub const DEFAULT_TH2: f32 = 30.0;
pub const DEFAULT_TH3: f32 = 10.0;

/// The current threshold triple, `th1 >= th2 >= th3 >= 0`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ThresholdValues {
    pub th1: f32,
    pub th2: f32,
    pub th3: f32,
}

/// Named-float persistence contract for the threshold triple.
pub trait ThresholdStore {
    /// Read a stored value, or `None` if the key was never written.
    fn get(&mut self, key: &str) -> Option<f32>;
    fn put(&mut self, key: &str, value: f32) -> Result<(), StoreError>;
}

/// Opaque persistence failure.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct StoreError;

pub struct EnergyThresholds<S: ThresholdStore> {
    values: ThresholdValues,
    buffer: HistoryBuffer<f32, BUFFER_SIZE>,
    store: S,
    last_save_ms: u64,
}

impl<S: ThresholdStore> EnergyThresholds<S> {
    /// Load the thresholds from the store, falling back to the
    /// defaults for absent keys.
    pub fn new(mut store: S) -> Self {
        let values = ThresholdValues {
            th1: store.get("th1").unwrap_or(DEFAULT_TH1),
            th2: store.get("th2").unwrap_or(DEFAULT_TH2),
            th3: store.get("th3").unwrap_or(DEFAULT_TH3),
        };
        Self {
            values,
            buffer: HistoryBuffer::new(),
            store,
            last_save_ms: 0,
        }
    }

    pub fn values(&self) -> ThresholdValues {
        self.values
    }

    pub fn th1(&self) -> f32 {
        self.values.th1
    }

    pub fn th2(&self) -> f32 {
        self.values.th2
    }

    pub fn th3(&self) -> f32 {
        self.values.th3
    }

    pub fn sample_count(&self) -> usize {
        self.buffer.len()
    }

    /// Push one energy sample, overwriting the oldest once the buffer
    /// holds a full day.
    pub fn add_energy_reading(&mut self, energy: f32) {
        self.buffer.write(energy);
    }

    /// Recompute the thresholds from the buffered samples.
    ///
    /// Samples are split into four buckets by the current thresholds;
    /// each bucket mean feeds a raw estimate which is EMA-smoothed into
    /// the threshold. A pass over an empty buffer is a no-op. On exit
    /// the triple is re-sorted so `th1 >= th2 >= th3 >= 0` holds even
    /// when a skewed day of samples would disorder it.
    pub fn perform_learning(&mut self) {
        if self.buffer.len() == 0 {
            return;
        }

        let mut sums = [0.0f32; 4];
        let mut counts = [0u32; 4];
        for &e in self.buffer.oldest_ordered() {
            let bucket = if e > self.values.th1 {
                0
            } else if e > self.values.th2 {
                1
            } else if e > self.values.th3 {
                2
            } else {
                3
            };
            sums[bucket] += e;
            counts[bucket] += 1;
        }

        let mean = |i: usize, fallback: f32| {
            if counts[i] > 0 {
                sums[i] / counts[i] as f32
            } else {
                fallback
            }
        };
        let m1 = mean(0, self.values.th1);
        let m2 = mean(1, self.values.th2);
        let m3 = mean(2, self.values.th3);
        let m4 = mean(3, self.values.th3 / 2.0);

        let mut updated = [
            ema(m1 - m2 / 2.0, self.values.th1),
            ema((m2 + m3) / 2.0, self.values.th2),
            ema(m3 - m4 / 2.0, self.values.th3),
        ];
        updated.sort_unstable_by(|a, b| b.partial_cmp(a).unwrap_or(core::cmp::Ordering::Equal));
        self.values = ThresholdValues {
            th1: updated[0].max(0.0),
            th2: updated[1].max(0.0),
            th3: updated[2].max(0.0),
        };
    }

    /// Persist the triple if at least the save interval has elapsed
    /// since the last save. A write failure skips the save and is
    /// reported as a warning.
    pub fn check_and_save(&mut self, now_ms: u64) -> Result<(), Error> {
        if now_ms.saturating_sub(self.last_save_ms) < SAVE_INTERVAL_MS {
            return Ok(());
        }
        let result = self
            .store
            .put("th1", self.values.th1)
            .and_then(|_| self.store.put("th2", self.values.th2))
            .and_then(|_| self.store.put("th3", self.values.th3));
        match result {
            Ok(()) => {
                self.last_save_ms = now_ms;
                Ok(())
            }
            Err(StoreError) => Err(Error::ThresholdSaveFailed),
        }
    }
}

/// Exponential moving average with the module-wide smoothing factor.
fn ema(raw: f32, previous: f32) -> f32 {
    ALPHA * raw + (1.0 - ALPHA) * previous
}
