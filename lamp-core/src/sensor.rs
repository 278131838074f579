//! Radar presence sensor normalization.
//!
//! Wraps a radar driver (e.g. an LD2410 behind a serial port) and
//! normalizes its raw frames into presence/movement booleans and a
//! single 0..=100 energy scalar. A disconnected sensor is a warning,
//! not a failure: the last known reading is retained.

use crate::errors::Error;

/// Consecutive failed polls after which the reading is flagged as a
/// sensor fault (one minute at the 100 ms control tick).
const FAULT_THRESHOLD: u16 = 600;

/// Weight of the moving-target energy in the combined metric.
const MOVING_ENERGY_WEIGHT: f32 = 1.5;

/// One decoded frame from the radar driver.
#[derive(Debug, Copy, Clone, Default)]
pub struct RadarFrame {
    pub presence: bool,
    pub moving_target: bool,
    pub moving_distance_cm: u16,
    pub stationary_distance_cm: u16,
    /// Moving-target signal strength, 0..=100.
    pub moving_energy: u8,
    /// Stationary-target signal strength, 0..=100.
    pub stationary_energy: u8,
}

/// The raw sensor driver.
///
/// `WouldBlock` means no fresh frame has been decoded yet; any other
/// error means the sensor is not connected.
pub trait RadarDriver {
    type Error;

    fn read_frame(&mut self) -> nb::Result<RadarFrame, Self::Error>;
}

/// The latest normalized reading. Refreshed by [`MotionSensor::update`].
#[derive(Debug, Copy, Clone, Default)]
pub struct SensorReading {
    pub presence: bool,
    pub movement: bool,
    pub movement_distance_cm: u16,
    pub stationary_distance_cm: u16,
    /// Combined activity metric, clamped to 0..=100.
    pub energy: f32,
    /// Set after one minute of continuous driver failures.
    pub fault: bool,
}

pub struct MotionSensor<D: RadarDriver> {
    driver: D,
    reading: SensorReading,
    consecutive_failures: u16,
}

impl<D: RadarDriver> MotionSensor<D> {
    pub fn new(driver: D) -> Self {
        Self {
            driver,
            reading: SensorReading::default(),
            consecutive_failures: 0,
        }
    }

    /// Poll the driver and refresh the cached reading.
    ///
    /// Returns a recoverable warning while the sensor is disconnected;
    /// the cached reading stays valid either way.
    pub fn update(&mut self) -> Result<(), Error> {
        match self.driver.read_frame() {
            Ok(frame) => {
                self.consecutive_failures = 0;
                self.reading = SensorReading {
                    presence: frame.presence,
                    movement: frame.moving_target,
                    movement_distance_cm: frame.moving_distance_cm,
                    stationary_distance_cm: frame.stationary_distance_cm,
                    energy: combined_energy(&frame),
                    fault: false,
                };
                Ok(())
            }
            // No fresh frame decoded yet, keep the cached reading
            Err(nb::Error::WouldBlock) => Ok(()),
            Err(nb::Error::Other(_)) => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                if self.consecutive_failures >= FAULT_THRESHOLD {
                    self.reading.fault = true;
                }
                Err(Error::RadarNotConnected)
            }
        }
    }

    pub fn reading(&self) -> &SensorReading {
        &self.reading
    }

    pub fn is_presence_detected(&self) -> bool {
        self.reading.presence
    }

    pub fn is_movement_detected(&self) -> bool {
        self.reading.movement
    }

    pub fn energy(&self) -> f32 {
        self.reading.energy
    }
}

/// Combine moving and stationary signal strength into one 0..=100
/// metric. Moving energy counts only while a moving target is
/// reported, stationary energy only while presence is reported.
fn combined_energy(frame: &RadarFrame) -> f32 {
    let moving = if frame.moving_target {
        f32::from(frame.moving_energy)
    } else {
        0.0
    };
    let stationary = if frame.presence {
        f32::from(frame.stationary_energy)
    } else {
        0.0
    };
    (moving * MOVING_ENERGY_WEIGHT + stationary).clamp(0.0, 100.0)
}
