//! Behavioral core of an adaptive ambient lamp.
//!
//! Turns noisy radar presence/motion telemetry into a smoothly faded
//! light output, and adapts its own decision thresholds from observed
//! usage over time. Hardware access goes through small traits
//! (`PwmPin`, `FadeTimer`, `RadarDriver`, `ThresholdStore`) so the same
//! logic runs both on firmware and on the host.
#![cfg_attr(not(test), no_std)]

pub mod errors;
pub mod fade;
pub mod sensor;
pub mod states;
pub mod thresholds;

pub use errors::Error;
pub use fade::{FadeEngine, FadeTimer, FadeTimerError};
pub use sensor::{MotionSensor, RadarDriver, RadarFrame, SensorReading};
pub use states::{LampState, LampStateMachine, StateChange, TickInputs, TickOutcome};
pub use thresholds::{EnergyThresholds, StoreError, ThresholdStore, ThresholdValues};
