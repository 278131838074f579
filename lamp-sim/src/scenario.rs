//! Deterministic scripted night of radar telemetry.
//!
//! Stands in for the real LD2410 driver so a full night of controller
//! behavior can be replayed on the host. Same minute in, same frame
//! out.

use std::{cell::Cell, rc::Rc};

use lamp_core::{RadarDriver, RadarFrame};

/// The sensor reports itself as not connected.
#[derive(Debug)]
pub struct Disconnected;

/// Minute-granular phases of one evening, from lights-out to the room
/// being empty again.
pub fn frame_at(minute: u32) -> RadarFrame {
    // Small deterministic wobble so energies are not perfectly flat
    let jitter = (minute * 7 % 5) as u8;

    match minute {
        // Empty room
        0..=29 => RadarFrame::default(),
        // Someone walks in
        30..=39 => moving(60 + jitter, 30, 150),
        // Puttering around, movement in bursts
        40..=89 => {
            if minute % 5 < 2 {
                moving(40 + jitter, 30, 200)
            } else {
                stationary(35 + jitter, 120)
            }
        }
        // Settled down, quiet presence
        90..=179 => stationary(22 + jitter, 90),
        // Drowsy
        180..=239 => stationary(12 + jitter, 80),
        // Asleep
        240..=449 => stationary(4 + jitter % 3, 80),
        // Stirring
        450..=459 => moving(20 + jitter, 10, 100),
        // Waking up slowly
        460..=479 => {
            if minute % 3 == 0 {
                moving(25 + jitter, 15, 120)
            } else {
                stationary(30 + jitter, 100)
            }
        }
        // Up and about
        480..=489 => moving(60 + jitter, 25, 180),
        // Leaves the room
        _ => RadarFrame::default(),
    }
}

/// Auto-mode flag over the night; briefly disabled while the lamp is
/// active to exercise the forced NoPresence path.
pub fn auto_mode_at(minute: u32) -> bool {
    !(485..490).contains(&minute)
}

fn moving(moving_energy: u8, stationary_energy: u8, distance_cm: u16) -> RadarFrame {
    RadarFrame {
        presence: true,
        moving_target: true,
        moving_distance_cm: distance_cm,
        stationary_distance_cm: distance_cm,
        moving_energy,
        stationary_energy,
    }
}

fn stationary(stationary_energy: u8, distance_cm: u16) -> RadarFrame {
    RadarFrame {
        presence: true,
        moving_target: false,
        moving_distance_cm: 0,
        stationary_distance_cm: distance_cm,
        moving_energy: 0,
        stationary_energy,
    }
}

/// Radar driver fed from the scripted scenario, sharing the simulated
/// clock with the main loop.
pub struct ScenarioDriver {
    clock: Rc<Cell<u64>>,
}

impl ScenarioDriver {
    pub fn new(clock: Rc<Cell<u64>>) -> Self {
        Self { clock }
    }
}

impl RadarDriver for ScenarioDriver {
    type Error = Disconnected;

    fn read_frame(&mut self) -> nb::Result<RadarFrame, Disconnected> {
        let now_ms = self.clock.get();
        let minute = (now_ms / 60_000) as u32;
        // A 30 second sensor dropout in the middle of the night; short
        // enough that the controller only warns and keeps the last
        // reading, without declaring a sensor fault.
        if minute == 420 && now_ms % 60_000 < 30_000 {
            return Err(nb::Error::Other(Disconnected));
        }
        Ok(frame_at(minute))
    }
}
