//! Host-side simulator for the lamp behavioral core.
//!
//! Replays a scripted night of radar telemetry through the real
//! controller at the 100 ms control tick, prints the resulting state
//! transitions, and persists the learned thresholds to a TOML store.

use std::{cell::Cell, path::PathBuf, rc::Rc};

use anyhow::Context;
use clap::Parser;
use embedded_hal::PwmPin;
use lamp_core::{
    fade::FADE_TICK_MS, EnergyThresholds, FadeEngine, FadeTimer, FadeTimerError, LampStateMachine,
    MotionSensor,
};

mod config;
mod scenario;
mod store;

use crate::config::{Config, RawConfig};
use crate::scenario::ScenarioDriver;
use crate::store::TomlStore;

#[derive(Parser, Debug)]
#[command(about, version)]
struct Args {
    /// Path to config file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,
}

/// PWM output of the simulated lamp.
#[derive(Default)]
struct SimPwm {
    duty: u16,
}

impl PwmPin for SimPwm {
    type Duty = u16;

    fn disable(&mut self) {}

    fn enable(&mut self) {}

    fn get_duty(&self) -> u16 {
        self.duty
    }

    fn get_max_duty(&self) -> u16 {
        u16::MAX
    }

    fn set_duty(&mut self, duty: u16) {
        self.duty = duty;
    }
}

/// Fade timer stand-in; the main loop polls the engine every tick
/// anyway, so starting always succeeds.
struct SimTimer;

impl FadeTimer for SimTimer {
    fn start(&mut self, _period_ms: u32) -> Result<(), FadeTimerError> {
        Ok(())
    }

    fn stop(&mut self) {}

    fn reset(&mut self) {}
}

fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Parse config
    let raw_config = match RawConfig::load(&args.config) {
        Ok(val) => val,
        Err(e) => {
            println!("Error: Failed to load config: {:#}", e);
            println!();
            println!(
                "Example config:\n\n{}",
                toml::to_string(&RawConfig::example())?
            );
            return Ok(());
        }
    };
    let config: Config = raw_config.try_into()?;

    // Behavioral core wired to simulated hardware
    let clock = Rc::new(Cell::new(0u64));
    let mut sensor = MotionSensor::new(ScenarioDriver::new(clock.clone()));
    let mut fade = FadeEngine::new(SimPwm::default(), SimTimer, config.lamp.resolution_bits);
    let mut thresholds = EnergyThresholds::new(TomlStore::open(config.store.path.clone()));
    let mut machine = LampStateMachine::new();

    println!(
        ":: Thresholds loaded [Th1={:.2} Th2={:.2} Th3={:.2}]",
        thresholds.th1(),
        thresholds.th2(),
        thresholds.th3()
    );

    // Indicator blink while the accessory layer would be pairing
    fade.start_setup_blink(1_000, 0)
        .context("Failed to start setup blink")?;
    for t in (0u64..3_000).step_by(FADE_TICK_MS as usize) {
        fade.poll(t);
    }
    fade.stop_setup_blink();
    println!(":: Setup done, entering control loop");

    let tick_ms = u64::from(config.lamp.tick_ms);
    let mut was_disconnected = false;
    let mut t = 0u64;
    loop {
        let hour = ((u64::from(config.night.start_hour) + t / 3_600_000) % 24) as u8;
        if !config.is_night(hour) {
            break;
        }

        clock.set(t);
        match sensor.update() {
            Ok(()) => {
                if was_disconnected {
                    println!(":: {} Radar reconnected", clock_str(&config, t));
                    was_disconnected = false;
                }
            }
            Err(e) => {
                if !was_disconnected {
                    println!(":: {} Warning: {}", clock_str(&config, t), e.as_str());
                    was_disconnected = true;
                }
            }
        }

        let minute = (t / 60_000) as u32;
        let outcome = machine.update(
            sensor.reading(),
            &thresholds.values(),
            &mut fade,
            config.lamp.max_brightness,
            scenario::auto_mode_at(minute),
            t,
        );
        if let Some(change) = outcome.transition {
            println!(
                ":: State transition: {} -> {}",
                change.from.name(),
                change.to.name()
            );
        }
        if let Some(e) = outcome.fade_error {
            println!(":: {} Warning: {}", clock_str(&config, t), e.as_str());
        }
        fade.poll(t);

        // One energy sample per minute feeds the learner
        if t % 60_000 == 0 {
            thresholds.add_energy_reading(sensor.energy());
        }
        if t % 600_000 == 0 {
            println!(
                ":: {} Update [State={}] brightness={}",
                clock_str(&config, t),
                machine.current_state().name(),
                fade.current_brightness()
            );
        }

        // Hourly learning and bounded-rate persistence
        if t > 0 && t % 3_600_000 == 0 {
            thresholds.perform_learning();
            if let Err(e) = thresholds.check_and_save(t) {
                println!(":: {} Warning: {}", clock_str(&config, t), e.as_str());
            }
            println!(
                ":: {} Learning done [Th1={:.2} Th2={:.2} Th3={:.2}]",
                clock_str(&config, t),
                thresholds.th1(),
                thresholds.th2(),
                thresholds.th3()
            );
        }

        t += tick_ms;
    }

    println!(
        ":: Night over after {} samples, thresholds saved to {:?}",
        thresholds.sample_count(),
        config.store.path
    );
    Ok(())
}

/// Wall clock string for a simulated offset from the night start.
fn clock_str(config: &Config, t: u64) -> String {
    let secs = t / 1_000;
    let hour = (u64::from(config.night.start_hour) + secs / 3_600) % 24;
    format!("{:02}:{:02}:{:02}", hour, secs / 60 % 60, secs % 60)
}
