//! State machine.
//!
//! A table-driven finite-state machine that turns {energy, movement,
//! presence, elapsed time} into a target lamp state. Each state owns
//! its brightness target (as a fraction of the caller-supplied max),
//! its fade-in duration, and its timeout.

use embedded_hal::PwmPin;

use crate::errors::Error;
use crate::fade::{FadeEngine, FadeTimer};
use crate::sensor::SensorReading;
use crate::thresholds::ThresholdValues;

/// Timeout value meaning "this state never times out on its own".
const NO_TIMEOUT: u32 = u32::MAX;

#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum LampState {
    NoPresence,
    Active,
    PreSleep,
    LightSleep,
    DeepSleep,
    WakeUp,
    Anomaly,
}

impl LampState {
    pub fn name(&self) -> &'static str {
        match self {
            Self::NoPresence => "NoPresence",
            Self::Active => "Active",
            Self::PreSleep => "PreSleep",
            Self::LightSleep => "LightSleep",
            Self::DeepSleep => "DeepSleep",
            Self::WakeUp => "WakeUp",
            Self::Anomaly => "Anomaly",
        }
    }

    /// Brightness target in tenths of the caller-supplied max, or
    /// `None` where the state leaves the output unchanged.
    fn brightness_tenths(&self) -> Option<u32> {
        match self {
            Self::NoPresence | Self::DeepSleep => Some(0),
            Self::Active => Some(10),
            Self::PreSleep => Some(7),
            Self::LightSleep => Some(3),
            Self::WakeUp => Some(5),
            Self::Anomaly => None,
        }
    }

    fn fade_duration_ms(&self) -> u32 {
        match self {
            Self::NoPresence => 2_000,
            Self::Active => 1_000,
            Self::PreSleep => 2_000,
            Self::LightSleep => 3_000,
            Self::DeepSleep => 5_000,
            // Slow sunrise fade
            Self::WakeUp => 15 * 60 * 1_000,
            Self::Anomaly => 0,
        }
    }

    fn timeout_ms(&self) -> u32 {
        match self {
            Self::NoPresence => 0,
            Self::Active => 5 * 60 * 1_000,
            Self::PreSleep => 15 * 60 * 1_000,
            Self::LightSleep => 30 * 60 * 1_000,
            Self::DeepSleep => NO_TIMEOUT,
            Self::WakeUp => 20 * 60 * 1_000,
            Self::Anomaly => 60 * 1_000,
        }
    }

    /// Map the 0..=100 max brightness through this state's fraction
    /// into the duty range of the output.
    fn target_duty(&self, max_brightness: u8, max_duty: u16) -> Option<u16> {
        let tenths = self.brightness_tenths()?;
        let ceiling = u32::from(max_duty) * tenths / 10;
        Some((u32::from(max_brightness) * ceiling / 100) as u16)
    }
}

impl ufmt::uDisplay for LampState {
    fn fmt<W>(&self, f: &mut ufmt::Formatter<'_, W>) -> Result<(), W::Error>
    where
        W: ufmt::uWrite + ?Sized,
    {
        f.write_str(self.name())
    }
}

/// The per-tick inputs of the transition function.
#[derive(Debug, Copy, Clone)]
pub struct TickInputs {
    pub energy: f32,
    pub movement: bool,
    pub presence: bool,
    pub timed_out: bool,
}

/// Pure transition function: total and deterministic over all inputs.
pub fn next_state(current: LampState, inputs: &TickInputs, th: &ThresholdValues) -> LampState {
    let TickInputs { energy, movement, presence, timed_out } = *inputs;
    let vacated = !presence && !movement;
    match current {
        LampState::NoPresence => {
            if movement {
                LampState::Active
            } else if presence {
                LampState::PreSleep
            } else {
                LampState::NoPresence
            }
        }
        LampState::Active => {
            if vacated {
                LampState::NoPresence
            } else if !movement && energy <= th.th1 && timed_out {
                LampState::PreSleep
            } else {
                LampState::Active
            }
        }
        LampState::PreSleep => {
            if vacated {
                LampState::NoPresence
            } else if movement && energy > th.th1 {
                LampState::Active
            } else if energy <= th.th2 && timed_out {
                LampState::LightSleep
            } else {
                LampState::PreSleep
            }
        }
        LampState::LightSleep => {
            if vacated {
                LampState::NoPresence
            } else if movement && energy > th.th2 {
                LampState::PreSleep
            } else if energy <= th.th3 {
                LampState::DeepSleep
            } else {
                LampState::LightSleep
            }
        }
        LampState::DeepSleep => {
            if vacated {
                LampState::NoPresence
            } else if movement && energy > th.th3 {
                LampState::WakeUp
            } else {
                LampState::DeepSleep
            }
        }
        LampState::WakeUp => {
            if vacated {
                LampState::NoPresence
            } else if movement && energy > th.th1 {
                LampState::Active
            } else if !movement && energy <= th.th2 && timed_out {
                LampState::PreSleep
            } else {
                LampState::WakeUp
            }
        }
        LampState::Anomaly => LampState::NoPresence,
    }
}

/// An actual state change, for logging by the owner.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct StateChange {
    pub from: LampState,
    pub to: LampState,
}

/// What one control tick did.
#[derive(Debug, Default, PartialEq, Copy, Clone)]
pub struct TickOutcome {
    pub transition: Option<StateChange>,
    /// Set when the transition's fade command was rejected; the state
    /// change still took effect.
    pub fade_error: Option<Error>,
}

pub struct LampStateMachine {
    current: LampState,
    max_brightness: u8,
    state_start_ms: u64,
    state_duration_ms: u32,
}

impl Default for LampStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl LampStateMachine {
    pub fn new() -> Self {
        Self {
            current: LampState::NoPresence,
            max_brightness: 100,
            state_start_ms: 0,
            state_duration_ms: NO_TIMEOUT,
        }
    }

    pub fn current_state(&self) -> LampState {
        self.current
    }

    /// The single per-tick entry point.
    ///
    /// Evaluates the transition function on the given reading and
    /// issues the new state's fade command before returning. With
    /// auto-mode disabled, forces NoPresence unconditionally and resets
    /// the timeout bookkeeping. A faulted sensor reading overrides the
    /// table and enters Anomaly until the fault clears.
    pub fn update<P, T>(
        &mut self,
        reading: &SensorReading,
        thresholds: &ThresholdValues,
        fade: &mut FadeEngine<P, T>,
        max_brightness: u8,
        auto_mode: bool,
        now_ms: u64,
    ) -> TickOutcome
    where
        P: PwmPin<Duty = u16>,
        T: FadeTimer,
    {
        if !auto_mode {
            self.state_duration_ms = NO_TIMEOUT;
            self.state_start_ms = now_ms;
            return self.apply(LampState::NoPresence, fade, now_ms);
        }

        self.max_brightness = max_brightness.min(100);
        let inputs = TickInputs {
            energy: reading.energy,
            movement: reading.movement,
            presence: reading.presence,
            timed_out: now_ms.saturating_sub(self.state_start_ms) > u64::from(self.state_duration_ms),
        };
        let next = if reading.fault {
            LampState::Anomaly
        } else {
            next_state(self.current, &inputs, thresholds)
        };
        self.apply(next, fade, now_ms)
    }

    fn apply<P, T>(&mut self, new: LampState, fade: &mut FadeEngine<P, T>, now_ms: u64) -> TickOutcome
    where
        P: PwmPin<Duty = u16>,
        T: FadeTimer,
    {
        if new == self.current {
            return TickOutcome::default();
        }
        let change = StateChange { from: self.current, to: new };
        self.current = new;
        self.state_start_ms = now_ms;
        self.state_duration_ms = new.timeout_ms();

        let fade_error = match new.target_duty(self.max_brightness, fade.max_duty()) {
            Some(duty) => fade.start_fade_to(duty, new.fade_duration_ms(), now_ms).err(),
            // Anomaly leaves the output unchanged
            None => None,
        };
        TickOutcome {
            transition: Some(change),
            fade_error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fade::{FadeTimerError, FADE_TICK_MS};

    const TH: ThresholdValues = ThresholdValues { th1: 50.0, th2: 30.0, th3: 10.0 };

    const ALL_STATES: [LampState; 7] = [
        LampState::NoPresence,
        LampState::Active,
        LampState::PreSleep,
        LampState::LightSleep,
        LampState::DeepSleep,
        LampState::WakeUp,
        LampState::Anomaly,
    ];

    fn inputs(energy: f32, movement: bool, presence: bool, timed_out: bool) -> TickInputs {
        TickInputs { energy, movement, presence, timed_out }
    }

    macro_rules! assert_transition {
        ($from:expr, $inputs:expr, $to:expr) => {{
            assert_eq!(next_state($from, &$inputs, &TH), $to);
        }};
    }

    #[test]
    fn test_no_presence_transitions() {
        assert_transition!(LampState::NoPresence, inputs(0.0, true, false, false), LampState::Active);
        assert_transition!(LampState::NoPresence, inputs(0.0, false, true, false), LampState::PreSleep);
        assert_transition!(LampState::NoPresence, inputs(0.0, false, false, true), LampState::NoPresence);
    }

    #[test]
    fn test_active_transitions() {
        assert_transition!(LampState::Active, inputs(60.0, false, false, false), LampState::NoPresence);
        assert_transition!(LampState::Active, inputs(5.0, false, true, true), LampState::PreSleep);
        // Not yet timed out: stay
        assert_transition!(LampState::Active, inputs(5.0, false, true, false), LampState::Active);
        // High energy: stay even after the timeout
        assert_transition!(LampState::Active, inputs(80.0, false, true, true), LampState::Active);
    }

    #[test]
    fn test_pre_sleep_transitions() {
        assert_transition!(LampState::PreSleep, inputs(20.0, false, false, false), LampState::NoPresence);
        assert_transition!(LampState::PreSleep, inputs(60.0, true, true, false), LampState::Active);
        assert_transition!(LampState::PreSleep, inputs(20.0, false, true, true), LampState::LightSleep);
        assert_transition!(LampState::PreSleep, inputs(40.0, false, true, true), LampState::PreSleep);
    }

    #[test]
    fn test_light_sleep_transitions() {
        assert_transition!(LampState::LightSleep, inputs(20.0, false, false, false), LampState::NoPresence);
        assert_transition!(LampState::LightSleep, inputs(40.0, true, true, false), LampState::PreSleep);
        assert_transition!(LampState::LightSleep, inputs(8.0, false, true, false), LampState::DeepSleep);
        assert_transition!(LampState::LightSleep, inputs(20.0, false, true, false), LampState::LightSleep);
    }

    #[test]
    fn test_deep_sleep_transitions() {
        assert_transition!(LampState::DeepSleep, inputs(0.0, false, false, false), LampState::NoPresence);
        assert_transition!(LampState::DeepSleep, inputs(15.0, true, true, false), LampState::WakeUp);
        assert_transition!(LampState::DeepSleep, inputs(5.0, false, true, true), LampState::DeepSleep);
    }

    #[test]
    fn test_wake_up_transitions() {
        assert_transition!(LampState::WakeUp, inputs(0.0, false, false, false), LampState::NoPresence);
        assert_transition!(LampState::WakeUp, inputs(60.0, true, true, false), LampState::Active);
        assert_transition!(LampState::WakeUp, inputs(20.0, false, true, true), LampState::PreSleep);
        assert_transition!(LampState::WakeUp, inputs(20.0, false, true, false), LampState::WakeUp);
    }

    #[test]
    fn test_anomaly_exits_to_no_presence() {
        assert_transition!(LampState::Anomaly, inputs(99.0, true, true, true), LampState::NoPresence);
    }

    #[test]
    fn test_transition_function_is_total_and_deterministic() {
        for state in ALL_STATES {
            for energy in [0.0, 5.0, 15.0, 40.0, 60.0, 100.0] {
                for movement in [false, true] {
                    for presence in [false, true] {
                        for timed_out in [false, true] {
                            let i = inputs(energy, movement, presence, timed_out);
                            let a = next_state(state, &i, &TH);
                            let b = next_state(state, &i, &TH);
                            assert_eq!(a, b);
                            assert!(ALL_STATES.contains(&a));
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_target_duty_mapping() {
        let max_duty = 4095;
        assert_eq!(LampState::Active.target_duty(100, max_duty), Some(4095));
        assert_eq!(LampState::Active.target_duty(50, max_duty), Some(2047));
        assert_eq!(LampState::PreSleep.target_duty(100, max_duty), Some(2866));
        assert_eq!(LampState::LightSleep.target_duty(100, max_duty), Some(1228));
        assert_eq!(LampState::WakeUp.target_duty(100, max_duty), Some(2047));
        assert_eq!(LampState::NoPresence.target_duty(100, max_duty), Some(0));
        assert_eq!(LampState::DeepSleep.target_duty(100, max_duty), Some(0));
        assert_eq!(LampState::Anomaly.target_duty(100, max_duty), None);
    }

    // Machine-level tests drive a real fade engine over mock hardware.

    struct MockPwm {
        duty: u16,
    }

    impl PwmPin for MockPwm {
        type Duty = u16;

        fn disable(&mut self) {}

        fn enable(&mut self) {}

        fn get_duty(&self) -> u16 {
            self.duty
        }

        fn get_max_duty(&self) -> u16 {
            4095
        }

        fn set_duty(&mut self, duty: u16) {
            self.duty = duty;
        }
    }

    struct MockTimer;

    impl FadeTimer for MockTimer {
        fn start(&mut self, period_ms: u32) -> Result<(), FadeTimerError> {
            assert_eq!(period_ms, FADE_TICK_MS);
            Ok(())
        }

        fn stop(&mut self) {}

        fn reset(&mut self) {}
    }

    fn fade_engine() -> FadeEngine<MockPwm, MockTimer> {
        FadeEngine::new(MockPwm { duty: 0 }, MockTimer, 12)
    }

    fn reading(energy: f32, movement: bool, presence: bool) -> SensorReading {
        SensorReading {
            presence,
            movement,
            energy,
            ..Default::default()
        }
    }

    #[test]
    fn test_movement_activates_and_fades_up() {
        let mut machine = LampStateMachine::new();
        let mut fade = fade_engine();
        let outcome = machine.update(&reading(70.0, true, true), &TH, &mut fade, 100, true, 0);
        assert_eq!(
            outcome.transition,
            Some(StateChange { from: LampState::NoPresence, to: LampState::Active })
        );
        assert_eq!(outcome.fade_error, None);
        assert!(fade.is_still_fading());
        fade.poll(1_000);
        assert_eq!(fade.current_brightness(), 4095);
    }

    #[test]
    fn test_at_most_one_transition_per_tick() {
        let mut machine = LampStateMachine::new();
        let mut fade = fade_engine();
        machine.update(&reading(70.0, true, true), &TH, &mut fade, 100, true, 0);
        // Same conditions: no further transition
        let outcome = machine.update(&reading(70.0, true, true), &TH, &mut fade, 100, true, 100);
        assert_eq!(outcome, TickOutcome::default());
        assert_eq!(machine.current_state(), LampState::Active);
    }

    #[test]
    fn test_timeout_drives_active_to_pre_sleep() {
        let mut machine = LampStateMachine::new();
        let mut fade = fade_engine();
        machine.update(&reading(70.0, true, true), &TH, &mut fade, 100, true, 0);
        // Quiet presence, timeout not yet elapsed
        let outcome = machine.update(&reading(5.0, false, true), &TH, &mut fade, 100, true, 4 * 60 * 1_000);
        assert_eq!(outcome.transition, None);
        // After the 5 minute Active timeout
        let outcome = machine.update(&reading(5.0, false, true), &TH, &mut fade, 100, true, 5 * 60 * 1_000 + 1);
        assert_eq!(
            outcome.transition,
            Some(StateChange { from: LampState::Active, to: LampState::PreSleep })
        );
        // PreSleep targets 70% of max
        fade.poll(5 * 60 * 1_000 + 1 + 2_000);
        assert_eq!(fade.current_brightness(), 2866);
    }

    #[test]
    fn test_auto_mode_off_forces_no_presence() {
        let mut machine = LampStateMachine::new();
        let mut fade = fade_engine();
        machine.update(&reading(70.0, true, true), &TH, &mut fade, 100, true, 0);
        assert_eq!(machine.current_state(), LampState::Active);
        let outcome = machine.update(&reading(70.0, true, true), &TH, &mut fade, 100, false, 100);
        assert_eq!(
            outcome.transition,
            Some(StateChange { from: LampState::Active, to: LampState::NoPresence })
        );
        assert_eq!(machine.current_state(), LampState::NoPresence);
        // Fading out over the NoPresence fade duration
        fade.poll(2_100);
        assert_eq!(fade.current_brightness(), 0);
    }

    #[test]
    fn test_sensor_fault_enters_anomaly_and_recovers() {
        let mut machine = LampStateMachine::new();
        let mut fade = fade_engine();
        machine.update(&reading(70.0, true, true), &TH, &mut fade, 100, true, 0);
        fade.poll(1_000);
        let brightness = fade.current_brightness();

        let mut faulted = reading(0.0, false, false);
        faulted.fault = true;
        let outcome = machine.update(&faulted, &TH, &mut fade, 100, true, 2_000);
        assert_eq!(
            outcome.transition,
            Some(StateChange { from: LampState::Active, to: LampState::Anomaly })
        );
        // Anomaly leaves the output unchanged
        assert_eq!(fade.current_brightness(), brightness);

        // Fault cleared: unconditional exit to NoPresence
        let outcome = machine.update(&reading(0.0, false, false), &TH, &mut fade, 100, true, 3_000);
        assert_eq!(
            outcome.transition,
            Some(StateChange { from: LampState::Anomaly, to: LampState::NoPresence })
        );
    }

    #[test]
    fn test_max_brightness_is_clamped() {
        let mut machine = LampStateMachine::new();
        let mut fade = fade_engine();
        machine.update(&reading(70.0, true, true), &TH, &mut fade, 255, true, 0);
        fade.poll(1_000);
        assert_eq!(fade.current_brightness(), 4095);
    }
}
