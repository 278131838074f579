//! Non-blocking PWM fade engine.
//!
//! Drives a PWM output towards a target duty cycle over a given
//! duration without blocking the caller. `start_fade_to` only records
//! the fade task; progression happens in `poll`, which the owner calls
//! from a periodic hardware-timer context. The engine owns starting and
//! stopping that timer through the [`FadeTimer`] trait.

use embedded_hal::PwmPin;

use crate::errors::Error;

/// Period of the fade progression timer.
pub const FADE_TICK_MS: u32 = 20;

/// Blink ceiling divisor: the setup blink fades between zero and
/// `max_duty / 128`.
const BLINK_CEILING_DIVISOR: u16 = 128;

/// The periodic timer that drives fade progression.
///
/// On hardware this wraps a one-shot/periodic hardware timer whose
/// interrupt handler calls [`FadeEngine::poll`]. Starting may fail
/// (timer already claimed, clock not running); `reset` returns the
/// peripheral to a known state before a retry.
pub trait FadeTimer {
    fn start(&mut self, period_ms: u32) -> Result<(), FadeTimerError>;
    fn stop(&mut self);
    fn reset(&mut self);
}

/// Opaque hardware timer failure.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub struct FadeTimerError;

/// One in-flight brightness transition.
#[derive(Debug, Copy, Clone)]
struct FadeTask {
    start_value: u16,
    target: u16,
    started_at: u64,
    duration_ms: u32,
    /// Tags the task with the epoch it was started in, so a stale task
    /// can never complete on behalf of a newer one.
    epoch: u16,
}

#[derive(Debug, Copy, Clone)]
struct BlinkState {
    period_ms: u32,
}

pub struct FadeEngine<P: PwmPin<Duty = u16>, T: FadeTimer> {
    pwm: P,
    timer: T,
    max_duty: u16,
    current: u16,
    task: Option<FadeTask>,
    blink: Option<BlinkState>,
    epoch: u16,
    timer_running: bool,
}

impl<P: PwmPin<Duty = u16>, T: FadeTimer> FadeEngine<P, T> {
    /// Create an engine for a PWM channel with the given duty
    /// resolution in bits (e.g. 12 for duties 0..=4095).
    pub fn new(mut pwm: P, timer: T, resolution_bits: u8) -> Self {
        let max_duty = ((1u32 << resolution_bits.min(16)) - 1) as u16;
        pwm.set_duty(0);
        pwm.enable();
        Self {
            pwm,
            timer,
            max_duty,
            current: 0,
            task: None,
            blink: None,
            epoch: 0,
            timer_running: false,
        }
    }

    /// Maximum representable duty for the configured resolution.
    pub fn max_duty(&self) -> u16 {
        self.max_duty
    }

    pub fn current_brightness(&self) -> u16 {
        self.current
    }

    /// True between `start_fade_to` and the fade's natural completion.
    pub fn is_still_fading(&self) -> bool {
        self.task.is_some()
    }

    /// Immediately set the output, cancelling any in-flight fade.
    pub fn set_brightness(&mut self, value: u16) {
        self.epoch = self.epoch.wrapping_add(1);
        self.task = None;
        self.current = value.min(self.max_duty);
        self.pwm.set_duty(self.current);
        self.stop_timer_if_idle();
    }

    /// Begin a linear duty-space fade from the current instantaneous
    /// value to `target` over `duration_ms`. Supersedes any in-flight
    /// fade. Rejected while the setup blink is active.
    pub fn start_fade_to(&mut self, target: u16, duration_ms: u32, now_ms: u64) -> Result<(), Error> {
        if self.blink.is_some() {
            return Err(Error::BlinkModeActive);
        }
        self.begin_fade(target, duration_ms, now_ms)
    }

    /// Fade to the maximum duty.
    pub fn start_fade_in(&mut self, duration_ms: u32, now_ms: u64) -> Result<(), Error> {
        self.start_fade_to(self.max_duty, duration_ms, now_ms)
    }

    /// Fade to zero.
    pub fn start_fade_out(&mut self, duration_ms: u32, now_ms: u64) -> Result<(), Error> {
        self.start_fade_to(0, duration_ms, now_ms)
    }

    /// Indicator mode for out-of-band status signaling: repeatedly
    /// fade between zero and a low ceiling every `period_ms / 2`.
    /// Mutually exclusive with normal fading while active.
    pub fn start_setup_blink(&mut self, period_ms: u32, now_ms: u64) -> Result<(), Error> {
        if self.blink.is_some() {
            self.stop_setup_blink();
        }
        self.blink = Some(BlinkState { period_ms });
        let ceiling = self.blink_ceiling();
        match self.begin_fade(ceiling, period_ms / 2, now_ms) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.blink = None;
                Err(e)
            }
        }
    }

    /// Leave indicator mode and turn the output off.
    pub fn stop_setup_blink(&mut self) {
        if self.blink.take().is_some() {
            self.set_brightness(0);
        }
    }

    /// Advance the in-flight fade. Called from the periodic timer
    /// context; a no-op while no fade is active.
    pub fn poll(&mut self, now_ms: u64) {
        let task = match self.task {
            Some(task) if task.epoch == self.epoch => task,
            Some(_) => {
                // Superseded epoch, drop the stale task
                self.task = None;
                return;
            }
            None => return,
        };
        let elapsed = now_ms.saturating_sub(task.started_at);
        if elapsed >= u64::from(task.duration_ms) {
            self.current = task.target;
            self.pwm.set_duty(self.current);
            self.task = None;
            if let Some(blink) = self.blink {
                // Alternate between zero and the low ceiling
                let next = if self.current == 0 { self.blink_ceiling() } else { 0 };
                self.begin_fade(next, blink.period_ms / 2, now_ms).ok();
            } else {
                self.stop_timer_if_idle();
            }
        } else {
            let span = i64::from(task.target) - i64::from(task.start_value);
            let step = span * elapsed as i64 / i64::from(task.duration_ms);
            self.current = (i64::from(task.start_value) + step) as u16;
            self.pwm.set_duty(self.current);
        }
    }

    fn begin_fade(&mut self, target: u16, duration_ms: u32, now_ms: u64) -> Result<(), Error> {
        let target = target.min(self.max_duty);
        if duration_ms == 0 {
            self.set_brightness(target);
            return Ok(());
        }
        self.ensure_timer_running()?;
        self.epoch = self.epoch.wrapping_add(1);
        self.task = Some(FadeTask {
            start_value: self.current,
            target,
            started_at: now_ms,
            duration_ms,
            epoch: self.epoch,
        });
        Ok(())
    }

    /// Start the progression timer, with one reset-and-retry. On
    /// repeated failure the engine leaves brightness unchanged and the
    /// next fade request retries from scratch.
    fn ensure_timer_running(&mut self) -> Result<(), Error> {
        if self.timer_running {
            return Ok(());
        }
        if self.timer.start(FADE_TICK_MS).is_err() {
            self.timer.reset();
            if self.timer.start(FADE_TICK_MS).is_err() {
                return Err(Error::FadeTimerStartFailed);
            }
        }
        self.timer_running = true;
        Ok(())
    }

    fn stop_timer_if_idle(&mut self) {
        if self.timer_running && self.task.is_none() && self.blink.is_none() {
            self.timer.stop();
            self.timer_running = false;
        }
    }

    fn blink_ceiling(&self) -> u16 {
        (self.max_duty / BLINK_CEILING_DIVISOR).max(1)
    }
}
