//! Error handling.

use heapless::spsc::Queue;

/// All possible error types
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Error {
    /// The radar sensor reported itself as not connected; the last
    /// known reading is retained.
    RadarNotConnected,
    /// Starting the periodic fade timer failed even after a reset.
    FadeTimerStartFailed,
    /// A normal fade was requested while the setup blink owns the
    /// output.
    BlinkModeActive,
    /// Persisting a threshold value failed; the save is skipped.
    ThresholdSaveFailed,
}

impl Error {
    /// Enqueue this error into a bounded log queue, dropping the
    /// oldest entry if the queue is full.
    pub fn log<const N: usize>(&self, queue: &mut Queue<Self, N>) {
        match queue.enqueue(*self) {
            Ok(()) => { /* Enqueued */ }
            Err(e) => {
                // Queue full, drop the oldest value and try again
                queue.dequeue();
                queue.enqueue(e).ok();
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RadarNotConnected => "Radar sensor not connected, keeping last reading",
            Self::FadeTimerStartFailed => "Fade timer start failed, no fade scheduled",
            Self::BlinkModeActive => "Fade rejected while setup blink is active",
            Self::ThresholdSaveFailed => "Threshold save failed, skipping this save",
        }
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::error::Error for Error {}

impl ufmt::uDisplay for Error {
    fn fmt<W>(&self, f: &mut ufmt::Formatter<'_, W>) -> Result<(), W::Error>
    where
        W: ufmt::uWrite + ?Sized,
    {
        f.write_str(self.as_str())
    }
}
