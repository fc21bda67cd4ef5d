use std::time::Duration;

use serde::Serialize;

use super::timer::Timer;

/// Default delay between two playback steps.
pub const DEFAULT_SPEED_MS: u64 = 500;

/// Speed presets, slowest first.
pub const SPEED_PRESETS_MS: [u64; 4] = [1000, 500, 250, 100];

/// What the controller reads from the buffer it walks.
///
/// Taken as a fresh snapshot on every call, so the controller never holds a
/// reference into the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferView {
    pub len: usize,
    /// Whether more records may still arrive (the session is not terminal).
    pub growing: bool,
}

impl BufferView {
    #[must_use]
    pub const fn finished(len: usize) -> Self {
        Self {
            len,
            growing: false,
        }
    }

    #[must_use]
    pub const fn growing(len: usize) -> Self {
        Self { len, growing: true }
    }

    const fn last_index(self) -> usize {
        self.len.saturating_sub(1)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, derive_more::Display, derive_more::IsVariant)]
pub enum PlaybackPhase {
    /// No data.
    #[display("idle")]
    Idle,
    /// Data available, positioned at the start, not playing.
    #[display("ready")]
    Ready,
    #[display("playing")]
    Playing,
    #[display("paused")]
    Paused,
    /// Stopped at the last record of a buffer that will not grow.
    #[display("finished")]
    Finished,
}

/// Observable playback state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlaybackState {
    pub current_index: usize,
    pub is_playing: bool,
    pub speed_ms_per_step: u64,
    pub buffer_length: usize,
}

/// Replays a buffer of records at a controllable rate.
///
/// The controller owns only its position, speed and tick timer. Each tick is
/// one state transition and re-arms the timer itself, so ticks never overlap.
/// The position always stays within the buffer it was last shown.
#[derive(Debug, Clone)]
pub struct PlaybackController {
    phase: PlaybackPhase,
    current_index: usize,
    speed_ms: u64,
    scrubbing: bool,
    timer: Timer,
}

impl Default for PlaybackController {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackController {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            phase: PlaybackPhase::Idle,
            current_index: 0,
            speed_ms: DEFAULT_SPEED_MS,
            scrubbing: false,
            timer: Timer::new(),
        }
    }

    #[must_use]
    pub const fn phase(&self) -> PlaybackPhase {
        self.phase
    }

    #[must_use]
    pub const fn current_index(&self) -> usize {
        self.current_index
    }

    #[must_use]
    pub const fn is_playing(&self) -> bool {
        self.phase.is_playing()
    }

    /// Whether the last positioning came from a direct `set_index`.
    #[must_use]
    pub const fn is_scrubbing(&self) -> bool {
        self.scrubbing
    }

    #[must_use]
    pub const fn speed_ms(&self) -> u64 {
        self.speed_ms
    }

    #[must_use]
    pub const fn deadline(&self) -> Option<Duration> {
        self.timer.deadline()
    }

    #[must_use]
    pub const fn state(&self, view: BufferView) -> PlaybackState {
        PlaybackState {
            current_index: self.current_index,
            is_playing: self.is_playing(),
            speed_ms_per_step: self.speed_ms,
            buffer_length: view.len,
        }
    }

    /// Starts or resumes playback. Restarts from the beginning when
    /// finished; does nothing on an empty buffer or while already playing.
    pub fn play(&mut self, view: BufferView, now: Duration) {
        self.sync(view);
        match self.phase {
            PlaybackPhase::Idle | PlaybackPhase::Playing => return,
            PlaybackPhase::Finished => self.current_index = 0,
            PlaybackPhase::Ready | PlaybackPhase::Paused => {}
        }
        self.scrubbing = false;
        self.phase = PlaybackPhase::Playing;
        self.arm(now);
    }

    pub fn pause(&mut self) {
        if self.phase.is_playing() {
            self.timer.cancel();
            self.phase = PlaybackPhase::Paused;
            self.scrubbing = false;
        }
    }

    pub fn toggle(&mut self, view: BufferView, now: Duration) {
        if self.is_playing() {
            self.pause();
        } else {
            self.play(view, now);
        }
    }

    /// Stops playback and rewinds to the first record.
    pub fn reset(&mut self, view: BufferView) {
        self.timer.cancel();
        self.current_index = 0;
        self.scrubbing = false;
        self.phase = if view.len == 0 {
            PlaybackPhase::Idle
        } else {
            PlaybackPhase::Ready
        };
    }

    /// Sets the delay between steps (at least 1 ms). A pending tick keeps
    /// its deadline; the new speed applies from the next one.
    pub fn set_speed(&mut self, ms: u64) {
        self.speed_ms = ms.max(1);
    }

    /// Moves to the next faster preset, if any.
    pub fn speed_up(&mut self) {
        if let Some(&ms) = SPEED_PRESETS_MS.iter().find(|&&ms| ms < self.speed_ms) {
            self.set_speed(ms);
        }
    }

    /// Moves to the next slower preset, if any.
    pub fn slow_down(&mut self) {
        if let Some(&ms) = SPEED_PRESETS_MS.iter().rev().find(|&&ms| ms > self.speed_ms) {
            self.set_speed(ms);
        }
    }

    /// Jumps to `index`, clamped to the buffer. Does not start or stop
    /// playback.
    ///
    /// A stopped cursor that lands on the last record of a finished buffer
    /// is `Finished`, so a following `play` restarts from the beginning;
    /// moving off that record makes it `Paused`.
    pub fn set_index(&mut self, index: usize, view: BufferView) {
        self.sync(view);
        if view.len == 0 {
            return;
        }
        self.current_index = index.min(view.last_index());
        self.scrubbing = true;
        let at_end = self.current_index == view.last_index() && !view.growing;
        self.phase = match self.phase {
            PlaybackPhase::Finished if !at_end => PlaybackPhase::Paused,
            PlaybackPhase::Paused if at_end => PlaybackPhase::Finished,
            PlaybackPhase::Ready if self.current_index > 0 => {
                if at_end {
                    PlaybackPhase::Finished
                } else {
                    PlaybackPhase::Paused
                }
            }
            phase => phase,
        };
    }

    /// Moves by `delta` records, clamped to the buffer.
    pub fn step_by(&mut self, delta: isize, view: BufferView) {
        let index = self.current_index.saturating_add_signed(delta);
        self.set_index(index, view);
    }

    /// Reconciles with a changed buffer: leaves `Idle` once data exists,
    /// returns to `Idle` when the buffer is emptied, and pulls the position
    /// back inside a shrunk buffer.
    pub fn sync(&mut self, view: BufferView) {
        if view.len == 0 {
            if self.phase != PlaybackPhase::Idle {
                self.timer.cancel();
                self.phase = PlaybackPhase::Idle;
            }
            self.current_index = 0;
            self.scrubbing = false;
            return;
        }
        if self.phase.is_idle() {
            self.phase = PlaybackPhase::Ready;
            self.current_index = 0;
        }
        self.current_index = self.current_index.min(view.last_index());
    }

    /// Runs the pending tick if it is due at `now`. Returns whether a tick
    /// ran.
    ///
    /// The next tick is scheduled from this tick's deadline, so a caller
    /// that falls behind catches up one step per call.
    pub fn tick(&mut self, now: Duration, view: BufferView) -> bool {
        let Some(at) = self.timer.fire(now) else {
            return false;
        };
        self.sync(view);
        if !self.phase.is_playing() {
            return true;
        }
        self.scrubbing = false;
        let last = view.last_index();
        if self.current_index < last {
            self.current_index += 1;
        }
        if self.current_index == last && !view.growing {
            self.phase = PlaybackPhase::Finished;
        } else {
            self.arm(at);
        }
        true
    }

    fn arm(&mut self, from: Duration) {
        self.timer.arm(from, Duration::from_millis(self.speed_ms));
    }
}
