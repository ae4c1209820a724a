//! The typing session state machine.
//!
//! ```text
//! Idle --begin_countdown--> Countdown --tick_countdown(final)--> Running
//! Running --type_character(fills buffer)--> Finished
//! any --restart--> Idle
//! ```
//!
//! Every operation is synchronous and applies completely or not at all.
//! Calls made in the wrong phase are silent no-ops: key and timer events
//! racing a phase change are expected, not exceptional. The session never
//! schedules anything itself; the owner decides when ticks happen.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, SystemTime};

use tracing::debug;

use crate::metrics::SessionMetrics;

/// Source of wall-clock time for the session.
pub trait Clock {
    fn now(&self) -> SystemTime;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Hand-driven clock for tests. Clones share the same time.
#[derive(Clone, Debug)]
pub struct ManualClock {
    now: Rc<Cell<SystemTime>>,
}

impl ManualClock {
    pub fn new(start: SystemTime) -> Self {
        Self {
            now: Rc::new(Cell::new(start)),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }

    pub fn set(&self, to: SystemTime) {
        self.now.set(to);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000))
    }
}

impl PartialEq for ManualClock {
    fn eq(&self, other: &Self) -> bool {
        self.now.get() == other.now.get()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        self.now.get()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, strum_macros::Display)]
pub enum Phase {
    #[default]
    Idle,
    Countdown,
    Running,
    Finished,
}

/// One typing attempt against a target passage.
#[derive(Clone, Debug, PartialEq)]
pub struct Session<C: Clock = SystemClock> {
    clock: C,
    target: Vec<char>,
    input: Vec<char>,
    phase: Phase,
    countdown_remaining: u32,
    started_at: Option<SystemTime>,
    finished_at: Option<SystemTime>,
    result: Option<SessionMetrics>,
}

impl Session<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for Session<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> Session<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            clock,
            target: Vec::new(),
            input: Vec::new(),
            phase: Phase::Idle,
            countdown_remaining: 0,
            started_at: None,
            finished_at: None,
            result: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn target(&self) -> &[char] {
        &self.target
    }

    pub fn target_text(&self) -> String {
        self.target.iter().collect()
    }

    pub fn input(&self) -> &[char] {
        &self.input
    }

    pub fn input_text(&self) -> String {
        self.input.iter().collect()
    }

    pub fn countdown_remaining(&self) -> u32 {
        self.countdown_remaining
    }

    pub fn started_at(&self) -> Option<SystemTime> {
        self.started_at
    }

    pub fn finished_at(&self) -> Option<SystemTime> {
        self.finished_at
    }

    /// Metrics computed at the finishing instant.
    pub fn result(&self) -> Option<&SessionMetrics> {
        self.result.as_ref()
    }

    pub fn computed_wpm(&self) -> Option<u32> {
        self.result.map(|r| r.wpm)
    }

    pub fn has_text(&self) -> bool {
        !self.target.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.input.len() >= self.target.len()
    }

    /// Replace the passage. Only allowed between attempts; returns whether
    /// the text was taken.
    pub fn seed_text(&mut self, text: &str) -> bool {
        if !matches!(self.phase, Phase::Idle | Phase::Finished) {
            debug!(target: "session", phase = %self.phase, "seed_text ignored");
            return false;
        }
        self.target = text.chars().collect();
        self.reset_attempt();
        debug!(target: "session", len = self.target.len(), "text seeded");
        true
    }

    /// Enter `Countdown`. A zero duration is treated as one tick so that
    /// `started_at` always follows at least one tick.
    pub fn begin_countdown(&mut self, duration_secs: u32) {
        if self.phase != Phase::Idle || self.target.is_empty() {
            return;
        }
        self.phase = Phase::Countdown;
        self.countdown_remaining = duration_secs.max(1);
        debug!(target: "session", secs = self.countdown_remaining, "countdown started");
    }

    /// Apply one countdown tick. The final tick goes straight to `Running`.
    pub fn tick_countdown(&mut self) {
        if self.phase != Phase::Countdown {
            return;
        }
        if self.countdown_remaining <= 1 {
            self.countdown_remaining = 0;
            self.phase = Phase::Running;
            self.started_at = Some(self.clock.now());
            debug!(target: "session", "running");
        } else {
            self.countdown_remaining -= 1;
        }
    }

    /// Append a typed character; the character that fills the buffer
    /// finishes the session in the same call.
    pub fn type_character(&mut self, c: char) {
        if self.phase != Phase::Running || self.is_full() {
            return;
        }
        self.input.push(c);
        if self.input.len() == self.target.len() {
            self.finish();
        }
    }

    pub fn backspace(&mut self) -> bool {
        if self.phase != Phase::Running {
            return false;
        }
        self.input.pop().is_some()
    }

    /// Back to `Idle` with the same passage.
    pub fn restart(&mut self) {
        self.reset_attempt();
    }

    /// Seconds elapsed in the attempt as of `now`, for display only.
    pub fn elapsed_secs(&self, now: SystemTime) -> f64 {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => secs_between(start, end),
            (Some(start), None) => secs_between(start, now),
            _ => 0.0,
        }
    }

    pub fn elapsed_secs_now(&self) -> f64 {
        self.elapsed_secs(self.clock.now())
    }

    fn finish(&mut self) {
        let now = self.clock.now();
        self.phase = Phase::Finished;
        self.finished_at = Some(now);
        let elapsed = self
            .started_at
            .map_or(0.0, |start| secs_between(start, now));
        let metrics = SessionMetrics::compute(&self.target, &self.input, elapsed);
        debug!(
            target: "session",
            wpm = metrics.wpm,
            accuracy = metrics.accuracy,
            elapsed,
            "finished"
        );
        self.result = Some(metrics);
    }

    fn reset_attempt(&mut self) {
        self.input.clear();
        self.phase = Phase::Idle;
        self.countdown_remaining = 0;
        self.started_at = None;
        self.finished_at = None;
        self.result = None;
    }
}

fn secs_between(start: SystemTime, end: SystemTime) -> f64 {
    end.duration_since(start)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}
