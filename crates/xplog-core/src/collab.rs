//! Capabilities the core consumes from the host session.
//!
//! The display, keyboard and hardware layers live outside this crate. They
//! reach the core only through these traits, injected at construction.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDateTime;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Monotonic milliseconds plus the local time the session started.
pub trait ClockSource {
    fn now_millis(&self) -> u64;

    fn started_at(&self) -> Option<NaiveDateTime> {
        None
    }
}

/// A device delivering integer codes (button box, parallel port, ...).
pub trait RawInputSource {
    /// Next available code, if any. Must not block.
    fn poll(&mut self) -> Option<i64>;

    /// Discard input that arrived before now.
    fn clear(&mut self) {}

    /// Every code received so far, or `None` when the device keeps no history.
    fn input_history(&self) -> Option<Vec<i64>> {
        None
    }
}

/// Called once per wait iteration: keep the host responsive, report cancellation.
pub trait CancellationSource {
    fn service_and_check(&mut self) -> bool;
}

impl<F: FnMut() -> bool> CancellationSource for F {
    fn service_and_check(&mut self) -> bool {
        self()
    }
}

/// Receives event descriptions such as `TriggerInput,received,5,wait`.
pub trait LogSink {
    fn log(&self, event: &str, level: LogLevel);
}

// ─── Stock implementations ───────────────────────────────────────────────────

/// Wall clock anchored at construction.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
    started_at: NaiveDateTime,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            started_at: chrono::Local::now().naive_local(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockSource for SystemClock {
    fn now_millis(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }

    fn started_at(&self) -> Option<NaiveDateTime> {
        Some(self.started_at)
    }
}

/// Never cancels.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverCancel;

impl CancellationSource for NeverCancel {
    fn service_and_check(&mut self) -> bool {
        false
    }
}

/// Cancellation raised from elsewhere (a key handler, a signal hook).
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

impl CancellationSource for CancelFlag {
    fn service_and_check(&mut self) -> bool {
        self.is_cancelled()
    }
}

/// Forwards events to `tracing` when no event file is open.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn log(&self, event: &str, level: LogLevel) {
        match level {
            LogLevel::Debug => debug!(event, "xplog event"),
            LogLevel::Info => info!(event, "xplog event"),
            LogLevel::Warn => warn!(event, "xplog event"),
            LogLevel::Error => error!(event, "xplog event"),
        }
    }
}

/// Replays a fixed sequence of codes, one per poll.
///
/// Codes given to [`ScriptedInput::with_stale`] count as already buffered
/// before a wait starts; `clear()` moves them to the history unread.
#[derive(Debug, Clone, Default)]
pub struct ScriptedInput {
    stale: VecDeque<i64>,
    script: VecDeque<i64>,
    history: Option<Vec<i64>>,
    polls: usize,
}

impl ScriptedInput {
    pub fn new(codes: impl IntoIterator<Item = i64>) -> Self {
        Self {
            script: codes.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn with_stale(mut self, codes: impl IntoIterator<Item = i64>) -> Self {
        self.stale = codes.into_iter().collect();
        self
    }

    /// Keep every received code for `input_history()`.
    pub fn with_history(mut self) -> Self {
        self.history = Some(Vec::new());
        self
    }

    pub fn polls(&self) -> usize {
        self.polls
    }

    pub fn remaining(&self) -> usize {
        self.stale.len() + self.script.len()
    }

    fn record(&mut self, code: i64) {
        if let Some(history) = self.history.as_mut() {
            history.push(code);
        }
    }
}

impl RawInputSource for ScriptedInput {
    fn poll(&mut self) -> Option<i64> {
        self.polls += 1;
        let code = self.stale.pop_front().or_else(|| self.script.pop_front())?;
        self.record(code);
        Some(code)
    }

    fn clear(&mut self) {
        while let Some(code) = self.stale.pop_front() {
            self.record(code);
        }
    }

    fn input_history(&self) -> Option<Vec<i64>> {
        self.history.clone()
    }
}

/// Shared handle so a caller can inspect a source it handed to a matcher.
impl<T: RawInputSource> RawInputSource for Rc<RefCell<T>> {
    fn poll(&mut self) -> Option<i64> {
        self.borrow_mut().poll()
    }

    fn clear(&mut self) {
        self.borrow_mut().clear()
    }

    fn input_history(&self) -> Option<Vec<i64>> {
        self.borrow().input_history()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scripted_input_clear_drops_stale_codes_into_history() {
        let mut input = ScriptedInput::new([4]).with_stale([9, 9]).with_history();
        input.clear();
        assert_eq!(input.poll(), Some(4));
        assert_eq!(input.poll(), None);
        assert_eq!(input.input_history(), Some(vec![9, 9, 4]));
        assert_eq!(input.polls(), 2);
    }

    #[test]
    fn closures_and_flags_cancel() {
        let mut calls = 0;
        let mut check = || {
            calls += 1;
            calls > 1
        };
        assert!(!check.service_and_check());
        assert!(check.service_and_check());

        let flag = CancelFlag::new();
        let mut handle = flag.clone();
        assert!(!handle.service_and_check());
        flag.cancel();
        assert!(handle.service_and_check());
    }
}
