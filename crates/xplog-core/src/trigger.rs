//! Trigger matching: block until an input code satisfies a target code.
//!
//! Codes match exactly, or bitwise (`observed & code != 0`) to wait for a bit
//! pattern. With no target code at all, any code matches.

use std::rc::Rc;

use tracing::debug;

use crate::collab::{CancellationSource, ClockSource, LogLevel, LogSink, RawInputSource};
use crate::error::{Result, XplogError};

/// A resolved wait: the code that matched and the time it took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerHit {
    pub code: i64,
    pub elapsed_ms: u64,
}

pub fn compare_codes(observed: i64, code: i64, bitwise: bool) -> bool {
    if bitwise {
        observed & code != 0
    } else {
        observed == code
    }
}

fn accepts(observed: i64, code: Option<i64>, bitwise: bool) -> bool {
    code.map_or(true, |code| compare_codes(observed, code, bitwise))
}

/// Entries of `history` that match `code` (all of them when `code` is `None`).
pub fn matching(history: &[i64], code: Option<i64>, bitwise: bool) -> Vec<i64> {
    history
        .iter()
        .copied()
        .filter(|&observed| accepts(observed, code, bitwise))
        .collect()
}

pub fn count_matching(history: &[i64], code: Option<i64>, bitwise: bool) -> usize {
    history
        .iter()
        .filter(|&&observed| accepts(observed, code, bitwise))
        .count()
}

pub struct TriggerMatcher {
    source: Box<dyn RawInputSource>,
    clock: Rc<dyn ClockSource>,
    cancellation: Box<dyn CancellationSource>,
    log_sink: Rc<dyn LogSink>,
    default_code: Option<i64>,
}

impl TriggerMatcher {
    pub fn builder() -> TriggerMatcherBuilder {
        TriggerMatcherBuilder::default()
    }

    pub fn default_code(&self) -> Option<i64> {
        self.default_code
    }

    pub fn set_default_code(&mut self, code: Option<i64>) {
        self.default_code = code;
    }

    /// Block until a matching code arrives or the host cancels.
    ///
    /// `code` falls back to the default code. Cancellation is checked before
    /// each poll, so a cancelled wait consumes no further input and yields `None`.
    pub fn wait(&mut self, code: Option<i64>, bitwise: bool) -> Option<TriggerHit> {
        let start = self.clock.now_millis();
        let code = code.or(self.default_code);
        self.source.clear();

        let hit = loop {
            if self.cancellation.service_and_check() {
                debug!("Trigger wait cancelled");
                break None;
            }
            if let Some(observed) = self.source.poll() {
                if accepts(observed, code, bitwise) {
                    let elapsed_ms = self.clock.now_millis().saturating_sub(start);
                    break Some(TriggerHit {
                        code: observed,
                        elapsed_ms,
                    });
                }
            }
        };

        let found = hit.map_or_else(|| "None".to_string(), |h| h.code.to_string());
        self.log_sink
            .log(&format!("TriggerInput,received,{found},wait"), LogLevel::Info);
        hit
    }

    /// Matching entries of the source's history, `None` without a history.
    pub fn get_triggers(&mut self, code: Option<i64>, bitwise: bool) -> Option<Vec<i64>> {
        self.source.clear();
        let history = self.source.input_history()?;
        Some(matching(&history, code.or(self.default_code), bitwise))
    }

    /// Number of matching entries in the source's history, `None` without a history.
    pub fn trigger_count(&mut self, code: Option<i64>, bitwise: bool) -> Option<usize> {
        self.source.clear();
        let history = self.source.input_history()?;
        Some(count_matching(&history, code.or(self.default_code), bitwise))
    }
}

/// Collects the matcher's collaborators; a missing one fails `build()`.
#[derive(Default)]
pub struct TriggerMatcherBuilder {
    source: Option<Box<dyn RawInputSource>>,
    clock: Option<Rc<dyn ClockSource>>,
    cancellation: Option<Box<dyn CancellationSource>>,
    log_sink: Option<Rc<dyn LogSink>>,
    default_code: Option<i64>,
}

impl TriggerMatcherBuilder {
    pub fn source(mut self, source: impl RawInputSource + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn clock(mut self, clock: Rc<dyn ClockSource>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn cancellation(mut self, cancellation: impl CancellationSource + 'static) -> Self {
        self.cancellation = Some(Box::new(cancellation));
        self
    }

    pub fn log_sink(mut self, sink: Rc<dyn LogSink>) -> Self {
        self.log_sink = Some(sink);
        self
    }

    pub fn default_code(mut self, code: Option<i64>) -> Self {
        self.default_code = code;
        self
    }

    pub fn build(self) -> Result<TriggerMatcher> {
        let source = self
            .source
            .ok_or_else(|| XplogError::DeviceUnavailable("no raw input source".into()))?;
        let clock = self
            .clock
            .ok_or_else(|| XplogError::DeviceUnavailable("no clock source".into()))?;
        let cancellation = self
            .cancellation
            .ok_or_else(|| XplogError::DeviceUnavailable("no cancellation source".into()))?;
        let log_sink = self
            .log_sink
            .ok_or_else(|| XplogError::DeviceUnavailable("no log sink".into()))?;
        Ok(TriggerMatcher {
            source,
            clock,
            cancellation,
            log_sink,
            default_code: self.default_code,
        })
    }
}
