//! Session glue: owns the data and event files of one running session.
//!
//! Files are released on every exit path. `finish()` reports errors from the
//! final save; dropping the session (early return, `?`, unwinding) saves
//! best-effort and logs failures.

use std::cell::RefCell;
use std::fmt::Display;
use std::rc::Rc;
use std::time::Duration;

use tracing::info;

use crate::collab::{ClockSource, LogLevel, LogSink, TracingLogSink};
use crate::config::OutputConfig;
use crate::datafile::DataFile;
use crate::error::Result;
use crate::eventfile::EventFile;
use crate::models::SessionInfo;
use crate::naming::{self, DATA_FILE_SUFFIX};
use crate::trigger::TriggerMatcherBuilder;

pub struct Session {
    info: SessionInfo,
    config: OutputConfig,
    clock: Rc<dyn ClockSource>,
    data: DataFile,
    events: Option<Rc<RefCell<EventFile>>>,
}

impl Session {
    /// Open the session's data file (and event file, if enabled).
    ///
    /// A missing start time is taken from the clock.
    pub fn start(
        mut info: SessionInfo,
        config: OutputConfig,
        clock: Rc<dyn ClockSource>,
    ) -> Result<Self> {
        if info.started_at.is_none() {
            info.started_at = clock.started_at();
        }

        let events = if config.event_logging {
            Some(EventFile::create(&info, "", &config, clock.clone())?.shared())
        } else {
            None
        };
        let mut data = DataFile::create(&info, "", &config)?;
        if let Some(events) = &events {
            data.set_log_sink(events.clone());
        }

        info!(
            program = %info.program_identity,
            subject = %info.subject_label(),
            data = %data.path().display(),
            "Session started"
        );
        let session = Self {
            info,
            config,
            clock,
            data,
            events,
        };
        session.log("Experiment,started");
        Ok(session)
    }

    /// Like [`Session::start`], numbering the subject after the highest
    /// subject already present in the data directory.
    pub fn start_next_subject(
        info: SessionInfo,
        config: OutputConfig,
        clock: Rc<dyn ClockSource>,
    ) -> Result<Self> {
        let subject = naming::next_session_ordinal(
            &config.data_directory,
            &info.program_identity,
            DATA_FILE_SUFFIX,
        )?;
        Self::start(info.with_subject(subject), config, clock)
    }

    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    pub fn config(&self) -> &OutputConfig {
        &self.config
    }

    pub fn clock(&self) -> Rc<dyn ClockSource> {
        self.clock.clone()
    }

    pub fn data(&mut self) -> &mut DataFile {
        &mut self.data
    }

    pub fn events(&self) -> Option<Rc<RefCell<EventFile>>> {
        self.events.clone()
    }

    /// Where session events go: the event file, or `tracing` without one.
    pub fn log_sink(&self) -> Rc<dyn LogSink> {
        match &self.events {
            Some(events) => events.clone() as Rc<dyn LogSink>,
            None => Rc::new(TracingLogSink) as Rc<dyn LogSink>,
        }
    }

    pub fn log(&self, event: impl Display) {
        self.log_sink().log(&event.to_string(), LogLevel::Info);
    }

    /// A trigger matcher wired to this session's clock, log and default code.
    /// The caller still supplies the input and cancellation sources.
    pub fn trigger_matcher(&self) -> TriggerMatcherBuilder {
        TriggerMatcherBuilder::default()
            .clock(self.clock.clone())
            .log_sink(self.log_sink())
            .default_code(self.config.trigger_default_code)
    }

    /// Save the data file, then flush the event file.
    pub fn save(&mut self) -> Result<Duration> {
        let elapsed = self.data.save()?;
        if let Some(events) = &self.events {
            events.borrow_mut().save()?;
        }
        Ok(elapsed)
    }

    /// Final save of both files.
    pub fn finish(self) -> Result<()> {
        let sink = self.log_sink();
        let Session { data, events, .. } = self;
        data.close()?;
        sink.log("Experiment,ended", LogLevel::Info);
        drop(sink);
        if let Some(events) = events {
            events.borrow_mut().save()?;
        }
        info!("Session finished");
        Ok(())
    }
}
