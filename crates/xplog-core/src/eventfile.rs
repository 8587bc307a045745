//! Event file (`.xpe`): time-stamped event descriptions.

use std::cell::RefCell;
use std::fmt::Display;
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;

use tracing::{error, warn};

use crate::collab::{ClockSource, LogLevel, LogSink};
use crate::config::OutputConfig;
use crate::error::Result;
use crate::models::SessionInfo;
use crate::naming::{self, NamingContext, EVENT_FILE_SUFFIX};
use crate::output::OutputFile;

pub const EVENT_HEADER: &str = "Time,Type,Event,Value,Detail,Detail2";

pub struct EventFile {
    output: OutputFile,
    delimiter: String,
    clock: Rc<dyn ClockSource>,
}

impl EventFile {
    pub fn create(
        session: &SessionInfo,
        additional_suffix: &str,
        config: &OutputConfig,
        clock: Rc<dyn ClockSource>,
    ) -> Result<Self> {
        let suffix = naming::compose_suffix(additional_suffix, EVENT_FILE_SUFFIX);
        let naming = NamingContext {
            program_identity: session.program_identity.clone(),
            session_ordinal: session.subject,
            timestamp: session.started_at.filter(|_| config.time_stamp),
            suffix: suffix.clone(),
        };
        let mut output = OutputFile::create(
            &config.event_directory,
            &naming.file_name(),
            &suffix,
            config.comment_char,
            &config.eol,
            session.started_at.as_ref(),
        )?;
        output.write_comment(format!(
            "os: {} {}",
            std::env::consts::OS,
            std::env::consts::ARCH
        ));
        output.write_line(EVENT_HEADER);
        output.save()?;

        Ok(Self {
            output,
            delimiter: config.event_delimiter.clone(),
            clock,
        })
    }

    /// Wrap for sharing between the session, data file and trigger matchers.
    pub fn shared(self) -> Rc<RefCell<EventFile>> {
        Rc::new(RefCell::new(self))
    }

    pub fn path(&self) -> &Path {
        self.output.path()
    }

    /// Queue `<time ms><delimiter><event>`.
    pub fn log(&mut self, event: impl Display) {
        let line = format!("{}{}{}", self.clock.now_millis(), self.delimiter, event);
        self.output.write_line(line);
    }

    pub fn warn(&mut self, message: impl Display) {
        self.output.write_line(format!("WARNING: {message}"));
    }

    pub fn error(&mut self, message: impl Display) {
        self.output.write_line(format!("ERROR: {message}"));
    }

    pub fn save(&mut self) -> Result<Duration> {
        self.output.save()
    }
}

impl Drop for EventFile {
    fn drop(&mut self) {
        if let Err(e) = self.output.save() {
            error!(path = %self.output.path().display(), "Failed to save event file on drop: {}", e);
        }
    }
}

impl LogSink for RefCell<EventFile> {
    fn log(&self, event: &str, level: LogLevel) {
        let Ok(mut file) = self.try_borrow_mut() else {
            warn!(event, "Event file busy, event dropped");
            return;
        };
        match level {
            LogLevel::Debug | LogLevel::Info => file.log(event),
            LogLevel::Warn => file.warn(event),
            LogLevel::Error => file.error(event),
        }
    }
}
