//! xplog-core: buffered, crash-safe data and event logging for experiment sessions.
//!
//! The central piece is [`DataFile`]: rows are appended to an in-memory
//! buffer and flushed in single appends, while header annotations and the
//! variable schema can still be amended after rows exist. `save()` merges
//! them with a snapshot-and-stream rewrite that never reorders, duplicates or
//! drops body rows. [`TriggerMatcher`] waits for input codes from an injected
//! device and logs every resolution.

pub mod collab;
pub mod config;
pub mod datafile;
pub mod error;
pub mod eventfile;
pub mod inputfile;
pub mod models;
pub mod naming;
pub mod output;
pub mod reader;
pub mod recovery;
pub mod session;
pub mod sink;
pub mod storage;
pub mod trigger;

pub use collab::{
    CancelFlag, CancellationSource, ClockSource, LogLevel, LogSink, NeverCancel, RawInputSource,
    ScriptedInput, SystemClock, TracingLogSink,
};
pub use config::OutputConfig;
pub use datafile::DataFile;
pub use error::{Result, XplogError};
pub use eventfile::EventFile;
pub use inputfile::InputFile;
pub use models::{DataValue, SessionInfo};
pub use naming::{next_session_ordinal, standard_name, NamingContext};
pub use reader::{read_data_file, DataFileContents};
pub use recovery::{find_recovery_artifacts, recover};
pub use session::Session;
pub use sink::BufferedSink;
pub use trigger::{compare_codes, count_matching, TriggerHit, TriggerMatcher};
