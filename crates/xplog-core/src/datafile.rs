//! Structured data file (`.xpd`): an amendable header over an append-only body.
//!
//! On disk the file is always laid out as
//!
//! ```text
//! #xplog 0.1.0, .xpd-file
//! #date: ...
//! #--EXPERIMENT INFO
//! #e ...               experiment-info block
//! #--SUBJECT INFO
//! #s ...               subject-info block
//! subject_id,a,b       schema line, directly after the subject-info block
//! 1,...                body rows
//! ```
//!
//! Header annotations and schema changes are queued in memory. `save()` merges
//! them with a two-phase rewrite:
//!
//! 1. flush buffered rows, then rename the file to a hidden snapshot
//!    `.<name>.<uuid>.tmp` next to it;
//! 2. stream the snapshot into a fresh file at the canonical path, injecting
//!    queued lines at the end of their block and replacing the schema line,
//!    then sync and delete the snapshot.
//!
//! A crash between the two phases leaves the snapshot as the only complete
//! copy; [`crate::recovery::recover`] puts it back.

use std::fmt::Display;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use crate::collab::{LogLevel, LogSink};
use crate::config::OutputConfig;
use crate::error::{Result, XplogError};
use crate::models::{DataValue, SessionInfo};
use crate::naming::{self, NamingContext, DATA_FILE_SUFFIX};
use crate::output::OutputFile;
use crate::recovery;
use crate::storage;

pub struct DataFile {
    output: OutputFile,
    delimiter: String,
    subject: String,
    experiment_info: Vec<String>,
    subject_info: Vec<String>,
    variable_names: Vec<String>,
    names_dirty: bool,
    log_sink: Option<Rc<dyn LogSink>>,
    /// Snapshot left by a failed rollback; writes stop until it is restored.
    awaiting_recovery: Option<PathBuf>,
    closed: bool,
}

impl DataFile {
    /// Create `{program}[_{subject}][_{timestamp}][.{additional_suffix}].xpd`
    /// in the configured data directory and write its initial header.
    pub fn create(
        session: &SessionInfo,
        additional_suffix: &str,
        config: &OutputConfig,
    ) -> Result<Self> {
        if config.data_delimiter.is_empty() {
            return Err(XplogError::Other("data delimiter must not be empty".into()));
        }
        let suffix = naming::compose_suffix(additional_suffix, DATA_FILE_SUFFIX);
        let naming = NamingContext {
            program_identity: session.program_identity.clone(),
            session_ordinal: session.subject,
            timestamp: session.started_at.filter(|_| config.time_stamp),
            suffix: suffix.clone(),
        };
        let output = OutputFile::create(
            &config.data_directory,
            &naming.file_name(),
            &suffix,
            config.comment_char,
            &config.eol,
            session.started_at.as_ref(),
        )?;

        let mut file = Self {
            output,
            delimiter: config.data_delimiter.clone(),
            subject: session.subject_label(),
            experiment_info: Vec::new(),
            subject_info: Vec::new(),
            variable_names: Vec::new(),
            names_dirty: false,
            log_sink: None,
            awaiting_recovery: None,
            closed: false,
        };
        file.output.write_comment("--EXPERIMENT INFO");
        file.output
            .write_comment(format!("e mainfile: {}", session.program_identity));
        file.output.write_comment("--SUBJECT INFO");
        file.output.write_comment(format!("s id: {}", file.subject));
        let schema = file.schema_line();
        file.output.write_line(schema);
        file.save()?;
        Ok(file)
    }

    /// Report saves to `sink` (as `Data,saved`).
    pub fn set_log_sink(&mut self, sink: Rc<dyn LogSink>) {
        self.log_sink = Some(sink);
    }

    pub fn path(&self) -> &Path {
        self.output.path()
    }

    pub fn file_name(&self) -> String {
        self.output.file_name()
    }

    pub fn delimiter(&self) -> &str {
        &self.delimiter
    }

    pub fn comment_char(&self) -> char {
        self.output.comment_char()
    }

    pub fn variable_names(&self) -> &[String] {
        &self.variable_names
    }

    /// Whether the next `save()` has to rewrite the header.
    pub fn header_dirty(&self) -> bool {
        !self.experiment_info.is_empty() || !self.subject_info.is_empty() || self.names_dirty
    }

    // ─── Body ────────────────────────────────────────────────────────────────

    /// Queue one data row, prefixed with the subject id.
    pub fn append_row<I, V>(&mut self, values: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<DataValue>,
    {
        let fields: Vec<String> = values.into_iter().map(|v| v.into().render()).collect();
        self.output.write(&self.subject);
        self.output.write(&self.delimiter);
        self.output.write_line(fields.join(&self.delimiter));
    }

    /// Queue a row of dynamically typed values.
    ///
    /// Every value is checked before anything is queued, so a rejected row
    /// leaves the buffer untouched.
    pub fn append_json_row(&mut self, values: &[serde_json::Value]) -> Result<()> {
        let row = values
            .iter()
            .cloned()
            .map(DataValue::try_from)
            .collect::<Result<Vec<_>>>()?;
        self.append_row(row);
        Ok(())
    }

    // ─── Header ──────────────────────────────────────────────────────────────

    /// Queue `text` for the experiment-info block, one `#e` line per text line.
    pub fn append_experiment_info(&mut self, text: impl Display) {
        let lines = self.tag_lines('e', &text.to_string());
        self.experiment_info.extend(lines);
    }

    /// Queue `text` for the subject-info block, one `#s` line per text line.
    ///
    /// Use `name = value` or `name : value` to record between-subject variables.
    pub fn append_subject_info(&mut self, text: impl Display) {
        let lines = self.tag_lines('s', &text.to_string());
        self.subject_info.extend(lines);
    }

    pub fn set_variable_names<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.variable_names = names.into_iter().map(Into::into).collect();
        self.names_dirty = true;
    }

    pub fn add_variable_names<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.variable_names.extend(names.into_iter().map(Into::into));
        self.names_dirty = true;
    }

    pub fn clear_variable_names(&mut self) {
        self.variable_names.clear();
        self.names_dirty = true;
    }

    fn tag_lines(&self, tag: char, text: &str) -> Vec<String> {
        let marker = self.output.comment_char();
        let eol = self.output.eol();
        text.lines()
            .map(|line| format!("{marker}{tag} {line}{eol}"))
            .collect()
    }

    fn schema_line(&self) -> String {
        format!("subject_id,{}", self.variable_names.join(&self.delimiter))
    }

    // ─── Persistence ─────────────────────────────────────────────────────────

    /// Merge queued header changes into the file, then flush buffered rows.
    ///
    /// Without header changes this is a plain append of the buffer.
    pub fn save(&mut self) -> Result<Duration> {
        self.check_recovered()?;
        let start = Instant::now();
        let had_rows = self.output.has_pending();
        if self.header_dirty() {
            self.rewrite_header()?;
        }
        // Anything queued since the snapshot was taken.
        self.output.save()?;
        if had_rows {
            if let Some(sink) = &self.log_sink {
                sink.log("Data,saved", LogLevel::Info);
            }
        }
        Ok(start.elapsed())
    }

    /// Rename the file; buffered rows are flushed first.
    pub fn rename(&mut self, new_file_name: impl AsRef<Path>) -> Result<()> {
        self.check_recovered()?;
        self.output.rename(new_file_name)
    }

    /// Snapshot an aborted rewrite left behind, if any.
    pub fn awaiting_recovery(&self) -> Option<&Path> {
        self.awaiting_recovery.as_deref()
    }

    /// Put the snapshot of an aborted rewrite back at the canonical path.
    ///
    /// Buffered rows and queued header changes are kept for the next `save()`.
    pub fn recover(&mut self) -> Result<PathBuf> {
        let used = recovery::recover(self.output.path())?;
        self.awaiting_recovery = None;
        Ok(used)
    }

    fn check_recovered(&self) -> Result<()> {
        match &self.awaiting_recovery {
            Some(temp) => Err(XplogError::AwaitingRecovery {
                path: self.output.path().to_path_buf(),
                temp: temp.clone(),
            }),
            None => Ok(()),
        }
    }

    /// Final save. Dropping an unclosed file does the same, logging failures.
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        self.save().map(|_| ())
    }

    fn rewrite_header(&mut self) -> Result<()> {
        let path = self.output.path().to_path_buf();
        let dir = self.output.directory();
        let temp = dir.join(naming::temp_name(&self.output.file_name()));

        // Phase 1: every buffered row becomes durable under the snapshot name.
        self.output.sink_mut().flush()?;
        fs::rename(&path, &temp)?;
        debug!(path = %path.display(), temp = %temp.display(), "Snapshot taken for header rewrite");

        // Phase 2: stream the snapshot back into the canonical path.
        if let Err(source) = self.stream_rewrite(&temp, &path) {
            let err = abort_rewrite(&path, &temp, source);
            if matches!(err, XplogError::RewriteAborted { .. }) {
                self.awaiting_recovery = Some(temp);
            }
            return Err(err);
        }

        self.experiment_info.clear();
        self.subject_info.clear();
        self.names_dirty = false;

        fs::remove_file(&temp)?;
        storage::fsync_dir(&dir)?;
        info!(path = %path.display(), "Rewrote data file header");
        Ok(())
    }

    fn stream_rewrite(&self, temp: &Path, path: &Path) -> io::Result<()> {
        let reader = BufReader::new(File::open(temp)?);
        let mut writer = BufWriter::new(File::create(path)?);
        let patch = HeaderPatch {
            comment_char: self.output.comment_char(),
            experiment_info: &self.experiment_info,
            subject_info: &self.subject_info,
            schema_line: format!("{}{}", self.schema_line(), self.output.eol()),
        };
        patch.apply(reader, &mut writer)?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        storage::fsync_file(&file)
    }
}

impl Drop for DataFile {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.save() {
            error!(path = %self.path().display(), "Failed to save data file on drop: {}", e);
        }
    }
}

/// Undo a failed phase 2. The snapshot is moved back if possible and
/// otherwise left where it is as the recovery artifact.
fn abort_rewrite(path: &Path, temp: &Path, source: io::Error) -> XplogError {
    error!(path = %path.display(), "Header rewrite failed: {}", source);
    if path.exists() {
        if let Err(e) = fs::remove_file(path) {
            warn!(path = %path.display(), "Could not remove partial rewrite: {}", e);
        }
    }
    match fs::rename(temp, path) {
        Ok(()) => {
            warn!(path = %path.display(), "Rolled back to pre-rewrite content");
            XplogError::Io(source)
        }
        Err(e) => {
            error!(temp = %temp.display(), "Rollback failed, snapshot left in place: {}", e);
            XplogError::RewriteAborted {
                path: PathBuf::from(path),
                temp: PathBuf::from(temp),
                source,
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Block {
    Other,
    Experiment,
    Subject,
}

/// Queued header content, applied while streaming an existing file.
struct HeaderPatch<'a> {
    comment_char: char,
    experiment_info: &'a [String],
    subject_info: &'a [String],
    schema_line: String,
}

impl HeaderPatch<'_> {
    /// Copy `reader` to `writer` line by line. Queued experiment info goes
    /// after the last `#e` line; queued subject info and the new schema line
    /// go after the last `#s` line, replacing the old schema line.
    fn apply<R: BufRead, W: Write>(&self, mut reader: R, writer: &mut W) -> io::Result<()> {
        let experiment_marker = format!("{}e", self.comment_char);
        let subject_marker = format!("{}s", self.comment_char);
        let mut block = Block::Other;
        let mut line = String::new();

        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                break;
            }
            if line.starts_with(&experiment_marker) {
                block = Block::Experiment;
            } else if line.starts_with(&subject_marker) {
                block = Block::Subject;
            } else {
                let ended = block;
                block = Block::Other;
                self.close_block(ended, writer)?;
                if ended == Block::Subject {
                    continue;
                }
            }
            writer.write_all(line.as_bytes())?;
        }

        // The file ended inside a block.
        self.close_block(block, writer)
    }

    fn close_block<W: Write>(&self, block: Block, writer: &mut W) -> io::Result<()> {
        match block {
            Block::Experiment => write_all_lines(writer, self.experiment_info),
            Block::Subject => {
                write_all_lines(writer, self.subject_info)?;
                writer.write_all(self.schema_line.as_bytes())
            }
            Block::Other => Ok(()),
        }
    }
}

fn write_all_lines<W: Write>(writer: &mut W, lines: &[String]) -> io::Result<()> {
    for line in lines {
        writer.write_all(line.as_bytes())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patch<'a>(exp: &'a [String], subj: &'a [String], schema: &str) -> HeaderPatch<'a> {
        HeaderPatch {
            comment_char: '#',
            experiment_info: exp,
            subject_info: subj,
            schema_line: format!("{schema}\n"),
        }
    }

    fn run(patch: &HeaderPatch<'_>, input: &str) -> String {
        let mut out = Vec::new();
        patch.apply(input.as_bytes(), &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    const FILE: &str = "#xplog 0.1.0, .xpd-file\n\
                        #--EXPERIMENT INFO\n\
                        #e mainfile: exp\n\
                        #--SUBJECT INFO\n\
                        #s id: 1\n\
                        subject_id,\n\
                        1,a\n\
                        1,b\n";

    #[test]
    fn injects_at_block_ends_and_replaces_schema() {
        let exp = vec!["#e lab: 3\n".to_string()];
        let subj = vec!["#s age = 30\n".to_string()];
        let out = run(&patch(&exp, &subj, "subject_id,x,y"), FILE);
        assert_eq!(
            out,
            "#xplog 0.1.0, .xpd-file\n\
             #--EXPERIMENT INFO\n\
             #e mainfile: exp\n\
             #e lab: 3\n\
             #--SUBJECT INFO\n\
             #s id: 1\n\
             #s age = 30\n\
             subject_id,x,y\n\
             1,a\n\
             1,b\n"
        );
    }

    #[test]
    fn schema_only_change_keeps_everything_else() {
        let out = run(&patch(&[], &[], "subject_id,rt"), FILE);
        assert_eq!(out, FILE.replace("subject_id,\n", "subject_id,rt\n"));
    }

    #[test]
    fn failed_rollback_reports_snapshot() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("exp_01.xpd");
        let temp = tmp.path().join(naming::temp_name("exp_01.xpd"));
        let source = io::Error::new(io::ErrorKind::Other, "disk full");

        let err = abort_rewrite(&path, &temp, source);
        match err {
            XplogError::RewriteAborted { path: p, temp: t, .. } => {
                assert_eq!(p, path);
                assert_eq!(t, temp);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    fn data_file(tmp: &tempfile::TempDir) -> DataFile {
        let config = OutputConfig {
            time_stamp: false,
            ..OutputConfig::default()
        }
        .with_base_dir(tmp.path());
        DataFile::create(&SessionInfo::new("exp").with_subject(1), "", &config).unwrap()
    }

    #[test]
    fn writes_stop_until_snapshot_is_restored() {
        let tmp = tempfile::TempDir::new().unwrap();
        let mut file = data_file(&tmp);
        file.append_row([1]);
        file.save().unwrap();
        let before = fs::read_to_string(file.path()).unwrap();

        // State left behind when both the rewrite and its rollback failed.
        let temp = file.output.directory().join(naming::temp_name(&file.file_name()));
        fs::rename(file.path(), &temp).unwrap();
        file.awaiting_recovery = Some(temp.clone());

        file.append_row([2]);
        file.set_variable_names(["n"]);
        assert!(matches!(file.save(), Err(XplogError::AwaitingRecovery { .. })));
        assert!(matches!(file.rename("other.xpd"), Err(XplogError::AwaitingRecovery { .. })));
        assert!(!file.path().exists());

        assert_eq!(file.recover().unwrap(), temp);
        assert!(file.awaiting_recovery().is_none());
        assert_eq!(fs::read_to_string(file.path()).unwrap(), before);

        file.save().unwrap();
        let after = fs::read_to_string(file.path()).unwrap();
        assert!(after.ends_with("subject_id,n\n1,1\n1,2\n"));
        assert_eq!(after.matches("#s id: 1").count(), 1);
        file.close().unwrap();
    }

    #[test]
    fn end_of_file_inside_subject_block() {
        let input = "#--SUBJECT INFO\n#s id: 1\n";
        let subj = vec!["#s hand : left\n".to_string()];
        let out = run(&patch(&[], &subj, "subject_id,"), input);
        assert_eq!(out, "#--SUBJECT INFO\n#s id: 1\n#s hand : left\nsubject_id,\n");
    }
}
