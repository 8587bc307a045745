//! xplog CLI: inspect, export, list and recover experiment log files.

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL, Table};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use xplog_core::naming::{DATA_FILE_SUFFIX, EVENT_FILE_SUFFIX};
use xplog_core::{read_data_file, storage, DataFileContents, OutputConfig};

#[derive(Parser)]
#[command(
    name = "xplog",
    about = "xplog: inspect and maintain experiment data and event logs",
    version,
    author
)]
struct Cli {
    /// YAML file with output defaults (delimiter, comment char, ...)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Also write diagnostics to <dir>/xplog.log
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the header blocks, schema and last row of a data file
    Inspect {
        /// Path to the .xpd file
        file: PathBuf,
    },
    /// Export the rows of a data file to CSV or JSON
    Export {
        /// Path to the .xpd file
        file: PathBuf,
        /// Output format
        #[arg(long, short, default_value = "csv", value_parser = ["csv", "json"])]
        format: String,
        /// Output file (default: stdout)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// List data (or event) files in a directory
    List {
        /// Directory to scan
        #[arg(default_value = "./data")]
        dir: PathBuf,
        /// Only files of this program
        #[arg(long, short)]
        program: Option<String>,
        /// List .xpe event files instead of .xpd data files
        #[arg(long)]
        events: bool,
    },
    /// Print the next free subject number for a program
    NextSubject {
        /// Directory holding the data files
        #[arg(default_value = "./data")]
        dir: PathBuf,
        /// Program name the files start with
        #[arg(long, short)]
        program: String,
        /// File suffix to match
        #[arg(long, default_value = DATA_FILE_SUFFIX)]
        suffix: String,
    },
    /// Restore a data file from the snapshot left by an interrupted save
    Recover {
        /// Canonical path of the data file
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_tracing(cli.log_dir.as_deref())?;

    let config = match &cli.config {
        Some(path) => OutputConfig::load(path)?,
        None => OutputConfig::default(),
    };

    match cli.command {
        Commands::Inspect { file } => cmd_inspect(&file, &config)?,
        Commands::Export {
            file,
            format,
            output,
        } => cmd_export(&file, &config, &format, output)?,
        Commands::List {
            dir,
            program,
            events,
        } => cmd_list(&dir, program.as_deref(), events)?,
        Commands::NextSubject {
            dir,
            program,
            suffix,
        } => cmd_next_subject(&dir, &program, &suffix)?,
        Commands::Recover { file } => cmd_recover(&file)?,
    }

    Ok(())
}

/// Diagnostics go to stderr so exported data on stdout stays clean.
fn init_tracing(log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = fmt::layer()
        .with_target(false)
        .compact()
        .with_writer(std::io::stderr);

    let Some(dir) = log_dir else {
        tracing_subscriber::registry()
            .with(filter)
            .with(stderr_layer)
            .init();
        return Ok(None);
    };

    std::fs::create_dir_all(dir)?;
    let appender = tracing_appender::rolling::never(dir, "xplog.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(fmt::layer().with_ansi(false).with_writer(writer))
        .init();
    Ok(Some(guard))
}

// ─── Command implementations ──────────────────────────────────────────────────

fn load(file: &Path, config: &OutputConfig) -> Result<DataFileContents> {
    if !file.exists() {
        anyhow::bail!("Data file not found: {}", file.display());
    }
    Ok(read_data_file(
        file,
        config.comment_char,
        &config.data_delimiter,
    )?)
}

fn cmd_inspect(file: &Path, config: &OutputConfig) -> Result<()> {
    let contents = load(file, config)?;
    println!("File: {}", file.display());
    println!("Rows: {}", contents.rows.len());
    println!();

    if !contents.experiment_info.is_empty() {
        println!("── Experiment Info ─────────────────────");
        for line in &contents.experiment_info {
            println!("  {}", line);
        }
        println!();
    }

    if !contents.subject_info.is_empty() {
        println!("── Subject Info ────────────────────────");
        for line in &contents.subject_info {
            println!("  {}", line);
        }
        let vars = contents.subject_variables();
        if !vars.is_empty() {
            let mut table = Table::new();
            table.load_preset(UTF8_FULL);
            table.set_header(["Variable", "Value"]);
            for (k, v) in &vars {
                table.add_row([k.as_str(), v.as_str()]);
            }
            println!("{}", table);
        }
        println!();
    }

    println!("── Variables ───────────────────────────");
    println!("  {}", contents.columns().join(", "));

    if let Some(last) = contents.rows.last() {
        println!();
        println!("── Last Row ────────────────────────────");
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(["Column", "Value"]);
        let columns = contents.columns();
        for (i, value) in last.iter().enumerate() {
            let name = columns.get(i).map(String::as_str).unwrap_or("-");
            table.add_row([name, value.as_str()]);
        }
        println!("{}", table);
    }

    let artifacts = xplog_core::find_recovery_artifacts(file)?;
    if !artifacts.is_empty() {
        println!();
        println!(
            "⚠ {} snapshot(s) from an interrupted save; run `xplog recover {}`",
            artifacts.len(),
            file.display()
        );
    }

    Ok(())
}

fn cmd_export(
    file: &Path,
    config: &OutputConfig,
    format: &str,
    output: Option<PathBuf>,
) -> Result<()> {
    let contents = load(file, config)?;
    let columns = contents.columns();

    let content = match format {
        "json" => {
            let rows: Vec<serde_json::Map<String, serde_json::Value>> = contents
                .rows
                .iter()
                .map(|row| {
                    columns
                        .iter()
                        .zip(row)
                        .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                        .collect()
                })
                .collect();
            serde_json::to_string_pretty(&rows)? + "\n"
        }
        "csv" => {
            let mut out = csv_line(&columns);
            for row in &contents.rows {
                out += &csv_line(row);
            }
            out
        }
        _ => anyhow::bail!("Unknown format: {}", format),
    };

    match output {
        Some(path) => {
            std::fs::write(&path, &content)?;
            println!("Exported {} rows to {}", contents.rows.len(), path.display());
        }
        None => print!("{}", content),
    }

    Ok(())
}

fn cmd_list(dir: &Path, program: Option<&str>, events: bool) -> Result<()> {
    let suffix = if events {
        EVENT_FILE_SUFFIX
    } else {
        DATA_FILE_SUFFIX
    };
    let files = storage::list_log_files(dir, program, suffix)?;

    if files.is_empty() {
        println!("No {} files found in '{}'", suffix, dir.display());
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(["File", "Subject", "Size", "Snapshots"]);
    for f in &files {
        let snapshots = xplog_core::find_recovery_artifacts(&f.path)?.len();
        table.add_row([
            f.name.clone(),
            f.subject.map(|s| s.to_string()).unwrap_or_else(|| "-".into()),
            format_size(f.size),
            snapshots.to_string(),
        ]);
    }

    println!("Files in: {}", dir.display());
    println!("{}", table);
    Ok(())
}

fn cmd_next_subject(dir: &Path, program: &str, suffix: &str) -> Result<()> {
    let next = xplog_core::next_session_ordinal(dir, program, suffix)?;
    println!("{}", next);
    Ok(())
}

fn cmd_recover(file: &Path) -> Result<()> {
    let used = xplog_core::recover(file)?;
    info!(file = %file.display(), "Recovered");
    println!("Restored {} from {}", file.display(), used.display());
    Ok(())
}

// ─── Utilities ────────────────────────────────────────────────────────────────

fn csv_line(fields: &[String]) -> String {
    let quoted: Vec<String> = fields.iter().map(|f| csv_field(f)).collect();
    quoted.join(",") + "\n"
}

/// Quote a field holding a comma, quote or line break (RFC 4180).
fn csv_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn format_size(bytes: u64) -> String {
    if bytes >= 1024 * 1024 {
        format!("{:.1} MiB", bytes as f64 / (1024.0 * 1024.0))
    } else if bytes >= 1024 {
        format!("{:.1} KiB", bytes as f64 / 1024.0)
    } else {
        format!("{} B", bytes)
    }
}
