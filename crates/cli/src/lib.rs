#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `cli` implements the thin command-line front-end for the treeflow
//! workspace: it resolves run parameters (source and target locations,
//! root rename, overwrite policy, metadata format, ledger journal) into
//! cursor and sink configuration, initializes the tracing subscriber,
//! and delegates the transfer itself to [`engine::Orchestrator`].
//!
//! The front-end currently wires the filesystem endpoints only. A
//! `repo:` location is recognised and rejected with a diagnostic, since
//! this build configures no repository transport; the repository cursor
//! and sink remain available as library building blocks.
//!
//! # Design
//!
//! [`run`] accepts an iterator of arguments together with handles for
//! standard output and error, so the whole surface is testable without a
//! child process. It never panics; failures surface as a non-zero exit
//! code with a one-line diagnostic.

use std::ffi::OsString;
use std::io::Write;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use engine::{Ledger, Orchestrator, TransferOptions};
use fs::{FsCursor, FsSink, FsSinkConfig};
use metadata::MetadataFormat;
use model::{OverwritePolicy, Result, TransferError, TransferState};

/// Moves a content tree between stores.
#[derive(Debug, Parser)]
#[command(name = "treeflow", version, about)]
struct Args {
    /// Source location: a directory path, optionally prefixed with `fs:`.
    source: String,

    /// Target location: a directory path, optionally prefixed with `fs:`.
    /// Created if it does not exist.
    target: String,

    /// Rename the written root item (display name and path segment).
    #[arg(long, value_name = "NAME")]
    root_name: Option<String>,

    /// What to do with artifacts that already exist at the target.
    #[arg(long, value_enum, default_value_t = OverwriteArg::Always)]
    overwrite: OverwriteArg,

    /// Surface format for written metadata files.
    #[arg(long, value_enum, default_value_t = FormatArg::Object)]
    format: FormatArg,

    /// Journal reference-fixup tasks to this JSON-lines file.
    #[arg(long, value_name = "PATH")]
    ledger: Option<PathBuf>,

    /// Print one line per processed item.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress the final summary.
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OverwriteArg {
    /// Overwrite existing artifacts.
    Always,
    /// Leave existing artifacts untouched.
    SkipExisting,
}

impl From<OverwriteArg> for OverwritePolicy {
    fn from(arg: OverwriteArg) -> Self {
        match arg {
            OverwriteArg::Always => Self::Always,
            OverwriteArg::SkipExisting => Self::SkipExisting,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FormatArg {
    /// JSON object metadata documents.
    Object,
    /// Minimal tag-based metadata documents.
    Tag,
}

impl From<FormatArg> for MetadataFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Object => Self::Object,
            FormatArg::Tag => Self::Tag,
        }
    }
}

enum Location {
    Directory(PathBuf),
    Repository(String),
}

fn parse_location(raw: &str) -> Location {
    if let Some(rest) = raw.strip_prefix("repo:") {
        Location::Repository(rest.to_string())
    } else if let Some(rest) = raw.strip_prefix("fs:") {
        Location::Directory(PathBuf::from(rest))
    } else {
        Location::Directory(PathBuf::from(raw))
    }
}

/// Parses `args`, runs the requested transfer, and returns the process
/// exit code: `0` on success, `1` when the run finished with item errors
/// or could not start, `2` on argument errors.
pub fn run<I, T, W, E>(args: I, stdout: &mut W, stderr: &mut E) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
    W: Write,
    E: Write,
{
    let args = match Args::try_parse_from(args) {
        Ok(args) => args,
        Err(error) => {
            let rendered = error.render().to_string();
            if error.use_stderr() {
                let _ = write!(stderr, "{rendered}");
                return 2;
            }
            let _ = write!(stdout, "{rendered}");
            return 0;
        }
    };
    init_tracing(args.verbose);

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            let _ = writeln!(stderr, "treeflow: cannot start the runtime: {error}");
            return 1;
        }
    };

    match runtime.block_on(execute(&args, stdout, stderr)) {
        Ok(0) => 0,
        Ok(_) => 1,
        Err(error) => {
            let _ = writeln!(stderr, "treeflow: {error}");
            1
        }
    }
}

async fn execute<W: Write, E: Write>(
    args: &Args,
    stdout: &mut W,
    stderr: &mut E,
) -> Result<u64> {
    let (source_dir, target_dir) =
        match (parse_location(&args.source), parse_location(&args.target)) {
            (Location::Directory(source), Location::Directory(target)) => (source, target),
            _ => {
                return Err(TransferError::InvalidState(
                    "repository locations need a transport, which this build does not \
                     configure; use directory paths"
                        .to_string(),
                ));
            }
        };
    let source_root_name = source_dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| {
            TransferError::InvalidState(format!(
                "source path '{}' has no final component",
                source_dir.display()
            ))
        })?;

    tokio::fs::create_dir_all(&target_dir)
        .await
        .map_err(|error| TransferError::io(target_dir.display().to_string(), error))?;

    let cursor = FsCursor::open(&source_dir).await?;
    let mut config = FsSinkConfig::new(&target_dir);
    config.root_name = args.root_name.clone();
    config.overwrite = args.overwrite.into();
    config.format = args.format.into();
    let sink = FsSink::open(config).await?;

    let ledger = match &args.ledger {
        Some(path) => Ledger::with_journal(path).await?,
        None => Ledger::in_memory(),
    };

    let verbose = args.verbose;
    let out = &mut *stdout;
    let err = &mut *stderr;
    let observer = move |state: &TransferState| {
        if verbose {
            let _ = writeln!(
                out,
                "{:>13}  {}",
                state.outcome.action.to_string(),
                state.outcome.writer_path
            );
        }
        if state.outcome.action.is_error() {
            let _ = writeln!(
                err,
                "treeflow: {} {}",
                state.outcome.action.to_string().to_lowercase(),
                state.outcome.writer_path
            );
            for message in &state.outcome.messages {
                let _ = writeln!(err, "treeflow:   {message}");
            }
        }
    };

    let mut orchestrator = Orchestrator::new(
        cursor,
        sink,
        observer,
        TransferOptions { source_root_name },
    )
    .with_ledger(ledger);
    let summary = orchestrator.run().await?;
    drop(orchestrator);

    if !args.quiet {
        let _ = writeln!(stdout, "{summary}");
    }
    Ok(summary.error_count)
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_captured(args: &[&str]) -> (i32, String, String) {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let code = run(args.iter().copied(), &mut stdout, &mut stderr);
        (
            code,
            String::from_utf8(stdout).expect("stdout utf8"),
            String::from_utf8(stderr).expect("stderr utf8"),
        )
    }

    #[test]
    fn help_goes_to_stdout_and_succeeds() {
        let (code, stdout, stderr) = run_captured(&["treeflow", "--help"]);
        assert_eq!(code, 0);
        assert!(stdout.contains("Usage:"));
        assert!(stderr.is_empty());
    }

    #[test]
    fn missing_operands_fail_with_usage() {
        let (code, _, stderr) = run_captured(&["treeflow"]);
        assert_eq!(code, 2);
        assert!(stderr.contains("Usage:"));
    }

    #[test]
    fn repository_locations_are_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let target = temp.path().join("out");
        let (code, _, stderr) = run_captured(&[
            "treeflow",
            "repo:https://example.test/Root",
            target.to_str().expect("utf8 path"),
        ]);
        assert_eq!(code, 1);
        assert!(stderr.contains("transport"));
    }

    #[test]
    fn copies_a_tree_and_prints_the_summary() {
        let temp = tempfile::tempdir().expect("tempdir");
        let source = temp.path().join("Root");
        std::fs::create_dir_all(source.join("F1")).expect("dirs");
        std::fs::write(source.join("F1/File1"), b"payload").expect("file");
        let target = temp.path().join("out");

        let (code, stdout, _) = run_captured(&[
            "treeflow",
            source.to_str().expect("utf8 path"),
            target.to_str().expect("utf8 path"),
        ]);
        assert_eq!(code, 0);
        assert!(stdout.contains("3 items"));
        assert!(stdout.contains("3 created"));
        assert_eq!(
            std::fs::read(target.join("Root/F1/File1")).expect("copied"),
            b"payload"
        );
    }

    #[test]
    fn verbose_mode_prints_one_line_per_item() {
        let temp = tempfile::tempdir().expect("tempdir");
        let source = temp.path().join("Root");
        std::fs::create_dir_all(&source).expect("dir");
        let target = temp.path().join("out");

        let (code, stdout, _) = run_captured(&[
            "treeflow",
            "--verbose",
            source.to_str().expect("utf8 path"),
            target.to_str().expect("utf8 path"),
        ]);
        assert_eq!(code, 0);
        assert!(stdout.contains("Created  /Root"));
    }

    #[test]
    fn root_rename_lands_on_disk() {
        let temp = tempfile::tempdir().expect("tempdir");
        let source = temp.path().join("Root");
        std::fs::create_dir_all(&source).expect("dir");
        let target = temp.path().join("out");

        let (code, _, _) = run_captured(&[
            "treeflow",
            "--root-name",
            "Renamed",
            source.to_str().expect("utf8 path"),
            target.to_str().expect("utf8 path"),
        ]);
        assert_eq!(code, 0);
        assert!(target.join("Renamed").is_dir());
    }
}
