//! Raw argument handling: splitting switches from paths and expanding switch files
//!
//! Switches must come before the paths. The first argument that does not start with `-`, or a
//! literal `--`, ends the switch list; everything from there on is a path, even when it looks
//! like a switch. The `--` marker itself is dropped.
//!
//! Switch files (`-f<PATH>`) hold one switch per line and may include other switch files. They
//! are spliced in place, depth-first. A file already read during the same parse is skipped with
//! a warning, so include cycles and diamonds are harmless.
//!
//! ```
//! use common::args::{parse_switches, partition};
//!
//! let (switches, paths) = partition(["-u1000:2000", "--dry-run", "--", "-odd-dir"]);
//! assert_eq!(paths, vec![std::path::PathBuf::from("-odd-dir")]);
//! let parsed = parse_switches(&switches).unwrap();
//! assert_eq!(parsed.table.uid().get(1000), Some(2000));
//! assert!(parsed.flags.dry_run);
//! ```

use std::collections::HashSet;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use crate::remap::{ParseFlags, RemapTable, RemapTableBuilder};
use crate::switch::{IdKind, Switch};

/// Everything that can make a switch list unusable. Any of these aborts the whole parse.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("unrecognized argument: {0:?}")]
    Syntax(String),
    #[error("negative or out of range {kind}: {value:?}")]
    IdOutOfRange { kind: IdKind, value: String },
    #[error("won't remap root {}", .0.owner_name())]
    RootRemap(IdKind),
    #[error("duplicate remap {kind}: {from}")]
    DuplicateRemap { kind: IdKind, from: u32 },
    #[error("missing path to -f argument")]
    MissingArgFilePath,
    #[error("argfile not found: {0:?}")]
    ArgFileNotFound(PathBuf),
    #[error("failed reading argfile {path:?}")]
    ArgFileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("argfile {path:?} line {line}")]
    InArgFile {
        path: PathBuf,
        line: usize,
        #[source]
        source: Box<ParseError>,
    },
}

impl ParseError {
    /// The error that caused the failure, looking through any switch file locations
    pub fn innermost(&self) -> &ParseError {
        match self {
            ParseError::InArgFile { source, .. } => source.innermost(),
            other => other,
        }
    }
}

/// Non-fatal findings of a parse, left for the caller to report
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParseWarning {
    ArgFileSkipped(PathBuf),
}

impl std::fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            ParseWarning::ArgFileSkipped(path) => {
                write!(f, "skipping already-parsed argfile: {:?}", path)
            }
        }
    }
}

/// Result of a successful parse
#[derive(Debug)]
pub struct Parsed {
    pub table: RemapTable,
    pub flags: ParseFlags,
    pub warnings: Vec<ParseWarning>,
}

/// Split raw arguments into (switches, paths).
pub fn partition<I, S>(args: I) -> (Vec<OsString>, Vec<PathBuf>)
where
    I: IntoIterator<Item = S>,
    S: Into<OsString>,
{
    let mut switches = vec![];
    let mut paths = vec![];
    let mut in_switches = true;
    for arg in args {
        let arg = arg.into();
        if in_switches {
            if arg == "--" {
                in_switches = false;
                continue;
            }
            if arg.as_encoded_bytes().first() == Some(&b'-') {
                switches.push(arg);
                continue;
            }
            in_switches = false;
        }
        paths.push(PathBuf::from(arg));
    }
    (switches, paths)
}

/// Build the remap table and flags from a switch list.
///
/// Each call starts from an empty table and its own set of visited switch files.
pub fn parse_switches<S: AsRef<OsStr>>(switches: &[S]) -> Result<Parsed, ParseError> {
    let mut parser = ArgParser::default();
    let mut lines = Vec::with_capacity(switches.len());
    for switch in switches {
        let switch = switch.as_ref();
        let line = switch
            .to_str()
            .ok_or_else(|| ParseError::Syntax(switch.to_string_lossy().into_owned()))?;
        lines.push(line);
    }
    parser.parse_buffer(&lines.join("\n"))?;
    let (table, flags) = parser.builder.build();
    Ok(Parsed {
        table,
        flags,
        warnings: parser.warnings,
    })
}

#[derive(Debug, Default)]
struct ArgParser {
    builder: RemapTableBuilder,
    visited: HashSet<PathBuf>,
    warnings: Vec<ParseWarning>,
}

fn is_blank(line: &str) -> bool {
    line.bytes().all(|b| b.is_ascii_whitespace())
}

impl ArgParser {
    fn parse_buffer(&mut self, buffer: &str) -> Result<(), ParseError> {
        for line in buffer.lines().filter(|line| !is_blank(line)) {
            self.parse_line(line)?;
        }
        Ok(())
    }

    fn parse_line(&mut self, line: &str) -> Result<(), ParseError> {
        match Switch::parse(line)? {
            Switch::UidRemap { from, to } => self.builder.remap(IdKind::Uid, from, to),
            Switch::GidRemap { from, to } => self.builder.remap(IdKind::Gid, from, to),
            Switch::IncludeFile(path) => self.parse_argfile(&path),
            Switch::DryRun => {
                self.builder.set_dry_run();
                Ok(())
            }
            Switch::Verbose => {
                self.builder.set_verbose();
                Ok(())
            }
        }
    }

    fn parse_argfile(&mut self, path: &Path) -> Result<(), ParseError> {
        if path.as_os_str().is_empty() {
            return Err(ParseError::MissingArgFilePath);
        }
        let is_file = std::fs::metadata(path)
            .map(|metadata| metadata.is_file())
            .unwrap_or(false);
        if !is_file {
            return Err(ParseError::ArgFileNotFound(path.to_owned()));
        }
        let canonical = std::fs::canonicalize(path)
            .map_err(|_| ParseError::ArgFileNotFound(path.to_owned()))?;
        if !self.visited.insert(canonical) {
            tracing::debug!("argfile {:?} was already parsed, skipping", path);
            self.warnings.push(ParseWarning::ArgFileSkipped(path.to_owned()));
            return Ok(());
        }
        tracing::debug!("parsing argfile {:?}", path);
        let content = std::fs::read_to_string(path).map_err(|source| ParseError::ArgFileRead {
            path: path.to_owned(),
            source,
        })?;
        for (line_num, line) in content.lines().enumerate() {
            if is_blank(line) {
                continue;
            }
            self.parse_line(line).map_err(|error| ParseError::InArgFile {
                path: path.to_owned(),
                line: line_num + 1, // 1-based for error messages
                source: Box::new(error),
            })?;
        }
        Ok(())
    }
}
