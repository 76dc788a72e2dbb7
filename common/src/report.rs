//! Operator-facing output
//!
//! The walk and the parser never print. They hand [`Event`]s to a [`Reporter`] and the caller
//! decides where they go. [`ConsoleReporter`] sends change lines to stdout and everything else to
//! stderr.

use std::io::Write;
use std::path::PathBuf;

use crate::args::ParseWarning;

/// Old id and the id it is being remapped to, if any
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct IdChange {
    pub old: u32,
    pub new: Option<u32>,
}

impl IdChange {
    /// Id the entry ends up with; the unchanged side keeps its original id
    pub fn resolved(&self) -> u32 {
        self.new.unwrap_or(self.old)
    }
}

impl std::fmt::Display for IdChange {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self.new {
            Some(new) => write!(f, "{}->{}", self.old, new),
            None => write!(f, "({})", self.old),
        }
    }
}

/// A pending ownership change for one entry
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Change {
    pub path: PathBuf,
    pub uid: IdChange,
    pub gid: IdChange,
    /// permission bits observed before the change, including setuid/setgid/sticky
    pub mode: u32,
}

#[derive(Debug)]
pub enum Event {
    /// an entry is (or in dry-run mode would be) remapped
    Changed(Change),
    /// a setuid/setgid regular file is about to change owner
    SetuidWarning(Change),
    /// a single entry could not be inspected or changed, the walk went on
    EntryError {
        path: PathBuf,
        error: anyhow::Error,
    },
    ArgFileSkipped(PathBuf),
}

impl From<ParseWarning> for Event {
    fn from(warning: ParseWarning) -> Self {
        match warning {
            ParseWarning::ArgFileSkipped(path) => Event::ArgFileSkipped(path),
        }
    }
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Event::Changed(change) => write!(
                f,
                "{}\t{}\t{}",
                change.uid,
                change.gid,
                change.path.display()
            ),
            Event::SetuidWarning(change) => write!(
                f,
                "changing owner of setuid/setgid file {:?}: uid {} gid {} mode {:04o}",
                change.path, change.uid, change.gid, change.mode
            ),
            Event::EntryError { path, error } => write!(f, "{:?}: {:#}", path, error),
            Event::ArgFileSkipped(path) => {
                write!(f, "{}", ParseWarning::ArgFileSkipped(path.clone()))
            }
        }
    }
}

/// Sink for everything the operator should see
pub trait Reporter: Send + Sync {
    fn report(&self, event: Event);
}

/// Writes change lines to stdout and warnings to stderr
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn report(&self, event: Event) {
        // output errors (e.g. a closed pipe) must not abort the walk
        let _ = match &event {
            Event::Changed(_) => writeln!(std::io::stdout().lock(), "{}", event),
            _ => writeln!(std::io::stderr().lock(), "WARN: {}", event),
        };
    }
}
