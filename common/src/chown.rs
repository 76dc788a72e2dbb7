//! Recursive ownership remapping: a sequential pre-order walk that never follows symlinks

use std::collections::HashSet;
use std::os::unix::fs::{MetadataExt, OpenOptionsExt, PermissionsExt};

use anyhow::{Context, Result, anyhow};
use async_recursion::async_recursion;
use nix::fcntl::OFlag;
use nix::sys::stat::Mode;
use tracing::instrument;

use crate::remap::RemapTable;
use crate::report::{Change, Event, IdChange, Reporter};

#[derive(Copy, Clone, Debug, Default)]
pub struct Settings {
    pub dry_run: bool,
    pub verbose: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    Symlink,
    Other,
}

/// Ownership and mode of one entry as observed before it is changed
#[derive(Copy, Clone, Debug)]
pub struct Ownership {
    pub uid: u32,
    pub gid: u32,
    pub mode: u32,
    pub kind: EntryKind,
    pub dev: u64,
    pub ino: u64,
    pub nlink: u64,
}

impl Ownership {
    pub fn from_metadata(metadata: &std::fs::Metadata) -> Self {
        let file_type = metadata.file_type();
        let kind = if file_type.is_symlink() {
            EntryKind::Symlink
        } else if file_type.is_dir() {
            EntryKind::Dir
        } else if file_type.is_file() {
            EntryKind::File
        } else {
            EntryKind::Other
        };
        Self {
            uid: metadata.uid(),
            gid: metadata.gid(),
            mode: metadata.mode() & 0o7777,
            kind,
            dev: metadata.dev(),
            ino: metadata.ino(),
            nlink: metadata.nlink(),
        }
    }

    /// Regular file carrying the setuid or setgid bit
    pub fn is_setid_file(&self) -> bool {
        self.kind == EntryKind::File
            && Mode::from_bits_truncate(self.mode).intersects(Mode::S_ISUID | Mode::S_ISGID)
    }

    fn is_same_inode(&self, metadata: &std::fs::Metadata) -> bool {
        self.dev == metadata.dev() && self.ino == metadata.ino()
    }
}

/// Inodes already handled in one run.
///
/// Shared by all roots of a run so that a hard-linked file, a root given twice or a root nested
/// inside another is remapped once. A second visit would look up the id written by the first.
#[derive(Debug, Default)]
pub struct Visited {
    inodes: HashSet<(u64, u64)>,
}

impl Visited {
    /// Record the entry, returns false if it was recorded before.
    ///
    /// Only directories and entries with more than one link can be reached twice.
    pub fn first_visit(&mut self, ownership: &Ownership) -> bool {
        if ownership.kind != EntryKind::Dir && ownership.nlink < 2 {
            return true;
        }
        self.inodes.insert((ownership.dev, ownership.ino))
    }
}

/// Work out the new owner of an entry. Returns `None` when neither id is remapped.
pub fn plan_change(
    path: &std::path::Path,
    ownership: &Ownership,
    table: &RemapTable,
) -> Option<Change> {
    let uid = IdChange {
        old: ownership.uid,
        new: table.uid().get(ownership.uid),
    };
    let gid = IdChange {
        old: ownership.gid,
        new: table.gid().get(ownership.gid),
    };
    if uid.new.is_none() && gid.new.is_none() {
        return None;
    }
    Some(Change {
        path: path.to_owned(),
        uid,
        gid,
        mode: ownership.mode,
    })
}

fn open_no_follow(path: &std::path::Path) -> std::io::Result<std::fs::File> {
    // O_NONBLOCK keeps a fifo that replaced the entry from blocking the walk
    std::fs::OpenOptions::new()
        .read(true)
        .custom_flags((OFlag::O_NOFOLLOW | OFlag::O_NONBLOCK | OFlag::O_NOCTTY).bits())
        .open(path)
}

/// Change owner and restore mode through a descriptor pinned to the inode that was inspected.
fn apply_through_fd(
    file: &std::fs::File,
    change: &Change,
    ownership: &Ownership,
    uid: u32,
    gid: u32,
) -> Result<()> {
    let metadata = file
        .metadata()
        .with_context(|| format!("failed reading metadata from {:?}", &change.path))?;
    if !ownership.is_same_inode(&metadata) {
        return Err(anyhow!("{:?} was replaced during the walk", &change.path));
    }
    tracing::debug!("setting uid and gid");
    std::os::unix::fs::fchown(file, Some(uid), Some(gid)).with_context(|| {
        format!(
            "cannot set {:?} owner to {} and group id to {}",
            &change.path, uid, gid
        )
    })?;
    // chown may clear setuid/setgid, put back exactly what was there before
    tracing::debug!("restoring mode {:o}", ownership.mode);
    file.set_permissions(std::fs::Permissions::from_mode(ownership.mode))
        .with_context(|| {
            format!(
                "cannot restore {:?} permissions to {:o}",
                &change.path, ownership.mode
            )
        })?;
    Ok(())
}

/// Change owner by path, for entries that can't be opened (special files, or no read access).
fn apply_by_path(change: &Change, ownership: &Ownership, uid: u32, gid: u32) -> Result<()> {
    tracing::debug!("setting uid and gid by path");
    std::os::unix::fs::lchown(&change.path, Some(uid), Some(gid)).with_context(|| {
        format!(
            "cannot set {:?} owner to {} and group id to {}",
            &change.path, uid, gid
        )
    })?;
    // we don't set permissions for symlinks, chmod would follow the link
    if ownership.kind == EntryKind::Symlink {
        return Ok(());
    }
    let metadata = std::fs::symlink_metadata(&change.path)
        .with_context(|| format!("failed reading metadata from {:?}", &change.path))?;
    if metadata.file_type().is_symlink() || !ownership.is_same_inode(&metadata) {
        return Err(anyhow!(
            "{:?} was replaced during the walk, not restoring mode {:o}",
            &change.path,
            ownership.mode
        ));
    }
    tracing::debug!("restoring mode {:o}", ownership.mode);
    std::fs::set_permissions(&change.path, std::fs::Permissions::from_mode(ownership.mode))
        .with_context(|| {
            format!(
                "cannot restore {:?} permissions to {:o}",
                &change.path, ownership.mode
            )
        })?;
    Ok(())
}

fn apply_change_blocking(change: &Change, ownership: &Ownership) -> Result<()> {
    let uid = change.uid.resolved();
    let gid = change.gid.resolved();
    match ownership.kind {
        EntryKind::File | EntryKind::Dir => match open_no_follow(&change.path) {
            Ok(file) => apply_through_fd(&file, change, ownership, uid, gid),
            Err(error) if error.kind() == std::io::ErrorKind::PermissionDenied => {
                tracing::debug!("cannot open {:?}: {}", &change.path, &error);
                apply_by_path(change, ownership, uid, gid)
            }
            Err(error) => {
                Err(error).with_context(|| format!("cannot open {:?}", &change.path))
            }
        },
        // opening a device or a fifo may have side effects
        EntryKind::Symlink | EntryKind::Other => apply_by_path(change, ownership, uid, gid),
    }
}

#[instrument(skip(ownership))]
async fn apply_change(change: &Change, ownership: &Ownership) -> Result<()> {
    let change = change.clone();
    let ownership = *ownership;
    tokio::task::spawn_blocking(move || apply_change_blocking(&change, &ownership)).await?
}

/// Remap a single entry without descending into it.
async fn remap_entry(
    path: &std::path::Path,
    ownership: &Ownership,
    table: &RemapTable,
    settings: &Settings,
    reporter: &dyn Reporter,
) -> Summary {
    let mut summary = Summary {
        entries_visited: 1,
        ..Default::default()
    };
    let change = match plan_change(path, ownership, table) {
        Some(change) => change,
        None => {
            tracing::trace!("no remap for uid {} gid {}", ownership.uid, ownership.gid);
            summary.entries_unchanged += 1;
            return summary;
        }
    };
    if ownership.is_setid_file() {
        summary.setuid_warnings += 1;
        reporter.report(Event::SetuidWarning(change.clone()));
    }
    if settings.verbose {
        reporter.report(Event::Changed(change.clone()));
    }
    if settings.dry_run {
        tracing::debug!("dry-run, not changing {:?}", path);
        summary.entries_remapped += 1;
        return summary;
    }
    match apply_change(&change, ownership).await {
        Ok(()) => summary.entries_remapped += 1,
        Err(error) => {
            summary.errors += 1;
            reporter.report(Event::EntryError {
                path: path.to_owned(),
                error,
            });
        }
    }
    summary
}

fn entry_error(reporter: &dyn Reporter, path: &std::path::Path, error: anyhow::Error) -> Summary {
    reporter.report(Event::EntryError {
        path: path.to_owned(),
        error,
    });
    Summary {
        errors: 1,
        ..Default::default()
    }
}

/// Remap the ownership of `path` and everything below it.
///
/// The walk is pre-order and never follows symlinks. Entries already in `visited` are skipped
/// together with everything below them. Failures on individual entries are reported through
/// `reporter` and counted in the returned summary, they never stop the walk.
#[instrument(skip(table, visited, reporter))]
#[async_recursion]
pub async fn chown(
    path: &std::path::Path,
    table: &RemapTable,
    settings: &Settings,
    visited: &mut Visited,
    reporter: &dyn Reporter,
) -> Summary {
    let metadata = match tokio::fs::symlink_metadata(path)
        .await
        .with_context(|| format!("failed reading metadata from {:?}", &path))
    {
        Ok(metadata) => metadata,
        Err(error) => return entry_error(reporter, path, error),
    };
    let ownership = Ownership::from_metadata(&metadata);
    if !visited.first_visit(&ownership) {
        tracing::debug!("{:?} was already visited, skipping", path);
        return Summary {
            entries_already_visited: 1,
            ..Default::default()
        };
    }
    let mut summary = remap_entry(path, &ownership, table, settings, reporter).await;
    if ownership.kind != EntryKind::Dir {
        return summary;
    }
    let mut entries = match tokio::fs::read_dir(path)
        .await
        .with_context(|| format!("cannot open directory {:?} for reading", &path))
    {
        Ok(entries) => entries,
        Err(error) => return summary + entry_error(reporter, path, error),
    };
    loop {
        match entries
            .next_entry()
            .await
            .with_context(|| format!("failed traversing directory {:?}", &path))
        {
            Ok(Some(entry)) => {
                let entry_path = entry.path();
                summary = summary + chown(&entry_path, table, settings, visited, reporter).await;
            }
            Ok(None) => break,
            Err(error) => {
                summary = summary + entry_error(reporter, path, error);
                break;
            }
        }
    }
    summary
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub entries_visited: usize,
    /// entries whose owner was changed, or would be in dry-run mode
    pub entries_remapped: usize,
    pub entries_unchanged: usize,
    /// hard links, repeated or nested roots reached a second time
    pub entries_already_visited: usize,
    pub setuid_warnings: usize,
    pub errors: usize,
}

impl std::ops::Add for Summary {
    type Output = Self;
    fn add(self, other: Self) -> Self {
        Self {
            entries_visited: self.entries_visited + other.entries_visited,
            entries_remapped: self.entries_remapped + other.entries_remapped,
            entries_unchanged: self.entries_unchanged + other.entries_unchanged,
            entries_already_visited: self.entries_already_visited
                + other.entries_already_visited,
            setuid_warnings: self.setuid_warnings + other.setuid_warnings,
            errors: self.errors + other.errors,
        }
    }
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "entries visited: {}\n\
            entries remapped: {}\n\
            entries unchanged: {}\n\
            entries already visited: {}\n\
            setuid/setgid warnings: {}\n\
            errors: {}\n",
            self.entries_visited,
            self.entries_remapped,
            self.entries_unchanged,
            self.entries_already_visited,
            self.setuid_warnings,
            self.errors,
        )
    }
}
