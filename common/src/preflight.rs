//! Checks run after parsing and before anything on disk is touched.

use std::path::{Path, PathBuf};

use crate::remap::RemapTable;

#[derive(Debug, thiserror::Error)]
pub enum PreflightError {
    #[error("no paths to remap")]
    NoPaths,
    #[error("nothing to do: no uid or gid remaps given")]
    NothingToDo,
    #[error("path not found or not a directory: {0:?}")]
    NotADirectory(PathBuf),
}

fn is_dir_no_follow(path: &Path) -> bool {
    // the walk never follows symlinks, a link to a directory would only get its own owner changed
    std::fs::symlink_metadata(path)
        .map(|metadata| metadata.is_dir())
        .unwrap_or(false)
}

/// Fail unless there is at least one path, at least one remap, and every path is a directory.
pub fn check(paths: &[PathBuf], table: &RemapTable) -> Result<(), PreflightError> {
    if paths.is_empty() {
        return Err(PreflightError::NoPaths);
    }
    if table.is_empty() {
        return Err(PreflightError::NothingToDo);
    }
    if let Some(path) = paths.iter().find(|path| !is_dir_no_follow(path)) {
        return Err(PreflightError::NotADirectory(path.clone()));
    }
    tracing::debug!(
        "preflight ok: {} path(s), {} uid remap(s), {} gid remap(s)",
        paths.len(),
        table.uid().len(),
        table.gid().len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::switch::IdKind;

    fn table() -> RemapTable {
        let mut table = RemapTable::default();
        table.insert(IdKind::Uid, 100, 150).unwrap();
        table
    }

    #[test]
    fn passes_with_paths_and_remaps() {
        let dir = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        check(
            &[dir.path().to_owned(), other.path().to_owned()],
            &table(),
        )
        .unwrap();
    }

    #[test]
    fn empty_table_is_nothing_to_do() {
        let dir = tempfile::tempdir().unwrap();
        let error = check(&[dir.path().to_owned()], &RemapTable::default()).unwrap_err();
        assert!(matches!(error, PreflightError::NothingToDo));
        assert!(error.to_string().contains("nothing to do"));
    }

    #[test]
    fn empty_path_list_is_no_paths() {
        let error = check(&[], &table()).unwrap_err();
        assert!(matches!(error, PreflightError::NoPaths));
        assert!(error.to_string().contains("no paths"));
    }

    #[test]
    fn gid_only_table_is_enough() {
        let dir = tempfile::tempdir().unwrap();
        let mut table = RemapTable::default();
        table.insert(IdKind::Gid, 5, 6).unwrap();
        check(&[dir.path().to_owned()], &table).unwrap();
    }

    #[test]
    fn every_path_must_be_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("file.txt");
        std::fs::write(&file, "x").unwrap();
        let missing = dir.path().join("missing");
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(dir.path(), &link).unwrap();
        for bad in [&file, &missing, &link] {
            match check(&[dir.path().to_owned(), bad.clone()], &table()) {
                Err(PreflightError::NotADirectory(path)) => assert_eq!(&path, bad),
                other => panic!("expected not a directory for {:?}, got {:?}", bad, other),
            }
        }
    }
}
