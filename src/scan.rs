use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use std::sync::mpsc;

use crate::error::{IndexError, Result};

const ARCHIVE_EXTENSIONS: [&str; 2] = ["jar", "war"];

pub fn is_archive_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| ARCHIVE_EXTENSIONS.iter().any(|x| e.eq_ignore_ascii_case(x)))
}

/// Finds `.jar`/`.war` files under `root`, sorted so runs process files in a
/// stable order. With `recursive == false` only the root's direct children are
/// considered. Symlinks are followed; the walker reports link loops as errors,
/// which are logged and skipped.
pub fn discover_archives(root: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    validate_root(root)?;

    let (tx, rx) = mpsc::channel();

    let walker = WalkBuilder::new(root)
        .hidden(false)
        .ignore(false)
        .parents(false)
        .git_ignore(false)
        .git_global(false)
        .git_exclude(false)
        .follow_links(true)
        .max_depth(if recursive { None } else { Some(1) })
        .build_parallel();

    walker.run(|| {
        let tx = tx.clone();
        Box::new(move |entry| {
            match entry {
                Ok(entry) => {
                    let is_file = entry.file_type().is_some_and(|t| t.is_file());
                    if is_file && is_archive_file(entry.path()) {
                        let _ = tx.send(entry.into_path());
                    }
                }
                Err(err) => log::warn!("skipping unreadable path during scan: {err}"),
            }
            ignore::WalkState::Continue
        })
    });

    drop(tx);
    let mut found: Vec<PathBuf> = rx.iter().collect();
    found.sort();
    found.dedup();
    Ok(found)
}

pub fn validate_root(root: &Path) -> Result<()> {
    if !root.exists() {
        return Err(IndexError::Config(format!(
            "index root does not exist: {}",
            root.display()
        )));
    }
    if !root.is_dir() {
        return Err(IndexError::Config(format!(
            "index root is not a directory: {}",
            root.display()
        )));
    }
    Ok(())
}
