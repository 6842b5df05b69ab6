//! Depth-first expansion of archives nested inside archives.
//!
//! A WAR's `WEB-INF/lib/*.jar` (or a Spring Boot `BOOT-INF/lib/*.jar`) is read
//! into memory and opened as its own [`ArchiveHandle`]. Traversal uses an
//! explicit stack of frames instead of recursion, so stack usage stays flat no
//! matter how deep an adversarial archive nests. Each frame owns its handle and
//! is dropped as soon as its entries are exhausted.

use std::fmt;
use std::path::Path;
use zip::read::ZipFile;

use crate::archive::ArchiveHandle;
use crate::error::Result;
use crate::extract;

pub const LOGICAL_SEPARATOR: &str = "->";

/// Frames allowed on the stack, the outermost file included.
pub const MAX_NESTING_DEPTH: usize = 16;

/// Chain of names from the outermost file down to a (possibly nested) archive.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LogicalPath {
    segments: Vec<String>,
}

impl LogicalPath {
    pub fn root(name: impl Into<String>) -> Self {
        Self {
            segments: vec![name.into()],
        }
    }

    /// Root path for a file on disk. The segment is the whole physical path, so
    /// two archives never share a logical path.
    pub fn for_file(physical_path: &Path) -> Self {
        Self::root(physical_path.to_string_lossy().into_owned())
    }

    pub fn child(&self, entry_name: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(entry_name.to_string());
        Self { segments }
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }
}

impl fmt::Display for LogicalPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join(LOGICAL_SEPARATOR))
    }
}

struct Frame {
    handle: ArchiveHandle,
    logical_path: LogicalPath,
    cursor: usize,
}

/// A non-archive entry reached during expansion. Borrows the archive that
/// contains it, so the entry's bytes can be opened until the next call to
/// [`NestedEntries::next_entry`].
pub struct ResolvedEntry<'a> {
    pub logical_path: &'a LogicalPath,
    pub name: String,
    pub is_class: bool,
    handle: &'a mut ArchiveHandle,
}

impl ResolvedEntry<'_> {
    pub fn open(&mut self) -> Result<ZipFile<'_>> {
        self.handle.read_entry(&self.name)
    }

    pub fn class_name(&self) -> Option<String> {
        if !self.is_class {
            return None;
        }
        extract::class_name(&self.name)
    }
}

pub struct NestedEntries {
    stack: Vec<Frame>,
    max_depth: usize,
    skipped_archives: usize,
}

pub fn expand(archive: ArchiveHandle, root: LogicalPath) -> NestedEntries {
    NestedEntries {
        stack: vec![Frame {
            handle: archive,
            logical_path: root,
            cursor: 0,
        }],
        max_depth: MAX_NESTING_DEPTH,
        skipped_archives: 0,
    }
}

pub fn expand_file(physical_path: &Path) -> Result<NestedEntries> {
    let handle = ArchiveHandle::open(physical_path)?;
    Ok(expand(handle, LogicalPath::for_file(physical_path)))
}

impl NestedEntries {
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth.max(1);
        self
    }

    /// Nested entries that looked like archives but were not expanded.
    pub fn skipped_archives(&self) -> usize {
        self.skipped_archives
    }

    /// Advances to the next non-archive entry, descending into nested archives
    /// on the way. Errors are only returned for the outermost archive; a broken
    /// nested archive is logged and skipped.
    pub fn next_entry(&mut self) -> Option<Result<ResolvedEntry<'_>>> {
        let (name, is_class) = loop {
            let depth = self.stack.len();
            let frame = self.stack.last_mut()?;
            if frame.cursor >= frame.handle.len() {
                self.stack.pop();
                continue;
            }

            let index = frame.cursor;
            frame.cursor += 1;
            let entry = match frame.handle.entry_at(index) {
                Ok(entry) => entry,
                Err(err) if depth == 1 => {
                    self.stack.clear();
                    return Some(Err(err));
                }
                Err(err) => {
                    log::warn!("abandoning nested archive {}: {err}", frame.handle.label());
                    self.skipped_archives += 1;
                    self.stack.pop();
                    continue;
                }
            };

            if entry.is_dir {
                continue;
            }
            if entry.is_archive() {
                self.descend(&entry.name);
                continue;
            }
            let is_class = entry.is_class();
            break (entry.name, is_class);
        };

        let frame = self.stack.last_mut()?;
        Some(Ok(ResolvedEntry {
            logical_path: &frame.logical_path,
            name,
            is_class,
            handle: &mut frame.handle,
        }))
    }

    fn descend(&mut self, entry_name: &str) {
        let depth = self.stack.len();
        let Some(parent) = self.stack.last_mut() else {
            return;
        };
        let logical_path = parent.logical_path.child(entry_name);

        if depth >= self.max_depth {
            log::warn!(
                "skipping nested archive {logical_path}: nesting exceeds {} levels",
                self.max_depth
            );
            self.skipped_archives += 1;
            return;
        }

        let opened = parent
            .handle
            .read_entry_bytes(entry_name)
            .and_then(|bytes| ArchiveHandle::from_bytes(logical_path.to_string(), bytes));
        match opened {
            Ok(handle) => {
                log::debug!("expanding nested archive {logical_path}");
                self.stack.push(Frame {
                    handle,
                    logical_path,
                    cursor: 0,
                });
            }
            Err(err) => {
                log::warn!("skipping nested archive {logical_path}: {err}");
                self.skipped_archives += 1;
            }
        }
    }
}
