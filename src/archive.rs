//! Random-access reader over a single JAR/WAR container.
//!
//! Files on disk are memory-mapped; nested archives are opened from the bytes
//! of their parent entry. Either way the handle owns its backing storage, so
//! dropping it releases the mapping or buffer.

use memmap2::Mmap;
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::Path;
use zip::ZipArchive;
use zip::read::ZipFile;
use zip::result::ZipError;

use crate::error::{IndexError, Result};

/// Upper bound on the buffer reserved up front from an entry's declared size.
/// The header is untrusted; reads beyond this grow the buffer as bytes arrive.
pub const MAX_PREALLOCATION: usize = 1 << 20;

enum ArchiveBytes {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl AsRef<[u8]> for ArchiveBytes {
    fn as_ref(&self) -> &[u8] {
        match self {
            ArchiveBytes::Mapped(m) => &m[..],
            ArchiveBytes::Owned(v) => v.as_slice(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Class,
    Archive,
    Other,
}

impl EntryKind {
    pub fn classify(name: &str) -> Self {
        if name.ends_with('/') {
            return EntryKind::Other;
        }
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".class") {
            EntryKind::Class
        } else if lower.ends_with(".jar") || lower.ends_with(".war") {
            EntryKind::Archive
        } else {
            EntryKind::Other
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub is_dir: bool,
    pub kind: EntryKind,
}

impl Entry {
    pub fn is_archive(&self) -> bool {
        !self.is_dir && self.kind == EntryKind::Archive
    }

    pub fn is_class(&self) -> bool {
        !self.is_dir && self.kind == EntryKind::Class
    }
}

pub struct ArchiveHandle {
    label: String,
    zip: ZipArchive<Cursor<ArchiveBytes>>,
}

impl std::fmt::Debug for ArchiveHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveHandle")
            .field("label", &self.label)
            .field("entries", &self.zip.len())
            .finish()
    }
}

impl ArchiveHandle {
    pub fn open(physical_path: &Path) -> Result<Self> {
        let file = File::open(physical_path).map_err(|e| IndexError::io(physical_path, e))?;
        // SAFETY: The file is opened read-only and the mapping is owned by the handle,
        // which never hands out references that outlive it.
        let mmap = unsafe { Mmap::map(&file) }.map_err(|e| IndexError::io(physical_path, e))?;
        let label = physical_path.display().to_string();
        Self::from_source(label, ArchiveBytes::Mapped(mmap))
    }

    pub fn from_bytes(label: impl Into<String>, bytes: Vec<u8>) -> Result<Self> {
        Self::from_source(label.into(), ArchiveBytes::Owned(bytes))
    }

    fn from_source(label: String, bytes: ArchiveBytes) -> Result<Self> {
        match ZipArchive::new(Cursor::new(bytes)) {
            Ok(zip) => Ok(Self { label, zip }),
            Err(source) => Err(IndexError::CorruptArchive {
                archive: label,
                source,
            }),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn len(&self) -> usize {
        self.zip.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zip.len() == 0
    }

    /// Entry metadata at central-directory position `index`, without decompressing it.
    pub fn entry_at(&mut self, index: usize) -> Result<Entry> {
        let file = self.zip.by_index_raw(index).map_err(|source| IndexError::CorruptArchive {
            archive: self.label.clone(),
            source,
        })?;
        let name = file.name().to_string();
        let is_dir = file.is_dir();
        let kind = EntryKind::classify(&name);
        Ok(Entry { name, is_dir, kind })
    }

    /// Lazily lists entries in central-directory order. Calling it again restarts
    /// from the first entry.
    pub fn list_entries(&mut self) -> Entries<'_> {
        Entries {
            handle: self,
            next: 0,
        }
    }

    pub fn read_entry(&mut self, entry_name: &str) -> Result<ZipFile<'_>> {
        let label = &self.label;
        self.zip.by_name(entry_name).map_err(|source| match source {
            ZipError::FileNotFound => IndexError::EntryNotFound {
                archive: label.clone(),
                entry: entry_name.to_string(),
            },
            source => IndexError::CorruptArchive {
                archive: label.clone(),
                source,
            },
        })
    }

    pub fn read_entry_bytes(&mut self, entry_name: &str) -> Result<Vec<u8>> {
        let label = self.label.clone();
        let mut file = self.read_entry(entry_name)?;
        let declared = usize::try_from(file.size()).unwrap_or(usize::MAX);
        let mut buf = Vec::with_capacity(declared.min(MAX_PREALLOCATION));
        file.read_to_end(&mut buf)
            .map_err(|e| IndexError::CorruptArchive {
                archive: format!("{label}->{entry_name}"),
                source: ZipError::Io(e),
            })?;
        Ok(buf)
    }
}

pub struct Entries<'a> {
    handle: &'a mut ArchiveHandle,
    next: usize,
}

impl Iterator for Entries<'_> {
    type Item = Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.handle.len() {
            return None;
        }
        let index = self.next;
        self.next += 1;
        Some(self.handle.entry_at(index))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.handle.len().saturating_sub(self.next);
        (remaining, Some(remaining))
    }
}
