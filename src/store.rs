//! Persistent class index.
//!
//! Uses LMDB (via heed) in single-file mode. Three named databases:
//!
//! - `class_index`: lowercase class name → JSON list of [`ClassRecord`]s, so
//!   case-insensitive prefix queries are a plain key range scan
//! - `archive_classes`: physical archive path → JSON list of the `class_index`
//!   keys it contributed, for targeted removal on re-index
//! - `archive_fingerprints`: physical archive path → JSON [`Fingerprint`]
//!
//! Every archive update runs in one write transaction. LMDB readers work on a
//! snapshot, so a query running next to a commit sees either all of an
//! archive's old records or all of its new ones.

use heed::types::Str;
use heed::{Database, Env, EnvFlags, EnvOpenOptions, RoTxn, RwTxn};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{IndexError, Result};
use crate::fingerprint::Fingerprint;

pub const CLASS_INDEX_DB: &str = "class_index";
pub const ARCHIVE_CLASSES_DB: &str = "archive_classes";
pub const ARCHIVE_FINGERPRINTS_DB: &str = "archive_fingerprints";

const DEFAULT_MAP_SIZE: usize = 1024 * 1024 * 1024;
const DEFAULT_MAX_DBS: u32 = 8;

type StrDb = Database<Str, Str>;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClassRecord {
    pub class_name: String,
    pub archive_logical_path: String,
    pub archive_physical_path: String,
}

/// One query result row. Ordered by class name, then logical path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ClassHit {
    pub class_name: String,
    pub logical_path: String,
    pub physical_path: String,
}

impl From<ClassRecord> for ClassHit {
    fn from(r: ClassRecord) -> Self {
        Self {
            class_name: r.class_name,
            logical_path: r.archive_logical_path,
            physical_path: r.archive_physical_path,
        }
    }
}

/// Staged replacement of every record belonging to one physical archive.
#[derive(Debug, Clone)]
pub struct ArchiveUpdate {
    physical_path: String,
    fingerprint: Fingerprint,
    staged: BTreeSet<(String, String)>,
}

impl ArchiveUpdate {
    /// Returns false when the pair was already staged.
    pub fn add_class(&mut self, class_name: impl Into<String>, logical_path: impl Into<String>) -> bool {
        self.staged.insert((class_name.into(), logical_path.into()))
    }

    pub fn physical_path(&self) -> &str {
        &self.physical_path
    }

    pub fn len(&self) -> usize {
        self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CommitOutcome {
    pub removed: usize,
    pub inserted: usize,
}

#[derive(Debug, Serialize)]
pub struct StoreStats {
    pub db_path: String,
    pub class_names: u64,
    pub class_records: u64,
    pub archives: u64,
}

#[derive(Debug, Clone)]
pub struct IndexStore {
    env: Arc<Env>,
    db_path: PathBuf,
    class_index: StrDb,
    archive_classes: StrDb,
    archive_fingerprints: StrDb,
}

impl IndexStore {
    pub fn open(db_path: PathBuf) -> Result<Self> {
        Self::open_with_map_size(db_path, DEFAULT_MAP_SIZE)
    }

    /// Opens with an explicit LMDB map size. Commits that would grow the store
    /// past it fail with [`IndexError::StoreIo`]. Must be a multiple of the OS
    /// page size.
    pub fn open_with_map_size(db_path: PathBuf, map_size: usize) -> Result<Self> {
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| IndexError::io(parent, e))?;
        }

        let env = Arc::new(open_env(&db_path, map_size)?);

        let mut wtxn = env.write_txn()?;
        let class_index = env.create_database::<Str, Str>(&mut wtxn, Some(CLASS_INDEX_DB))?;
        let archive_classes = env.create_database::<Str, Str>(&mut wtxn, Some(ARCHIVE_CLASSES_DB))?;
        let archive_fingerprints =
            env.create_database::<Str, Str>(&mut wtxn, Some(ARCHIVE_FINGERPRINTS_DB))?;
        wtxn.commit()?;

        Ok(Self {
            env,
            db_path,
            class_index,
            archive_classes,
            archive_fingerprints,
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn begin_archive_update(&self, physical_path: &str, fingerprint: Fingerprint) -> ArchiveUpdate {
        ArchiveUpdate {
            physical_path: physical_path.to_string(),
            fingerprint,
            staged: BTreeSet::new(),
        }
    }

    pub fn commit(&self, update: ArchiveUpdate) -> Result<CommitOutcome> {
        let ArchiveUpdate {
            physical_path,
            fingerprint,
            staged,
        } = update;

        let mut by_key: BTreeMap<String, Vec<ClassRecord>> = BTreeMap::new();
        for (class_name, logical_path) in staged {
            by_key
                .entry(class_name.to_lowercase())
                .or_default()
                .push(ClassRecord {
                    class_name,
                    archive_logical_path: logical_path,
                    archive_physical_path: physical_path.clone(),
                });
        }

        let mut wtxn = self.env.write_txn()?;
        let removed = self.remove_archive_in(&mut wtxn, &physical_path)?;

        let mut inserted = 0usize;
        for (key, fresh) in &by_key {
            let mut records = self.read_records(&wtxn, key)?;
            inserted += fresh.len();
            records.extend(fresh.iter().cloned());
            records.sort();
            records.dedup();
            let json = serde_json::to_string(&records)?;
            self.class_index.put(&mut wtxn, key, &json)?;
        }

        let keys: Vec<&str> = by_key.keys().map(String::as_str).collect();
        let keys_json = serde_json::to_string(&keys)?;
        self.archive_classes.put(&mut wtxn, &physical_path, &keys_json)?;
        let fp_json = serde_json::to_string(&fingerprint)?;
        self.archive_fingerprints.put(&mut wtxn, &physical_path, &fp_json)?;

        wtxn.commit()?;
        Ok(CommitOutcome { removed, inserted })
    }

    pub fn needs_reindex(&self, physical_path: &str, fingerprint: &Fingerprint) -> Result<bool> {
        Ok(self.fingerprint(physical_path)?.as_ref() != Some(fingerprint))
    }

    pub fn fingerprint(&self, physical_path: &str) -> Result<Option<Fingerprint>> {
        let rtxn = self.env.read_txn()?;
        let Some(raw) = self.archive_fingerprints.get(&rtxn, physical_path)? else {
            return Ok(None);
        };
        match serde_json::from_str(raw) {
            Ok(fp) => Ok(Some(fp)),
            Err(e) => {
                log::warn!("unreadable fingerprint for {physical_path}, forcing re-index: {e}");
                Ok(None)
            }
        }
    }

    /// Case-insensitive prefix match on the class name.
    pub fn query_prefix(&self, text: &str) -> Result<Vec<ClassHit>> {
        let needle = text.to_lowercase();
        let rtxn = self.env.read_txn()?;
        let mut hits = Vec::new();
        for item in self.class_index.prefix_iter(&rtxn, &needle)? {
            let (key, raw) = item?;
            hits.extend(decode_records(key, raw)?.into_iter().map(ClassHit::from));
        }
        hits.sort();
        Ok(hits)
    }

    /// Case-insensitive substring match on the class name. An empty needle
    /// matches everything.
    pub fn query_substring(&self, text: &str) -> Result<Vec<ClassHit>> {
        let needle = text.to_lowercase();
        let rtxn = self.env.read_txn()?;
        let mut hits = Vec::new();
        for item in self.class_index.iter(&rtxn)? {
            let (key, raw) = item?;
            if !key.contains(needle.as_str()) {
                continue;
            }
            hits.extend(decode_records(key, raw)?.into_iter().map(ClassHit::from));
        }
        hits.sort();
        Ok(hits)
    }

    /// Logical paths of every archive containing exactly `class_name`.
    pub fn all_archives_for_class(&self, class_name: &str) -> Result<BTreeSet<String>> {
        Ok(self
            .records_for_class(class_name)?
            .into_iter()
            .map(|r| r.archive_logical_path)
            .collect())
    }

    pub fn records_for_class(&self, class_name: &str) -> Result<Vec<ClassRecord>> {
        let rtxn = self.env.read_txn()?;
        let key = class_name.to_lowercase();
        let mut records = self.read_records(&rtxn, &key)?;
        records.retain(|r| r.class_name == class_name);
        Ok(records)
    }

    pub fn indexed_archives(&self) -> Result<Vec<String>> {
        let rtxn = self.env.read_txn()?;
        let mut out = Vec::new();
        for item in self.archive_fingerprints.iter(&rtxn)? {
            let (key, _) = item?;
            out.push(key.to_string());
        }
        Ok(out)
    }

    /// Drops an archive's records and fingerprint. Returns the number of
    /// records removed.
    pub fn remove_archive(&self, physical_path: &str) -> Result<usize> {
        let mut wtxn = self.env.write_txn()?;
        let removed = self.remove_archive_in(&mut wtxn, physical_path)?;
        wtxn.commit()?;
        Ok(removed)
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let rtxn = self.env.read_txn()?;
        let mut class_records = 0u64;
        for item in self.class_index.iter(&rtxn)? {
            let (key, raw) = item?;
            class_records += decode_records(key, raw)?.len() as u64;
        }
        Ok(StoreStats {
            db_path: self.db_path.to_string_lossy().to_string(),
            class_names: self.class_index.len(&rtxn)?,
            class_records,
            archives: self.archive_fingerprints.len(&rtxn)?,
        })
    }

    fn read_records(&self, txn: &RoTxn<'_>, key: &str) -> Result<Vec<ClassRecord>> {
        match self.class_index.get(txn, key)? {
            Some(raw) => decode_records(key, raw),
            None => Ok(Vec::new()),
        }
    }

    fn remove_archive_in(&self, wtxn: &mut RwTxn<'_>, physical_path: &str) -> Result<usize> {
        let keys: Vec<String> = match self.archive_classes.get(&*wtxn, physical_path)? {
            Some(raw) => serde_json::from_str(raw)?,
            None => Vec::new(),
        };

        let mut removed = 0usize;
        for key in keys {
            let mut records = self.read_records(&*wtxn, &key)?;
            let before = records.len();
            records.retain(|r| r.archive_physical_path != physical_path);
            removed += before - records.len();

            if records.is_empty() {
                self.class_index.delete(wtxn, &key)?;
            } else {
                let json = serde_json::to_string(&records)?;
                self.class_index.put(wtxn, &key, &json)?;
            }
        }

        self.archive_classes.delete(wtxn, physical_path)?;
        self.archive_fingerprints.delete(wtxn, physical_path)?;
        Ok(removed)
    }
}

fn decode_records(key: &str, raw: &str) -> Result<Vec<ClassRecord>> {
    serde_json::from_str(raw).map_err(|e| {
        log::warn!("corrupt class index entry for {key}");
        IndexError::Serialization(e)
    })
}

fn open_env(db_path: &Path, map_size: usize) -> Result<Env> {
    let mut options = EnvOpenOptions::new();
    options.map_size(map_size);
    options.max_dbs(DEFAULT_MAX_DBS);
    // SAFETY: Default LMDB locking stays enabled. NO_SUB_DIR keeps the index a
    // single file at the configured path (plus its `-lock` file).
    unsafe {
        options.flags(EnvFlags::NO_SUB_DIR);
        Ok(options.open(db_path)?)
    }
}
