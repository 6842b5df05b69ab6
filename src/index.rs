//! Indexing run: discover archives under a root, skip the unchanged ones, and
//! replace the records of every new or modified archive.
//!
//! Archives are processed one at a time. A file that fails (corrupt zip,
//! unreadable file, store write error) is logged, counted and left with its
//! previous records and fingerprint, so the next run retries it.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::{IndexError, Result};
use crate::fingerprint::{Fingerprint, FingerprintMode};
use crate::nested;
use crate::progress::{NoProgress, ProgressSink};
use crate::scan::{discover_archives, validate_root};
use crate::store::IndexStore;

/// Consecutive store write failures after which the run gives up.
const MAX_CONSECUTIVE_STORE_FAILURES: usize = 3;

#[derive(Debug, Clone, Copy)]
pub struct IndexOptions {
    pub recursive: bool,
    pub fingerprint: FingerprintMode,
    pub prune_missing: bool,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            recursive: true,
            fingerprint: FingerprintMode::Metadata,
            prune_missing: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    Skipped,
    Indexed { classes: usize, nested_skipped: usize },
    Failed(String),
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexRunSummary {
    pub root: String,
    pub files_scanned: usize,
    pub files_skipped_unchanged: usize,
    pub files_failed: usize,
    pub classes_indexed: usize,
    pub nested_archives_skipped: usize,
    pub archives_pruned: usize,
    pub cancelled: bool,
    pub aborted: bool,
}

pub struct Indexer<'a> {
    store: &'a IndexStore,
    options: IndexOptions,
    cancel: Option<Arc<AtomicBool>>,
}

/// Indexes `root` with default options and no progress output.
pub fn index(root: &Path, recursive: bool, store: &IndexStore) -> Result<IndexRunSummary> {
    Indexer::new(store)
        .with_options(IndexOptions {
            recursive,
            ..IndexOptions::default()
        })
        .run(root, &mut NoProgress)
}

impl<'a> Indexer<'a> {
    pub fn new(store: &'a IndexStore) -> Self {
        Self {
            store,
            options: IndexOptions::default(),
            cancel: None,
        }
    }

    pub fn with_options(mut self, options: IndexOptions) -> Self {
        self.options = options;
        self
    }

    /// Once `flag` is set, the run stops after the file in progress.
    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|f| f.load(Ordering::Relaxed))
    }

    pub fn run(&self, root: &Path, progress: &mut dyn ProgressSink) -> Result<IndexRunSummary> {
        validate_root(root)?;
        let root = root.canonicalize().map_err(|e| IndexError::io(root, e))?;
        let archives = discover_archives(&root, self.options.recursive)?;
        let total = archives.len();
        log::info!("indexing {} ({total} archives found)", root.display());

        let mut summary = IndexRunSummary {
            root: root.to_string_lossy().to_string(),
            ..IndexRunSummary::default()
        };
        progress.started(total);

        let mut store_failures = 0usize;
        for (i, path) in archives.iter().enumerate() {
            if self.is_cancelled() {
                log::info!("indexing cancelled after {} of {total} archives", i);
                summary.cancelled = true;
                break;
            }

            summary.files_scanned += 1;
            let outcome = match self.index_file(path) {
                Ok(outcome) => {
                    store_failures = 0;
                    outcome
                }
                Err(err) if err.is_per_file() => {
                    log::warn!("failed to index {}: {err}", path.display());
                    if matches!(err, IndexError::StoreIo(_)) {
                        store_failures += 1;
                    }
                    FileOutcome::Failed(err.to_string())
                }
                Err(err) => return Err(err),
            };

            match &outcome {
                FileOutcome::Skipped => summary.files_skipped_unchanged += 1,
                FileOutcome::Indexed {
                    classes,
                    nested_skipped,
                } => {
                    summary.classes_indexed += classes;
                    summary.nested_archives_skipped += nested_skipped;
                }
                FileOutcome::Failed(_) => summary.files_failed += 1,
            }
            progress.file_finished(i + 1, total, path, &outcome);

            if store_failures >= MAX_CONSECUTIVE_STORE_FAILURES {
                log::error!("index store keeps failing, giving up after {store_failures} consecutive errors");
                summary.aborted = true;
                break;
            }
        }

        if self.options.prune_missing && !summary.cancelled && !summary.aborted {
            summary.archives_pruned = self.prune_missing(&root)?;
        }

        log::info!(
            "indexed {} classes ({} archives scanned, {} unchanged, {} failed)",
            summary.classes_indexed,
            summary.files_scanned,
            summary.files_skipped_unchanged,
            summary.files_failed
        );
        progress.finished(&summary);
        Ok(summary)
    }

    /// Indexes one archive. Returns [`FileOutcome::Skipped`] when its
    /// fingerprint matches the stored one.
    pub fn index_file(&self, path: &Path) -> Result<FileOutcome> {
        let physical = path.to_string_lossy().to_string();
        let fingerprint = Fingerprint::compute(path, self.options.fingerprint)?;
        if !self.store.needs_reindex(&physical, &fingerprint)? {
            log::debug!("unchanged: {physical}");
            return Ok(FileOutcome::Skipped);
        }

        let mut entries = nested::expand_file(path)?;
        let mut update = self.store.begin_archive_update(&physical, fingerprint);
        while let Some(entry) = entries.next_entry() {
            let entry = entry?;
            if let Some(class_name) = entry.class_name() {
                update.add_class(class_name, entry.logical_path.to_string());
            }
        }
        let nested_skipped = entries.skipped_archives();
        drop(entries);

        log::debug!(
            "committing {}: {} classes staged",
            update.physical_path(),
            update.len()
        );
        let outcome = self.store.commit(update)?;
        log::debug!("committed {physical}: {} replaced", outcome.removed);

        Ok(FileOutcome::Indexed {
            classes: outcome.inserted,
            nested_skipped,
        })
    }

    /// Removes archives recorded under `root` whose file is gone.
    fn prune_missing(&self, root: &Path) -> Result<usize> {
        let mut pruned = 0usize;
        for physical in self.store.indexed_archives()? {
            let path = PathBuf::from(&physical);
            if !path.starts_with(root) || path.exists() {
                continue;
            }
            let removed = self.store.remove_archive(&physical)?;
            log::info!("pruned {physical} ({removed} classes)");
            pruned += 1;
        }
        Ok(pruned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{jar_bytes, remove_db, temp_db_path, temp_path, write_jar};
    use std::fs;

    struct Recorder {
        events: Vec<(usize, usize, FileOutcome)>,
        cancel_after: Option<(usize, Arc<AtomicBool>)>,
    }

    impl ProgressSink for Recorder {
        fn file_finished(&mut self, done: usize, total: usize, _path: &Path, outcome: &FileOutcome) {
            self.events.push((done, total, outcome.clone()));
            if let Some((after, flag)) = self.cancel_after.as_ref()
                && done >= *after
            {
                flag.store(true, Ordering::Relaxed);
            }
        }
    }

    fn class_set(store: &IndexStore, text: &str) -> anyhow::Result<Vec<(String, String)>> {
        Ok(store
            .query_substring(text)?
            .into_iter()
            .map(|h| (h.class_name, h.logical_path))
            .collect())
    }

    #[test]
    fn second_run_skips_unchanged_archives() -> anyhow::Result<()> {
        let root = temp_path("index_unchanged");
        write_jar(&root.join("a.jar"), &[("a/A.class", b""), ("a/B.class", b"")])?;
        write_jar(&root.join("lib/b.jar"), &[("b/C.class", b"")])?;
        let db_path = temp_db_path("index_unchanged");
        let store = IndexStore::open(db_path.clone())?;

        let first = index(&root, true, &store)?;
        assert_eq!(first.files_scanned, 2);
        assert_eq!(first.classes_indexed, 3);
        let before = class_set(&store, "")?;

        let second = index(&root, true, &store)?;
        assert_eq!(second.files_scanned, 2);
        assert_eq!(second.files_skipped_unchanged, 2);
        assert_eq!(second.classes_indexed, 0);
        assert_eq!(class_set(&store, "")?, before);

        drop(store);
        remove_db(&db_path);
        fs::remove_dir_all(root)?;
        Ok(())
    }

    #[test]
    fn modified_archive_drops_stale_classes() -> anyhow::Result<()> {
        let root = temp_path("index_modified");
        let jar = root.join("app.jar");
        write_jar(&jar, &[("old/Gone.class", b""), ("keep/Stay.class", b"")])?;
        let db_path = temp_db_path("index_modified");
        let store = IndexStore::open(db_path.clone())?;

        index(&root, true, &store)?;
        assert_eq!(class_set(&store, "gone")?.len(), 1);

        write_jar(
            &jar,
            &[
                ("keep/Stay.class", b""),
                ("fresh/Added.class", b""),
                ("fresh/Another.class", b"with a different size"),
            ],
        )?;
        let second = index(&root, true, &store)?;
        assert_eq!(second.files_skipped_unchanged, 0);
        assert_eq!(second.classes_indexed, 3);

        assert!(class_set(&store, "gone")?.is_empty());
        let names: Vec<String> = class_set(&store, "")?.into_iter().map(|(c, _)| c).collect();
        assert_eq!(names, vec!["fresh.Added", "fresh.Another", "keep.Stay"]);

        drop(store);
        remove_db(&db_path);
        fs::remove_dir_all(root)?;
        Ok(())
    }

    #[test]
    fn nested_war_records_friendly_logical_path() -> anyhow::Result<()> {
        let root = temp_path("index_nested");
        let inner = jar_bytes(&[("com/foo/Bar.class", b"")])?;
        write_jar(&root.join("outer.war"), &[("inner.jar", inner.as_slice())])?;
        let db_path = temp_db_path("index_nested");
        let store = IndexStore::open(db_path.clone())?;

        index(&root, true, &store)?;
        let war = root.canonicalize()?.join("outer.war");
        let expected = format!("{}->inner.jar", war.to_string_lossy());
        let archives = store.all_archives_for_class("com.foo.Bar")?;
        assert!(archives.contains(&expected), "{archives:?}");

        let hits = store.query_substring("FOO.bar")?;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].logical_path, expected);
        assert!(hits[0].logical_path.ends_with("outer.war->inner.jar"));
        assert_eq!(hits[0].physical_path, war.to_string_lossy());

        drop(store);
        remove_db(&db_path);
        fs::remove_dir_all(root)?;
        Ok(())
    }

    #[test]
    fn corrupt_archive_is_counted_and_run_continues() -> anyhow::Result<()> {
        let root = temp_path("index_corrupt");
        for i in 0..4 {
            let class = format!("ok{i}/Valid{i}.class");
            write_jar(&root.join(format!("good{i}.jar")), &[(class.as_str(), b"")])?;
        }
        fs::write(root.join("broken.jar"), b"PK\x03\x04 truncated garbage")?;
        let db_path = temp_db_path("index_corrupt");
        let store = IndexStore::open(db_path.clone())?;

        let mut recorder = Recorder {
            events: Vec::new(),
            cancel_after: None,
        };
        let summary = Indexer::new(&store).run(&root, &mut recorder)?;
        assert_eq!(summary.files_scanned, 5);
        assert_eq!(summary.files_failed, 1);
        assert_eq!(summary.classes_indexed, 4);
        assert_eq!(class_set(&store, "valid")?.len(), 4);

        assert_eq!(recorder.events.len(), 5);
        assert_eq!(
            recorder.events.iter().map(|(d, t, _)| (*d, *t)).collect::<Vec<_>>(),
            vec![(1, 5), (2, 5), (3, 5), (4, 5), (5, 5)]
        );
        assert!(matches!(recorder.events[0].2, FileOutcome::Failed(_)));

        let again = index(&root, true, &store)?;
        assert_eq!(again.files_failed, 1);
        assert_eq!(again.files_skipped_unchanged, 4);

        drop(store);
        remove_db(&db_path);
        fs::remove_dir_all(root)?;
        Ok(())
    }

    #[test]
    fn cancel_flag_stops_between_files() -> anyhow::Result<()> {
        let root = temp_path("index_cancel");
        for i in 0..3 {
            let class = format!("c/C{i}.class");
            write_jar(&root.join(format!("{i}.jar")), &[(class.as_str(), b"")])?;
        }
        let db_path = temp_db_path("index_cancel");
        let store = IndexStore::open(db_path.clone())?;

        let flag = Arc::new(AtomicBool::new(false));
        let mut recorder = Recorder {
            events: Vec::new(),
            cancel_after: Some((1, Arc::clone(&flag))),
        };
        let summary = Indexer::new(&store)
            .with_cancel(Arc::clone(&flag))
            .run(&root, &mut recorder)?;
        assert!(summary.cancelled);
        assert_eq!(summary.files_scanned, 1);
        assert_eq!(summary.classes_indexed, 1);

        drop(store);
        remove_db(&db_path);
        fs::remove_dir_all(root)?;
        Ok(())
    }

    #[test]
    fn non_recursive_and_prune_options() -> anyhow::Result<()> {
        let root = temp_path("index_prune");
        write_jar(&root.join("top.jar"), &[("t/Top.class", b"")])?;
        write_jar(&root.join("sub/deep.jar"), &[("d/Deep.class", b"")])?;
        let db_path = temp_db_path("index_prune");
        let store = IndexStore::open(db_path.clone())?;

        let shallow = index(&root, false, &store)?;
        assert_eq!(shallow.files_scanned, 1);
        assert!(class_set(&store, "deep")?.is_empty());

        index(&root, true, &store)?;
        assert_eq!(class_set(&store, "deep")?.len(), 1);

        fs::remove_file(root.join("sub/deep.jar"))?;
        let pruned = Indexer::new(&store)
            .with_options(IndexOptions {
                prune_missing: true,
                ..IndexOptions::default()
            })
            .run(&root, &mut NoProgress)?;
        assert_eq!(pruned.archives_pruned, 1);
        assert!(class_set(&store, "deep")?.is_empty());
        assert_eq!(class_set(&store, "top")?.len(), 1);

        drop(store);
        remove_db(&db_path);
        fs::remove_dir_all(root)?;
        Ok(())
    }

    #[test]
    fn same_named_archives_under_different_roots_stay_distinct() -> anyhow::Result<()> {
        let base = temp_path("index_two_roots");
        write_jar(&base.join("r1/a.jar"), &[("x/Y.class", b"")])?;
        write_jar(&base.join("r2/a.jar"), &[("x/Y.class", b"")])?;
        let db_path = temp_db_path("index_two_roots");
        let store = IndexStore::open(db_path.clone())?;

        index(&base.join("r1"), true, &store)?;
        index(&base.join("r2"), true, &store)?;

        let hits = class_set(&store, "x.y")?;
        assert_eq!(hits.len(), 2);
        assert_ne!(hits[0].1, hits[1].1);
        assert_eq!(store.all_archives_for_class("x.Y")?.len(), 2);

        drop(store);
        remove_db(&db_path);
        fs::remove_dir_all(base)?;
        Ok(())
    }

    #[test]
    fn logical_path_does_not_depend_on_run_root() -> anyhow::Result<()> {
        let root = temp_path("index_root_change");
        write_jar(&root.join("sub/b.jar"), &[("b/B.class", b"")])?;
        let db_path = temp_db_path("index_root_change");
        let store = IndexStore::open(db_path.clone())?;
        let physical = root.canonicalize()?.join("sub/b.jar");

        index(&root, true, &store)?;
        let from_parent = class_set(&store, "b.b")?;
        assert_eq!(from_parent[0].1, physical.to_string_lossy());

        fs::remove_file(&physical)?;
        write_jar(&physical, &[("b/B.class", b"rebuilt with new content")])?;
        let rerun = index(&root.join("sub"), true, &store)?;
        assert_eq!(rerun.classes_indexed, 1);
        assert_eq!(class_set(&store, "b.b")?, from_parent);

        drop(store);
        remove_db(&db_path);
        fs::remove_dir_all(root)?;
        Ok(())
    }

    #[test]
    fn repeated_store_failures_abort_the_run() -> anyhow::Result<()> {
        let root = temp_path("index_store_full");
        write_jar(&root.join("a_small.jar"), &[("s/Small.class", b"")])?;
        for j in 0..5 {
            let names: Vec<String> = (0..2000)
                .map(|i| format!("big{j}/generated/pkg/GeneratedClass{i:04}.class"))
                .collect();
            let entries: Vec<(&str, &[u8])> =
                names.iter().map(|n| (n.as_str(), &b""[..])).collect();
            write_jar(&root.join(format!("big{j}.jar")), &entries)?;
        }
        let db_path = temp_db_path("index_store_full");
        let store = IndexStore::open_with_map_size(db_path.clone(), 256 * 1024)?;

        let mut recorder = Recorder {
            events: Vec::new(),
            cancel_after: None,
        };
        let summary = Indexer::new(&store).run(&root, &mut recorder)?;
        assert!(summary.aborted);
        assert_eq!(summary.files_scanned, 1 + MAX_CONSECUTIVE_STORE_FAILURES);
        assert_eq!(summary.files_failed, MAX_CONSECUTIVE_STORE_FAILURES);
        assert_eq!(summary.classes_indexed, 1);
        assert!(matches!(recorder.events[0].2, FileOutcome::Indexed { classes: 1, .. }));
        assert!(
            recorder.events[1..]
                .iter()
                .all(|(_, _, o)| matches!(o, FileOutcome::Failed(_)))
        );

        assert_eq!(class_set(&store, "small")?.len(), 1);
        assert!(class_set(&store, "generatedclass")?.is_empty());
        assert_eq!(store.indexed_archives()?.len(), 1);

        drop(store);
        remove_db(&db_path);
        fs::remove_dir_all(root)?;
        Ok(())
    }

    #[test]
    fn missing_root_is_config_error() -> anyhow::Result<()> {
        let db_path = temp_db_path("index_missing_root");
        let store = IndexStore::open(db_path.clone())?;
        let err = index(&temp_path("index_no_such_dir"), true, &store).unwrap_err();
        assert!(matches!(err, IndexError::Config(_)));
        drop(store);
        remove_db(&db_path);
        Ok(())
    }
}
