//! Progress reporting for index runs.

use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;

use crate::index::{FileOutcome, IndexRunSummary};

/// Receives one callback per archive, in processing order.
pub trait ProgressSink {
    fn started(&mut self, _total: usize) {}

    fn file_finished(&mut self, _done: usize, _total: usize, _path: &Path, _outcome: &FileOutcome) {}

    fn finished(&mut self, _summary: &IndexRunSummary) {}
}

pub struct NoProgress;

impl ProgressSink for NoProgress {}

/// Terminal progress bar on stderr.
#[derive(Default)]
pub struct BarProgress {
    bar: Option<ProgressBar>,
}

impl BarProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressSink for BarProgress {
    fn started(&mut self, total: usize) {
        let pb = ProgressBar::new(total as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▓▒░  "),
        );
        pb.set_message("Indexing archives...");
        self.bar = Some(pb);
    }

    fn file_finished(&mut self, done: usize, _total: usize, path: &Path, outcome: &FileOutcome) {
        let Some(pb) = self.bar.as_ref() else {
            return;
        };
        if let FileOutcome::Failed(reason) = outcome {
            pb.println(format!("failed: {} ({reason})", path.display()));
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        pb.set_message(name);
        pb.set_position(done as u64);
    }

    fn finished(&mut self, _summary: &IndexRunSummary) {
        if let Some(pb) = self.bar.take() {
            pb.finish_and_clear();
        }
    }
}
