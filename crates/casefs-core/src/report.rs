//! Match report: which requested paths were satisfied by which on-disk paths.
//!
//! The report is keyed by the existing (canonical) path; each key maps to the
//! requested spellings that resolved to it, in first-seen order. A requested
//! path is recorded once, on its first successful resolution.

use std::collections::{BTreeMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Write};
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use casefs_config::{log_report_debug, log_report_error, log_report_info};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ReportError>;

/// Canonical path → requested paths that resolved to it.
pub type MatchMap = BTreeMap<String, Vec<String>>;

#[derive(Debug, Default)]
struct State {
    matched: MatchMap,
    seen: HashSet<String>,
}

/// Thread-safe, deduplicating accumulator of resolutions.
#[derive(Debug)]
pub struct MatchReport {
    output: PathBuf,
    pretty: bool,
    state: Mutex<State>,
}

impl MatchReport {
    pub fn new(output: impl Into<PathBuf>, pretty: bool) -> Self {
        Self {
            output: output.into(),
            pretty,
            state: Mutex::new(State::default()),
        }
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record that `original` resolved to each of `candidates`.
    ///
    /// No-op for an empty candidate list or an already-recorded original.
    /// Returns whether anything was recorded.
    pub fn record(&self, original: &str, candidates: &[String]) -> bool {
        if candidates.is_empty() {
            return false;
        }
        let mut state = self.state();
        if !state.seen.insert(original.to_string()) {
            return false;
        }
        for candidate in candidates {
            state
                .matched
                .entry(candidate.clone())
                .or_default()
                .push(original.to_string());
        }
        log_report_debug!(
            "recorded match",
            original = original,
            candidates = candidates.len()
        );
        true
    }

    /// Whether `original` has been recorded.
    pub fn contains(&self, original: &str) -> bool {
        self.state().seen.contains(original)
    }

    /// Number of distinct canonical paths.
    pub fn len(&self) -> usize {
        self.state().matched.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().matched.is_empty()
    }

    pub fn snapshot(&self) -> MatchMap {
        self.state().matched.clone()
    }

    /// Serialize the full mapping to the output path, replacing its content.
    ///
    /// The lock is held for the whole write so no record lands mid-flush. The
    /// file is written next to the target and renamed over it, so readers
    /// never observe a partial report.
    pub fn flush(&self) -> Result<()> {
        let state = self.state();
        let tmp_path = tmp_path_for(&self.output);

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(&tmp_path)?;
        let mut writer = BufWriter::new(&file);
        if self.pretty {
            serde_json::to_writer_pretty(&mut writer, &state.matched)?;
        } else {
            serde_json::to_writer(&mut writer, &state.matched)?;
        }
        writer.write_all(b"\n")?;
        writer.flush()?;
        drop(writer);
        file.sync_all()?;

        if let Err(e) = fs::rename(&tmp_path, &self.output) {
            log_report_error!(
                "could not move report into place",
                path = self.output.display(),
                error = e
            );
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }

        log_report_info!(
            "report written",
            path = self.output.display(),
            entries = state.matched.len()
        );
        Ok(())
    }

    /// Read a previously flushed report.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<MatchMap> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let map = serde_json::from_reader(reader)?;
        Ok(map)
    }
}

fn tmp_path_for(output: &Path) -> PathBuf {
    let mut name = output
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "report".into());
    name.push(".tmp");
    output.with_file_name(name)
}
