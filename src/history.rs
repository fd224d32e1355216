use crate::emotion::EmotionDistribution;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error};

/// Every distribution seen for every person, in frame order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmotionHistory {
    people: BTreeMap<String, Vec<EmotionDistribution>>,
}

impl EmotionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, person_id: &str, distribution: EmotionDistribution) {
        self.people
            .entry(person_id.to_string())
            .or_default()
            .push(distribution);
    }

    pub fn get(&self, person_id: &str) -> Option<&[EmotionDistribution]> {
        self.people.get(person_id).map(Vec::as_slice)
    }

    /// Number of people seen so far.
    pub fn len(&self) -> usize {
        self.people.len()
    }

    pub fn is_empty(&self) -> bool {
        self.people.is_empty()
    }

    /// Total number of recorded distributions across all people.
    pub fn entries(&self) -> usize {
        self.people.values().map(Vec::len).sum()
    }

    /// Reads a history previously written by [`JsonSink::flush`].
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

/// Writes the whole history to one JSON file, replacing it every time.
///
/// The file is written next to the target and renamed over it, so a reader
/// sees either the previous or the new content.
#[derive(Debug)]
pub struct JsonSink {
    path: PathBuf,
    flushes: u64,
}

impl JsonSink {
    /// Prepares `path`, creating its parent directory when needed.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = parent_dir(&path) {
            fs::create_dir_all(parent)?;
        }
        Ok(Self { path, flushes: 0 })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn flushes(&self) -> u64 {
        self.flushes
    }

    pub fn flush(&mut self, history: &EmotionHistory) -> Result<()> {
        let dir = parent_dir(&self.path).unwrap_or_else(|| Path::new("."));
        let file = tempfile::NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(file.as_file());
            serde_json::to_writer_pretty(&mut writer, history)?;
            writer.flush()?;
        }
        file.as_file().sync_all()?;
        file.persist(&self.path).map_err(|e| Error::Io(e.error))?;
        self.flushes += 1;
        debug!(
            path = %self.path.display(),
            people = history.len(),
            entries = history.entries(),
            "Flushed emotion history"
        );
        Ok(())
    }
}

fn parent_dir(path: &Path) -> Option<&Path> {
    path.parent().filter(|p| !p.as_os_str().is_empty())
}

/// Owns the history and its sink for the lifetime of one run.
///
/// Dropping the recorder without calling [`HistoryRecorder::finish`] still
/// writes whatever was recorded since the last flush.
#[derive(Debug)]
pub struct HistoryRecorder {
    history: EmotionHistory,
    sink: JsonSink,
    flush_every: u64,
    frames_since_flush: u64,
    finished: bool,
}

impl HistoryRecorder {
    pub fn new(sink: JsonSink, flush_every: u64) -> Self {
        Self {
            history: EmotionHistory::new(),
            sink,
            flush_every: flush_every.max(1),
            frames_since_flush: 0,
            finished: false,
        }
    }

    pub fn history_mut(&mut self) -> &mut EmotionHistory {
        &mut self.history
    }

    pub fn record(&mut self, person_id: &str, distribution: EmotionDistribution) {
        self.history.record(person_id, distribution);
    }

    /// Marks the end of a frame and flushes when the cadence is reached.
    pub fn end_frame(&mut self) -> Result<()> {
        self.frames_since_flush += 1;
        if self.frames_since_flush >= self.flush_every {
            self.flush()?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.sink.flush(&self.history)?;
        self.frames_since_flush = 0;
        Ok(())
    }

    /// Writes the final state and hands the history back.
    pub fn finish(mut self) -> Result<EmotionHistory> {
        self.finished = true;
        self.sink.flush(&self.history)?;
        Ok(std::mem::take(&mut self.history))
    }
}

impl Drop for HistoryRecorder {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(e) = self.sink.flush(&self.history) {
            error!(path = %self.sink.path().display(), "Failed to write emotion history: {}", e);
        }
    }
}
