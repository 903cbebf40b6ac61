use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;

use crate::trace::trace::{RunSummary, TraceEvent};

#[derive(Debug)]
struct TraceSink {
    path: PathBuf,
    file: Mutex<File>,
}

/// JSONL record of an optimization run: one line per engine decision,
/// closed by a run summary. A disabled logger drops everything.
#[derive(Debug, Default)]
pub struct TraceLogger {
    sink: Option<TraceSink>,
    written: AtomicUsize,
}

impl TraceLogger {
    /// Appends to `path`. An unopenable path yields a disabled logger.
    pub fn new(path: &Path) -> Self {
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Self {
                sink: Some(TraceSink {
                    path: path.to_path_buf(),
                    file: Mutex::new(file),
                }),
                written: AtomicUsize::new(0),
            },
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "could not open trace file");
                Self::disabled()
            }
        }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.sink.is_some()
    }

    pub fn path(&self) -> Option<&Path> {
        self.sink.as_ref().map(|s| s.path.as_path())
    }

    /// Records written since the logger was opened.
    pub fn written(&self) -> usize {
        self.written.load(Ordering::Relaxed)
    }

    pub fn log(&self, event: &TraceEvent) {
        self.append(event);
    }

    pub fn log_summary(&self, summary: &RunSummary) {
        self.append(summary);
    }

    fn append<T: Serialize>(&self, record: &T) {
        let Some(sink) = &self.sink else {
            return;
        };

        let line = match serde_json::to_string(record) {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize trace record");
                return;
            }
        };

        let Ok(mut file) = sink.file.lock() else {
            tracing::warn!(path = %sink.path.display(), "trace file lock poisoned");
            return;
        };
        match writeln!(file, "{}", line) {
            Ok(()) => {
                self.written.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => tracing::warn!(path = %sink.path.display(), error = %e, "failed to write trace record"),
        }
    }
}
