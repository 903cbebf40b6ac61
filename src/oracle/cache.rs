use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::model::normalize::text_fingerprint;
use crate::model::test_case::TestCase;
use crate::oracle::oracle_model::{OracleVerdict, steps_summary};

pub const CACHE_FILE: &str = "semantic_duplicates.json";

const SECONDS_PER_DAY: u64 = 86_400;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    content_hash: String,
    timestamp: u64,
    verdict: OracleVerdict,
}

/// On-disk memo of oracle verdicts keyed by unordered id pair.
///
/// An entry only answers while both cases still have the content it was
/// computed from and it is younger than the expiry. File errors are logged
/// and otherwise ignored.
pub struct OracleCache {
    path: PathBuf,
    expiry_secs: u64,
    entries: BTreeMap<String, CacheEntry>,
}

impl OracleCache {
    pub fn open(dir: &Path, expiry_days: u64) -> Self {
        let path = dir.join(CACHE_FILE);
        let entries = match fs::read_to_string(&path) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "oracle cache unreadable, starting empty");
                BTreeMap::new()
            }),
            Err(_) => BTreeMap::new(),
        };

        Self {
            path,
            expiry_secs: expiry_days * SECONDS_PER_DAY,
            entries,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&mut self, a: &TestCase, b: &TestCase) -> Option<OracleVerdict> {
        self.get_at(a, b, now_secs())
    }

    pub fn get_at(&mut self, a: &TestCase, b: &TestCase, now: u64) -> Option<OracleVerdict> {
        let key = cache_key(a, b);
        let entry = self.entries.get(&key)?;

        if now.saturating_sub(entry.timestamp) > self.expiry_secs {
            self.entries.remove(&key);
            self.save();
            return None;
        }

        if entry.content_hash != content_hash(a, b) {
            return None;
        }

        Some(entry.verdict.clone())
    }

    pub fn put(&mut self, a: &TestCase, b: &TestCase, verdict: &OracleVerdict) {
        self.put_at(a, b, verdict, now_secs());
    }

    pub fn put_at(&mut self, a: &TestCase, b: &TestCase, verdict: &OracleVerdict, now: u64) {
        self.entries.insert(
            cache_key(a, b),
            CacheEntry {
                content_hash: content_hash(a, b),
                timestamp: now,
                verdict: verdict.clone(),
            },
        );
        self.save();
    }

    fn save(&self) {
        if let Some(parent) = self.path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                tracing::warn!(path = %parent.display(), error = %e, "could not create oracle cache dir");
                return;
            }
        }

        let json = match serde_json::to_string_pretty(&self.entries) {
            Ok(j) => j,
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize oracle cache");
                return;
            }
        };

        if let Err(e) = fs::write(&self.path, json) {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to write oracle cache");
        }
    }
}

fn cache_key(a: &TestCase, b: &TestCase) -> String {
    format!("{}_{}", a.id.min(b.id), a.id.max(b.id))
}

/// Hash of both cases' names, descriptions and step summaries in id order.
fn content_hash(a: &TestCase, b: &TestCase) -> String {
    let (first, second) = if a.id <= b.id { (a, b) } else { (b, a) };
    let describe = |tc: &TestCase| {
        format!(
            "{}\u{1f}{}\u{1f}{}",
            tc.name,
            tc.description.as_deref().unwrap_or(""),
            steps_summary(tc)
        )
    };
    text_fingerprint(&format!("{}\u{1e}{}", describe(first), describe(second)))
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
