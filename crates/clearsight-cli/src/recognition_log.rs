use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

/// Entries `clearsight logs` shows when no limit is given.
pub const DEFAULT_LIMIT: usize = 50;

/// One successful recognition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionEntry {
    pub id: String,
    pub name: String,
    pub similarity: f32,
    /// RFC 3339 local time.
    pub recognized_at: String,
}

impl RecognitionEntry {
    pub fn now(id: &str, name: &str, similarity: f32) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            similarity,
            recognized_at: chrono::Local::now().to_rfc3339(),
        }
    }
}

/// Append one entry as a JSON line, creating the file and its directory.
pub fn append(path: &Path, entry: &RecognitionEntry) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    let mut line = serde_json::to_string(entry)?;
    line.push('\n');
    let mut file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening recognition log {}", path.display()))?;
    file.write_all(line.as_bytes())
        .with_context(|| format!("appending to {}", path.display()))
}

/// Every entry in file order. A missing file is an empty log; lines that do
/// not parse are skipped.
pub fn load(path: &Path) -> Result<Vec<RecognitionEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading recognition log {}", path.display()))?;

    let mut entries = Vec::new();
    for (n, line) in text.lines().enumerate().filter(|(_, l)| !l.trim().is_empty()) {
        match serde_json::from_str(line) {
            Ok(entry) => entries.push(entry),
            Err(e) => tracing::warn!(line = n + 1, error = %e, "skipping malformed recognition log line"),
        }
    }
    Ok(entries)
}

/// The last `limit` entries, newest first.
pub fn recent(path: &Path, limit: usize) -> Result<Vec<RecognitionEntry>> {
    let mut entries = load(path)?;
    entries.reverse();
    entries.truncate(limit);
    Ok(entries)
}

/// Drop every entry for `id`. Returns how many were removed.
pub fn purge(path: &Path, id: &str) -> Result<usize> {
    let entries = load(path)?;
    let before = entries.len();
    let kept: Vec<RecognitionEntry> = entries.into_iter().filter(|e| e.id != id).collect();
    let removed = before - kept.len();
    if removed == 0 {
        return Ok(0);
    }

    let mut text = String::new();
    for entry in &kept {
        text.push_str(&serde_json::to_string(entry)?);
        text.push('\n');
    }
    let tmp = path.with_extension("jsonl.tmp");
    std::fs::write(&tmp, text).with_context(|| format!("writing {}", tmp.display()))?;
    std::fs::rename(&tmp, path).with_context(|| format!("replacing {}", path.display()))?;
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, at: &str) -> RecognitionEntry {
        RecognitionEntry {
            id: id.into(),
            name: id.to_uppercase(),
            similarity: 0.95,
            recognized_at: at.into(),
        }
    }

    #[test]
    fn test_missing_log_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recognitions.jsonl");
        assert!(load(&path).unwrap().is_empty());
        assert_eq!(purge(&path, "E1").unwrap(), 0);
        assert!(!path.exists());
    }

    #[test]
    fn test_append_keeps_earlier_entries() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/recognitions.jsonl");
        append(&path, &entry("E1", "2024-01-01T09:00:00+00:00")).unwrap();
        append(&path, &entry("E2", "2024-01-01T09:05:00+00:00")).unwrap();

        let entries = load(&path).unwrap();
        assert_eq!(
            entries,
            vec![entry("E1", "2024-01-01T09:00:00+00:00"), entry("E2", "2024-01-01T09:05:00+00:00")]
        );
    }

    #[test]
    fn test_recent_is_newest_first_and_limited() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recognitions.jsonl");
        for minute in 0..60 {
            append(&path, &entry("E1", &format!("2024-01-01T09:{minute:02}:00+00:00"))).unwrap();
        }

        let newest = recent(&path, DEFAULT_LIMIT).unwrap();
        assert_eq!(newest.len(), 50);
        assert_eq!(newest[0].recognized_at, "2024-01-01T09:59:00+00:00");
        assert_eq!(newest[49].recognized_at, "2024-01-01T09:10:00+00:00");
    }

    #[test]
    fn test_malformed_lines_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recognitions.jsonl");
        append(&path, &entry("E1", "2024-01-01T09:00:00+00:00")).unwrap();
        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"{not json\n\n").unwrap();
        append(&path, &entry("E2", "2024-01-01T09:01:00+00:00")).unwrap();

        let ids: Vec<String> = load(&path).unwrap().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["E1", "E2"]);
    }

    #[test]
    fn test_purge_removes_only_that_identity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recognitions.jsonl");
        append(&path, &entry("E1", "2024-01-01T09:00:00+00:00")).unwrap();
        append(&path, &entry("E2", "2024-01-01T09:01:00+00:00")).unwrap();
        append(&path, &entry("E1", "2024-01-01T09:02:00+00:00")).unwrap();

        assert_eq!(purge(&path, "E1").unwrap(), 2);
        let ids: Vec<String> = load(&path).unwrap().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["E2"]);
        assert_eq!(purge(&path, "E1").unwrap(), 0);
    }
}
