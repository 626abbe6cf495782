//! Result store: the durable output file and the stable merge behind it.
//!
//! The store is the only writer of the output file. Every write replaces the
//! whole file atomically: rows go to a temporary file in the same directory
//! which is then renamed over the target, so readers (and a rerun after a
//! crash) always see a complete snapshot.
//!
//! Merging is stable by correlation id:
//! 1. existing rows keep their position; a row whose key has a new outcome
//!    is replaced in place,
//! 2. outcomes for keys not present yet are appended in production order.

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use crate::error::StoreError;
use crate::record::{OutcomeRecord, OUTPUT_COLUMNS};

/// The persisted result set plus the skip index built from it at load time.
#[derive(Debug)]
pub struct ResultStore {
    path: PathBuf,
    rows: Vec<OutcomeRecord>,
    /// correlation id → whether its stored row was a success.
    prior: HashMap<String, bool>,
}

impl ResultStore {
    /// Load the result file at `path`.
    ///
    /// An absent file is an empty store. An unreadable one is treated the
    /// same way, with a warning.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let rows = match read_rows(&path) {
            Ok(Some(rows)) => rows,
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!(error = %e, "could not read existing output, starting empty");
                Vec::new()
            }
        };

        let prior: HashMap<String, bool> = rows
            .iter()
            .filter(|r| !r.key().is_empty())
            .map(|r| (r.key().to_string(), r.is_success()))
            .collect();
        if !rows.is_empty() {
            tracing::info!(
                rows = rows.len(),
                successful = prior.values().filter(|ok| **ok).count(),
                "loaded existing output"
            );
        }

        Self { path, rows, prior }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rows as last persisted (or loaded).
    pub fn rows(&self) -> &[OutcomeRecord] {
        &self.rows
    }

    /// `true` iff a prior run stored a successful outcome for this id.
    /// Failed prior entries are retried.
    pub fn should_skip(&self, correlation_id: &str) -> bool {
        self.prior
            .get(correlation_id.trim())
            .copied()
            .unwrap_or(false)
    }

    /// Merge `new` into the stored rows and persist the result.
    ///
    /// On error the in-memory rows are left untouched, so a later flush with
    /// the same outcomes retries the same merge. Returns the persisted row
    /// count.
    pub fn flush(&mut self, new: &[OutcomeRecord]) -> Result<usize, StoreError> {
        if new.is_empty() {
            return Ok(self.rows.len());
        }
        let merged = merge_stable(&self.rows, new);
        persist(&self.path, &merged)?;
        self.rows = merged;
        Ok(self.rows.len())
    }
}

/// Stable merge of `new` outcomes into `existing` rows, keyed by correlation id.
///
/// When `new` holds the same key twice the later outcome wins, at the
/// position of the first. Rows without a key cannot be matched: existing
/// ones are kept verbatim and new ones are appended unless an identical row
/// is already present, so a rerun over the same input adds nothing.
pub fn merge_stable(existing: &[OutcomeRecord], new: &[OutcomeRecord]) -> Vec<OutcomeRecord> {
    let mut updates: IndexMap<&str, &OutcomeRecord> = IndexMap::with_capacity(new.len());
    let mut unkeyed: Vec<&OutcomeRecord> = Vec::new();
    for row in new {
        if row.key().is_empty() {
            if !existing.contains(row) && !unkeyed.contains(&row) {
                unkeyed.push(row);
            }
            continue;
        }
        updates.insert(row.key(), row);
    }

    let mut merged = Vec::with_capacity(existing.len() + updates.len() + unkeyed.len());
    let mut seen: HashSet<&str> = HashSet::with_capacity(existing.len());
    for row in existing {
        let key = row.key();
        seen.insert(key);
        match updates.get(key) {
            Some(update) if !key.is_empty() => merged.push((*update).clone()),
            _ => merged.push(row.clone()),
        }
    }

    merged.extend(
        updates
            .iter()
            .filter(|(key, _)| !seen.contains(*key))
            .map(|(_, row)| (*row).clone()),
    );
    merged.extend(unkeyed.into_iter().cloned());
    merged
}

/// Read rows from a result file. `Ok(None)` if the file does not exist.
///
/// Missing columns read as empty strings.
pub fn read_rows(path: &Path) -> Result<Option<Vec<OutcomeRecord>>, StoreError> {
    if !path.exists() {
        return Ok(None);
    }
    let csv_err = |source| StoreError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(csv_err)?;
    let rows = reader
        .deserialize::<OutcomeRecord>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(csv_err)?;
    Ok(Some(rows))
}

/// Atomically replace the file at `path` with `rows`.
///
/// The temporary file lives next to the target and is removed on every
/// failure path.
pub fn persist(path: &Path, rows: &[OutcomeRecord]) -> Result<(), StoreError> {
    let io_err = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    let csv_err = |source| StoreError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let prefix = format!(
        ".{}.",
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "results".into())
    );
    let mut tmp = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(io_err)?;

    {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(tmp.as_file_mut());
        writer.write_record(OUTPUT_COLUMNS).map_err(csv_err)?;
        for row in rows {
            writer.serialize(row).map_err(csv_err)?;
        }
        writer.flush().map_err(io_err)?;
    }
    tmp.as_file_mut().flush().map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;

    // Dropping the PersistError drops the temp file, which deletes it.
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    tracing::debug!(path = %path.display(), rows = rows.len(), "results written");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(id: &str, token: &str) -> OutcomeRecord {
        OutcomeRecord {
            correlation_id: id.into(),
            token: token.into(),
            level_label: "basic".into(),
            subject_id: format!("app-{id}"),
            client_id: "client".into(),
            error_message: String::new(),
        }
    }

    fn failed(id: &str) -> OutcomeRecord {
        OutcomeRecord {
            error_message: "Token generation failed".into(),
            token: String::new(),
            ..ok(id, "")
        }
    }

    fn keys(rows: &[OutcomeRecord]) -> Vec<&str> {
        rows.iter().map(|r| r.key()).collect()
    }

    #[test]
    fn merge_updates_in_place_and_appends_new() {
        let existing = vec![ok("A", "a"), failed("B"), ok("C", "c")];
        let new = vec![ok("B", "b2"), ok("D", "d")];
        let merged = merge_stable(&existing, &new);
        assert_eq!(keys(&merged), vec!["A", "B", "C", "D"]);
        assert_eq!(merged[1].token, "b2");
        assert!(merged[1].is_success());
        assert_eq!(merged[0], existing[0]);
    }

    #[test]
    fn merge_into_empty_keeps_production_order() {
        let merged = merge_stable(&[], &[ok("z", "1"), ok("a", "2"), ok("m", "3")]);
        assert_eq!(keys(&merged), vec!["z", "a", "m"]);
    }

    #[test]
    fn merge_with_nothing_new_is_identity() {
        let existing = vec![ok("A", "a"), failed("B")];
        assert_eq!(merge_stable(&existing, &[]), existing);
    }

    #[test]
    fn duplicate_new_keys_collapse_to_last_outcome() {
        let merged = merge_stable(&[], &[failed("X"), ok("Y", "y"), ok("X", "x")]);
        assert_eq!(keys(&merged), vec!["X", "Y"]);
        assert_eq!(merged[0].token, "x");
    }

    #[test]
    fn unkeyed_rows_are_appended_once() {
        let existing = vec![ok("", "orphan"), ok("A", "a")];
        let merged = merge_stable(&existing, &[failed(""), ok("B", "b"), failed("")]);
        assert_eq!(keys(&merged), vec!["", "A", "B", ""]);
        assert_eq!(merged[0].token, "orphan");
        assert_eq!(merged[3], failed(""));

        // The same unkeyed outcome on a rerun is not duplicated.
        assert_eq!(merge_stable(&merged, &[failed("")]), merged);
    }

    #[test]
    fn keys_are_matched_whitespace_insensitively() {
        let merged = merge_stable(&[ok(" A ", "old")], &[ok("A", "new")]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].token, "new");
    }

    #[test]
    fn persist_then_load_roundtrip_with_fixed_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        persist(&path, &[ok("A", "a"), failed("B")]).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("externalId,shareToken,applicantLevel,applicantId,forClientId,error\n"));

        let store = ResultStore::load(&path);
        assert_eq!(keys(store.rows()), vec!["A", "B"]);
        assert!(store.should_skip("A"));
        assert!(!store.should_skip("B"), "failed rows are retried");
        assert!(!store.should_skip("C"));
    }

    #[test]
    fn empty_result_set_still_writes_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        persist(&path, &[]).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap().trim_end(),
            OUTPUT_COLUMNS.join(",")
        );
    }

    #[test]
    fn load_tolerates_missing_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        std::fs::write(&path, "externalId,shareToken,error\nA,tok,\nB,,boom\n").unwrap();
        let store = ResultStore::load(&path);
        assert_eq!(store.rows()[0].client_id, "");
        assert!(store.should_skip("A"));
        assert!(!store.should_skip("B"));
    }

    #[test]
    fn absent_or_unreadable_file_is_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ResultStore::load(dir.path().join("none.csv")).rows().is_empty());

        let path = dir.path().join("bad.csv");
        std::fs::write(&path, b"externalId,error\n\xff\xfe,\n").unwrap();
        assert!(ResultStore::load(&path).rows().is_empty());
    }

    #[test]
    fn flush_merges_and_leaves_no_temp_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        persist(&path, &[ok("A", "a"), failed("B")]).unwrap();

        let mut store = ResultStore::load(&path);
        assert_eq!(store.flush(&[ok("B", "b"), ok("C", "c")]).unwrap(), 3);
        assert_eq!(keys(&read_rows(&path).unwrap().unwrap()), vec!["A", "B", "C"]);

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .filter(|n| n != "out.csv")
            .collect();
        assert!(leftovers.is_empty(), "{leftovers:?}");
    }

    #[test]
    fn failed_flush_keeps_previous_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("out.csv");
        let mut store = ResultStore::load(&path);
        assert!(store.flush(&[ok("A", "a")]).is_err());
        assert!(store.rows().is_empty());
        assert!(!path.exists());
    }
}
