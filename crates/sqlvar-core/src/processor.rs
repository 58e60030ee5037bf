//! Per-job orchestration: owns the catalog, the per-file record store, and
//! the random source.
//!
//! State machine per file: unprocessed -> expanded (record stored) ->
//! unexpanded (record consumed). Records are keyed by the file's
//! processing-root-relative path and consumed exactly once; a second
//! unexpansion of the same path fails with `ProcessError::MissingRecord`.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::catalog::MacroCatalog;
use crate::types::{ExpansionRecord, ProcessError};
use crate::{expand, unexpand};

// ---------------------------------------------------------------------------
// Record store
// ---------------------------------------------------------------------------

/// Expansion records keyed by relative file path. Serializable so a job can
/// be split across processes around the external translator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecordStore {
    files: HashMap<String, ExpansionRecord>,
}

impl RecordStore {
    pub fn insert(&mut self, record: ExpansionRecord) {
        self.files.insert(record.path.clone(), record);
    }

    /// Remove and return the record for `path` (consume-once).
    pub fn take(&mut self, path: &str) -> Option<ExpansionRecord> {
        self.files.remove(path)
    }

    pub fn get(&self, path: &str) -> Option<&ExpansionRecord> {
        self.files.get(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Processor
// ---------------------------------------------------------------------------

/// Handles macro expansion before translation and unexpansion after, one
/// text at a time, keyed by relative file path.
pub struct MacroProcessor {
    catalog: MacroCatalog,
    store: RecordStore,
    rng: StdRng,
}

impl MacroProcessor {
    pub fn new(catalog: MacroCatalog) -> MacroProcessor {
        MacroProcessor {
            catalog,
            store: RecordStore::default(),
            rng: StdRng::from_entropy(),
        }
    }

    /// Seeded construction: fallback synthesis and collision perturbation
    /// become reproducible for a fixed file-processing order.
    pub fn with_seed(catalog: MacroCatalog, seed: u64) -> MacroProcessor {
        MacroProcessor {
            catalog,
            store: RecordStore::default(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn catalog(&self) -> &MacroCatalog {
        &self.catalog
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Replace the record store, e.g. one deserialized from a state file
    /// written by the expansion half of the job.
    pub fn set_store(&mut self, store: RecordStore) {
        self.store = store;
    }

    /// Expand macros in one file's text and store its record.
    pub fn expand_text(&mut self, text: &str, rel_path: &str) -> String {
        let (out, record) = expand::expand(text, rel_path, &mut self.catalog, &mut self.rng);
        self.store.insert(record);
        out
    }

    /// Reverse the expansion for one file: restore placeholders, prepend
    /// the diagnostic header, and consume the record.
    pub fn unexpand_text(&mut self, text: &str, rel_path: &str) -> Result<String, ProcessError> {
        let record = self
            .store
            .take(rel_path)
            .ok_or_else(|| ProcessError::MissingRecord {
                path: rel_path.to_string(),
            })?;
        let (restored, recovery) = unexpand::unexpand(text, &record);
        let timestamp = chrono::Local::now().format("%Y-%m-%dT%H:%M:%S").to_string();
        let header = unexpand::render_header(&record, &recovery, &timestamp);
        Ok(format!("{header}{restored}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processor(yaml: &str) -> MacroProcessor {
        MacroProcessor::with_seed(MacroCatalog::from_yaml_str(yaml).unwrap(), 42)
    }

    #[test]
    fn expand_then_unexpand_restores_placeholders() {
        let mut p = processor("macros:\n  \"*.sql\":\n    DB: PRODDB\n");
        let expanded = p.expand_text("SELECT * FROM ${DB}.table", "q.sql");
        assert_eq!(expanded, "SELECT * FROM PRODDB.table");

        // No-op translation.
        let restored = p.unexpand_text(&expanded, "q.sql").unwrap();
        assert!(restored.contains("{DB}.table"));
        assert!(restored.contains("USED_VARS = [\"DB\"]"));
        assert!(!restored.contains("-- sqlvar warning"));
        assert!(!restored.contains("-- sqlvar error"));
    }

    #[test]
    fn records_are_consumed_once() {
        let mut p = processor("macros:\n  \"*.sql\":\n    DB: PRODDB\n");
        let expanded = p.expand_text("${DB}", "q.sql");
        p.unexpand_text(&expanded, "q.sql").unwrap();

        let err = p.unexpand_text(&expanded, "q.sql").unwrap_err();
        assert!(matches!(err, ProcessError::MissingRecord { .. }));
    }

    #[test]
    fn unexpand_without_expand_fails() {
        let mut p = processor("macros:\n  \"*.sql\":\n    DB: PRODDB\n");
        let err = p.unexpand_text("whatever", "never-expanded.sql").unwrap_err();
        assert!(err.to_string().contains("never-expanded.sql"));
    }

    #[test]
    fn records_do_not_leak_across_files() {
        let mut p = processor("macros:\n  \"*.sql\":\n    DB: PRODDB\n");
        p.expand_text("${DB}", "a.sql");
        assert!(p.unexpand_text("PRODDB", "b.sql").is_err());
        // a.sql's record is still intact and usable.
        assert!(p.unexpand_text("PRODDB", "a.sql").is_ok());
    }

    #[test]
    fn store_survives_serialization() {
        let mut p = processor("macros:\n  \"*.sql\":\n    DB: PRODDB\n");
        let expanded = p.expand_text("SELECT ${DB}", "q.sql");

        let json = serde_json::to_string(p.store()).unwrap();
        let store: RecordStore = serde_json::from_str(&json).unwrap();

        let mut p2 = processor("macros:\n  \"*.sql\":\n    DB: PRODDB\n");
        p2.set_store(store);
        let restored = p2.unexpand_text(&expanded, "q.sql").unwrap();
        assert!(restored.contains("{DB}"));
    }
}
