//! Macro catalog: the declarative mapping from file-name glob pattern to
//! macro name to declared value, parsed from the macros YAML document.
//!
//! The YAML mapping is walked in document order and kept in a `Vec`, so
//! pattern precedence is deterministic: the first matching pattern that
//! declares a name wins. Macros referenced in source but absent here get a
//! synthesized fallback value, memoized on the catalog so every file in the
//! job sees the same fallback.

use std::collections::HashMap;

use glob::Pattern;
use rand::Rng;

use crate::decollide;
use crate::types::{ConfigError, MacroDef, MacroKind};

/// Fixed fallback for the batch-date macro.
const BATCH_DATE_FALLBACK: &str = "2021-01-02 11:22:33";
const BATCH_DATE_NAME: &str = "KNB_BATCH_DATE";
const BATCH_NAME_NAME: &str = "KNB_BATCH_NAME";

// ---------------------------------------------------------------------------
// Catalog entry
// ---------------------------------------------------------------------------

/// One configured macro under a file pattern, normalized from either the
/// plain-string or the structured configuration shape.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogEntry {
    pub name: String,
    pub declared: String,
    /// Explicit kind hint from configuration; `None` means infer from the
    /// literal at definition time.
    pub kind: Option<MacroKind>,
    pub decollide: bool,
}

impl CatalogEntry {
    /// Materialize a definition, honoring the kind hint when present.
    pub fn to_def(&self) -> MacroDef {
        let mut def = match &self.kind {
            Some(kind) => MacroDef::with_kind(&self.name, &self.declared, kind.clone()),
            None => MacroDef::new(&self.name, &self.declared),
        };
        def.decollide = self.decollide;
        def
    }
}

#[derive(Debug, Clone)]
struct PatternBlock {
    pattern: Pattern,
    source: String,
    entries: Vec<CatalogEntry>,
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct MacroCatalog {
    blocks: Vec<PatternBlock>,
    /// Synthesized values for macros missing from configuration, shared
    /// across all files of the job.
    fallbacks: HashMap<String, String>,
}

impl MacroCatalog {
    /// Parse and validate a macros YAML document:
    ///
    /// ```yaml
    /// macros:
    ///   "*.sql":
    ///     "${DB}": PRODDB
    ///     "${COUNT}":
    ///       value: "42"
    ///       type: integer
    ///       decollide: false
    /// ```
    ///
    /// Macro keys may be written bare, `$NAME`, or `${NAME}`. Malformed
    /// documents fail with an error naming the offending path.
    pub fn from_yaml_str(text: &str) -> Result<MacroCatalog, ConfigError> {
        let doc: serde_yaml::Value = serde_yaml::from_str(text)?;
        let macros = doc
            .get("macros")
            .ok_or_else(|| invalid("macros", "missing required key"))?;
        let macro_map = macros
            .as_mapping()
            .ok_or_else(|| invalid("macros", "must be a mapping of file patterns"))?;
        if macro_map.is_empty() {
            return Err(invalid("macros", "must not be empty"));
        }

        let mut blocks = Vec::new();
        for (pattern_key, names) in macro_map {
            let pattern_text = pattern_key
                .as_str()
                .ok_or_else(|| invalid("macros", "file pattern keys must be strings"))?;
            let here = format!("macros.\"{pattern_text}\"");
            let pattern = Pattern::new(pattern_text)
                .map_err(|e| invalid(&here, &format!("invalid glob pattern: {e}")))?;
            let names = names
                .as_mapping()
                .ok_or_else(|| invalid(&here, "must be a mapping of macro names to values"))?;
            if names.is_empty() {
                return Err(invalid(&here, "must not be empty"));
            }

            let mut entries = Vec::new();
            for (name_key, value) in names {
                let raw_name = name_key
                    .as_str()
                    .ok_or_else(|| invalid(&here, "macro names must be strings"))?;
                let at = format!("{here}.\"{raw_name}\"");
                let name = normalize_name(raw_name);
                if name.is_empty() {
                    return Err(invalid(&at, "macro name must not be empty"));
                }
                entries.push(parse_entry(name, value, &at)?);
            }
            blocks.push(PatternBlock {
                pattern,
                source: pattern_text.to_string(),
                entries,
            });
        }

        Ok(MacroCatalog {
            blocks,
            fallbacks: HashMap::new(),
        })
    }

    /// Find the definition of `name` applicable to `rel_path`: first
    /// matching pattern block (in document order) that declares the name.
    pub fn lookup(&self, rel_path: &str, name: &str) -> Option<&CatalogEntry> {
        self.blocks
            .iter()
            .filter(|b| b.pattern.matches(rel_path))
            .find_map(|b| b.entries.iter().find(|e| e.name == name))
    }

    /// Synthesized value for a macro missing from configuration. Returns
    /// the value and whether it was created by this call (as opposed to
    /// reused from an earlier file).
    pub fn fallback(&mut self, name: &str, rng: &mut impl Rng) -> (String, bool) {
        if let Some(existing) = self.fallbacks.get(name) {
            return (existing.clone(), false);
        }
        let value = match name {
            BATCH_DATE_NAME => BATCH_DATE_FALLBACK.to_string(),
            BATCH_NAME_NAME => decollide::random_run(8, rng),
            _ => decollide::random_run(1, rng),
        };
        tracing::warn!(
            macro_name = name,
            value = %value,
            "macro not defined in configuration, using synthesized fallback"
        );
        self.fallbacks.insert(name.to_string(), value.clone());
        (value, true)
    }

    /// Iterate pattern blocks in document order (for reporting).
    pub fn patterns(&self) -> impl Iterator<Item = (&str, &[CatalogEntry])> {
        self.blocks
            .iter()
            .map(|b| (b.source.as_str(), b.entries.as_slice()))
    }
}

/// Strip the placeholder wrapper from a configured macro key: `${NAME}` and
/// `$NAME` both normalize to `NAME`.
fn normalize_name(raw: &str) -> String {
    if let Some(inner) = raw.strip_prefix("${").and_then(|r| r.strip_suffix('}')) {
        inner.to_string()
    } else if let Some(inner) = raw.strip_prefix('$') {
        inner.to_string()
    } else {
        raw.to_string()
    }
}

fn parse_entry(
    name: String,
    value: &serde_yaml::Value,
    at: &str,
) -> Result<CatalogEntry, ConfigError> {
    match value {
        serde_yaml::Value::String(s) => {
            if s.trim().is_empty() {
                return Err(invalid(at, "value must not be empty"));
            }
            Ok(CatalogEntry {
                name,
                declared: s.clone(),
                kind: None,
                decollide: true,
            })
        }
        serde_yaml::Value::Mapping(_) => {
            let declared = value
                .get("value")
                .ok_or_else(|| invalid(at, "structured entries require a \"value\" key"))?
                .as_str()
                .ok_or_else(|| invalid(&format!("{at}.value"), "must be a string"))?;
            if declared.trim().is_empty() {
                return Err(invalid(&format!("{at}.value"), "value must not be empty"));
            }
            let kind = match value.get("type") {
                None => None,
                Some(v) => {
                    let hint = v
                        .as_str()
                        .ok_or_else(|| invalid(&format!("{at}.type"), "must be a string"))?;
                    Some(MacroKind::parse_hint(hint).ok_or_else(|| {
                        invalid(&format!("{at}.type"), &format!("unknown macro type \"{hint}\""))
                    })?)
                }
            };
            let decollide = match value.get("decollide") {
                None => true,
                Some(v) => v
                    .as_bool()
                    .ok_or_else(|| invalid(&format!("{at}.decollide"), "must be a boolean"))?,
            };
            Ok(CatalogEntry {
                name,
                declared: declared.to_string(),
                kind,
                decollide,
            })
        }
        _ => Err(invalid(
            at,
            "must be a string or a { value, type, decollide } mapping",
        )),
    }
}

fn invalid(path: &str, message: &str) -> ConfigError {
    ConfigError::Invalid {
        path: path.to_string(),
        message: message.to_string(),
    }
}
