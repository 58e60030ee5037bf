use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::infer;

// ---------------------------------------------------------------------------
// Macro kind
// ---------------------------------------------------------------------------

/// Semantic category of a macro's declared literal.
///
/// The kind is computed at most once (at definition time) and is immutable
/// afterwards; the collision resolver picks its perturbation strategy from it
/// and must keep the value parseable under the same kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MacroKind {
    Integer,
    Decimal,
    /// A date or datetime literal together with the strftime-style format
    /// it parses under.
    Datetime(String),
    /// A database/schema identifier. Exempt from perturbation: legitimate
    /// recurrence of the value is expected.
    Database,
    String,
}

impl fmt::Display for MacroKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MacroKind::Integer => write!(f, "integer"),
            MacroKind::Decimal => write!(f, "decimal"),
            MacroKind::Datetime(fmt_str) => write!(f, "datetime:{fmt_str}"),
            MacroKind::Database => write!(f, "database"),
            MacroKind::String => write!(f, "string"),
        }
    }
}

impl MacroKind {
    /// Parse a configuration `type` hint. `datetime:<fmt>` carries its format.
    pub fn parse_hint(hint: &str) -> Option<MacroKind> {
        match hint {
            "integer" => Some(MacroKind::Integer),
            "decimal" => Some(MacroKind::Decimal),
            "database" => Some(MacroKind::Database),
            "string" => Some(MacroKind::String),
            _ => hint
                .strip_prefix("datetime:")
                .map(|f| MacroKind::Datetime(f.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Macro definition
// ---------------------------------------------------------------------------

/// A single macro: its name, declared literal, inferred kind, and the value
/// currently used for substitution.
///
/// `declared` never changes after creation. `value` starts equal to it and is
/// mutated only by the collision resolver; it is what the unexpansion pass
/// must locate in translated text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroDef {
    pub name: String,
    pub declared: String,
    pub kind: MacroKind,
    /// True iff the declared literal starts and ends with a single quote.
    pub quote: bool,
    /// False exempts the macro from perturbation (collisions are still
    /// reported). Database-kind macros are exempt regardless.
    pub decollide: bool,
    pub value: String,
}

impl MacroDef {
    /// Build a definition from a declared literal, inferring its kind.
    pub fn new(name: &str, declared: &str) -> MacroDef {
        let declared = declared.trim().to_string();
        let kind = infer::classify(&declared);
        MacroDef {
            name: name.to_string(),
            quote: infer::is_quoted(&declared),
            decollide: true,
            value: declared.clone(),
            declared,
            kind,
        }
    }

    /// Build a definition with an explicit kind, skipping inference.
    pub fn with_kind(name: &str, declared: &str, kind: MacroKind) -> MacroDef {
        let declared = declared.trim().to_string();
        MacroDef {
            name: name.to_string(),
            quote: infer::is_quoted(&declared),
            decollide: true,
            value: declared.clone(),
            declared,
            kind,
        }
    }
}

// ---------------------------------------------------------------------------
// Diagnostics
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    Error,
    Warning,
}

/// A non-fatal finding surfaced in the unexpansion header of the file it
/// belongs to. Never thrown; processing always continues.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub code: String,
    pub severity: DiagnosticSeverity,
    pub file: String,
    pub message: String,
}

/// Diagnostic codes.
pub mod codes {
    /// Macro referenced in source but absent from configuration.
    pub const NOT_DEFINED: &str = "SQLVAR-W001";
    /// Collision not resolved within the attempt budget.
    pub const COLLIDE: &str = "SQLVAR-W002";
    /// Database-kind macro obscured by sibling macros with the same value.
    pub const DATABASE_COLLIDE: &str = "SQLVAR-W003";
    /// Recovery shortfall on a non-database macro.
    pub const RECOVERY_SHORT: &str = "SQLVAR-E001";
    /// Recovery shortfall on a database macro.
    pub const RECOVERY_SHORT_DATABASE: &str = "SQLVAR-W004";
    /// Recovery surplus (translation duplicated a reference).
    pub const RECOVERY_SURPLUS: &str = "SQLVAR-W005";
}

// ---------------------------------------------------------------------------
// Per-file expansion record
// ---------------------------------------------------------------------------

/// One expanded macro with the number of references seen in the source text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordEntry {
    pub def: MacroDef,
    pub refs: usize,
}

/// Everything the unexpansion pass needs for one file: the definitions in
/// the order they were substituted, plus expansion-time diagnostics that
/// must surface in the eventual output header.
///
/// Created at expansion time, consumed exactly once at unexpansion time,
/// keyed by the file's processing-root-relative path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpansionRecord {
    pub path: String,
    pub entries: Vec<RecordEntry>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ExpansionRecord {
    pub fn new(path: &str) -> ExpansionRecord {
        ExpansionRecord {
            path: path.to_string(),
            entries: Vec::new(),
            diagnostics: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Configuration parsing/validation failure. Fatal: aborts the job.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid macros file: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid macros file at {path}: {message}")]
    Invalid { path: String, message: String },
}

/// Per-file processing failure.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// Unexpansion was invoked without a matching prior expansion for the
    /// same relative path, or the record was already consumed.
    #[error("no expansion record for \"{path}\": expand must run first for the same relative path")]
    MissingRecord { path: String },
}
