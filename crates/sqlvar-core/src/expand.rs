//! Placeholder scanning and macro expansion.
//!
//! References use the shell-style grammar `$NAME` or `${NAME}` with
//! `NAME = [A-Za-z_][A-Za-z_0-9]*`. A backslash escapes either form: the
//! reference is neither counted nor substituted and the backslash survives
//! in the output. Substitution runs through the same scan regex, so escapes
//! behave identically in both passes.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use rand::Rng;
use regex::{Captures, Regex};

use crate::catalog::MacroCatalog;
use crate::decollide::{self, ResolveOutcome};
use crate::types::{
    codes, Diagnostic, DiagnosticSeverity, ExpansionRecord, MacroDef, MacroKind, RecordEntry,
};

static RE_MACRO_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\\)?\$(?:\{([A-Za-z_][A-Za-z_0-9]*)\}|([A-Za-z_][A-Za-z_0-9]*))").unwrap()
});

/// Names that are never treated as macro references.
const RESERVED_NAMES: &[&str] = &["HEADER", "Workfile"];

/// Count unescaped macro references per name. The `BTreeMap` gives callers
/// lexical iteration order, which fixes the collision-resolution order and
/// makes runs reproducible.
pub fn used_macros(text: &str) -> BTreeMap<String, usize> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for caps in RE_MACRO_REF.captures_iter(text) {
        if caps.get(1).is_some() {
            continue;
        }
        let name = match caps.get(2).or_else(|| caps.get(3)) {
            Some(m) => m.as_str(),
            None => continue,
        };
        if RESERVED_NAMES.contains(&name) {
            continue;
        }
        *counts.entry(name.to_string()).or_insert(0) += 1;
    }
    counts
}

/// Expand every macro referenced in `text`, resolving collisions against
/// the progressively substituted text, and return the expanded text plus
/// the record needed to reverse the operation after translation.
///
/// Undeclared macros get a synthesized fallback from the catalog (shared
/// job-wide, so the warning fires only for the file that first triggers
/// the synthesis).
pub fn expand(
    text: &str,
    rel_path: &str,
    catalog: &mut MacroCatalog,
    rng: &mut impl Rng,
) -> (String, ExpansionRecord) {
    let used = used_macros(text);
    let mut out = text.to_string();
    let mut record = ExpansionRecord::new(rel_path);

    for (name, refs) in &used {
        let mut def = match catalog.lookup(rel_path, name) {
            Some(entry) => entry.to_def(),
            None => {
                let (value, fresh) = catalog.fallback(name, rng);
                if fresh {
                    record.diagnostics.push(Diagnostic {
                        code: codes::NOT_DEFINED.to_string(),
                        severity: DiagnosticSeverity::Warning,
                        file: rel_path.to_string(),
                        message: format!(
                            "macro not defined: {name}, using fallback \"{value}\""
                        ),
                    });
                }
                MacroDef::new(name, &value)
            }
        };

        match decollide::resolve(&mut def, &out, decollide::MAX_ATTEMPTS, rng) {
            ResolveOutcome::Clean => {}
            ResolveOutcome::Exhausted => {
                record.diagnostics.push(Diagnostic {
                    code: codes::COLLIDE.to_string(),
                    severity: DiagnosticSeverity::Warning,
                    file: rel_path.to_string(),
                    message: format!(
                        "macro collide: {name} value {} still occurs after {} attempts",
                        def.value,
                        decollide::MAX_ATTEMPTS
                    ),
                });
            }
            ResolveOutcome::Skipped => {
                if def.kind == MacroKind::Database {
                    let obscured: Vec<String> = used
                        .keys()
                        .filter(|other| other.as_str() != name)
                        .filter(|other| {
                            catalog.lookup(rel_path, other).is_some_and(|e| {
                                let sibling = e.to_def();
                                sibling.kind == MacroKind::Database && sibling.value == def.value
                            })
                        })
                        .cloned()
                        .collect();
                    record.diagnostics.push(Diagnostic {
                        code: codes::DATABASE_COLLIDE.to_string(),
                        severity: DiagnosticSeverity::Warning,
                        file: rel_path.to_string(),
                        message: format!(
                            "macro database collide: {name} value {} obscured by [{}]",
                            def.value,
                            obscured.join(", ")
                        ),
                    });
                } else {
                    record.diagnostics.push(Diagnostic {
                        code: codes::COLLIDE.to_string(),
                        severity: DiagnosticSeverity::Warning,
                        file: rel_path.to_string(),
                        message: format!(
                            "macro collide: {name} value {} (perturbation disabled)",
                            def.value
                        ),
                    });
                }
            }
        }

        out = substitute(&out, name, &def.value);
        record.entries.push(RecordEntry { def, refs: *refs });
    }

    (out, record)
}

/// Replace every unescaped reference to `name` (both syntaxes) with `value`.
/// Escaped references and other names pass through byte-for-byte.
fn substitute(text: &str, name: &str, value: &str) -> String {
    RE_MACRO_REF
        .replace_all(text, |caps: &Captures| {
            let matched = caps
                .get(2)
                .or_else(|| caps.get(3))
                .map(|m| m.as_str());
            if caps.get(1).is_some() || matched != Some(name) {
                caps[0].to_string()
            } else {
                value.to_string()
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    fn catalog(yaml: &str) -> MacroCatalog {
        MacroCatalog::from_yaml_str(yaml).unwrap()
    }

    #[test]
    fn counts_both_reference_syntaxes() {
        let used = used_macros("SELECT $DB, ${DB}, ${OTHER} FROM t");
        assert_eq!(used.get("DB"), Some(&2));
        assert_eq!(used.get("OTHER"), Some(&1));
    }

    #[test]
    fn escaped_references_are_not_counted() {
        let used = used_macros(r"\$DB and \${DB} but $DB");
        assert_eq!(used.get("DB"), Some(&1));
    }

    #[test]
    fn reserved_names_are_ignored() {
        let used = used_macros("$HEADER $Workfile $DB");
        assert_eq!(used.len(), 1);
        assert!(used.contains_key("DB"));
    }

    #[test]
    fn expands_simple_reference() {
        let mut cat = catalog("macros:\n  \"*.sql\":\n    DB: PRODDB\n");
        let (out, record) =
            expand("SELECT * FROM ${DB}.table", "q.sql", &mut cat, &mut rng());
        assert_eq!(out, "SELECT * FROM PRODDB.table");
        assert_eq!(record.entries.len(), 1);
        assert_eq!(record.entries[0].def.name, "DB");
        assert_eq!(record.entries[0].refs, 1);
        assert!(record.diagnostics.is_empty());
    }

    #[test]
    fn expands_both_syntaxes_of_one_name() {
        let mut cat = catalog("macros:\n  \"*.sql\":\n    DB: PRODDB\n");
        let (out, record) = expand("$DB ${DB}", "q.sql", &mut cat, &mut rng());
        assert_eq!(out, "PRODDB PRODDB");
        assert_eq!(record.entries[0].refs, 2);
    }

    #[test]
    fn escaped_reference_survives_with_backslash() {
        let mut cat = catalog("macros:\n  \"*.sql\":\n    DB: PRODDB\n");
        let (out, _) = expand(r"\$DB and \${DB} and $DB", "q.sql", &mut cat, &mut rng());
        assert_eq!(out, r"\$DB and \${DB} and PRODDB");
    }

    #[test]
    fn name_matching_is_longest_token() {
        let mut cat = catalog("macros:\n  \"*.sql\":\n    DB: PRODDB\n    DBX: OTHERDB\n");
        let (out, _) = expand("$DBX ${DB}X", "q.sql", &mut cat, &mut rng());
        assert_eq!(out, "OTHERDB PRODDBX");
    }

    #[test]
    fn undeclared_macro_gets_fallback_and_diagnostic() {
        let mut cat = catalog("macros:\n  \"*.sql\":\n    DB: PRODDB\n");
        let (out, record) = expand("x $MYSTERY y", "q.sql", &mut cat, &mut rng());
        assert_eq!(record.entries.len(), 1);
        let value = record.entries[0].def.value.clone();
        assert!(!value.is_empty());
        assert_eq!(out, format!("x {value} y"));
        assert_eq!(record.diagnostics.len(), 1);
        assert_eq!(record.diagnostics[0].code, codes::NOT_DEFINED);
        assert!(record.diagnostics[0].message.contains("MYSTERY"));
    }

    #[test]
    fn fallback_warning_fires_only_once_per_job() {
        let mut cat = catalog("macros:\n  \"*.sql\":\n    DB: PRODDB\n");
        let mut r = rng();
        let (_, first) = expand("$MYSTERY", "a.sql", &mut cat, &mut r);
        let (_, second) = expand("$MYSTERY", "b.sql", &mut cat, &mut r);
        assert_eq!(first.diagnostics.len(), 1);
        assert!(second.diagnostics.is_empty());
        // Both files must have received the same memoized fallback.
        assert_eq!(first.entries[0].def.declared, second.entries[0].def.declared);
    }

    #[test]
    fn value_already_in_text_is_perturbed() {
        let mut cat = catalog("macros:\n  \"*.sql\":\n    STATE: active\n");
        let (out, record) = expand(
            "WHERE state = 'active' OR state = '${STATE}'",
            "q.sql",
            &mut cat,
            &mut rng(),
        );
        let value = &record.entries[0].def.value;
        assert_ne!(value, "active");
        assert!(out.contains(value.as_str()));
        assert!(record.diagnostics.is_empty());
    }

    #[test]
    fn sibling_macros_with_equal_values_diverge() {
        let mut cat = catalog("macros:\n  \"*.sql\":\n    A: shared\n    B: shared\n");
        let (_, record) = expand("${A} ${B}", "q.sql", &mut cat, &mut rng());
        let a = &record.entries[0].def.value;
        let b = &record.entries[1].def.value;
        assert_ne!(a, b, "second macro must decollide from the first");
    }

    #[test]
    fn obscured_database_macros_are_reported_not_fixed() {
        let mut cat = catalog(
            "macros:\n  \"*.sql\":\n    DBA: COM_CAP_VM_MM2_CY2\n    DBB: COM_CAP_VM_MM2_CY2\n",
        );
        let (out, record) = expand("${DBA} ${DBB}", "q.sql", &mut cat, &mut rng());
        // Neither value is perturbed.
        assert_eq!(out, "COM_CAP_VM_MM2_CY2 COM_CAP_VM_MM2_CY2");
        let diag = record
            .diagnostics
            .iter()
            .find(|d| d.code == codes::DATABASE_COLLIDE)
            .expect("database collide diagnostic");
        assert!(diag.message.contains("DBA"), "obscured sibling named: {}", diag.message);
    }

    #[test]
    fn entries_are_recorded_in_lexical_order() {
        let mut cat = catalog("macros:\n  \"*.sql\":\n    ZED: z1\n    ALPHA: a1\n    MID: m1\n");
        let (_, record) = expand("$ZED $MID $ALPHA", "q.sql", &mut cat, &mut rng());
        let names: Vec<&str> = record.entries.iter().map(|e| e.def.name.as_str()).collect();
        assert_eq!(names, vec!["ALPHA", "MID", "ZED"]);
    }
}
