//! Reverse search-and-replace: locate each macro's (possibly case-folded)
//! value in translated text and restore a placeholder in the output
//! dialect's braces syntax `{NAME}`.
//!
//! Recovery is best-effort. The translator is an uncontrolled
//! transformation; when it deletes or rewrites a value's occurrence the
//! mismatch is reported in the diagnostic header, never thrown.

use regex::{NoExpand, Regex};

use crate::types::{
    codes, Diagnostic, DiagnosticSeverity, ExpansionRecord, MacroKind,
};

/// Marker the translator inserts for unqualified names; it has no
/// placeholder equivalent and is stripped outright.
const DEFAULT_DATABASE_MARKER: &str = "__DEFAULT_DATABASE__.";

/// Restore placeholders in `text` from the expansion record of the same
/// file. Returns the restored text and the recovery-audit diagnostics.
pub fn unexpand(text: &str, record: &ExpansionRecord) -> (String, Vec<Diagnostic>) {
    let mut out = text.to_string();

    // Longest value first, so a shorter value is never replaced inside a
    // longer value's occurrence.
    let mut ordered: Vec<_> = record.entries.iter().collect();
    ordered.sort_by(|a, b| b.def.value.len().cmp(&a.def.value.len()));

    for entry in &ordered {
        let value = &entry.def.value;
        let placeholder = placeholder(&entry.def.name);

        // Quote-tolerant pass: the translator may pad a quoted literal with
        // trailing blanks before the closing quote.
        if let Ok(re) = Regex::new(&format!("(?i)'{} *'", regex::escape(value))) {
            let quoted = format!("'{placeholder}'");
            out = re.replace_all(&out, NoExpand(&quoted)).into_owned();
        }

        out = out.replace(value, &placeholder);
        out = out.replace(&value.to_lowercase(), &placeholder);
        out = out.replace(&value.to_uppercase(), &placeholder);

        // Comma-separated quoted lists may come back re-spaced.
        if value.contains("','") {
            out = out.replace(&value.replace("','", "', '"), &placeholder);
        }
    }

    out = out.replace(DEFAULT_DATABASE_MARKER, "");

    let diagnostics = audit(&out, record);
    (out, diagnostics)
}

/// Compare placeholder counts in the restored text against the reference
/// counts recorded at expansion time.
fn audit(restored: &str, record: &ExpansionRecord) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    for entry in &record.entries {
        let name = &entry.def.name;
        let found = restored.matches(&placeholder(name)).count();
        if found < entry.refs {
            let database = entry.def.kind == MacroKind::Database;
            let (code, severity) = if database {
                (codes::RECOVERY_SHORT_DATABASE, DiagnosticSeverity::Warning)
            } else {
                (codes::RECOVERY_SHORT, DiagnosticSeverity::Error)
            };
            diagnostics.push(Diagnostic {
                code: code.to_string(),
                severity,
                file: record.path.clone(),
                message: format!(
                    "macro {name}: expected {} references, recovered {found} (searched value \"{}\")",
                    entry.refs, entry.def.value
                ),
            });
        } else if found > entry.refs {
            diagnostics.push(Diagnostic {
                code: codes::RECOVERY_SURPLUS.to_string(),
                severity: DiagnosticSeverity::Warning,
                file: record.path.clone(),
                message: format!(
                    "macro {name}: expected {} references, recovered {found}; translation may have duplicated it",
                    entry.refs
                ),
            });
        }
    }
    diagnostics
}

/// Diagnostic header prepended to the restored text: generation timestamp,
/// the macro names used, and one comment line per diagnostic.
pub fn render_header(
    record: &ExpansionRecord,
    recovery: &[Diagnostic],
    timestamp: &str,
) -> String {
    let mut names: Vec<&str> = record.entries.iter().map(|e| e.def.name.as_str()).collect();
    names.sort_unstable();
    let used = names
        .iter()
        .map(|n| format!("\"{n}\""))
        .collect::<Vec<_>>()
        .join(", ");

    let mut header = format!(
        "-- generated by sqlvar at {timestamp}\n-- USED_VARS = [{used}]\n\n"
    );
    let mut any = false;
    for d in recovery.iter().chain(record.diagnostics.iter()) {
        let severity = match d.severity {
            DiagnosticSeverity::Error => "error",
            DiagnosticSeverity::Warning => "warning",
        };
        header.push_str(&format!("-- sqlvar {severity}[{}]: {}\n", d.code, d.message));
        any = true;
    }
    if any {
        header.push('\n');
    }
    header
}

fn placeholder(name: &str) -> String {
    format!("{{{name}}}")
}
