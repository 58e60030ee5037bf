use sqlvar_core::{MacroCatalog, MacroProcessor};

// ---------------------------------------------------------------------------
// Helper: one processor per scenario, seeded for reproducibility
// ---------------------------------------------------------------------------
fn processor(yaml: &str) -> MacroProcessor {
    MacroProcessor::with_seed(MacroCatalog::from_yaml_str(yaml).unwrap(), 1234)
}

const CATALOG: &str = r#"
macros:
  "*.sql":
    "${DB}": PRODDB
    "${BATCH_ID}": "42"
    "${RATE}": "5.0"
    "${LOAD_DATE}": "2012-10-18"
    "${REGION}": "'emea'"
"#;

#[test]
fn roundtrip_noop_translation() {
    let input = "SELECT * FROM ${DB}.orders\n\
                 WHERE load_date = '${LOAD_DATE}'\n\
                   AND batch = $BATCH_ID\n\
                   AND rate > $RATE\n\
                   AND region = ${REGION}\n";
    let mut p = processor(CATALOG);
    let expanded = p.expand_text(input, "q.sql");

    assert!(expanded.contains("PRODDB.orders"));
    assert!(expanded.contains("'2012-10-18'"));
    assert!(expanded.contains("batch = 42"));
    assert!(expanded.contains("rate > 5.0"));
    assert!(!expanded.contains('$'), "no placeholder may survive expansion");

    let restored = p.unexpand_text(&expanded, "q.sql").unwrap();
    assert!(restored.contains("{DB}.orders"));
    assert!(restored.contains("'{LOAD_DATE}'"));
    assert!(restored.contains("batch = {BATCH_ID}"));
    assert!(restored.contains("rate > {RATE}"));
    assert!(restored.contains("{REGION}"));
    assert!(
        restored.contains("USED_VARS = [\"BATCH_ID\", \"DB\", \"LOAD_DATE\", \"RATE\", \"REGION\"]"),
        "header must list used macros sorted: {restored}"
    );
    assert!(!restored.contains("-- sqlvar error"));
    assert!(!restored.contains("-- sqlvar warning"));
}

#[test]
fn roundtrip_survives_case_folding_translator() {
    let mut p = processor(CATALOG);
    let expanded = p.expand_text("select * from ${DB}.t where r = ${REGION}", "q.sql");

    // A translator that upper-cases the whole statement.
    let translated = expanded.to_uppercase();

    let restored = p.unexpand_text(&translated, "q.sql").unwrap();
    assert!(restored.contains("{DB}.T"));
    assert!(restored.contains("{REGION}"));
    assert!(!restored.contains("-- sqlvar error"));
}

#[test]
fn deleted_occurrence_is_reported_not_thrown() {
    let mut p = processor(CATALOG);
    p.expand_text("SELECT ${BATCH_ID} FROM ${DB}.t", "q.sql");

    // The translator dropped the batch column entirely.
    let translated = "SELECT 1 FROM PRODDB.t";

    let restored = p.unexpand_text(translated, "q.sql").unwrap();
    assert!(restored.contains("{DB}.t"));
    assert!(restored.contains("-- sqlvar error"));
    assert!(restored.contains("macro BATCH_ID"));
}

#[test]
fn escaped_reference_is_never_expanded() {
    let mut p = processor(CATALOG);
    let expanded = p.expand_text(r"SELECT '\$DB' FROM ${DB}.t", "q.sql");
    assert!(expanded.contains(r"\$DB"), "escape must survive expansion");
    assert!(expanded.contains("PRODDB.t"));

    let restored = p.unexpand_text(&expanded, "q.sql").unwrap();
    assert!(restored.contains(r"\$DB"), "escape must survive unexpansion");
    assert!(restored.contains("{DB}.t"));
}

#[test]
fn value_colliding_with_source_text_still_roundtrips() {
    let yaml = "macros:\n  \"*.sql\":\n    STATE: active\n";
    let input = "WHERE state = 'active' OR state = '${STATE}'";
    let mut p = processor(yaml);
    let expanded = p.expand_text(input, "q.sql");

    let restored = p.unexpand_text(&expanded, "q.sql").unwrap();
    assert!(
        restored.contains("'active'"),
        "pre-existing literal must be untouched: {restored}"
    );
    assert!(restored.contains("'{STATE}'"));
    assert!(!restored.contains("-- sqlvar error"));
}

#[test]
fn undeclared_macro_roundtrips_with_warning_header() {
    let mut p = processor(CATALOG);
    let expanded = p.expand_text("SELECT $NOT_IN_CONFIG FROM ${DB}.t", "q.sql");
    let restored = p.unexpand_text(&expanded, "q.sql").unwrap();

    assert!(restored.contains("{NOT_IN_CONFIG}"));
    assert!(restored.contains("macro not defined: NOT_IN_CONFIG"));
    assert!(restored.contains("-- sqlvar warning"));
}

#[test]
fn files_are_independent_jobs_under_one_catalog() {
    let mut p = processor(CATALOG);
    let e1 = p.expand_text("SELECT ${DB}", "a/one.sql");
    let e2 = p.expand_text("SELECT ${BATCH_ID}", "b/two.sql");

    let r2 = p.unexpand_text(&e2, "b/two.sql").unwrap();
    let r1 = p.unexpand_text(&e1, "a/one.sql").unwrap();

    assert!(r1.contains("{DB}"));
    assert!(!r1.contains("{BATCH_ID}"));
    assert!(r2.contains("{BATCH_ID}"));
    assert!(!r2.contains("{DB}"));
}

#[test]
fn quoted_literal_tolerates_translator_padding() {
    let mut p = processor("macros:\n  \"*.sql\":\n    NAME: azerty\n");
    p.expand_text("WHERE n = '${NAME}'", "q.sql");

    // The translator padded the literal inside its quotes.
    let translated = "WHERE n = 'azerty   '";
    let restored = p.unexpand_text(translated, "q.sql").unwrap();
    assert!(restored.contains("'{NAME}'"), "padded quoted literal: {restored}");
    assert!(!restored.contains("-- sqlvar error"));
}
