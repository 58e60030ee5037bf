mod walker;

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};

use sqlvar_core::{MacroCatalog, MacroProcessor, RecordStore};
use walker::{is_processable, walk};

#[derive(Parser)]
#[command(
    name = "sqlvar",
    version,
    about = "Reversible SQL macro substitution - expand shell-style placeholders before translation, restore them after"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Expand macros in every processable file under a directory
    Expand {
        /// Input directory
        input: PathBuf,

        /// Output directory for expanded files
        output: PathBuf,

        /// Macros configuration file (YAML)
        #[arg(short, long)]
        macros: PathBuf,

        /// Expansion state file (defaults to <output>/.sqlvar-state.json)
        #[arg(long)]
        state: Option<PathBuf>,

        /// Seed for reproducible fallback synthesis and perturbation
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Restore placeholders in translated files from an expansion state file
    Unexpand {
        /// Directory of translated files
        input: PathBuf,

        /// Output directory for restored files
        output: PathBuf,

        /// Expansion state file written by `expand`
        #[arg(long)]
        state: PathBuf,
    },

    /// Show configured macros with their inferred kinds
    Inspect {
        /// Macros configuration file (YAML)
        #[arg(short, long)]
        macros: PathBuf,

        /// Output format: human (default) or json
        #[arg(long, default_value = "human")]
        format: String,
    },
}

fn main() {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Expand {
            input,
            output,
            macros,
            state,
            seed,
        } => match run_expand(&input, &output, &macros, state.as_deref(), seed) {
            Ok(summary) => {
                println!("{summary}");
            }
            Err(e) => {
                eprintln!("Error: {e}");
                process::exit(1);
            }
        },
        Commands::Unexpand {
            input,
            output,
            state,
        } => match run_unexpand(&input, &output, &state) {
            Ok((summary, failures)) => {
                println!("{summary}");
                if failures > 0 {
                    process::exit(1);
                }
            }
            Err(e) => {
                eprintln!("Error: {e}");
                process::exit(1);
            }
        },
        Commands::Inspect { macros, format } => match run_inspect(&macros, &format) {
            Ok(output) => {
                println!("{output}");
            }
            Err(e) => {
                eprintln!("Error: {e}");
                process::exit(1);
            }
        },
    }
}

fn load_catalog(macros_path: &Path) -> Result<MacroCatalog, String> {
    let yaml = fs::read_to_string(macros_path)
        .map_err(|e| format!("Failed to read {}: {e}", macros_path.display()))?;
    MacroCatalog::from_yaml_str(&yaml)
        .map_err(|e| format!("{}: {e}", macros_path.display()))
}

fn run_expand(
    input: &Path,
    output: &Path,
    macros_path: &Path,
    state: Option<&Path>,
    seed: Option<u64>,
) -> Result<String, String> {
    let catalog = load_catalog(macros_path)?;
    let mut processor = match seed {
        Some(s) => MacroProcessor::with_seed(catalog, s),
        None => MacroProcessor::new(catalog),
    };

    let files = walk(input)?;
    let mut expanded = 0usize;
    let mut copied = 0usize;

    for file in &files {
        let target = output.join(&file.rel);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create {}: {e}", parent.display()))?;
        }
        if !is_processable(&file.rel) {
            fs::copy(&file.path, &target)
                .map_err(|e| format!("Failed to copy {}: {e}", file.path.display()))?;
            copied += 1;
            continue;
        }
        tracing::info!(file = %file.rel, "expanding");
        let text = fs::read_to_string(&file.path)
            .map_err(|e| format!("Failed to read {}: {e}", file.path.display()))?;
        let out = processor.expand_text(&text, &file.rel);
        fs::write(&target, out)
            .map_err(|e| format!("Failed to write {}: {e}", target.display()))?;
        expanded += 1;
    }

    let state_path = match state {
        Some(p) => p.to_path_buf(),
        None => output.join(".sqlvar-state.json"),
    };
    let json = serde_json::to_string_pretty(processor.store())
        .map_err(|e| format!("State serialization error: {e}"))?;
    fs::write(&state_path, json)
        .map_err(|e| format!("Failed to write {}: {e}", state_path.display()))?;

    Ok(format!(
        "{expanded} expanded, {copied} copied verbatim; state written to {}",
        state_path.display()
    ))
}

fn run_unexpand(input: &Path, output: &Path, state_path: &Path) -> Result<(String, usize), String> {
    let json = fs::read_to_string(state_path)
        .map_err(|e| format!("Failed to read {}: {e}", state_path.display()))?;
    let store: RecordStore = serde_json::from_str(&json)
        .map_err(|e| format!("Invalid state file {}: {e}", state_path.display()))?;

    let mut processor = MacroProcessor::new(MacroCatalog::default());
    processor.set_store(store);

    let files = walk(input)?;
    let mut restored = 0usize;
    let mut copied = 0usize;
    let mut failures = 0usize;

    for file in &files {
        let target = output.join(&file.rel);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create {}: {e}", parent.display()))?;
        }
        if !is_processable(&file.rel) {
            fs::copy(&file.path, &target)
                .map_err(|e| format!("Failed to copy {}: {e}", file.path.display()))?;
            copied += 1;
            continue;
        }
        tracing::info!(file = %file.rel, "restoring");
        let text = fs::read_to_string(&file.path)
            .map_err(|e| format!("Failed to read {}: {e}", file.path.display()))?;
        match processor.unexpand_text(&text, &file.rel) {
            Ok(out) => {
                fs::write(&target, out)
                    .map_err(|e| format!("Failed to write {}: {e}", target.display()))?;
                restored += 1;
            }
            Err(e) => {
                tracing::error!(file = %file.rel, "{e}");
                failures += 1;
            }
        }
    }

    Ok((
        format!("{restored} restored, {copied} copied verbatim, {failures} failed"),
        failures,
    ))
}

fn run_inspect(macros_path: &Path, format: &str) -> Result<String, String> {
    let catalog = load_catalog(macros_path)?;

    if format == "json" {
        let patterns: Vec<serde_json::Value> = catalog
            .patterns()
            .map(|(pattern, entries)| {
                let macros: Vec<serde_json::Value> = entries
                    .iter()
                    .map(|e| {
                        let def = e.to_def();
                        serde_json::json!({
                            "name": def.name,
                            "value": def.declared,
                            "kind": def.kind.to_string(),
                            "quote": def.quote,
                            "decollide": def.decollide,
                        })
                    })
                    .collect();
                serde_json::json!({ "pattern": pattern, "macros": macros })
            })
            .collect();
        return serde_json::to_string_pretty(&patterns)
            .map_err(|e| format!("JSON serialization error: {e}"));
    }

    // Human-readable format
    let mut lines: Vec<String> = Vec::new();
    for (pattern, entries) in catalog.patterns() {
        lines.push(format!("{pattern}:"));
        for e in entries {
            let def = e.to_def();
            let quote = if def.quote { ", quoted" } else { "" };
            let decollide = if def.decollide { "" } else { ", no-decollide" };
            lines.push(format!(
                "  {} = {} ({}{quote}{decollide})",
                def.name, def.declared, def.kind
            ));
        }
    }
    Ok(lines.join("\n"))
}
