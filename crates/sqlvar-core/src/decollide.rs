//! Collision detection and value perturbation.
//!
//! A collision exists when a macro's current value already occurs
//! (case-insensitively) in the text it is about to be substituted into -
//! after translation the reverse search could then hit the wrong span. The
//! resolver perturbs the value until it is unique in the context, with a
//! kind-specific strategy that keeps the value's lexical shape intact, and
//! a bounded attempt budget so the loop terminates regardless of
//! random-number outcomes.

use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{Datelike, Duration};
use rand::Rng;
use rust_decimal::Decimal;

use crate::infer;
use crate::types::{MacroDef, MacroKind};

/// Attempt budget for one macro.
pub const MAX_ATTEMPTS: u32 = 100;

/// Numeric values at or above this shift downward, smaller values shift
/// upward. Keeps small values from going negative and large ones from
/// growing a digit.
const NUMERIC_PIVOT: i64 = 32_000;

const ALPHABET: &str = "abcdefghijklmnopqrstuvwxyz0123456789";

/// Extended Latin letters with no decomposition. Splicing these into a
/// string value makes an accidental second occurrence in SQL text
/// vanishingly unlikely.
const ALPHABET_COMPLEX: &str = "ƀƃƅƈƌƒƙƚƛƞơƣƥƨƪƫƭưƴƶƹƻƽƿ";

static ALPHABET_FULL: LazyLock<Vec<char>> = LazyLock::new(|| {
    ALPHABET.chars().chain(ALPHABET_COMPLEX.chars()).collect()
});

/// Outcome of a resolution run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveOutcome {
    /// The value does not occur in the context (possibly after perturbation).
    Clean,
    /// The value collides but the macro is exempt from perturbation
    /// (database kind, or `decollide: false`).
    Skipped,
    /// The attempt budget ran out; the last perturbed value is kept.
    Exhausted,
}

/// Case-insensitive occurrence check of `value` inside `context`.
pub fn collides(value: &str, context: &str) -> bool {
    context.to_lowercase().contains(&value.to_lowercase())
}

/// Perturb `def`'s value until it no longer occurs in `context`, up to
/// `max_attempts` times. Each attempt derives from the declared literal, not
/// from the previous attempt, so the drift stays bounded.
pub fn resolve(
    def: &mut MacroDef,
    context: &str,
    max_attempts: u32,
    rng: &mut impl Rng,
) -> ResolveOutcome {
    if !collides(&def.value, context) {
        return ResolveOutcome::Clean;
    }
    if def.kind == MacroKind::Database || !def.decollide {
        return ResolveOutcome::Skipped;
    }

    for attempt in 1..=max_attempts {
        def.value = perturb(def, complexity(attempt), rng);
        if !collides(&def.value, context) {
            return ResolveOutcome::Clean;
        }
    }
    ResolveOutcome::Exhausted
}

/// One perturbation of the declared literal, by kind. Database values are
/// returned unchanged.
pub fn perturb(def: &MacroDef, cplx: usize, rng: &mut impl Rng) -> String {
    match &def.kind {
        MacroKind::Integer => perturb_integer(&def.declared, rng),
        MacroKind::Decimal => perturb_decimal(&def.declared, rng),
        MacroKind::Datetime(fmt) => perturb_datetime(&def.declared, fmt, rng),
        MacroKind::String => perturb_string(&def.declared, cplx, rng),
        MacroKind::Database => def.declared.clone(),
    }
}

/// Random-run length schedule: grows with the attempt count so persistent
/// collisions get increasingly unlikely replacements.
fn complexity(attempt: u32) -> usize {
    let c = if attempt < 50 {
        attempt as f64 / 10.0
    } else {
        attempt as f64 / 5.0
    };
    c.round() as usize + 1
}

fn perturb_integer(declared: &str, rng: &mut impl Rng) -> String {
    match declared.parse::<i64>() {
        Ok(n) => {
            let offset = rng.gen_range(0..=120i64);
            let shifted = if n >= NUMERIC_PIVOT { n - offset } else { n + offset };
            shifted.to_string()
        }
        Err(_) => declared.to_string(),
    }
}

fn perturb_decimal(declared: &str, rng: &mut impl Rng) -> String {
    match Decimal::from_str(declared) {
        Ok(d) => {
            let offset = Decimal::from(rng.gen_range(0..=120i64));
            let shifted = if d >= Decimal::from(NUMERIC_PIVOT) { d - offset } else { d + offset };
            shifted.to_string()
        }
        Err(_) => declared.to_string(),
    }
}

fn perturb_datetime(declared: &str, fmt: &str, rng: &mut impl Rng) -> String {
    match infer::parse_datetime(declared, fmt) {
        Some(dt) => {
            let days = Duration::days(rng.gen_range(0..=120i64));
            // Year 9999 is the conventional maximum-date sentinel; shifting
            // it forward would leave the format's four-digit year.
            let shifted = if dt.year() == 9999 { dt - days } else { dt + days };
            infer::format_datetime(&shifted, fmt)
        }
        None => declared.to_string(),
    }
}

/// Overwrite `run.len()` characters starting at the first alphanumeric.
/// Overwriting (rather than inserting) is what actually breaks the
/// colliding substring; with no alphanumeric to anchor on, the run is
/// prepended instead.
fn perturb_string(declared: &str, cplx: usize, rng: &mut impl Rng) -> String {
    let run = random_run(cplx.max(1), rng);
    let chars: Vec<char> = declared.chars().collect();
    match chars.iter().position(|c| c.is_alphanumeric()) {
        Some(idx) => {
            let skip = run.chars().count();
            let mut out: String = chars[..idx].iter().collect();
            out.push_str(&run);
            out.extend(chars[(idx + skip).min(chars.len())..].iter().copied());
            out
        }
        None => format!("{run}{declared}"),
    }
}

/// A run of `len` characters from the combined alphabet.
pub(crate) fn random_run(len: usize, rng: &mut impl Rng) -> String {
    (0..len)
        .map(|_| ALPHABET_FULL[rng.gen_range(0..ALPHABET_FULL.len())])
        .collect()
}
