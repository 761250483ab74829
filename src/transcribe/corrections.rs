//! Deterministic post-corrections for known domain-term misrecognitions.
//!
//! Recognition providers reliably split or mangle some clinical terms; the
//! substitutions here fix the ones we see across providers. The table is
//! configuration, so deployments extend it for their specialty.

use serde::Deserialize;

/// A single deterministic text substitution.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Correction {
    /// What the recognizer tends to produce
    pub hears: String,
    /// The term it should have been
    pub means: String,
}

impl Correction {
    pub fn new(hears: &str, means: &str) -> Self {
        Self {
            hears: hears.to_string(),
            means: means.to_string(),
        }
    }
}

pub fn default_corrections() -> Vec<Correction> {
    [
        ("high per tension", "hypertension"),
        ("hyper tension", "hypertension"),
        ("hypo tension", "hypotension"),
        ("tacky cardia", "tachycardia"),
        ("brady cardia", "bradycardia"),
        ("a trial fibrillation", "atrial fibrillation"),
        ("met forming", "metformin"),
        ("met formin", "metformin"),
        ("an aphylaxis", "anaphylaxis"),
        ("disp nea", "dyspnea"),
    ]
    .into_iter()
    .map(|(hears, means)| Correction::new(hears, means))
    .collect()
}

/// Apply every correction in table order, case-insensitively.
pub fn apply_corrections(text: &str, corrections: &[Correction]) -> String {
    let mut out = text.to_string();
    for correction in corrections {
        out = replace_ignore_case(&out, &correction.hears, &correction.means);
    }
    out
}

fn replace_ignore_case(haystack: &str, needle: &str, replacement: &str) -> String {
    if needle.is_empty() {
        return haystack.to_string();
    }
    let lower_haystack = haystack.to_lowercase();
    let lower_needle = needle.to_lowercase();
    // Lowercasing that changes byte length would desync the indices below;
    // those inputs take the exact-match path instead.
    if lower_haystack.len() != haystack.len() || lower_needle.len() != needle.len() {
        return haystack.replace(needle, replacement);
    }

    let mut result = String::with_capacity(haystack.len());
    let mut last = 0;
    let mut search = 0;
    while let Some(pos) = lower_haystack[search..].find(&lower_needle) {
        let start = search + pos;
        result.push_str(&haystack[last..start]);
        result.push_str(replacement);
        last = start + lower_needle.len();
        search = last;
    }
    result.push_str(&haystack[last..]);
    result
}
