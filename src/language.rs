//! Session language handling.
//!
//! A session's languages are chosen explicitly by the clinician at start
//! time and stay fixed for the whole session. There is deliberately no
//! default: starting without a primary language is refused.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Supported transcription languages (ISO 639-1 codes).
///
/// The set is a fixed enumeration: fallback lists are derived from it and a
/// session can only be started with one of its members as primary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LanguageCode {
    En,
    Fr,
    De,
    Es,
    It,
    Pt,
}

impl LanguageCode {
    /// Canonical ordering, used when deriving fallback lists.
    pub const ALL: [LanguageCode; 6] = [
        LanguageCode::En,
        LanguageCode::Fr,
        LanguageCode::De,
        LanguageCode::Es,
        LanguageCode::It,
        LanguageCode::Pt,
    ];

    /// ISO 639-1 code for this language.
    pub fn code(&self) -> &'static str {
        match self {
            LanguageCode::En => "en",
            LanguageCode::Fr => "fr",
            LanguageCode::De => "de",
            LanguageCode::Es => "es",
            LanguageCode::It => "it",
            LanguageCode::Pt => "pt",
        }
    }

    /// Parse an ISO 639-1 code. Returns `None` for unsupported codes.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.to_lowercase().as_str() {
            "en" => Some(LanguageCode::En),
            "fr" => Some(LanguageCode::Fr),
            "de" => Some(LanguageCode::De),
            "es" => Some(LanguageCode::Es),
            "it" => Some(LanguageCode::It),
            "pt" => Some(LanguageCode::Pt),
            _ => None,
        }
    }
}

impl std::fmt::Display for LanguageCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// The caller's language choice for a session, straight from the UI.
///
/// `primary` is optional on purpose: an empty selection models "nothing was
/// picked", and `LanguagePolicy::from_selection` refuses it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LanguageSelection {
    pub primary: Option<LanguageCode>,
}

impl LanguageSelection {
    /// Selection with the given primary language.
    pub fn primary(code: LanguageCode) -> Self {
        Self {
            primary: Some(code),
        }
    }

    /// Selection with no language picked.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Refused language selections: a session cannot start without an explicit
/// primary language.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("no primary language selected for the session")]
pub struct MissingLanguageSelection;

/// Immutable language priority for one session.
///
/// Holds the explicit primary plus the remaining supported codes as ordered
/// fallbacks, so code-mixed speech still resolves. Constructed once at
/// `start()` and passed through dispatch and transcription unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LanguagePolicy {
    primary: LanguageCode,
    fallbacks: Vec<LanguageCode>,
}

impl LanguagePolicy {
    /// Validate a caller selection into a policy. Fails when no primary was
    /// picked; there is no fallback to a default language.
    pub fn from_selection(selection: &LanguageSelection) -> Result<Self, MissingLanguageSelection> {
        let primary = selection.primary.ok_or(MissingLanguageSelection)?;
        let fallbacks = LanguageCode::ALL
            .iter()
            .copied()
            .filter(|code| *code != primary)
            .collect();
        Ok(Self { primary, fallbacks })
    }

    pub fn primary(&self) -> LanguageCode {
        self.primary
    }

    pub fn fallbacks(&self) -> &[LanguageCode] {
        &self.fallbacks
    }

    /// Ordered priority list handed to the recognizer: primary first, then
    /// every fallback in canonical order.
    pub fn priority(&self) -> Vec<LanguageCode> {
        let mut codes = Vec::with_capacity(1 + self.fallbacks.len());
        codes.push(self.primary);
        codes.extend_from_slice(&self.fallbacks);
        codes
    }
}
