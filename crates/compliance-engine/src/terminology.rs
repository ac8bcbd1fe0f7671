//! Terminology normalization
//!
//! Rewrites internal jargon into `"{term} ({annotation})"` so the assessment
//! step sees what each codename means. All terms are matched in a single
//! scan by one alternation ordered longest-first, so a short term nested in
//! a longer phrase ("data" in "data broker") never wins over the phrase.
//! Occurrences already followed by their annotation are left untouched,
//! which makes normalization idempotent.

use regex::{Captures, Regex, RegexBuilder};

use crate::error::{EngineError, Result};

/// Static jargon dictionary, immutable after construction
#[derive(Debug, Clone)]
pub struct TerminologyMap {
    /// (term, annotation) pairs, longest term first
    entries: Vec<(String, String)>,
    matcher: Option<Regex>,
}

impl TerminologyMap {
    pub fn new<I, K, V>(terms: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut entries: Vec<(String, String)> = terms
            .into_iter()
            .map(|(k, v)| (k.into().trim().to_string(), v.into().trim().to_string()))
            .filter(|(k, v)| !k.is_empty() && !v.is_empty())
            .collect();

        entries.sort_by(|(a, _), (b, _)| {
            b.chars()
                .count()
                .cmp(&a.chars().count())
                .then_with(|| a.to_lowercase().cmp(&b.to_lowercase()))
        });
        entries.dedup_by(|(a, _), (b, _)| a.eq_ignore_ascii_case(b));

        let matcher = if entries.is_empty() {
            None
        } else {
            let alternatives: Vec<String> = entries
                .iter()
                .map(|(term, annotation)| term_pattern(term, annotation))
                .collect();
            let pattern = format!("(?:{})", alternatives.join("|"));
            let regex = RegexBuilder::new(&pattern)
                .case_insensitive(true)
                .size_limit(64 * 1024 * 1024)
                .build()
                .map_err(|e| EngineError::config_load("terminology map", e))?;
            Some(regex)
        };

        Ok(Self { entries, matcher })
    }

    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
            matcher: None,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Annotation for a term (case-insensitive)
    pub fn annotation(&self, term: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(t, _)| t.to_lowercase() == term.to_lowercase())
            .map(|(_, a)| a.as_str())
    }

    /// Terms in matching order (longest first)
    pub fn terms(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(t, _)| t.as_str())
    }

    /// Annotate every whole-word, case-insensitive occurrence of a known term.
    ///
    /// Unmatched text passes through unchanged.
    pub fn normalize(&self, text: &str) -> String {
        let Some(matcher) = &self.matcher else {
            return text.to_string();
        };

        matcher
            .replace_all(text, |caps: &Captures| {
                let whole = &caps[0];
                let Some((index, term_match)) = caps
                    .iter()
                    .enumerate()
                    .skip(1)
                    .find_map(|(i, m)| m.map(|m| (i - 1, m)))
                else {
                    return whole.to_string();
                };

                // Already carries its annotation from an earlier pass
                if term_match.len() < whole.len() {
                    return whole.to_string();
                }

                let (term, annotation) = &self.entries[index];
                format!("{} ({})", term, annotation)
            })
            .into_owned()
    }
}

impl Default for TerminologyMap {
    fn default() -> Self {
        Self::empty()
    }
}

/// `\b(term)\b(?:\s*\(annotation\))?`, with word boundaries only where the
/// term edge is a word character
fn term_pattern(term: &str, annotation: &str) -> String {
    let leading = if term.chars().next().is_some_and(is_word_char) {
        r"\b"
    } else {
        ""
    };
    let trailing = if term.chars().last().is_some_and(is_word_char) {
        r"\b"
    } else {
        ""
    };
    format!(
        r"{}({}){}(?:\s*\({}\))?",
        leading,
        regex::escape(term),
        trailing,
        regex::escape(annotation)
    )
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}
