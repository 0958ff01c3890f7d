//! Rule-based error-type labels.
//!
//! A cheap heuristic for filling in `error_type` when the model leaves it
//! out. Rules are checked in order: determiner, preposition, then
//! subject-verb agreement.

use std::collections::BTreeMap;

const DETERMINERS: [&str; 3] = ["a", "an", "the"];

const PREPOSITIONS: [&str; 12] = [
    "in", "on", "at", "by", "for", "to", "with", "about", "against", "between", "into", "through",
];

/// Label the edit from `original` to `corrected`, if a rule matches.
pub fn classify_error(original: &str, corrected: &str) -> Option<&'static str> {
    let o = words(original);
    let c = words(corrected);

    let has_det = |tokens: &[String]| tokens.iter().any(|t| DETERMINERS.contains(&t.as_str()));
    if has_det(&o) && !has_det(&c) {
        return Some("DET");
    }

    if PREPOSITIONS
        .iter()
        .any(|p| o.iter().any(|t| t == p) && !c.iter().any(|t| t == p))
    {
        return Some("PREP");
    }

    if o.len() >= 2 && c.len() >= 2 && o[0] != c[0] {
        return Some("SVA");
    }

    None
}

fn words(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric() && c != '\'')
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect()
}

/// Error code to human-readable description.
#[derive(Debug, Clone)]
pub struct ErrorTaxonomy {
    codes: BTreeMap<String, String>,
}

impl Default for ErrorTaxonomy {
    fn default() -> Self {
        let codes = [
            ("VT", "Verb Tense"),
            ("PREP", "Preposition"),
            ("DET", "Determiner"),
            ("SVA", "Subject-Verb Agreement"),
        ]
        .into_iter()
        .map(|(code, desc)| (code.to_string(), desc.to_string()))
        .collect();
        Self { codes }
    }
}

impl ErrorTaxonomy {
    /// Description for `code`, or `"Other"`.
    pub fn lookup(&self, code: &str) -> &str {
        self.codes.get(code).map(String::as_str).unwrap_or("Other")
    }

    /// Add or replace a code.
    pub fn register(&mut self, code: impl Into<String>, description: impl Into<String>) {
        self.codes.insert(code.into(), description.into());
    }

    pub fn codes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.codes.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}
