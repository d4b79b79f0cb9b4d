//! Intent matching: map an utterance to a plugin intent by keyword groups.
//!
//! An intent is a list of keyword groups. Every group must be present in the
//! utterance, and each group lists alternative phrases. Utterances and
//! phrases are lower-cased with punctuation removed and matched on word
//! boundaries, so `activate` does not match inside `deactivate`.

use serde::{Deserialize, Serialize};

/// An intent a plugin answers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentDef {
    pub name: String,
    /// Required keyword groups. Each inner list holds alternatives.
    pub keywords: Vec<Vec<String>>,
}

impl IntentDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            keywords: Vec::new(),
        }
    }

    /// Add a required group: one of `alternatives` must appear.
    pub fn require(mut self, alternatives: &[&str]) -> Self {
        self.keywords.push(
            alternatives
                .iter()
                .map(|a| normalize(a))
                .filter(|a| !a.is_empty())
                .collect(),
        );
        self
    }

    /// Score this intent against a normalized, space-padded utterance.
    /// The score is the total length of the longest alternative matched per group.
    fn score(&self, padded: &str) -> Option<usize> {
        if self.keywords.is_empty() {
            return None;
        }
        let mut total = 0;
        for group in &self.keywords {
            let best = group
                .iter()
                .filter(|alt| padded.contains(&format!(" {} ", alt)))
                .map(|alt| alt.len())
                .max()?;
            total += best;
        }
        Some(total)
    }
}

/// The intent an utterance resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentMatch {
    pub plugin: String,
    pub intent: String,
    pub score: usize,
}

/// Holds every loaded plugin's intents.
#[derive(Debug, Default)]
pub struct IntentMatcher {
    intents: Vec<(String, IntentDef)>,
}

impl IntentMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an intent for a plugin.
    pub fn register(&mut self, plugin: &str, intent: IntentDef) {
        self.intents.push((plugin.to_string(), intent));
    }

    /// Remove every intent of a plugin.
    pub fn unregister_plugin(&mut self, plugin: &str) {
        self.intents.retain(|(p, _)| p != plugin);
    }

    /// Best match for an utterance. Ties go to the earliest registration.
    pub fn match_utterance(&self, utterance: &str) -> Option<IntentMatch> {
        let padded = format!(" {} ", normalize(utterance));
        let mut best: Option<IntentMatch> = None;
        for (plugin, intent) in &self.intents {
            let Some(score) = intent.score(&padded) else {
                continue;
            };
            if best.as_ref().is_none_or(|b| score > b.score) {
                best = Some(IntentMatch {
                    plugin: plugin.clone(),
                    intent: intent.name.clone(),
                    score,
                });
            }
        }
        best
    }

    pub fn len(&self) -> usize {
        self.intents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intents.is_empty()
    }
}

/// Lower-case, replace punctuation with spaces, collapse whitespace.
pub fn normalize(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '\'' {
                c.to_ascii_lowercase()
            } else {
                ' '
            }
        })
        .filter(|c| *c != '\'')
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}
