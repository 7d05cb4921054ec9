// src/relevance.rs
//! Relevance scoring: a pure function of (title, description, subject).
//!
//! - subject (ticker or one of its aliases) in title: +3.0, in description: +1.5
//! - each financial keyword: +2.0 in title, else +1.0 in description
//! - at least one catalyst: +1.0
//! - each recency word in the title: +0.5

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::catalyst::{self, word_pattern};

pub const SUBJECT_IN_TITLE: f64 = 3.0;
pub const SUBJECT_IN_DESCRIPTION: f64 = 1.5;
pub const KEYWORD_IN_TITLE: f64 = 2.0;
pub const KEYWORD_IN_DESCRIPTION: f64 = 1.0;
pub const CATALYST_BONUS: f64 = 1.0;
pub const RECENCY_WORD: f64 = 0.5;

const FINANCIAL_KEYWORDS: &[&str] = &[
    "earnings",
    "revenue",
    "profit",
    "loss",
    "guidance",
    "forecast",
    "upgrade",
    "downgrade",
    "merger",
    "acquisition",
    "dividend",
    "buyback",
    "ipo",
    "stock",
    "shares",
    "analyst",
    "lawsuit",
    "sec",
    "fda",
    "rally",
    "selloff",
];

const RECENCY_WORDS: &[&str] = &["today", "breaking", "just", "now"];

/// Company names that count as a mention of the ticker.
const DEFAULT_ALIASES: &[(&str, &[&str])] = &[
    ("AAPL", &["Apple"]),
    ("MSFT", &["Microsoft"]),
    ("GOOGL", &["Alphabet", "Google"]),
    ("GOOG", &["Alphabet", "Google"]),
    ("AMZN", &["Amazon"]),
    ("META", &["Meta Platforms", "Facebook"]),
    ("NVDA", &["Nvidia"]),
    ("TSLA", &["Tesla"]),
    ("NFLX", &["Netflix"]),
    ("AMD", &["Advanced Micro Devices"]),
    ("INTC", &["Intel"]),
    ("JPM", &["JPMorgan"]),
    ("BRK.B", &["Berkshire Hathaway"]),
    ("DIS", &["Disney"]),
    ("BA", &["Boeing"]),
];

static KEYWORD_RES: Lazy<Vec<Regex>> = Lazy::new(|| compile(FINANCIAL_KEYWORDS));
static RECENCY_RES: Lazy<Vec<Regex>> = Lazy::new(|| compile(RECENCY_WORDS));

fn compile(words: &[&str]) -> Vec<Regex> {
    words
        .iter()
        .filter_map(|w| Regex::new(&word_pattern(w)).ok())
        .collect()
}

/// Scores articles against a subject. Holds only static alias data, so the
/// same inputs always give the same score.
#[derive(Debug, Clone)]
pub struct RelevanceScorer {
    aliases: HashMap<String, Vec<String>>,
}

impl Default for RelevanceScorer {
    fn default() -> Self {
        Self::new(&HashMap::new())
    }
}

impl RelevanceScorer {
    /// Built-in aliases merged with configured ones (configured names are added,
    /// never replace the defaults).
    pub fn new(extra: &HashMap<String, Vec<String>>) -> Self {
        let mut aliases: HashMap<String, Vec<String>> = DEFAULT_ALIASES
            .iter()
            .map(|(sym, names)| {
                (
                    sym.to_string(),
                    names.iter().map(|n| n.to_string()).collect(),
                )
            })
            .collect();
        for (sym, names) in extra {
            let slot = aliases.entry(sym.trim().to_uppercase()).or_default();
            for n in names {
                let n = n.trim();
                if !n.is_empty() && !slot.iter().any(|s| s.eq_ignore_ascii_case(n)) {
                    slot.push(n.to_string());
                }
            }
        }
        Self { aliases }
    }

    pub fn aliases_for(&self, subject: &str) -> &[String] {
        self.aliases
            .get(&subject.trim().to_uppercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    fn subject_matcher(&self, subject: &str) -> Option<Regex> {
        let subject = subject.trim();
        if subject.is_empty() {
            return None;
        }
        let alts: Vec<String> = std::iter::once(subject)
            .chain(self.aliases_for(subject).iter().map(String::as_str))
            .map(regex::escape)
            .collect();
        Regex::new(&format!(r"(?i)\b(?:{})\b", alts.join("|"))).ok()
    }

    pub fn score(&self, title: &str, description: &str, subject: &str) -> f64 {
        let mut score = 0.0;

        if let Some(re) = self.subject_matcher(subject) {
            if re.is_match(title) {
                score += SUBJECT_IN_TITLE;
            }
            if re.is_match(description) {
                score += SUBJECT_IN_DESCRIPTION;
            }
        }

        for re in KEYWORD_RES.iter() {
            if re.is_match(title) {
                score += KEYWORD_IN_TITLE;
            } else if re.is_match(description) {
                score += KEYWORD_IN_DESCRIPTION;
            }
        }

        if catalyst::classify(title, description).is_some() {
            score += CATALYST_BONUS;
        }

        for re in RECENCY_RES.iter() {
            if re.is_match(title) {
                score += RECENCY_WORD;
            }
        }

        debug!(target: "relevance", subject, score, "scored article");
        score
    }
}
