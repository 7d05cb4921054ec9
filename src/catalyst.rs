// src/catalyst.rs
//! Catalyst classification: one tag from a fixed taxonomy, or none.
//!
//! Each category scores 2 per keyword found in the title and 1 per keyword found
//! in the description. The strictly highest non-zero category wins; ties go to
//! the category declared first in [`Catalyst::ALL`].

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Catalyst {
    Earnings,
    AnalystAction,
    MergerAcquisition,
    PartnershipCollaboration,
    ProductInnovation,
    RegulatoryLegal,
    GuidanceOutlook,
    InsiderActivity,
    DividendBuyback,
    FinancialMetrics,
}

impl Catalyst {
    /// Declaration order; also the tie-break order.
    pub const ALL: [Catalyst; 10] = [
        Catalyst::Earnings,
        Catalyst::AnalystAction,
        Catalyst::MergerAcquisition,
        Catalyst::PartnershipCollaboration,
        Catalyst::ProductInnovation,
        Catalyst::RegulatoryLegal,
        Catalyst::GuidanceOutlook,
        Catalyst::InsiderActivity,
        Catalyst::DividendBuyback,
        Catalyst::FinancialMetrics,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Catalyst::Earnings => "earnings",
            Catalyst::AnalystAction => "analyst_action",
            Catalyst::MergerAcquisition => "merger_acquisition",
            Catalyst::PartnershipCollaboration => "partnership_collaboration",
            Catalyst::ProductInnovation => "product_innovation",
            Catalyst::RegulatoryLegal => "regulatory_legal",
            Catalyst::GuidanceOutlook => "guidance_outlook",
            Catalyst::InsiderActivity => "insider_activity",
            Catalyst::DividendBuyback => "dividend_buyback",
            Catalyst::FinancialMetrics => "financial_metrics",
        }
    }

    /// Human-readable label for summaries.
    pub fn label(&self) -> &'static str {
        match self {
            Catalyst::Earnings => "earnings",
            Catalyst::AnalystAction => "analyst action",
            Catalyst::MergerAcquisition => "merger/acquisition",
            Catalyst::PartnershipCollaboration => "partnership",
            Catalyst::ProductInnovation => "product news",
            Catalyst::RegulatoryLegal => "regulatory/legal",
            Catalyst::GuidanceOutlook => "guidance",
            Catalyst::InsiderActivity => "insider activity",
            Catalyst::DividendBuyback => "dividend/buyback",
            Catalyst::FinancialMetrics => "financial metrics",
        }
    }

    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            Catalyst::Earnings => &[
                "earnings",
                "quarterly results",
                "eps",
                "earnings per share",
                "beats",
                "misses",
                "earnings call",
                "profit",
            ],
            Catalyst::AnalystAction => &[
                "upgrade",
                "upgrades",
                "downgrade",
                "downgrades",
                "price target",
                "analyst",
                "analysts",
                "initiates coverage",
                "outperform",
                "underperform",
                "overweight",
                "underweight",
            ],
            Catalyst::MergerAcquisition => &[
                "merger",
                "acquisition",
                "acquire",
                "acquires",
                "takeover",
                "buyout",
                "deal to buy",
                "to be acquired",
            ],
            Catalyst::PartnershipCollaboration => &[
                "partnership",
                "partners with",
                "collaboration",
                "joint venture",
                "alliance",
                "teams up",
            ],
            Catalyst::ProductInnovation => &[
                "launch",
                "launches",
                "unveils",
                "new product",
                "product line",
                "release",
                "rollout",
                "patent",
                "breakthrough",
            ],
            Catalyst::RegulatoryLegal => &[
                "sec",
                "fda",
                "lawsuit",
                "investigation",
                "probe",
                "regulator",
                "regulators",
                "antitrust",
                "settlement",
                "fine",
                "recall",
                "approval",
            ],
            Catalyst::GuidanceOutlook => &[
                "guidance",
                "outlook",
                "forecast",
                "raises forecast",
                "cuts forecast",
                "expects",
                "projection",
            ],
            Catalyst::InsiderActivity => &[
                "insider",
                "insider buying",
                "insider selling",
                "ceo sells",
                "ceo buys",
                "form 4",
                "stake",
            ],
            Catalyst::DividendBuyback => &[
                "dividend",
                "dividends",
                "buyback",
                "share repurchase",
                "repurchase",
                "payout",
            ],
            Catalyst::FinancialMetrics => &[
                "revenue",
                "margin",
                "margins",
                "cash flow",
                "sales",
                "ebitda",
                "debt",
                "net income",
            ],
        }
    }
}

impl std::fmt::Display for Catalyst {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// Keyword matchers compiled once, in `Catalyst::ALL` order.
static MATCHERS: Lazy<Vec<(Catalyst, Vec<Regex>)>> = Lazy::new(|| {
    Catalyst::ALL
        .iter()
        .map(|c| {
            let res = c
                .keywords()
                .iter()
                .filter_map(|kw| Regex::new(&word_pattern(kw)).ok())
                .collect();
            (*c, res)
        })
        .collect()
});

/// Case-insensitive whole-word pattern for a keyword or phrase.
pub(crate) fn word_pattern(kw: &str) -> String {
    format!(r"(?i)\b{}\b", regex::escape(kw))
}

/// Per-category score in declaration order.
pub fn score_categories(title: &str, description: &str) -> [(Catalyst, u32); 10] {
    let mut out = Catalyst::ALL.map(|c| (c, 0u32));
    for (i, (_, res)) in MATCHERS.iter().enumerate() {
        let mut s = 0;
        for re in res {
            if re.is_match(title) {
                s += 2;
            }
            if re.is_match(description) {
                s += 1;
            }
        }
        out[i].1 = s;
    }
    out
}

/// Best category, or `None` when no keyword matched.
pub fn classify(title: &str, description: &str) -> Option<Catalyst> {
    let mut best: Option<(Catalyst, u32)> = None;
    for (c, s) in score_categories(title, description) {
        if s == 0 {
            continue;
        }
        // strict `>` keeps the earlier category on ties
        if best.map_or(true, |(_, b)| s > b) {
            best = Some((c, s));
        }
    }
    best.map(|(c, _)| c)
}
