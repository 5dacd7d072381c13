// Score fusion: turns the extractor outputs for one text into an AbuseVerdict.
//
// score    = distinct terms * keyword_weight + mean negative sentiment magnitude
// flagged  = any enabled flag rule holds (score, strong negative, any match)
// severity = first satisfied tier of critical -> high -> medium, else low
//
// Deterministic: the same bundle and config always give the same verdict.

use super::moderation_config::ScoringConfig;
use super::moderation_models::{
    content_fingerprint, AbuseVerdict, Category, Severity, SignalKind, SignalResult,
};
use super::signal_extractors::SignalBundle;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Matched terms kept on a verdict.
pub const MAX_VERDICT_TERMS: usize = 5;

pub struct ScoreFusion<'a> {
    scoring: &'a ScoringConfig,
}

impl<'a> ScoreFusion<'a> {
    pub fn new(scoring: &'a ScoringConfig) -> Self {
        Self { scoring }
    }

    pub fn fuse(&self, bundle: &SignalBundle, produced_at: DateTime<Utc>) -> AbuseVerdict {
        let terms = distinct_terms(&bundle.results);
        let term_count = terms.len();

        let sentiment: BTreeMap<String, f64> = bundle
            .results
            .iter()
            .filter(|r| r.kind == SignalKind::Sentiment)
            .map(|r| (r.extractor_name.clone(), r.numeric_score))
            .collect();

        let sentiment_contribution = if sentiment.is_empty() {
            0.0
        } else {
            sentiment.values().map(|p| (-p).max(0.0)).sum::<f64>() / sentiment.len() as f64
        };
        let strongest_negative = sentiment.values().copied().fold(0.0_f64, f64::min);

        let score = term_count as f64 * self.scoring.keyword_weight + sentiment_contribution;

        let rules = self.scoring.flag_rules;
        let is_flagged = (rules.on_score && score > self.scoring.score_threshold)
            || (rules.on_strong_negative_sentiment
                && strongest_negative < self.scoring.strong_negative_sentiment)
            || (rules.on_any_match && term_count > 0);

        let (severity, category) = if is_flagged {
            (
                self.severity(score, term_count, strongest_negative),
                primary_category(&bundle.results).unwrap_or(Category::Harassment),
            )
        } else {
            (Severity::Low, Category::Clean)
        };

        AbuseVerdict {
            is_flagged,
            score,
            severity,
            category,
            matched_terms: terms.into_iter().take(MAX_VERDICT_TERMS).collect(),
            term_count,
            language: bundle.language.clone(),
            sentiment,
            produced_at,
            content_fingerprint: content_fingerprint(&bundle.normalized),
        }
    }

    fn severity(&self, score: f64, terms: usize, strongest_negative: f64) -> Severity {
        let tiers = &self.scoring.severity;
        if tiers.critical.is_met(score, terms, strongest_negative) {
            Severity::Critical
        } else if tiers.high.is_met(score, terms, strongest_negative) {
            Severity::High
        } else if tiers.medium.is_met(score, terms, strongest_negative) {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

/// Pattern labels first, then lexicon terms, without duplicates.
fn distinct_terms(results: &[SignalResult]) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for kind in [SignalKind::Pattern, SignalKind::Lexicon] {
        for result in results.iter().filter(|r| r.kind == kind && r.matched) {
            for term in &result.matched_terms {
                if !terms.contains(term) {
                    terms.push(term.clone());
                }
            }
        }
    }
    terms
}

fn primary_category(results: &[SignalResult]) -> Option<Category> {
    Category::PRIORITY.into_iter().find(|category| {
        results
            .iter()
            .any(|r| r.kind != SignalKind::Sentiment && r.matched && r.category == *category)
    })
}
