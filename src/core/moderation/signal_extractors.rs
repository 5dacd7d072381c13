// Signal extractors: independent analyzers that each answer
// "what do I see in this text" without knowing about the others.
//
// The pipeline runs language detection first (it never fails), then every
// extractor. A failing extractor is logged and treated as "no evidence".

use super::language::LanguageDetector;
use super::lexicon::LexiconExtractor;
use super::moderation_config::{ConfigError, ModerationConfig};
use super::moderation_models::{normalize_text, SignalResult};
use super::patterns::PatternExtractor;
use super::sentiment::{LexiconSentiment, PatternSentiment};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SignalError {
    #[error("Extractor `{extractor}` failed: {reason}")]
    Failed {
        extractor: &'static str,
        reason: String,
    },
}

/// Text as handed to every extractor.
pub struct AnalysisInput<'a> {
    /// Original text (case preserved), already length-capped.
    pub raw: &'a str,
    /// Lower-cased, whitespace-collapsed text.
    pub normalized: &'a str,
    /// Language code picked by the detector.
    pub language: &'a str,
}

pub trait SignalExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    fn extract(&self, input: &AnalysisInput<'_>) -> Result<SignalResult, SignalError>;
}

/// Everything the extractors saw in one piece of text.
#[derive(Debug, Clone)]
pub struct SignalBundle {
    pub language: String,
    pub normalized: String,
    pub results: Vec<SignalResult>,
}

/// Run each extractor, dropping (and logging) the ones that fail.
pub fn run_extractors(
    extractors: &[&dyn SignalExtractor],
    input: &AnalysisInput<'_>,
) -> Vec<SignalResult> {
    extractors
        .iter()
        .filter_map(|extractor| match extractor.extract(input) {
            Ok(result) => Some(result),
            Err(e) => {
                tracing::warn!(
                    extractor = extractor.name(),
                    error = %e,
                    "Signal extractor failed; treating as no evidence"
                );
                None
            }
        })
        .collect()
}

/// Cut `text` to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

/// The configured set of extractors.
pub struct SignalPipeline {
    detector: LanguageDetector,
    lexicon: LexiconExtractor,
    patterns: PatternExtractor,
    pattern_sentiment: PatternSentiment,
    lexicon_sentiment: LexiconSentiment,
    max_text_chars: usize,
}

impl SignalPipeline {
    pub fn from_config(config: &ModerationConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            detector: LanguageDetector::new(&config.default_language),
            lexicon: LexiconExtractor::compile(&config.lexicons, &config.default_language)?,
            patterns: PatternExtractor::compile(&config.patterns)?,
            pattern_sentiment: PatternSentiment,
            lexicon_sentiment: LexiconSentiment,
            max_text_chars: config.max_text_chars,
        })
    }

    pub fn analyze(&self, text: &str) -> SignalBundle {
        let raw = truncate_chars(text, self.max_text_chars);
        let normalized = normalize_text(raw);
        let language = self.detector.detect(raw).language;

        let input = AnalysisInput {
            raw,
            normalized: &normalized,
            language: &language,
        };
        let extractors: [&dyn SignalExtractor; 4] = [
            &self.patterns,
            &self.lexicon,
            &self.pattern_sentiment,
            &self.lexicon_sentiment,
        ];
        let results = run_extractors(&extractors, &input);

        SignalBundle {
            language,
            normalized,
            results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::moderation::moderation_models::SignalKind;

    struct BrokenExtractor;

    impl SignalExtractor for BrokenExtractor {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn extract(&self, _input: &AnalysisInput<'_>) -> Result<SignalResult, SignalError> {
            Err(SignalError::Failed {
                extractor: "broken",
                reason: "model not loaded".to_string(),
            })
        }
    }

    #[test]
    fn test_failing_extractor_is_skipped() {
        let input = AnalysisInput {
            raw: "you are an idiot",
            normalized: "you are an idiot",
            language: "en",
        };
        let extractors: [&dyn SignalExtractor; 2] = [&BrokenExtractor, &PatternSentiment];

        let results = run_extractors(&extractors, &input);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].kind, SignalKind::Sentiment);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("नमस्ते", 2), "नम");
        assert_eq!(truncate_chars("short", 100), "short");
    }

    #[test]
    fn test_pipeline_produces_all_signals() {
        let pipeline = SignalPipeline::from_config(&ModerationConfig::default()).unwrap();
        let bundle = pipeline.analyze("Kill   YOURSELF");

        assert_eq!(bundle.language, "en");
        assert_eq!(bundle.normalized, "kill yourself");
        assert_eq!(bundle.results.len(), 4);
        assert!(bundle
            .results
            .iter()
            .any(|r| r.kind == SignalKind::Pattern && r.matched));
    }
}
