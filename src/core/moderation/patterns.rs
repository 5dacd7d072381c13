// Pattern extractor: regular expressions for obfuscated spellings and
// explicit threat/hate phrasing.
//
// Categories are visited in priority order and each category records at most
// one label (the first matching rule in list order), so one phrase is never
// counted twice under the same category. A threat match also suppresses the
// hate patterns.

use super::moderation_config::{ConfigError, PatternRule};
use super::moderation_models::{Category, SignalKind, SignalResult};
use super::signal_extractors::{AnalysisInput, SignalError, SignalExtractor};
use regex::{Regex, RegexBuilder};

struct CompiledPattern {
    label: String,
    category: Category,
    regex: Regex,
}

pub struct PatternExtractor {
    rules: Vec<CompiledPattern>,
}

impl PatternExtractor {
    pub fn compile(rules: &[PatternRule]) -> Result<Self, ConfigError> {
        let rules = rules
            .iter()
            .map(|rule| {
                RegexBuilder::new(&rule.regex)
                    .case_insensitive(true)
                    .build()
                    .map(|regex| CompiledPattern {
                        label: rule.label.clone(),
                        category: rule.category,
                        regex,
                    })
                    .map_err(|source| ConfigError::InvalidPattern {
                        label: rule.label.clone(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { rules })
    }

    /// Matched labels, highest-priority category first.
    pub fn find(&self, text: &str) -> Vec<(String, Category)> {
        let mut found: Vec<(String, Category)> = Vec::new();

        for category in Category::PRIORITY {
            if category == Category::HateDiscrimination
                && found.iter().any(|(_, c)| *c == Category::ThreatViolence)
            {
                continue;
            }

            let first = self
                .rules
                .iter()
                .filter(|rule| rule.category == category)
                .find(|rule| rule.regex.is_match(text));

            if let Some(rule) = first {
                found.push((rule.label.clone(), rule.category));
            }
        }

        found
    }
}

impl SignalExtractor for PatternExtractor {
    fn name(&self) -> &'static str {
        "patterns"
    }

    fn extract(&self, input: &AnalysisInput<'_>) -> Result<SignalResult, SignalError> {
        let found = self.find(input.normalized);
        Ok(SignalResult::terms(self.name(), SignalKind::Pattern, found))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::moderation::default_rules::default_patterns;

    fn labels(text: &str) -> Vec<String> {
        PatternExtractor::compile(&default_patterns())
            .unwrap()
            .find(text)
            .into_iter()
            .map(|(label, _)| label)
            .collect()
    }

    #[test]
    fn test_self_harm_threat() {
        assert_eq!(labels("kill yourself"), vec!["threat-self-harm"]);
        assert_eq!(labels("just kys lol"), vec!["threat-self-harm"]);
        assert_eq!(labels("KIIILL urself"), vec!["threat-self-harm"]);
    }

    #[test]
    fn test_one_label_per_category() {
        // Both self-harm rules and the suicide rule match; only the first counts.
        assert_eq!(labels("kys, go die, kill yourself"), vec!["threat-self-harm"]);
    }

    #[test]
    fn test_threat_suppresses_hate() {
        let found = labels("i will kill you, white genocide now");
        assert_eq!(found, vec!["threat-direct"]);

        assert_eq!(labels("white genocide"), vec!["hate-genocide"]);
    }

    #[test]
    fn test_obfuscated_profanity() {
        assert_eq!(labels("what the f*ck"), vec!["profanity-obfuscated"]);
        assert_eq!(labels("fvck this"), vec!["profanity-obfuscated"]);
        assert_eq!(labels("sh1t happens"), vec!["profanity-obfuscated"]);
        assert!(labels("focus on the shift, fun times").is_empty());
        assert_eq!(labels("this is b!tches"), vec!["profanity-obfuscated"]);
        assert_eq!(labels("sh*tty day"), vec!["profanity-obfuscated"]);
    }

    #[test]
    fn test_obfuscation_rules_stop_at_word_end() {
        assert!(labels("I love shiitake mushrooms").is_empty());
        assert!(labels("we flew to fukuoka").is_empty());
        assert!(labels("my bichon frise is cute").is_empty());
        assert!(labels("shitake and fukushima").is_empty());
    }

    #[test]
    fn test_clean_text() {
        assert!(labels("hello how are you").is_empty());
    }

    #[test]
    fn test_multiple_categories() {
        let extractor = PatternExtractor::compile(&default_patterns()).unwrap();
        let found = extractor.find("nobody likes you, f*ck off");
        assert_eq!(
            found,
            vec![
                ("harassment-isolation".to_string(), Category::Harassment),
                ("profanity-obfuscated".to_string(), Category::Profanity),
            ]
        );
    }
}
