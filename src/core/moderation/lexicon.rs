// Lexicon extractor: whole-word matching against per-language term lists.
//
// Matching is on word boundaries, never substrings: "glass" and "classy"
// must not match "ass". A boundary is any character that is not a letter,
// digit, combining mark or underscore, so terms such as "a$$" and
// Devanagari words behave.

use super::default_rules::LanguageLexicon;
use super::moderation_config::ConfigError;
use super::moderation_models::{Category, SignalKind, SignalResult};
use super::signal_extractors::{AnalysisInput, SignalError, SignalExtractor};
use std::collections::{BTreeMap, HashMap};

struct LexiconTerm {
    term: String,
    category: Category,
}

pub struct LexiconExtractor {
    languages: HashMap<String, Vec<LexiconTerm>>,
    default_language: String,
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || is_combining_mark(c)
}

// Indic vowel signs and viramas are word-internal.
fn is_combining_mark(c: char) -> bool {
    matches!(c, '\u{0300}'..='\u{036F}' | '\u{0900}'..='\u{0903}' | '\u{093A}'..='\u{094F}' | '\u{0951}'..='\u{0957}' | '\u{0962}'..='\u{0963}')
}

/// True when `term` occurs in `text` with a word boundary on both sides.
pub fn contains_whole_word(text: &str, term: &str) -> bool {
    if term.is_empty() {
        return false;
    }

    let mut from = 0;
    while let Some(offset) = text[from..].find(term) {
        let start = from + offset;
        let end = start + term.len();
        let before = text[..start].chars().next_back();
        let after = text[end..].chars().next();
        if before.map_or(true, |c| !is_word_char(c)) && after.map_or(true, |c| !is_word_char(c)) {
            return true;
        }
        // Candidates can overlap, so resume one char later rather than past the match.
        let step = text[start..].chars().next().map_or(1, char::len_utf8);
        from = start + step;
    }
    false
}

impl LexiconExtractor {
    pub fn compile(
        lexicons: &BTreeMap<String, LanguageLexicon>,
        default_language: &str,
    ) -> Result<Self, ConfigError> {
        let mut languages = HashMap::new();

        for (language, categories) in lexicons {
            let mut terms = Vec::new();
            for (category, words) in categories {
                for word in words {
                    let term = word.split_whitespace().collect::<Vec<_>>().join(" ");
                    if term.is_empty() {
                        return Err(ConfigError::EmptyTerm {
                            language: language.clone(),
                        });
                    }
                    terms.push(LexiconTerm {
                        term: term.to_lowercase(),
                        category: *category,
                    });
                }
            }
            languages.insert(language.clone(), terms);
        }

        if !languages.contains_key(default_language) {
            return Err(ConfigError::MissingDefaultLexicon(
                default_language.to_string(),
            ));
        }

        Ok(Self {
            languages,
            default_language: default_language.to_string(),
        })
    }

    /// Terms found in already-normalized text, in lexicon order.
    ///
    /// Unknown languages fall back to the default lexicon.
    pub fn find_terms(&self, normalized: &str, language: &str) -> Vec<(String, Category)> {
        let terms = self
            .languages
            .get(language)
            .or_else(|| self.languages.get(&self.default_language));

        let mut found: Vec<(String, Category)> = Vec::new();
        for entry in terms.into_iter().flatten() {
            if contains_whole_word(normalized, &entry.term)
                && !found.iter().any(|(t, _)| t == &entry.term)
            {
                found.push((entry.term.clone(), entry.category));
            }
        }
        found
    }
}

impl SignalExtractor for LexiconExtractor {
    fn name(&self) -> &'static str {
        "lexicon"
    }

    fn extract(&self, input: &AnalysisInput<'_>) -> Result<SignalResult, SignalError> {
        let found = self.find_terms(input.normalized, input.language);
        Ok(SignalResult::terms(self.name(), SignalKind::Lexicon, found))
    }
}
