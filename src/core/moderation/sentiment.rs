// Sentiment estimators.
//
// Two independent estimates of hostility, both bounded to [-1, 1]:
// - `PatternSentiment` averages per-word polarity, flipping and damping
//   words that follow a negation and scaling words after an intensifier.
// - `LexiconSentiment` sums word valences on a [-4, 4] scale with booster,
//   negation, capitalisation, "but" and exclamation adjustments, then
//   squashes the sum into [-1, 1].
//
// Neither needs to agree with the other; fusion only blends their magnitudes.

use super::moderation_models::SignalResult;
use super::signal_extractors::{AnalysisInput, SignalError, SignalExtractor};

const NEGATIONS: &[&str] = &[
    "not", "no", "never", "none", "nothing", "nobody", "neither", "nor", "without", "cannot",
    "cant", "can't", "dont", "don't", "doesnt", "doesn't", "didnt", "didn't", "isnt", "isn't",
    "arent", "aren't", "wasnt", "wasn't", "wont", "won't", "wouldnt", "wouldn't", "shouldnt",
    "shouldn't", "aint", "ain't",
];

fn is_negation(word: &str) -> bool {
    NEGATIONS.contains(&word)
}

// ============================================================================
// PATTERN SENTIMENT
// ============================================================================

const POLARITY: &[(&str, f64)] = &[
    ("abuse", -0.6),
    ("angry", -0.5),
    ("annoying", -0.8),
    ("awful", -1.0),
    ("bad", -0.7),
    ("crap", -0.8),
    ("dead", -0.4),
    ("die", -0.6),
    ("disgusting", -1.0),
    ("dumb", -0.4),
    ("evil", -1.0),
    ("fuck", -0.4),
    ("fucking", -0.6),
    ("garbage", -0.5),
    ("hate", -0.8),
    ("horrible", -1.0),
    ("hurt", -0.6),
    ("idiot", -0.8),
    ("kill", -0.8),
    ("loser", -0.6),
    ("moron", -0.8),
    ("murder", -0.9),
    ("pathetic", -1.0),
    ("shit", -0.4),
    ("sick", -0.7),
    ("stupid", -0.8),
    ("sucks", -0.3),
    ("terrible", -1.0),
    ("trash", -0.5),
    ("ugly", -0.7),
    ("useless", -0.5),
    ("worst", -1.0),
    ("worthless", -0.8),
    ("amazing", 0.6),
    ("awesome", 1.0),
    ("beautiful", 0.85),
    ("best", 1.0),
    ("cool", 0.35),
    ("excellent", 1.0),
    ("fun", 0.3),
    ("glad", 0.5),
    ("good", 0.7),
    ("great", 0.8),
    ("happy", 0.8),
    ("kind", 0.6),
    ("love", 0.5),
    ("nice", 0.6),
    ("thanks", 0.2),
    ("wonderful", 1.0),
];

const INTENSIFIERS: &[(&str, f64)] = &[
    ("absolutely", 1.4),
    ("extremely", 1.5),
    ("fucking", 1.5),
    ("really", 1.3),
    ("so", 1.3),
    ("super", 1.3),
    ("totally", 1.4),
    ("very", 1.3),
];

fn lookup(table: &[(&str, f64)], word: &str) -> Option<f64> {
    table
        .iter()
        .find(|(entry, _)| *entry == word)
        .map(|(_, value)| *value)
}

fn words(text: &str) -> Vec<&str> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .filter(|w| !w.is_empty())
        .collect()
}

/// Averaged word polarity.
pub struct PatternSentiment;

impl PatternSentiment {
    pub fn polarity(&self, normalized: &str) -> f64 {
        let tokens = words(normalized);
        let mut scores = Vec::new();

        for (i, token) in tokens.iter().enumerate() {
            let Some(mut polarity) = lookup(POLARITY, token) else {
                continue;
            };

            if i > 0 {
                if let Some(multiplier) = lookup(INTENSIFIERS, tokens[i - 1]) {
                    polarity = (polarity * multiplier).clamp(-1.0, 1.0);
                }
            }
            if tokens[i.saturating_sub(2)..i].iter().any(|w| is_negation(w)) {
                polarity *= -0.5;
            }
            scores.push(polarity);
        }

        if scores.is_empty() {
            return 0.0;
        }
        (scores.iter().sum::<f64>() / scores.len() as f64).clamp(-1.0, 1.0)
    }
}

impl SignalExtractor for PatternSentiment {
    fn name(&self) -> &'static str {
        "pattern_sentiment"
    }

    fn extract(&self, input: &AnalysisInput<'_>) -> Result<SignalResult, SignalError> {
        Ok(SignalResult::sentiment(
            self.name(),
            self.polarity(input.normalized),
        ))
    }
}

// ============================================================================
// LEXICON SENTIMENT
// ============================================================================

const VALENCE: &[(&str, f64)] = &[
    ("abuse", -3.2),
    ("angry", -2.3),
    ("annoying", -1.7),
    ("attack", -2.1),
    ("awful", -2.0),
    ("bad", -2.5),
    ("bastard", -2.5),
    ("bitch", -2.7),
    ("damn", -1.7),
    ("dead", -3.3),
    ("death", -2.9),
    ("destroy", -2.5),
    ("die", -2.9),
    ("disgusting", -2.4),
    ("dumb", -2.3),
    ("fuck", -2.5),
    ("fucking", -1.8),
    ("garbage", -1.6),
    ("hate", -2.7),
    ("horrible", -2.5),
    ("hurt", -2.4),
    ("idiot", -2.3),
    ("kill", -3.7),
    ("loser", -2.4),
    ("moron", -2.2),
    ("murder", -3.7),
    ("pathetic", -2.2),
    ("racist", -3.1),
    ("shit", -2.6),
    ("stab", -2.8),
    ("stupid", -2.4),
    ("suck", -1.9),
    ("sucks", -1.5),
    ("suicide", -3.5),
    ("terrible", -2.1),
    ("threat", -2.4),
    ("trash", -1.8),
    ("ugly", -2.8),
    ("worst", -3.1),
    ("worthless", -1.9),
    ("amazing", 2.8),
    ("awesome", 3.1),
    ("beautiful", 2.9),
    ("best", 3.2),
    ("cool", 1.3),
    ("excellent", 2.7),
    ("friend", 2.2),
    ("fun", 2.3),
    ("glad", 2.0),
    ("good", 1.9),
    ("great", 3.1),
    ("haha", 2.0),
    ("happy", 2.7),
    ("kind", 2.4),
    ("lol", 1.8),
    ("love", 3.2),
    ("nice", 1.8),
    ("thank", 1.5),
    ("thanks", 1.9),
    ("welcome", 2.0),
    ("wonderful", 2.7),
];

const BOOSTERS_UP: &[&str] = &[
    "absolutely",
    "completely",
    "extremely",
    "fucking",
    "really",
    "so",
    "such",
    "super",
    "too",
    "totally",
    "utterly",
    "very",
];

const BOOSTERS_DOWN: &[&str] = &["barely", "hardly", "kinda", "slightly", "somewhat"];

const BOOSTER_STEP: f64 = 0.293;
const CAPS_STEP: f64 = 0.733;
const NEGATION_SCALAR: f64 = -0.74;
const EXCLAMATION_STEP: f64 = 0.292;
const MAX_EXCLAMATIONS: usize = 4;
const NORMALIZE_ALPHA: f64 = 15.0;

struct Token<'a> {
    original: &'a str,
    lower: String,
}

fn is_shouted(word: &str) -> bool {
    let letters: Vec<char> = word.chars().filter(|c| c.is_alphabetic()).collect();
    letters.len() > 1 && letters.iter().all(|c| c.is_uppercase())
}

/// Weighted valence sum, squashed into [-1, 1].
pub struct LexiconSentiment;

impl LexiconSentiment {
    pub fn polarity(&self, raw: &str) -> f64 {
        let tokens: Vec<Token<'_>> = raw
            .split_whitespace()
            .map(|w| w.trim_matches(|c: char| !(c.is_alphanumeric() || c == '\'')))
            .filter(|w| !w.is_empty())
            .map(|w| Token {
                original: w,
                lower: w.to_lowercase(),
            })
            .collect();

        // Caps only carry emphasis when the rest of the text is not shouted too.
        let shouted = tokens.iter().filter(|t| is_shouted(t.original)).count();
        let caps_differential = shouted > 0 && shouted < tokens.len();

        let mut valences: Vec<(usize, f64)> = Vec::new();
        for (i, token) in tokens.iter().enumerate() {
            let Some(mut valence) = lookup(VALENCE, &token.lower) else {
                continue;
            };
            let sign = valence.signum();

            if caps_differential && is_shouted(token.original) {
                valence += sign * CAPS_STEP;
            }

            for (distance, damping) in [(1, 1.0), (2, 0.95), (3, 0.9)] {
                if i < distance {
                    break;
                }
                let previous = tokens[i - distance].lower.as_str();
                let step = if BOOSTERS_UP.contains(&previous) {
                    BOOSTER_STEP
                } else if BOOSTERS_DOWN.contains(&previous) {
                    -BOOSTER_STEP
                } else {
                    continue;
                };
                valence += sign * step * damping;
            }

            if tokens[i.saturating_sub(3)..i]
                .iter()
                .any(|t| is_negation(&t.lower))
            {
                valence *= NEGATION_SCALAR;
            }
            valences.push((i, valence));
        }

        if valences.is_empty() {
            return 0.0;
        }

        // Whatever follows "but" dominates what came before it.
        if let Some(pivot) = tokens.iter().position(|t| t.lower == "but") {
            for (index, valence) in valences.iter_mut() {
                if *index < pivot {
                    *valence *= 0.5;
                } else if *index > pivot {
                    *valence *= 1.5;
                }
            }
        }

        let mut sum: f64 = valences.iter().map(|(_, v)| v).sum();
        let exclamations = raw.chars().filter(|c| *c == '!').count().min(MAX_EXCLAMATIONS);
        let emphasis = exclamations as f64 * EXCLAMATION_STEP;
        if sum > 0.0 {
            sum += emphasis;
        } else if sum < 0.0 {
            sum -= emphasis;
        }

        (sum / (sum * sum + NORMALIZE_ALPHA).sqrt()).clamp(-1.0, 1.0)
    }
}

impl SignalExtractor for LexiconSentiment {
    fn name(&self) -> &'static str {
        "lexicon_sentiment"
    }

    fn extract(&self, input: &AnalysisInput<'_>) -> Result<SignalResult, SignalError> {
        Ok(SignalResult::sentiment(self.name(), self.polarity(input.raw)))
    }
}
