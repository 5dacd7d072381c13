// Language detection by Unicode script, with a stop-word refinement for
// Latin text so romanised Hindi ("Hinglish") picks the Hindi lexicon.
//
// Detection never fails: text without letters (emoji, digits, empty)
// gets the configured default language.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Script {
    Latin,
    Devanagari,
    Arabic,
    Cyrillic,
    Han,
    Hangul,
}

impl Script {
    const ALL: [Script; 6] = [
        Script::Latin,
        Script::Devanagari,
        Script::Arabic,
        Script::Cyrillic,
        Script::Han,
        Script::Hangul,
    ];

    fn of(c: char) -> Option<Script> {
        match c {
            'a'..='z' | 'A'..='Z' | '\u{00C0}'..='\u{024F}' => Some(Script::Latin),
            '\u{0900}'..='\u{097F}' => Some(Script::Devanagari),
            '\u{0600}'..='\u{06FF}' | '\u{0750}'..='\u{077F}' => Some(Script::Arabic),
            '\u{0400}'..='\u{04FF}' => Some(Script::Cyrillic),
            '\u{3400}'..='\u{4DBF}' | '\u{4E00}'..='\u{9FFF}' => Some(Script::Han),
            '\u{1100}'..='\u{11FF}' | '\u{AC00}'..='\u{D7AF}' => Some(Script::Hangul),
            _ => None,
        }
    }

    fn language(self) -> &'static str {
        match self {
            Script::Latin => "en",
            Script::Devanagari => "hi",
            Script::Arabic => "ar",
            Script::Cyrillic => "ru",
            Script::Han => "zh",
            Script::Hangul => "ko",
        }
    }
}

const HINGLISH_MARKERS: &[&str] = &[
    "hai", "hain", "nahi", "nahin", "kya", "kyu", "kyun", "tum", "tu", "tera", "teri", "mera",
    "meri", "mujhe", "tujhe", "bhai", "yaar", "accha", "acha", "kaise", "kaisa", "aur", "bhi",
    "ho", "hoga", "raha", "rahi", "karo", "kar", "ke", "ki", "ka", "se", "mein", "main", "woh",
    "yeh", "abhi", "bahut", "matlab", "chal", "ja",
];

const ENGLISH_MARKERS: &[&str] = &[
    "the", "a", "an", "is", "are", "was", "were", "you", "your", "yourself", "i", "me", "my",
    "it", "this", "that", "and", "or", "but", "to", "of", "in", "on", "for", "with", "what",
    "how", "why", "do", "does", "not", "have", "has", "be", "so", "just",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub language: String,
    /// False when the default language was used for lack of evidence.
    pub confident: bool,
}

pub struct LanguageDetector {
    default_language: String,
}

impl LanguageDetector {
    pub fn new(default_language: &str) -> Self {
        Self {
            default_language: default_language.to_string(),
        }
    }

    pub fn detect(&self, text: &str) -> Detection {
        let mut counts = [0usize; Script::ALL.len()];
        for c in text.chars() {
            if let Some(script) = Script::of(c) {
                if let Some(index) = Script::ALL.iter().position(|s| *s == script) {
                    counts[index] += 1;
                }
            }
        }

        // Strictly greater keeps ties on the earlier script.
        let mut best: Option<(Script, usize)> = None;
        for (script, count) in Script::ALL.into_iter().zip(counts) {
            if count > best.map_or(0, |(_, c)| c) {
                best = Some((script, count));
            }
        }

        match best {
            None => Detection {
                language: self.default_language.clone(),
                confident: false,
            },
            Some((Script::Latin, _)) => self.refine_latin(text),
            Some((script, _)) => Detection {
                language: script.language().to_string(),
                confident: true,
            },
        }
    }

    fn refine_latin(&self, text: &str) -> Detection {
        let lower = text.to_lowercase();
        let words: Vec<&str> = lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        let hinglish = words.iter().filter(|w| HINGLISH_MARKERS.contains(w)).count();
        let english = words.iter().filter(|w| ENGLISH_MARKERS.contains(w)).count();

        if hinglish >= 2 && hinglish > english {
            return Detection {
                language: "hi".to_string(),
                confident: true,
            };
        }

        Detection {
            language: Script::Latin.language().to_string(),
            confident: english > 0,
        }
    }
}
