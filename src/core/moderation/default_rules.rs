// Built-in lexicons and obfuscation/threat patterns.
//
// These are only defaults: deployments override them through the
// moderation config file, which is hot-reloaded.

use super::moderation_config::PatternRule;
use super::moderation_models::Category;
use std::collections::BTreeMap;

pub type LanguageLexicon = BTreeMap<Category, Vec<String>>;

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|w| w.to_string()).collect()
}

fn english() -> LanguageLexicon {
    let mut lexicon = BTreeMap::new();
    lexicon.insert(
        Category::ThreatViolence,
        words(&[
            "kill",
            "kill yourself",
            "kys",
            "kms",
            "murder",
            "stab",
            "shoot",
            "suicide",
            "neck yourself",
            "rope yourself",
            "end yourself",
            "unalive yourself",
            "drink bleach",
            "go die",
            "hurt yourself",
            "massacre",
            "genocide",
        ]),
    );
    lexicon.insert(
        Category::HateDiscrimination,
        words(&[
            "racist",
            "nazi",
            "bigot",
            "supremacist",
            "subhuman",
            "faggot",
            "tranny",
            "chink",
            "spic",
            "wetback",
            "towelhead",
            "retard",
            "retarded",
        ]),
    );
    lexicon.insert(
        Category::Harassment,
        words(&[
            "idiot",
            "stupid",
            "moron",
            "loser",
            "worthless",
            "pathetic",
            "disgusting",
            "braindead",
            "nobody likes you",
            "everyone hates you",
            "waste of space",
            "whore",
            "slut",
        ]),
    );
    lexicon.insert(
        Category::Profanity,
        words(&[
            "fuck",
            "fucking",
            "motherfucker",
            "shit",
            "bitch",
            "ass",
            "asshole",
            "bastard",
            "dick",
            "cunt",
            "twat",
            "wtf",
            "stfu",
            "fuk",
            "fck",
            "sh1t",
            "b1tch",
            "a$$",
        ]),
    );
    lexicon
}

fn hindi() -> LanguageLexicon {
    let mut lexicon = BTreeMap::new();
    lexicon.insert(
        Category::ThreatViolence,
        words(&[
            "mar dunga",
            "maar dunga",
            "mardunga",
            "jaan se maar",
            "mar ja",
            "atmahatya",
            "मार दूंगा",
            "मर जा",
        ]),
    );
    lexicon.insert(
        Category::HateDiscrimination,
        words(&["chandal", "mleccha", "भंगी"]),
    );
    lexicon.insert(
        Category::Harassment,
        words(&[
            "kamina",
            "harami",
            "besharam",
            "nalayak",
            "bewakoof",
            "pagal",
            "कमीना",
            "हरामी",
        ]),
    );
    lexicon.insert(
        Category::Profanity,
        words(&[
            "chutiya",
            "bhosdi",
            "madarchod",
            "behenchod",
            "bc",
            "mc",
            "lund",
            "lauda",
            "randi",
            "चूतिया",
            "भोसड़ी",
        ]),
    );
    lexicon
}

pub fn default_lexicons() -> BTreeMap<String, LanguageLexicon> {
    let mut lexicons = BTreeMap::new();
    lexicons.insert("en".to_string(), english());
    lexicons.insert("hi".to_string(), hindi());
    lexicons
}

fn rule(label: &str, category: Category, regex: &str) -> PatternRule {
    PatternRule {
        label: label.to_string(),
        category,
        regex: regex.to_string(),
    }
}

pub fn default_patterns() -> Vec<PatternRule> {
    vec![
        rule(
            "threat-self-harm",
            Category::ThreatViolence,
            r"\b(k+i+l+|hurt|harm|end|unalive|neck|rope|hang)\s+(yo)?ur?\s*sel(f|ves)\b",
        ),
        rule("threat-self-harm", Category::ThreatViolence, r"\bk+y+s+\b"),
        rule(
            "threat-direct",
            Category::ThreatViolence,
            r"\b(i'?ll|i\s+will|gonna|imma|going\s+to)\s+(kill|hurt|beat|punch|stab|shoot|murder)\s+(you|u|ya)\b",
        ),
        rule(
            "threat-suicide-encouragement",
            Category::ThreatViolence,
            r"\b(go\s+die|drink\s+bleach|jump\s+off\s+a\s+(bridge|building)|(commit|do)\s+suicide)\b",
        ),
        rule(
            "hate-dehumanizing",
            Category::HateDiscrimination,
            r"\b\w+s\s+(are|r)\s+(subhuman|animals|vermin|rats|pigs|cockroaches)\b",
        ),
        rule(
            "hate-genocide",
            Category::HateDiscrimination,
            r"\b(white|black|brown)\s+(genocide|supremacy|replacement)\b",
        ),
        rule(
            "harassment-isolation",
            Category::Harassment,
            r"\b(no\s*one|nobody)\s+(likes|loves|cares\s+about)\s+(you|u)\b",
        ),
        rule(
            "profanity-obfuscated",
            Category::Profanity,
            r"\bf+[*.\-_]*[uv*@0]+[*.\-_]*c*[*.\-_]*k+(s|ed|er|ers|ing|in|y)?\b",
        ),
        rule(
            "profanity-obfuscated",
            Category::Profanity,
            r"\bs+[*.\-_]*h+[*.\-_]*[i1!*]+[*.\-_]*t+(s|ty|ted|ting|y)?\b",
        ),
        rule(
            "profanity-obfuscated",
            Category::Profanity,
            r"\bb+[*.\-_]*[i1!*]+[*.\-_]*t*[*.\-_]*c+[*.\-_]*h+(es|ed|ing|y)?\b",
        ),
    ]
}
