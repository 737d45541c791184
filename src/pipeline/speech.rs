//! Text cleanup for speech synthesis.
//!
//! Six stages, always in this order:
//!
//! 1. strip emoji and other pictographs
//! 2. expand casual abbreviations ("idk" -> "I don't know")
//! 3. uppercase abbreviations that should be spelled out ("omg" -> "OMG")
//! 4. collapse repeated `!`, `?`, `.`
//! 5. lowercase shouted words that are not known acronyms
//! 6. collapse whitespace and trim
//!
//! Stage 3 runs before stage 5 so spelled-out tokens are not lowercased
//! again, and stage 2 runs before stage 3 so an expanded token never gets
//! uppercased.

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

/// One casual abbreviation and its spoken form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expansion {
    pub token: String,
    pub expansion: String,
    /// Leave the token alone after a number or the word "century", so era
    /// notation such as "500 bc" survives.
    #[serde(default)]
    pub skip_after_era: bool,
}

impl Expansion {
    fn new(token: &str, expansion: &str) -> Self {
        Self {
            token: token.to_string(),
            expansion: expansion.to_string(),
            skip_after_era: false,
        }
    }
}

/// Lookup tables for [`SpeechNormalizer`]. Overridable from the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechTables {
    /// Casual abbreviations expanded to words (stage 2)
    pub expansions: Vec<Expansion>,
    /// Abbreviations forced to uppercase so they are spelled out (stage 3)
    pub spell_out: Vec<String>,
    /// Uppercase words that are intentional and must not be lowercased
    /// (stage 5). Everything in `spell_out` is implicitly included.
    pub acronyms: Vec<String>,
    /// Shortest all-caps word (in letters) treated as shouting
    pub shout_min_len: usize,
}

impl Default for SpeechTables {
    fn default() -> Self {
        let expansions = [
            ("idk", "I don't know"),
            ("idc", "I don't care"),
            ("wyd", "what are you doing"),
            ("wbu", "what about you"),
            ("hbu", "how about you"),
            ("imo", "in my opinion"),
            ("imho", "in my humble opinion"),
            ("tbh", "to be honest"),
            ("ngl", "not gonna lie"),
            ("btw", "by the way"),
            ("rn", "right now"),
            ("nvm", "never mind"),
            ("smh", "shaking my head"),
            ("ikr", "I know right"),
            ("jk", "just kidding"),
            ("lmk", "let me know"),
            ("hmu", "hit me up"),
            ("omw", "on my way"),
            ("ty", "thank you"),
            ("tysm", "thank you so much"),
            ("thx", "thanks"),
            ("np", "no problem"),
            ("pls", "please"),
            ("plz", "please"),
            ("ppl", "people"),
            ("abt", "about"),
            ("bday", "birthday"),
        ]
        .into_iter()
        .map(|(token, expansion)| Expansion::new(token, expansion))
        .chain(std::iter::once(Expansion {
            skip_after_era: true,
            ..Expansion::new("bc", "because")
        }))
        .collect();

        let spell_out = [
            "lol", "lmao", "lmfao", "rofl", "omg", "wtf", "brb", "ttyl", "fyi", "asap", "irl",
            "dm", "tbd",
        ];
        let acronyms = [
            "OK", "TV", "PC", "AI", "DJ", "ID", "US", "UK", "EU", "UN", "USA", "NY", "NYC", "LA",
            "SF", "DC", "AM", "PM", "NBA", "NFL", "FBI", "CIA", "NASA", "CEO", "DIY", "ETA",
            "FAQ", "GPS", "ATM",
        ];

        Self {
            expansions,
            spell_out: spell_out.iter().map(|s| s.to_string()).collect(),
            acronyms: acronyms.iter().map(|s| s.to_string()).collect(),
            shout_min_len: 2,
        }
    }
}

fn emoji_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"[\p{Extended_Pictographic}\x{1F3FB}-\x{1F3FF}\x{1F1E6}-\x{1F1FF}\x{FE0E}\x{FE0F}\x{200D}\x{20E3}\x{E0020}-\x{E007F}]",
        )
        .expect("emoji regex should compile")
    })
}

fn repeated_punct_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"!{2,}|\?{2,}|\.{2,}").expect("punctuation regex should compile")
    })
}

fn caps_word_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\p{Lu}[\p{Lu}']*\b").expect("caps regex should compile"))
}

fn whitespace_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("whitespace regex should compile"))
}

/// Case-insensitive, word-bounded alternation of `tokens`, longest first.
fn word_alternation(tokens: &[&str]) -> Result<Option<Regex>, regex::Error> {
    if tokens.is_empty() {
        return Ok(None);
    }
    let mut sorted = tokens.to_vec();
    sorted.sort_by_key(|t| std::cmp::Reverse(t.len()));
    let body = sorted
        .iter()
        .map(|t| regex::escape(t))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b(?:{})\b", body)).map(Some)
}

/// True when `before` ends (ignoring whitespace) in a digit or "century".
fn follows_era_marker(before: &str) -> bool {
    let trimmed = before.trim_end();
    if trimmed.ends_with(|c: char| c.is_ascii_digit()) {
        return true;
    }
    trimmed
        .rsplit(|c: char| !c.is_alphanumeric())
        .next()
        .is_some_and(|word| word.eq_ignore_ascii_case("century"))
}

/// Compiled speech normalizer. Build once per run, share freely.
#[derive(Debug)]
pub struct SpeechNormalizer {
    expansions: HashMap<String, Expansion>,
    expansion_re: Option<Regex>,
    spell_out_re: Option<Regex>,
    keep_upper: HashSet<String>,
    shout_min_len: usize,
}

impl SpeechNormalizer {
    pub fn new(tables: &SpeechTables) -> Result<Self, regex::Error> {
        let tokens: Vec<&str> = tables.expansions.iter().map(|e| e.token.as_str()).collect();
        let spell_out: Vec<&str> = tables.spell_out.iter().map(String::as_str).collect();

        Ok(Self {
            expansions: tables
                .expansions
                .iter()
                .map(|e| (e.token.to_lowercase(), e.clone()))
                .collect(),
            expansion_re: word_alternation(&tokens)?,
            spell_out_re: word_alternation(&spell_out)?,
            keep_upper: tables
                .acronyms
                .iter()
                .chain(&tables.spell_out)
                .map(|s| s.to_uppercase())
                .collect(),
            shout_min_len: tables.shout_min_len,
        })
    }

    /// Run all six stages on `text`.
    pub fn normalize(&self, text: &str) -> String {
        let text = emoji_regex().replace_all(text, "");
        let text = self.expand_abbreviations(&text);
        let text = self.spell_out(&text);
        let text = repeated_punct_regex()
            .replace_all(&text, |caps: &Captures| caps[0][..1].to_string());
        let text = self.unshout(&text);
        whitespace_regex().replace_all(&text, " ").trim().to_string()
    }

    fn expand_abbreviations(&self, text: &str) -> String {
        let Some(re) = &self.expansion_re else {
            return text.to_string();
        };
        let mut out = String::with_capacity(text.len() + 16);
        let mut last = 0;
        for m in re.find_iter(text) {
            out.push_str(&text[last..m.start()]);
            match self.expansions.get(&m.as_str().to_lowercase()) {
                Some(rule) if !(rule.skip_after_era && follows_era_marker(&text[..m.start()])) => {
                    out.push_str(&rule.expansion)
                }
                _ => out.push_str(m.as_str()),
            }
            last = m.end();
        }
        out.push_str(&text[last..]);
        out
    }

    fn spell_out(&self, text: &str) -> String {
        match &self.spell_out_re {
            Some(re) => re
                .replace_all(text, |caps: &Captures| caps[0].to_uppercase())
                .into_owned(),
            None => text.to_string(),
        }
    }

    fn unshout(&self, text: &str) -> String {
        caps_word_regex()
            .replace_all(text, |caps: &Captures| {
                let word = &caps[0];
                let letters = word.chars().filter(|c| c.is_alphabetic()).count();
                if letters < self.shout_min_len || self.keep_upper.contains(word) {
                    return word.to_string();
                }
                // Possessive of a kept word: "NASA'S" -> "NASA's"
                if let Some(base) = word.strip_suffix("'S") {
                    if self.keep_upper.contains(base) {
                        return format!("{}'s", base);
                    }
                }
                let lowered = word.to_lowercase();
                // "I'M" -> "I'm", not "i'm"
                match lowered.strip_prefix("i'") {
                    Some(rest) => format!("I'{}", rest),
                    None => lowered,
                }
            })
            .into_owned()
    }
}
