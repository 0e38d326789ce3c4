//! Keyword-based tag inference.

use regex::{Regex, RegexBuilder};
use tracing::warn;

use crate::config::TagRule;
use crate::feed::types::merge_tags;

/// Infers tags from an item's title and summary.
pub trait Tagger: Send + Sync {
    /// Tags for the given text. May be empty; never contains empty strings.
    fn infer_tags(&self, title: &str, summary: &str) -> Vec<String>;
}

/// Built-in keyword rules, as `(keyword, tag)`.
const BUILTIN_RULES: &[(&str, &str)] = &[
    ("dji", "DJI"),
    ("fpv", "FPV"),
    ("faa", "Regulations"),
    ("easa", "Regulations"),
    ("regulation", "Regulations"),
    ("regulations", "Regulations"),
    ("remote id", "Regulations"),
    ("part 107", "Regulations"),
    ("review", "Reviews"),
    ("hands-on", "Reviews"),
    ("betaflight", "Betaflight"),
    ("inav", "INAV"),
    ("ardupilot", "ArduPilot"),
    ("firmware", "Firmware"),
    ("expresslrs", "ExpressLRS"),
    ("elrs", "ExpressLRS"),
    ("goggles", "Goggles"),
    ("whoop", "Tiny Whoop"),
    ("cinewhoop", "Cinewhoop"),
    ("crash", "Crashes"),
    ("build", "Builds"),
    ("mavic", "DJI"),
    ("avata", "DJI"),
];

/// Tagger matching whole words (or phrases) case-insensitively.
pub struct KeywordTagger {
    rules: Vec<(Regex, String)>,
}

impl KeywordTagger {
    /// Tagger with only the built-in rules.
    pub fn new() -> Self {
        Self::with_rules(&[])
    }

    /// Tagger with the built-in rules followed by `extra`.
    ///
    /// Rules with an empty keyword or tag are ignored.
    pub fn with_rules(extra: &[TagRule]) -> Self {
        let builtin = BUILTIN_RULES.iter().map(|(k, t)| (*k, *t));
        let configured = extra.iter().map(|r| (r.keyword.as_str(), r.tag.as_str()));

        let mut rules = Vec::new();
        for (keyword, tag) in builtin.chain(configured) {
            let (keyword, tag) = (keyword.trim(), tag.trim());
            if keyword.is_empty() || tag.is_empty() {
                continue;
            }
            match keyword_regex(keyword) {
                Some(re) => rules.push((re, tag.to_string())),
                None => warn!("Ignoring tag rule with unusable keyword: {}", keyword),
            }
        }
        Self { rules }
    }

    /// Number of active rules.
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

impl Default for KeywordTagger {
    fn default() -> Self {
        Self::new()
    }
}

impl Tagger for KeywordTagger {
    fn infer_tags(&self, title: &str, summary: &str) -> Vec<String> {
        let matched: Vec<String> = self
            .rules
            .iter()
            .filter(|(re, _)| re.is_match(title) || re.is_match(summary))
            .map(|(_, tag)| tag.clone())
            .collect();
        merge_tags(&[], &matched)
    }
}

fn keyword_regex(keyword: &str) -> Option<Regex> {
    let pattern = format!(r"(?:^|\W){}(?:$|\W)", regex::escape(keyword));
    RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
        .ok()
}
