use regex::RegexBuilder;

/// Canonical comparison key for a raw game title.
///
/// Lowercases, turns punctuation into spaces and collapses runs of
/// whitespace. Total: garbage input yields an empty string, never an error.
pub fn normalize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut prev_space = true;
    for ch in raw.chars() {
        if ch.is_alphanumeric() {
            for low in ch.to_lowercase() {
                out.push(low);
            }
            prev_space = false;
        } else if !prev_space {
            // Whitespace and punctuation (ascii or ®/™-style symbols) both
            // act as a single token separator.
            out.push(' ');
            prev_space = true;
        }
    }
    out.trim_end().to_string()
}

/// Exact-match linking key. Two titles refer to the same canonical Game
/// exactly when their keys are equal.
pub fn exact_match_key(name: &str) -> String {
    normalize(name)
}

/// Substring-with-gaps candidate matcher.
///
/// Requires every normalized token of the seed name to appear, in order,
/// inside the normalized form of the probed title. This is a candidate
/// generator for curated merge/enrichment flows, never a final verdict:
/// a flexible hit must be disambiguated by the caller before it is trusted.
#[derive(Debug, Clone)]
pub struct FlexibleMatcher {
    pattern: Option<regex::Regex>,
}

impl FlexibleMatcher {
    pub fn new(name: &str) -> Self {
        let key = normalize(name);
        if key.is_empty() {
            return Self { pattern: None };
        }
        let body = key
            .split_whitespace()
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*?");
        let pattern = RegexBuilder::new(&body)
            .case_insensitive(true)
            .build()
            .ok();
        Self { pattern }
    }

    pub fn is_candidate(&self, other: &str) -> bool {
        match &self.pattern {
            Some(re) => re.is_match(&normalize(other)),
            None => false,
        }
    }
}
