//! Scored signature matching over page title, body and response headers.
//!
//! Every keyword, regex or header hit yields a `(name, score)` candidate. Candidates
//! are reduced to the best score per name, and ties at the top score are broken by
//! tier: vendor names, then strong product indicators, then generic keyword labels,
//! then anything else. Names are compared lexicographically within a tier.

pub mod signatures;

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;

use crate::types::UNKNOWN_LABEL;
use signatures::{
    GENERIC_KEYWORDS, GENERIC_PREFIX, HEADER_CLUES, REGEX_CLUES, STRONG_INDICATORS,
    VENDOR_SIGNATURES,
};

static DEFAULT: Lazy<Classifier> = Lazy::new(Classifier::new);

/// Classify with the built-in signature tables.
pub fn classify(title: &str, body: &str, headers: &[(String, String)]) -> String {
    DEFAULT.classify(title, body, headers)
}

/// Tie-break tier, lower wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Tier {
    Vendor,
    StrongIndicator,
    GenericKeyword,
    Other,
}

/// One distinct label with its best score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub name: String,
    pub score: u32,
    pub tier: Tier,
}

struct CompiledClue {
    regex: Regex,
    label: &'static str,
    score: u32,
}

pub struct Classifier {
    clues: Vec<CompiledClue>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Classifier {
    pub fn new() -> Self {
        let clues = REGEX_CLUES
            .iter()
            .filter_map(|c| match Regex::new(c.pattern) {
                Ok(regex) => Some(CompiledClue {
                    regex,
                    label: c.label,
                    score: c.score,
                }),
                Err(e) => {
                    tracing::warn!(pattern = c.pattern, "skipping invalid regex clue: {e}");
                    None
                }
            })
            .collect();
        Self { clues }
    }

    /// Best label for the inputs, or `"Unknown"` when nothing matched.
    pub fn classify(&self, title: &str, body: &str, headers: &[(String, String)]) -> String {
        self.rank(title, body, headers)
            .into_iter()
            .next()
            .map(|c| c.name)
            .unwrap_or_else(|| UNKNOWN_LABEL.to_string())
    }

    /// All distinct candidates, best first: score descending, then tier, then name.
    pub fn rank(&self, title: &str, body: &str, headers: &[(String, String)]) -> Vec<Candidate> {
        let title_l = title.to_lowercase();
        let body_l = body.to_lowercase();
        let headers_l = headers
            .iter()
            .map(|(k, v)| format!("{k}: {v}"))
            .collect::<Vec<_>>()
            .join("\n")
            .to_lowercase();
        let combined = format!("{title_l} {body_l}");

        let mut hits: Vec<(String, u32)> = Vec::new();

        for sig in VENDOR_SIGNATURES {
            for &(keyword, score) in sig.keywords {
                let kw = keyword.to_lowercase();
                if contains_term(&title_l, &kw) {
                    hits.push((sig.system.to_string(), score + 1));
                } else if contains_term(&body_l, &kw) {
                    hits.push((sig.system.to_string(), score));
                } else if contains_term(&headers_l, &kw)
                    && !hits.iter().any(|(name, _)| name == sig.system)
                {
                    hits.push((sig.system.to_string(), score.saturating_sub(1).max(1)));
                }
            }
        }

        for &(keyword, score) in GENERIC_KEYWORDS {
            let kw = keyword.to_lowercase();
            let label = format!("{GENERIC_PREFIX}{keyword})");
            if contains_term(&combined, &kw) {
                hits.push((label, score));
            } else if contains_term(&headers_l, &kw) {
                hits.push((label, score.saturating_sub(1).max(1)));
            }
        }

        if !body.is_empty() {
            for clue in &self.clues {
                for caps in clue.regex.captures_iter(body) {
                    let captured = caps.get(1).map(|m| m.as_str().trim()).unwrap_or("");
                    let name = if clue.label.contains("{}") && !captured.is_empty() {
                        clue.label.replace("{}", captured)
                    } else {
                        clue.label.to_string()
                    };
                    hits.push((name, clue.score));
                }
            }
        }

        for clue in HEADER_CLUES {
            let Some(value) = header_value(headers, clue.header) else {
                continue;
            };
            let value = value.to_lowercase();
            if let Some(&(_, label, score)) = clue
                .matches
                .iter()
                .find(|(needles, _, _)| needles.iter().any(|n| value.contains(n)))
            {
                hits.push((label.to_string(), score));
            }
        }

        let mut best: BTreeMap<String, u32> = BTreeMap::new();
        for (name, score) in hits {
            let entry = best.entry(name).or_insert(score);
            *entry = (*entry).max(score);
        }

        let mut ranked: Vec<Candidate> = best
            .into_iter()
            .map(|(name, score)| Candidate {
                tier: tier_of(&name),
                name,
                score,
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.score
                .cmp(&a.score)
                .then(a.tier.cmp(&b.tier))
                .then_with(|| a.name.cmp(&b.name))
        });
        ranked
    }
}

/// Labels produced from the generic keyword table.
pub fn is_generic(label: &str) -> bool {
    label.starts_with("Generic")
}

/// Neither generic nor unknown.
pub fn is_specific(label: &str) -> bool {
    label != UNKNOWN_LABEL && !is_generic(label)
}

fn tier_of(name: &str) -> Tier {
    if signatures::is_vendor(name) {
        return Tier::Vendor;
    }
    let lower = name.to_lowercase();
    let strong = STRONG_INDICATORS.iter().any(|t| lower.contains(t));
    let generic_label = name.starts_with(GENERIC_PREFIX);
    if (strong || signatures::is_product_keyword(name)) && (!generic_label || strong) {
        return Tier::StrongIndicator;
    }
    if generic_label {
        return Tier::GenericKeyword;
    }
    Tier::Other
}

fn header_value<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

/// Substring match that refuses to start or end inside an alphanumeric word,
/// so `tac` does not hit `contact`. Both arguments must already be lowercase.
fn contains_term(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    haystack.match_indices(needle).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + needle.len()..].chars().next();
        let edge = |c: Option<char>| c.map_or(true, |c| !c.is_alphanumeric());
        edge(before) && edge(after)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn h(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn term_matching_respects_word_edges() {
        assert!(contains_term("metasys login", "metasys"));
        assert!(contains_term("trane sc+ panel", "sc+"));
        assert!(!contains_term("contact us", "tac"));
        assert!(!contains_term("database", "bas"));
        assert!(contains_term("bas-101", "bas"));
    }

    #[test]
    fn empty_inputs_are_unknown() {
        assert_eq!(classify("", "", &[]), "Unknown");
    }

    #[test]
    fn title_hit_outranks_body_hit() {
        let ranked = Classifier::new().rank("Siemens", "honeywell", &[]);
        assert_eq!(ranked[0].name, "Siemens");
        assert_eq!(ranked[0].score, 11);
        assert_eq!(ranked[1].score, 10);
    }

    #[test]
    fn header_only_vendor_hit_is_penalised() {
        let ranked = Classifier::new().rank("", "", &h(&[("x-vendor", "Siemens AG")]));
        let siemens = ranked.iter().find(|c| c.name == "Siemens").unwrap();
        assert_eq!(siemens.score, 9);
    }

    #[test]
    fn regex_clue_uses_capture_group() {
        let body = r#"<html><!-- Powered by WebCTRL v8 --></html>"#;
        let ranked = Classifier::new().rank("", body, &[]);
        assert!(ranked.iter().any(|c| c.name == "WebCTRL (Comment)" && c.score == 9));
    }

    #[test]
    fn server_header_clue() {
        let label = classify("", "", &h(&[("Server", "Niagara Web Server/4.10")]));
        assert_eq!(label, "Tridium Niagara (Server Header)");
    }

    #[test]
    fn strong_indicator_beats_other_at_equal_score() {
        assert_eq!(tier_of("WebCTRL (Comment)"), Tier::StrongIndicator);
        assert_eq!(tier_of("Generic BMS (Meta Tag)"), Tier::GenericKeyword);
        assert_eq!(tier_of("Potential Embedded Device Login"), Tier::Other);
        assert_eq!(tier_of("Siemens"), Tier::Vendor);
    }

    #[test]
    fn generic_label_keeps_keyword_case() {
        let label = classify("", "scada overview", &[]);
        assert_eq!(label, "Generic BMS (SCADA)");
    }
}
