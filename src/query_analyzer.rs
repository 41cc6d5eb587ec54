//! Query Analyzer (QA): classifies a raw query and derives a
//! [`QueryPlan`] of per-strategy weights.

use crate::retrieval_types::{Mode, Query, QueryPlan, QueryType, Strategy};

const NATURAL_LANGUAGE_LEAD_WORDS: &[&str] = &[
    "how", "what", "why", "when", "where", "who", "which", "can", "does", "is", "are",
];

/// Classify `query.text`, then build the weighted strategy plan, honoring
/// a forced single-strategy [`Mode`] override if the caller set one.
pub fn analyze(query: &Query) -> QueryPlan {
    let query_type = classify(&query.text);
    match query.mode {
        Mode::Auto => QueryPlan {
            query_type,
            weights: weights_for(query_type),
        },
        Mode::Hybrid => QueryPlan {
            query_type,
            weights: vec![(Strategy::HybridFused, 1.0)],
        },
        Mode::Semantic => QueryPlan {
            query_type,
            weights: vec![(Strategy::Semantic, 1.0)],
        },
        Mode::Lexical => QueryPlan {
            query_type,
            weights: vec![(Strategy::ExactLexical, 1.0)],
        },
    }
}

/// Rule 1: quoted phrase (whole query or a substring).
fn has_quoted_phrase(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        return true;
    }
    trimmed.matches('"').count() >= 2
}

/// Rule 2: ≥2 tokens, each Capitalized-then-lowercase.
fn is_proper_noun_pattern(text: &str) -> bool {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    if tokens.len() < 2 {
        return false;
    }
    tokens.iter().all(|tok| {
        let mut chars = tok.chars();
        match chars.next() {
            Some(first) if first.is_uppercase() => {
                let rest: Vec<char> = chars.collect();
                !rest.is_empty() && rest.iter().all(|c| c.is_lowercase())
            }
            _ => false,
        }
    })
}

/// Rule 3: ends with `?` or begins with a natural-language lead word.
fn is_natural_language_pattern(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.ends_with('?') {
        return true;
    }
    let first_word = trimmed
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_lowercase();
    NATURAL_LANGUAGE_LEAD_WORDS.contains(&first_word.as_str())
}

/// Rule 4: any token has an internal separator or mixedCase.
fn is_technical_pattern(text: &str) -> bool {
    text.split_whitespace().any(|tok| {
        let has_separator = tok.contains(['_', '-', '.']) || tok.contains("::");
        let has_mixed_case = {
            let mut seen_lower_then_upper = false;
            let mut seen_lower = false;
            for c in tok.chars() {
                if c.is_lowercase() {
                    seen_lower = true;
                } else if c.is_uppercase() && seen_lower {
                    seen_lower_then_upper = true;
                }
            }
            seen_lower_then_upper
        };
        has_separator || has_mixed_case
    })
}

/// Classification rules, checked in order; first match wins (§4.4).
pub fn classify(text: &str) -> QueryType {
    if has_quoted_phrase(text) {
        QueryType::ExactPhrase
    } else if is_proper_noun_pattern(text) {
        QueryType::ProperNoun
    } else if is_natural_language_pattern(text) {
        QueryType::NaturalLanguage
    } else if is_technical_pattern(text) {
        QueryType::Technical
    } else {
        QueryType::Unknown
    }
}

/// Strategy plan by type (§4.4 table). Strategies with weight 0 are
/// omitted rather than included at zero, since [`QueryPlan::is_enabled`]
/// treats "present with weight > 0" as the enabled condition.
fn weights_for(query_type: QueryType) -> Vec<(Strategy, f64)> {
    use Strategy::*;
    match query_type {
        QueryType::ExactPhrase => vec![(ExactLexical, 0.50), (Semantic, 0.20), (HybridFused, 0.30)],
        QueryType::ProperNoun => vec![
            (ExactLexical, 0.30),
            (Semantic, 0.20),
            (HybridFused, 0.40),
            (RelaxedLexical, 0.10),
        ],
        QueryType::NaturalLanguage => vec![
            (Semantic, 0.50),
            (HybridFused, 0.40),
            (RelaxedLexical, 0.10),
        ],
        QueryType::Technical => vec![
            (ExactLexical, 0.25),
            (Semantic, 0.25),
            (HybridFused, 0.40),
            (RelaxedLexical, 0.10),
        ],
        QueryType::Unknown => vec![
            (ExactLexical, 0.25),
            (Semantic, 0.25),
            (HybridFused, 0.35),
            (RelaxedLexical, 0.15),
        ],
    }
}
