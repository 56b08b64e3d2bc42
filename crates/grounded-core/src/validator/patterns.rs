//! Shared text patterns for claim extraction and entailment.
//!
//! Claim decomposition and the lexical entailment scorer must tokenize
//! answers and evidence identically, so both go through this module.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{BTreeSet, HashSet};

lazy_static! {
    // =========================================================================
    // SEGMENTATION
    // =========================================================================

    /// Sentence and clause boundaries: terminal punctuation followed by
    /// whitespace, semicolons, and contrastive ", but".
    static ref CLAIM_BOUNDARY: Regex = Regex::new(
        r"(?:[.!?]+\s+|;\s+|,\s+but\s+)"
    ).unwrap();

    /// Leading list markers: "- ", "* ", "• ", "1. ", "2) "
    static ref LIST_MARKER: Regex = Regex::new(
        r"^\s*(?:[-*•]|\d+[.)])\s+"
    ).unwrap();

    /// Inline citation markers and markdown emphasis
    static ref MARKUP: Regex = Regex::new(
        r"(?i)\[(?:source|page)[^\]]*\]|\*\*|__|`"
    ).unwrap();

    /// Word and number tokens; numbers keep internal separators ("4.2", "1,000")
    static ref TOKEN: Regex = Regex::new(
        r"[\p{L}\p{N}]+(?:[.,]\p{N}+)*"
    ).unwrap();

    // =========================================================================
    // POLARITY
    // =========================================================================

    static ref NEGATION: Regex = Regex::new(
        r"(?i)\b(?:not|no|never|none|neither|nor|cannot|without)\b|n't\b"
    ).unwrap();

    // =========================================================================
    // DECLINE DETECTION
    // =========================================================================

    /// Phrases that decline to answer for lack of evidence.
    static ref DECLINE_PATTERNS: Vec<Regex> = vec![
        // "I don't know", "I cannot answer", "I am unable to determine"
        Regex::new(
            r"(?i)\bi\s+(?:do\s+not|don't|cannot|can't|can\s+not|am\s+unable\s+to|am\s+not\s+able\s+to)\s+(?:know|find|answer|determine|say|tell)"
        ).unwrap(),
        // "cannot be determined", "unable to answer"
        Regex::new(
            r"(?i)\b(?:cannot|can't|can\s+not|unable\s+to|not\s+possible\s+to)\s+(?:be\s+)?(?:answer|answered|determine|determined|find|found|say|tell)"
        ).unwrap(),
        // "is not mentioned in the documents"
        Regex::new(
            r"(?i)\b(?:not|isn't|aren't|wasn't|weren't)\s+(?:explicitly\s+)?(?:mentioned|provided|stated|specified|included|available|given|found|covered|addressed)\s+in\s+(?:the|any\s+of\s+the|your)\s+(?:provided\s+)?(?:context|documents?|passages?|evidence|sources?|text|excerpts?)"
        ).unwrap(),
        // "the documents do not contain"
        Regex::new(
            r"(?i)\b(?:context|documents?|passages?|evidence|sources?|text|excerpts?)\s+(?:does\s+not|doesn't|do\s+not|don't|did\s+not|didn't)\s+(?:appear\s+to\s+)?(?:contain|provide|include|mention|specify|say|state|cover|address)"
        ).unwrap(),
        // "there is insufficient information", "not enough evidence"
        Regex::new(
            r"(?i)\b(?:no|insufficient|not\s+enough|lack\s+of)\s+(?:relevant\s+)?(?:information|evidence|context)\b"
        ).unwrap(),
    ];
}

/// Words that carry no factual content of their own.
///
/// Includes meta vocabulary ("context", "documents", "according") so that
/// "According to the documents, X" is checked as "X".
const STOPWORDS: &[&str] = &[
    "a", "about", "above", "according", "after", "again", "all", "also", "am", "an", "and",
    "answer", "any", "are", "as", "at", "based", "be", "been", "being", "both", "but", "by", "can",
    "certainly", "context", "could", "did", "do", "document", "documents", "does", "doing", "during",
    "each", "evidence", "excerpt", "excerpts", "few", "following", "for", "from", "further", "had", "has",
    "have", "having", "he", "her", "here", "hers", "him", "his", "how", "however", "i", "if",
    "in", "information", "into", "is", "it", "its", "itself", "just", "me", "mentioned",
    "more", "most", "my", "neither", "never", "no", "none", "nor", "not", "of", "on", "once",
    "only", "or", "other", "our", "out", "over", "own", "passage", "passages", "provided",
    "question", "same", "she", "should", "so", "some", "source", "sources", "stated", "states", "such", "sure",
    "text", "than", "that", "the", "their", "them", "then", "there", "these", "they", "this",
    "those", "through", "to", "too", "under", "until", "up", "very", "was", "we", "were",
    "what", "when", "where", "which", "while", "who", "whom", "why", "will", "with", "would",
    "yes", "you", "your",
];

/// Words a decline uses to talk about itself rather than the world.
const DECLINE_VOCABULARY: &[&str] = &[
    "able", "afraid", "appear", "clear", "contain", "cover", "detail", "determine", "enough",
    "explicitly", "find", "found", "insufficient", "know", "lack", "mention", "regarding",
    "relevant", "say", "sorry", "specific", "tell", "unable", "unfortunately",
];

lazy_static! {
    static ref STOPWORD_SET: HashSet<&'static str> = STOPWORDS.iter().copied().collect();
    static ref DECLINE_VOCABULARY_SET: HashSet<&'static str> =
        DECLINE_VOCABULARY.iter().copied().collect();
}

/// Content terms and numbers of a piece of text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Terms {
    /// Stemmed, lowercased content words
    pub words: BTreeSet<String>,

    /// Numeric tokens with thousands separators removed
    pub numbers: BTreeSet<String>,

    /// Words written capitalized in the text (names, places); a subset of `words`
    pub names: BTreeSet<String>,
}

impl Terms {
    pub fn is_empty(&self) -> bool {
        self.words.is_empty() && self.numbers.is_empty()
    }

    /// Terms not present in `other`.
    pub fn without(&self, other: &Terms) -> Terms {
        Terms {
            words: self.words.difference(&other.words).cloned().collect(),
            numbers: self.numbers.difference(&other.numbers).cloned().collect(),
            names: self.names.difference(&other.words).cloned().collect(),
        }
    }
}

/// Remove citation markers and markdown emphasis.
pub fn strip_markup(text: &str) -> String {
    MARKUP.replace_all(text, "").into_owned()
}

/// Split text into claim-sized segments (sentences and clauses).
pub fn segments(text: &str) -> Vec<String> {
    let mut out = Vec::new();
    for line in text.lines() {
        let line = LIST_MARKER.replace(line, "");
        for piece in CLAIM_BOUNDARY.split(&line) {
            let piece = piece
                .trim()
                .trim_end_matches(|c: char| matches!(c, '.' | '!' | '?' | ':' | ','))
                .trim();
            if !piece.is_empty() {
                out.push(piece.to_string());
            }
        }
    }
    out
}

/// Extract content terms from text.
pub fn terms(text: &str) -> Terms {
    let mut result = Terms::default();
    for m in TOKEN.find_iter(text) {
        let token = m.as_str().to_lowercase();
        if token.starts_with(|c: char| c.is_ascii_digit()) {
            result.numbers.insert(token.replace(',', ""));
            continue;
        }
        if token.chars().count() < 2 || STOPWORD_SET.contains(token.as_str()) {
            continue;
        }
        let word = stem(&token);
        if m.as_str().starts_with(char::is_uppercase) {
            result.names.insert(word.clone());
        }
        result.words.insert(word);
    }
    result
}

/// Content terms of a decline once its decline phrasing is removed.
///
/// What is left is either the topic being declined ("... about the capital")
/// or a statement smuggled in beside the decline.
pub fn decline_residue(text: &str) -> Terms {
    let mut rest = text.to_string();
    for pattern in DECLINE_PATTERNS.iter() {
        rest = pattern.replace_all(&rest, " ").into_owned();
    }
    let mut residue = terms(&rest);
    residue
        .words
        .retain(|w| !DECLINE_VOCABULARY_SET.contains(w.as_str()));
    residue
        .names
        .retain(|w| !DECLINE_VOCABULARY_SET.contains(w.as_str()));
    residue
}

/// Light suffix stripping so "capitals"/"capital" and "cities"/"city" meet.
pub fn stem(word: &str) -> String {
    if word.len() > 4 && word.ends_with("ies") {
        return format!("{}y", &word[..word.len() - 3]);
    }
    if word.len() > 3 && word.ends_with('s') && !word.ends_with("ss") && !word.ends_with("us") {
        return word[..word.len() - 1].to_string();
    }
    word.to_string()
}

/// Check if text contains a negation.
pub fn is_negated(text: &str) -> bool {
    NEGATION.is_match(text)
}

/// Check if text declines to answer for lack of evidence.
pub fn is_decline(text: &str) -> bool {
    DECLINE_PATTERNS.iter().any(|p| p.is_match(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segments_split_sentences_and_lists() {
        let text = "The capital is Rivermouth. It has 4.2 million people!\n- Founded in 1820\n2) Lies on the coast";
        let segs = segments(text);
        assert_eq!(
            segs,
            vec![
                "The capital is Rivermouth",
                "It has 4.2 million people",
                "Founded in 1820",
                "Lies on the coast",
            ]
        );
    }

    #[test]
    fn test_segments_split_contrastive_clause() {
        let segs = segments("The documents do not name the capital, but the population is 4.2 million.");
        assert_eq!(segs.len(), 2);
        assert_eq!(segs[1], "the population is 4.2 million");
    }

    #[test]
    fn test_terms_drop_stopwords_and_keep_numbers() {
        let t = terms("According to the documents, the population is 1,200 people.");
        assert!(t.words.contains("population"));
        assert!(t.words.contains("people"));
        assert!(!t.words.contains("documents"));
        assert!(t.numbers.contains("1200"));
    }

    #[test]
    fn test_stem() {
        assert_eq!(stem("cities"), "city");
        assert_eq!(stem("capitals"), "capital");
        assert_eq!(stem("glass"), "glass");
        assert_eq!(stem("census"), "census");
    }

    #[test]
    fn test_strip_markup() {
        assert_eq!(
            strip_markup("**Rivermouth** [Source: atlas.pdf, Page 3]"),
            "Rivermouth "
        );
    }

    #[test]
    fn test_decline_detection() {
        assert!(is_decline("I don't know the answer to that."));
        assert!(is_decline("The provided documents do not contain information about the capital."));
        assert!(is_decline("The capital is not mentioned in the context."));
        assert!(is_decline("There is insufficient information to answer."));
        assert!(is_decline("This cannot be determined from the passages."));
        assert!(!is_decline("The capital is Rivermouth."));
    }

    #[test]
    fn test_capitalized_words_are_names() {
        let t = terms("Stonebridge became the capital of Veridia.");
        assert!(t.names.contains("stonebridge"));
        assert!(t.names.contains("veridia"));
        assert!(!t.names.contains("capital"));
        assert!(t.words.contains("capital"));
    }

    #[test]
    fn test_decline_residue() {
        let topic = decline_residue("The provided documents do not contain information about the capital.");
        assert_eq!(topic.words.iter().collect::<Vec<_>>(), vec!["capital"]);

        assert!(decline_residue("Unfortunately, there is insufficient information to answer.").is_empty());

        let smuggled = decline_residue("Stonebridge became the capital in 1820 with no evidence of unrest.");
        assert!(smuggled.words.contains("stonebridge"));
        assert!(smuggled.words.contains("unrest"));
        assert!(smuggled.numbers.contains("1820"));
    }

    #[test]
    fn test_negation() {
        assert!(is_negated("Rivermouth is not the capital"));
        assert!(is_negated("It isn't on the coast"));
        assert!(!is_negated("Rivermouth is the capital"));
    }
}
