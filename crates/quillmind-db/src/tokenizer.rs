//! CJK-aware tokenization for the sparse index (§4.3: "a tokenization that
//! handles CJK word segmentation and ASCII case-folding, stopwords ≥2
//! chars").
//!
//! tantivy's bare `SimpleTokenizer` only splits on non-alphanumeric
//! boundaries, so a run of Chinese/Japanese/Korean text with no ASCII
//! whitespace comes out as one unsplittable token and never matches BM25
//! queries over individual words. Rather than pull in a dictionary-backed
//! segmenter, `widen_cjk_runs` inserts a boundary around every CJK
//! codepoint before the text reaches the tokenizer, so each CJK character
//! becomes its own token while ASCII words are untouched — a
//! character-level segmentation that is crude but, unlike a single giant
//! token, actually participates in lexical matching.

use tantivy::tokenizer::{LowerCaser, RemoveLongFilter, SimpleTokenizer, StopWordFilter, TextAnalyzer};

pub const CONTENT_TOKENIZER: &str = "quillmind_cjk";

/// Unicode ranges treated as CJK for segmentation purposes: CJK Unified
/// Ideographs (+ Extension A), Hiragana, Katakana, and Hangul syllables.
fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x4E00..=0x9FFF | 0x3400..=0x4DBF | 0x3040..=0x309F | 0x30A0..=0x30FF | 0xAC00..=0xD7A3)
}

/// Inserts an ASCII space around every CJK codepoint so the downstream
/// `SimpleTokenizer` emits one token per CJK character instead of treating
/// an entire CJK run as a single unsplittable token.
pub fn widen_cjk_runs(text: &str) -> String {
    if !text.chars().any(is_cjk) {
        return text.to_string();
    }
    let mut out = String::with_capacity(text.len() + 16);
    for c in text.chars() {
        if is_cjk(c) {
            out.push(' ');
            out.push(c);
            out.push(' ');
        } else {
            out.push(c);
        }
    }
    out
}

/// A short, ≥2-char-only stopword list (§4.3). Single-character tokens —
/// including every individual CJK character produced by [`widen_cjk_runs`]
/// — are never in this list and so are never dropped as stopwords.
const STOPWORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "your", "with", "have", "this", "that",
    "from", "was", "were", "been", "being", "has", "had", "can", "will", "would", "could",
    "should", "into", "than", "then", "them", "they", "what", "which", "who", "whom", "these",
    "those", "there", "here", "when", "where", "why", "how", "all", "each", "few", "more",
    "most", "other", "some", "such", "only", "own", "same", "just", "also", "about",
];

/// Builds the content-field analyzer: tokenize, drop absurdly long tokens,
/// lowercase (ASCII case-folding), then drop stopwords.
pub fn content_analyzer() -> TextAnalyzer {
    TextAnalyzer::builder(SimpleTokenizer::default())
        .filter(RemoveLongFilter::limit(40))
        .filter(LowerCaser)
        .filter(StopWordFilter::remove(STOPWORDS.iter().map(|s| s.to_string()).collect()))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_text_is_left_unchanged() {
        assert_eq!(widen_cjk_runs("hello world"), "hello world");
    }

    #[test]
    fn cjk_run_is_split_into_single_character_tokens() {
        let widened = widen_cjk_runs("注意力机制");
        let chars: Vec<&str> = widened.split_whitespace().collect();
        assert_eq!(chars, vec!["注", "意", "力", "机", "制"]);
    }

    #[test]
    fn mixed_ascii_and_cjk_preserves_ascii_words() {
        let widened = widen_cjk_runs("transformer 注意力 mechanism");
        assert!(widened.split_whitespace().any(|t| t == "transformer"));
        assert!(widened.split_whitespace().any(|t| t == "mechanism"));
        assert!(widened.split_whitespace().any(|t| t == "注"));
    }

    #[test]
    fn stopwords_of_at_least_two_chars_are_filterable() {
        assert!(STOPWORDS.iter().all(|w| w.chars().count() >= 2));
    }
}
