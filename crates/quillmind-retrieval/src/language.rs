//! Language detection and cross-lingual query translation (§4.4 steps 1-2).

use quillmind_llm::{LlmRequest, LlmRole, LlmRouter, Message};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    Zh,
    En,
    Mixed,
}

/// Ratio of CJK codepoints to total non-whitespace codepoints. `zh` if
/// `>= 0.30`, `en` if `< 0.10` and at least one Latin word is present,
/// `mixed` otherwise (§4.4 step 1).
pub fn detect_language(text: &str) -> Language {
    let mut total = 0usize;
    let mut cjk = 0usize;
    let mut has_latin_word = false;

    for word in text.split_whitespace() {
        if word.chars().any(|c| c.is_ascii_alphabetic()) {
            has_latin_word = true;
        }
        for c in word.chars() {
            total += 1;
            if is_cjk(c) {
                cjk += 1;
            }
        }
    }

    if total == 0 {
        return Language::En;
    }

    let ratio = cjk as f64 / total as f64;
    if ratio >= 0.30 {
        Language::Zh
    } else if ratio < 0.10 && has_latin_word {
        Language::En
    } else {
        Language::Mixed
    }
}

fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x4E00..=0x9FFF   // CJK Unified Ideographs
        | 0x3400..=0x4DBF // CJK Extension A
        | 0x3000..=0x303F // CJK punctuation
        | 0xFF00..=0xFFEF // fullwidth forms
    )
}

const TRANSLATE_SYSTEM_PROMPT: &str =
    "Translate the user's search query into the opposite language (Chinese <-> English). \
     Reply with ONLY the translated query text, nothing else.";

/// Translates `query` into the opposite language using the light model
/// (§4.4 step 2). On any backend failure, returns the original query —
/// translation failure is never fatal to the search.
pub async fn translate_query(router: &LlmRouter, query: &str) -> String {
    let req = LlmRequest::new(vec![Message::system(TRANSLATE_SYSTEM_PROMPT), Message::user(query)]);
    match router.complete(LlmRole::Light, req).await {
        Ok(resp) if !resp.content.trim().is_empty() => resp.content.trim().to_string(),
        Ok(_) => query.to_string(),
        Err(reason) => {
            tracing::warn!(%reason, "query translation failed, keeping original query");
            query.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_chinese_text() {
        assert_eq!(detect_language("这是一个关于机器学习的研究论文"), Language::Zh);
    }

    #[test]
    fn detects_english_text() {
        assert_eq!(detect_language("this is a paper about machine learning"), Language::En);
    }

    #[test]
    fn detects_mixed_text() {
        assert_eq!(detect_language("机器学习 machine learning"), Language::Mixed);
    }

    #[test]
    fn empty_text_defaults_to_english() {
        assert_eq!(detect_language(""), Language::En);
    }
}
