//! Structure parser (§4.2): turns raw paper text into a [`PaperStructure`]
//! tree of [`SectionNode`]s, either via a JSON-mode LLM completion or, on any
//! failure of that path, a regex/keyword fallback. The fallback always
//! succeeds — parser failure is never fatal to ingestion.

use once_cell::sync::Lazy;
use quillmind_common::{PaperStructure, SectionNode, SectionType};
use quillmind_llm::{LlmRequest, LlmRole, LlmRouter, Message};
use regex::Regex;

/// Text beyond this many bytes is truncated before being sent to the LLM.
pub const MAX_STRUCTURE_INPUT_BYTES: usize = 50 * 1024;

const STRUCTURE_SYSTEM_PROMPT: &str = r#"You are a document structure parser. Given the raw text of an academic paper, return ONLY a JSON object of the form:
{"title": "...", "authors": ["..."], "abstract": "...", "references_count": 0, "sections": [{"section_type": "introduction", "title": "...", "body": "...", "children": []}]}
`section_type` must be one of: abstract, introduction, related_work, methods, experiments, results, discussion, conclusion, references, appendix, other.
Preserve the original text verbatim inside each section body — do not summarize or translate. Do not include any text outside the JSON object."#;

/// Parses `text` into a [`PaperStructure`], preferring an LLM completion and
/// falling back to the rule-based parser on any failure (§4.2 failure model).
pub async fn parse_structure(router: &LlmRouter, text: &str) -> PaperStructure {
    let truncated = truncate_bytes(text, MAX_STRUCTURE_INPUT_BYTES);

    match try_llm_parse(router, truncated).await {
        Ok(structure) => structure,
        Err(reason) => {
            tracing::warn!(%reason, "structure parser falling back to rule-based parser");
            fallback_parse(truncated)
        }
    }
}

async fn try_llm_parse(router: &LlmRouter, text: &str) -> Result<PaperStructure, String> {
    let mut req = LlmRequest::new(vec![
        Message::system(STRUCTURE_SYSTEM_PROMPT),
        Message::user(text),
    ]);
    req.json_mode = true;

    let resp = router
        .complete(LlmRole::Structured, req)
        .await
        .map_err(|e| e.to_string())?;

    let structure: PaperStructure = serde_json::from_str(&resp.content).map_err(|e| e.to_string())?;

    if structure.sections.is_empty() {
        return Err("LLM returned zero sections".to_string());
    }
    Ok(structure)
}

/// Heading cues recognised by the rule-based fallback, English and Chinese,
/// matched case-insensitively at the start of a line.
static HEADING_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?mi)^\s*(abstract|introduction|related work|background|methods?|materials and methods|experiments?|results?|discussion|conclusions?|references|bibliography|appendix|摘要|引言|相关工作|方法|实验|结果|讨论|结论|参考文献|附录)\s*:?\s*$",
    )
    .expect("static heading regex")
});

fn classify_heading(heading: &str) -> SectionType {
    match heading.to_lowercase().as_str() {
        "abstract" | "摘要" => SectionType::Abstract,
        "introduction" | "引言" => SectionType::Introduction,
        "related work" | "background" | "相关工作" => SectionType::RelatedWork,
        "methods" | "method" | "materials and methods" | "方法" => SectionType::Methods,
        "experiments" | "experiment" | "实验" => SectionType::Experiments,
        "results" | "result" | "结果" => SectionType::Results,
        "discussion" | "讨论" => SectionType::Discussion,
        "conclusions" | "conclusion" | "结论" => SectionType::Conclusion,
        "references" | "bibliography" | "参考文献" => SectionType::References,
        "appendix" | "附录" => SectionType::Appendix,
        _ => SectionType::Other,
    }
}

/// Regex/keyword fallback parser (§4.2 mechanism, fallback branch). Splits on
/// recognised heading lines; if none match, yields one catch-all `other`
/// section holding the full text.
fn fallback_parse(text: &str) -> PaperStructure {
    let mut matches: Vec<(usize, usize, &str)> = HEADING_PATTERN
        .captures_iter(text)
        .filter_map(|cap| {
            let m = cap.get(0)?;
            let heading = cap.get(1)?.as_str();
            Some((m.start(), m.end(), heading))
        })
        .collect();
    matches.sort_by_key(|(start, _, _)| *start);

    let title = text.lines().find(|l| !l.trim().is_empty()).unwrap_or("Untitled").trim().to_string();

    if matches.is_empty() {
        return PaperStructure {
            title,
            authors: Vec::new(),
            abstract_text: String::new(),
            sections: vec![SectionNode::leaf(SectionType::Other, "Document", text.trim())],
            references_count: 0,
        };
    }

    let mut sections = Vec::with_capacity(matches.len());
    for (i, (_, body_start, heading)) in matches.iter().enumerate() {
        let body_end = matches.get(i + 1).map(|(s, _, _)| *s).unwrap_or(text.len());
        let body_end = snap_to_char_boundary(text, body_end);
        let body_start = snap_to_char_boundary(text, *body_start);
        let body = text[body_start..body_end].trim();
        sections.push(SectionNode::leaf(classify_heading(heading), heading.to_string(), body));
    }

    let references_count = sections
        .iter()
        .find(|s| s.section_type == SectionType::References)
        .map(|s| s.body.lines().filter(|l| !l.trim().is_empty()).count() as u32)
        .unwrap_or(0);

    PaperStructure { title, authors: Vec::new(), abstract_text: String::new(), sections, references_count }
}

fn snap_to_char_boundary(text: &str, mut idx: usize) -> usize {
    idx = idx.min(text.len());
    while idx > 0 && !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn truncate_bytes(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    &text[..snap_to_char_boundary(text, max_bytes)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_splits_on_known_headings() {
        let text = "My Great Paper\n\nAbstract\nThis is the abstract.\n\nIntroduction\nThis is the intro.\n\nMethods\nWe did things.\n";
        let structure = fallback_parse(text);
        assert_eq!(structure.sections.len(), 3);
        assert_eq!(structure.sections[0].section_type, SectionType::Abstract);
        assert_eq!(structure.sections[1].section_type, SectionType::Introduction);
        assert_eq!(structure.sections[2].section_type, SectionType::Methods);
    }

    #[test]
    fn fallback_with_no_headings_yields_catch_all() {
        let text = "Just some plain unstructured text with no headings at all.";
        let structure = fallback_parse(text);
        assert_eq!(structure.sections.len(), 1);
        assert_eq!(structure.sections[0].section_type, SectionType::Other);
        assert_eq!(structure.sections[0].body, text);
    }

    #[test]
    fn truncate_bytes_is_char_boundary_safe() {
        let text = "段".repeat(100);
        let truncated = truncate_bytes(&text, 10);
        assert!(std::str::from_utf8(truncated.as_bytes()).is_ok());
        assert!(truncated.len() <= 10);
    }
}
