//! Recursive semantic chunker (§4.1). Walks a [`SectionNode`] tree depth-first
//! and emits [`Chunk`]s that respect `max_chunk_size`, splitting on a
//! priority-ordered separator list and re-stitching `chunk_overlap` characters
//! of context across a split boundary.

use quillmind_common::{Chunk, SectionNode, SectionType};

/// Separator priority order, highest first. Mixes single-byte ASCII and
/// multi-byte CJK punctuation, so every split offset must snap to a char
/// boundary — never a byte index.
const SEPARATORS: &[&str] = &["\n\n", "\n", "。", ". ", "；", "; ", "，", ", ", " "];

#[derive(Debug, Clone)]
pub struct ChunkerConfig {
    pub max_chunk_size: usize,
    pub chunk_overlap: usize,
    /// Advisory only (§4.1 edge cases) — a final residue below this is still
    /// emitted, never dropped.
    pub min_chunk_size: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self { max_chunk_size: 1000, chunk_overlap: 100, min_chunk_size: 100 }
    }
}

/// Chunk an entire parsed structure into retrieval units, in pre-order.
pub fn chunk_structure(paper_id: &str, sections: &[SectionNode], config: &ChunkerConfig) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut ordinal = 0u32;
    for section in sections {
        chunk_section(paper_id, section, &[], config, &mut ordinal, &mut chunks);
    }
    chunks
}

fn chunk_section(
    paper_id: &str,
    section: &SectionNode,
    ancestors: &[&str],
    config: &ChunkerConfig,
    ordinal: &mut u32,
    out: &mut Vec<Chunk>,
) {
    let mut path = ancestors.to_vec();
    path.push(section.title.as_str());
    let hierarchy_path = path.join(" > ");

    if !section.body.trim().is_empty() {
        let pieces = split_body(&section.body, config);
        let is_whole = pieces.len() == 1;
        for piece in pieces {
            out.push(Chunk::new(
                paper_id,
                *ordinal,
                piece,
                section.section_type,
                section.title.clone(),
                hierarchy_path.clone(),
                is_whole,
            ));
            *ordinal += 1;
        }
    }

    for child in &section.children {
        chunk_section(paper_id, child, &path, config, ordinal, out);
    }
}

/// A flat (no structure) variant for when the structure parser fell back to a
/// single catch-all blob (§4.2 fallback path).
pub fn chunk_flat(paper_id: &str, text: &str, config: &ChunkerConfig) -> Vec<Chunk> {
    let node = SectionNode::leaf(SectionType::Other, "", text);
    chunk_structure(paper_id, std::slice::from_ref(&node), config)
}

fn split_body(body: &str, config: &ChunkerConfig) -> Vec<String> {
    if char_len(body) <= config.max_chunk_size {
        return vec![body.to_string()];
    }
    let raw = raw_split(body, 0, config.max_chunk_size);
    apply_overlap(raw, config.chunk_overlap)
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn take_last_chars(s: &str, n: usize) -> String {
    let len = char_len(s);
    if len <= n {
        return s.to_string();
    }
    s.chars().skip(len - n).collect()
}

/// Splits `text` into pieces each `<= max_chunk_size` chars, without overlap.
/// Tries separators in priority order, falling back to a hard character split
/// once the separator list is exhausted (§4.1 step 4).
fn raw_split(text: &str, sep_idx: usize, max_chunk_size: usize) -> Vec<String> {
    if char_len(text) <= max_chunk_size {
        return vec![text.to_string()];
    }
    let Some(sep) = SEPARATORS.get(sep_idx) else {
        return hard_split(text, max_chunk_size);
    };
    if !text.contains(sep) {
        return raw_split(text, sep_idx + 1, max_chunk_size);
    }

    let pieces: Vec<&str> = text.split(sep).filter(|p| !p.is_empty()).collect();
    let mut chunks = Vec::new();
    let mut current = String::new();

    for piece in pieces {
        let candidate_len = if current.is_empty() {
            char_len(piece)
        } else {
            char_len(&current) + char_len(sep) + char_len(piece)
        };

        if candidate_len <= max_chunk_size {
            if !current.is_empty() {
                current.push_str(sep);
            }
            current.push_str(piece);
            continue;
        }

        if !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
        }

        if char_len(piece) > max_chunk_size {
            chunks.extend(raw_split(piece, sep_idx + 1, max_chunk_size));
        } else {
            current.push_str(piece);
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Character-window hard split, the last-resort path when no separator
/// brings a piece under the cap.
fn hard_split(text: &str, max_chunk_size: usize) -> Vec<String> {
    let max_chunk_size = max_chunk_size.max(1);
    let chars: Vec<char> = text.chars().collect();
    let mut out = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + max_chunk_size).min(chars.len());
        out.push(chars[start..end].iter().collect());
        start = end;
    }
    out
}

/// Stitches `chunk_overlap` trailing characters of each chunk onto the front
/// of the next, so cross-chunk phrases survive the split (§4.1 step 3c).
fn apply_overlap(raw: Vec<String>, chunk_overlap: usize) -> Vec<String> {
    if raw.len() <= 1 || chunk_overlap == 0 {
        return raw;
    }
    let mut out = Vec::with_capacity(raw.len());
    out.push(raw[0].clone());
    for i in 1..raw.len() {
        let prefix = take_last_chars(&raw[i - 1], chunk_overlap);
        out.push(format!("{prefix}{}", raw[i]));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_no_chunks() {
        let chunks = chunk_flat("p1", "", &ChunkerConfig::default());
        assert!(chunks.is_empty());
    }

    #[test]
    fn short_section_is_one_complete_chunk() {
        let sections = vec![SectionNode::leaf(SectionType::Abstract, "Abstract", "A short abstract.")];
        let chunks = chunk_structure("p1", &sections, &ChunkerConfig::default());
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].is_complete_section);
        assert_eq!(chunks[0].hierarchy_path, "Abstract");
    }

    #[test]
    fn long_section_splits_and_overlaps() {
        let body = "word ".repeat(500);
        let sections = vec![SectionNode::leaf(SectionType::Methods, "Methods", body)];
        let config = ChunkerConfig { max_chunk_size: 200, chunk_overlap: 20, min_chunk_size: 50 };
        let chunks = chunk_structure("p1", &sections, &config);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| !c.is_complete_section));
        // second chunk should start with the tail of the first (overlap applied)
        let tail = take_last_chars(&chunks[0].content, 20);
        assert!(chunks[1].content.starts_with(&tail));
    }

    #[test]
    fn hierarchy_path_inherits_ancestor_titles() {
        let mut parent = SectionNode::new(SectionType::Methods, "Methods", "");
        parent.children.push(SectionNode::leaf(SectionType::Methods, "Data Collection", "We collected data."));
        let chunks = chunk_structure("p1", &[parent], &ChunkerConfig::default());
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].hierarchy_path, "Methods > Data Collection");
    }

    #[test]
    fn empty_parent_with_empty_child_contributes_no_chunk() {
        let mut parent = SectionNode::new(SectionType::Results, "Results", "");
        parent.children.push(SectionNode::leaf(SectionType::Results, "Subsection", ""));
        let chunks = chunk_structure("p1", &[parent], &ChunkerConfig::default());
        assert!(chunks.is_empty());
    }

    #[test]
    fn max_chunk_size_one_exercises_hard_split() {
        let sections = vec![SectionNode::leaf(SectionType::Other, "", "abcdef")];
        let config = ChunkerConfig { max_chunk_size: 1, chunk_overlap: 0, min_chunk_size: 1 };
        let chunks = chunk_structure("p1", &sections, &config);
        assert!(chunks.len() >= 6);
    }

    #[test]
    fn cjk_separators_split_on_char_boundaries() {
        let body = "第一段内容。".repeat(100) + "最后一段。";
        let sections = vec![SectionNode::leaf(SectionType::Other, "", body)];
        let config = ChunkerConfig { max_chunk_size: 50, chunk_overlap: 5, min_chunk_size: 10 };
        let chunks = chunk_structure("p1", &sections, &config);
        assert!(chunks.len() > 1);
        for c in &chunks {
            assert!(std::str::from_utf8(c.content.as_bytes()).is_ok());
        }
    }

    #[test]
    fn ordinals_are_contiguous_from_zero() {
        let sections = vec![
            SectionNode::leaf(SectionType::Abstract, "Abstract", "Short."),
            SectionNode::leaf(SectionType::Introduction, "Introduction", "word ".repeat(500)),
        ];
        let config = ChunkerConfig { max_chunk_size: 200, chunk_overlap: 20, min_chunk_size: 50 };
        let chunks = chunk_structure("p1", &sections, &config);
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.ordinal, i as u32);
        }
    }
}
