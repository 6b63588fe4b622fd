//! Paper identity and the per-chunk metadata contract (§3).

use crate::section::SectionType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reserved paper-id prefix under which semantic-memory entries (§4.5.3) are
/// indexed. Never surfaces in user-facing paper search.
pub const MEMORY_NAMESPACE_PREFIX: &str = "memory:";

pub fn memory_namespace(user_id: &str) -> String {
    format!("{MEMORY_NAMESPACE_PREFIX}{user_id}")
}

pub fn is_memory_namespace(paper_id: &str) -> bool {
    paper_id.starts_with(MEMORY_NAMESPACE_PREFIX)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paper {
    pub paper_id: String,
    pub title: String,
    pub filename: String,
    pub owner_id: String,
    pub uploaded_at: DateTime<Utc>,
}

impl Paper {
    pub fn new(paper_id: impl Into<String>, title: impl Into<String>, filename: impl Into<String>, owner_id: impl Into<String>) -> Self {
        Self {
            paper_id: paper_id.into(),
            title: title.into(),
            filename: filename.into(),
            owner_id: owner_id.into(),
            uploaded_at: Utc::now(),
        }
    }
}

/// A retrieval-unit substring of a paper, with preserved structural metadata.
///
/// `chunk_id` is always `"{paper_id}#{ordinal}"` — see [`Chunk::chunk_id`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub paper_id: String,
    pub ordinal: u32,
    pub content: String,
    pub section_type: SectionType,
    pub section_title: String,
    /// Breadcrumb, e.g. "Methods > Data Collection", truncated to 200 chars.
    pub hierarchy_path: String,
    pub char_count: usize,
    pub is_complete_section: bool,
    pub uploaded_at: DateTime<Utc>,
}

pub const MAX_HIERARCHY_PATH_CHARS: usize = 200;

impl Chunk {
    pub fn new(
        paper_id: impl Into<String>,
        ordinal: u32,
        content: impl Into<String>,
        section_type: SectionType,
        section_title: impl Into<String>,
        hierarchy_path: impl Into<String>,
        is_complete_section: bool,
    ) -> Self {
        let content = content.into();
        let char_count = content.chars().count();
        let hierarchy_path = truncate_chars(&hierarchy_path.into(), MAX_HIERARCHY_PATH_CHARS);
        Self {
            paper_id: paper_id.into(),
            ordinal,
            content,
            section_type,
            section_title: section_title.into(),
            hierarchy_path,
            char_count,
            is_complete_section,
            uploaded_at: Utc::now(),
        }
    }

    /// Globally unique identity: `paper_id # ordinal`.
    pub fn chunk_id(&self) -> String {
        format!("{}#{}", self.paper_id, self.ordinal)
    }
}

/// Parses a `chunk_id` of the form `"{paper_id}#{ordinal}"` back into its parts.
pub fn parse_chunk_id(chunk_id: &str) -> Option<(String, u32)> {
    let (paper_id, ordinal) = chunk_id.rsplit_once('#')?;
    let ordinal: u32 = ordinal.parse().ok()?;
    Some((paper_id.to_string(), ordinal))
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_id_round_trips() {
        let c = Chunk::new("paper-1", 3, "hello", SectionType::Methods, "Methods", "Methods", true);
        assert_eq!(c.chunk_id(), "paper-1#3");
        assert_eq!(parse_chunk_id(&c.chunk_id()), Some(("paper-1".to_string(), 3)));
    }

    #[test]
    fn hierarchy_path_truncates_on_char_boundary() {
        let long = "段".repeat(300);
        let c = Chunk::new("p", 0, "x", SectionType::Methods, "t", long, false);
        assert_eq!(c.hierarchy_path.chars().count(), MAX_HIERARCHY_PATH_CHARS);
    }

    #[test]
    fn memory_namespace_is_reserved() {
        let ns = memory_namespace("u-42");
        assert_eq!(ns, "memory:u-42");
        assert!(is_memory_namespace(&ns));
        assert!(!is_memory_namespace("paper-1"));
    }
}
