//! Section types produced by the structure parser and consumed by the chunker.

use serde::{Deserialize, Serialize};

/// The closed set of section kinds a paper can be classified into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionType {
    Abstract,
    Introduction,
    RelatedWork,
    Methods,
    Experiments,
    Results,
    Discussion,
    Conclusion,
    References,
    Appendix,
    Other,
}

impl SectionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SectionType::Abstract => "abstract",
            SectionType::Introduction => "introduction",
            SectionType::RelatedWork => "related_work",
            SectionType::Methods => "methods",
            SectionType::Experiments => "experiments",
            SectionType::Results => "results",
            SectionType::Discussion => "discussion",
            SectionType::Conclusion => "conclusion",
            SectionType::References => "references",
            SectionType::Appendix => "appendix",
            SectionType::Other => "other",
        }
    }

    pub fn all() -> &'static [SectionType] {
        &[
            SectionType::Abstract,
            SectionType::Introduction,
            SectionType::RelatedWork,
            SectionType::Methods,
            SectionType::Experiments,
            SectionType::Results,
            SectionType::Discussion,
            SectionType::Conclusion,
            SectionType::References,
            SectionType::Appendix,
            SectionType::Other,
        ]
    }
}

impl std::str::FromStr for SectionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "abstract" => Ok(SectionType::Abstract),
            "introduction" => Ok(SectionType::Introduction),
            "related_work" | "relatedwork" => Ok(SectionType::RelatedWork),
            "methods" => Ok(SectionType::Methods),
            "experiments" => Ok(SectionType::Experiments),
            "results" => Ok(SectionType::Results),
            "discussion" => Ok(SectionType::Discussion),
            "conclusion" => Ok(SectionType::Conclusion),
            "references" => Ok(SectionType::References),
            "appendix" => Ok(SectionType::Appendix),
            _ => Ok(SectionType::Other),
        }
    }
}

impl std::fmt::Display for SectionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A node in the parsed structure tree. Transient: exists only between
/// the structure parser and the chunking engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionNode {
    pub section_type: SectionType,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub children: Vec<SectionNode>,
}

impl SectionNode {
    pub fn new(section_type: SectionType, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            section_type,
            title: title.into(),
            body: body.into(),
            children: Vec::new(),
        }
    }

    pub fn leaf(section_type: SectionType, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new(section_type, title, body)
    }
}

/// The parser's output contract (§4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperStructure {
    pub title: String,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(rename = "abstract", default)]
    pub abstract_text: String,
    pub sections: Vec<SectionNode>,
    pub references_count: u32,
}
