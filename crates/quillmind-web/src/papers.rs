//! Lightweight ownership cache for papers ingested through this process.
//!
//! §1 excludes the relational store that durably owns `Paper` rows from the
//! core; the HTTP edge still needs *some* answer to "does this caller own
//! this paper_id" for the validation/not-found split in §7. This is that
//! answer — populated on `/vector/index`, consulted by every endpoint that
//! scopes a search or delete to one `paper_id`. It is deliberately not the
//! system of record: a caller policy deleting the backing relational row
//! does not need to tell this cache.

use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub struct PaperRecord {
    pub owner_id: String,
    pub title: String,
    pub filename: String,
}

#[derive(Default)]
pub struct PaperRegistry {
    papers: Mutex<HashMap<String, PaperRecord>>,
}

impl PaperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, paper_id: impl Into<String>, owner_id: impl Into<String>, title: impl Into<String>, filename: impl Into<String>) {
        self.papers.lock().unwrap().insert(
            paper_id.into(),
            PaperRecord { owner_id: owner_id.into(), title: title.into(), filename: filename.into() },
        );
    }

    /// `Some(true)` if known and owned by `owner_id`, `Some(false)` if known
    /// and owned by someone else, `None` if never ingested by this process.
    pub fn is_owned_by(&self, paper_id: &str, owner_id: &str) -> Option<bool> {
        self.papers.lock().unwrap().get(paper_id).map(|rec| rec.owner_id == owner_id)
    }

    pub fn forget(&self, paper_id: &str) {
        self.papers.lock().unwrap().remove(paper_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_paper_is_none() {
        let reg = PaperRegistry::new();
        assert_eq!(reg.is_owned_by("p1", "u1"), None);
    }

    #[test]
    fn owner_mismatch_is_some_false() {
        let reg = PaperRegistry::new();
        reg.record("p1", "u1", "Title", "file.pdf");
        assert_eq!(reg.is_owned_by("p1", "u2"), Some(false));
        assert_eq!(reg.is_owned_by("p1", "u1"), Some(true));
    }

    #[test]
    fn forget_removes_the_record() {
        let reg = PaperRegistry::new();
        reg.record("p1", "u1", "Title", "file.pdf");
        reg.forget("p1");
        assert_eq!(reg.is_owned_by("p1", "u1"), None);
    }
}
