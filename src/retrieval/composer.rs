//! Result Composer
//!
//! Turns accepted candidates into the response shape: ranked, regulation
//! chunks merged per article, truncated to per-category limits.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt::Write as _;

use super::scorer::{rank_order, ScoredCandidate};
use crate::embedding::truncate_chars;
use crate::types::{Category, DocumentDetail};

const EMPTY_CATEGORY_TEXT: &str = "No related cases found.";
const CONTEXT_BODY_CHARS: usize = 600;

/// One document as handed to the briefing generator
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedDocument {
    pub id: String,
    pub category: Category,
    pub title: String,
    pub content: String,
    pub score: f64,
    pub vector_score: f64,
    pub detail: DocumentDetail,
}

impl RetrievedDocument {
    fn from_scored(c: ScoredCandidate) -> Self {
        Self {
            id: c.document.id.clone(),
            category: c.document.category(),
            title: c.document.title,
            content: c.document.body,
            score: c.final_score,
            vector_score: c.vector_score,
            detail: c.document.detail,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetrievalResult {
    pub profile_id: String,
    pub incidents: Vec<RetrievedDocument>,
    pub education: Vec<RetrievedDocument>,
    pub regulations: Vec<RetrievedDocument>,
}

impl RetrievalResult {
    pub fn get(&self, category: Category) -> &[RetrievedDocument] {
        match category {
            Category::Incident => &self.incidents,
            Category::Education => &self.education,
            Category::Regulation => &self.regulations,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.incidents.is_empty() && self.education.is_empty() && self.regulations.is_empty()
    }

    /// Plain-text context block for the briefing generator
    pub fn render_context(&self) -> String {
        let mut out = String::new();
        for category in [Category::Incident, Category::Regulation, Category::Education] {
            let heading = match category {
                Category::Incident => "Related incidents",
                Category::Regulation => "Related regulations",
                Category::Education => "Related training materials",
            };
            let _ = writeln!(out, "## {heading}");

            let docs = self.get(category);
            if docs.is_empty() {
                let _ = writeln!(out, "{EMPTY_CATEGORY_TEXT}");
            }
            for (i, doc) in docs.iter().enumerate() {
                let label = match &doc.detail {
                    DocumentDetail::Regulation(r)
                        if !r.article_number.is_empty() && !doc.title.contains(&r.article_number) =>
                    {
                        format!("{} (Article {})", doc.title, r.article_number)
                    }
                    DocumentDetail::Incident(d) if !d.date.is_empty() => {
                        format!("{} ({})", doc.title, d.date)
                    }
                    _ => doc.title.clone(),
                };
                let _ = writeln!(out, "{}. {label}", i + 1);
                let body = truncate_chars(doc.content.trim(), CONTEXT_BODY_CHARS);
                if !body.is_empty() {
                    let _ = writeln!(out, "{body}");
                }
            }
            out.push('\n');
        }
        out.trim_end().to_string()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ResultComposer {
    incident_limit: usize,
    education_limit: usize,
    regulation_limit: usize,
}

impl ResultComposer {
    pub fn new(incident_limit: usize, education_limit: usize, regulation_limit: usize) -> Self {
        Self {
            incident_limit,
            education_limit,
            regulation_limit,
        }
    }

    fn limit(&self, category: Category) -> usize {
        match category {
            Category::Incident => self.incident_limit,
            Category::Education => self.education_limit,
            Category::Regulation => self.regulation_limit,
        }
    }

    /// Rank, merge (regulations only) and truncate one category.
    pub fn compose_category(
        &self,
        category: Category,
        mut accepted: Vec<ScoredCandidate>,
    ) -> Vec<RetrievedDocument> {
        accepted.sort_by(rank_order);
        if category == Category::Regulation {
            accepted = merge_articles(accepted);
        }
        accepted
            .into_iter()
            .take(self.limit(category))
            .map(RetrievedDocument::from_scored)
            .collect()
    }

    pub fn compose(
        &self,
        profile_id: &str,
        incidents: Vec<ScoredCandidate>,
        education: Vec<ScoredCandidate>,
        regulations: Vec<ScoredCandidate>,
    ) -> RetrievalResult {
        RetrievalResult {
            profile_id: profile_id.to_string(),
            incidents: self.compose_category(Category::Incident, incidents),
            education: self.compose_category(Category::Education, education),
            regulations: self.compose_category(Category::Regulation, regulations),
        }
    }
}

/// Collapse ranked chunks of the same article of the same regulation into
/// the best-ranked one, carrying the longest body of the group.
fn merge_articles(ranked: Vec<ScoredCandidate>) -> Vec<ScoredCandidate> {
    let mut merged: Vec<ScoredCandidate> = Vec::with_capacity(ranked.len());
    let mut slot_of: HashMap<(String, String), usize> = HashMap::new();

    for candidate in ranked {
        let article = match &candidate.document.detail {
            DocumentDetail::Regulation(r) if !r.article_number.is_empty() => {
                (r.source.clone(), r.article_number.clone())
            }
            _ => {
                merged.push(candidate);
                continue;
            }
        };
        match slot_of.get(&article) {
            Some(&slot) => {
                let kept = &mut merged[slot];
                if candidate.document.body.chars().count() > kept.document.body.chars().count() {
                    kept.document.body = candidate.document.body;
                }
            }
            None => {
                slot_of.insert(article, merged.len());
                merged.push(candidate);
            }
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::scorer::ScoreSignals;
    use crate::types::{Document, IncidentDetail, RegulationDetail};
    use std::collections::BTreeSet;

    fn regulation(id: &str, article: &str, body: &str, score: f64) -> ScoredCandidate {
        regulation_from("Safety Rules", id, article, body, score)
    }

    fn regulation_from(
        source: &str,
        id: &str,
        article: &str,
        body: &str,
        score: f64,
    ) -> ScoredCandidate {
        ScoredCandidate {
            document: Document {
                id: id.to_string(),
                title: format!("Article {article}"),
                body: body.to_string(),
                tags: BTreeSet::new(),
                risk_keywords: String::new(),
                detail: DocumentDetail::Regulation(RegulationDetail {
                    article_number: article.to_string(),
                    source: source.to_string(),
                    ..Default::default()
                }),
            },
            vector_score: score,
            signals: ScoreSignals::default(),
            final_score: score,
            excluded: false,
        }
    }

    fn incident(id: &str, score: f64) -> ScoredCandidate {
        ScoredCandidate {
            document: Document {
                id: id.to_string(),
                title: id.to_string(),
                body: "body".to_string(),
                tags: BTreeSet::new(),
                risk_keywords: String::new(),
                detail: DocumentDetail::Incident(IncidentDetail::default()),
            },
            vector_score: score,
            signals: ScoreSignals::default(),
            final_score: score,
            excluded: false,
        }
    }

    #[test]
    fn test_merges_chunks_of_same_article() {
        let composer = ResultComposer::new(5, 5, 5);
        let docs = composer.compose_category(
            Category::Regulation,
            vec![
                regulation("r-323-0", "323", "short", 0.4),
                regulation("r-323-1", "323", "a much longer chunk of the article", 0.6),
                regulation("r-324-0", "324", "other article", 0.5),
            ],
        );

        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].id, "r-323-1");
        assert!((docs[0].score - 0.6).abs() < 1e-9);
        assert_eq!(docs[0].content, "a much longer chunk of the article");
        assert_eq!(docs[1].id, "r-324-0");
    }

    #[test]
    fn test_longer_body_replaces_best_chunk_body() {
        let composer = ResultComposer::new(5, 5, 5);
        let docs = composer.compose_category(
            Category::Regulation,
            vec![
                regulation("r-1-0", "1", "tiny", 0.9),
                regulation("r-1-1", "1", "the longest body of article one", 0.2),
            ],
        );
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, "r-1-0");
        assert!((docs[0].score - 0.9).abs() < 1e-9);
        assert_eq!(docs[0].content, "the longest body of article one");
    }

    #[test]
    fn test_same_article_number_from_other_regulation_is_kept() {
        let composer = ResultComposer::new(5, 5, 5);
        let docs = composer.compose_category(
            Category::Regulation,
            vec![
                regulation_from("Safety Rules", "s-38-0", "38", "work plan", 0.8),
                regulation_from("Electrical Code", "e-38-0", "38", "earthing of frames", 0.7),
                regulation_from("Electrical Code", "e-38-1", "38", "earthing", 0.3),
            ],
        );
        let ids: Vec<_> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["s-38-0", "e-38-0"]);
        assert_eq!(docs[1].content, "earthing of frames");
    }

    #[test]
    fn test_truncates_to_limit_in_rank_order() {
        let composer = ResultComposer::new(2, 5, 5);
        let docs = composer.compose_category(
            Category::Incident,
            vec![incident("a", 0.3), incident("b", 0.9), incident("c", 0.6)],
        );
        let ids: Vec<_> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }

    #[test]
    fn test_render_context_marks_empty_categories() {
        let composer = ResultComposer::new(5, 5, 5);
        let result = composer.compose(
            "electrical-hv",
            vec![incident("Switchgear electrocution", 0.7)],
            Vec::new(),
            vec![regulation("r", "323", "insulating protective equipment", 0.5)],
        );
        let text = result.render_context();
        assert!(text.contains("## Related incidents\n1. Switchgear electrocution"));
        assert!(text.contains("Article 323"));
        assert!(text.contains("## Related training materials\nNo related cases found."));
        assert!(!result.is_empty());
        assert!(RetrievalResult::default().render_context().matches(EMPTY_CATEGORY_TEXT).count() == 3);
    }
}
