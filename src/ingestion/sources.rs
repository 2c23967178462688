//! Source corpora: incident cases, education material and regulation text
//!
//! Raw records are turned into `Document`s with labelled embedding text and
//! stable ids, so re-ingesting the same corpus rewrites the same records.

use serde::Deserialize;
use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use tracing::{info, warn};

use super::chunking::TextSplitter;
use super::IngestError;
use crate::config::{IngestionConfig, SourcesConfig};
use crate::types::{
    Category, Document, DocumentDetail, EducationDetail, IncidentDetail, RegulationDetail,
};

// ============================================================================
// Raw records
// ============================================================================

/// One accident case as exported from the case database
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IncidentRecord {
    pub title: String,
    pub date: String,
    pub location: String,
    pub industry: String,
    pub work_type: String,
    pub accident_type: String,
    pub damage: String,
    pub summary: String,
    pub direct_cause: String,
    pub root_cause: String,
    pub risk_keywords: String,
    pub prevention: String,
}

/// One education / training material entry
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EducationRecord {
    pub title: String,
    pub date: String,
    pub doc_number: String,
    #[serde(rename = "type")]
    pub material_type: String,
    pub keywords: String,
    pub content: String,
    pub url: String,
    pub file_url: String,
}

/// One already-split regulation article
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ArticleRecord {
    pub article_number: String,
    pub title: String,
    #[serde(alias = "content")]
    pub body: String,
}

// ============================================================================
// Stable ids
// ============================================================================

/// `<category>-<md5 of the identity parts>`
pub fn stable_id(category: Category, parts: &[&str]) -> String {
    let digest = md5::compute(parts.join("\u{1f}").as_bytes());
    format!("{}-{:x}", category.as_str(), digest)
}

// ============================================================================
// Document composition
// ============================================================================

fn push_line(out: &mut String, label: &str, value: &str) {
    if !out.is_empty() {
        out.push('\n');
    }
    out.push_str(label);
    out.push_str(": ");
    out.push_str(value.trim());
}

fn non_empty_tags<'a>(values: impl IntoIterator<Item = &'a str>) -> BTreeSet<String> {
    values
        .into_iter()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_lowercase)
        .collect()
}

pub fn incident_document(record: &IncidentRecord) -> Document {
    let mut body = String::new();
    push_line(&mut body, "Title", &record.title);
    push_line(&mut body, "Date", &record.date);
    push_line(&mut body, "Location", &record.location);
    push_line(&mut body, "Industry", &record.industry);
    push_line(&mut body, "Work type", &record.work_type);
    push_line(&mut body, "Accident type", &record.accident_type);
    push_line(&mut body, "Damage", &record.damage);
    push_line(&mut body, "Summary", &record.summary);
    push_line(&mut body, "Direct cause", &record.direct_cause);
    push_line(&mut body, "Root cause", &record.root_cause);
    push_line(&mut body, "Risk keywords", &record.risk_keywords);
    push_line(&mut body, "Prevention", &record.prevention);

    Document {
        id: stable_id(
            Category::Incident,
            &[
                &record.title,
                &record.date,
                &record.location,
                &record.summary,
                &record.direct_cause,
                &record.root_cause,
            ],
        ),
        title: record.title.trim().to_string(),
        body,
        tags: non_empty_tags([
            record.industry.as_str(),
            record.work_type.as_str(),
            record.accident_type.as_str(),
        ]),
        risk_keywords: record.risk_keywords.trim().to_string(),
        detail: DocumentDetail::Incident(IncidentDetail {
            date: record.date.clone(),
            location: record.location.clone(),
            industry: record.industry.clone(),
            work_type: record.work_type.clone(),
            accident_type: record.accident_type.clone(),
            severity: record.damage.clone(),
            summary: record.summary.clone(),
            direct_cause: record.direct_cause.clone(),
            root_cause: record.root_cause.clone(),
            prevention: record.prevention.clone(),
        }),
    }
}

pub fn education_document(record: &EducationRecord) -> Document {
    let mut body = String::new();
    push_line(&mut body, "Title", &record.title);
    push_line(&mut body, "Date", &record.date);
    push_line(&mut body, "Doc number", &record.doc_number);
    push_line(&mut body, "Type", &record.material_type);
    push_line(&mut body, "Keywords", &record.keywords);
    push_line(&mut body, "Content", &record.content);
    push_line(&mut body, "URL", &record.url);
    push_line(&mut body, "Attachment", &record.file_url);

    Document {
        id: stable_id(
            Category::Education,
            &[&record.doc_number, &record.title, &record.date, &record.content],
        ),
        title: record.title.trim().to_string(),
        body,
        tags: non_empty_tags(record.keywords.split(',')),
        risk_keywords: record.keywords.trim().to_string(),
        detail: DocumentDetail::Education(EducationDetail {
            date: record.date.clone(),
            doc_number: record.doc_number.clone(),
            material_type: record.material_type.clone(),
            source_url: record.url.clone(),
            file_url: record.file_url.clone(),
        }),
    }
}

/// Chunk an article into regulation documents sharing its article number.
pub fn regulation_documents(
    article: &ArticleRecord,
    source: &str,
    splitter: &TextSplitter,
) -> Vec<Document> {
    splitter
        .split(&article.body)
        .into_iter()
        .enumerate()
        .map(|(chunk_index, chunk)| Document {
            id: stable_id(
                Category::Regulation,
                &[source, &article.article_number, &article.title, &chunk_index.to_string()],
            ),
            title: article.title.clone(),
            body: chunk,
            tags: BTreeSet::new(),
            risk_keywords: String::new(),
            detail: DocumentDetail::Regulation(RegulationDetail {
                article_number: article.article_number.clone(),
                article_title: article.title.clone(),
                source: source.to_string(),
                chunk_index,
            }),
        })
        .collect()
}

// ============================================================================
// Statute splitting
// ============================================================================

/// Split raw statute text into articles.
///
/// An article starts at a line beginning with `제N조` (optionally `제N조의M`)
/// or `Article N` (optionally `Article N-M`). The header line becomes the
/// title; text before the first header is dropped.
pub fn split_articles(text: &str) -> Result<Vec<ArticleRecord>, regex::Error> {
    let header = regex::Regex::new(
        r"(?m)^[ \t]*(?:제\s*(\d+)\s*조(?:\s*의\s*(\d+))?|(?i:article)\s+(\d+)(?:-(\d+))?)",
    )?;

    let starts: Vec<(usize, String)> = header
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let main = caps.get(1).or_else(|| caps.get(3))?.as_str();
            let number = match caps.get(2).or_else(|| caps.get(4)) {
                Some(sub) => format!("{main}-{}", sub.as_str()),
                None => main.to_string(),
            };
            Some((whole.start(), number))
        })
        .collect();

    let mut articles = Vec::with_capacity(starts.len());
    for (i, (start, number)) in starts.iter().enumerate() {
        let end = starts.get(i + 1).map_or(text.len(), |(next, _)| *next);
        let body = text[*start..end].trim();
        if body.is_empty() {
            continue;
        }
        let title = body.lines().next().unwrap_or_default().trim().to_string();
        articles.push(ArticleRecord {
            article_number: number.clone(),
            title,
            body: body.to_string(),
        });
    }
    Ok(articles)
}

// ============================================================================
// Corpus
// ============================================================================

/// Prepared documents for the three ingestion phases
#[derive(Debug, Clone, Default)]
pub struct SourceCorpus {
    incidents: Vec<Document>,
    education: Vec<Document>,
    regulations: Vec<Document>,
}

impl SourceCorpus {
    /// Build from prepared documents. Each list must hold only its category.
    /// Records repeating an earlier id are dropped so every document counts
    /// once against the index.
    pub fn new(
        incidents: Vec<Document>,
        education: Vec<Document>,
        regulations: Vec<Document>,
    ) -> Self {
        Self {
            incidents: dedup_by_id(Category::Incident, incidents),
            education: dedup_by_id(Category::Education, education),
            regulations: dedup_by_id(Category::Regulation, regulations),
        }
    }

    /// Load every configured source; unset sources are empty.
    pub fn load(sources: &SourcesConfig, ingestion: &IngestionConfig) -> Result<Self, IngestError> {
        let splitter = TextSplitter::new(ingestion.chunk_size, ingestion.chunk_overlap);

        let incidents = match &sources.incidents {
            Some(path) => read_json_array::<IncidentRecord>(path)?
                .iter()
                .map(incident_document)
                .collect(),
            None => Vec::new(),
        };

        let education = match &sources.education {
            Some(path) => read_json_array::<EducationRecord>(path)?
                .iter()
                .map(education_document)
                .collect(),
            None => Vec::new(),
        };

        let regulations = match &sources.regulations {
            Some(path) => load_articles(path)?
                .iter()
                .flat_map(|a| regulation_documents(a, &sources.regulation_source_name, &splitter))
                .collect(),
            None => Vec::new(),
        };

        let corpus = Self::new(incidents, education, regulations);
        info!(
            incidents = corpus.incidents.len(),
            education = corpus.education.len(),
            regulations = corpus.regulations.len(),
            "Source corpus loaded"
        );
        Ok(corpus)
    }

    pub fn documents(&self, category: Category) -> &[Document] {
        match category {
            Category::Incident => &self.incidents,
            Category::Education => &self.education,
            Category::Regulation => &self.regulations,
        }
    }

    pub fn len(&self, category: Category) -> usize {
        self.documents(category).len()
    }

    pub fn total(&self) -> usize {
        Category::ALL.iter().map(|c| self.len(*c)).sum()
    }

    /// Ids of every prepared document
    pub fn ids(&self) -> BTreeSet<&str> {
        Category::ALL
            .iter()
            .flat_map(|c| self.documents(*c).iter().map(|d| d.id.as_str()))
            .collect()
    }
}

fn dedup_by_id(category: Category, docs: Vec<Document>) -> Vec<Document> {
    let before = docs.len();
    let mut seen = HashSet::with_capacity(before);
    let kept: Vec<Document> = docs
        .into_iter()
        .filter(|d| seen.insert(d.id.clone()))
        .collect();
    if kept.len() < before {
        warn!(
            category = %category,
            dropped = before - kept.len(),
            "Duplicate source records dropped"
        );
    }
    kept
}

fn read_json_array<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<T>, IngestError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| IngestError::Source(format!("{}: {e}", path.display())))?;
    serde_json::from_str(&raw)
        .map_err(|e| IngestError::Source(format!("{}: {e}", path.display())))
}

/// `.json` holds pre-split articles; anything else is raw statute text.
fn load_articles(path: &Path) -> Result<Vec<ArticleRecord>, IngestError> {
    if path.extension().and_then(|e| e.to_str()) == Some("json") {
        return read_json_array(path);
    }
    let text = std::fs::read_to_string(path)
        .map_err(|e| IngestError::Source(format!("{}: {e}", path.display())))?;
    split_articles(&text).map_err(|e| IngestError::Source(format!("article pattern: {e}")))
}
