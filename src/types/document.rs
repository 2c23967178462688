//! Retrievable documents: incident cases, education material and regulation chunks

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Result category of a document.
///
/// Closed set: every place that fans out by category matches exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Incident,
    Education,
    Regulation,
}

impl Category {
    /// Ingestion order of the three corpora.
    pub const ALL: [Category; 3] = [Category::Incident, Category::Education, Category::Regulation];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Incident => "incident",
            Category::Education => "education",
            Category::Regulation => "regulation",
        }
    }

    /// Marker word appended to synthesized sub-queries of this category
    pub fn query_marker(self) -> &'static str {
        match self {
            Category::Incident => "accident",
            Category::Education => "safety training",
            Category::Regulation => "safety standard",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "incident" | "incidents" | "accident" => Ok(Category::Incident),
            "education" | "training" => Ok(Category::Education),
            "regulation" | "regulations" | "law" => Ok(Category::Regulation),
            other => Err(format!(
                "unknown category '{other}' (expected incident, education or regulation)"
            )),
        }
    }
}

/// Incident (accident case) specific fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IncidentDetail {
    pub date: String,
    pub location: String,
    pub industry: String,
    pub work_type: String,
    pub accident_type: String,
    /// Damage / severity description
    pub severity: String,
    pub summary: String,
    pub direct_cause: String,
    pub root_cause: String,
    pub prevention: String,
}

/// Education material specific fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EducationDetail {
    pub date: String,
    pub doc_number: String,
    pub material_type: String,
    pub source_url: String,
    pub file_url: String,
}

/// Regulation chunk specific fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegulationDetail {
    /// Article number without decoration ("323" for "Article 323")
    pub article_number: String,
    pub article_title: String,
    pub source: String,
    /// Position of this chunk inside its article
    pub chunk_index: usize,
}

/// Category-specific part of a document; determines the document's category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum DocumentDetail {
    Incident(IncidentDetail),
    Education(EducationDetail),
    Regulation(RegulationDetail),
}

impl DocumentDetail {
    pub fn category(&self) -> Category {
        match self {
            DocumentDetail::Incident(_) => Category::Incident,
            DocumentDetail::Education(_) => Category::Education,
            DocumentDetail::Regulation(_) => Category::Regulation,
        }
    }
}

/// The unit of retrieval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Stable id, unique within the store
    pub id: String,
    pub title: String,
    /// Free text used for embedding and lexical matching
    pub body: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Comma-joined risk keywords
    #[serde(default)]
    pub risk_keywords: String,
    pub detail: DocumentDetail,
}

impl Document {
    pub fn category(&self) -> Category {
        self.detail.category()
    }

    /// Article number for regulation chunks
    pub fn article_number(&self) -> Option<&str> {
        match &self.detail {
            DocumentDetail::Regulation(r) if !r.article_number.is_empty() => {
                Some(r.article_number.as_str())
            }
            _ => None,
        }
    }

    /// Lowercased text searched by the lexical scorer.
    pub fn searchable_text(&self) -> String {
        let mut text = String::with_capacity(
            self.title.len() + self.body.len() + self.risk_keywords.len() + 64,
        );
        text.push_str(&self.title);
        text.push('\n');
        text.push_str(&self.body);
        text.push('\n');
        text.push_str(&self.risk_keywords);
        for tag in &self.tags {
            text.push(' ');
            text.push_str(tag);
        }
        text.to_lowercase()
    }
}
