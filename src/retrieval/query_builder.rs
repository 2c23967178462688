//! Query Builder
//!
//! Expands a profile plus the runtime equipment and work type into
//! per-category sub-queries: the profile's templates first, then one
//! synthesized query per category.

use serde::Serialize;

use super::tokenize::{normalize_whitespace, tokenize};
use crate::types::{Category, Equipment, Profile, WorkType};

/// Sub-queries for one retrieval request. Every list is deduplicated,
/// free of empty strings and in construction order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueryPlan {
    pub incident_queries: Vec<String>,
    pub regulation_queries: Vec<String>,
    pub education_queries: Vec<String>,
    /// Incident, regulation then education queries, deduplicated
    pub all_queries: Vec<String>,
}

impl QueryPlan {
    pub fn queries(&self, category: Category) -> &[String] {
        match category {
            Category::Incident => &self.incident_queries,
            Category::Education => &self.education_queries,
            Category::Regulation => &self.regulation_queries,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct QueryBuilder {
    /// Tokens kept from each input part of a synthesized query
    tokens_per_part: usize,
}

impl QueryBuilder {
    pub fn new(tokens_per_part: usize) -> Self {
        Self {
            tokens_per_part: tokens_per_part.max(1),
        }
    }

    pub fn build(&self, profile: &Profile, equipment: &Equipment, work_type: &WorkType) -> QueryPlan {
        let synthesized_base = self.synthesized_base(equipment, work_type);
        let per_category = |category: Category| {
            let templates = match category {
                Category::Incident => &profile.queries.incident,
                Category::Regulation => &profile.queries.regulation,
                Category::Education => &profile.queries.education,
            };
            let mut queries = Vec::with_capacity(templates.len() + 1);
            for template in templates {
                push_unique(&mut queries, fill_template(template, equipment, work_type));
            }
            if !synthesized_base.is_empty() {
                push_unique(
                    &mut queries,
                    format!("{synthesized_base} {}", category.query_marker()),
                );
            }
            queries
        };

        let incident_queries = per_category(Category::Incident);
        let regulation_queries = per_category(Category::Regulation);
        let education_queries = per_category(Category::Education);

        let mut all_queries = Vec::new();
        for query in incident_queries
            .iter()
            .chain(&regulation_queries)
            .chain(&education_queries)
        {
            push_unique(&mut all_queries, query.clone());
        }

        QueryPlan {
            incident_queries,
            regulation_queries,
            education_queries,
            all_queries,
        }
    }

    /// Equipment name, tags, work type and risk details, each cut to the
    /// first few tokens, joined without repeated tokens.
    fn synthesized_base(&self, equipment: &Equipment, work_type: &WorkType) -> String {
        let tags = equipment.tags.join(" ");
        let mut parts: Vec<&str> = vec![equipment.name.as_str(), tags.as_str(), work_type.name.as_str()];
        parts.extend(
            equipment
                .risk_factors
                .iter()
                .filter_map(|r| r.detail.as_deref()),
        );

        let mut seen: Vec<String> = Vec::new();
        let mut tokens: Vec<&str> = Vec::new();
        for part in parts {
            for token in tokenize(part).into_iter().take(self.tokens_per_part) {
                let key = token.to_lowercase();
                if !seen.contains(&key) {
                    seen.push(key);
                    tokens.push(token);
                }
            }
        }
        tokens.join(" ")
    }
}

fn fill_template(template: &str, equipment: &Equipment, work_type: &WorkType) -> String {
    normalize_whitespace(
        &template
            .replace("{equipment}", equipment.name.trim())
            .replace("{work_type}", work_type.name.trim()),
    )
}

fn push_unique(queries: &mut Vec<String>, query: String) {
    if query.is_empty() {
        return;
    }
    let duplicate = queries.iter().any(|q| q.eq_ignore_ascii_case(&query));
    if !duplicate {
        queries.push(query);
    }
}
