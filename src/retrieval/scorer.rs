//! Hybrid Scorer
//!
//! Blends the raw vector similarity with lexical signals from the profile,
//! the equipment and the work type:
//!
//! ```text
//! final = clamp01(w.vector * vec + w.keyword * s_kw + w.equipment * s_eq
//!                 + w.work_type * s_wt + w.risk * s_rk
//!                 + w.regulation_hit * reg_hit + w.education_hit * edu_hit
//!                 + bonus - penalty)
//! ```
//!
//! Each lexical signal is `min(hits, cap) / cap`. Equipment, work type and
//! risk terms must match as whole words at ASCII letter or digit edges, so
//! "gis" does not hit "logistics" while "GIS에서" still counts. Profile
//! terms match as substrings. A candidate containing an exclude term is
//! penalized and never accepted.
//!
//! Acceptance is per category batch: the threshold is the batch quantile at
//! `1 - acceptance_percentile`, capped at the category ceiling.

use serde::Serialize;
use statrs::statistics::{Data, OrderStatistics};
use std::cmp::Ordering;
use tracing::debug;

use super::orchestrator::Candidate;
use super::tokenize::lexical_terms;
use crate::config::ScoringConfig;
use crate::types::{Category, Document, Equipment, Profile, WorkType};

/// Lexical signals of one candidate, each in [0, 1] except bonus/penalty
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ScoreSignals {
    pub vector: f64,
    pub keyword: f64,
    pub equipment: f64,
    pub work_type: f64,
    pub risk: f64,
    pub bonus: f64,
    pub penalty: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub document: Document,
    pub vector_score: f64,
    pub signals: ScoreSignals,
    pub final_score: f64,
    /// Contains an exclude term; never accepted
    pub excluded: bool,
}

/// Best first: final score, then raw vector score, then id
pub fn rank_order(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    b.final_score
        .total_cmp(&a.final_score)
        .then_with(|| b.vector_score.total_cmp(&a.vector_score))
        .then_with(|| a.document.id.cmp(&b.document.id))
}

/// Per-request terms, lowercased once
#[derive(Debug, Clone)]
pub struct ScoringContext<'a> {
    profile: &'a Profile,
    keywords: Vec<String>,
    equipment_terms: Vec<String>,
    work_type_terms: Vec<String>,
    risk_terms: Vec<String>,
    include_terms: Vec<String>,
    exclude_terms: Vec<String>,
    priority: Vec<(String, f64)>,
}

impl<'a> ScoringContext<'a> {
    pub fn new(profile: &'a Profile, equipment: &Equipment, work_type: &WorkType) -> Self {
        let mut equipment_terms = lexical_terms(&equipment.name);
        for tag in &equipment.tags {
            push_term(&mut equipment_terms, tag);
        }

        let mut risk_terms = Vec::new();
        for factor in &equipment.risk_factors {
            push_term(&mut risk_terms, &factor.tag_phrase());
        }

        Self {
            profile,
            keywords: lowered(&profile.keywords),
            equipment_terms,
            work_type_terms: lexical_terms(&work_type.name),
            risk_terms,
            include_terms: lowered(&profile.include_if_any),
            exclude_terms: lowered(profile.exclude_keywords.iter().chain(&profile.exclude_if_any)),
            priority: profile
                .priority_keywords
                .iter()
                .map(|(k, bonus)| (k.trim().to_lowercase(), *bonus))
                .filter(|(k, _)| !k.is_empty())
                .collect(),
        }
    }

    pub fn profile(&self) -> &Profile {
        self.profile
    }
}

fn push_term(terms: &mut Vec<String>, term: &str) {
    let term = term.trim().to_lowercase();
    if !term.is_empty() && !terms.contains(&term) {
        terms.push(term);
    }
}

fn lowered<'s>(items: impl IntoIterator<Item = &'s String>) -> Vec<String> {
    let mut terms = Vec::new();
    for item in items {
        push_term(&mut terms, item);
    }
    terms
}

fn hits(text: &str, terms: &[String]) -> usize {
    terms.iter().filter(|t| text.contains(t.as_str())).count()
}

fn word_hits(text: &str, terms: &[String]) -> usize {
    terms.iter().filter(|t| contains_term(text, t)).count()
}

/// Whether `term` occurs in `text` without running into an adjacent ASCII
/// letter or digit on an edge where the term itself is one.
fn contains_term(text: &str, term: &str) -> bool {
    let (Some(first), Some(last)) = (term.chars().next(), term.chars().next_back()) else {
        return false;
    };
    text.match_indices(term).any(|(start, matched)| {
        let before = text[..start].chars().next_back();
        let after = text[start + matched.len()..].chars().next();
        let joined = |edge: char, neighbour: Option<char>| {
            edge.is_ascii_alphanumeric() && neighbour.is_some_and(|c| c.is_ascii_alphanumeric())
        };
        !joined(first, before) && !joined(last, after)
    })
}

fn capped(hits: usize, cap: usize) -> f64 {
    if cap == 0 {
        return 0.0;
    }
    hits.min(cap) as f64 / cap as f64
}

#[derive(Debug, Clone)]
pub struct HybridScorer {
    config: ScoringConfig,
}

impl HybridScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn score(&self, ctx: &ScoringContext<'_>, candidate: Candidate) -> ScoredCandidate {
        let cfg = &self.config;
        let text = candidate.document.searchable_text();
        let category = candidate.document.category();

        let excluded = ctx.exclude_terms.iter().any(|t| text.contains(t.as_str()));
        let mut bonus = 0.0;
        if ctx.include_terms.iter().any(|t| text.contains(t.as_str())) {
            bonus += cfg.include_bonus;
        }
        bonus += ctx
            .priority
            .iter()
            .filter(|(k, _)| text.contains(k.as_str()))
            .map(|(_, b)| b)
            .sum::<f64>();

        let signals = ScoreSignals {
            vector: clamp01(candidate.vector_score),
            keyword: capped(hits(&text, &ctx.keywords), cfg.keyword_cap),
            equipment: capped(word_hits(&text, &ctx.equipment_terms), cfg.equipment_cap),
            work_type: capped(word_hits(&text, &ctx.work_type_terms), cfg.work_type_cap),
            risk: capped(word_hits(&text, &ctx.risk_terms), cfg.risk_cap),
            bonus,
            penalty: if excluded { cfg.exclude_penalty } else { 0.0 },
        };

        let w = &ctx.profile.weights;
        let reg_hit = if category == Category::Regulation { 1.0 } else { 0.0 };
        let edu_hit = if category == Category::Education { 1.0 } else { 0.0 };
        let weighted = w.vector * signals.vector
            + w.keyword * signals.keyword
            + w.equipment * signals.equipment
            + w.work_type * signals.work_type
            + w.risk * signals.risk
            + w.regulation_hit * reg_hit
            + w.education_hit * edu_hit;

        ScoredCandidate {
            vector_score: candidate.vector_score,
            final_score: clamp01(weighted + signals.bonus - signals.penalty),
            document: candidate.document,
            signals,
            excluded,
        }
    }

    pub fn score_all(&self, ctx: &ScoringContext<'_>, candidates: Vec<Candidate>) -> Vec<ScoredCandidate> {
        candidates.into_iter().map(|c| self.score(ctx, c)).collect()
    }

    pub fn ceiling(&self, category: Category) -> f64 {
        match category {
            Category::Education => self.config.education_ceiling,
            Category::Incident | Category::Regulation => self.config.default_ceiling,
        }
    }

    /// Acceptance threshold of a category batch; `None` for an empty batch.
    pub fn threshold(&self, category: Category, scores: &[f64]) -> Option<f64> {
        if scores.is_empty() {
            return None;
        }
        let tau = (1.0 - self.config.acceptance_percentile).clamp(0.0, 1.0);
        let quantile = Data::new(scores.to_vec()).quantile(tau);
        Some(quantile.min(self.ceiling(category)))
    }

    /// Keep the non-excluded candidates at or above the batch threshold,
    /// best first.
    pub fn accept(&self, category: Category, batch: Vec<ScoredCandidate>) -> Vec<ScoredCandidate> {
        let scores: Vec<f64> = batch.iter().map(|c| c.final_score).collect();
        let Some(threshold) = self.threshold(category, &scores) else {
            return Vec::new();
        };

        let total = batch.len();
        let mut accepted: Vec<ScoredCandidate> = batch
            .into_iter()
            .filter(|c| !c.excluded && c.final_score >= threshold)
            .collect();
        accepted.sort_by(rank_order);

        debug!(
            category = %category,
            total,
            accepted = accepted.len(),
            threshold,
            "Acceptance threshold applied"
        );
        accepted
    }
}

fn clamp01(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
