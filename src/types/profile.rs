//! Retrieval profiles - data-only bundles of keywords, query templates and weights
//!
//! Profiles are loaded from TOML (`[[profiles]]` tables) or taken from the
//! built-in catalog. They carry no behavior; matching lives in
//! `crate::profile` and scoring in `crate::retrieval::scorer`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Match rules of a profile. An absent rule is vacuously true.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchRules {
    /// Regex tested against the equipment name (case-insensitive)
    pub equipment_name_pattern: Option<String>,
    /// Matches when any equipment tag is in this set
    pub tags_any: Option<Vec<String>>,
    /// Matches when the work-type name contains any of these substrings
    pub work_type_contains: Option<Vec<String>>,
    /// Matches when any equipment risk tag is in this set
    pub risk_tags_any: Option<Vec<String>>,
}

impl MatchRules {
    /// True when no rule is declared (catch-all profile)
    pub fn is_empty(&self) -> bool {
        self.equipment_name_pattern.is_none()
            && self.tags_any.is_none()
            && self.work_type_contains.is_none()
            && self.risk_tags_any.is_none()
    }
}

/// Static sub-query templates per category.
///
/// Templates may contain `{equipment}` and `{work_type}` placeholders.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryQueries {
    pub incident: Vec<String>,
    pub regulation: Vec<String>,
    pub education: Vec<String>,
}

/// Hybrid score coefficients. Need not sum to 1; the scorer clamps.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub vector: f64,
    pub keyword: f64,
    pub equipment: f64,
    pub work_type: f64,
    pub risk: f64,
    pub regulation_hit: f64,
    pub education_hit: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            vector: 0.55,
            keyword: 0.20,
            equipment: 0.10,
            work_type: 0.05,
            risk: 0.05,
            regulation_hit: 0.03,
            education_hit: 0.02,
        }
    }
}

impl ScoreWeights {
    pub fn as_array(&self) -> [f64; 7] {
        [
            self.vector,
            self.keyword,
            self.equipment,
            self.work_type,
            self.risk,
            self.regulation_hit,
            self.education_hit,
        ]
    }
}

/// A named retrieval profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    #[serde(default = "default_profile_version")]
    pub version: u32,
    #[serde(default)]
    pub rules: MatchRules,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub exclude_keywords: Vec<String>,
    #[serde(default)]
    pub include_if_any: Vec<String>,
    #[serde(default)]
    pub exclude_if_any: Vec<String>,
    #[serde(default)]
    pub queries: CategoryQueries,
    #[serde(default)]
    pub weights: ScoreWeights,
    /// Keyword -> bonus added when present (case-insensitive)
    #[serde(default)]
    pub priority_keywords: BTreeMap<String, f64>,
}

fn default_profile_version() -> u32 {
    1
}

impl Profile {
    /// A rule-less catch-all profile with default weights
    pub fn catch_all(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: 1,
            rules: MatchRules::default(),
            keywords: Vec::new(),
            exclude_keywords: Vec::new(),
            include_if_any: Vec::new(),
            exclude_if_any: Vec::new(),
            queries: CategoryQueries::default(),
            weights: ScoreWeights::default(),
            priority_keywords: BTreeMap::new(),
        }
    }
}

/// On-disk catalog file shape
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileCatalogFile {
    #[serde(default)]
    pub profiles: Vec<Profile>,
}
