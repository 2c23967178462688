//! Profile Resolver
//!
//! `ProfileCatalog` is loaded once (from TOML or the built-in set) and
//! handed to the retriever by reference. Resolution walks the catalog in
//! order; the first profile whose declared rules all hold wins, and the
//! trailing rule-less profile catches everything else.

mod builtin;

pub use builtin::builtin_profiles;

use regex::{Regex, RegexBuilder};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::types::{Equipment, Profile, ProfileCatalogFile, WorkType};

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("Failed to read profile catalog ({}): {}", .0.display(), .1)]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Failed to parse profile catalog ({}): {}", .0.display(), .1)]
    Parse(PathBuf, #[source] toml::de::Error),

    #[error("Failed to parse profile catalog: {0}")]
    ParseStr(#[from] toml::de::Error),

    #[error("Profile catalog is empty")]
    Empty,

    #[error("Duplicate profile id '{0}'")]
    DuplicateId(String),

    #[error("Last profile '{0}' must have no match rules (catch-all)")]
    MissingCatchAll(String),

    #[error("Profile '{profile}' declares an empty {rule} list")]
    EmptyRule { profile: String, rule: &'static str },

    #[error("Profile '{profile}' has an invalid equipment pattern: {source}")]
    InvalidPattern {
        profile: String,
        #[source]
        source: regex::Error,
    },

    #[error("Profile '{profile}' has an invalid {field}: {value}")]
    InvalidWeight {
        profile: String,
        field: String,
        value: f64,
    },
}

/// Match rules prepared for evaluation: pattern compiled, sets lowercased
#[derive(Debug, Clone)]
struct CompiledRules {
    name_pattern: Option<Regex>,
    tags_any: Option<HashSet<String>>,
    work_type_contains: Option<Vec<String>>,
    risk_tags_any: Option<HashSet<String>>,
}

impl CompiledRules {
    fn compile(profile: &Profile) -> Result<Self, ProfileError> {
        let rules = &profile.rules;
        let name_pattern = rules
            .equipment_name_pattern
            .as_deref()
            .map(|p| RegexBuilder::new(p).case_insensitive(true).build())
            .transpose()
            .map_err(|source| ProfileError::InvalidPattern {
                profile: profile.id.clone(),
                source,
            })?;

        let lowered = |list: &Option<Vec<String>>, rule: &'static str| {
            match list {
                Some(items) if items.is_empty() => Err(ProfileError::EmptyRule {
                    profile: profile.id.clone(),
                    rule,
                }),
                Some(items) => Ok(Some(
                    items.iter().map(|s| s.trim().to_lowercase()).collect::<Vec<_>>(),
                )),
                None => Ok(None),
            }
        };

        Ok(Self {
            name_pattern,
            tags_any: lowered(&rules.tags_any, "tags_any")?.map(|v| v.into_iter().collect()),
            work_type_contains: lowered(&rules.work_type_contains, "work_type_contains")?,
            risk_tags_any: lowered(&rules.risk_tags_any, "risk_tags_any")?
                .map(|v| v.into_iter().collect()),
        })
    }

    fn matches(&self, equipment: &Equipment, work_type: &WorkType) -> bool {
        if let Some(pattern) = &self.name_pattern {
            if !pattern.is_match(&equipment.name) {
                return false;
            }
        }
        if let Some(tags) = &self.tags_any {
            if !equipment.tags.iter().any(|t| tags.contains(&t.to_lowercase())) {
                return false;
            }
        }
        if let Some(needles) = &self.work_type_contains {
            let name = work_type.name.to_lowercase();
            if !needles.iter().any(|n| name.contains(n.as_str())) {
                return false;
            }
        }
        if let Some(risk) = &self.risk_tags_any {
            if !equipment.risk_tags().any(|t| risk.contains(&t.to_lowercase())) {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone)]
struct Entry {
    profile: Profile,
    rules: CompiledRules,
}

/// Ordered, validated set of profiles
#[derive(Debug, Clone)]
pub struct ProfileCatalog {
    entries: Vec<Entry>,
    fallback: Profile,
}

impl ProfileCatalog {
    /// Validate and compile `profiles`. The last one must be rule-less.
    pub fn from_profiles(mut profiles: Vec<Profile>) -> Result<Self, ProfileError> {
        let fallback = profiles.pop().ok_or(ProfileError::Empty)?;
        if !fallback.rules.is_empty() {
            return Err(ProfileError::MissingCatchAll(fallback.id));
        }

        let mut seen = HashSet::new();
        for profile in profiles.iter().chain(std::iter::once(&fallback)) {
            if !seen.insert(profile.id.as_str()) {
                return Err(ProfileError::DuplicateId(profile.id.clone()));
            }
            validate_weights(profile)?;
        }

        let entries = profiles
            .into_iter()
            .map(|profile| {
                let rules = CompiledRules::compile(&profile)?;
                Ok(Entry { profile, rules })
            })
            .collect::<Result<Vec<_>, ProfileError>>()?;

        Ok(Self { entries, fallback })
    }

    pub fn builtin() -> Result<Self, ProfileError> {
        Self::from_profiles(builtin_profiles())
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ProfileError> {
        let file: ProfileCatalogFile = toml::from_str(contents)?;
        Self::from_profiles(file.profiles)
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ProfileError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ProfileError::Io(path.to_path_buf(), e))?;
        let file: ProfileCatalogFile =
            toml::from_str(&contents).map_err(|e| ProfileError::Parse(path.to_path_buf(), e))?;
        let catalog = Self::from_profiles(file.profiles)?;
        info!(path = %path.display(), profiles = catalog.len(), "Loaded profile catalog");
        Ok(catalog)
    }

    /// Catalog at `path`, or the built-in one
    pub fn load(path: Option<&Path>) -> Result<Self, ProfileError> {
        match path {
            Some(p) => Self::load_from_file(p),
            None => Self::builtin(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len() + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn get(&self, id: &str) -> Option<&Profile> {
        self.profiles().find(|p| p.id == id)
    }

    /// Profiles in resolution order
    pub fn profiles(&self) -> impl Iterator<Item = &Profile> {
        self.entries
            .iter()
            .map(|e| &e.profile)
            .chain(std::iter::once(&self.fallback))
    }

    /// First profile whose rules all hold, else the catch-all
    pub fn resolve(&self, equipment: &Equipment, work_type: &WorkType) -> &Profile {
        let profile = self
            .entries
            .iter()
            .find(|e| e.rules.matches(equipment, work_type))
            .map_or(&self.fallback, |e| &e.profile);
        debug!(
            profile = %profile.id,
            equipment = %equipment.name,
            work_type = %work_type.name,
            "Profile resolved"
        );
        profile
    }
}

fn validate_weights(profile: &Profile) -> Result<(), ProfileError> {
    const NAMES: [&str; 7] = [
        "vector",
        "keyword",
        "equipment",
        "work_type",
        "risk",
        "regulation_hit",
        "education_hit",
    ];
    let weights = profile.weights.as_array();
    let bad_weight = NAMES
        .iter()
        .zip(weights)
        .find(|(_, w)| !w.is_finite() || *w < 0.0)
        .map(|(name, w)| (format!("weight '{name}'"), w));
    let bad_bonus = profile
        .priority_keywords
        .iter()
        .find(|(_, b)| !b.is_finite() || **b < 0.0)
        .map(|(k, b)| (format!("priority bonus '{k}'"), *b));

    match bad_weight.or(bad_bonus) {
        Some((field, value)) => Err(ProfileError::InvalidWeight {
            profile: profile.id.clone(),
            field,
            value,
        }),
        None => Ok(()),
    }
}
