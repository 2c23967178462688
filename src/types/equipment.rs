//! Equipment and work-type records read from the site inventory

use serde::{Deserialize, Serialize};

/// A structured risk factor attached to a piece of equipment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskFactor {
    /// Short tag, e.g. `high_voltage`
    pub tag: String,
    /// Free-text detail, e.g. "170kV live busbar inside the enclosure"
    #[serde(default)]
    pub detail: Option<String>,
}

impl RiskFactor {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Tag with underscores turned into spaces, for matching prose
    pub fn tag_phrase(&self) -> String {
        self.tag.replace(['_', '-'], " ").to_lowercase()
    }
}

/// Equipment being worked on
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Equipment {
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub risk_factors: Vec<RiskFactor>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub manufacturer: Option<String>,
}

impl Equipment {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_risk_factor(mut self, factor: RiskFactor) -> Self {
        self.risk_factors.push(factor);
        self
    }

    pub fn risk_tags(&self) -> impl Iterator<Item = &str> {
        self.risk_factors.iter().map(|r| r.tag.as_str())
    }
}

/// Type of work to be performed on the equipment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkType {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl WorkType {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }
}
