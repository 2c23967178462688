//! Config validation: unknown-key detection with Levenshtein suggestions
//! and range checks.
//!
//! Two-pass parse approach: first deserialize raw TOML into `toml::Value`,
//! walk the key tree, compare against known field names, and emit warnings
//! with "did you mean?" suggestions. Then proceed with normal serde
//! deserialization. Warnings never break existing configs.

use std::collections::HashSet;

/// A non-fatal config warning (typo, suspicious value).
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
    pub suggestion: Option<String>,
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref s) = self.suggestion {
            write!(f, "; did you mean '{s}'?")?;
        }
        Ok(())
    }
}

// ============================================================================
// Known Config Keys
// ============================================================================

/// Returns the complete set of valid dotted key paths for RagConfig.
///
/// Maintained by hand to match the struct hierarchy in rag_config.rs.
/// Any new field added to RagConfig must be added here too.
pub fn known_config_keys() -> HashSet<&'static str> {
    let keys: &[&str] = &[
        "profiles_path",
        // [storage]
        "storage",
        "storage.base_path",
        // [embedding]
        "embedding",
        "embedding.provider",
        "embedding.model",
        "embedding.base_url",
        "embedding.api_key_env",
        "embedding.dimension",
        "embedding.max_chars",
        "embedding.timeout_secs",
        "embedding.max_retries",
        "embedding.rate_limit_base_delay_ms",
        "embedding.rate_limit_jitter_ms",
        "embedding.server_error_delay_ms",
        // [retrieval]
        "retrieval",
        "retrieval.top_k",
        "retrieval.concurrency",
        "retrieval.synthesized_query_tokens",
        "retrieval.incident_limit",
        "retrieval.education_limit",
        "retrieval.regulation_limit",
        // [scoring]
        "scoring",
        "scoring.keyword_cap",
        "scoring.equipment_cap",
        "scoring.work_type_cap",
        "scoring.risk_cap",
        "scoring.include_bonus",
        "scoring.exclude_penalty",
        "scoring.acceptance_percentile",
        "scoring.default_ceiling",
        "scoring.education_ceiling",
        // [ingestion]
        "ingestion",
        "ingestion.incident_batch_size",
        "ingestion.education_batch_size",
        "ingestion.regulation_batch_size",
        "ingestion.chunk_size",
        "ingestion.chunk_overlap",
        // [sources]
        "sources",
        "sources.incidents",
        "sources.education",
        "sources.regulations",
        "sources.regulation_source_name",
    ];
    keys.iter().copied().collect()
}

// ============================================================================
// TOML Key Walking
// ============================================================================

/// Recursively walks a `toml::Value` tree and collects all dotted key paths.
///
/// For example, a table `{ a = { b = 1, c = 2 } }` yields:
/// `["a", "a.b", "a.c"]`
pub fn walk_toml_keys(value: &toml::Value, prefix: &str) -> Vec<String> {
    let mut keys = Vec::new();
    if let Some(table) = value.as_table() {
        for (k, v) in table {
            let path = if prefix.is_empty() {
                k.clone()
            } else {
                format!("{prefix}.{k}")
            };
            keys.push(path.clone());
            if v.is_table() {
                keys.extend(walk_toml_keys(v, &path));
            }
        }
    }
    keys
}

// ============================================================================
// Levenshtein Distance
// ============================================================================

/// Compute the Levenshtein edit distance between two strings.
fn levenshtein(a: &str, b: &str) -> usize {
    let a_len = a.len();
    let b_len = b.len();
    if a_len == 0 {
        return b_len;
    }
    if b_len == 0 {
        return a_len;
    }

    let mut prev: Vec<usize> = (0..=b_len).collect();
    let mut curr = vec![0; b_len + 1];

    for (i, ca) in a.chars().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.chars().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr[j + 1] = (prev[j + 1] + 1)
                .min(curr[j] + 1)
                .min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_len]
}

/// Suggest the closest known key for an unknown key, if within edit distance 3.
pub fn suggest_correction(unknown: &str, known: &HashSet<&str>) -> Option<String> {
    let mut best: Option<(&str, usize)> = None;
    for &k in known {
        let dist = levenshtein(unknown, k);
        if dist <= 3 {
            if let Some((_, best_dist)) = best {
                if dist < best_dist {
                    best = Some((k, dist));
                }
            } else {
                best = Some((k, dist));
            }
        }
    }
    best.map(|(k, _)| k.to_string())
}

// ============================================================================
// Unknown Key Validation (entry point)
// ============================================================================

/// Parse a raw TOML string and return warnings for any unknown config keys.
///
/// Unknown keys only warn; existing configs always continue to work.
pub fn validate_unknown_keys(raw_toml: &str) -> Vec<ValidationWarning> {
    let value: toml::Value = match raw_toml.parse() {
        Ok(v) => v,
        Err(_) => return Vec::new(), // parse errors are handled by serde later
    };

    let known = known_config_keys();
    let found = walk_toml_keys(&value, "");
    let mut warnings = Vec::new();

    for key in &found {
        if !known.contains(key.as_str()) {
            let suggestion = suggest_correction(key, &known);
            let message = format!("Unknown config key '{key}'");
            warnings.push(ValidationWarning {
                field: key.clone(),
                message,
                suggestion,
            });
        }
    }

    warnings
}

// ============================================================================
// Range Validation
// ============================================================================

/// Validate ranges on a parsed RagConfig.
///
/// Returns (errors, warnings). Errors are values the engine cannot run with;
/// warnings are suspicious but not fatal.
pub fn validate_ranges(config: &super::RagConfig) -> (Vec<String>, Vec<ValidationWarning>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    let e = &config.embedding;
    if e.dimension == 0 {
        errors.push("embedding.dimension must be > 0".to_string());
    }
    if e.max_chars == 0 {
        errors.push("embedding.max_chars must be > 0".to_string());
    }
    if e.timeout_secs == 0 {
        errors.push("embedding.timeout_secs must be > 0".to_string());
    }
    if e.max_retries > 10 {
        warnings.push(ValidationWarning {
            field: "embedding.max_retries".to_string(),
            message: format!(
                "embedding.max_retries = {} is unusually high (typical 1-5)",
                e.max_retries
            ),
            suggestion: None,
        });
    }

    let r = &config.retrieval;
    if r.top_k == 0 {
        errors.push("retrieval.top_k must be > 0".to_string());
    }
    if r.concurrency == 0 || r.concurrency > 32 {
        errors.push(format!(
            "retrieval.concurrency = {} is outside the supported range (1-32)",
            r.concurrency
        ));
    } else if !(4..=8).contains(&r.concurrency) {
        warnings.push(ValidationWarning {
            field: "retrieval.concurrency".to_string(),
            message: format!(
                "retrieval.concurrency = {} is outside the typical range (4-8)",
                r.concurrency
            ),
            suggestion: None,
        });
    }
    if r.synthesized_query_tokens == 0 {
        errors.push("retrieval.synthesized_query_tokens must be > 0".to_string());
    }
    for (name, limit) in [
        ("retrieval.incident_limit", r.incident_limit),
        ("retrieval.education_limit", r.education_limit),
        ("retrieval.regulation_limit", r.regulation_limit),
    ] {
        if limit == 0 {
            errors.push(format!("{name} must be > 0"));
        }
    }

    let s = &config.scoring;
    for (name, cap) in [
        ("scoring.keyword_cap", s.keyword_cap),
        ("scoring.equipment_cap", s.equipment_cap),
        ("scoring.work_type_cap", s.work_type_cap),
        ("scoring.risk_cap", s.risk_cap),
    ] {
        if cap == 0 {
            errors.push(format!("{name} must be > 0 (used as divisor)"));
        }
    }
    if !(s.acceptance_percentile > 0.0 && s.acceptance_percentile <= 1.0) {
        errors.push(format!(
            "scoring.acceptance_percentile = {:.3} must be in (0, 1]",
            s.acceptance_percentile
        ));
    }
    for (name, ceiling) in [
        ("scoring.default_ceiling", s.default_ceiling),
        ("scoring.education_ceiling", s.education_ceiling),
    ] {
        if !(0.0..=1.0).contains(&ceiling) {
            errors.push(format!("{name} = {ceiling:.3} must be in [0, 1]"));
        }
    }
    if s.include_bonus < 0.0 {
        errors.push(format!(
            "scoring.include_bonus = {:.3} cannot be negative",
            s.include_bonus
        ));
    }
    if s.exclude_penalty < 0.0 {
        errors.push(format!(
            "scoring.exclude_penalty = {:.3} cannot be negative",
            s.exclude_penalty
        ));
    }

    let i = &config.ingestion;
    for (name, size) in [
        ("ingestion.incident_batch_size", i.incident_batch_size),
        ("ingestion.education_batch_size", i.education_batch_size),
        ("ingestion.regulation_batch_size", i.regulation_batch_size),
    ] {
        if size == 0 {
            errors.push(format!("{name} must be > 0"));
        }
    }
    if i.chunk_size == 0 {
        errors.push("ingestion.chunk_size must be > 0".to_string());
    }
    if i.chunk_overlap >= i.chunk_size {
        errors.push(format!(
            "ingestion.chunk_overlap ({}) must be smaller than ingestion.chunk_size ({})",
            i.chunk_overlap, i.chunk_size
        ));
    }
    if i.incident_batch_size > i.education_batch_size {
        warnings.push(ValidationWarning {
            field: "ingestion.incident_batch_size".to_string(),
            message: format!(
                "ingestion.incident_batch_size ({}) exceeds education_batch_size ({}); incidents are usually committed in the smallest batches",
                i.incident_batch_size, i.education_batch_size
            ),
            suggestion: None,
        });
    }

    (errors, warnings)
}

// ============================================================================
// Tests
// ============================================================================
