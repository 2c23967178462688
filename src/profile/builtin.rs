//! Built-in profile catalog
//!
//! Used when no `profiles_path` is configured. Ordered most specific first,
//! ending in the rule-less `default`.

use std::collections::BTreeMap;

use crate::types::{CategoryQueries, MatchRules, Profile, ScoreWeights};

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

fn electrical_hv() -> Profile {
    let mut priority_keywords = BTreeMap::new();
    priority_keywords.insert("electrocution".to_string(), 0.05);
    priority_keywords.insert("arc flash".to_string(), 0.05);
    priority_keywords.insert("insulating".to_string(), 0.03);

    Profile {
        id: "electrical-hv".to_string(),
        version: 1,
        rules: MatchRules {
            equipment_name_pattern: Some(r"\bGIS\b|switchgear|transformer|\d+\s*kV\b|substation|busbar".to_string()),
            ..Default::default()
        },
        keywords: strings(&[
            "electric shock",
            "electrocution",
            "high voltage",
            "live part",
            "arc flash",
            "switchgear",
            "gis",
            "insulating",
            "grounding",
            "lockout",
            "감전",
            "충전부",
        ]),
        exclude_keywords: strings(&["welding fume", "scaffold collapse"]),
        include_if_any: strings(&["kv", "voltage", "전기"]),
        exclude_if_any: Vec::new(),
        queries: CategoryQueries {
            incident: strings(&[
                "{equipment} electrocution accident",
                "high voltage live part contact accident during {work_type}",
            ]),
            regulation: strings(&[
                "insulating protective equipment for live-line work",
                "electrical hazard prevention standard for {equipment}",
            ]),
            education: strings(&[
                "high voltage electrical safety training",
                "{work_type} lockout tagout training",
            ]),
        },
        weights: ScoreWeights {
            vector: 0.50,
            keyword: 0.25,
            equipment: 0.10,
            work_type: 0.05,
            risk: 0.05,
            regulation_hit: 0.03,
            education_hit: 0.02,
        },
        priority_keywords,
    }
}

fn lifting() -> Profile {
    Profile {
        id: "lifting-crane".to_string(),
        version: 1,
        rules: MatchRules {
            equipment_name_pattern: Some(r"crane|hoist|\blift\b|rigging|sling|크레인".to_string()),
            ..Default::default()
        },
        keywords: strings(&[
            "crane",
            "hoist",
            "suspended load",
            "falling object",
            "sling",
            "rigging",
            "overturn",
            "caught between",
            "낙하",
        ]),
        exclude_keywords: Vec::new(),
        include_if_any: strings(&["load", "lifting"]),
        exclude_if_any: Vec::new(),
        queries: CategoryQueries {
            incident: strings(&["{equipment} falling load accident", "crane overturn accident"]),
            regulation: strings(&["safety standard for cranes and lifting equipment"]),
            education: strings(&["safe rigging and signalling training"]),
        },
        weights: ScoreWeights::default(),
        priority_keywords: BTreeMap::new(),
    }
}

fn confined_space() -> Profile {
    Profile {
        id: "confined-space".to_string(),
        version: 1,
        rules: MatchRules {
            work_type_contains: Some(strings(&["confined", "tank", "manhole", "밀폐"])),
            ..Default::default()
        },
        keywords: strings(&[
            "confined space",
            "asphyxiation",
            "oxygen deficiency",
            "toxic gas",
            "ventilation",
            "gas detection",
            "질식",
        ]),
        exclude_keywords: Vec::new(),
        include_if_any: strings(&["oxygen", "gas"]),
        exclude_if_any: Vec::new(),
        queries: CategoryQueries {
            incident: strings(&["asphyxiation accident in confined space during {work_type}"]),
            regulation: strings(&["confined space work permit and ventilation standard"]),
            education: strings(&["confined space entry training"]),
        },
        weights: ScoreWeights::default(),
        priority_keywords: BTreeMap::new(),
    }
}

fn work_at_height() -> Profile {
    Profile {
        id: "work-at-height".to_string(),
        version: 1,
        rules: MatchRules {
            risk_tags_any: Some(strings(&["fall", "work_at_height", "height"])),
            ..Default::default()
        },
        keywords: strings(&[
            "fall from height",
            "guardrail",
            "safety harness",
            "ladder",
            "scaffold",
            "opening",
            "추락",
        ]),
        exclude_keywords: Vec::new(),
        include_if_any: Vec::new(),
        exclude_if_any: Vec::new(),
        queries: CategoryQueries {
            incident: strings(&["fall from height accident at {equipment}"]),
            regulation: strings(&["fall prevention standard guardrail safety harness"]),
            education: strings(&["work at height safety training"]),
        },
        weights: ScoreWeights::default(),
        priority_keywords: BTreeMap::new(),
    }
}

fn default_profile() -> Profile {
    let mut profile = Profile::catch_all("default");
    profile.keywords = strings(&["accident", "injury", "hazard", "safety", "prevention"]);
    profile.queries = CategoryQueries {
        incident: strings(&["{equipment} {work_type} accident"]),
        regulation: strings(&["safety standard for {equipment}"]),
        education: strings(&["{work_type} safety training"]),
    };
    profile
}

/// Profiles of the built-in catalog, in resolution order
pub fn builtin_profiles() -> Vec<Profile> {
    vec![
        electrical_hv(),
        lifting(),
        confined_space(),
        work_at_height(),
        default_profile(),
    ]
}
