//! Pattern library for rule-based PHI detection

use crate::deid::models::PhiCategory;
use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

/// Capture group that narrows a match to the PHI value itself
pub const PHI_GROUP: &str = "phi";

/// Pattern definition from TOML
#[derive(Debug, Clone, Deserialize)]
pub struct PatternDefinition {
    /// Regex patterns for this entry
    pub patterns: Vec<String>,
    /// Confidence score (0.0 - 1.0)
    pub confidence: f64,
    /// PHI category label or alias
    pub category: String,
}

/// Compiled pattern with metadata
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    /// Library entry the pattern came from
    pub name: String,
    pub regex: Regex,
    pub category: PhiCategory,
    pub confidence: f64,
}

/// Pattern library container
#[derive(Debug, Deserialize)]
struct PatternLibrary {
    // BTreeMap keeps compilation order stable across runs
    patterns: BTreeMap<String, PatternDefinition>,
}

/// Pattern registry for PHI detection
pub struct PatternRegistry {
    patterns: Vec<CompiledPattern>,
    patterns_by_category: HashMap<PhiCategory, Vec<usize>>,
}

impl PatternRegistry {
    /// Create a new pattern registry from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).with_context(|| {
            format!(
                "Failed to read pattern library: {}",
                path.as_ref().display()
            )
        })?;

        Self::from_toml(&content)
    }

    /// Create a pattern registry from TOML content
    pub fn from_toml(content: &str) -> Result<Self> {
        let library: PatternLibrary =
            toml::from_str(content).context("Failed to parse pattern library TOML")?;

        let mut patterns = Vec::new();
        let mut patterns_by_category: HashMap<PhiCategory, Vec<usize>> = HashMap::new();

        for (name, def) in library.patterns {
            let category: PhiCategory = def
                .category
                .parse()
                .map_err(anyhow::Error::msg)
                .with_context(|| format!("Invalid category in pattern '{}'", name))?;

            if !(0.0..=1.0).contains(&def.confidence) {
                anyhow::bail!(
                    "Confidence {} for pattern '{}' is outside [0, 1]",
                    def.confidence,
                    name
                );
            }

            for pattern_str in &def.patterns {
                let regex = Regex::new(pattern_str)
                    .with_context(|| format!("Invalid regex in pattern '{name}': {pattern_str}"))?;

                patterns_by_category
                    .entry(category)
                    .or_default()
                    .push(patterns.len());
                patterns.push(CompiledPattern {
                    name: name.clone(),
                    regex,
                    category,
                    confidence: def.confidence,
                });
            }
        }

        Ok(Self {
            patterns,
            patterns_by_category,
        })
    }

    /// Create a registry from the built-in library
    pub fn default_patterns() -> Result<Self> {
        let default_toml = include_str!("../../../../patterns/phi_patterns.toml");
        Self::from_toml(default_toml)
    }

    /// Get all patterns
    pub fn all_patterns(&self) -> &[CompiledPattern] {
        &self.patterns
    }

    /// Get patterns for a specific category
    pub fn patterns_for_category(&self, category: PhiCategory) -> Vec<&CompiledPattern> {
        self.patterns_by_category
            .get(&category)
            .map(|idx| idx.iter().map(|&i| &self.patterns[i]).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
