//! Entity transformation
//!
//! Applies the configured strategy to each resolved entity and splices the
//! replacements into the original text in a single left-to-right pass.

pub mod generalize;
pub mod strategy;

pub use strategy::{Strategy, TransformRules};

use crate::deid::consistency::{ConsistencySession, DateShiftOutcome};
use crate::deid::models::{MergedEntity, PhiCategory};
use crate::domain::errors::DeidError;
use crate::domain::result::Result;
use serde::{Deserialize, Serialize};

/// What was done to one entity, in original-text offsets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub start: usize,
    pub end: usize,
    pub category: PhiCategory,
    pub confidence: f64,
    /// Strategy the rules selected
    pub strategy: Strategy,
    /// Strategy actually applied after fallbacks
    pub strategy_applied: Strategy,
    /// Token or redaction marker. Omitted when the replacement is derived
    /// from the value itself (shifted dates, generalizations, preserved text).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replacement: Option<String>,
    /// Providers that reported the entity
    pub sources: Vec<String>,
    /// Only populated when `audit.retain_original_text` is enabled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_text: Option<String>,
}

/// Transformed text with one audit record per entity
#[derive(Debug, Clone, PartialEq)]
pub struct TransformOutput {
    pub text: String,
    pub records: Vec<AuditRecord>,
}

struct Decision {
    applied: Strategy,
    replacement: String,
    disclose: bool,
}

/// Applies [`TransformRules`] to resolved entities
#[derive(Debug, Clone, Default)]
pub struct TransformEngine {
    rules: TransformRules,
    retain_original_text: bool,
}

impl TransformEngine {
    pub fn new(rules: TransformRules, retain_original_text: bool) -> Self {
        Self {
            rules,
            retain_original_text,
        }
    }

    pub fn rules(&self) -> &TransformRules {
        &self.rules
    }

    /// Replaces every entity in `text`
    ///
    /// `entities` must be the sorted, disjoint output of the resolver.
    pub fn transform(
        &self,
        text: &str,
        entities: &[MergedEntity],
        session: &mut ConsistencySession<'_>,
    ) -> Result<TransformOutput> {
        check_entities(text, entities)?;

        let mut out = String::with_capacity(text.len());
        let mut records = Vec::with_capacity(entities.len());
        let mut cursor = 0;

        for entity in entities {
            let decision = self.decide(entity, session)?;
            out.push_str(&text[cursor..entity.start]);
            out.push_str(&decision.replacement);
            cursor = entity.end;
            records.push(self.record(entity, decision));
        }
        out.push_str(&text[cursor..]);

        Ok(TransformOutput { text: out, records })
    }

    /// Audit records for what [`transform`](Self::transform) would do,
    /// with the text left unchanged
    pub fn plan(
        &self,
        text: &str,
        entities: &[MergedEntity],
        session: &mut ConsistencySession<'_>,
    ) -> Result<TransformOutput> {
        check_entities(text, entities)?;

        let records = entities
            .iter()
            .map(|entity| -> Result<AuditRecord> {
                let decision = self.decide(entity, session)?;
                Ok(self.record(entity, decision))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(TransformOutput {
            text: text.to_string(),
            records,
        })
    }

    fn decide(&self, entity: &MergedEntity, session: &mut ConsistencySession<'_>) -> Result<Decision> {
        let category = entity.category;
        let redact = || Decision {
            applied: Strategy::Redact,
            replacement: self.rules.redaction(category),
            disclose: true,
        };

        let decision = match self.rules.strategy_for(category) {
            Strategy::Redact => redact(),
            Strategy::Hash => {
                let code = session.token_for(category, &entity.text)?;
                Decision {
                    applied: Strategy::Hash,
                    replacement: self.rules.hash_replacement(category, &code),
                    disclose: true,
                }
            }
            Strategy::Pseudonym => {
                let code = session.token_for(category, &entity.text)?;
                Decision {
                    applied: Strategy::Pseudonym,
                    replacement: self.rules.pseudonym_replacement(category, &code),
                    disclose: true,
                }
            }
            Strategy::Generalize => {
                match generalize::generalize(category, &entity.text, session.engine().dates()) {
                    Some(value) => Decision {
                        applied: Strategy::Generalize,
                        replacement: value,
                        disclose: false,
                    },
                    None => redact(),
                }
            }
            Strategy::DateShift => match session.shift_date(&entity.text) {
                DateShiftOutcome::Shifted(value) => Decision {
                    applied: Strategy::DateShift,
                    replacement: value,
                    disclose: false,
                },
                DateShiftOutcome::YearOnly => Decision {
                    applied: Strategy::Redact,
                    replacement: self.rules.redaction_labeled("YEAR"),
                    disclose: true,
                },
                DateShiftOutcome::Partial | DateShiftOutcome::Unparseable => Decision {
                    applied: Strategy::Redact,
                    replacement: self.rules.redaction_labeled(PhiCategory::Date.label()),
                    disclose: true,
                },
            },
            Strategy::Preserve => Decision {
                applied: Strategy::Preserve,
                replacement: entity.text.clone(),
                disclose: false,
            },
        };
        Ok(decision)
    }

    fn record(&self, entity: &MergedEntity, decision: Decision) -> AuditRecord {
        AuditRecord {
            start: entity.start,
            end: entity.end,
            category: entity.category,
            confidence: entity.confidence,
            strategy: self.rules.strategy_for(entity.category),
            strategy_applied: decision.applied,
            replacement: decision.disclose.then_some(decision.replacement),
            sources: entity.merged_from.clone(),
            original_text: self.retain_original_text.then(|| entity.text.clone()),
        }
    }
}

fn check_entities(text: &str, entities: &[MergedEntity]) -> Result<()> {
    let mut previous_end = 0;
    for entity in entities {
        if entity.start < previous_end
            || entity.start >= entity.end
            || text.get(entity.start..entity.end) != Some(entity.text.as_str())
        {
            return Err(DeidError::ResolverInvariantViolation(format!(
                "entity at {}..{} is out of order, overlapping or does not match the input",
                entity.start, entity.end
            )));
        }
        previous_end = entity.end;
    }
    Ok(())
}
