//! Outcome threshold table.
//!
//! Maps each outcome label to a set of independent per-field rules.
//! Every rule is one vote; the classifier decides what the votes mean.
//! Outcome order is significant (first outcome to reach quorum wins),
//! rule order within an outcome is not.

use std::collections::{BTreeMap, HashSet};

use serde::Deserialize;
use serde_json::Value;

use crate::error::ThresholdTableError;
use crate::field_names::{
    FIELD_BLOOD_OXYGEN, FIELD_BODY_TEMP, FIELD_BP_HIGH, FIELD_BP_LOW, FIELD_BREATH_RATE,
    FIELD_CIRCULATION, FIELD_FATIGUE, FIELD_GSR, FIELD_HEART_RATE, FIELD_HRV_RMSSD,
    FIELD_HRV_SDNN, LABEL_ABNORMAL, LABEL_ANGER, LABEL_ANXIETY, LABEL_SADNESS, RULE_SUFFIX_MAX,
    RULE_SUFFIX_MIN,
};

/// Direction of a threshold comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// Field must be `>=` the threshold.
    AtLeast,
    /// Field must be `<=` the threshold.
    AtMost,
}

impl Comparison {
    /// Rule-key suffix for this direction.
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::AtLeast => RULE_SUFFIX_MIN,
            Self::AtMost => RULE_SUFFIX_MAX,
        }
    }

    /// Whether `value` satisfies the comparison against `threshold`.
    ///
    /// Returns `None` when the two values are not ordered (a `NaN` on
    /// either side).
    pub fn holds(&self, value: f64, threshold: f64) -> Option<bool> {
        let ordering = value.partial_cmp(&threshold)?;
        Some(match self {
            Self::AtLeast => ordering.is_ge(),
            Self::AtMost => ordering.is_le(),
        })
    }
}

/// One `(field, comparison, threshold)` vote.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdRule {
    /// Record key the rule reads. Not checked until evaluation.
    pub field: String,
    pub comparison: Comparison,
    pub threshold: f64,
}

impl ThresholdRule {
    pub fn at_least(field: impl Into<String>, threshold: f64) -> Self {
        Self {
            field: field.into(),
            comparison: Comparison::AtLeast,
            threshold,
        }
    }

    pub fn at_most(field: impl Into<String>, threshold: f64) -> Self {
        Self {
            field: field.into(),
            comparison: Comparison::AtMost,
            threshold,
        }
    }

    /// Build a rule from a `<Field>_min` / `<Field>_max` key.
    pub fn from_key(key: &str, threshold: f64) -> Option<Self> {
        if let Some(field) = key.strip_suffix(RULE_SUFFIX_MIN) {
            (!field.is_empty()).then(|| Self::at_least(field, threshold))
        } else if let Some(field) = key.strip_suffix(RULE_SUFFIX_MAX) {
            (!field.is_empty()).then(|| Self::at_most(field, threshold))
        } else {
            None
        }
    }

    /// The `<Field>_min` / `<Field>_max` key naming this rule.
    pub fn key(&self) -> String {
        format!("{}{}", self.field, self.comparison.suffix())
    }
}

/// An outcome label and the rules that vote for it.
#[derive(Debug, Clone, PartialEq)]
pub struct OutcomeRules {
    pub label: String,
    pub rules: Vec<ThresholdRule>,
}

/// Immutable outcome table, in declaration order.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdTable {
    outcomes: Vec<OutcomeRules>,
}

/// On-disk shape of one outcome in a threshold file.
#[derive(Debug, Deserialize)]
struct OutcomeDefinition {
    label: String,
    rules: BTreeMap<String, Value>,
}

impl ThresholdTable {
    /// Build a table from outcomes in declaration order.
    pub fn new(outcomes: Vec<OutcomeRules>) -> Result<Self, ThresholdTableError> {
        if outcomes.is_empty() {
            return Err(ThresholdTableError::Empty);
        }

        let mut seen = HashSet::new();
        for (index, outcome) in outcomes.iter().enumerate() {
            if outcome.label.trim().is_empty() {
                return Err(ThresholdTableError::EmptyLabel { index });
            }
            if !seen.insert(outcome.label.as_str()) {
                return Err(ThresholdTableError::DuplicateLabel(outcome.label.clone()));
            }
            if outcome.rules.is_empty() {
                return Err(ThresholdTableError::NoRules(outcome.label.clone()));
            }
        }

        Ok(Self { outcomes })
    }

    /// Load a table from its JSON form:
    ///
    /// ```json
    /// [{"label": "anger", "rules": {"HeartRate_min": 90, "BP_High_min": 135}}]
    /// ```
    ///
    /// Array order becomes declaration order.
    pub fn from_json(text: &str) -> Result<Self, ThresholdTableError> {
        let definitions: Vec<OutcomeDefinition> = serde_json::from_str(text)
            .map_err(|e| ThresholdTableError::Malformed(e.to_string()))?;

        let mut outcomes = Vec::with_capacity(definitions.len());
        for definition in definitions {
            let mut rules = Vec::with_capacity(definition.rules.len());
            for (key, raw) in &definition.rules {
                let threshold =
                    raw.as_f64()
                        .ok_or_else(|| ThresholdTableError::NonNumericThreshold {
                            label: definition.label.clone(),
                            key: key.clone(),
                        })?;
                let rule = ThresholdRule::from_key(key, threshold).ok_or_else(|| {
                    ThresholdTableError::InvalidRuleKey {
                        label: definition.label.clone(),
                        key: key.clone(),
                    }
                })?;
                rules.push(rule);
            }
            outcomes.push(OutcomeRules {
                label: definition.label,
                rules,
            });
        }

        Self::new(outcomes)
    }

    /// Rules voting for `label`, or `None` for an unknown label.
    pub fn rules_for(&self, label: &str) -> Option<&[ThresholdRule]> {
        self.outcomes
            .iter()
            .find(|o| o.label == label)
            .map(|o| o.rules.as_slice())
    }

    /// Outcome labels in declaration order.
    pub fn all_outcomes(&self) -> impl Iterator<Item = &str> {
        self.outcomes.iter().map(|o| o.label.as_str())
    }

    pub fn outcomes(&self) -> &[OutcomeRules] {
        &self.outcomes
    }
}

/// The built-in table: abnormal, anxiety, anger, sadness.
impl Default for ThresholdTable {
    fn default() -> Self {
        Self {
            outcomes: vec![
                OutcomeRules {
                    label: LABEL_ABNORMAL.to_string(),
                    rules: vec![
                        ThresholdRule::at_least(FIELD_HEART_RATE, 60.0),
                        ThresholdRule::at_most(FIELD_HEART_RATE, 105.0),
                        ThresholdRule::at_most(FIELD_GSR, 5.0),
                        ThresholdRule::at_most(FIELD_BLOOD_OXYGEN, 90.0),
                        ThresholdRule::at_most(FIELD_BP_HIGH, 140.0),
                        ThresholdRule::at_most(FIELD_BP_LOW, 90.0),
                        ThresholdRule::at_least(FIELD_HRV_SDNN, 45.0),
                        ThresholdRule::at_least(FIELD_CIRCULATION, 10.0),
                    ],
                },
                OutcomeRules {
                    label: LABEL_ANXIETY.to_string(),
                    rules: vec![
                        ThresholdRule::at_least(FIELD_HEART_RATE, 85.0),
                        ThresholdRule::at_least(FIELD_BODY_TEMP, 36.8),
                        ThresholdRule::at_least(FIELD_GSR, 600.0),
                        ThresholdRule::at_least(FIELD_FATIGUE, 60.0),
                        ThresholdRule::at_most(FIELD_BREATH_RATE, 10.0),
                        ThresholdRule::at_most(FIELD_HRV_SDNN, 30.0),
                        ThresholdRule::at_most(FIELD_HRV_RMSSD, 25.0),
                    ],
                },
                OutcomeRules {
                    label: LABEL_ANGER.to_string(),
                    rules: vec![
                        ThresholdRule::at_least(FIELD_HEART_RATE, 90.0),
                        ThresholdRule::at_least(FIELD_BODY_TEMP, 37.0),
                        ThresholdRule::at_least(FIELD_GSR, 700.0),
                        ThresholdRule::at_least(FIELD_BP_HIGH, 135.0),
                        ThresholdRule::at_least(FIELD_BREATH_RATE, 18.0),
                        ThresholdRule::at_least(FIELD_FATIGUE, 50.0),
                    ],
                },
                OutcomeRules {
                    label: LABEL_SADNESS.to_string(),
                    rules: vec![
                        ThresholdRule::at_most(FIELD_HEART_RATE, 65.0),
                        ThresholdRule::at_most(FIELD_BODY_TEMP, 36.5),
                        ThresholdRule::at_most(FIELD_GSR, 400.0),
                        ThresholdRule::at_most(FIELD_FATIGUE, 70.0),
                        ThresholdRule::at_least(FIELD_BLOOD_OXYGEN, 94.0),
                        ThresholdRule::at_least(FIELD_HRV_SDNN, 10.0),
                        ThresholdRule::at_least(FIELD_HRV_RMSSD, 10.0),
                    ],
                },
            ],
        }
    }
}
