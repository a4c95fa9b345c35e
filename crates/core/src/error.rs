/// A sensor record that could not be turned into a [`Sample`](crate::sample::Sample).
///
/// The record is discarded; it is not an observation.
#[derive(Debug, thiserror::Error)]
pub enum SampleParseError {
    #[error("Malformed record: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("Invalid field value: {0}")]
    InvalidField(#[source] serde_json::Error),
}

/// A single threshold rule could not be evaluated against a sample.
///
/// The rule counts as unsatisfied; classification continues.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RuleEvaluationError {
    #[error("Rule {rule} reads unknown field '{field}'")]
    UnknownField { rule: String, field: String },

    #[error("Rule {rule} cannot compare {value} against {threshold}")]
    Incomparable {
        rule: String,
        value: f64,
        threshold: f64,
    },
}

/// An invalid threshold table definition.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ThresholdTableError {
    #[error("Malformed threshold table: {0}")]
    Malformed(String),

    #[error("Threshold table defines no outcomes")]
    Empty,

    #[error("Outcome #{index} has an empty label")]
    EmptyLabel { index: usize },

    #[error("Duplicate outcome label '{0}'")]
    DuplicateLabel(String),

    #[error("Outcome '{0}' defines no rules")]
    NoRules(String),

    #[error("Rule key '{key}' in outcome '{label}' must end in _min or _max")]
    InvalidRuleKey { label: String, key: String },

    #[error("Rule '{key}' in outcome '{label}' has a non-numeric threshold")]
    NonNumericThreshold { label: String, key: String },
}
