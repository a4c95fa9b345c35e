//! First-to-quorum outcome classification.
//!
//! Outcomes are tried in table order. For each one every rule is
//! evaluated independently and each satisfied rule is one vote. The
//! first outcome with at least [`QUORUM`] votes is the result and no
//! later outcome is looked at. No outcome at quorum means "no match".

use crate::error::RuleEvaluationError;
use crate::sample::{Sample, SampleField};
use crate::thresholds::{ThresholdRule, ThresholdTable};

/// Votes an outcome needs to be selected.
pub const QUORUM: usize = 3;

/// The selected outcome for one sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub label: String,
    /// Rules of the outcome the sample satisfied.
    pub votes: usize,
    /// Total rules the outcome declares.
    pub rule_count: usize,
}

/// Classifies samples against a fixed [`ThresholdTable`].
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    table: ThresholdTable,
}

impl Classifier {
    pub fn new(table: ThresholdTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &ThresholdTable {
        &self.table
    }

    /// Return the first outcome, in declaration order, reaching quorum.
    pub fn classify(&self, sample: &Sample) -> Option<Classification> {
        for outcome in self.table.outcomes() {
            let votes = count_votes(sample, &outcome.rules);
            if votes >= QUORUM {
                tracing::info!(
                    label = %outcome.label,
                    votes,
                    rule_count = outcome.rules.len(),
                    "Outcome reached quorum",
                );
                return Some(Classification {
                    label: outcome.label.clone(),
                    votes,
                    rule_count: outcome.rules.len(),
                });
            }
        }
        None
    }
}

/// Count the rules `sample` satisfies.
///
/// A rule that fails to evaluate is logged and counts as unsatisfied;
/// the remaining rules are still evaluated.
pub fn count_votes(sample: &Sample, rules: &[ThresholdRule]) -> usize {
    rules
        .iter()
        .filter(|rule| match evaluate_rule(rule, sample) {
            Ok(satisfied) => satisfied,
            Err(e) => {
                tracing::warn!(error = %e, "Rule evaluation failed, counting as unsatisfied");
                false
            }
        })
        .count()
}

/// Evaluate one rule against one sample.
pub fn evaluate_rule(rule: &ThresholdRule, sample: &Sample) -> Result<bool, RuleEvaluationError> {
    let field =
        SampleField::from_name(&rule.field).ok_or_else(|| RuleEvaluationError::UnknownField {
            rule: rule.key(),
            field: rule.field.clone(),
        })?;

    let value = sample.value(field);
    rule.comparison
        .holds(value, rule.threshold)
        .ok_or_else(|| RuleEvaluationError::Incomparable {
            rule: rule.key(),
            value,
            threshold: rule.threshold,
        })
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::field_names::{FIELD_BODY_TEMP, FIELD_GSR, FIELD_HEART_RATE};
    use crate::thresholds::OutcomeRules;

    fn table(outcomes: &[(&str, Vec<ThresholdRule>)]) -> ThresholdTable {
        ThresholdTable::new(
            outcomes
                .iter()
                .map(|(label, rules)| OutcomeRules {
                    label: label.to_string(),
                    rules: rules.clone(),
                })
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn evaluates_known_field() {
        let sample = Sample {
            heart_rate: 90,
            ..Sample::default()
        };
        let rule = ThresholdRule::at_least(FIELD_HEART_RATE, 90.0);
        assert_eq!(evaluate_rule(&rule, &sample), Ok(true));
    }

    #[test]
    fn unknown_field_is_an_error() {
        let rule = ThresholdRule::at_least("Pulse", 60.0);
        assert_matches!(
            evaluate_rule(&rule, &Sample::default()),
            Err(RuleEvaluationError::UnknownField { field, .. }) if field == "Pulse"
        );
    }

    #[test]
    fn nan_value_is_an_error() {
        let sample = Sample {
            body_temp: f64::NAN,
            ..Sample::default()
        };
        let rule = ThresholdRule::at_least(FIELD_BODY_TEMP, 36.8);
        assert_matches!(
            evaluate_rule(&rule, &sample),
            Err(RuleEvaluationError::Incomparable { .. })
        );
    }

    #[test]
    fn failed_rule_counts_as_unsatisfied() {
        let rules = vec![
            ThresholdRule::at_least("Pulse", 0.0),
            ThresholdRule::at_most(FIELD_GSR, 5.0),
            ThresholdRule::at_most(FIELD_HEART_RATE, 100.0),
        ];
        assert_eq!(count_votes(&Sample::default(), &rules), 2);
    }

    #[test]
    fn quorum_needs_three_votes() {
        let classifier = Classifier::new(table(&[(
            "busy",
            vec![
                ThresholdRule::at_least(FIELD_HEART_RATE, 100.0),
                ThresholdRule::at_least(FIELD_GSR, 500.0),
                ThresholdRule::at_least(FIELD_BODY_TEMP, 37.5),
            ],
        )]));

        let two = Sample {
            heart_rate: 120,
            gsr: 800,
            ..Sample::default()
        };
        assert_eq!(classifier.classify(&two), None);

        let three = Sample {
            body_temp: 37.5,
            ..two
        };
        let result = classifier.classify(&three).unwrap();
        assert_eq!(result.label, "busy");
        assert_eq!(result.votes, 3);
        assert_eq!(result.rule_count, 3);
    }

    #[test]
    fn earlier_outcome_wins_even_with_fewer_votes() {
        let at_most_zero = |field: &str| ThresholdRule::at_most(field, 0.0);
        let classifier = Classifier::new(table(&[
            (
                "first",
                vec![
                    at_most_zero(FIELD_HEART_RATE),
                    at_most_zero(FIELD_GSR),
                    at_most_zero(FIELD_BODY_TEMP),
                    ThresholdRule::at_least(FIELD_HEART_RATE, 1.0),
                ],
            ),
            (
                "second",
                vec![
                    at_most_zero(FIELD_HEART_RATE),
                    at_most_zero(FIELD_GSR),
                    at_most_zero(FIELD_BODY_TEMP),
                    at_most_zero("BP_High"),
                ],
            ),
        ]));

        let result = classifier.classify(&Sample::default()).unwrap();
        assert_eq!(result.label, "first");
        assert_eq!(result.votes, 3);
    }
}
