//! Evaluation of a single rule against an attribute value.

use std::cmp::Ordering;

use crate::core::attribute::AttributeValue;
use crate::core::rule::{Constraint, MatchingRule, NumericBounds, RangeBounds};
use crate::utils::dicom_time::parse_dicom_date;

/// Outcome of evaluating one rule
#[derive(Debug, Clone, PartialEq)]
pub struct RuleEvaluation {
    pub passed: bool,
    /// `rule.weight` when passed, 0 otherwise
    pub contribution: f64,
    /// Validator message when the rule failed
    pub message: Option<String>,
}

/// Evaluate a rule's constraint against the value found for its attribute
#[must_use]
pub fn evaluate(rule: &MatchingRule, value: Option<&AttributeValue>) -> RuleEvaluation {
    match rule.constraint.check(value) {
        Ok(()) => RuleEvaluation {
            passed: true,
            contribution: rule.weight,
            message: None,
        },
        Err(message) => RuleEvaluation {
            passed: false,
            contribution: 0.0,
            message: Some(format!("{} {message}", rule.attribute)),
        },
    }
}

impl Constraint {
    /// Check a value against the constraint.
    ///
    /// A missing value fails every positive validator and passes the negated
    /// ones (`doesNotEqual`, `doesNotContain`, `doesNotContainI`).
    ///
    /// # Errors
    ///
    /// Returns the validator message describing why the value was rejected.
    pub fn check(&self, value: Option<&AttributeValue>) -> Result<(), String> {
        let text = value.map(AttributeValue::to_match_string);
        let text = text.as_deref();

        match self {
            Self::Equals(expected) => {
                let expected = expected.to_match_string();
                ensure(text == Some(expected.as_str()), || format!("must equal {expected}"))
            }
            Self::DoesNotEqual(expected) => {
                let expected = expected.to_match_string();
                ensure(text != Some(expected.as_str()), || format!("must not equal {expected}"))
            }
            Self::Contains(needle) => ensure(text.is_some_and(|t| t.contains(needle.as_str())), || {
                format!("must contain {needle}")
            }),
            Self::DoesNotContain(needle) => {
                ensure(!text.is_some_and(|t| t.contains(needle.as_str())), || {
                    format!("must not contain {needle}")
                })
            }
            Self::ContainsI(needle) => ensure(text.is_some_and(|t| contains_ignore_case(t, needle)), || {
                format!("must contain {needle} (case-insensitive)")
            }),
            Self::DoesNotContainI(needle) => {
                ensure(!text.is_some_and(|t| contains_ignore_case(t, needle)), || {
                    format!("must not contain {needle} (case-insensitive)")
                })
            }
            Self::StartsWith(prefix) => ensure(text.is_some_and(|t| t.starts_with(prefix.as_str())), || {
                format!("must start with {prefix}")
            }),
            Self::EndsWith(suffix) => ensure(text.is_some_and(|t| t.ends_with(suffix.as_str())), || {
                format!("must end with {suffix}")
            }),
            Self::GreaterThan(limit) => {
                ensure(number(value).is_some_and(|n| n > *limit), || format!("must be greater than {limit}"))
            }
            Self::LessThan(limit) => {
                ensure(number(value).is_some_and(|n| n < *limit), || format!("must be less than {limit}"))
            }
            Self::Numericality(bounds) => check_numericality(bounds, number(value)),
            Self::Range(bounds) => check_range(bounds, value),
            Self::NotNull => ensure(value.is_some_and(|v| !v.is_empty()), || "must not be empty".to_string()),
        }
    }
}

fn ensure(condition: bool, message: impl FnOnce() -> String) -> Result<(), String> {
    if condition {
        Ok(())
    } else {
        Err(message())
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn number(value: Option<&AttributeValue>) -> Option<f64> {
    value.and_then(AttributeValue::as_f64)
}

fn check_numericality(bounds: &NumericBounds, value: Option<f64>) -> Result<(), String> {
    let Some(n) = value else {
        return Err("is not a number".to_string());
    };

    if let Some(limit) = bounds.greater_than {
        ensure(n > limit, || format!("must be greater than {limit}"))?;
    }
    if let Some(limit) = bounds.greater_than_or_equal_to {
        ensure(n >= limit, || format!("must be greater than or equal to {limit}"))?;
    }
    if let Some(limit) = bounds.less_than {
        ensure(n < limit, || format!("must be less than {limit}"))?;
    }
    if let Some(limit) = bounds.less_than_or_equal_to {
        ensure(n <= limit, || format!("must be less than or equal to {limit}"))?;
    }
    if let Some(expected) = bounds.equal_to {
        ensure((n - expected).abs() < f64::EPSILON, || format!("must be equal to {expected}"))?;
    }
    Ok(())
}

/// Compare two values as dates when both parse as DICOM dates, else as numbers
fn compare_range_values(a: &AttributeValue, b: &AttributeValue) -> Option<Ordering> {
    let as_date = |v: &AttributeValue| v.as_str().and_then(parse_dicom_date);
    if let (Some(x), Some(y)) = (as_date(a), as_date(b)) {
        return Some(x.cmp(&y));
    }
    a.as_f64()?.partial_cmp(&b.as_f64()?)
}

fn check_range(bounds: &RangeBounds, value: Option<&AttributeValue>) -> Result<(), String> {
    let message = || format!("must be between {} and {}", bounds.min, bounds.max);
    let Some(value) = value else {
        return Err(message());
    };

    let above_min = compare_range_values(value, &bounds.min).is_some_and(Ordering::is_ge);
    let below_max = compare_range_values(value, &bounds.max).is_some_and(Ordering::is_le);
    ensure(above_min && below_max, message)
}
