use serde::Serialize;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::core::attribute::{normalize_attribute_name, AttributeValue};
use crate::core::metadata::AttributeSource;
use crate::core::rule::MatchingRule;
use crate::matching::constraint::evaluate;

/// Computes an attribute that is not part of the metadata itself
pub type CustomAttributeFn =
    Arc<dyn Fn(&dyn AttributeSource) -> Option<AttributeValue> + Send + Sync>;

/// A rule that passed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PassedRule {
    pub rule: MatchingRule,
}

/// A rule that failed, with the validator messages
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedRule {
    pub rule: MatchingRule,
    pub error_messages: Vec<String>,
}

/// Which rules passed and failed
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RuleDetails {
    pub passed: Vec<PassedRule>,
    pub failed: Vec<FailedRule>,
}

impl RuleDetails {
    /// Append another set of details after this one
    pub fn extend(&mut self, other: &RuleDetails) {
        self.passed.extend(other.passed.iter().cloned());
        self.failed.extend(other.failed.iter().cloned());
    }
}

/// Result of evaluating a rule set against one entity
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchDetails {
    /// Sum of the weights of passed rules; 0 when a required rule failed
    pub score: f64,
    pub required_failed: bool,
    pub details: RuleDetails,
}

#[derive(Clone)]
struct CustomAttribute {
    name: String,
    callback: CustomAttributeFn,
}

/// Matches metadata entities against rule sets.
///
/// Holds the registry of custom attributes; matching itself keeps no state,
/// so one matcher can be shared freely.
#[derive(Clone, Default)]
pub struct HpMatcher {
    custom_attributes: BTreeMap<String, CustomAttribute>,
}

impl std::fmt::Debug for HpMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HpMatcher")
            .field(
                "custom_attributes",
                &self.custom_attributes.keys().collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl HpMatcher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a custom attribute computed from the entity being matched.
    ///
    /// Used when an entity carries neither an engine-assigned nor a metadata
    /// value for the attribute.
    pub fn add_custom_attribute<F>(&mut self, attribute_id: impl Into<String>, name: impl Into<String>, callback: F)
    where
        F: Fn(&dyn AttributeSource) -> Option<AttributeValue> + Send + Sync + 'static,
    {
        self.custom_attributes.insert(
            attribute_id.into(),
            CustomAttribute {
                name: name.into(),
                callback: Arc::new(callback),
            },
        );
    }

    #[must_use]
    pub fn with_custom_attribute<F>(mut self, attribute_id: impl Into<String>, name: impl Into<String>, callback: F) -> Self
    where
        F: Fn(&dyn AttributeSource) -> Option<AttributeValue> + Send + Sync + 'static,
    {
        self.add_custom_attribute(attribute_id, name, callback);
        self
    }

    /// Registered custom attributes as (id, display name)
    pub fn custom_attributes(&self) -> impl Iterator<Item = (&str, &str)> {
        self.custom_attributes
            .iter()
            .map(|(id, attr)| (id.as_str(), attr.name.as_str()))
    }

    /// Look up the value a rule's attribute has on an entity
    fn lookup<'a>(&self, entity: &'a dyn AttributeSource, attribute: &str) -> Option<Cow<'a, AttributeValue>> {
        let keyword = normalize_attribute_name(attribute);

        if let Some(value) = entity.custom_attribute(&keyword) {
            return Some(Cow::Borrowed(value));
        }
        if let Some(custom) = self.custom_attributes.get(keyword.as_ref()) {
            return (custom.callback)(entity).map(Cow::Owned);
        }
        entity.attribute(&keyword).map(Cow::Borrowed)
    }

    /// Evaluate every rule against the entity.
    ///
    /// The score is the sum of passed rule weights, zeroed when any required
    /// rule fails.
    #[must_use]
    pub fn match_rules(&self, entity: &dyn AttributeSource, rules: &[MatchingRule]) -> MatchDetails {
        let mut details = RuleDetails::default();
        let mut required_failed = false;
        let mut score = 0.0;

        for rule in rules {
            let value = self.lookup(entity, &rule.attribute);
            let evaluation = evaluate(rule, value.as_deref());

            if evaluation.passed {
                score += evaluation.contribution;
                details.passed.push(PassedRule { rule: rule.clone() });
            } else {
                if rule.required {
                    required_failed = true;
                }
                details.failed.push(FailedRule {
                    rule: rule.clone(),
                    error_messages: evaluation.message.into_iter().collect(),
                });
            }
        }

        if required_failed {
            score = 0.0;
        }

        MatchDetails {
            score,
            required_failed,
            details,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::metadata::{Instance, Series, Study};
    use crate::core::rule::Constraint;

    fn instance() -> Instance {
        Instance::new()
            .with_attribute("Modality", "CT")
            .with_attribute("SeriesDescription", "CHEST W/O")
            .with_attribute("SeriesNumber", 2)
    }

    fn equals(attr: &str, value: impl Into<AttributeValue>) -> MatchingRule {
        MatchingRule::new(attr, Constraint::Equals(value.into()))
    }

    #[test]
    fn test_score_sums_weights() {
        let rules = vec![
            equals("Modality", "CT").with_weight(3.0),
            equals("SeriesNumber", 2).with_weight(2.0),
            equals("SeriesNumber", 9).with_weight(5.0),
        ];
        let details = HpMatcher::new().match_rules(&instance(), &rules);

        assert!((details.score - 5.0).abs() < f64::EPSILON);
        assert!(!details.required_failed);
        assert_eq!(details.details.passed.len(), 2);
        assert_eq!(details.details.failed.len(), 1);
        assert_eq!(
            details.details.failed[0].error_messages,
            vec!["SeriesNumber must equal 9".to_string()]
        );
    }

    #[test]
    fn test_required_failure_zeroes_score() {
        let rules = vec![
            equals("Modality", "CT").with_weight(10.0),
            equals("SeriesNumber", 9).required(true),
        ];
        let details = HpMatcher::new().match_rules(&instance(), &rules);

        assert!(details.required_failed);
        assert!(details.score.abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_rules_score_zero() {
        let details = HpMatcher::new().match_rules(&instance(), &[]);
        assert!(details.score.abs() < f64::EPSILON);
        assert!(!details.required_failed);
    }

    #[test]
    fn test_hex_tag_attribute() {
        let rule = MatchingRule::new("x0008103e", Constraint::Contains("CHEST".to_string()));
        let details = HpMatcher::new().match_rules(&instance(), &[rule]);
        assert_eq!(details.details.passed.len(), 1);
    }

    #[test]
    fn test_custom_attribute_precedence() {
        let study = Study::new("1.2.3")
            .with_series(vec![Series::new("1.2.3.4").with_instances(vec![instance()])]);

        let matcher = HpMatcher::new().with_custom_attribute("numImages", "Number of Images", |_| {
            Some(AttributeValue::from(42))
        });
        let rule = equals("numImages", 42);
        assert_eq!(matcher.match_rules(&study, &[rule.clone()]).details.passed.len(), 1);

        let mut tagged = study.clone();
        tagged.set_custom_attribute("numImages", 7);
        assert_eq!(matcher.match_rules(&tagged, &[rule]).details.failed.len(), 1);

        let names: Vec<_> = matcher.custom_attributes().collect();
        assert_eq!(names, vec![("numImages", "Number of Images")]);
    }
}
