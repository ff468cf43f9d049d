use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::core::attribute::AttributeValue;
use crate::core::types::{ABSTRACT_PRIOR_VALUE, RELATIVE_TIME};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConstraintError {
    #[error("Constraint must name exactly one validator, found {0}")]
    ValidatorCount(usize),

    #[error("Unknown validator '{0}'")]
    UnknownValidator(String),

    #[error("Invalid operand for '{validator}': {reason}")]
    InvalidOperand { validator: String, reason: String },
}

/// Bounds of a `numericality` constraint; every present bound must hold
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NumericBounds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub greater_than: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub greater_than_or_equal_to: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub less_than: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub less_than_or_equal_to: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equal_to: Option<f64>,
}

impl NumericBounds {
    /// First bound in declaration order, used when a numericality rule
    /// names a prior index
    fn first_bound(&self) -> Option<f64> {
        self.greater_than
            .or(self.greater_than_or_equal_to)
            .or(self.less_than)
            .or(self.less_than_or_equal_to)
            .or(self.equal_to)
    }
}

/// Inclusive bounds of a `range` constraint (numbers or DICOM dates)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeBounds {
    pub min: AttributeValue,
    pub max: AttributeValue,
}

/// A validator applied to one attribute value.
///
/// Serialized in the stored-protocol form `{ "<validator>": { "value": ... } }`;
/// a bare operand (`{ "contains": "T1" }`) is accepted on input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Map<String, Value>", into = "Map<String, Value>")]
pub enum Constraint {
    Equals(AttributeValue),
    DoesNotEqual(AttributeValue),
    Contains(String),
    DoesNotContain(String),
    /// Case-insensitive `contains`
    ContainsI(String),
    /// Case-insensitive `doesNotContain`
    DoesNotContainI(String),
    StartsWith(String),
    EndsWith(String),
    GreaterThan(f64),
    LessThan(f64),
    Numericality(NumericBounds),
    Range(RangeBounds),
    NotNull,
}

impl Constraint {
    /// Validator name as written in stored protocols
    #[must_use]
    pub fn validator_name(&self) -> &'static str {
        match self {
            Self::Equals(_) => "equals",
            Self::DoesNotEqual(_) => "doesNotEqual",
            Self::Contains(_) => "contains",
            Self::DoesNotContain(_) => "doesNotContain",
            Self::ContainsI(_) => "containsI",
            Self::DoesNotContainI(_) => "doesNotContainI",
            Self::StartsWith(_) => "startsWith",
            Self::EndsWith(_) => "endsWith",
            Self::GreaterThan(_) => "greaterThan",
            Self::LessThan(_) => "lessThan",
            Self::Numericality(_) => "numericality",
            Self::Range(_) => "range",
            Self::NotNull => "notNull",
        }
    }

    /// The constraint's first operand read as an integer.
    ///
    /// `abstractPriorValue` rules carry the requested prior index here.
    #[must_use]
    pub fn operand_integer(&self) -> Option<i64> {
        match self {
            Self::Equals(v) | Self::DoesNotEqual(v) => v.as_integer(),
            Self::Contains(s)
            | Self::DoesNotContain(s)
            | Self::ContainsI(s)
            | Self::DoesNotContainI(s)
            | Self::StartsWith(s)
            | Self::EndsWith(s) => AttributeValue::from(s.as_str()).as_integer(),
            Self::GreaterThan(n) | Self::LessThan(n) => AttributeValue::from(*n).as_integer(),
            Self::Numericality(bounds) => bounds.first_bound().and_then(|n| AttributeValue::from(n).as_integer()),
            Self::Range(bounds) => bounds.min.as_integer(),
            Self::NotNull => None,
        }
    }
}

/// Unwrap `{ "value": x }` to `x`; anything else is the operand itself
fn unwrap_operand(raw: Value) -> Value {
    match raw {
        Value::Object(mut obj) if obj.len() == 1 && obj.contains_key("value") => {
            obj.remove("value").unwrap_or(Value::Null)
        }
        other => other,
    }
}

fn invalid(validator: &str, reason: impl Into<String>) -> ConstraintError {
    ConstraintError::InvalidOperand {
        validator: validator.to_string(),
        reason: reason.into(),
    }
}

fn operand_value(validator: &str, raw: Value) -> Result<AttributeValue, ConstraintError> {
    serde_json::from_value(unwrap_operand(raw)).map_err(|e| invalid(validator, e.to_string()))
}

fn operand_string(validator: &str, raw: Value) -> Result<String, ConstraintError> {
    match operand_value(validator, raw)? {
        AttributeValue::Null => Err(invalid(validator, "expected a string")),
        value => Ok(value.to_match_string()),
    }
}

fn operand_number(validator: &str, raw: Value) -> Result<f64, ConstraintError> {
    operand_value(validator, raw)?
        .as_f64()
        .ok_or_else(|| invalid(validator, "expected a number"))
}

fn operand_range(validator: &str, raw: Value) -> Result<RangeBounds, ConstraintError> {
    match unwrap_operand(raw) {
        Value::Array(items) if items.len() == 2 => {
            let mut items = items.into_iter();
            let min = operand_value(validator, items.next().unwrap_or(Value::Null))?;
            let max = operand_value(validator, items.next().unwrap_or(Value::Null))?;
            Ok(RangeBounds { min, max })
        }
        obj @ Value::Object(_) => {
            serde_json::from_value(obj).map_err(|e| invalid(validator, e.to_string()))
        }
        _ => Err(invalid(validator, "expected [min, max] or {min, max}")),
    }
}

impl TryFrom<Map<String, Value>> for Constraint {
    type Error = ConstraintError;

    fn try_from(map: Map<String, Value>) -> Result<Self, Self::Error> {
        if map.len() != 1 {
            return Err(ConstraintError::ValidatorCount(map.len()));
        }
        let Some((validator, raw)) = map.into_iter().next() else {
            return Err(ConstraintError::ValidatorCount(0));
        };

        let v = validator.as_str();
        let constraint = match v {
            "equals" => Self::Equals(operand_value(v, raw)?),
            "doesNotEqual" => Self::DoesNotEqual(operand_value(v, raw)?),
            "contains" => Self::Contains(operand_string(v, raw)?),
            "doesNotContain" => Self::DoesNotContain(operand_string(v, raw)?),
            "containsI" => Self::ContainsI(operand_string(v, raw)?),
            "doesNotContainI" => Self::DoesNotContainI(operand_string(v, raw)?),
            "startsWith" => Self::StartsWith(operand_string(v, raw)?),
            "endsWith" => Self::EndsWith(operand_string(v, raw)?),
            "greaterThan" => Self::GreaterThan(operand_number(v, raw)?),
            "lessThan" => Self::LessThan(operand_number(v, raw)?),
            "numericality" => Self::Numericality(
                serde_json::from_value(raw).map_err(|e| invalid(v, e.to_string()))?,
            ),
            "range" => Self::Range(operand_range(v, raw)?),
            "notNull" => Self::NotNull,
            other => return Err(ConstraintError::UnknownValidator(other.to_string())),
        };

        Ok(constraint)
    }
}

impl From<Constraint> for Map<String, Value> {
    fn from(constraint: Constraint) -> Self {
        let name = constraint.validator_name().to_string();
        let wrap = |operand: Value| {
            let mut inner = Map::new();
            inner.insert("value".to_string(), operand);
            Value::Object(inner)
        };
        let to_json = |value: &AttributeValue| serde_json::to_value(value).unwrap_or(Value::Null);

        let body = match &constraint {
            Constraint::Equals(v) | Constraint::DoesNotEqual(v) => wrap(to_json(v)),
            Constraint::Contains(s)
            | Constraint::DoesNotContain(s)
            | Constraint::ContainsI(s)
            | Constraint::DoesNotContainI(s)
            | Constraint::StartsWith(s)
            | Constraint::EndsWith(s) => wrap(Value::String(s.clone())),
            Constraint::GreaterThan(n) | Constraint::LessThan(n) => wrap(Value::from(*n)),
            Constraint::Numericality(bounds) => {
                serde_json::to_value(bounds).unwrap_or(Value::Null)
            }
            Constraint::Range(bounds) => wrap(Value::Array(vec![
                to_json(&bounds.min),
                to_json(&bounds.max),
            ])),
            Constraint::NotNull => Value::Bool(true),
        };

        let mut map = Map::new();
        map.insert(name, body);
        map
    }
}

fn default_weight() -> f64 {
    1.0
}

/// A weighted constraint on one attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchingRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Attribute keyword (or `xGGGGEEEE` tag) the constraint applies to
    pub attribute: String,

    pub constraint: Constraint,

    /// Score contribution when the rule passes
    #[serde(default = "default_weight")]
    pub weight: f64,

    /// A failing required rule disqualifies the candidate
    #[serde(default)]
    pub required: bool,
}

impl MatchingRule {
    pub fn new(attribute: impl Into<String>, constraint: Constraint) -> Self {
        Self {
            id: None,
            attribute: attribute.into(),
            constraint,
            weight: default_weight(),
            required: false,
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    #[must_use]
    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    #[must_use]
    pub fn is_abstract_prior(&self) -> bool {
        self.attribute == ABSTRACT_PRIOR_VALUE
    }

    /// True for rules that need a prior study to be available
    #[must_use]
    pub fn references_prior(&self) -> bool {
        self.is_abstract_prior() || self.attribute == RELATIVE_TIME
    }
}
