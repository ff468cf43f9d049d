use std::borrow::Cow;

use dicom_core::dictionary::DataDictionary;
use dicom_core::Tag;
use dicom_dictionary_std::StandardDataDictionary;
use serde::{Deserialize, Serialize};

/// A single attribute value of a study, series or instance.
///
/// Values are kept in the loosely-typed shape they arrive in (DICOM JSON-like
/// metadata); constraints decide how to interpret them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Number(f64),
    Text(String),
    Sequence(Vec<AttributeValue>),
}

impl AttributeValue {
    /// Canonical string form used by string constraints.
    ///
    /// Integral numbers are printed without a fractional part so that
    /// `1` and `"1"` compare equal; sequences are joined with `,`.
    #[must_use]
    pub fn to_match_string(&self) -> String {
        match self {
            Self::Null => String::new(),
            Self::Bool(b) => b.to_string(),
            Self::Number(n) => format_number(*n),
            Self::Text(s) => s.clone(),
            Self::Sequence(values) => values
                .iter()
                .map(Self::to_match_string)
                .collect::<Vec<_>>()
                .join(","),
        }
    }

    /// Numeric interpretation, if the value is (or holds exactly one) number
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) if n.is_finite() => Some(*n),
            Self::Text(s) => s.trim().parse::<f64>().ok().filter(|n| n.is_finite()),
            Self::Sequence(values) if values.len() == 1 => values[0].as_f64(),
            _ => None,
        }
    }

    /// Integer interpretation with leading-integer semantics (`"12abc"` -> 12,
    /// `3.7` -> 3). Used for sorting on series and instance numbers.
    #[must_use]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            #[allow(clippy::cast_possible_truncation)] // Instance/series numbers fit in i64
            Self::Number(n) if n.is_finite() => Some(n.trunc() as i64),
            Self::Text(s) => parse_leading_integer(s),
            Self::Sequence(values) if values.len() == 1 => values[0].as_integer(),
            _ => None,
        }
    }

    /// Text interpretation without conversion
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Sequence(values) if values.len() == 1 => values[0].as_str(),
            _ => None,
        }
    }

    /// True for `Null`, empty strings and empty sequences
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(s) => s.trim().is_empty(),
            Self::Sequence(values) => values.is_empty(),
            Self::Bool(_) | Self::Number(_) => false,
        }
    }
}

impl std::fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_match_string())
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<f64> for AttributeValue {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<i64> for AttributeValue {
    fn from(n: i64) -> Self {
        #[allow(clippy::cast_precision_loss)]
        Self::Number(n as f64)
    }
}

impl From<i32> for AttributeValue {
    fn from(n: i32) -> Self {
        Self::Number(f64::from(n))
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl<T: Into<AttributeValue>> From<Vec<T>> for AttributeValue {
    fn from(values: Vec<T>) -> Self {
        Self::Sequence(values.into_iter().map(Into::into).collect())
    }
}

fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        #[allow(clippy::cast_possible_truncation)]
        let integral = n as i64;
        integral.to_string()
    } else {
        n.to_string()
    }
}

fn parse_leading_integer(s: &str) -> Option<i64> {
    let trimmed = s.trim_start();
    let end = trimmed
        .char_indices()
        .take_while(|(i, c)| c.is_ascii_digit() || (*i == 0 && (*c == '-' || *c == '+')))
        .map(|(i, c)| i + c.len_utf8())
        .last()?;
    trimmed[..end].parse().ok()
}

/// Resolve an attribute name used in a matching rule to the keyword under
/// which metadata stores it.
///
/// Stored protocols frequently name attributes by tag (`x0008103e`); these
/// are translated through the standard DICOM dictionary. Keywords and
/// unknown tags are returned unchanged.
#[must_use]
pub fn normalize_attribute_name(name: &str) -> Cow<'_, str> {
    let hex = name
        .strip_prefix('x')
        .or_else(|| name.strip_prefix('X'))
        .unwrap_or(name);

    if hex.len() != 8 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Cow::Borrowed(name);
    }

    let (Ok(group), Ok(element)) = (
        u16::from_str_radix(&hex[0..4], 16),
        u16::from_str_radix(&hex[4..8], 16),
    ) else {
        return Cow::Borrowed(name);
    };

    match StandardDataDictionary.by_tag(Tag(group, element)) {
        Some(entry) => Cow::Owned(entry.alias.to_string()),
        None => Cow::Borrowed(name),
    }
}
