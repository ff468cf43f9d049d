use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::core::rule::MatchingRule;
use crate::core::types::ProtocolId;

/// Layout type and its template-specific properties (e.g. `Rows`/`Columns`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewportStructure {
    #[serde(rename = "type", alias = "layoutType", default, skip_serializing_if = "Option::is_none")]
    pub layout_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<BTreeMap<String, Value>>,
}

impl ViewportStructure {
    pub fn grid(rows: u32, columns: u32) -> Self {
        let mut properties = BTreeMap::new();
        properties.insert("Rows".to_string(), Value::from(rows));
        properties.insert("Columns".to_string(), Value::from(columns));
        Self {
            layout_type: Some("grid".to_string()),
            properties: Some(properties),
        }
    }

    /// Name of the layout template rendering this structure
    #[must_use]
    pub fn layout_template_name(&self) -> Option<&'static str> {
        match self.layout_type.as_deref() {
            Some("grid") => Some("gridLayout"),
            _ => None,
        }
    }

    fn property_u32(&self, keys: &[&str]) -> Option<u32> {
        let properties = self.properties.as_ref()?;
        keys.iter()
            .find_map(|key| properties.get(*key))
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
    }

    #[must_use]
    pub fn rows(&self) -> Option<u32> {
        self.property_u32(&["Rows", "rows"])
    }

    #[must_use]
    pub fn columns(&self) -> Option<u32> {
        self.property_u32(&["Columns", "columns"])
    }

    /// Number of viewports the layout provides
    #[must_use]
    pub fn num_viewports(&self) -> Option<u32> {
        match self.layout_type.as_deref() {
            Some("grid") => Some(self.rows()? * self.columns()?),
            _ => None,
        }
    }
}

/// One viewport slot of a stage and the rules choosing its image
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewportDefinition {
    #[serde(default)]
    pub viewport_settings: BTreeMap<String, Value>,

    #[serde(default)]
    pub image_matching_rules: Vec<MatchingRule>,

    #[serde(default)]
    pub series_matching_rules: Vec<MatchingRule>,

    #[serde(default)]
    pub study_matching_rules: Vec<MatchingRule>,
}

impl ViewportDefinition {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_study_rule(mut self, rule: MatchingRule) -> Self {
        self.study_matching_rules.push(rule);
        self
    }

    #[must_use]
    pub fn with_series_rule(mut self, rule: MatchingRule) -> Self {
        self.series_matching_rules.push(rule);
        self
    }

    #[must_use]
    pub fn with_image_rule(mut self, rule: MatchingRule) -> Self {
        self.image_matching_rules.push(rule);
        self
    }

    #[must_use]
    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.viewport_settings.insert(key.into(), value.into());
        self
    }
}

/// One step of a protocol's display sequence
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub viewport_structure: Option<ViewportStructure>,

    #[serde(default)]
    pub viewports: Vec<ViewportDefinition>,
}

impl Stage {
    pub fn new(name: impl Into<String>, viewport_structure: ViewportStructure) -> Self {
        Self {
            id: None,
            name: Some(name.into()),
            viewport_structure: Some(viewport_structure),
            viewports: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_viewports(mut self, viewports: Vec<ViewportDefinition>) -> Self {
        self.viewports = viewports;
        self
    }
}

/// A hanging protocol: rules deciding when it applies plus its stages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Protocol {
    pub id: ProtocolId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Locked protocols are shipped defaults and not meant to be edited
    #[serde(default)]
    pub locked: bool,

    #[serde(default)]
    pub protocol_matching_rules: Vec<MatchingRule>,

    #[serde(default)]
    pub stages: Vec<Stage>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_date: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified_date: Option<DateTime<Utc>>,
}

impl Protocol {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: ProtocolId::new(id),
            name: Some(name.into()),
            locked: false,
            protocol_matching_rules: Vec::new(),
            stages: Vec::new(),
            created_date: None,
            modified_date: None,
        }
    }

    #[must_use]
    pub fn with_rule(mut self, rule: MatchingRule) -> Self {
        self.protocol_matching_rules.push(rule);
        self
    }

    #[must_use]
    pub fn with_stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    /// Display name, falling back to the id
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(self.id.as_str())
    }

    /// Number of prior studies the protocol's viewports refer to.
    ///
    /// Every `abstractPriorValue` or `relativeTime` study rule counts once,
    /// except `abstractPriorValue` rules naming the current study (0).
    #[must_use]
    pub fn number_of_priors_referenced(&self) -> usize {
        self.stages
            .iter()
            .flat_map(|stage| &stage.viewports)
            .flat_map(|viewport| &viewport.study_matching_rules)
            .filter(|rule| rule.references_prior())
            .filter(|rule| !(rule.is_abstract_prior() && rule.constraint.operand_integer() == Some(0)))
            .count()
    }

    /// Mark the protocol as modified now
    pub fn touch(&mut self) {
        self.modified_date = Some(Utc::now());
    }
}
