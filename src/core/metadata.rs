use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::attribute::AttributeValue;
use crate::core::sop_class;
use crate::core::types::ABSTRACT_PRIOR_VALUE;

/// Anything rules can be evaluated against.
///
/// Custom attributes are engine-assigned values (such as the resolved prior
/// index) that take precedence over the entity's own metadata.
pub trait AttributeSource {
    /// Raw metadata value for an attribute keyword
    fn attribute(&self, name: &str) -> Option<&AttributeValue>;

    /// Engine-assigned value for an attribute, if any
    fn custom_attribute(&self, name: &str) -> Option<&AttributeValue>;
}

/// A single DICOM instance (SOP instance)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Instance {
    /// Image id used by the renderer; derived from the UIDs when absent
    #[serde(rename = "imageId", default, skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,

    /// Metadata keyed by DICOM keyword
    #[serde(flatten)]
    pub attributes: BTreeMap<String, AttributeValue>,

    #[serde(skip)]
    custom_attributes: BTreeMap<String, AttributeValue>,
}

impl Instance {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_image_id(mut self, image_id: impl Into<String>) -> Self {
        self.image_id = Some(image_id.into());
        self
    }

    #[must_use]
    pub fn tag_value(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    #[must_use]
    pub fn sop_instance_uid(&self) -> Option<&str> {
        self.tag_value("SOPInstanceUID").and_then(AttributeValue::as_str)
    }

    /// True when the instance carries pixel data we can hang: either a known
    /// image SOP class or an explicit `Rows` value.
    #[must_use]
    pub fn is_image(&self) -> bool {
        let image_class = self
            .tag_value("SOPClassUID")
            .and_then(AttributeValue::as_str)
            .is_some_and(sop_class::is_image);

        let has_rows = self
            .tag_value("Rows")
            .is_some_and(|rows| !rows.is_empty() && rows.as_f64() != Some(0.0));

        image_class || has_rows
    }

    pub fn set_custom_attribute(&mut self, name: impl Into<String>, value: impl Into<AttributeValue>) {
        self.custom_attributes.insert(name.into(), value.into());
    }
}

impl AttributeSource for Instance {
    fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    fn custom_attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.custom_attributes.get(name)
    }
}

/// An ordered collection of instances
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Series {
    #[serde(rename = "SeriesInstanceUID")]
    pub series_instance_uid: String,

    #[serde(default)]
    pub instances: Vec<Instance>,
}

impl Series {
    pub fn new(series_instance_uid: impl Into<String>) -> Self {
        Self {
            series_instance_uid: series_instance_uid.into(),
            instances: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_instances(mut self, instances: Vec<Instance>) -> Self {
        self.instances = instances;
        self
    }

    /// Representative instance for series-level matching
    #[must_use]
    pub fn first_instance(&self) -> Option<&Instance> {
        self.instances.first()
    }
}

impl AttributeSource for Series {
    fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.first_instance().and_then(|i| i.attribute(name))
    }

    fn custom_attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.first_instance().and_then(|i| i.custom_attribute(name))
    }
}

/// A renderable grouping of instances produced by the host application
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplaySet {
    pub display_set_instance_uid: String,

    #[serde(rename = "SOPInstanceUIDs", default)]
    pub sop_instance_uids: Vec<String>,
}

/// A study: the unit protocols are matched against
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Study {
    #[serde(rename = "StudyInstanceUID")]
    pub study_instance_uid: String,

    #[serde(default)]
    pub series: Vec<Series>,

    /// Display sets known for this study. When empty, every series is its
    /// own display set, identified by its `SeriesInstanceUID`.
    #[serde(rename = "displaySets", default, skip_serializing_if = "Vec::is_empty")]
    pub display_sets: Vec<DisplaySet>,

    #[serde(skip)]
    custom_attributes: BTreeMap<String, AttributeValue>,
}

impl Study {
    pub fn new(study_instance_uid: impl Into<String>) -> Self {
        Self {
            study_instance_uid: study_instance_uid.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_series(mut self, series: Vec<Series>) -> Self {
        self.series = series;
        self
    }

    #[must_use]
    pub fn with_display_sets(mut self, display_sets: Vec<DisplaySet>) -> Self {
        self.display_sets = display_sets;
        self
    }

    /// Identity of the study within one viewer session
    #[must_use]
    pub fn object_id(&self) -> &str {
        &self.study_instance_uid
    }

    /// Representative instance for study-level matching
    #[must_use]
    pub fn first_instance(&self) -> Option<&Instance> {
        self.series.iter().find_map(Series::first_instance)
    }

    fn first_instance_mut(&mut self) -> Option<&mut Instance> {
        self.series.iter_mut().find_map(|s| s.instances.first_mut())
    }

    pub fn set_custom_attribute(&mut self, name: impl Into<String>, value: impl Into<AttributeValue>) {
        self.custom_attributes.insert(name.into(), value.into());
    }

    /// Tag the study and its first instance with its position among priors
    /// (0 = current study, -1 = oldest prior, N = Nth prior).
    pub fn set_abstract_prior_value(&mut self, value: i64) {
        self.set_custom_attribute(ABSTRACT_PRIOR_VALUE, value);
        if let Some(instance) = self.first_instance_mut() {
            instance.set_custom_attribute(ABSTRACT_PRIOR_VALUE, value);
        }
    }

    #[must_use]
    pub fn abstract_prior_value(&self) -> Option<i64> {
        self.custom_attributes
            .get(ABSTRACT_PRIOR_VALUE)
            .and_then(AttributeValue::as_integer)
    }

    /// Find the display set holding the given instance of the given series
    #[must_use]
    pub fn display_set_uid_for(&self, series: &Series, sop_instance_uid: &str) -> Option<String> {
        if self.display_sets.is_empty() {
            return (!series.series_instance_uid.is_empty())
                .then(|| series.series_instance_uid.clone());
        }

        self.display_sets
            .iter()
            .find(|ds| ds.sop_instance_uids.iter().any(|uid| uid == sop_instance_uid))
            .map(|ds| ds.display_set_instance_uid.clone())
    }

    /// Total number of instances across all series
    #[must_use]
    pub fn num_instances(&self) -> usize {
        self.series.iter().map(|s| s.instances.len()).sum()
    }
}

impl AttributeSource for Study {
    fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.first_instance().and_then(|i| i.attribute(name))
    }

    fn custom_attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.custom_attributes
            .get(name)
            .or_else(|| self.first_instance().and_then(|i| i.custom_attribute(name)))
    }
}

/// Descriptor of a prior study that may not be loaded yet
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudySummary {
    #[serde(rename = "StudyInstanceUID")]
    pub study_instance_uid: String,

    #[serde(rename = "StudyDate", default, skip_serializing_if = "Option::is_none")]
    pub study_date: Option<String>,

    #[serde(rename = "StudyTime", default, skip_serializing_if = "Option::is_none")]
    pub study_time: Option<String>,

    #[serde(rename = "StudyDescription", default, skip_serializing_if = "Option::is_none")]
    pub study_description: Option<String>,
}

impl StudySummary {
    pub fn new(study_instance_uid: impl Into<String>) -> Self {
        Self {
            study_instance_uid: study_instance_uid.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn object_id(&self) -> &str {
        &self.study_instance_uid
    }
}

/// Image id in the form used by DICOMweb-backed viewers
#[must_use]
pub fn default_image_id(study_uid: &str, series_uid: &str, sop_uid: &str) -> String {
    format!("wadors:/studies/{study_uid}/series/{series_uid}/instances/{sop_uid}/frames/1")
}

#[cfg(test)]
mod tests {
    use super::*;
    use dicom_dictionary_std::uids;

    fn ct_instance(sop: &str) -> Instance {
        Instance::new()
            .with_attribute("SOPInstanceUID", sop)
            .with_attribute("SOPClassUID", uids::CT_IMAGE_STORAGE)
            .with_attribute("Modality", "CT")
    }

    #[test]
    fn test_first_instance_skips_empty_series() {
        let study = Study::new("1.2.3").with_series(vec![
            Series::new("1.2.3.1"),
            Series::new("1.2.3.2").with_instances(vec![ct_instance("1.2.3.2.1")]),
        ]);

        let first = study.first_instance().unwrap();
        assert_eq!(first.sop_instance_uid(), Some("1.2.3.2.1"));
        assert_eq!(study.num_instances(), 1);
    }

    #[test]
    fn test_is_image() {
        assert!(ct_instance("1").is_image());

        let sr = Instance::new().with_attribute("SOPClassUID", "1.2.840.10008.5.1.4.1.1.88.22");
        assert!(!sr.is_image());

        let unknown_with_rows = Instance::new().with_attribute("Rows", 512);
        assert!(unknown_with_rows.is_image());

        let zero_rows = Instance::new().with_attribute("Rows", 0);
        assert!(!zero_rows.is_image());
    }

    #[test]
    fn test_abstract_prior_value_tags_study_and_first_instance() {
        let mut study = Study::new("1.2.3")
            .with_series(vec![Series::new("1.2.3.1").with_instances(vec![ct_instance("a")])]);

        study.set_abstract_prior_value(2);

        assert_eq!(study.abstract_prior_value(), Some(2));
        let tagged = study.first_instance().unwrap().custom_attribute(ABSTRACT_PRIOR_VALUE);
        assert_eq!(tagged, Some(&AttributeValue::from(2)));
    }

    #[test]
    fn test_display_set_lookup() {
        let series = Series::new("S1").with_instances(vec![ct_instance("I1")]);
        let study = Study::new("ST").with_series(vec![series.clone()]);
        assert_eq!(study.display_set_uid_for(&series, "I1").as_deref(), Some("S1"));

        let study = study.with_display_sets(vec![DisplaySet {
            display_set_instance_uid: "DS-1".to_string(),
            sop_instance_uids: vec!["I1".to_string()],
        }]);
        assert_eq!(study.display_set_uid_for(&series, "I1").as_deref(), Some("DS-1"));
        assert_eq!(study.display_set_uid_for(&series, "I2"), None);
    }

    #[test]
    fn test_study_json_shape() {
        let json = r#"{
            "StudyInstanceUID": "1.2.3",
            "series": [{
                "SeriesInstanceUID": "1.2.3.1",
                "instances": [{"SOPInstanceUID": "1.2.3.1.1", "Modality": "MR", "InstanceNumber": 1}]
            }]
        }"#;
        let study: Study = serde_json::from_str(json).unwrap();
        let instance = study.first_instance().unwrap();
        assert_eq!(instance.tag_value("Modality"), Some(&AttributeValue::from("MR")));
        assert_eq!(instance.image_id, None);
    }
}
