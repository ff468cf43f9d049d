use chrono::NaiveDateTime;
use serde::Serialize;
use std::cmp::Ordering;

use crate::core::attribute::AttributeValue;
use crate::core::metadata::{Instance, Series, Study};
use crate::utils::dicom_time::parse_study_date_time;

/// Keys used to rank image candidates
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SortingInfo {
    pub score: f64,
    pub study_date_time: Option<NaiveDateTime>,
    pub series_number: Option<i64>,
    pub instance_number: Option<i64>,
}

impl SortingInfo {
    /// Collect the ranking keys of an instance in its series and study
    #[must_use]
    pub fn for_instance(score: f64, study: &Study, series: &Series, instance: &Instance) -> Self {
        let text = |value: Option<&AttributeValue>| value.map(AttributeValue::to_match_string);

        let study_date = text(lookup(instance, "StudyDate", study.first_instance()));
        let study_time = text(lookup(instance, "StudyTime", study.first_instance()));

        Self {
            score,
            study_date_time: parse_study_date_time(study_date.as_deref(), study_time.as_deref()),
            series_number: lookup(instance, "SeriesNumber", series.first_instance())
                .and_then(AttributeValue::as_integer),
            instance_number: instance.tag_value("InstanceNumber").and_then(AttributeValue::as_integer),
        }
    }
}

/// Study and series keys are often only present on the representatives
fn lookup<'a>(instance: &'a Instance, name: &str, fallback: Option<&'a Instance>) -> Option<&'a AttributeValue> {
    instance
        .tag_value(name)
        .or_else(|| fallback.and_then(|i| i.tag_value(name)))
}

/// Higher score first; NaN compares equal
#[must_use]
pub fn compare_score_desc(a: f64, b: f64) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

/// Compare present values with `cmp`; missing values sort after present ones
fn compare_present<T: Ord>(a: Option<&T>, b: Option<&T>, cmp: impl FnOnce(&T, &T) -> Ordering) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => cmp(a, b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Candidate ranking: score descending, then study date+time descending,
/// then instance number ascending, then series number ascending
#[must_use]
pub fn compare_sorting_info(a: &SortingInfo, b: &SortingInfo) -> Ordering {
    compare_score_desc(a.score, b.score)
        .then_with(|| {
            compare_present(a.study_date_time.as_ref(), b.study_date_time.as_ref(), |x, y| y.cmp(x))
        })
        .then_with(|| compare_present(a.instance_number.as_ref(), b.instance_number.as_ref(), Ord::cmp))
        .then_with(|| compare_present(a.series_number.as_ref(), b.series_number.as_ref(), Ord::cmp))
}
