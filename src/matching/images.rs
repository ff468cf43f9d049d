//! Image matching for a single viewport slot.
//!
//! Descends study → series → instance, scoring each level with the slot's
//! rule sets. A study or series that scores below the best one seen so far is
//! not descended into; the series maximum is shared across studies. Matching
//! only looks at studies that are already loaded: prior studies the slot asks
//! for are reported by [`prior_requests`] and loaded by the engine.

use serde::Serialize;
use tracing::trace;

use crate::core::attribute::AttributeValue;
use crate::core::metadata::{default_image_id, StudySummary, Study};
use crate::core::sop_class;
use crate::core::protocol::ViewportDefinition;
use crate::matching::matcher::{HpMatcher, RuleDetails};
use crate::matching::sorting::{compare_sorting_info, SortingInfo};

/// One (study, series, instance) triple that passed every required rule
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageMatchCandidate {
    #[serde(rename = "StudyInstanceUID")]
    pub study_instance_uid: String,

    #[serde(rename = "SeriesInstanceUID")]
    pub series_instance_uid: String,

    #[serde(rename = "SOPInstanceUID")]
    pub sop_instance_uid: Option<String>,

    /// Position of the instance within its series
    pub current_image_id_index: usize,

    pub matching_score: f64,

    /// Passed and failed rules of the instance, series and study levels
    pub match_details: RuleDetails,

    pub sorting_info: SortingInfo,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_set_instance_uid: Option<String>,

    /// Only set when the instance belongs to a known display set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
}

/// Ranked candidates for one viewport slot
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageMatchResult {
    pub best_match: Option<ImageMatchCandidate>,
    pub matching_scores: Vec<ImageMatchCandidate>,
}

/// A prior study a viewport slot refers to through `abstractPriorValue`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorRequest {
    pub summary: StudySummary,
    /// Value the study is tagged with once loaded
    pub prior_value: i64,
}

/// Resolve the `abstractPriorValue` study rules of a slot against the
/// current study's priors (most recent first).
///
/// `-1` asks for the oldest prior; `N` for the Nth most recent. `0` is the
/// current study itself and never needs loading.
#[must_use]
pub fn prior_requests(viewport: &ViewportDefinition, priors: &[StudySummary]) -> Vec<PriorRequest> {
    let mut requests: Vec<PriorRequest> = Vec::new();

    for rule in viewport.study_matching_rules.iter().filter(|r| r.is_abstract_prior()) {
        let Some(prior_value) = rule.constraint.operand_integer() else {
            trace!("abstractPriorValue rule without an integer operand");
            continue;
        };
        if prior_value == 0 {
            continue;
        }

        let summary = if prior_value == -1 {
            priors.last()
        } else {
            let index = usize::try_from(prior_value.saturating_sub(1).max(0)).unwrap_or(usize::MAX);
            priors.get(index)
        };

        let Some(summary) = summary else {
            trace!(prior_value, available = priors.len(), "Requested prior is not available");
            continue;
        };

        if requests.iter().all(|r| r.summary.study_instance_uid != summary.study_instance_uid) {
            requests.push(PriorRequest {
                summary: summary.clone(),
                prior_value,
            });
        }
    }

    requests
}

/// Score every image of the loaded studies against a slot's rule sets
#[must_use]
pub fn match_images(studies: &[Study], matcher: &HpMatcher, viewport: &ViewportDefinition) -> ImageMatchResult {
    let mut candidates = Vec::new();
    let mut highest_study_score = 0.0;
    let mut highest_series_score = 0.0;

    for study in studies {
        let study_details = matcher.match_rules(study, &viewport.study_matching_rules);
        if study_details.required_failed || study_details.score < highest_study_score {
            continue;
        }
        highest_study_score = study_details.score;

        for series in &study.series {
            let series_details = matcher.match_rules(series, &viewport.series_matching_rules);
            if series_details.required_failed || series_details.score < highest_series_score {
                continue;
            }
            highest_series_score = series_details.score;

            for (index, instance) in series.instances.iter().enumerate() {
                if !instance.is_image() {
                    trace!(
                        sop_class = instance
                            .tag_value("SOPClassUID")
                            .and_then(AttributeValue::as_str)
                            .and_then(sop_class::name),
                        "Skipping instance without pixel data"
                    );
                    continue;
                }

                let instance_details = matcher.match_rules(instance, &viewport.image_matching_rules);
                if instance_details.required_failed {
                    continue;
                }

                let mut match_details = instance_details.details.clone();
                match_details.extend(&series_details.details);
                match_details.extend(&study_details.details);

                let total = instance_details.score + series_details.score + study_details.score;
                let sop_instance_uid = instance.sop_instance_uid().map(str::to_string);

                let display_set_instance_uid =
                    study.display_set_uid_for(series, sop_instance_uid.as_deref().unwrap_or_default());
                let image_id = display_set_instance_uid.as_ref().map(|_| {
                    instance.image_id.clone().unwrap_or_else(|| {
                        default_image_id(
                            &study.study_instance_uid,
                            &series.series_instance_uid,
                            sop_instance_uid.as_deref().unwrap_or_default(),
                        )
                    })
                });

                candidates.push(ImageMatchCandidate {
                    study_instance_uid: study.study_instance_uid.clone(),
                    series_instance_uid: series.series_instance_uid.clone(),
                    sop_instance_uid,
                    current_image_id_index: index,
                    matching_score: total,
                    match_details,
                    sorting_info: SortingInfo::for_instance(total, study, series, instance),
                    display_set_instance_uid,
                    image_id,
                });
            }
        }
    }

    candidates.sort_by(|a, b| compare_sorting_info(&a.sorting_info, &b.sorting_info));

    ImageMatchResult {
        best_match: candidates.first().cloned(),
        matching_scores: candidates,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::attribute::AttributeValue;
    use crate::core::metadata::{Instance, Series};
    use crate::core::rule::{Constraint, MatchingRule};
    use dicom_dictionary_std::uids;

    fn image(sop: &str, number: i64) -> Instance {
        Instance::new()
            .with_attribute("SOPInstanceUID", sop)
            .with_attribute("SOPClassUID", uids::CT_IMAGE_STORAGE)
            .with_attribute("Modality", "CT")
            .with_attribute("InstanceNumber", number)
    }

    fn study(uid: &str, date: &str, series: Vec<Series>) -> Study {
        let mut study = Study::new(uid).with_series(series);
        for series in &mut study.series {
            for instance in &mut series.instances {
                instance.attributes.insert("StudyDate".to_string(), AttributeValue::from(date));
            }
        }
        study
    }

    fn equals(attr: &str, value: &str) -> MatchingRule {
        MatchingRule::new(attr, Constraint::Equals(AttributeValue::from(value)))
    }

    #[test]
    fn test_lowest_instance_number_wins_ties() {
        let series = Series::new("S1").with_instances(vec![image("I2", 2), image("I1", 1)]);
        let studies = vec![study("ST", "20200101", vec![series])];

        let result = match_images(&studies, &HpMatcher::new(), &ViewportDefinition::new());
        let best = result.best_match.unwrap();

        assert_eq!(best.sop_instance_uid.as_deref(), Some("I1"));
        assert_eq!(best.current_image_id_index, 1);
        assert_eq!(result.matching_scores.len(), 2);
    }

    #[test]
    fn test_recent_study_wins_ties() {
        let old = study("OLD", "20190101", vec![Series::new("S1").with_instances(vec![image("A", 1)])]);
        let new = study("NEW", "20210101", vec![Series::new("S2").with_instances(vec![image("B", 1)])]);

        let result = match_images(&[old, new], &HpMatcher::new(), &ViewportDefinition::new());
        assert_eq!(result.best_match.unwrap().study_instance_uid, "NEW");
    }

    #[test]
    fn test_required_rule_excludes_instances() {
        let series = Series::new("S1").with_instances(vec![
            image("I1", 1).with_attribute("ImageType", "LOCALIZER"),
            image("I2", 2).with_attribute("ImageType", "AXIAL"),
        ]);
        let viewport = ViewportDefinition::new()
            .with_image_rule(equals("ImageType", "AXIAL").required(true));

        let result = match_images(&[study("ST", "20200101", vec![series])], &HpMatcher::new(), &viewport);
        assert_eq!(result.matching_scores.len(), 1);
        assert_eq!(result.best_match.unwrap().sop_instance_uid.as_deref(), Some("I2"));
    }

    #[test]
    fn test_non_images_are_skipped() {
        let report = Instance::new()
            .with_attribute("SOPInstanceUID", "SR")
            .with_attribute("SOPClassUID", "1.2.840.10008.5.1.4.1.1.88.22");
        let series = Series::new("S1").with_instances(vec![report]);

        let result = match_images(&[study("ST", "20200101", vec![series])], &HpMatcher::new(), &ViewportDefinition::new());
        assert!(result.best_match.is_none());
        assert!(result.matching_scores.is_empty());
    }

    #[test]
    fn test_total_score_and_details() {
        let series = Series::new("S1").with_instances(vec![image("I1", 1).with_attribute("SeriesDescription", "AX")]);
        let viewport = ViewportDefinition::new()
            .with_study_rule(equals("Modality", "CT").with_weight(3.0))
            .with_series_rule(equals("SeriesDescription", "AX").with_weight(2.0))
            .with_image_rule(equals("InstanceNumber", "1"))
            .with_image_rule(equals("Modality", "MR"));

        let result = match_images(&[study("ST", "20200101", vec![series])], &HpMatcher::new(), &viewport);
        let best = result.best_match.unwrap();

        assert!((best.matching_score - 6.0).abs() < f64::EPSILON);
        assert_eq!(best.match_details.passed.len(), 3);
        assert_eq!(best.match_details.failed.len(), 1);
        assert_eq!(best.display_set_instance_uid.as_deref(), Some("S1"));
        assert_eq!(
            best.image_id.as_deref(),
            Some("wadors:/studies/ST/series/S1/instances/I1/frames/1")
        );
    }

    #[test]
    fn test_lower_scoring_later_series_is_pruned() {
        let series = vec![
            Series::new("S1").with_instances(vec![image("A", 1).with_attribute("SeriesDescription", "AX")]),
            Series::new("S2").with_instances(vec![image("B", 1).with_attribute("SeriesDescription", "COR")]),
        ];
        let viewport = ViewportDefinition::new().with_series_rule(equals("SeriesDescription", "AX"));

        let result = match_images(&[study("ST", "20200101", series)], &HpMatcher::new(), &viewport);
        assert_eq!(result.matching_scores.len(), 1);
        assert_eq!(result.matching_scores[0].series_instance_uid, "S1");
    }

    #[test]
    fn test_prior_requests() {
        let priors = vec![
            StudySummary::new("P1"),
            StudySummary::new("P2"),
            StudySummary::new("P3"),
        ];
        let rule = |v: i64| MatchingRule::new("abstractPriorValue", Constraint::Equals(AttributeValue::from(v)));

        let first = ViewportDefinition::new().with_study_rule(rule(1));
        let requests = prior_requests(&first, &priors);
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].summary.study_instance_uid, "P1");
        assert_eq!(requests[0].prior_value, 1);

        let oldest = ViewportDefinition::new().with_study_rule(rule(-1));
        assert_eq!(prior_requests(&oldest, &priors)[0].summary.study_instance_uid, "P3");

        let current = ViewportDefinition::new().with_study_rule(rule(0));
        assert!(prior_requests(&current, &priors).is_empty());

        let missing = ViewportDefinition::new().with_study_rule(rule(7));
        assert!(prior_requests(&missing, &priors).is_empty());
    }
}
