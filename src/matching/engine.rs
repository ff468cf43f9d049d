use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use thiserror::Error;
use tracing::{debug, error, trace, warn};

use crate::catalog::store::ProtocolStore;
use crate::core::metadata::{Study, StudySummary};
use crate::core::protocol::{Protocol, Stage, ViewportDefinition};
use crate::core::types::{ProtocolId, StageAction, DEFAULT_PROTOCOL_ID};
use crate::matching::images::{match_images, prior_requests, ImageMatchCandidate, ImageMatchResult};
use crate::matching::matcher::HpMatcher;
use crate::matching::priors::{PendingPrior, StageContext, StudyMetadataSource};
use crate::matching::sorting::compare_score_desc;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Protocol store has no '{0}' protocol")]
    MissingDefaultProtocol(String),

    #[error("At least one study is required")]
    NoStudies,
}

/// Default custom viewport settings forwarded to the host
pub const DEFAULT_CUSTOM_VIEWPORT_SETTINGS: &[&str] = &["wlPreset"];

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Protocol used when nothing scores above zero
    pub default_protocol_id: String,

    /// Viewport settings the host applies itself after rendering
    pub custom_viewport_settings: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_protocol_id: DEFAULT_PROTOCOL_ID.to_string(),
            custom_viewport_settings: DEFAULT_CUSTOM_VIEWPORT_SETTINGS
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
        }
    }
}

pub type SetLayoutFn = Box<dyn FnMut(&Layout) + Send>;
pub type SetViewportDataFn = Box<dyn FnMut(usize, &ViewportData) + Send>;

/// Host callbacks and configuration
#[derive(Default)]
pub struct EngineOptions {
    pub set_layout: Option<SetLayoutFn>,
    pub set_viewport_specific_data: Option<SetViewportDataFn>,
    pub config: EngineConfig,
}

impl std::fmt::Debug for EngineOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineOptions")
            .field("set_layout", &self.set_layout.is_some())
            .field("set_viewport_specific_data", &self.set_viewport_specific_data.is_some())
            .field("config", &self.config)
            .finish()
    }
}

impl EngineOptions {
    #[must_use]
    pub fn with_set_layout(mut self, callback: impl FnMut(&Layout) + Send + 'static) -> Self {
        self.set_layout = Some(Box::new(callback));
        self
    }

    #[must_use]
    pub fn with_set_viewport_specific_data(
        mut self,
        callback: impl FnMut(usize, &ViewportData) + Send + 'static,
    ) -> Self {
        self.set_viewport_specific_data = Some(Box::new(callback));
        self
    }

    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }
}

/// Score of one protocol
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProtocolMatch {
    pub protocol_id: ProtocolId,
    pub score: f64,
}

/// Protocol scores of one matching pass, in insertion order
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProtocolMatches {
    entries: Vec<ProtocolMatch>,
}

impl ProtocolMatches {
    /// Record a score unless the protocol already has one
    pub fn insert_first(&mut self, entry: ProtocolMatch) -> bool {
        if self.score_of(&entry.protocol_id).is_some() {
            return false;
        }
        self.entries.push(entry);
        true
    }

    #[must_use]
    pub fn score_of(&self, id: &ProtocolId) -> Option<f64> {
        self.entries.iter().find(|m| &m.protocol_id == id).map(|m| m.score)
    }

    /// Highest score; the earliest entry wins ties
    #[must_use]
    pub fn best(&self) -> Option<&ProtocolMatch> {
        self.entries.iter().fold(None, |best: Option<&ProtocolMatch>, entry| match best {
            Some(current) if current.score >= entry.score => Some(current),
            _ => Some(entry),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProtocolMatch> {
        self.entries.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Grid shape reported to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Layout {
    pub num_rows: u32,
    pub num_columns: u32,
    pub num_viewports: u32,
}

/// A viewport setting the host applies after the image is rendered
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CustomSetting {
    pub id: String,
    pub value: Value,
}

/// The image hung into a viewport
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageAssignment {
    #[serde(rename = "StudyInstanceUID")]
    pub study_instance_uid: String,

    #[serde(rename = "SeriesInstanceUID")]
    pub series_instance_uid: String,

    #[serde(rename = "SOPInstanceUID")]
    pub sop_instance_uid: Option<String>,

    pub current_image_id_index: usize,
    pub display_set_instance_uid: Option<String>,
    pub image_id: String,
}

impl ImageAssignment {
    fn from_candidate(candidate: &ImageMatchCandidate, image_id: &str) -> Self {
        Self {
            study_instance_uid: candidate.study_instance_uid.clone(),
            series_instance_uid: candidate.series_instance_uid.clone(),
            sop_instance_uid: candidate.sop_instance_uid.clone(),
            current_image_id_index: candidate.current_image_id_index,
            display_set_instance_uid: candidate.display_set_instance_uid.clone(),
            image_id: image_id.to_string(),
        }
    }
}

/// Everything the host needs to render one viewport
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewportData {
    pub viewport_index: usize,

    /// Viewport settings with `"YES"`/`"NO"` turned into booleans
    pub viewport: BTreeMap<String, Value>,

    /// Layout properties of the stage (`Rows`, `Columns`, ...)
    #[serde(flatten)]
    pub layout_properties: BTreeMap<String, Value>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub custom_settings: Vec<CustomSetting>,

    #[serde(flatten)]
    pub assignment: Option<ImageAssignment>,
}

/// Result of one `update_viewports` pass
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewportUpdate {
    #[serde(skip)]
    pub context: StageContext,
    pub layout: Option<Layout>,
    pub viewports: Vec<ViewportData>,
    /// Ranked candidates per viewport
    pub match_details: Vec<ImageMatchResult>,
}

/// Chooses the hanging protocol for a set of studies and hangs images
/// into the viewports of its current stage.
///
/// Owns the session state: loaded studies, current protocol and stage.
/// Matching itself is synchronous; prior studies requested by the current
/// stage are queued and loaded by [`ProtocolEngine::resolve_priors`].
pub struct ProtocolEngine<S> {
    store: ProtocolStore,
    studies: Vec<Study>,
    prior_studies: HashMap<String, Vec<StudySummary>>,
    source: S,
    matcher: HpMatcher,
    options: EngineOptions,

    protocol: Protocol,
    stage: usize,
    generation: u64,
    pending_priors: Vec<PendingPrior>,
}

impl<S: StudyMetadataSource> ProtocolEngine<S> {
    /// Build an engine and hang the best matching protocol.
    ///
    /// `prior_studies` maps a study's `StudyInstanceUID` to its priors, most
    /// recent first.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::NoStudies` when `studies` is empty and
    /// `EngineError::MissingDefaultProtocol` when the store lacks the
    /// configured default protocol.
    pub fn new(
        mut store: ProtocolStore,
        studies: Vec<Study>,
        prior_studies: HashMap<String, Vec<StudySummary>>,
        source: S,
        options: EngineOptions,
    ) -> Result<Self, EngineError> {
        if studies.is_empty() {
            return Err(EngineError::NoStudies);
        }

        let default_id = ProtocolId::new(options.config.default_protocol_id.clone());
        store
            .set_default_protocol_id(default_id.clone())
            .map_err(|_| EngineError::MissingDefaultProtocol(default_id.to_string()))?;
        let protocol = store
            .default_protocol()
            .cloned()
            .ok_or_else(|| EngineError::MissingDefaultProtocol(default_id.to_string()))?;

        let mut engine = Self {
            store,
            studies,
            prior_studies,
            source,
            matcher: HpMatcher::new(),
            options,
            protocol,
            stage: 0,
            generation: 0,
            pending_priors: Vec::new(),
        };
        engine.reset();
        Ok(engine)
    }

    /// Pick the best protocol for the loaded studies and hang it
    pub fn reset(&mut self) {
        let best = self.get_best_protocol_match();
        let protocol = self
            .store
            .get(&best.protocol_id)
            .cloned()
            .unwrap_or_else(|| self.default_protocol().clone());
        self.set_hanging_protocol(protocol, true);
    }

    fn default_protocol_id(&self) -> ProtocolId {
        self.store.default_protocol_id().clone()
    }

    fn default_protocol(&self) -> &Protocol {
        // Presence is checked in `new`; fall back to the hung protocol otherwise
        self.store.default_protocol().unwrap_or(&self.protocol)
    }

    /// Score every protocol in the store against one study.
    ///
    /// Protocols needing more priors than the study has are skipped. When no
    /// protocol scores above zero the default protocol is returned with
    /// score 1. Results are sorted by descending score; equal scores keep
    /// catalog order.
    #[must_use]
    pub fn find_match_by_study(&self, study: &Study) -> Vec<ProtocolMatch> {
        trace!(study = study.object_id(), "ProtocolEngine::find_match_by_study");

        let available_priors = self.number_of_available_priors(study.object_id());
        let mut matched: Vec<ProtocolMatch> = Vec::new();

        for protocol in self.store.protocols() {
            let needed = protocol.number_of_priors_referenced();
            if needed > available_priors {
                trace!(
                    protocol = %protocol.id,
                    needed,
                    available_priors,
                    "Skipping protocol: not enough priors"
                );
                continue;
            }

            let details = self.matcher.match_rules(study, &protocol.protocol_matching_rules);
            if details.score > 0.0 {
                matched.push(ProtocolMatch {
                    protocol_id: protocol.id.clone(),
                    score: details.score,
                });
            }
        }

        if matched.is_empty() {
            return vec![ProtocolMatch {
                protocol_id: self.default_protocol_id(),
                score: 1.0,
            }];
        }

        matched.sort_by(|a, b| compare_score_desc(a.score, b.score));
        matched
    }

    /// Score all protocols against all loaded studies.
    ///
    /// A protocol keeps the score of the first study it matched.
    #[must_use]
    pub fn update_protocol_matches(&self) -> ProtocolMatches {
        let mut matches = ProtocolMatches::default();
        for study in &self.studies {
            for entry in self.find_match_by_study(study) {
                matches.insert_first(entry);
            }
        }
        matches
    }

    /// The highest scoring protocol; the default protocol if none scored
    #[must_use]
    pub fn get_best_protocol_match(&self) -> ProtocolMatch {
        let matches = self.update_protocol_matches();
        trace!(matched = matches.len(), "ProtocolEngine::get_best_protocol_match");

        matches.best().cloned().unwrap_or_else(|| ProtocolMatch {
            protocol_id: self.default_protocol_id(),
            score: 1.0,
        })
    }

    #[must_use]
    pub fn number_of_available_priors(&self, study_object_id: &str) -> usize {
        self.available_study_priors(study_object_id).len()
    }

    /// Priors of a study, most recent first
    #[must_use]
    pub fn available_study_priors(&self, study_object_id: &str) -> &[StudySummary] {
        self.prior_studies
            .get(study_object_id)
            .map_or(&[], Vec::as_slice)
    }

    /// Install a protocol and go to its first stage
    pub fn set_hanging_protocol(&mut self, protocol: Protocol, update_viewports: bool) {
        trace!(protocol = %protocol.id, update_viewports, "ProtocolEngine::set_hanging_protocol");

        self.protocol = protocol;
        self.stage = 0;
        self.generation += 1;

        if update_viewports {
            self.update_viewports(None);
        }
    }

    #[must_use]
    pub fn num_protocol_stages(&self) -> usize {
        self.protocol.stages.len()
    }

    #[must_use]
    pub fn current_stage_model(&self) -> Option<&Stage> {
        self.protocol.stages.get(self.stage)
    }

    #[must_use]
    pub fn is_next_stage_available(&self) -> bool {
        self.stage + 1 < self.num_protocol_stages()
    }

    #[must_use]
    pub fn is_previous_stage_available(&self) -> bool {
        self.stage > 0
    }

    /// Move one stage forward or back and re-hang the viewports.
    ///
    /// Returns false, leaving the stage unchanged, when the move would leave
    /// the protocol's stage range.
    pub fn set_current_protocol_stage(&mut self, action: StageAction) -> bool {
        let available = match action {
            StageAction::Previous => self.is_previous_stage_available(),
            StageAction::Next => self.is_next_stage_available(),
        };
        if !available {
            return false;
        }

        self.stage = self.stage.saturating_add_signed(action.offset());
        self.generation += 1;
        trace!(stage = self.stage, "ProtocolEngine::set_current_protocol_stage");

        self.update_viewports(None);
        true
    }

    pub fn next_protocol_stage(&mut self) -> bool {
        self.set_current_protocol_stage(StageAction::Next)
    }

    pub fn previous_protocol_stage(&mut self) -> bool {
        self.set_current_protocol_stage(StageAction::Previous)
    }

    /// Add a study that finished loading; returns false if it was already present
    pub fn add_study(&mut self, study: Study) -> bool {
        if self.has_study(study.object_id()) {
            return false;
        }
        self.studies.push(study);
        true
    }

    fn has_study(&self, object_id: &str) -> bool {
        self.studies.iter().any(|s| s.object_id() == object_id)
    }

    /// Protocol, stage and generation of the current hanging
    #[must_use]
    pub fn stage_context(&self) -> StageContext {
        StageContext {
            protocol_id: self.protocol.id.clone(),
            stage: self.stage,
            generation: self.generation,
        }
    }

    /// Tag the current study and queue the priors a viewport refers to.
    ///
    /// Priors that are already loaded are tagged in place.
    fn request_priors(&mut self, viewport: &ViewportDefinition, viewport_index: usize, context: &StageContext) {
        let Some(current) = self.studies.first_mut() else {
            return;
        };
        current.set_abstract_prior_value(0);
        let current_id = current.object_id().to_string();

        let requests = prior_requests(viewport, self.available_study_priors(&current_id));
        for request in requests {
            let uid = request.summary.study_instance_uid.as_str();

            if let Some(loaded) = self.studies.iter_mut().find(|s| s.object_id() == uid) {
                if loaded.abstract_prior_value().is_none() {
                    loaded.set_abstract_prior_value(request.prior_value);
                }
                continue;
            }

            let already_pending = self.pending_priors.iter().any(|p| {
                p.summary.study_instance_uid == uid && p.viewport_index == viewport_index && &p.context == context
            });
            if !already_pending {
                trace!(study = uid, viewport_index, "Queueing prior study");
                self.pending_priors.push(PendingPrior {
                    summary: request.summary,
                    prior_value: request.prior_value,
                    viewport_index,
                    context: context.clone(),
                });
            }
        }
    }

    /// Hang images into the viewports of the current stage.
    ///
    /// Does nothing when the stage lacks a viewport structure, viewports, a
    /// known layout template or layout properties. With `viewport_index`
    /// only that viewport is sent to the host (all of them if the index is
    /// out of range). No image is hung twice in one pass.
    pub fn update_viewports(&mut self, viewport_index: Option<usize>) -> Option<ViewportUpdate> {
        trace!(?viewport_index, "ProtocolEngine::update_viewports");

        if self.num_protocol_stages() == 0 {
            trace!("No stages in the current protocol");
            return None;
        }
        let Some(stage) = self.current_stage_model().cloned() else {
            trace!(stage = self.stage, "No current stage");
            return None;
        };
        let Some(structure) = stage.viewport_structure.as_ref() else {
            trace!("Stage has no viewport structure");
            return None;
        };
        if stage.viewports.is_empty() {
            trace!("Stage has no viewports");
            return None;
        }
        if structure.layout_template_name().is_none() {
            trace!(layout_type = ?structure.layout_type, "No layout template for the viewport structure");
            return None;
        }
        let Some(layout_properties) = structure.properties.clone() else {
            trace!("Viewport structure has no properties");
            return None;
        };

        let context = self.stage_context();
        let mut viewports: Vec<ViewportData> = Vec::with_capacity(stage.viewports.len());
        let mut match_details = Vec::with_capacity(stage.viewports.len());
        let mut claimed: HashSet<String> = HashSet::new();

        for (index, viewport) in stage.viewports.iter().enumerate() {
            self.request_priors(viewport, index, &context);
            let details = match_images(&self.studies, &self.matcher, viewport);

            let assignment = details
                .matching_scores
                .iter()
                .find_map(|candidate| {
                    let image_id = candidate.image_id.as_deref()?;
                    (!claimed.contains(image_id)).then(|| ImageAssignment::from_candidate(candidate, image_id))
                });
            if let Some(assignment) = &assignment {
                claimed.insert(assignment.image_id.clone());
            } else {
                trace!(viewport_index = index, "No unclaimed image for viewport");
            }

            viewports.push(ViewportData {
                viewport_index: index,
                viewport: convert_settings(&viewport.viewport_settings),
                layout_properties: layout_properties.clone(),
                custom_settings: self.custom_settings(&viewport.viewport_settings),
                assignment,
            });
            match_details.push(details);
        }

        let layout = Layout {
            num_rows: structure.rows().unwrap_or(0),
            num_columns: structure.columns().unwrap_or(0),
            num_viewports: structure.num_viewports().unwrap_or(0),
        };
        let layout = self.set_layout(layout);

        self.emit_viewport_data(viewport_index, &viewports);

        Some(ViewportUpdate {
            context,
            layout,
            viewports,
            match_details,
        })
    }

    fn custom_settings(&self, settings: &BTreeMap<String, Value>) -> Vec<CustomSetting> {
        settings
            .iter()
            .filter(|(id, _)| self.options.config.custom_viewport_settings.contains(id))
            .map(|(id, value)| CustomSetting {
                id: id.clone(),
                value: value.clone(),
            })
            .collect()
    }

    fn set_layout(&mut self, layout: Layout) -> Option<Layout> {
        if layout.num_rows < 1 && layout.num_columns < 1 {
            error!(rows = layout.num_rows, columns = layout.num_columns, "Invalid layout");
            return None;
        }

        let Some(callback) = self.options.set_layout.as_mut() else {
            error!("Hanging protocol engine set_layout callback is not defined");
            return Some(layout);
        };
        callback(&layout);
        Some(layout)
    }

    fn emit_viewport_data(&mut self, viewport_index: Option<usize>, viewports: &[ViewportData]) {
        let Some(callback) = self.options.set_viewport_specific_data.as_mut() else {
            error!("Hanging protocol engine set_viewport_specific_data callback is not defined");
            return;
        };

        if let Some(data) = viewport_index.and_then(|index| viewports.get(index)) {
            callback(data.viewport_index, data);
            return;
        }

        for data in viewports {
            callback(data.viewport_index, data);
        }
    }

    /// Load queued prior studies and refresh the viewports that asked for them.
    ///
    /// A viewport is refreshed only if the protocol and stage it was hung
    /// for are still current. Failed loads are logged and skipped. Returns
    /// the number of studies added.
    pub async fn resolve_priors(&mut self) -> usize {
        let mut added = 0;
        let mut failed: HashSet<String> = HashSet::new();

        loop {
            let pending = std::mem::take(&mut self.pending_priors);
            if pending.is_empty() {
                break;
            }

            for prior in pending {
                let uid = prior.summary.study_instance_uid.clone();
                if failed.contains(&uid) {
                    continue;
                }

                if !self.has_study(&uid) {
                    match self.source.load_study(&prior.summary).await {
                        Ok(mut study) => {
                            study.set_abstract_prior_value(prior.prior_value);
                            self.studies.push(study);
                            added += 1;
                        }
                        Err(e) => {
                            warn!(study = %uid, error = %e, "Could not load prior study");
                            failed.insert(uid);
                            continue;
                        }
                    }
                }

                if prior.context == self.stage_context() {
                    self.update_viewports(Some(prior.viewport_index));
                } else {
                    debug!(
                        study = %uid,
                        viewport_index = prior.viewport_index,
                        "Dropping viewport update for a protocol or stage that is no longer current"
                    );
                }
            }
        }

        added
    }

    /// The protocol currently hung
    #[must_use]
    pub fn protocol(&self) -> &Protocol {
        &self.protocol
    }

    /// Index of the current stage
    #[must_use]
    pub fn stage(&self) -> usize {
        self.stage
    }

    #[must_use]
    pub fn studies(&self) -> &[Study] {
        &self.studies
    }

    #[must_use]
    pub fn store(&self) -> &ProtocolStore {
        &self.store
    }

    /// Prior studies waiting for [`ProtocolEngine::resolve_priors`]
    #[must_use]
    pub fn pending_priors(&self) -> &[PendingPrior] {
        &self.pending_priors
    }

    /// Matcher used for all rule evaluation, e.g. to register custom attributes
    pub fn matcher_mut(&mut self) -> &mut HpMatcher {
        &mut self.matcher
    }
}

/// Turn `"YES"`/`"NO"` settings into booleans
fn convert_settings(settings: &BTreeMap<String, Value>) -> BTreeMap<String, Value> {
    settings
        .iter()
        .map(|(key, value)| {
            let value = match value.as_str() {
                Some("YES") => Value::Bool(true),
                Some("NO") => Value::Bool(false),
                _ => value.clone(),
            };
            (key.clone(), value)
        })
        .collect()
}
