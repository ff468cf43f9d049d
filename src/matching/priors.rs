//! Loading of prior studies requested through `abstractPriorValue` rules.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::metadata::{Study, StudySummary};
use crate::core::types::ProtocolId;
use crate::utils::validation::{validate_uid, ValidationError};

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Study {0} not found")]
    NotFound(String),

    #[error("Invalid study identifier: {0}")]
    InvalidUid(#[from] ValidationError),

    #[error("Failed to read study metadata: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse study metadata: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Loaded study {loaded} while requesting {requested}")]
    UidMismatch { requested: String, loaded: String },
}

/// Supplies full study metadata for prior-study summaries
pub trait StudyMetadataSource {
    /// Load the metadata of the study a summary describes
    fn load_study(&self, summary: &StudySummary) -> impl Future<Output = Result<Study, SourceError>> + Send;
}

/// Reads `<StudyInstanceUID>.json` files from a directory
#[derive(Debug, Clone)]
pub struct FileStudySource {
    dir: PathBuf,
}

impl FileStudySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl StudyMetadataSource for FileStudySource {
    fn load_study(&self, summary: &StudySummary) -> impl Future<Output = Result<Study, SourceError>> + Send {
        let uid = summary.study_instance_uid.clone();
        let dir = self.dir.clone();

        async move {
            validate_uid(&uid)?;
            let path = dir.join(format!("{uid}.json"));

            let content = match tokio::fs::read_to_string(&path).await {
                Ok(content) => content,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    return Err(SourceError::NotFound(uid));
                }
                Err(e) => return Err(e.into()),
            };

            let study: Study = serde_json::from_str(&content)?;
            if study.study_instance_uid != uid {
                return Err(SourceError::UidMismatch {
                    requested: uid,
                    loaded: study.study_instance_uid,
                });
            }
            Ok(study)
        }
    }
}

/// Serves studies held in memory, keyed by `StudyInstanceUID`
#[derive(Debug, Clone, Default)]
pub struct InMemoryStudySource {
    studies: HashMap<String, Study>,
}

impl InMemoryStudySource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, study: Study) {
        self.studies.insert(study.study_instance_uid.clone(), study);
    }

    #[must_use]
    pub fn with_study(mut self, study: Study) -> Self {
        self.insert(study);
        self
    }
}

impl FromIterator<Study> for InMemoryStudySource {
    fn from_iter<I: IntoIterator<Item = Study>>(iter: I) -> Self {
        let mut source = Self::new();
        for study in iter {
            source.insert(study);
        }
        source
    }
}

impl StudyMetadataSource for InMemoryStudySource {
    fn load_study(&self, summary: &StudySummary) -> impl Future<Output = Result<Study, SourceError>> + Send {
        let result = self
            .studies
            .get(&summary.study_instance_uid)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(summary.study_instance_uid.clone()));
        std::future::ready(result)
    }
}

/// Protocol and stage a viewport update was computed for.
///
/// The generation increases on every protocol or stage change, so a context
/// captured before a change never compares equal to the current one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageContext {
    pub protocol_id: ProtocolId,
    pub stage: usize,
    pub generation: u64,
}

/// A prior study waiting to be loaded for one viewport slot
#[derive(Debug, Clone, PartialEq)]
pub struct PendingPrior {
    pub summary: StudySummary,
    pub prior_value: i64,
    pub viewport_index: usize,
    pub context: StageContext,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::metadata::{Instance, Series};
    use tempfile::TempDir;

    fn study(uid: &str) -> Study {
        Study::new(uid).with_series(vec![Series::new(format!("{uid}.1"))
            .with_instances(vec![Instance::new().with_attribute("Modality", "CT")])])
    }

    #[tokio::test]
    async fn test_in_memory_source() {
        let source: InMemoryStudySource = vec![study("1.2.3")].into_iter().collect();

        let loaded = source.load_study(&StudySummary::new("1.2.3")).await.unwrap();
        assert_eq!(loaded.study_instance_uid, "1.2.3");

        let missing = source.load_study(&StudySummary::new("9.9")).await;
        assert!(matches!(missing, Err(SourceError::NotFound(uid)) if uid == "9.9"));
    }

    #[tokio::test]
    async fn test_file_source() {
        let dir = TempDir::new().unwrap();
        let json = serde_json::to_string(&study("1.2.3")).unwrap();
        std::fs::write(dir.path().join("1.2.3.json"), json).unwrap();
        std::fs::write(dir.path().join("4.5.6.json"), "{not json").unwrap();
        std::fs::write(
            dir.path().join("7.8.9.json"),
            serde_json::to_string(&study("1.2.3")).unwrap(),
        )
        .unwrap();

        let source = FileStudySource::new(dir.path());
        assert_eq!(source.dir(), dir.path());

        let loaded = source.load_study(&StudySummary::new("1.2.3")).await.unwrap();
        assert_eq!(loaded.num_instances(), 1);

        let missing = source.load_study(&StudySummary::new("0.0")).await;
        assert!(matches!(missing, Err(SourceError::NotFound(_))));

        let broken = source.load_study(&StudySummary::new("4.5.6")).await;
        assert!(matches!(broken, Err(SourceError::ParseError(_))));

        let mismatch = source.load_study(&StudySummary::new("7.8.9")).await;
        assert!(matches!(mismatch, Err(SourceError::UidMismatch { .. })));

        let traversal = source.load_study(&StudySummary::new("../secret")).await;
        assert!(matches!(traversal, Err(SourceError::InvalidUid(_))));
    }
}
