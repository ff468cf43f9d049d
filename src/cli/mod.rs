//! Command-line interface for hp-engine.
//!
//! This module implements the CLI using clap. Available commands:
//!
//! - **hang**: Choose a protocol for a case and hang images into its viewports
//! - **rank**: Score every protocol against every study of a case
//! - **catalog**: List, show, validate or export the protocol catalog
//!
//! ## Usage
//!
//! ```text
//! # Hang the embedded catalog's best protocol, loading priors from a directory
//! hp-engine hang case.json --priors-dir studies/
//!
//! # Show the second stage as JSON
//! hp-engine hang case.json --stage 1 --format json
//!
//! # Why did a protocol win?
//! hp-engine rank case.json --catalog my_protocols.json
//! ```
//!
//! A case file holds the loaded studies and, per study, its priors (most
//! recent first):
//!
//! ```text
//! { "studies": [ ... ], "priorStudies": { "<StudyInstanceUID>": [ { "StudyInstanceUID": "...", "StudyDate": "..." } ] } }
//! ```

use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::Deserialize;

use crate::catalog::store::ProtocolStore;
use crate::core::metadata::{Study, StudySummary};

pub mod catalog;
pub mod hang;
pub mod rank;

#[derive(Parser)]
#[command(name = "hp-engine")]
#[command(version)]
#[command(about = "Match hanging protocols against studies and hang images into viewports")]
#[command(
    long_about = "hp-engine chooses the hanging protocol that best fits a set of studies and decides which image to show in each viewport.\n\nProtocols are scored with weighted, optionally required, attribute rules at the study level; viewports are filled by matching study, series and image rules and ranking the candidates by score, study recency, instance number and series number."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Hang the best matching protocol for a case
    Hang(hang::HangArgs),

    /// Score all protocols against the studies of a case
    Rank(rank::RankArgs),

    /// Manage the protocol catalog
    Catalog(catalog::CatalogArgs),
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
    Tsv,
}

/// Studies and priors of one viewing session
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseFile {
    pub studies: Vec<Study>,

    #[serde(default)]
    pub prior_studies: HashMap<String, Vec<StudySummary>>,
}

impl CaseFile {
    /// Read a case file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read case file {}", path.display()))?;
        let case: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse case file {}", path.display()))?;
        Ok(case)
    }
}

/// Load a catalog file, or the embedded catalog when no path is given
///
/// # Errors
///
/// Returns an error if the catalog cannot be read, parsed or validated.
pub fn load_store(catalog_path: Option<&Path>) -> anyhow::Result<ProtocolStore> {
    let store = if let Some(path) = catalog_path {
        ProtocolStore::load_from_file(path)
            .with_context(|| format!("Failed to load catalog {}", path.display()))?
    } else {
        ProtocolStore::load_embedded()?
    };
    Ok(store)
}

/// Format a score without a trailing `.0` for whole numbers
pub(crate) fn format_score(score: f64) -> String {
    if score.fract() == 0.0 && score.abs() < 1e15 {
        format!("{score:.0}")
    } else {
        format!("{score:.2}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_score() {
        assert_eq!(format_score(10.0), "10");
        assert_eq!(format_score(2.5), "2.50");
        assert_eq!(format_score(0.0), "0");
    }

    #[test]
    fn test_case_file_shape() {
        let json = r#"{
            "studies": [{"StudyInstanceUID": "1.2.3", "series": []}],
            "priorStudies": {"1.2.3": [{"StudyInstanceUID": "1.2.2", "StudyDate": "20190101"}]}
        }"#;
        let case: CaseFile = serde_json::from_str(json).unwrap();
        assert_eq!(case.studies.len(), 1);
        assert_eq!(case.prior_studies["1.2.3"][0].study_date.as_deref(), Some("20190101"));
    }
}
