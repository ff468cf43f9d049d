use std::path::PathBuf;

use clap::Args;
use serde::Serialize;

use crate::cli::{format_score, load_store, CaseFile, OutputFormat};
use crate::matching::engine::{EngineOptions, ProtocolEngine, ProtocolMatch};
use crate::matching::priors::InMemoryStudySource;

#[derive(Args)]
pub struct RankArgs {
    /// Case file with the loaded studies and their priors
    #[arg(required = true)]
    pub case: PathBuf,

    /// Path to custom catalog file
    #[arg(long)]
    pub catalog: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StudyRanking {
    #[serde(rename = "StudyInstanceUID")]
    study_instance_uid: String,
    available_priors: usize,
    matches: Vec<ProtocolMatch>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RankReport {
    best: ProtocolMatch,
    studies: Vec<StudyRanking>,
}

/// Execute rank command
///
/// # Errors
///
/// Returns an error if the case or catalog cannot be loaded, or the engine
/// cannot be built for the case.
#[allow(clippy::needless_pass_by_value)] // CLI entry point
pub fn run(args: RankArgs, format: OutputFormat, verbose: bool) -> anyhow::Result<()> {
    let store = load_store(args.catalog.as_deref())?;
    let case = CaseFile::load(&args.case)?;

    if verbose {
        eprintln!(
            "Ranking {} protocols against {} studies",
            store.len(),
            case.studies.len()
        );
    }

    // Scoring never loads priors; only their count matters
    let options = EngineOptions::default()
        .with_set_layout(|_| {})
        .with_set_viewport_specific_data(|_, _| {});
    let engine = ProtocolEngine::new(
        store,
        case.studies,
        case.prior_studies,
        InMemoryStudySource::new(),
        options,
    )?;

    let studies = engine
        .studies()
        .iter()
        .map(|study| StudyRanking {
            study_instance_uid: study.study_instance_uid.clone(),
            available_priors: engine.number_of_available_priors(study.object_id()),
            matches: engine.find_match_by_study(study),
        })
        .collect();
    let report = RankReport {
        best: engine.get_best_protocol_match(),
        studies,
    };

    match format {
        OutputFormat::Text => print_text(&report),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Tsv => {
            println!("study_uid\tprotocol_id\tscore");
            for study in &report.studies {
                for m in &study.matches {
                    println!("{}\t{}\t{}", study.study_instance_uid, m.protocol_id, m.score);
                }
            }
        }
    }

    Ok(())
}

fn print_text(report: &RankReport) {
    println!(
        "Best protocol: {} (score {})",
        report.best.protocol_id,
        format_score(report.best.score)
    );

    for study in &report.studies {
        println!(
            "\nStudy {} ({} priors available)",
            study.study_instance_uid, study.available_priors
        );
        println!("  {:<4} {:<30} {:>8}", "#", "Protocol", "Score");
        println!("  {}", "-".repeat(44));
        for (rank, m) in study.matches.iter().enumerate() {
            println!(
                "  {:<4} {:<30} {:>8}",
                rank + 1,
                m.protocol_id.as_str(),
                format_score(m.score)
            );
        }
    }
}
