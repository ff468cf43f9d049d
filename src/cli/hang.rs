use std::path::PathBuf;

use clap::Args;
use tracing::debug;

use crate::cli::{format_score, load_store, CaseFile, OutputFormat};
use crate::matching::engine::{EngineOptions, ProtocolEngine, ViewportUpdate};
use crate::matching::priors::{FileStudySource, StudyMetadataSource};

#[derive(Args)]
pub struct HangArgs {
    /// Case file with the loaded studies and their priors
    #[arg(required = true)]
    pub case: PathBuf,

    /// Path to custom catalog file
    #[arg(long)]
    pub catalog: Option<PathBuf>,

    /// Directory holding `<StudyInstanceUID>.json` files for prior studies
    /// (defaults to the case file's directory)
    #[arg(long)]
    pub priors_dir: Option<PathBuf>,

    /// Advance this many stages before reporting
    #[arg(long, default_value = "0")]
    pub stage: usize,
}

/// Execute hang command
///
/// # Errors
///
/// Returns an error if the case or catalog cannot be loaded, or the engine
/// cannot be built for the case.
#[allow(clippy::needless_pass_by_value)] // CLI entry point
pub fn run(args: HangArgs, format: OutputFormat, verbose: bool) -> anyhow::Result<()> {
    let store = load_store(args.catalog.as_deref())?;
    let case = CaseFile::load(&args.case)?;

    let priors_dir = args.priors_dir.clone().unwrap_or_else(|| {
        args.case.parent().map(PathBuf::from).unwrap_or_default()
    });

    if verbose {
        eprintln!(
            "Loaded {} studies and {} protocols; priors from {}",
            case.studies.len(),
            store.len(),
            priors_dir.display()
        );
    }

    let options = EngineOptions::default()
        .with_set_layout(|layout| debug!(?layout, "set_layout"))
        .with_set_viewport_specific_data(|index, data| {
            debug!(
                viewport_index = index,
                image_id = data.assignment.as_ref().map(|a| a.image_id.as_str()),
                "set_viewport_specific_data"
            );
        });

    let mut engine = ProtocolEngine::new(
        store,
        case.studies,
        case.prior_studies,
        FileStudySource::new(priors_dir),
        options,
    )?;

    let rt = tokio::runtime::Runtime::new()?;
    let loaded = rt.block_on(engine.resolve_priors());

    let mut advanced = 0;
    while advanced < args.stage && engine.next_protocol_stage() {
        rt.block_on(engine.resolve_priors());
        advanced += 1;
    }

    if verbose {
        eprintln!(
            "Protocol '{}' stage {} of {}; {} prior studies loaded",
            engine.protocol().id,
            engine.stage() + 1,
            engine.num_protocol_stages(),
            loaded
        );
        if advanced < args.stage {
            eprintln!("Protocol has only {} stages", engine.num_protocol_stages());
        }
    }

    let update = engine.update_viewports(None);

    match format {
        OutputFormat::Text => print_text(&engine, update.as_ref()),
        OutputFormat::Json => print_json(&engine, update.as_ref())?,
        OutputFormat::Tsv => print_tsv(update.as_ref()),
    }

    Ok(())
}

fn print_text<S: StudyMetadataSource>(engine: &ProtocolEngine<S>, update: Option<&ViewportUpdate>) {
    let protocol = engine.protocol();
    println!("Protocol: {} ({})", protocol.display_name(), protocol.id);
    println!(
        "Stage:    {} of {}",
        engine.stage() + 1,
        engine.num_protocol_stages()
    );

    let Some(update) = update else {
        println!("\nStage has no usable viewport layout");
        return;
    };

    if let Some(layout) = update.layout {
        println!("Layout:   {}x{}", layout.num_rows, layout.num_columns);
    }

    println!();
    println!("{:<4} {:>7} {:<40} Image", "VP", "Score", "Series");
    println!("{}", "-".repeat(100));

    for (data, details) in update.viewports.iter().zip(&update.match_details) {
        match &data.assignment {
            Some(assignment) => {
                let score = details
                    .matching_scores
                    .iter()
                    .find(|c| c.image_id.as_deref() == Some(assignment.image_id.as_str()))
                    .map_or_else(|| "-".to_string(), |c| format_score(c.matching_score));
                println!(
                    "{:<4} {:>7} {:<40} {}",
                    data.viewport_index, score, assignment.series_instance_uid, assignment.image_id
                );
            }
            None => println!("{:<4} {:>7} {:<40} -", data.viewport_index, "-", "(empty)"),
        }
    }
}

fn print_json<S: StudyMetadataSource>(engine: &ProtocolEngine<S>, update: Option<&ViewportUpdate>) -> anyhow::Result<()> {
    let output = serde_json::json!({
        "protocolId": engine.protocol().id,
        "protocolName": engine.protocol().display_name(),
        "stage": engine.stage(),
        "numStages": engine.num_protocol_stages(),
        "update": update,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn print_tsv(update: Option<&ViewportUpdate>) {
    println!("viewport\tstudy_uid\tseries_uid\tsop_uid\timage_id");
    let Some(update) = update else {
        return;
    };
    for data in &update.viewports {
        match &data.assignment {
            Some(a) => println!(
                "{}\t{}\t{}\t{}\t{}",
                data.viewport_index,
                a.study_instance_uid,
                a.series_instance_uid,
                a.sop_instance_uid.as_deref().unwrap_or(""),
                a.image_id
            ),
            None => println!("{}\t\t\t\t", data.viewport_index),
        }
    }
}
