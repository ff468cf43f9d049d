use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::catalog::store::ProtocolStore;
use crate::cli::{load_store, OutputFormat};
use crate::core::protocol::Protocol;
use crate::core::types::{ProtocolId, DEFAULT_PROTOCOL_ID};
use crate::utils::validation::validate_protocols;

#[derive(Args)]
pub struct CatalogArgs {
    #[command(subcommand)]
    pub command: CatalogCommands,
}

#[derive(Subcommand)]
pub enum CatalogCommands {
    /// List all protocols in the catalog
    List {
        /// Path to custom catalog file
        #[arg(long)]
        catalog: Option<PathBuf>,
    },

    /// Show the rules and stages of a protocol
    Show {
        /// Protocol ID
        #[arg(required = true)]
        id: String,

        /// Path to custom catalog file
        #[arg(long)]
        catalog: Option<PathBuf>,
    },

    /// Check a catalog file and report structural warnings
    Validate {
        /// Catalog file to check (defaults to embedded)
        catalog: Option<PathBuf>,
    },

    /// Export the catalog to a file
    Export {
        /// Output file path
        #[arg(required = true)]
        output: PathBuf,

        /// Path to custom catalog file to export (defaults to embedded)
        #[arg(long)]
        catalog: Option<PathBuf>,
    },
}

/// Execute catalog subcommand
///
/// # Errors
///
/// Returns an error if the catalog cannot be loaded, the protocol is not
/// found, or the export cannot be written.
#[allow(clippy::needless_pass_by_value)] // CLI entry point
pub fn run(args: CatalogArgs, format: OutputFormat, verbose: bool) -> anyhow::Result<()> {
    match args.command {
        CatalogCommands::List { catalog } => run_list(catalog, format, verbose),
        CatalogCommands::Show { id, catalog } => run_show(&id, catalog, format),
        CatalogCommands::Validate { catalog } => run_validate(catalog, format),
        CatalogCommands::Export { output, catalog } => run_export(output, catalog),
    }
}

fn stage_count(protocol: &Protocol) -> usize {
    protocol.stages.len()
}

fn viewport_count(protocol: &Protocol) -> usize {
    protocol.stages.iter().map(|s| s.viewports.len()).max().unwrap_or(0)
}

fn run_list(catalog_path: Option<PathBuf>, format: OutputFormat, verbose: bool) -> anyhow::Result<()> {
    let store = load_store(catalog_path.as_deref())?;

    if verbose {
        eprintln!("Loaded catalog with {} protocols", store.len());
    }

    let protocols = store.protocols();

    match format {
        OutputFormat::Text => {
            let id_width = protocols.iter().map(|p| p.id.as_str().len()).max().unwrap_or(2).max(2);
            let name_width = protocols
                .iter()
                .map(|p| p.display_name().len().min(35))
                .max()
                .unwrap_or(4)
                .max(4);

            println!(
                "{:<id_width$}  {:<name_width$}  {:>5}  {:>6}  {:>9}  {:>6}",
                "ID", "Name", "Rules", "Stages", "Viewports", "Priors"
            );
            println!("{}", "-".repeat(id_width + name_width + 40));

            for protocol in protocols {
                let name: String = protocol.display_name().chars().take(35).collect();
                println!(
                    "{:<id_width$}  {:<name_width$}  {:>5}  {:>6}  {:>9}  {:>6}",
                    protocol.id.as_str(),
                    name,
                    protocol.protocol_matching_rules.len(),
                    stage_count(protocol),
                    viewport_count(protocol),
                    protocol.number_of_priors_referenced()
                );
            }

            println!("\nTotal: {} protocols", protocols.len());
        }
        OutputFormat::Json => {
            let summary: Vec<_> = protocols
                .iter()
                .map(|p| {
                    serde_json::json!({
                        "id": p.id,
                        "name": p.display_name(),
                        "rules": p.protocol_matching_rules.len(),
                        "stages": stage_count(p),
                        "viewports": viewport_count(p),
                        "priorsReferenced": p.number_of_priors_referenced(),
                    })
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        OutputFormat::Tsv => {
            println!("id\tname\trules\tstages\tviewports\tpriors");
            for protocol in protocols {
                println!(
                    "{}\t{}\t{}\t{}\t{}\t{}",
                    protocol.id,
                    protocol.display_name(),
                    protocol.protocol_matching_rules.len(),
                    stage_count(protocol),
                    viewport_count(protocol),
                    protocol.number_of_priors_referenced()
                );
            }
        }
    }

    Ok(())
}

fn run_show(id: &str, catalog_path: Option<PathBuf>, format: OutputFormat) -> anyhow::Result<()> {
    let store = load_store(catalog_path.as_deref())?;

    let protocol = store
        .get(&ProtocolId::new(id))
        .ok_or_else(|| anyhow::anyhow!("Protocol '{}' not found", id))?;

    match format {
        OutputFormat::Text => {
            println!("Protocol: {}\n", protocol.display_name());
            println!("ID:      {}", protocol.id);
            println!("Locked:  {}", protocol.locked);
            println!("Stages:  {}", protocol.stages.len());
            println!("Priors:  {}", protocol.number_of_priors_referenced());

            if !protocol.protocol_matching_rules.is_empty() {
                println!("\nMatching rules:");
                println!("{:<30} {:<20} {:>7} Required", "Attribute", "Validator", "Weight");
                println!("{}", "-".repeat(70));
                for rule in &protocol.protocol_matching_rules {
                    println!(
                        "{:<30} {:<20} {:>7} {}",
                        rule.attribute,
                        rule.constraint.validator_name(),
                        rule.weight,
                        if rule.required { "yes" } else { "no" }
                    );
                }
            }

            for (index, stage) in protocol.stages.iter().enumerate() {
                let layout = stage
                    .viewport_structure
                    .as_ref()
                    .map_or_else(|| "-".to_string(), |s| format!("{}x{}", s.rows().unwrap_or(0), s.columns().unwrap_or(0)));
                println!(
                    "\nStage {index}: {} ({layout}, {} viewports)",
                    stage.name.as_deref().unwrap_or("unnamed"),
                    stage.viewports.len()
                );
                for (vp_index, viewport) in stage.viewports.iter().enumerate() {
                    println!(
                        "  [{vp_index}] study rules: {}, series rules: {}, image rules: {}",
                        viewport.study_matching_rules.len(),
                        viewport.series_matching_rules.len(),
                        viewport.image_matching_rules.len()
                    );
                }
            }
        }
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(protocol)?);
        }
        OutputFormat::Tsv => {
            println!("attribute\tvalidator\tweight\trequired");
            for rule in &protocol.protocol_matching_rules {
                println!(
                    "{}\t{}\t{}\t{}",
                    rule.attribute,
                    rule.constraint.validator_name(),
                    rule.weight,
                    rule.required
                );
            }
        }
    }

    Ok(())
}

fn run_validate(catalog_path: Option<PathBuf>, format: OutputFormat) -> anyhow::Result<()> {
    let store = load_store(catalog_path.as_deref())?;
    let warnings = validate_protocols(store.protocols(), DEFAULT_PROTOCOL_ID)?;

    match format {
        OutputFormat::Text => {
            println!("Catalog OK: {} protocols", store.len());
            for warning in &warnings {
                println!("warning: {warning}");
            }
        }
        OutputFormat::Json => {
            let report = serde_json::json!({
                "protocols": store.len(),
                "warnings": warnings,
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        OutputFormat::Tsv => {
            println!("warning");
            for warning in &warnings {
                println!("{warning}");
            }
        }
    }

    Ok(())
}

fn run_export(output: PathBuf, catalog_path: Option<PathBuf>) -> anyhow::Result<()> {
    let store: ProtocolStore = load_store(catalog_path.as_deref())?;

    let json = store.to_json()?;
    std::fs::write(&output, json)?;

    println!("Exported {} protocols to {}", store.len(), output.display());

    Ok(())
}
