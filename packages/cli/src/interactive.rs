//! Interactive menu for running toolkit operations without memorizing
//! flags.

use std::path::PathBuf;

use dialoguer::{Input, MultiSelect, Select};
use hab_eval_cli_utils::MultiProgress;
use hab_eval_evaluation_models::PresencePolicy;
use hab_eval_taxonomy::service_registry;

use crate::commands;

/// Top-level actions available in the interactive menu.
enum Action {
    Evaluate,
    CompileBpa,
    CompileBsm,
    CheckRecords,
    Taxonomy,
    GbifCounts,
    GbifSummary,
    GbifDownload,
    ListProviders,
}

impl Action {
    const ALL: &[Self] = &[
        Self::Evaluate,
        Self::CompileBpa,
        Self::CompileBsm,
        Self::CheckRecords,
        Self::Taxonomy,
        Self::GbifCounts,
        Self::GbifSummary,
        Self::GbifDownload,
        Self::ListProviders,
    ];

    #[must_use]
    const fn label(&self) -> &'static str {
        match self {
            Self::Evaluate => "Evaluate a species habitat map",
            Self::CompileBpa => "Compile multi-species BPA",
            Self::CompileBsm => "Compile multi-species sensitivity",
            Self::CheckRecords => "Check occurrence record counts",
            Self::Taxonomy => "Look up taxonomy concepts",
            Self::GbifCounts => "Count GBIF records",
            Self::GbifSummary => "Summarize GBIF record completeness",
            Self::GbifDownload => "Download GBIF occurrences",
            Self::ListProviders => "List taxonomy services",
        }
    }
}

fn prompt_path(prompt: &str, default: &str) -> Result<PathBuf, dialoguer::Error> {
    let value: String = Input::new()
        .with_prompt(prompt)
        .default(default.to_string())
        .interact_text()?;
    Ok(PathBuf::from(value))
}

fn prompt_required_path(prompt: &str) -> Result<PathBuf, dialoguer::Error> {
    let value: String = Input::new().with_prompt(prompt).interact_text()?;
    Ok(PathBuf::from(value))
}

fn prompt_string(prompt: &str, default: &str) -> Result<String, dialoguer::Error> {
    Input::new()
        .with_prompt(prompt)
        .default(default.to_string())
        .interact_text()
}

/// Prompts for an action and its parameters, then runs it.
///
/// # Errors
///
/// Returns an error if a prompt or the selected operation fails.
pub async fn run(multi: &MultiProgress) -> Result<(), Box<dyn std::error::Error>> {
    println!("Habitat Map Evaluation Toolkit");
    println!();

    let labels: Vec<&str> = Action::ALL.iter().map(Action::label).collect();
    let idx = Select::new()
        .with_prompt("What would you like to do?")
        .items(&labels)
        .default(0)
        .interact()?;

    match Action::ALL[idx] {
        Action::Evaluate => {
            let config = prompt_required_path("Run configuration (TOML)")?;
            commands::evaluate(multi, &config)?;
        }
        Action::CompileBpa => {
            let list = prompt_required_path("Evaluation list CSV")?;
            let stats_dir = prompt_path("HabStats directory", "outputs")?;
            let output_dir = prompt_path("Output directory", "outputs")?;
            commands::compile_bpa(&list, &stats_dir, &output_dir)?;
        }
        Action::CompileBsm => {
            let list = prompt_required_path("Evaluation list CSV")?;
            let stats_dir = prompt_path("HabStats directory", "outputs")?;
            let output_dir = prompt_path("Output directory", "outputs")?;
            let policies = [
                PresencePolicy::AnyHabitat,
                PresencePolicy::ProportionAtLeastExpected,
            ];
            let policy_labels: Vec<&str> = policies.iter().map(AsRef::<str>::as_ref).collect();
            let policy = Select::new()
                .with_prompt("Presence policy")
                .items(&policy_labels)
                .default(0)
                .interact()?;
            commands::compile_bsm(&list, &stats_dir, &output_dir, None, policies[policy])?;
        }
        Action::CheckRecords => {
            let list = prompt_required_path("Evaluation list CSV")?;
            let store_dir = prompt_required_path("Occurrence store directory")?;
            let stats_dir = prompt_path("HabStats directory", "outputs")?;
            let output = prompt_path("Output CSV", "outputs/RecordCheck.csv")?;
            commands::check_records(&list, &store_dir, &stats_dir, &output)?;
        }
        Action::Taxonomy => {
            let input = prompt_required_path("Names file (one per line)")?;
            let output = prompt_path("Output CSV", "outputs/TaxonomyLookups.csv")?;

            let services = service_registry::enabled_services();
            let service_labels: Vec<String> = services
                .iter()
                .map(|s| format!("{} ({})", s.name, s.id))
                .collect();
            let defaults = vec![true; services.len()];
            let selected = MultiSelect::new()
                .with_prompt("Services (space=toggle, a=all, enter=confirm)")
                .items(&service_labels)
                .defaults(&defaults)
                .interact()?;
            if selected.is_empty() {
                println!("No services selected.");
                return Ok(());
            }
            let ids: Vec<String> = selected.iter().map(|&i| services[i].id.clone()).collect();
            commands::taxonomy(&input, &output, Some(&ids), 30).await?;
        }
        Action::GbifCounts => {
            let input = prompt_required_path("Scientific names file (one per line)")?;
            let output = prompt_path("Output CSV", "outputs/GbifRecordCounts.csv")?;
            let country = prompt_string("Country code", "US")?;
            commands::gbif_counts(multi, &input, &output, &country, 30).await?;
        }
        Action::GbifSummary => {
            let input = prompt_required_path("Scientific names file (one per line)")?;
            let output = prompt_path("Output CSV", "outputs/GbifSummary.csv")?;
            let country = prompt_string("Country code", "US")?;
            commands::gbif_summary(multi, &input, &output, &country, 30).await?;
        }
        Action::GbifDownload => {
            let species: String = Input::new().with_prompt("Species code").interact_text()?;
            let name: String = Input::new().with_prompt("Scientific name").interact_text()?;
            let store_dir = prompt_path("Occurrence store directory", "stores")?;
            let country = prompt_string("Country code", "US")?;
            commands::gbif_download(multi, &species, &name, &store_dir, &country, 30).await?;
        }
        Action::ListProviders => commands::list_providers(),
    }

    Ok(())
}
