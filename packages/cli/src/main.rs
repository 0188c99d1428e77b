#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the habitat evaluation toolkit.
//!
//! Every operation is a subcommand. Running without one opens an
//! interactive menu.
//!
//! Uses `indicatif-log-bridge` (via [`hab_eval_cli_utils::init_logger`])
//! to route `log` output through `indicatif::MultiProgress` so that log
//! lines and progress bars never fight for the terminal.

mod commands;
mod interactive;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use hab_eval_evaluation_models::PresencePolicy;

#[derive(Parser)]
#[command(name = "hab_eval", about = "Habitat map evaluation toolkit")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate one species' habitat map from a TOML run configuration
    Evaluate {
        /// Path to the run configuration
        config: PathBuf,
    },
    /// Compile BPA summaries for every species in an evaluation list
    CompileBpa {
        /// Evaluation list CSV (`SpeciesCode,SciName,PropHab`)
        #[arg(long)]
        list: PathBuf,
        /// Directory holding `{species}-HabStats.csv` tables
        #[arg(long)]
        stats_dir: PathBuf,
        /// Directory for `All-Species-BPA.csv` and the figure
        #[arg(long, default_value = "outputs")]
        output_dir: PathBuf,
    },
    /// Compile per-threshold sensitivity for every species in an evaluation list
    CompileBsm {
        /// Evaluation list CSV (`SpeciesCode,SciName,PropHab`)
        #[arg(long)]
        list: PathBuf,
        /// Directory holding `{species}-HabStats.csv` tables
        #[arg(long)]
        stats_dir: PathBuf,
        /// Directory for `All-Species-BSM.csv`
        #[arg(long, default_value = "outputs")]
        output_dir: PathBuf,
        /// Comma-separated distance thresholds in meters
        #[arg(long, value_delimiter = ',')]
        thresholds: Option<Vec<u32>>,
        /// How a buffer is judged to contain habitat
        #[arg(long, default_value = "any_habitat")]
        presence: PresencePolicy,
    },
    /// Compare stored occurrence counts with overlay table rows
    CheckRecords {
        /// Evaluation list CSV (`SpeciesCode,SciName,PropHab`)
        #[arg(long)]
        list: PathBuf,
        /// Directory of per-species `DuckDB` occurrence stores
        #[arg(long)]
        store_dir: PathBuf,
        /// Directory holding `{species}-HabStats.csv` tables
        #[arg(long)]
        stats_dir: PathBuf,
        /// Output CSV path
        #[arg(long, default_value = "outputs/RecordCheck.csv")]
        output: PathBuf,
    },
    /// Look up names in every enabled taxonomy service
    Taxonomy {
        /// File with one scientific or common name per line
        input: PathBuf,
        /// Output CSV path
        #[arg(long, default_value = "outputs/TaxonomyLookups.csv")]
        output: PathBuf,
        /// Comma-separated service IDs (defaults to all enabled services)
        #[arg(long, value_delimiter = ',')]
        services: Option<Vec<String>>,
        /// Per-request timeout in seconds
        #[arg(long, default_value = "30")]
        timeout: u64,
    },
    /// Count georeferenced GBIF records for a list of scientific names
    GbifCounts {
        /// File with one scientific name per line
        input: PathBuf,
        /// Output CSV path
        #[arg(long, default_value = "outputs/GbifRecordCounts.csv")]
        output: PathBuf,
        /// ISO 3166 alpha-2 country filter
        #[arg(long, default_value = "US")]
        country: String,
        /// Per-request timeout in seconds
        #[arg(long, default_value = "30")]
        timeout: u64,
    },
    /// Summarize GBIF record completeness for a list of scientific names
    GbifSummary {
        /// File with one scientific name per line
        input: PathBuf,
        /// Output CSV path
        #[arg(long, default_value = "outputs/GbifSummary.csv")]
        output: PathBuf,
        /// ISO 3166 alpha-2 country filter
        #[arg(long, default_value = "US")]
        country: String,
        /// Per-request timeout in seconds
        #[arg(long, default_value = "30")]
        timeout: u64,
    },
    /// Download GBIF occurrences for one species into its `DuckDB` store
    GbifDownload {
        /// Species code used for the store file name
        species: String,
        /// Scientific name to search
        #[arg(long)]
        name: String,
        /// Directory of per-species `DuckDB` occurrence stores
        #[arg(long)]
        store_dir: PathBuf,
        /// ISO 3166 alpha-2 country filter
        #[arg(long, default_value = "US")]
        country: String,
        /// Per-request timeout in seconds
        #[arg(long, default_value = "30")]
        timeout: u64,
    },
    /// List configured taxonomy services
    Providers,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = hab_eval_cli_utils::init_logger();
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        return interactive::run(&multi).await;
    };

    let result = match command {
        Commands::Evaluate { config } => commands::evaluate(&multi, &config),
        Commands::CompileBpa {
            list,
            stats_dir,
            output_dir,
        } => commands::compile_bpa(&list, &stats_dir, &output_dir),
        Commands::CompileBsm {
            list,
            stats_dir,
            output_dir,
            thresholds,
            presence,
        } => commands::compile_bsm(&list, &stats_dir, &output_dir, thresholds, presence),
        Commands::CheckRecords {
            list,
            store_dir,
            stats_dir,
            output,
        } => commands::check_records(&list, &store_dir, &stats_dir, &output),
        Commands::Taxonomy {
            input,
            output,
            services,
            timeout,
        } => commands::taxonomy(&input, &output, services.as_deref(), timeout).await,
        Commands::GbifCounts {
            input,
            output,
            country,
            timeout,
        } => commands::gbif_counts(&multi, &input, &output, &country, timeout).await,
        Commands::GbifSummary {
            input,
            output,
            country,
            timeout,
        } => commands::gbif_summary(&multi, &input, &output, &country, timeout).await,
        Commands::GbifDownload {
            species,
            name,
            store_dir,
            country,
            timeout,
        } => {
            commands::gbif_download(&multi, &species, &name, &store_dir, &country, timeout).await
        }
        Commands::Providers => {
            commands::list_providers();
            Ok(())
        }
    };

    if let Err(e) = &result {
        log::error!("{e}");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gbif_summary_defaults() {
        let cli = Cli::try_parse_from(["hab_eval", "gbif-summary", "names.txt"]).unwrap();
        let Some(Commands::GbifSummary {
            input,
            output,
            country,
            timeout,
        }) = cli.command
        else {
            panic!("expected gbif-summary");
        };
        assert_eq!(input, PathBuf::from("names.txt"));
        assert_eq!(output, PathBuf::from("outputs/GbifSummary.csv"));
        assert_eq!(country, "US");
        assert_eq!(timeout, 30);
    }

    #[test]
    fn taxonomy_services_split_on_commas() {
        let cli =
            Cli::try_parse_from(["hab_eval", "taxonomy", "names.txt", "--services", "itis,gbif"])
                .unwrap();
        let Some(Commands::Taxonomy { services, .. }) = cli.command else {
            panic!("expected taxonomy");
        };
        assert_eq!(services, Some(vec!["itis".to_string(), "gbif".to_string()]));
    }
}
