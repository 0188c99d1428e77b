//! Run configuration loading and validation.

use std::path::{Path, PathBuf};

use hab_eval_evaluation_models::{OccurrenceSourceConfig, RunConfig};

use crate::EvaluationError;

/// Reads a TOML run configuration, resolving relative paths against the
/// directory that holds the file.
///
/// # Errors
///
/// Returns [`EvaluationError`] if the file cannot be read or parsed, or if
/// the configuration is invalid.
pub fn load(path: &Path) -> Result<RunConfig, EvaluationError> {
    let contents = std::fs::read_to_string(path)?;
    let mut config = parse(&contents)?;

    let base = path.parent().unwrap_or_else(|| Path::new(""));
    resolve_paths(&mut config, base);

    log::debug!("Loaded run config for {} from {}", config.species, path.display());
    Ok(config)
}

/// Parses and validates a configuration from TOML text. Paths are left as
/// written.
///
/// # Errors
///
/// Returns [`EvaluationError`] on a parse error or invalid values.
pub fn parse(contents: &str) -> Result<RunConfig, EvaluationError> {
    let config: RunConfig = toml::from_str(contents)?;
    validate(&config)?;
    Ok(config)
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn resolve_paths(config: &mut RunConfig, base: &Path) {
    config.raster = resolve(base, &config.raster);
    config.output_dir = resolve(base, &config.output_dir);
    config.occurrences = match &config.occurrences {
        OccurrenceSourceConfig::Csv { path } => OccurrenceSourceConfig::Csv {
            path: resolve(base, path),
        },
        OccurrenceSourceConfig::Duckdb { dir } => OccurrenceSourceConfig::Duckdb {
            dir: resolve(base, dir),
        },
    };
}

/// Returns `true` if `species` can be used as a file name stem.
#[must_use]
pub fn is_valid_species_code(species: &str) -> bool {
    !species.is_empty()
        && !species.starts_with('.')
        && species
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

/// Checks value ranges that serde cannot express.
///
/// # Errors
///
/// Returns [`EvaluationError::Config`] describing the first problem found.
pub fn validate(config: &RunConfig) -> Result<(), EvaluationError> {
    if !is_valid_species_code(&config.species) {
        return Err(EvaluationError::config(format!(
            "species code {:?} must be non-empty and contain only letters, digits, '_', '-' or '.'",
            config.species
        )));
    }

    if !(0.0..=1.0).contains(&config.expected_proportion) {
        return Err(EvaluationError::config(format!(
            "expected_proportion must be within [0, 1], got {}",
            config.expected_proportion
        )));
    }

    if !config.min_buffer_distance.is_finite() || config.min_buffer_distance <= 0.0 {
        return Err(EvaluationError::config(format!(
            "min_buffer_distance must be positive, got {}",
            config.min_buffer_distance
        )));
    }

    if config.thresholds.is_empty() {
        return Err(EvaluationError::config("thresholds must not be empty"));
    }
    if config.thresholds[0] == 0 {
        return Err(EvaluationError::config("thresholds must be positive"));
    }
    if let Some(pair) = config.thresholds.windows(2).find(|w| w[0] >= w[1]) {
        return Err(EvaluationError::config(format!(
            "thresholds must be strictly ascending ({} is followed by {})",
            pair[0], pair[1]
        )));
    }

    if config.habitat_codes.is_empty() {
        return Err(EvaluationError::config("habitat_codes must not be empty"));
    }
    if config.habitat_codes.contains(&0) {
        return Err(EvaluationError::config(
            "habitat_codes must not contain 0, which is the non-habitat code",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = r#"
        species = "bhensx"
        raster = "rasters/bHENSx.tif"
        expected_proportion = 0.12

        [occurrences]
        type = "csv"
        path = "occ.csv"
    "#;

    fn with(extra: &str) -> String {
        format!("{extra}\n{BASE}")
    }

    #[test]
    fn accepts_minimal_config() {
        let config = parse(BASE).unwrap();
        assert_eq!(config.species, "bhensx");
        assert_eq!(config.thresholds.len(), 7);
    }

    #[test]
    fn rejects_out_of_range_values() {
        let cases = [
            "thresholds = [100, 30]",
            "thresholds = [30, 30]",
            "thresholds = []",
            "thresholds = [0, 30]",
            "habitat_codes = [0, 1]",
            "habitat_codes = []",
            "min_buffer_distance = 0.0",
        ];
        for case in cases {
            let err = parse(&with(case)).unwrap_err();
            assert!(matches!(err, EvaluationError::Config { .. }), "{case}: {err}");
        }

        let bad_proportion = BASE.replace("0.12", "1.5");
        assert!(matches!(
            parse(&bad_proportion),
            Err(EvaluationError::Config { .. })
        ));
    }

    #[test]
    fn rejects_unsafe_species_codes() {
        assert!(is_valid_species_code("bHENSx"));
        assert!(is_valid_species_code("m_gapr-2"));
        assert!(!is_valid_species_code(""));
        assert!(!is_valid_species_code("../etc"));
        assert!(!is_valid_species_code("a/b"));
        assert!(!is_valid_species_code("a b"));
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        assert!(matches!(parse("species = "), Err(EvaluationError::Toml(_))));
    }

    #[test]
    fn load_resolves_relative_paths() {
        let dir = std::env::temp_dir().join("hab_eval_config_load_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("bhensx.toml");
        std::fs::write(&path, BASE).unwrap();

        let config = load(&path).unwrap();
        assert_eq!(config.raster, dir.join("rasters/bHENSx.tif"));
        assert_eq!(config.output_dir, dir.join("outputs"));
        assert_eq!(
            config.occurrences,
            OccurrenceSourceConfig::Csv {
                path: dir.join("occ.csv")
            }
        );
        let _ = std::fs::remove_dir_all(&dir);
    }
}
