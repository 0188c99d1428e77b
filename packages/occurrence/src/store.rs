//! Per-species `DuckDB` occurrence storage.
//!
//! Each species gets its own `DuckDB` file at `{dir}/{species}.duckdb`. The
//! file contains an `occurrences` table and a `_meta` table recording where
//! and when the records were retrieved.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use duckdb::Connection;

use crate::{OccurrenceError, OccurrencePoint, OccurrenceSource};

/// Number of rows per INSERT chunk.
const CHUNK_SIZE: usize = 2_000;

/// Returns the store path for `species` under `dir`.
#[must_use]
pub fn db_path(dir: &Path, species: &str) -> PathBuf {
    dir.join(format!("{species}.duckdb"))
}

/// Opens (or creates) an occurrence database and ensures the schema exists.
///
/// # Errors
///
/// Returns [`OccurrenceError`] if the directory, connection, or schema
/// cannot be created.
pub fn open(path: &Path) -> Result<Connection, OccurrenceError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(path)?;
    create_schema(&conn)?;
    Ok(conn)
}

fn create_schema(conn: &Connection) -> Result<(), OccurrenceError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS occurrences (
            occ_id TEXT NOT NULL PRIMARY KEY,
            longitude DOUBLE NOT NULL,
            latitude DOUBLE NOT NULL,
            coordinate_uncertainty_m DOUBLE
        );

        CREATE TABLE IF NOT EXISTS _meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );",
    )?;
    Ok(())
}

/// Inserts or updates occurrences, keyed by `occ_id`.
///
/// When the batch repeats an id, the last record wins.
///
/// Returns the number of rows affected.
///
/// # Errors
///
/// Returns [`OccurrenceError`] if any database operation fails.
pub fn upsert_occurrences(
    conn: &Connection,
    points: &[OccurrencePoint],
) -> Result<u64, OccurrenceError> {
    if points.is_empty() {
        return Ok(0);
    }

    let mut last_seen: BTreeMap<&str, usize> = BTreeMap::new();
    for (i, point) in points.iter().enumerate() {
        last_seen.insert(&point.id, i);
    }
    let deduped: Vec<&OccurrencePoint> = points
        .iter()
        .enumerate()
        .filter(|(i, p)| last_seen.get(p.id.as_str()) == Some(i))
        .map(|(_, p)| p)
        .collect();

    if deduped.len() < points.len() {
        log::debug!(
            "Deduplicated occurrence batch: {} -> {} rows",
            points.len(),
            deduped.len()
        );
    }

    let mut total = 0u64;

    for chunk in deduped.chunks(CHUNK_SIZE) {
        let mut sql = String::from(
            "INSERT INTO occurrences (occ_id, longitude, latitude, coordinate_uncertainty_m) VALUES ",
        );
        for i in 0..chunk.len() {
            if i > 0 {
                sql.push_str(", ");
            }
            sql.push_str("(?, ?, ?, ?)");
        }
        sql.push_str(
            " ON CONFLICT (occ_id) DO UPDATE SET
                longitude = EXCLUDED.longitude,
                latitude = EXCLUDED.latitude,
                coordinate_uncertainty_m = EXCLUDED.coordinate_uncertainty_m",
        );

        let mut stmt = conn.prepare(&sql)?;
        let mut param_idx = 1usize;

        for point in chunk {
            stmt.raw_bind_parameter(param_idx, &point.id)?;
            stmt.raw_bind_parameter(param_idx + 1, point.longitude)?;
            stmt.raw_bind_parameter(param_idx + 2, point.latitude)?;
            stmt.raw_bind_parameter(param_idx + 3, point.coordinate_uncertainty_m)?;
            param_idx += 4;
        }

        let rows = stmt.raw_execute()?;
        total += u64::try_from(rows).unwrap_or(0);
    }

    Ok(total)
}

/// Returns every stored occurrence ordered by id.
///
/// # Errors
///
/// Returns [`OccurrenceError`] if the query fails.
pub fn fetch_all(conn: &Connection) -> Result<Vec<OccurrencePoint>, OccurrenceError> {
    let mut stmt = conn.prepare(
        "SELECT occ_id, longitude, latitude, coordinate_uncertainty_m
         FROM occurrences ORDER BY occ_id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(OccurrencePoint {
            id: row.get(0)?,
            longitude: row.get(1)?,
            latitude: row.get(2)?,
            coordinate_uncertainty_m: row.get(3)?,
        })
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

/// Returns the number of stored occurrences.
///
/// # Errors
///
/// Returns [`OccurrenceError`] if the query fails.
pub fn record_count(conn: &Connection) -> Result<u64, OccurrenceError> {
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM occurrences", [], |row| row.get(0))?;
    Ok(u64::try_from(count).unwrap_or(0))
}

/// Gets a metadata value from the `_meta` table.
///
/// # Errors
///
/// Returns [`OccurrenceError`] if the query fails.
pub fn get_meta(conn: &Connection, key: &str) -> Result<Option<String>, OccurrenceError> {
    let result = conn.query_row("SELECT value FROM _meta WHERE key = ?", [key], |row| {
        row.get(0)
    });
    match result {
        Ok(v) => Ok(Some(v)),
        Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(OccurrenceError::DuckDb(e)),
    }
}

/// Sets a metadata value in the `_meta` table.
///
/// # Errors
///
/// Returns [`OccurrenceError`] if the upsert fails.
pub fn set_meta(conn: &Connection, key: &str, value: &str) -> Result<(), OccurrenceError> {
    conn.execute(
        "INSERT INTO _meta (key, value) VALUES (?, ?)
         ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value",
        duckdb::params![key, value],
    )?;
    Ok(())
}

/// A directory of per-species occurrence databases.
#[derive(Debug, Clone)]
pub struct DuckDbOccurrenceStore {
    dir: PathBuf,
}

impl DuckDbOccurrenceStore {
    /// Creates a store rooted at `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the database path for `species`.
    #[must_use]
    pub fn path_for(&self, species: &str) -> PathBuf {
        db_path(&self.dir, species)
    }

    /// Returns the number of stored occurrences, or `None` if the species
    /// has no database.
    ///
    /// # Errors
    ///
    /// Returns [`OccurrenceError`] if an existing database cannot be read.
    pub fn count(&self, species: &str) -> Result<Option<u64>, OccurrenceError> {
        let path = self.path_for(species);
        if !path.exists() {
            return Ok(None);
        }
        let conn = open(&path)?;
        record_count(&conn).map(Some)
    }

    /// Upserts downloaded occurrences for `species` and records the name
    /// and taxon key they were retrieved under.
    ///
    /// Returns the number of occurrences in the store afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`OccurrenceError`] if the database cannot be written.
    pub fn save(
        &self,
        species: &str,
        scientific_name: &str,
        taxon_key: u64,
        points: &[OccurrencePoint],
    ) -> Result<u64, OccurrenceError> {
        let path = self.path_for(species);
        let conn = open(&path)?;
        upsert_occurrences(&conn, points)?;
        set_meta(&conn, "scientific_name", scientific_name)?;
        set_meta(&conn, "taxon_key", &taxon_key.to_string())?;
        let total = record_count(&conn)?;
        log::info!(
            "Stored {} occurrences for {species} in {} ({total} total)",
            points.len(),
            path.display()
        );
        Ok(total)
    }
}

impl OccurrenceSource for DuckDbOccurrenceStore {
    fn fetch_occurrences(&self, species: &str) -> Result<Vec<OccurrencePoint>, OccurrenceError> {
        let path = self.path_for(species);
        if !path.exists() {
            return Err(OccurrenceError::MissingStore {
                species: species.to_string(),
                path: path.display().to_string(),
            });
        }
        let conn = open(&path)?;
        let points = fetch_all(&conn)?;
        log::debug!(
            "Read {} occurrences for {species} from {}",
            points.len(),
            path.display()
        );
        Ok(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("hab_eval_store_test_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    fn point(id: &str, unc: Option<f64>) -> OccurrencePoint {
        OccurrencePoint {
            id: id.to_string(),
            longitude: -88.0,
            latitude: 36.5,
            coordinate_uncertainty_m: unc,
        }
    }

    #[test]
    fn upsert_replaces_existing_ids() {
        let dir = temp_dir("upsert");
        let conn = open(&db_path(&dir, "mgaprx")).unwrap();

        upsert_occurrences(&conn, &[point("1", Some(50.0)), point("2", None)]).unwrap();
        upsert_occurrences(&conn, &[point("2", Some(8.0)), point("3", Some(1.0))]).unwrap();

        assert_eq!(record_count(&conn).unwrap(), 3);
        let all = fetch_all(&conn).unwrap();
        assert_eq!(all[1].id, "2");
        assert_eq!(all[1].coordinate_uncertainty_m, Some(8.0));
        assert_eq!(all[0].coordinate_uncertainty_m, Some(50.0));

        drop(conn);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn batch_duplicates_keep_last() {
        let dir = temp_dir("dupes");
        let conn = open(&db_path(&dir, "x")).unwrap();
        upsert_occurrences(&conn, &[point("1", Some(5.0)), point("1", Some(9.0))]).unwrap();
        let all = fetch_all(&conn).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].coordinate_uncertainty_m, Some(9.0));
        drop(conn);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn meta_round_trip() {
        let dir = temp_dir("meta");
        let conn = open(&db_path(&dir, "x")).unwrap();
        assert_eq!(get_meta(&conn, "taxon_key").unwrap(), None);
        set_meta(&conn, "taxon_key", "2491123").unwrap();
        set_meta(&conn, "taxon_key", "2491124").unwrap();
        assert_eq!(
            get_meta(&conn, "taxon_key").unwrap().as_deref(),
            Some("2491124")
        );
        drop(conn);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn store_reports_missing_species() {
        let dir = temp_dir("missing");
        let store = DuckDbOccurrenceStore::new(&dir);
        assert!(matches!(
            store.fetch_occurrences("nothere"),
            Err(OccurrenceError::MissingStore { .. })
        ));
        assert_eq!(store.count("nothere").unwrap(), None);

        let conn = open(&store.path_for("here")).unwrap();
        upsert_occurrences(&conn, &[point("a", None)]).unwrap();
        drop(conn);

        assert_eq!(store.count("here").unwrap(), Some(1));
        assert_eq!(store.fetch_occurrences("here").unwrap().len(), 1);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn save_records_download_metadata() {
        let dir = temp_dir("save");
        let store = DuckDbOccurrenceStore::new(&dir);
        let total = store
            .save("bhensx", "Buteo lineatus", 2_480_537, &[point("1", None), point("2", Some(3.0))])
            .unwrap();
        assert_eq!(total, 2);
        let total = store
            .save("bhensx", "Buteo lineatus", 2_480_537, &[point("2", Some(4.0))])
            .unwrap();
        assert_eq!(total, 2);

        let conn = open(&store.path_for("bhensx")).unwrap();
        assert_eq!(get_meta(&conn, "taxon_key").unwrap().as_deref(), Some("2480537"));
        assert_eq!(
            get_meta(&conn, "scientific_name").unwrap().as_deref(),
            Some("Buteo lineatus")
        );
        drop(conn);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
