use async_trait::async_trait;
use chrono::{DateTime, Local, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use crate::db::models::{Measurement, MeasurementId, NewMeasurement};
use crate::measurements::store::{MeasurementStore, StoreError};
use crate::ranking::is_usable_weight;

/// Measurement log kept in a single CSV file, rewritten on every change.
///
/// Files written by older deployments (`username,datetime,peso,foto_path`)
/// are read as-is and upgraded with an `id` column the first time they are
/// opened. Lines that cannot be parsed are left out of listings but carried
/// through every rewrite.
pub struct CsvMeasurementStore {
    path: PathBuf,
    lock: Mutex<()>,
}

/// Column order of files this store writes.
const COLUMNS: [&str; 5] = ["id", "username", "recorded_at", "weight_kg", "photo_ref"];

/// Accepted header names for each entry of [`COLUMNS`].
const COLUMN_NAMES: [&[&str]; 5] = [
    &["id"],
    &["username"],
    &["recorded_at", "datetime"],
    &["weight_kg", "peso"],
    &["photo_ref", "foto_path"],
];

/// A row as found on disk. Every column is kept as text so one bad value
/// only drops its own row.
#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(default)]
    id: Option<String>,
    username: String,
    #[serde(alias = "datetime")]
    recorded_at: String,
    #[serde(alias = "peso")]
    weight_kg: String,
    #[serde(alias = "foto_path", default)]
    photo_ref: Option<String>,
}

#[derive(Debug, Serialize)]
struct CsvRecord<'a> {
    id: &'a str,
    username: &'a str,
    recorded_at: String,
    weight_kg: f64,
    photo_ref: &'a str,
}

impl<'a> From<&'a Measurement> for CsvRecord<'a> {
    fn from(m: &'a Measurement) -> Self {
        CsvRecord {
            id: m.id.as_str(),
            username: &m.username,
            recorded_at: m.recorded_at.to_rfc3339_opts(SecondsFormat::Micros, true),
            weight_kg: m.weight_kg,
            photo_ref: m.photo_ref.as_deref().unwrap_or(""),
        }
    }
}

#[derive(Debug)]
enum Entry {
    Row(Measurement),
    /// A line that did not parse, already laid out in [`COLUMNS`] order.
    Unreadable(csv::StringRecord),
}

/// Result of reading the whole file.
#[derive(Debug, Default)]
struct Loaded {
    entries: Vec<Entry>,
    /// Some rows had no id and were given a positional one.
    missing_ids: bool,
}

impl Loaded {
    fn rows(&self) -> impl Iterator<Item = &Measurement> {
        self.entries.iter().filter_map(|entry| match entry {
            Entry::Row(m) => Some(m),
            Entry::Unreadable(_) => None,
        })
    }
}

impl CsvMeasurementStore {
    /// Open the log at `path`, creating parent directories and assigning
    /// ids to legacy rows.
    ///
    /// An unreadable file does not stop startup: it lists as empty and
    /// refuses changes until it is repaired.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        match load(&path) {
            Ok(mut loaded) if loaded.missing_ids => {
                let mut assigned = 0;
                for entry in &mut loaded.entries {
                    if let Entry::Row(m) = entry {
                        if m.id.as_str().starts_with("line-") {
                            m.id = MeasurementId::generate();
                            assigned += 1;
                        }
                    }
                }
                write_all(&path, &loaded.entries)?;
                tracing::info!(
                    "Assigned ids to {} legacy measurements in {}",
                    assigned,
                    path.display()
                );
            }
            Ok(_) => {}
            Err(e) => tracing::error!(
                "Measurement log {} is unreadable; it will list as empty and refuse changes: {}",
                path.display(),
                e
            ),
        }

        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl MeasurementStore for CsvMeasurementStore {
    async fn append(&self, new: NewMeasurement) -> Result<Measurement, StoreError> {
        let _guard = self.lock.lock().await;
        let mut loaded = load(&self.path)?;

        let measurement = new.into_measurement(MeasurementId::generate());
        loaded.entries.push(Entry::Row(measurement.clone()));
        write_all(&self.path, &loaded.entries)?;

        Ok(measurement)
    }

    async fn delete(&self, id: &MeasurementId) -> Result<Option<Measurement>, StoreError> {
        let _guard = self.lock.lock().await;
        let mut loaded = load(&self.path)?;

        let Some(index) = loaded
            .entries
            .iter()
            .position(|entry| matches!(entry, Entry::Row(m) if &m.id == id))
        else {
            return Ok(None);
        };
        let Entry::Row(removed) = loaded.entries.remove(index) else {
            return Ok(None);
        };
        write_all(&self.path, &loaded.entries)?;

        Ok(Some(removed))
    }

    async fn list_all(&self) -> Result<Vec<Measurement>, StoreError> {
        let _guard = self.lock.lock().await;
        match load(&self.path) {
            Ok(loaded) => Ok(loaded.rows().cloned().collect()),
            Err(e) => {
                tracing::error!(
                    "Measurement log {} is unreadable, showing it as empty: {}",
                    self.path.display(),
                    e
                );
                Ok(Vec::new())
            }
        }
    }
}

/// Read the whole file. Fails only when the file or its header is unusable;
/// bad data lines are kept as [`Entry::Unreadable`].
fn load(path: &Path) -> Result<Loaded, StoreError> {
    if !path.exists() {
        return Ok(Loaded::default());
    }

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)?;
    let headers = reader.headers()?.clone();
    if headers.iter().all(str::is_empty) {
        return Ok(Loaded::default());
    }
    let positions = column_positions(&headers)?;

    let mut loaded = Loaded::default();
    for (index, result) in reader.records().enumerate() {
        let line = index + 1;
        let record = result?;

        let parsed = record
            .deserialize::<CsvRow>(Some(&headers))
            .map_err(|e| e.to_string())
            .and_then(|row| parse_row(row, line));
        match parsed {
            Ok((measurement, had_id)) => {
                loaded.missing_ids |= !had_id;
                loaded.entries.push(Entry::Row(measurement));
            }
            Err(reason) => {
                tracing::warn!("Skipping line {} of {}: {}", line, path.display(), reason);
                loaded
                    .entries
                    .push(Entry::Unreadable(reorder(&record, &positions)));
            }
        }
    }

    Ok(loaded)
}

/// Where each of [`COLUMNS`] sits in the file's header.
fn column_positions(headers: &csv::StringRecord) -> Result<[Option<usize>; 5], StoreError> {
    let mut positions = [None; 5];
    for (slot, names) in positions.iter_mut().zip(COLUMN_NAMES) {
        *slot = headers.iter().position(|h| names.contains(&h));
    }
    // id and photo_ref are optional.
    for required in [1, 2, 3] {
        if positions[required].is_none() {
            return Err(StoreError::Corrupt(format!(
                "header {:?} has no {} column",
                headers.iter().collect::<Vec<_>>(),
                COLUMNS[required]
            )));
        }
    }
    Ok(positions)
}

fn reorder(record: &csv::StringRecord, positions: &[Option<usize>; 5]) -> csv::StringRecord {
    positions
        .iter()
        .map(|pos| pos.and_then(|i| record.get(i)).unwrap_or(""))
        .collect()
}

fn parse_row(row: CsvRow, line: usize) -> Result<(Measurement, bool), String> {
    let username = row.username.trim().to_string();
    if username.is_empty() {
        return Err("missing username".into());
    }

    let weight_kg: f64 = row
        .weight_kg
        .parse()
        .map_err(|_| format!("weight {:?} is not a number", row.weight_kg))?;
    if !is_usable_weight(weight_kg) {
        return Err(format!("weight {} is not positive", weight_kg));
    }

    let recorded_at = parse_timestamp(&row.recorded_at)
        .ok_or_else(|| format!("timestamp {:?} is not recognised", row.recorded_at))?;

    let (id, had_id) = match row.id.filter(|id| !id.is_empty()) {
        Some(id) => (MeasurementId(id), true),
        None => (MeasurementId(format!("line-{line}")), false),
    };

    Ok((
        Measurement {
            id,
            username,
            recorded_at,
            weight_kg,
            photo_ref: row.photo_ref.filter(|p| !p.is_empty()),
        },
        had_id,
    ))
}

/// RFC 3339, or the naive local `YYYY-mm-dd HH:MM:SS` of older files.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f").ok()?;
    naive
        .and_local_timezone(Local)
        .earliest()
        .map(|at| at.with_timezone(&Utc))
}

/// Replace the file in one rename so readers never see half a log.
fn write_all(path: &Path, entries: &[Entry]) -> Result<(), StoreError> {
    let tmp = path.with_extension("csv.tmp");
    {
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&tmp)?;
        writer.write_record(COLUMNS)?;
        for entry in entries {
            match entry {
                Entry::Row(measurement) => writer.serialize(CsvRecord::from(measurement))?,
                Entry::Unreadable(record) => writer.write_record(record)?,
            }
        }
        writer.flush()?;
    }
    std::fs::rename(&tmp, path)?;
    Ok(())
}
