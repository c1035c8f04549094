use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, OptionalExtension, Row};

use crate::db::models::{Measurement, MeasurementId, NewMeasurement};
use crate::measurements::store::{MeasurementStore, StoreError};
use crate::state::DbPool;

/// Measurement log kept in the `measurements` table.
pub struct SqliteMeasurementStore {
    pool: DbPool,
}

impl SqliteMeasurementStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

type RawRow = (String, String, String, f64, Option<String>);

fn read_row(row: &Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
    ))
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .ok()
}

fn into_measurement((id, username, recorded_at, weight_kg, photo_ref): RawRow) -> Option<Measurement> {
    let Some(at) = parse_timestamp(&recorded_at) else {
        tracing::warn!("Skipping measurement {} with bad timestamp {:?}", id, recorded_at);
        return None;
    };
    Some(Measurement {
        id: MeasurementId(id),
        username,
        recorded_at: at,
        weight_kg,
        photo_ref,
    })
}

#[async_trait]
impl MeasurementStore for SqliteMeasurementStore {
    async fn append(&self, new: NewMeasurement) -> Result<Measurement, StoreError> {
        let conn = self.pool.get()?;
        let measurement = new.into_measurement(MeasurementId::generate());

        conn.execute(
            "INSERT INTO measurements (id, username, recorded_at, weight_kg, photo_ref)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                measurement.id.as_str(),
                measurement.username,
                measurement
                    .recorded_at
                    .to_rfc3339_opts(SecondsFormat::Micros, true),
                measurement.weight_kg,
                measurement.photo_ref,
            ],
        )?;

        Ok(measurement)
    }

    async fn delete(&self, id: &MeasurementId) -> Result<Option<Measurement>, StoreError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;

        let existing = tx
            .query_row(
                "SELECT id, username, recorded_at, weight_kg, photo_ref
                 FROM measurements WHERE id = ?1",
                params![id.as_str()],
                read_row,
            )
            .optional()?;

        let Some(raw) = existing else {
            return Ok(None);
        };

        tx.execute("DELETE FROM measurements WHERE id = ?1", params![id.as_str()])?;
        tx.commit()?;

        // The row is gone even if its timestamp no longer parses.
        let (raw_id, username, recorded_at, weight_kg, photo_ref) = raw;
        let removed = Measurement {
            id: MeasurementId(raw_id),
            username,
            recorded_at: parse_timestamp(&recorded_at).unwrap_or_default(),
            weight_kg,
            photo_ref,
        };
        Ok(Some(removed))
    }

    async fn list_all(&self) -> Result<Vec<Measurement>, StoreError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, username, recorded_at, weight_kg, photo_ref
             FROM measurements ORDER BY seq",
        )?;
        let rows = stmt
            .query_map([], read_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows.into_iter().filter_map(into_measurement).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    fn create_test_store() -> (SqliteMeasurementStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let pool = db::create_pool(&temp_dir.path().join("test.db")).unwrap();
        db::run_migrations(&pool).unwrap();
        (SqliteMeasurementStore::new(pool), temp_dir)
    }

    fn new_measurement(username: &str, minutes: i64, weight: f64) -> NewMeasurement {
        NewMeasurement {
            username: username.to_string(),
            recorded_at: Utc.with_ymd_and_hms(2024, 3, 1, 7, 30, 0).unwrap()
                + Duration::minutes(minutes),
            weight_kg: weight,
            photo_ref: None,
        }
    }

    #[tokio::test]
    async fn append_adds_exactly_one_matching_record() {
        let (store, _temp) = create_test_store();
        store.append(new_measurement("Ana", 0, 81.0)).await.unwrap();
        let before = store.list_all().await.unwrap().len();

        let input = new_measurement("Bruno", 5, 92.4);
        let stored = store.append(input.clone()).await.unwrap();
        let all = store.list_all().await.unwrap();

        assert_eq!(all.len(), before + 1);
        let last = all.last().unwrap();
        assert_eq!(last, &stored);
        assert_eq!(last.username, input.username);
        assert_eq!(last.weight_kg, input.weight_kg);
        assert_eq!(last.recorded_at, input.recorded_at);
    }

    #[tokio::test]
    async fn list_all_keeps_insertion_order() {
        let (store, _temp) = create_test_store();
        store.append(new_measurement("Ana", 10, 80.0)).await.unwrap();
        store.append(new_measurement("Bruno", 0, 90.0)).await.unwrap();
        store.append(new_measurement("Ana", 5, 79.0)).await.unwrap();

        let weights: Vec<f64> = store
            .list_all()
            .await
            .unwrap()
            .iter()
            .map(|m| m.weight_kg)
            .collect();
        assert_eq!(weights, vec![80.0, 90.0, 79.0]);
    }

    #[tokio::test]
    async fn delete_removes_only_the_requested_record() {
        let (store, _temp) = create_test_store();
        let keep = store.append(new_measurement("Ana", 0, 80.0)).await.unwrap();
        let mut doomed = new_measurement("Ana", 1, 79.0);
        doomed.photo_ref = Some("Ana_20240301_073100.jpg".into());
        let doomed = store.append(doomed).await.unwrap();

        let removed = store.delete(&doomed.id).await.unwrap();
        assert_eq!(removed, Some(doomed));
        assert_eq!(store.list_all().await.unwrap(), vec![keep]);
    }

    #[tokio::test]
    async fn delete_unknown_id_is_a_no_op() {
        let (store, _temp) = create_test_store();
        store.append(new_measurement("Ana", 0, 80.0)).await.unwrap();
        let before = store.list_all().await.unwrap();

        let removed = store.delete(&MeasurementId::new("missing")).await.unwrap();
        assert!(removed.is_none());
        assert_eq!(store.list_all().await.unwrap(), before);
    }
}
