use chrono::{SubsecRound, Utc};
use std::str::FromStr;
use thiserror::Error;

use crate::db::models::{Measurement, MeasurementId, NewMeasurement};
use crate::measurements::photos::PhotoStore;
use crate::measurements::store::{DynMeasurementStore, StoreError};
use crate::ranking::is_usable_weight;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("weight must be a number greater than zero")]
    InvalidWeight,

    #[error("photo must be a png or jpg image")]
    UnsupportedPhoto,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("could not save photo: {0}")]
    Photo(#[from] std::io::Error),
}

/// An image attached to a new measurement.
#[derive(Debug, Clone)]
pub struct PhotoUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Orderings the history tables are rendered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistoryView {
    /// Newest first.
    #[default]
    Recent,
    /// Grouped by username, oldest first within each user.
    ByUser,
}

impl HistoryView {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryView::Recent => "recent",
            HistoryView::ByUser => "by_user",
        }
    }

    /// Sort in place; stable, so equal keys keep insertion order.
    pub fn sort(&self, measurements: &mut [Measurement]) {
        match self {
            HistoryView::Recent => {
                measurements.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at))
            }
            HistoryView::ByUser => measurements.sort_by(|a, b| {
                a.username
                    .cmp(&b.username)
                    .then(a.recorded_at.cmp(&b.recorded_at))
            }),
        }
    }
}

impl FromStr for HistoryView {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "recent" => Ok(HistoryView::Recent),
            "by_user" => Ok(HistoryView::ByUser),
            other => Err(format!("unknown view: {other}")),
        }
    }
}

/// Parse a weight typed into the form. Accepts a decimal comma.
pub fn parse_weight(input: &str) -> Result<f64, RecordError> {
    let weight: f64 = input
        .trim()
        .replace(',', ".")
        .parse()
        .map_err(|_| RecordError::InvalidWeight)?;
    if is_usable_weight(weight) {
        Ok(weight)
    } else {
        Err(RecordError::InvalidWeight)
    }
}

/// Measurement log operations shared by the HTTP handlers.
#[derive(Clone)]
pub struct MeasurementService {
    store: DynMeasurementStore,
    photos: PhotoStore,
}

impl MeasurementService {
    pub fn new(store: DynMeasurementStore, photos: PhotoStore) -> Self {
        Self { store, photos }
    }

    pub fn photos(&self) -> &PhotoStore {
        &self.photos
    }

    pub async fn list_all(&self) -> Result<Vec<Measurement>, StoreError> {
        self.store.list_all().await
    }

    /// All records in the order a given table shows them.
    pub async fn history(&self, view: HistoryView) -> Result<Vec<Measurement>, StoreError> {
        let mut all = self.store.list_all().await?;
        view.sort(&mut all);
        Ok(all)
    }

    /// Record a weight for `username`, saving the photo first if present.
    pub async fn record(
        &self,
        username: &str,
        weight_kg: f64,
        photo: Option<PhotoUpload>,
    ) -> Result<Measurement, RecordError> {
        if !is_usable_weight(weight_kg) {
            return Err(RecordError::InvalidWeight);
        }

        let recorded_at = Utc::now().trunc_subsecs(6);

        let photo_ref = match photo {
            Some(upload) => {
                let ext = PhotoStore::accepted_extension(&upload.file_name)
                    .ok_or(RecordError::UnsupportedPhoto)?;
                Some(
                    self.photos
                        .save(username, &ext, recorded_at, &upload.bytes)
                        .await?,
                )
            }
            None => None,
        };

        let new = NewMeasurement {
            username: username.to_string(),
            recorded_at,
            weight_kg,
            photo_ref: photo_ref.clone(),
        };

        match self.store.append(new).await {
            Ok(measurement) => {
                tracing::info!(
                    "Recorded {:.2} kg for {} ({})",
                    measurement.weight_kg,
                    measurement.username,
                    measurement.id
                );
                Ok(measurement)
            }
            Err(e) => {
                if let Some(photo_ref) = photo_ref {
                    self.photos.remove_best_effort(&photo_ref).await;
                }
                Err(e.into())
            }
        }
    }

    /// Delete a record by id. Returns `false` when no such record exists.
    pub async fn delete_by_id(&self, id: &MeasurementId) -> Result<bool, StoreError> {
        let Some(removed) = self.store.delete(id).await? else {
            return Ok(false);
        };

        tracing::info!(
            "Deleted measurement {} ({} kg for {})",
            removed.id,
            removed.weight_kg,
            removed.username
        );
        if let Some(photo_ref) = removed.photo_ref.as_deref() {
            self.photos.remove_best_effort(photo_ref).await;
        }
        Ok(true)
    }

    /// Delete the record at `position` of the table rendered in `view` order.
    ///
    /// Prefer [`MeasurementService::delete_by_id`]: a position is only
    /// meaningful if nothing changed since the table was rendered.
    #[deprecated(note = "positions shift when the log changes; delete by id instead")]
    pub async fn delete_at(&self, position: usize, view: HistoryView) -> Result<bool, StoreError> {
        let rows = self.history(view).await?;
        match rows.get(position) {
            Some(target) => self.delete_by_id(&target.id).await,
            None => {
                tracing::debug!("Delete position {} out of range ({} rows)", position, rows.len());
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
#[allow(deprecated)]
mod tests {
    use super::*;
    use crate::measurements::csv_file::CsvMeasurementStore;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn service(temp: &TempDir) -> MeasurementService {
        let store = CsvMeasurementStore::open(temp.path().join("measurements.csv")).unwrap();
        MeasurementService::new(Arc::new(store), PhotoStore::new(temp.path().join("uploads")))
    }

    #[test]
    fn parse_weight_rules() {
        assert_eq!(parse_weight(" 72.5 ").unwrap(), 72.5);
        assert_eq!(parse_weight("72,5").unwrap(), 72.5);
        assert!(matches!(parse_weight("0"), Err(RecordError::InvalidWeight)));
        assert!(matches!(parse_weight("-3"), Err(RecordError::InvalidWeight)));
        assert!(matches!(parse_weight(""), Err(RecordError::InvalidWeight)));
        assert!(matches!(parse_weight("NaN"), Err(RecordError::InvalidWeight)));
        assert!(matches!(parse_weight("abc"), Err(RecordError::InvalidWeight)));
    }

    #[tokio::test]
    async fn record_rejects_invalid_input_without_storing() {
        let temp = TempDir::new().unwrap();
        let svc = service(&temp);

        assert!(matches!(
            svc.record("Ana", 0.0, None).await,
            Err(RecordError::InvalidWeight)
        ));
        let bad_photo = PhotoUpload {
            file_name: "scale.gif".into(),
            bytes: vec![1, 2, 3],
        };
        assert!(matches!(
            svc.record("Ana", 70.0, Some(bad_photo)).await,
            Err(RecordError::UnsupportedPhoto)
        ));
        assert!(svc.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn record_with_photo_and_delete_removes_blob() {
        let temp = TempDir::new().unwrap();
        let svc = service(&temp);
        let photo = PhotoUpload {
            file_name: "scale.jpeg".into(),
            bytes: b"jpeg bytes".to_vec(),
        };

        let stored = svc.record("Ana", 70.2, Some(photo)).await.unwrap();
        let photo_ref = stored.photo_ref.clone().unwrap();
        let blob = svc.photos().resolve(&photo_ref).unwrap();
        assert!(blob.exists());

        assert!(svc.delete_by_id(&stored.id).await.unwrap());
        assert!(!blob.exists());
        assert!(!svc.delete_by_id(&stored.id).await.unwrap());
    }

    #[tokio::test]
    async fn delete_survives_missing_blob() {
        let temp = TempDir::new().unwrap();
        let svc = service(&temp);
        let photo = PhotoUpload {
            file_name: "scale.png".into(),
            bytes: b"png".to_vec(),
        };
        let stored = svc.record("Ana", 70.0, Some(photo)).await.unwrap();
        std::fs::remove_file(svc.photos().resolve(stored.photo_ref.as_deref().unwrap()).unwrap())
            .unwrap();

        assert!(svc.delete_by_id(&stored.id).await.unwrap());
        assert!(svc.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_at_out_of_range_leaves_log_unchanged() {
        let temp = TempDir::new().unwrap();
        let svc = service(&temp);
        svc.record("Ana", 80.0, None).await.unwrap();
        svc.record("Bruno", 90.0, None).await.unwrap();
        let before = svc.list_all().await.unwrap();

        assert!(!svc.delete_at(2, HistoryView::Recent).await.unwrap());
        assert!(!svc.delete_at(99, HistoryView::ByUser).await.unwrap());
        assert_eq!(svc.list_all().await.unwrap(), before);
    }

    #[tokio::test]
    async fn delete_at_resolves_position_against_view() {
        let temp = TempDir::new().unwrap();
        let svc = service(&temp);
        let zed = svc.record("Zed", 80.0, None).await.unwrap();
        let ana = svc.record("Ana", 90.0, None).await.unwrap();

        // ByUser puts Ana first even though Zed was stored first.
        assert!(svc.delete_at(0, HistoryView::ByUser).await.unwrap());
        assert_eq!(svc.list_all().await.unwrap(), vec![zed]);
        assert!(!svc.delete_by_id(&ana.id).await.unwrap());
    }

    #[test]
    fn recent_view_is_newest_first() {
        use chrono::{Duration, TimeZone};
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let mk = |name: &str, minutes: i64| Measurement {
            id: MeasurementId::generate(),
            username: name.to_string(),
            recorded_at: base + Duration::minutes(minutes),
            weight_kg: 70.0,
            photo_ref: None,
        };
        let mut rows = vec![mk("B", 1), mk("A", 3), mk("A", 2)];

        HistoryView::Recent.sort(&mut rows);
        let order: Vec<i64> = rows
            .iter()
            .map(|m| (m.recorded_at - base).num_minutes())
            .collect();
        assert_eq!(order, vec![3, 2, 1]);

        HistoryView::ByUser.sort(&mut rows);
        let order: Vec<(&str, i64)> = rows
            .iter()
            .map(|m| (m.username.as_str(), (m.recorded_at - base).num_minutes()))
            .collect();
        assert_eq!(order, vec![("A", 2), ("A", 3), ("B", 1)]);
        assert_eq!("by_user".parse::<HistoryView>().unwrap(), HistoryView::ByUser);
    }
}
