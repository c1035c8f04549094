use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

use crate::db::models::{Measurement, MeasurementId, NewMeasurement};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] r2d2::Error),

    #[error("SQL error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt measurement log: {0}")]
    Corrupt(String),
}

/// Persistence for the measurement log.
///
/// Implementations keep records in insertion order; callers sort as needed.
#[async_trait]
pub trait MeasurementStore: Send + Sync {
    /// Store a new record and return it with its generated id.
    async fn append(&self, new: NewMeasurement) -> Result<Measurement, StoreError>;

    /// Remove a record by id, returning it if it existed.
    async fn delete(&self, id: &MeasurementId) -> Result<Option<Measurement>, StoreError>;

    /// Every record, oldest insert first.
    async fn list_all(&self) -> Result<Vec<Measurement>, StoreError>;
}

pub type DynMeasurementStore = Arc<dyn MeasurementStore>;
