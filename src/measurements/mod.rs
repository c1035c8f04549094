pub mod csv_file;
pub mod photos;
pub mod service;
pub mod sqlite;
pub mod store;

use std::sync::Arc;

pub use csv_file::CsvMeasurementStore;
pub use photos::PhotoStore;
pub use service::{parse_weight, HistoryView, MeasurementService, PhotoUpload, RecordError};
pub use sqlite::SqliteMeasurementStore;
pub use store::{DynMeasurementStore, MeasurementStore, StoreError};

use crate::config::{Config, StorageBackend};
use crate::state::DbPool;

/// Build the configured measurement store.
pub fn open_store(config: &Config, pool: &DbPool) -> anyhow::Result<DynMeasurementStore> {
    let store: DynMeasurementStore = match config.storage.backend {
        StorageBackend::Sqlite => Arc::new(SqliteMeasurementStore::new(pool.clone())),
        StorageBackend::Csv => {
            let path = config.measurements_csv_path();
            tracing::info!("Measurement log: {}", path.display());
            Arc::new(CsvMeasurementStore::open(path)?)
        }
    };
    Ok(store)
}
