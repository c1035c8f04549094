use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::config::Config;
use crate::measurements::{open_store, MeasurementService, PhotoStore};

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub measurements: MeasurementService,
}

impl AppState {
    /// Open storage, apply migrations and seed configured accounts.
    pub fn initialize(config: Config) -> anyhow::Result<Self> {
        let db = crate::db::create_pool(&config.db_path())?;
        crate::db::run_migrations(&db)?;
        crate::db::seed_users(&db, &config.users, config.auth.bcrypt_cost)?;
        match crate::auth::session::purge_expired(&db) {
            Ok(0) => {}
            Ok(n) => tracing::info!("Purged {} expired sessions", n),
            Err(e) => tracing::warn!("Could not purge expired sessions: {}", e),
        }

        let uploads = config.uploads_path();
        std::fs::create_dir_all(&uploads)?;

        let store = open_store(&config, &db)?;
        let measurements = MeasurementService::new(store, PhotoStore::new(uploads));

        Ok(Self {
            db,
            config,
            measurements,
        })
    }
}
