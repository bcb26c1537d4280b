mod device_repository;
mod telemetry_store;

pub mod entities;
pub mod sqlite_buffer;

pub use device_repository::SeaOrmDeviceRepository;
pub use sqlite_buffer::{BufferedMessage, SQLiteBuffer};
pub use telemetry_store::SeaOrmTelemetryStore;

use anyhow::Result;
use migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection};

/// Connect to the listener store and bring its schema up to date
pub async fn connect_and_migrate(database_url: &str) -> Result<DatabaseConnection> {
    let db = Database::connect(database_url).await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}
