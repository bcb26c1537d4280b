use crate::database::entities::devices;
use async_trait::async_trait;
use chrono::Utc;
use domain::DomainError;
use domain::device::{DeviceProfile, DeviceRepository};
use sea_orm::{DatabaseConnection, EntityTrait, QueryOrder, Set};

pub struct SeaOrmDeviceRepository {
    db: DatabaseConnection,
}

impl SeaOrmDeviceRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    fn model_to_profile(model: devices::Model) -> Result<DeviceProfile, DomainError> {
        let mut profile: DeviceProfile = serde_json::from_value(model.profile).map_err(|e| {
            DomainError::InvalidConfiguration(format!(
                "Stored profile of device {} is invalid: {}",
                model.id, e
            ))
        })?;
        // Column wins over the JSON copy so operators can disable a device in place
        profile.enabled = model.enabled;
        Ok(profile)
    }
}

fn storage_error(e: impl std::fmt::Display) -> DomainError {
    DomainError::Storage(format!("Database error: {}", e))
}

#[async_trait]
impl DeviceRepository for SeaOrmDeviceRepository {
    async fn save(&self, device: &DeviceProfile) -> Result<(), DomainError> {
        let now = Utc::now().fixed_offset();
        let profile_json = serde_json::to_value(device).map_err(storage_error)?;

        let active_model = devices::ActiveModel {
            id: Set(device.id.to_string()),
            name: Set(device.name.clone()),
            protocol: Set(device.protocol.as_str().to_string()),
            profile: Set(profile_json),
            enabled: Set(device.enabled),
            created_at: Set(now),
            updated_at: Set(now),
        };

        devices::Entity::insert(active_model)
            .on_conflict(
                sea_orm::sea_query::OnConflict::column(devices::Column::Id)
                    .update_columns([
                        devices::Column::Name,
                        devices::Column::Protocol,
                        devices::Column::Profile,
                        devices::Column::Enabled,
                        devices::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec(&self.db)
            .await
            .map_err(storage_error)?;

        Ok(())
    }

    async fn find_all(&self) -> Result<Vec<DeviceProfile>, DomainError> {
        let models = devices::Entity::find()
            .order_by_asc(devices::Column::Id)
            .all(&self.db)
            .await
            .map_err(storage_error)?;

        models.into_iter().map(Self::model_to_profile).collect()
    }
}
