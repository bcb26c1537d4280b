use crate::database::entities::{billing_periods, device_readings, metric_samples};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::DomainError;
use domain::device::DeviceId;
use domain::metric::{BillingStatement, MetricSample};
use domain::reading::{Reading, ReadingSource};
use domain::store::TelemetryStore;
use sea_orm::sea_query::OnConflict;
use sea_orm::{DatabaseConnection, EntityTrait, Set};
use tracing::warn;

pub struct SeaOrmTelemetryStore {
    db: DatabaseConnection,
}

impl SeaOrmTelemetryStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    fn source_str(source: ReadingSource) -> &'static str {
        match source {
            ReadingSource::Telemetry => "telemetry",
            ReadingSource::PollResponse => "poll_response",
        }
    }

    fn model_to_reading(model: device_readings::Model) -> Result<Reading, DomainError> {
        let source = match model.source.as_str() {
            "telemetry" => ReadingSource::Telemetry,
            "poll_response" => ReadingSource::PollResponse,
            other => {
                return Err(DomainError::Storage(format!(
                    "Unknown reading source: {}",
                    other
                )));
            }
        };

        Ok(Reading {
            device_id: DeviceId::new(model.device_id)?,
            payload: model.payload,
            measured_at: model.measured_at.with_timezone(&Utc),
            received_at: model.received_at.with_timezone(&Utc),
            source,
        })
    }
}

fn storage_error(e: impl std::fmt::Display) -> DomainError {
    DomainError::Storage(format!("Database error: {}", e))
}

#[async_trait]
impl TelemetryStore for SeaOrmTelemetryStore {
    async fn save_reading(&self, reading: &Reading) -> Result<(), DomainError> {
        let model = device_readings::ActiveModel {
            device_id: Set(reading.device_id.to_string()),
            payload: Set(reading.payload.clone()),
            source: Set(Self::source_str(reading.source).to_string()),
            measured_at: Set(reading.measured_at.fixed_offset()),
            received_at: Set(reading.received_at.fixed_offset()),
        };

        device_readings::Entity::insert(model)
            .on_conflict(
                OnConflict::column(device_readings::Column::DeviceId)
                    .update_columns([
                        device_readings::Column::Payload,
                        device_readings::Column::Source,
                        device_readings::Column::MeasuredAt,
                        device_readings::Column::ReceivedAt,
                    ])
                    .to_owned(),
            )
            .exec(&self.db)
            .await
            .map_err(storage_error)?;
        Ok(())
    }

    async fn load_readings(&self) -> Result<Vec<Reading>, DomainError> {
        let models = device_readings::Entity::find()
            .all(&self.db)
            .await
            .map_err(storage_error)?;

        // A bad row must not keep the rest of the cache cold
        Ok(models
            .into_iter()
            .filter_map(|m| {
                let device_id = m.device_id.clone();
                match Self::model_to_reading(m) {
                    Ok(reading) => Some(reading),
                    Err(e) => {
                        warn!(device_id = %device_id, "Skipping stored reading: {}", e);
                        None
                    }
                }
            })
            .collect())
    }

    async fn save_metric(&self, sample: &MetricSample) -> Result<(), DomainError> {
        let model = metric_samples::ActiveModel {
            metric_key: Set(sample.key.to_string()),
            headline: Set(sample.headline()),
            quality: Set(sample.quality.as_str().to_string()),
            sample: Set(serde_json::to_value(sample).map_err(storage_error)?),
            computed_at: Set(sample.computed_at.fixed_offset()),
            ..Default::default()
        };

        metric_samples::Entity::insert(model)
            .exec(&self.db)
            .await
            .map_err(storage_error)?;
        Ok(())
    }

    async fn save_billing(&self, statement: &BillingStatement) -> Result<(), DomainError> {
        let now: DateTime<Utc> = Utc::now();
        let model = billing_periods::ActiveModel {
            tenant_id: Set(statement.tenant_id.clone()),
            period: Set(statement.period.clone()),
            consumption_kwh: Set(statement.consumption_kwh),
            tariff_per_kwh: Set(statement.tariff_per_kwh),
            fixed_charge: Set(statement.fixed_charge),
            cost: Set(statement.cost),
            currency: Set(statement.currency.clone()),
            closed: Set(statement.closed),
            updated_at: Set(now.fixed_offset()),
        };

        billing_periods::Entity::insert(model)
            .on_conflict(
                OnConflict::columns([
                    billing_periods::Column::TenantId,
                    billing_periods::Column::Period,
                ])
                .update_columns([
                    billing_periods::Column::ConsumptionKwh,
                    billing_periods::Column::TariffPerKwh,
                    billing_periods::Column::FixedCharge,
                    billing_periods::Column::Cost,
                    billing_periods::Column::Currency,
                    billing_periods::Column::Closed,
                    billing_periods::Column::UpdatedAt,
                ])
                .to_owned(),
            )
            .exec(&self.db)
            .await
            .map_err(storage_error)?;
        Ok(())
    }

    async fn load_open_billing(&self) -> Result<Vec<BillingStatement>, DomainError> {
        use sea_orm::{ColumnTrait, QueryFilter, QueryOrder};

        let models = billing_periods::Entity::find()
            .filter(billing_periods::Column::Closed.eq(false))
            .order_by_desc(billing_periods::Column::Period)
            .all(&self.db)
            .await
            .map_err(storage_error)?;

        Ok(models.into_iter().map(model_to_statement).collect())
    }
}

impl SeaOrmTelemetryStore {
    /// Billing statements for a tenant, most recent period first
    pub async fn billing_history(
        &self,
        tenant_id: &str,
    ) -> Result<Vec<BillingStatement>, DomainError> {
        use sea_orm::{ColumnTrait, QueryFilter, QueryOrder};

        let models = billing_periods::Entity::find()
            .filter(billing_periods::Column::TenantId.eq(tenant_id))
            .order_by_desc(billing_periods::Column::Period)
            .all(&self.db)
            .await
            .map_err(storage_error)?;

        Ok(models.into_iter().map(model_to_statement).collect())
    }
}

fn model_to_statement(m: billing_periods::Model) -> BillingStatement {
    BillingStatement {
        tenant_id: m.tenant_id,
        period: m.period,
        consumption_kwh: m.consumption_kwh,
        tariff_per_kwh: m.tariff_per_kwh,
        fixed_charge: m.fixed_charge,
        cost: m.cost,
        currency: m.currency,
        closed: m.closed,
    }
}
