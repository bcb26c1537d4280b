use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Registered devices, full profile kept as JSON
        manager
            .create_table(
                Table::create()
                    .table(Devices::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Devices::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Devices::Name).string().not_null())
                    .col(ColumnDef::new(Devices::Protocol).string().not_null())
                    .col(ColumnDef::new(Devices::Profile).json_binary().not_null())
                    .col(
                        ColumnDef::new(Devices::Enabled)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Devices::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Devices::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        // Last payload per device, used to warm the cache on restart
        manager
            .create_table(
                Table::create()
                    .table(DeviceReadings::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(DeviceReadings::DeviceId)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(DeviceReadings::Payload)
                            .json_binary()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DeviceReadings::Source)
                            .string()
                            .not_null()
                            .default("telemetry"),
                    )
                    .col(
                        ColumnDef::new(DeviceReadings::MeasuredAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(DeviceReadings::ReceivedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(MetricSamples::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(MetricSamples::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(MetricSamples::MetricKey).string().not_null())
                    .col(ColumnDef::new(MetricSamples::Headline).double().not_null())
                    .col(
                        ColumnDef::new(MetricSamples::Quality)
                            .string()
                            .not_null()
                            .default("uncertain"),
                    )
                    .col(ColumnDef::new(MetricSamples::Sample).json_binary().not_null())
                    .col(
                        ColumnDef::new(MetricSamples::ComputedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .if_not_exists()
                    .name("idx_metric_samples_key_time")
                    .table(MetricSamples::Table)
                    .col(MetricSamples::MetricKey)
                    .col(MetricSamples::ComputedAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(BillingPeriods::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(BillingPeriods::TenantId).string().not_null())
                    .col(ColumnDef::new(BillingPeriods::Period).string().not_null())
                    .col(
                        ColumnDef::new(BillingPeriods::ConsumptionKwh)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(BillingPeriods::TariffPerKwh)
                            .double()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(BillingPeriods::FixedCharge)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(ColumnDef::new(BillingPeriods::Cost).double().not_null())
                    .col(
                        ColumnDef::new(BillingPeriods::Currency)
                            .string()
                            .not_null()
                            .default("USD"),
                    )
                    .col(
                        ColumnDef::new(BillingPeriods::Closed)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(BillingPeriods::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .primary_key(
                        Index::create()
                            .col(BillingPeriods::TenantId)
                            .col(BillingPeriods::Period),
                    )
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(BillingPeriods::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(MetricSamples::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(DeviceReadings::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Devices::Table).to_owned())
            .await?;
        Ok(())
    }
}

#[derive(DeriveIden)]
enum Devices {
    Table,
    Id,
    Name,
    Protocol,
    Profile,
    Enabled,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum DeviceReadings {
    Table,
    DeviceId,
    Payload,
    Source,
    MeasuredAt,
    ReceivedAt,
}

#[derive(DeriveIden)]
enum MetricSamples {
    Table,
    Id,
    MetricKey,
    Headline,
    Quality,
    Sample,
    ComputedAt,
}

#[derive(DeriveIden)]
enum BillingPeriods {
    Table,
    TenantId,
    Period,
    ConsumptionKwh,
    TariffPerKwh,
    FixedCharge,
    Cost,
    Currency,
    Closed,
    UpdatedAt,
}
