pub mod billing_periods;
pub mod device_readings;
pub mod devices;
pub mod metric_samples;
