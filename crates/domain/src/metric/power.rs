use crate::device::DeviceId;
use crate::error::MetricError;
use crate::reading::Reading;
use serde::{Deserialize, Serialize};

/// Payload fields a power analyzer reports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzerFields {
    #[serde(default = "default_active")]
    pub active_power: String,
    #[serde(default = "default_reactive")]
    pub reactive_power: String,
    #[serde(default = "default_energy")]
    pub energy: String,
}

fn default_active() -> String {
    "active_power".to_string()
}
fn default_reactive() -> String {
    "reactive_power".to_string()
}
fn default_energy() -> String {
    "energy".to_string()
}

impl Default for AnalyzerFields {
    fn default() -> Self {
        Self {
            active_power: default_active(),
            reactive_power: default_reactive(),
            energy: default_energy(),
        }
    }
}

impl AnalyzerFields {
    /// Active power is mandatory; reactive power and energy default to 0.
    pub fn sample(&self, reading: &Reading) -> Result<AnalyzerSample, MetricError> {
        let active_kw =
            reading
                .number(&self.active_power)
                .ok_or_else(|| MetricError::InvalidField {
                    device_id: reading.device_id.to_string(),
                    field: self.active_power.clone(),
                })?;

        Ok(AnalyzerSample {
            active_kw,
            reactive_kvar: reading.number(&self.reactive_power).unwrap_or(0.0),
            energy_kwh: reading.number(&self.energy).unwrap_or(0.0),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerGroupDefinition {
    pub group: String,
    pub analyzers: Vec<DeviceId>,
    #[serde(default)]
    pub fields: AnalyzerFields,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalyzerSample {
    pub active_kw: f64,
    pub reactive_kvar: f64,
    pub energy_kwh: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerTotals {
    pub active_kw: f64,
    pub reactive_kvar: f64,
    pub apparent_kva: f64,
    /// Absent when there is no apparent power
    pub power_factor: Option<f64>,
    pub energy_kwh: f64,
    pub analyzers: usize,
}

impl PowerTotals {
    pub fn from_samples(samples: &[AnalyzerSample]) -> Result<Self, MetricError> {
        if samples.is_empty() {
            return Err(MetricError::InvalidInput(
                "No analyzer reported".to_string(),
            ));
        }

        let active_kw: f64 = samples.iter().map(|s| s.active_kw).sum();
        let reactive_kvar: f64 = samples.iter().map(|s| s.reactive_kvar).sum();
        let energy_kwh: f64 = samples.iter().map(|s| s.energy_kwh).sum();
        let apparent_kva = active_kw.hypot(reactive_kvar);
        let power_factor = (apparent_kva > 0.0).then(|| active_kw / apparent_kva);

        Ok(Self {
            active_kw,
            reactive_kvar,
            apparent_kva,
            power_factor,
            energy_kwh,
            analyzers: samples.len(),
        })
    }
}
