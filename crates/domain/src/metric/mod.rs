//! Derived metrics computed from several independently-arriving readings.

mod billing;
mod meter;
mod power;
mod pue;

pub use billing::{BillingLedger, BillingPlan, BillingStatement, period_of};
pub use meter::MeterRef;
pub use power::{AnalyzerFields, AnalyzerSample, PowerGroupDefinition, PowerTotals};
pub use pue::{PueDefinition, PueValue};

use crate::device::DeviceId;
use crate::reading::Quality;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity of a derived metric
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum MetricKey {
    Pue(String),
    Power(String),
    Billing(String),
}

impl std::fmt::Display for MetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pue(site) => write!(f, "pue/{site}"),
            Self::Power(group) => write!(f, "power/{group}"),
            Self::Billing(tenant) => write!(f, "billing/{tenant}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MetricValue {
    Pue(PueValue),
    Power(PowerTotals),
    Billing(BillingStatement),
}

/// Latest value of a derived metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub key: MetricKey,
    pub value: MetricValue,
    pub quality: Quality,
    pub computed_at: DateTime<Utc>,
    /// Inputs that had no usable reading when the value was computed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub missing: Vec<DeviceId>,
}

impl MetricSample {
    /// Scalar view used for history tables and dashboards
    pub fn headline(&self) -> f64 {
        match &self.value {
            MetricValue::Pue(v) => v.ratio,
            MetricValue::Power(v) => v.active_kw,
            MetricValue::Billing(v) => v.cost,
        }
    }
}
