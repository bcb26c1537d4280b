use super::MeterRef;
use crate::error::MetricError;
use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

/// Tariff applied to a tenant's cumulative energy meters (kWh counters)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingPlan {
    pub tenant_id: String,
    pub meters: Vec<MeterRef>,
    pub tariff_per_kwh: f64,
    #[serde(default)]
    pub fixed_charge: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_currency() -> String {
    "USD".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillingStatement {
    pub tenant_id: String,
    /// Calendar month, `YYYY-MM` (UTC)
    pub period: String,
    pub consumption_kwh: f64,
    pub tariff_per_kwh: f64,
    pub fixed_charge: f64,
    pub cost: f64,
    pub currency: String,
    pub closed: bool,
}

/// Billing period key for a timestamp
pub fn period_of(at: DateTime<Utc>) -> String {
    format!("{:04}-{:02}", at.year(), at.month())
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct MeterLedger {
    baseline: f64,
    last: f64,
    accumulated: f64,
}

impl MeterLedger {
    fn consumption(&self) -> f64 {
        self.accumulated + (self.last - self.baseline)
    }
}

/// Running consumption of one billing plan for the open period.
///
/// Rules:
/// - first value of a meter becomes its baseline
/// - a value below the previous one is a counter reset: consumption so far is
///   carried and the counter is assumed to restart from zero
/// - a value from a later month closes the open period; every meter then
///   re-baselines at its last value
/// - consumption restored from a persisted open statement is carried until
///   that period closes
#[derive(Debug, Clone)]
pub struct BillingLedger {
    plan: BillingPlan,
    period: Option<String>,
    meters: Vec<Option<MeterLedger>>,
    carried_kwh: f64,
}

impl BillingLedger {
    pub fn new(plan: BillingPlan) -> Self {
        let meters = vec![None; plan.meters.len()];
        Self {
            plan,
            period: None,
            meters,
            carried_kwh: 0.0,
        }
    }

    pub fn plan(&self) -> &BillingPlan {
        &self.plan
    }

    pub fn period(&self) -> Option<&str> {
        self.period.as_deref()
    }

    /// Resume the open period of a statement saved before a restart.
    ///
    /// Only an open statement of this tenant is taken, and only before the
    /// ledger has seen any value. Returns whether it was applied.
    pub fn restore(&mut self, statement: &BillingStatement) -> bool {
        if statement.closed
            || statement.tenant_id != self.plan.tenant_id
            || self.period.is_some()
            || !statement.consumption_kwh.is_finite()
        {
            return false;
        }
        self.period = Some(statement.period.clone());
        self.carried_kwh = statement.consumption_kwh.max(0.0);
        true
    }

    /// Apply a counter value of meter `index`. Returns the closed statement
    /// when this value opened a new period.
    pub fn observe(
        &mut self,
        index: usize,
        value: f64,
        at: DateTime<Utc>,
    ) -> Result<Option<BillingStatement>, MetricError> {
        if index >= self.meters.len() {
            return Err(MetricError::InvalidInput(format!(
                "Meter index {index} out of range for tenant {}",
                self.plan.tenant_id
            )));
        }
        if !value.is_finite() || value < 0.0 {
            return Err(MetricError::InvalidInput(format!(
                "Energy counter must be a non-negative number, got {value}"
            )));
        }

        let period = period_of(at);
        let mut closed = None;

        let rolls_over = self
            .period
            .as_deref()
            .is_some_and(|current| period.as_str() > current);

        if self.period.is_none() {
            self.period = Some(period);
        } else if rolls_over {
            closed = self.build_statement(true);
            self.carried_kwh = 0.0;
            for meter in self.meters.iter_mut().flatten() {
                meter.baseline = meter.last;
                meter.accumulated = 0.0;
            }
            self.period = Some(period);
        }
        // Late values from an earlier month count toward the open period

        if let Some(meter) = self.meters[index].as_mut() {
            if value < meter.last {
                meter.accumulated += meter.last - meter.baseline;
                meter.baseline = 0.0;
            }
            meter.last = value;
        } else {
            self.meters[index] = Some(MeterLedger {
                baseline: value,
                last: value,
                accumulated: 0.0,
            });
        }

        Ok(closed)
    }

    /// Statement of the open period, `None` until the first value arrives
    pub fn statement(&self) -> Option<BillingStatement> {
        self.build_statement(false)
    }

    fn build_statement(&self, closed: bool) -> Option<BillingStatement> {
        let period = self.period.clone()?;
        let consumption_kwh: f64 = self.carried_kwh
            + self
                .meters
                .iter()
                .flatten()
                .map(|m| m.consumption())
                .sum::<f64>();

        Some(BillingStatement {
            tenant_id: self.plan.tenant_id.clone(),
            period,
            consumption_kwh: round2(consumption_kwh),
            tariff_per_kwh: self.plan.tariff_per_kwh,
            fixed_charge: self.plan.fixed_charge,
            cost: round2(consumption_kwh * self.plan.tariff_per_kwh + self.plan.fixed_charge),
            currency: self.plan.currency.clone(),
            closed,
        })
    }
}
