//! Recomputes derived metrics as their input readings change.

use crate::cache::ReadingCache;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use domain::MetricError;
use domain::device::DeviceId;
use domain::metric::{
    BillingLedger, BillingStatement, MeterRef, MetricKey, MetricSample, MetricValue,
    PowerGroupDefinition, PowerTotals, PueDefinition, PueValue,
};
use domain::reading::Quality;
use infrastructure::config::MetricsConfig;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Result of feeding one accepted reading to the engine
#[derive(Debug, Default)]
pub struct MetricUpdate {
    pub samples: Vec<MetricSample>,
    /// Billing periods closed by this reading
    pub closed: Vec<BillingStatement>,
}

impl MetricUpdate {
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty() && self.closed.is_empty()
    }
}

pub struct MetricEngine {
    pue: HashMap<String, PueDefinition>,
    power: HashMap<String, PowerGroupDefinition>,
    ledgers: Mutex<HashMap<String, BillingLedger>>,
    /// Device -> metrics that read it
    index: HashMap<DeviceId, Vec<MetricKey>>,
    latest: DashMap<MetricKey, MetricSample>,
}

impl MetricEngine {
    pub fn new(config: &MetricsConfig) -> Self {
        let mut index: HashMap<DeviceId, Vec<MetricKey>> = HashMap::new();
        let mut link = |device: &DeviceId, key: &MetricKey| {
            let keys = index.entry(device.clone()).or_default();
            if !keys.contains(key) {
                keys.push(key.clone());
            }
        };

        for def in &config.pue {
            let key = MetricKey::Pue(def.site.clone());
            def.devices().for_each(|d| link(d, &key));
        }
        for def in &config.power_groups {
            let key = MetricKey::Power(def.group.clone());
            def.analyzers.iter().for_each(|d| link(d, &key));
        }
        for plan in &config.billing {
            let key = MetricKey::Billing(plan.tenant_id.clone());
            plan.meters.iter().for_each(|m| link(&m.device_id, &key));
        }

        info!(
            pue = config.pue.len(),
            power_groups = config.power_groups.len(),
            billing_plans = config.billing.len(),
            "Metric engine configured"
        );

        Self {
            pue: config
                .pue
                .iter()
                .map(|d| (d.site.clone(), d.clone()))
                .collect(),
            power: config
                .power_groups
                .iter()
                .map(|d| (d.group.clone(), d.clone()))
                .collect(),
            ledgers: Mutex::new(
                config
                    .billing
                    .iter()
                    .map(|p| (p.tenant_id.clone(), BillingLedger::new(p.clone())))
                    .collect(),
            ),
            index,
            latest: DashMap::new(),
        }
    }

    /// Metrics that depend on a device
    pub fn dependents(&self, device_id: &DeviceId) -> &[MetricKey] {
        self.index.get(device_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Recompute every metric that reads `device_id`.
    pub fn on_reading(
        &self,
        device_id: &DeviceId,
        cache: &ReadingCache,
        now: DateTime<Utc>,
    ) -> MetricUpdate {
        let mut update = MetricUpdate::default();

        for key in self.dependents(device_id) {
            let result = match key {
                MetricKey::Pue(site) => self.compute_pue(site, cache, now),
                MetricKey::Power(group) => self.compute_power(group, cache, now),
                MetricKey::Billing(tenant) => {
                    self.apply_billing(tenant, device_id, cache, now, &mut update.closed)
                }
            };

            match result {
                Ok(sample) => {
                    self.latest.insert(key.clone(), sample.clone());
                    update.samples.push(sample);
                }
                Err(MetricError::MissingInput(what)) => {
                    debug!(metric = %key, "Waiting for inputs: {}", what);
                }
                Err(e) => {
                    warn!(metric = %key, device_id = %device_id, "Metric not computed: {}", e);
                }
            }
        }

        update
    }

    /// Resume billing after a restart.
    ///
    /// Open statements carry the consumption counted before the restart; the
    /// warmed cache then baselines each meter. Returns periods the cached
    /// readings already closed.
    pub fn prime(
        &self,
        cache: &ReadingCache,
        open: &[BillingStatement],
    ) -> Vec<BillingStatement> {
        let mut ledgers = lock_ignore_poison(&self.ledgers);
        let mut closed = Vec::new();

        for statement in open {
            let Some(ledger) = ledgers.get_mut(&statement.tenant_id) else {
                continue;
            };
            if ledger.restore(statement) {
                info!(
                    tenant_id = %statement.tenant_id,
                    period = %statement.period,
                    consumption_kwh = statement.consumption_kwh,
                    "Billing period resumed"
                );
            }
        }

        for ledger in ledgers.values_mut() {
            let meters = ledger.plan().meters.clone();
            for (index, meter) in meters.iter().enumerate() {
                let Some(reading) = cache.latest(&meter.device_id) else {
                    continue;
                };
                let Ok(value) = meter.resolve(&reading) else {
                    continue;
                };
                match ledger.observe(index, value, reading.measured_at) {
                    Ok(Some(statement)) => closed.push(statement),
                    Ok(None) => {}
                    Err(e) => warn!(
                        tenant_id = %ledger.plan().tenant_id,
                        "Billing baseline skipped: {}",
                        e
                    ),
                }
            }
        }

        closed
    }

    pub fn latest(&self) -> Vec<MetricSample> {
        let mut samples: Vec<MetricSample> = self.latest.iter().map(|s| s.clone()).collect();
        samples.sort_by(|a, b| a.key.cmp(&b.key));
        samples
    }

    pub fn sample(&self, key: &MetricKey) -> Option<MetricSample> {
        self.latest.get(key).map(|s| s.clone())
    }

    /// Open statement of every tenant that has seen a reading
    pub fn billing_statements(&self) -> Vec<BillingStatement> {
        let ledgers = lock_ignore_poison(&self.ledgers);
        let mut statements: Vec<BillingStatement> =
            ledgers.values().filter_map(|l| l.statement()).collect();
        statements.sort_by(|a, b| a.tenant_id.cmp(&b.tenant_id));
        statements
    }

    fn compute_pue(
        &self,
        site: &str,
        cache: &ReadingCache,
        now: DateTime<Utc>,
    ) -> Result<MetricSample, MetricError> {
        let def = self
            .pue
            .get(site)
            .ok_or_else(|| MetricError::InvalidInput(format!("Unknown PUE site {site}")))?;

        let mut quality = Quality::Good;
        let facility_kw = sum_meters(&def.facility_meters, cache, now, &mut quality)?;
        let it_kw = sum_meters(&def.it_meters, cache, now, &mut quality)?;
        let value = PueValue::compute(facility_kw, it_kw)?;
        quality = quality.combine(value.plausibility());

        Ok(MetricSample {
            key: MetricKey::Pue(site.to_string()),
            value: MetricValue::Pue(value),
            quality,
            computed_at: now,
            missing: Vec::new(),
        })
    }

    fn compute_power(
        &self,
        group: &str,
        cache: &ReadingCache,
        now: DateTime<Utc>,
    ) -> Result<MetricSample, MetricError> {
        let def = self
            .power
            .get(group)
            .ok_or_else(|| MetricError::InvalidInput(format!("Unknown power group {group}")))?;

        let mut quality = Quality::Good;
        let mut samples = Vec::with_capacity(def.analyzers.len());
        let mut missing = Vec::new();

        for analyzer in &def.analyzers {
            let Some(reading) = cache.latest(analyzer) else {
                missing.push(analyzer.clone());
                continue;
            };
            match def.fields.sample(&reading) {
                Ok(sample) => {
                    if !cache.is_fresh(&reading, now) {
                        quality = quality.combine(Quality::Uncertain);
                    }
                    samples.push(sample);
                }
                Err(e) => {
                    warn!(group = %group, "Analyzer reading unusable: {}", e);
                    quality = quality.combine(Quality::Bad);
                    missing.push(analyzer.clone());
                }
            }
        }

        if samples.is_empty() {
            return Err(MetricError::MissingInput(join_ids(&missing)));
        }
        if !missing.is_empty() {
            quality = quality.combine(Quality::Uncertain);
        }

        Ok(MetricSample {
            key: MetricKey::Power(group.to_string()),
            value: MetricValue::Power(PowerTotals::from_samples(&samples)?),
            quality,
            computed_at: now,
            missing,
        })
    }

    fn apply_billing(
        &self,
        tenant: &str,
        device_id: &DeviceId,
        cache: &ReadingCache,
        now: DateTime<Utc>,
        closed: &mut Vec<BillingStatement>,
    ) -> Result<MetricSample, MetricError> {
        let reading = cache
            .latest(device_id)
            .ok_or_else(|| MetricError::MissingInput(device_id.to_string()))?;

        let mut ledgers = lock_ignore_poison(&self.ledgers);
        let ledger = ledgers
            .get_mut(tenant)
            .ok_or_else(|| MetricError::InvalidInput(format!("Unknown tenant {tenant}")))?;

        let meters = ledger.plan().meters.clone();
        for (index, meter) in meters.iter().enumerate() {
            if &meter.device_id != device_id {
                continue;
            }
            let value = meter.resolve(&reading)?;
            if let Some(statement) = ledger.observe(index, value, reading.measured_at)? {
                info!(
                    tenant_id = %statement.tenant_id,
                    period = %statement.period,
                    consumption_kwh = statement.consumption_kwh,
                    "🧾 Billing period closed"
                );
                closed.push(statement);
            }
        }

        let statement = ledger
            .statement()
            .ok_or_else(|| MetricError::MissingInput(device_id.to_string()))?;

        let mut quality = Quality::Good;
        let mut missing = Vec::new();
        for meter in &meters {
            match cache.latest(&meter.device_id) {
                Some(r) if cache.is_fresh(&r, now) => {}
                Some(_) => quality = quality.combine(Quality::Uncertain),
                None => {
                    quality = quality.combine(Quality::Uncertain);
                    if !missing.contains(&meter.device_id) {
                        missing.push(meter.device_id.clone());
                    }
                }
            }
        }

        Ok(MetricSample {
            key: MetricKey::Billing(tenant.to_string()),
            value: MetricValue::Billing(statement),
            quality,
            computed_at: now,
            missing,
        })
    }
}

fn lock_ignore_poison<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn join_ids(ids: &[DeviceId]) -> String {
    ids.iter()
        .map(|id| id.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Sum of meter values; every meter needs a cached reading.
fn sum_meters(
    meters: &[MeterRef],
    cache: &ReadingCache,
    now: DateTime<Utc>,
    quality: &mut Quality,
) -> Result<f64, MetricError> {
    let mut total = 0.0;
    let mut absent = Vec::new();

    for meter in meters {
        match cache.latest(&meter.device_id) {
            Some(reading) => {
                total += meter.resolve(&reading)?;
                if !cache.is_fresh(&reading, now) {
                    *quality = quality.combine(Quality::Uncertain);
                }
            }
            None => absent.push(meter.device_id.to_string()),
        }
    }

    if !absent.is_empty() {
        return Err(MetricError::MissingInput(absent.join(", ")));
    }
    Ok(total)
}
