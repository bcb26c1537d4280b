use super::MeterRef;
use crate::device::DeviceId;
use crate::error::{DomainError, MetricError};
use crate::reading::Quality;
use serde::{Deserialize, Serialize};

/// Which meters make up total facility power and IT power for a site
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PueDefinition {
    pub site: String,
    pub facility_meters: Vec<MeterRef>,
    pub it_meters: Vec<MeterRef>,
}

impl PueDefinition {
    pub fn devices(&self) -> impl Iterator<Item = &DeviceId> {
        self.facility_meters
            .iter()
            .chain(self.it_meters.iter())
            .map(|m| &m.device_id)
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.facility_meters.is_empty() || self.it_meters.is_empty() {
            return Err(DomainError::InvalidConfiguration(format!(
                "PUE site {} needs at least one facility meter and one IT meter",
                self.site
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PueValue {
    pub ratio: f64,
    pub facility_kw: f64,
    pub it_kw: f64,
}

impl PueValue {
    /// PUE = total facility power / IT equipment power
    pub fn compute(facility_kw: f64, it_kw: f64) -> Result<Self, MetricError> {
        if !facility_kw.is_finite() || !it_kw.is_finite() {
            return Err(MetricError::InvalidInput(
                "PUE inputs must be finite".to_string(),
            ));
        }
        if it_kw <= 0.0 {
            return Err(MetricError::InvalidInput(format!(
                "IT power must be positive, got {it_kw}"
            )));
        }

        Ok(Self {
            ratio: facility_kw / it_kw,
            facility_kw,
            it_kw,
        })
    }

    /// A facility cannot draw less than its IT load.
    pub fn plausibility(&self) -> Quality {
        if self.ratio < 1.0 {
            Quality::Uncertain
        } else {
            Quality::Good
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pue_ratio() {
        let pue = PueValue::compute(180.0, 120.0).unwrap();
        assert_eq!(pue.ratio, 1.5);
        assert_eq!(pue.plausibility(), Quality::Good);
    }

    #[test]
    fn test_pue_zero_it_power() {
        assert!(matches!(
            PueValue::compute(100.0, 0.0),
            Err(MetricError::InvalidInput(_))
        ));
        assert!(PueValue::compute(100.0, -1.0).is_err());
    }

    #[test]
    fn test_pue_below_one_is_uncertain() {
        let pue = PueValue::compute(90.0, 100.0).unwrap();
        assert_eq!(pue.plausibility(), Quality::Uncertain);
    }

    #[test]
    fn test_definition_requires_both_sides() {
        let def = PueDefinition {
            site: "dc1".into(),
            facility_meters: vec![MeterRef::new(DeviceId::new("main").unwrap(), "kw")],
            it_meters: vec![],
        };
        assert!(def.validate().is_err());
    }
}
