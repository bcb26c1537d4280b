//! Rack capacity bookkeeping.
//!
//! Positions are expressed in rack units (U), 1-based from the bottom slot.

use crate::device::{DeviceId, DeviceProfile};
use crate::error::{DomainError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Height of one rack unit in inches
pub const RACK_UNIT_INCHES: f64 = 1.75;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rack {
    pub id: String,
    pub name: String,
    pub height_u: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RackPlacement {
    pub rack_id: String,
    pub position_u: u32,
    pub size_u: u32,
}

impl RackPlacement {
    /// Highest slot occupied by the device
    pub fn top_u(&self) -> u32 {
        self.position_u + self.size_u.saturating_sub(1)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RackCapacity {
    pub rack_id: String,
    pub name: String,
    pub height_u: u32,
    pub height_inches: f64,
    pub used_u: u32,
    pub free_u: u32,
    pub utilization: f64,
    pub devices: Vec<DeviceId>,
}

/// Validated assignment of devices to rack slots
#[derive(Debug, Clone, Default)]
pub struct RackLayout {
    racks: BTreeMap<String, Rack>,
    // rack id -> slot -> device
    slots: BTreeMap<String, BTreeMap<u32, DeviceId>>,
}

impl RackLayout {
    pub fn build(racks: &[Rack], devices: &[DeviceProfile]) -> Result<Self> {
        let mut layout = Self::default();

        for rack in racks {
            if rack.height_u == 0 {
                return Err(DomainError::InvalidConfiguration(format!(
                    "Rack {} has zero height",
                    rack.id
                )));
            }
            layout.racks.insert(rack.id.clone(), rack.clone());
            layout.slots.insert(rack.id.clone(), BTreeMap::new());
        }

        for device in devices {
            if let Some(placement) = &device.placement {
                layout.place(&device.id, placement)?;
            }
        }

        Ok(layout)
    }

    fn place(&mut self, device_id: &DeviceId, placement: &RackPlacement) -> Result<()> {
        let rack = self.racks.get(&placement.rack_id).ok_or_else(|| {
            DomainError::InvalidConfiguration(format!(
                "Device {} is placed in unknown rack {}",
                device_id, placement.rack_id
            ))
        })?;

        if placement.position_u == 0 || placement.size_u == 0 || placement.top_u() > rack.height_u
        {
            return Err(DomainError::InvalidConfiguration(format!(
                "Device {} does not fit in rack {} (U{}..U{} of {}U)",
                device_id,
                rack.id,
                placement.position_u,
                placement.top_u(),
                rack.height_u
            )));
        }

        let slots = self.slots.entry(placement.rack_id.clone()).or_default();
        for slot in placement.position_u..=placement.top_u() {
            if let Some(other) = slots.get(&slot) {
                return Err(DomainError::InvalidConfiguration(format!(
                    "Device {} overlaps {} at U{} in rack {}",
                    device_id, other, slot, placement.rack_id
                )));
            }
        }
        for slot in placement.position_u..=placement.top_u() {
            slots.insert(slot, device_id.clone());
        }
        Ok(())
    }

    pub fn capacity(&self) -> Vec<RackCapacity> {
        self.racks
            .values()
            .map(|rack| {
                let slots = self.slots.get(&rack.id);
                let used_u = slots.map(|s| s.len() as u32).unwrap_or(0);
                let mut devices: Vec<DeviceId> = slots
                    .map(|s| s.values().cloned().collect())
                    .unwrap_or_default();
                devices.dedup();

                RackCapacity {
                    rack_id: rack.id.clone(),
                    name: rack.name.clone(),
                    height_u: rack.height_u,
                    height_inches: f64::from(rack.height_u) * RACK_UNIT_INCHES,
                    used_u,
                    free_u: rack.height_u - used_u,
                    utilization: f64::from(used_u) / f64::from(rack.height_u),
                    devices,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Protocol;

    fn rack(id: &str, height_u: u32) -> Rack {
        Rack {
            id: id.into(),
            name: format!("Rack {id}"),
            height_u,
        }
    }

    fn server(id: &str, rack_id: &str, position_u: u32, size_u: u32) -> DeviceProfile {
        DeviceProfile::new(
            DeviceId::new(id).unwrap(),
            id,
            Protocol::Snmp {
                host: "10.1.0.1".into(),
                port: 161,
                community: "public".into(),
                version: "v2c".into(),
            },
        )
        .with_placement(RackPlacement {
            rack_id: rack_id.into(),
            position_u,
            size_u,
        })
    }

    #[test]
    fn test_capacity_counts_units() {
        let layout = RackLayout::build(
            &[rack("R1", 42)],
            &[server("srv-1", "R1", 1, 2), server("srv-2", "R1", 10, 4)],
        )
        .unwrap();

        let cap = &layout.capacity()[0];
        assert_eq!(cap.used_u, 6);
        assert_eq!(cap.free_u, 36);
        assert_eq!(cap.height_inches, 73.5);
        assert!((cap.utilization - 6.0 / 42.0).abs() < 1e-9);
        assert_eq!(cap.devices.len(), 2);
    }

    #[test]
    fn test_overlap_rejected() {
        let result = RackLayout::build(
            &[rack("R1", 42)],
            &[server("srv-1", "R1", 1, 4), server("srv-2", "R1", 4, 1)],
        );
        assert!(matches!(result, Err(DomainError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_device_exceeding_rack_height_rejected() {
        let result = RackLayout::build(&[rack("R1", 42)], &[server("srv-1", "R1", 41, 3)]);
        assert!(result.is_err());

        let fits = RackLayout::build(&[rack("R1", 42)], &[server("srv-1", "R1", 40, 3)]);
        assert!(fits.is_ok());
    }

    #[test]
    fn test_unknown_rack_rejected() {
        let result = RackLayout::build(&[rack("R1", 42)], &[server("srv-1", "R9", 1, 1)]);
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_rack_capacity() {
        let layout = RackLayout::build(&[rack("R2", 24)], &[]).unwrap();
        let cap = &layout.capacity()[0];
        assert_eq!(cap.used_u, 0);
        assert_eq!(cap.free_u, 24);
        assert_eq!(cap.utilization, 0.0);
    }
}
