use serde::{Deserialize, Serialize};

/// Communication parameters of a device, per field protocol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Protocol {
    Modbus {
        host: String,
        #[serde(default = "default_modbus_port")]
        port: u16,
        #[serde(default = "default_unit_id")]
        unit_id: u8,
    },
    Snmp {
        host: String,
        #[serde(default = "default_snmp_port")]
        port: u16,
        #[serde(default = "default_community")]
        community: String,
        #[serde(default = "default_snmp_version")]
        version: String,
    },
    I2c {
        bus: u8,
        address: u8,
    },
    Lorawan {
        dev_eui: String,
        app_eui: String,
    },
    AccessController {
        host: String,
        port: u16,
        #[serde(default = "default_door_count")]
        door_count: u8,
    },
}

fn default_modbus_port() -> u16 {
    502
}
fn default_unit_id() -> u8 {
    1
}
fn default_snmp_port() -> u16 {
    161
}
fn default_community() -> String {
    "public".to_string()
}
fn default_snmp_version() -> String {
    "v2c".to_string()
}
fn default_door_count() -> u8 {
    1
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Modbus { .. } => "modbus",
            Self::Snmp { .. } => "snmp",
            Self::I2c { .. } => "i2c",
            Self::Lorawan { .. } => "lorawan",
            Self::AccessController { .. } => "access_controller",
        }
    }
}

pub(crate) fn is_valid_eui(eui: &str) -> bool {
    eui.len() == 16 && eui.chars().all(|c| c.is_ascii_hexdigit())
}
