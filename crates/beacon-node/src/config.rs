//! Node configuration from the environment.

use std::path::PathBuf;
use std::time::Duration;

use beacon_protocols::{AddressAssignment, EngineConfig, ProvisionerConfig};
use beacon_topology::{DeviceUuid, MeshAddress, ShortName, DEFAULT_CAPACITY};
use beacon_transfer::{PeerLink, TransportConfig};
use thiserror::Error;

/// Static address of the provisioner.
pub const PROVISIONER_ADDRESS: MeshAddress = MeshAddress(0x0006);

/// Short name of the provisioner.
pub const PROVISIONER_NAME: &str = "P";

/// A variable that could not be used.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid {var}='{value}': {reason}")]
pub struct ConfigError {
    pub var: &'static str,
    pub value: String,
    pub reason: String,
}

impl ConfigError {
    fn new(var: &'static str, value: &str, reason: impl ToString) -> Self {
        Self {
            var,
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// What this node does in the mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Sensor node, provisioned by someone else.
    Beacon,
    /// Admits beacons and assigns their addresses.
    Provisioner,
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "beacon" | "node" => Ok(Self::Beacon),
            "provisioner" => Ok(Self::Provisioner),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// Configuration for a Beacon node.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub role: Role,

    /// Short name. Beacons learn theirs from the introduction.
    pub name: ShortName,

    pub uuid: DeviceUuid,

    /// Fixed address; only the provisioner starts with one.
    pub address: MeshAddress,

    /// Bearer socket and radio neighbours
    pub transport: TransportConfig,

    /// Topology table slots
    pub table_capacity: usize,

    pub engine: EngineConfig,

    pub provisioner: ProvisionerConfig,

    /// Period of the unprovisioned beacon
    pub beacon_interval: Duration,

    /// Commissioning database location
    pub data_dir: PathBuf,
}

impl NodeConfig {
    /// Read `BEACON_*` variables from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Read configuration through `lookup`, with defaults for unset variables.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let role = match var("BEACON_ROLE") {
            Some(v) => v.parse().map_err(|e| ConfigError::new("BEACON_ROLE", &v, e))?,
            None => Role::Beacon,
        };

        let name = match (var("BEACON_NAME"), role) {
            (Some(v), _) => ShortName::new(&v),
            (None, Role::Provisioner) => ShortName::new(PROVISIONER_NAME),
            (None, Role::Beacon) => ShortName::default(),
        };

        let uuid = match var("BEACON_UUID") {
            Some(v) => parse_uuid(&v).map_err(|e| ConfigError::new("BEACON_UUID", &v, e))?,
            None => DeviceUuid::from_bytes(rand::random()),
        };

        let address = match (var("BEACON_ADDRESS"), role) {
            (Some(v), Role::Provisioner) => {
                let address = parse_address(&v).map_err(|e| ConfigError::new("BEACON_ADDRESS", &v, e))?;
                if address.is_unassigned() || !address.fits_prefix() {
                    return Err(ConfigError::new(
                        "BEACON_ADDRESS",
                        &v,
                        "must be a non-zero single-digit node address",
                    ));
                }
                address
            }
            (None, Role::Provisioner) => PROVISIONER_ADDRESS,
            (_, Role::Beacon) => MeshAddress::UNASSIGNED,
        };

        let mut transport = TransportConfig::default();
        if let Some(v) = var("BEACON_BIND") {
            transport.bind = v.parse().map_err(|e| ConfigError::new("BEACON_BIND", &v, e))?;
        }
        if let Some(v) = var("BEACON_PEERS") {
            for peer in v.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                let link: PeerLink = peer.parse().map_err(|e| ConfigError::new("BEACON_PEERS", peer, e))?;
                transport.peers.push(link);
            }
        }
        if let Some(v) = var("BEACON_DEFAULT_RSSI") {
            transport.default_rssi = v.parse().map_err(|e| ConfigError::new("BEACON_DEFAULT_RSSI", &v, e))?;
        }

        let table_capacity = match var("BEACON_TABLE_CAPACITY") {
            Some(v) => match v.parse::<usize>() {
                Ok(0) => return Err(ConfigError::new("BEACON_TABLE_CAPACITY", &v, "must be positive")),
                Ok(n) => n,
                Err(e) => return Err(ConfigError::new("BEACON_TABLE_CAPACITY", &v, e)),
            },
            None => DEFAULT_CAPACITY,
        };

        let mut engine = EngineConfig::default();
        if let Some(v) = var("BEACON_PROXIMITY_M") {
            match v.parse::<f64>() {
                Ok(m) if m.is_finite() && m > 0.0 => engine = engine.with_proximity_threshold(m),
                Ok(_) => return Err(ConfigError::new("BEACON_PROXIMITY_M", &v, "must be a positive distance")),
                Err(e) => return Err(ConfigError::new("BEACON_PROXIMITY_M", &v, e)),
            }
        }

        let mut provisioner = ProvisionerConfig::default();
        if let Some(v) = var("BEACON_SCAN_TIMEOUT_SECS") {
            provisioner.scan_timeout = parse_secs("BEACON_SCAN_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = var("BEACON_PROVISION_TIMEOUT_SECS") {
            provisioner.provision_timeout = parse_secs("BEACON_PROVISION_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = var("BEACON_ADDRESS_MODE") {
            let mode: AddressAssignment = v.parse().map_err(|e| ConfigError::new("BEACON_ADDRESS_MODE", &v, e))?;
            provisioner.assignment = mode;
        }

        let beacon_interval = match var("BEACON_BEACON_INTERVAL_SECS") {
            Some(v) => parse_secs("BEACON_BEACON_INTERVAL_SECS", &v)?,
            None => Duration::from_secs(2),
        };

        let data_dir = PathBuf::from(var("BEACON_DATA_DIR").unwrap_or_else(|| "./beacon-data".to_string()));

        Ok(Self {
            role,
            name,
            uuid,
            address,
            transport,
            table_capacity,
            engine,
            provisioner,
            beacon_interval,
            data_dir,
        })
    }
}

/// 32 hex characters, dashes allowed.
pub fn parse_uuid(s: &str) -> Result<DeviceUuid, String> {
    let compact: String = s.chars().filter(|c| *c != '-').collect();
    let bytes = hex::decode(&compact).map_err(|e| e.to_string())?;
    let bytes: [u8; 16] = bytes
        .try_into()
        .map_err(|v: Vec<u8>| format!("expected 16 bytes, got {}", v.len()))?;
    Ok(DeviceUuid::from_bytes(bytes))
}

/// Hex, with or without a `0x` prefix.
pub fn parse_address(s: &str) -> Result<MeshAddress, String> {
    let digits = s.trim_start_matches("0x").trim_start_matches("0X");
    u16::from_str_radix(digits, 16)
        .map(MeshAddress)
        .map_err(|e| e.to_string())
}

fn parse_secs(var: &'static str, value: &str) -> Result<Duration, ConfigError> {
    match value.parse::<u64>() {
        Ok(0) => Err(ConfigError::new(var, value, "must be positive")),
        Ok(secs) => Ok(Duration::from_secs(secs)),
        Err(e) => Err(ConfigError::new(var, value, e)),
    }
}
