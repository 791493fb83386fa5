//! Collaborator contracts.
//!
//! The gossip engine and the provisioning coordinator only ever talk to the
//! outside world through these traits: a unicast mesh transport, an output
//! surface (display, LEDs), a sensor, and, on the provisioner, the mesh's
//! commissioning database.

use std::sync::Arc;

use beacon_topology::{DeviceUuid, MeshAddress, ShortName, Telemetry, TopologySnapshot};
use thiserror::Error;

/// A message delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inbound {
    pub sender: MeshAddress,
    pub payload: Vec<u8>,
    /// Received signal strength, dBm.
    pub rssi: i8,
}

impl Inbound {
    pub fn new(sender: MeshAddress, payload: impl Into<Vec<u8>>, rssi: i8) -> Self {
        Self {
            sender,
            payload: payload.into(),
            rssi,
        }
    }
}

/// Why a send did not go out.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("send to {destination} failed: {reason}")]
pub struct SendError {
    pub destination: MeshAddress,
    pub reason: String,
}

impl SendError {
    pub fn new(destination: MeshAddress, reason: impl Into<String>) -> Self {
        Self {
            destination,
            reason: reason.into(),
        }
    }
}

/// Best-effort unicast over the mesh.
///
/// Callers never pass the local or the unassigned address as destination.
pub trait MeshTransport {
    /// Send one payload of at most [`MAX_PAYLOAD_LEN`](crate::MAX_PAYLOAD_LEN) bytes.
    fn send(&self, destination: MeshAddress, payload: &[u8]) -> Result<(), SendError>;

    /// Address assigned to this node, unassigned until provisioned.
    fn local_address(&self) -> MeshAddress;
}

impl<T: MeshTransport + ?Sized> MeshTransport for Arc<T> {
    fn send(&self, destination: MeshAddress, payload: &[u8]) -> Result<(), SendError> {
        (**self).send(destination, payload)
    }

    fn local_address(&self) -> MeshAddress {
        (**self).local_address()
    }
}

/// Lifecycle of the local node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// No address yet; announcing as an unprovisioned beacon.
    Unprovisioned,
    /// Address assigned; gossip is running.
    Provisioned,
}

impl std::fmt::Display for NodeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unprovisioned => write!(f, "Advertising"),
            Self::Provisioned => write!(f, "Provisioned"),
        }
    }
}

/// Who this node is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalIdentity {
    pub uuid: DeviceUuid,
    pub name: ShortName,
    pub address: MeshAddress,
}

impl LocalIdentity {
    pub fn new(uuid: DeviceUuid, name: ShortName, address: MeshAddress) -> Self {
        Self {
            uuid,
            name,
            address,
        }
    }
}

/// Header information rendered above the edge list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelfRecord {
    pub identity: LocalIdentity,
    pub state: NodeState,
    /// Whether an introduction has been received (always true on a provisioner).
    pub admitted: bool,
    /// Node that admitted us, with its name.
    pub introducer: Option<(MeshAddress, ShortName)>,
    pub telemetry: Telemetry,
}

/// Display and indicator surface. Calls are fire-and-forget.
pub trait TopologyOutput {
    /// Show the full table.
    fn render_topology(&self, local: &SelfRecord, snapshot: &TopologySnapshot);

    /// A neighbour is closer than the proximity threshold.
    fn notify_proximity(&self);
}

impl<T: TopologyOutput + ?Sized> TopologyOutput for Arc<T> {
    fn render_topology(&self, local: &SelfRecord, snapshot: &TopologySnapshot) {
        (**self).render_topology(local, snapshot)
    }

    fn notify_proximity(&self) {
        (**self).notify_proximity()
    }
}

/// Temperature/humidity source. Reads always succeed from the caller's view.
pub trait SensorSource {
    fn temperature_celsius(&self) -> i32;

    fn humidity_percent(&self) -> i32;

    /// Both readings.
    fn telemetry(&self) -> Telemetry {
        Telemetry::new(self.temperature_celsius(), self.humidity_percent())
    }
}

impl<T: SensorSource + ?Sized> SensorSource for Arc<T> {
    fn temperature_celsius(&self) -> i32 {
        (**self).temperature_celsius()
    }

    fn humidity_percent(&self) -> i32 {
        (**self).humidity_percent()
    }
}

/// An entry in the commissioning database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommissionedNode {
    pub uuid: DeviceUuid,
    pub address: MeshAddress,
    /// Application key added and vendor model bound.
    pub configured: bool,
}

/// Provisioning confirmation from the mesh stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeAdded {
    pub uuid: DeviceUuid,
    pub address: MeshAddress,
}

/// Failures reported by the commissioning collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommissionError {
    #[error("node {0} is not in the commissioning database")]
    UnknownNode(MeshAddress),

    #[error("provisioning could not start: {0}")]
    Provisioning(String),

    #[error("no provisioning pending for {uuid} at {address}")]
    Unrequested { uuid: DeviceUuid, address: MeshAddress },

    #[error("commissioning storage failed: {0}")]
    Storage(String),
}

/// The mesh stack's commissioning database and key management.
///
/// Everything cryptographic lives behind this trait.
pub trait Commissioner {
    /// All provisioned nodes, including the provisioner itself.
    fn nodes(&self) -> Vec<CommissionedNode>;

    /// Start provisioning `uuid` at `address`. Completion arrives as a
    /// [`NodeAdded`] event.
    fn start_provisioning(&mut self, uuid: DeviceUuid, address: MeshAddress) -> Result<(), CommissionError>;

    /// Record a confirmed node as provisioned but not yet configured.
    fn node_added(&mut self, added: NodeAdded) -> Result<(), CommissionError>;

    /// Add the application key, bind the vendor model, mark the node
    /// configured and persist the database.
    fn configure(&mut self, address: MeshAddress) -> Result<(), CommissionError>;
}
