//! Beacon Mesh Topology
//!
//! The neighbour model of a Beacon sensor node: who is near me, and who is
//! near my neighbours.
//!
//! # Edges
//!
//! Knowledge is stored as directed [`EdgeRecord`]s, "observer sees observed".
//! Edges come in two shapes:
//!
//! - **Direct edges** have the local node as observer. They carry the last
//!   RSSI sample, the estimated distance and the neighbour's telemetry.
//! - **Two-hop edges** have a peer as observer and one of the peer's
//!   neighbours as observed. They are learned through gossip.
//!
//! # Distance
//!
//! [`estimate_distance`] applies the log-distance path-loss model with the
//! nRF52 calibration (`-59 dBm` at one metre, exponent `2.7`).
//!
//! # Addressing
//!
//! Gossip carries addresses as a single hex digit. See [`ADDRESS_PREFIX`].

mod address;
mod distance;
mod edge;
mod identity;
mod table;

pub use address::{MeshAddress, ADDRESS_PREFIX, ADDRESS_SUFFIX_MASK};
pub use distance::{
    estimate_distance, is_proximate, rounded_metres, MEASURED_POWER_AT_1M, PATH_LOSS_EXPONENT,
    PROXIMITY_THRESHOLD_M,
};
pub use edge::{EdgeRecord, Telemetry};
pub use identity::{DeviceUuid, ShortName, SHORT_NAME_LEN};
pub use table::{AppendError, TopologySnapshot, TopologyTable, DEFAULT_CAPACITY};

// The wire form can only express the suffix nibble.
const _: () = assert!(ADDRESS_SUFFIX_MASK == 0x000F && ADDRESS_PREFIX & ADDRESS_SUFFIX_MASK == 0);
