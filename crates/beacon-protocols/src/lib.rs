//! Beacon Protocols - Neighbour Gossip and Provisioning
//!
//! This crate holds the protocol logic of a Beacon sensor node, independent of
//! any radio or display:
//!
//! - [`codec`]: the five-kind text wire format (`Q`, `R`, `S`, `T`, `U`).
//! - [`GossipEngine`]: per-message neighbour discovery and two-hop
//!   propagation against a [`TopologyTable`](beacon_topology::TopologyTable).
//! - [`ProvisioningCoordinator`]: the provisioner's scan, provision and
//!   introduce loop.
//! - [`interfaces`]: the traits the outside world implements (transport,
//!   output, sensor, commissioning database).
//!
//! # Example
//!
//! ```rust,ignore
//! use beacon_protocols::{EngineConfig, GossipEngine, Inbound, LocalIdentity};
//! use beacon_topology::{MeshAddress, ShortName, TopologyTable};
//!
//! let mut table = TopologyTable::with_local(MeshAddress(0x0001), 10);
//! let mut engine = GossipEngine::new(identity, transport, display, sensor, EngineConfig::default());
//!
//! while let Some(inbound) = inbound_rx.recv().await {
//!     engine.handle(&mut table, &inbound);
//! }
//! ```

pub mod codec;
pub mod engine;
pub mod error;
pub mod interfaces;
pub mod provisioner;

pub use codec::{DecodeError, Message, MessageKind, MAX_PAYLOAD_LEN};
pub use engine::{EngineConfig, GossipEngine, HandleOutcome, HandleReport, IgnoreReason};
pub use error::{Error, Result};
pub use interfaces::{
    CommissionError, CommissionedNode, Commissioner, Inbound, LocalIdentity, MeshTransport, NodeAdded, NodeState,
    SelfRecord, SendError, SensorSource, TopologyOutput,
};
pub use provisioner::{AddressAssignment, ProvisionerConfig, ProvisioningCoordinator, StepOutcome, WalkReport};

#[cfg(test)]
mod scenarios {
    use super::*;
    use crate::engine::tests::{FixedSensor, RecordingOutput, RecordingTransport};
    use beacon_topology::{DeviceUuid, EdgeRecord, MeshAddress, ShortName, TopologyTable};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::{mpsc, RwLock};

    const ME: MeshAddress = MeshAddress(0x0001);

    fn node(name: &str) -> GossipEngine<RecordingTransport, RecordingOutput, FixedSensor> {
        GossipEngine::new(
            LocalIdentity::new(DeviceUuid([0x01; 16]), ShortName::new(name), ME),
            RecordingTransport::default(),
            RecordingOutput::default(),
            FixedSensor,
            EngineConfig::default(),
        )
    }

    #[test]
    fn introduction_from_provisioner() {
        let mut engine = node("");
        let mut table = TopologyTable::with_local(ME, 10);

        engine.handle(&mut table, &Inbound::new(MeshAddress(0x0006), "Q=P=N1", -70));

        assert_eq!(table.len(), 1);
        let edge = table.get(0).unwrap();
        assert_eq!((edge.observer, edge.observer_name.as_str()), (ME, "N1"));
        assert_eq!((edge.observed, edge.observed_name.as_str()), (MeshAddress(0x0006), "P"));
    }

    #[test]
    fn neighbour_announcement_appends_exactly_one() {
        let mut engine = node("N1");
        let mut table = TopologyTable::with_local(ME, 10);
        table
            .append(EdgeRecord::new(ME, ShortName::new("N1"), MeshAddress(0x0007), ShortName::new("N7")))
            .unwrap();

        engine.handle(&mut table, &Inbound::new(MeshAddress(0x0006), "R=3=N3", -70));

        assert_eq!(table.len(), 2);
        assert!(table.exists_as_my_neighbor(MeshAddress(0x0003)));
        assert!(table.exists_as_my_neighbor(MeshAddress(0x0007)));
    }

    #[test]
    fn close_neighbour_fires_proximity() {
        let mut engine = node("N1");
        let mut table = TopologyTable::with_local(ME, 10);

        let outcome = engine.handle(&mut table, &Inbound::new(MeshAddress(0x0006), "S=P=20=40", -45));

        let report = outcome.report().unwrap();
        assert!((report.distance - 10f64.powf(-14.0 / 27.0)).abs() < 1e-9);
        assert!((report.distance - 0.303).abs() < 0.001);
        assert!(report.proximity);
    }

    struct NoCommissioning(Vec<CommissionedNode>, usize);

    impl Commissioner for NoCommissioning {
        fn nodes(&self) -> Vec<CommissionedNode> {
            self.0.clone()
        }

        fn start_provisioning(&mut self, _: DeviceUuid, _: MeshAddress) -> std::result::Result<(), CommissionError> {
            Ok(())
        }

        fn node_added(&mut self, _: NodeAdded) -> std::result::Result<(), CommissionError> {
            Ok(())
        }

        fn configure(&mut self, address: MeshAddress) -> std::result::Result<(), CommissionError> {
            self.1 += 1;
            match self.0.iter_mut().find(|n| n.address == address) {
                Some(node) => {
                    node.configured = true;
                    Ok(())
                }
                None => Err(CommissionError::UnknownNode(address)),
            }
        }
    }

    #[test]
    fn repeated_scan_timeouts_keep_looping() {
        let provisioner = MeshAddress(0x0006);
        let (_beacon_tx, beacon_rx) = mpsc::channel(1);
        let (_added_tx, added_rx) = mpsc::channel(1);
        let pending = CommissionedNode {
            uuid: DeviceUuid([0x02; 16]),
            address: MeshAddress(0x0002),
            configured: false,
        };
        let mut coordinator = ProvisioningCoordinator::new(
            LocalIdentity::new(DeviceUuid([0x06; 16]), ShortName::new("P"), provisioner),
            Arc::new(RwLock::new(TopologyTable::with_local(provisioner, 10))),
            NoCommissioning(vec![pending], 0),
            Arc::new(RecordingTransport::default()),
            FixedSensor,
            beacon_rx,
            added_rx,
            ProvisionerConfig::default().with_scan_timeout(Duration::from_millis(10)),
        );

        tokio_test::block_on(async {
            assert_eq!(coordinator.step().await, StepOutcome::ScanTimedOut);
            assert_eq!(coordinator.walk_count(), 1);
            assert_eq!(coordinator.step().await, StepOutcome::ScanTimedOut);
            assert_eq!(coordinator.walk_count(), 2);
        });
        // The pending node was configured on the first walk only.
        assert_eq!(coordinator.commissioner().1, 1);
    }
}
