//! Gossip Engine - neighbour discovery and two-hop topology propagation.
//!
//! The engine handles one inbound message at a time. Each message:
//!
//! 1. refreshes the direct edge to its sender (RSSI and estimated distance),
//! 2. applies the message kind (introduction, neighbour, telemetry, two-hop
//!    edge, two-hop update) to the [`TopologyTable`],
//! 3. triggers a forwarding pass: telemetry to every direct neighbour, and a
//!    `T`/`U` pair to the sender for every other direct neighbour,
//! 4. re-renders the table.
//!
//! Two-hop knowledge therefore spreads one hop per exchange.
//!
//! The table is not owned by the engine. Callers pass it in by exclusive
//! reference, which is what keeps the engine and the provisioning
//! coordinator from writing to it at the same time.

use beacon_topology::{
    estimate_distance, rounded_metres, AppendError, EdgeRecord, MeshAddress, ShortName, Telemetry,
    TopologyTable, PROXIMITY_THRESHOLD_M,
};
use tracing::{debug, info, trace, warn};

use crate::codec::{DecodeError, Message, MessageKind};
use crate::error::Result;
use crate::interfaces::{
    Inbound, LocalIdentity, MeshTransport, NodeState, SelfRecord, SensorSource, TopologyOutput,
};

/// Configuration for a gossip engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Estimated distance below which the proximity indication fires.
    pub proximity_threshold_m: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            proximity_threshold_m: PROXIMITY_THRESHOLD_M,
        }
    }
}

impl EngineConfig {
    /// Set the proximity threshold.
    #[must_use]
    pub fn with_proximity_threshold(mut self, metres: f64) -> Self {
        self.proximity_threshold_m = metres;
        self
    }
}

/// Why a message was dropped before any processing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// The local node has no address yet.
    NotProvisioned,
    /// The sender is the local node.
    FromSelf,
    /// The sender has no address.
    FromUnassigned,
}

/// What handling one message did.
#[derive(Debug, Clone, PartialEq)]
pub struct HandleReport {
    pub kind: MessageKind,
    pub distance: f64,
    pub proximity: bool,
    /// Slots of newly appended edges.
    pub appended: Vec<usize>,
    /// Edges refused by the table.
    pub dropped: usize,
    /// Messages handed to the transport.
    pub sent: usize,
    /// Sends the transport refused.
    pub send_failures: usize,
}

impl HandleReport {
    fn new(kind: MessageKind, distance: f64, proximity: bool) -> Self {
        Self {
            kind,
            distance,
            proximity,
            appended: Vec::new(),
            dropped: 0,
            sent: 0,
            send_failures: 0,
        }
    }
}

/// Result of [`GossipEngine::handle`].
#[derive(Debug, Clone, PartialEq)]
pub enum HandleOutcome {
    Ignored(IgnoreReason),
    /// The payload did not decode; the table was not touched.
    Malformed(DecodeError),
    Handled(HandleReport),
}

impl HandleOutcome {
    /// The report, if the message was processed.
    pub fn report(&self) -> Option<&HandleReport> {
        match self {
            Self::Handled(report) => Some(report),
            _ => None,
        }
    }
}

/// The per-node protocol state machine.
#[derive(Debug)]
pub struct GossipEngine<T, O, S> {
    identity: LocalIdentity,
    state: NodeState,
    admitted: bool,
    introducer: Option<(MeshAddress, ShortName)>,
    config: EngineConfig,
    transport: T,
    output: O,
    sensor: S,
}

impl<T, O, S> GossipEngine<T, O, S>
where
    T: MeshTransport,
    O: TopologyOutput,
    S: SensorSource,
{
    /// Create an engine for a node that still has to be provisioned.
    pub fn new(identity: LocalIdentity, transport: T, output: O, sensor: S, config: EngineConfig) -> Self {
        let state = if identity.address.is_unassigned() {
            NodeState::Unprovisioned
        } else {
            NodeState::Provisioned
        };

        debug!(
            uuid = %identity.uuid.short_hex(2),
            address = %identity.address,
            state = %state,
            "Created gossip engine"
        );

        Self {
            identity,
            state,
            admitted: false,
            introducer: None,
            config,
            transport,
            output,
            sensor,
        }
    }

    /// Create an engine for the provisioner, which admits itself.
    pub fn for_provisioner(
        identity: LocalIdentity,
        transport: T,
        output: O,
        sensor: S,
        config: EngineConfig,
    ) -> Self {
        let mut engine = Self::new(identity, transport, output, sensor, config);
        engine.admitted = true;
        engine
    }

    /// Local identity.
    pub fn identity(&self) -> &LocalIdentity {
        &self.identity
    }

    /// Current lifecycle state.
    pub const fn state(&self) -> NodeState {
        self.state
    }

    /// Whether an introduction has been received.
    pub const fn is_admitted(&self) -> bool {
        self.admitted
    }

    /// Node that introduced us, if any.
    pub fn introducer(&self) -> Option<&(MeshAddress, ShortName)> {
        self.introducer.as_ref()
    }

    /// Header record for rendering.
    pub fn self_record(&self) -> SelfRecord {
        SelfRecord {
            identity: self.identity.clone(),
            state: self.state,
            admitted: self.admitted,
            introducer: self.introducer.clone(),
            telemetry: self.sensor.telemetry(),
        }
    }

    /// The mesh assigned `address` to this node.
    pub fn on_provisioned(&mut self, table: &mut TopologyTable, address: MeshAddress) {
        if address.is_unassigned() {
            warn!("Ignoring provisioning with the unassigned address");
            return;
        }
        info!(address = %address, "Provisioning complete");
        self.identity.address = address;
        self.state = NodeState::Provisioned;
        table.assign_local(address);
        self.render(table);
    }

    /// Process one inbound message to completion.
    pub fn handle(&mut self, table: &mut TopologyTable, inbound: &Inbound) -> HandleOutcome {
        if self.state != NodeState::Provisioned {
            return HandleOutcome::Ignored(IgnoreReason::NotProvisioned);
        }
        let local = self.identity.address;
        let sender = inbound.sender;
        if sender == local {
            return HandleOutcome::Ignored(IgnoreReason::FromSelf);
        }
        if sender.is_unassigned() {
            return HandleOutcome::Ignored(IgnoreReason::FromUnassigned);
        }

        let distance = estimate_distance(inbound.rssi);
        let proximity = distance < self.config.proximity_threshold_m;
        if proximity {
            trace!(sender = %sender, distance, "Neighbour within proximity threshold");
            self.output.notify_proximity();
        }

        let message = match Message::decode(&inbound.payload) {
            Ok(message) => message,
            Err(err) => {
                warn!(sender = %sender, error = %err, "Dropping malformed payload");
                return HandleOutcome::Malformed(err);
            }
        };

        debug!(
            sender = %sender,
            rssi = inbound.rssi,
            distance,
            message = %message,
            "Received message"
        );

        let mut report = HandleReport::new(message.kind(), distance, proximity);

        match &message {
            Message::Introduce {
                introducer,
                assigned,
            } => self.apply_introduce(table, sender, introducer, assigned, &mut report),
            Message::Neighbour { neighbour, name } => {
                self.apply_neighbour(table, *neighbour, name, &mut report)
            }
            _ => {}
        }

        table.update_self_edge(sender, inbound.rssi, distance);

        match &message {
            Message::Telemetry {
                name,
                temperature,
                humidity,
            } => {
                let telemetry = Telemetry::new(*temperature, *humidity);
                if !table.update_self_edge_telemetry(sender, name.clone(), telemetry) {
                    trace!(sender = %sender, "Telemetry from node without a direct edge");
                }
            }
            Message::TwoHop { neighbour, name } => {
                self.apply_two_hop(table, sender, *neighbour, name, &mut report)
            }
            Message::TwoHopUpdate {
                neighbour,
                distance,
                observer,
            } => {
                if table.exists_as_two_hop_edge(sender, *neighbour) {
                    table.update_two_hop_edge(sender, *neighbour, f64::from(*distance), observer.clone());
                }
            }
            _ => {}
        }

        self.forward(table, sender, &mut report);
        self.render(table);

        HandleOutcome::Handled(report)
    }

    /// Push the current table to the output surface.
    pub fn render(&self, table: &TopologyTable) {
        let snapshot = table.snapshot();
        for (i, edge) in snapshot.edges.iter().enumerate() {
            debug!(
                record = i + 1,
                observer = %edge.observer,
                observer_name = %edge.observer_name,
                observed = %edge.observed,
                observed_name = %edge.observed_name,
                temperature = ?edge.observed_telemetry.temperature,
                humidity = ?edge.observed_telemetry.humidity,
                distance = ?edge.distance,
                rssi = ?edge.rssi,
                "Topology record"
            );
        }
        self.output.render_topology(&self.self_record(), &snapshot);
    }

    fn apply_introduce(
        &mut self,
        table: &mut TopologyTable,
        sender: MeshAddress,
        introducer: &ShortName,
        assigned: &ShortName,
        report: &mut HandleReport,
    ) {
        info!(
            introducer = %sender,
            introducer_name = %introducer,
            name = %assigned,
            "Admitted to mesh"
        );
        self.identity.name = assigned.clone();
        self.introducer = Some((sender, introducer.clone()));
        self.admitted = true;

        if !table.exists_as_my_neighbor(sender) {
            let edge = EdgeRecord::new(
                self.identity.address,
                self.identity.name.clone(),
                sender,
                introducer.clone(),
            )
            .with_observer_telemetry(self.sensor.telemetry());
            Self::record_append(table.append(edge), report);
        }
    }

    fn apply_neighbour(
        &mut self,
        table: &mut TopologyTable,
        neighbour: MeshAddress,
        name: &ShortName,
        report: &mut HandleReport,
    ) {
        if table.exists_as_my_neighbor(neighbour) {
            return;
        }
        let edge = EdgeRecord::new(
            self.identity.address,
            self.identity.name.clone(),
            neighbour,
            name.clone(),
        )
        .with_observer_telemetry(self.sensor.telemetry());
        Self::record_append(table.append(edge), report);
    }

    fn apply_two_hop(
        &mut self,
        table: &mut TopologyTable,
        sender: MeshAddress,
        neighbour: MeshAddress,
        name: &ShortName,
        report: &mut HandleReport,
    ) {
        if neighbour.is_unassigned() || neighbour == self.identity.address {
            return;
        }
        if table.exists_as_two_hop_edge(sender, neighbour) {
            return;
        }
        // Until a U arrives, name the observer after our own edge to it.
        let observer_name = table
            .find_self_edge(sender)
            .and_then(|i| table.get(i))
            .map(|e| e.observed_name.clone())
            .unwrap_or_default();
        let edge = EdgeRecord::new(sender, observer_name, neighbour, name.clone());
        Self::record_append(table.append(edge), report);
    }

    fn record_append(result: std::result::Result<usize, AppendError>, report: &mut HandleReport) {
        match result {
            Ok(index) => report.appended.push(index),
            Err(err) => {
                debug!(error = %err, "Edge dropped");
                report.dropped += 1;
            }
        }
    }

    fn forward(&self, table: &TopologyTable, sender: MeshAddress, report: &mut HandleReport) {
        let telemetry = Message::Telemetry {
            name: self.identity.name.clone(),
            temperature: self.sensor.temperature_celsius(),
            humidity: self.sensor.humidity_percent(),
        };

        for edge in table.self_edges() {
            self.tally(self.send(edge.observed, &telemetry), report);

            if edge.observed != sender {
                let two_hop = Message::TwoHop {
                    neighbour: edge.observed,
                    name: edge.observed_name.clone(),
                };
                self.tally(self.send(sender, &two_hop), report);

                let update = Message::TwoHopUpdate {
                    neighbour: edge.observed,
                    distance: rounded_metres(edge.distance.unwrap_or_default()),
                    observer: self.identity.name.clone(),
                };
                self.tally(self.send(sender, &update), report);
            }
        }
    }

    /// Returns `Ok(false)` when the destination is skipped.
    fn send(&self, destination: MeshAddress, message: &Message) -> Result<bool> {
        if destination == self.identity.address || destination.is_unassigned() {
            return Ok(false);
        }
        let payload = message.encode();
        self.transport.send(destination, &payload)?;
        debug!(destination = %destination, message = %message, "Sent message");
        Ok(true)
    }

    fn tally(&self, result: Result<bool>, report: &mut HandleReport) {
        match result {
            Ok(true) => report.sent += 1,
            Ok(false) => {}
            Err(err) => {
                warn!(error = %err, "Send failed");
                report.send_failures += 1;
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use beacon_topology::DeviceUuid;
    use std::cell::{Cell, RefCell};

    #[derive(Default)]
    pub(crate) struct RecordingTransport {
        pub sent: RefCell<Vec<(MeshAddress, String)>>,
        pub fail_to: Option<MeshAddress>,
    }

    impl MeshTransport for RecordingTransport {
        fn send(&self, destination: MeshAddress, payload: &[u8]) -> std::result::Result<(), crate::SendError> {
            if self.fail_to == Some(destination) {
                return Err(crate::SendError::new(destination, "link down"));
            }
            self.sent
                .borrow_mut()
                .push((destination, String::from_utf8_lossy(payload).into_owned()));
            Ok(())
        }

        fn local_address(&self) -> MeshAddress {
            MeshAddress::UNASSIGNED
        }
    }

    #[derive(Default)]
    pub(crate) struct RecordingOutput {
        pub renders: Cell<usize>,
        pub proximity: Cell<usize>,
        pub last_edges: Cell<usize>,
    }

    impl TopologyOutput for RecordingOutput {
        fn render_topology(&self, _local: &SelfRecord, snapshot: &beacon_topology::TopologySnapshot) {
            self.renders.set(self.renders.get() + 1);
            self.last_edges.set(snapshot.edges.len());
        }

        fn notify_proximity(&self) {
            self.proximity.set(self.proximity.get() + 1);
        }
    }

    pub(crate) struct FixedSensor;

    impl SensorSource for FixedSensor {
        fn temperature_celsius(&self) -> i32 {
            23
        }

        fn humidity_percent(&self) -> i32 {
            41
        }
    }

    const ME: MeshAddress = MeshAddress(0x0001);
    const PROVISIONER: MeshAddress = MeshAddress(0x0006);
    const FAR_RSSI: i8 = -80;

    type TestEngine = GossipEngine<RecordingTransport, RecordingOutput, FixedSensor>;

    fn engine(address: MeshAddress, name: &str) -> TestEngine {
        GossipEngine::new(
            LocalIdentity::new(DeviceUuid([0xbb; 16]), ShortName::new(name), address),
            RecordingTransport::default(),
            RecordingOutput::default(),
            FixedSensor,
            EngineConfig::default(),
        )
    }

    fn direct(observed: u16, name: &str) -> EdgeRecord {
        EdgeRecord::new(ME, ShortName::new("N1"), MeshAddress(observed), ShortName::new(name))
    }

    fn sent(engine: &TestEngine) -> Vec<(MeshAddress, String)> {
        engine.transport.sent.borrow().clone()
    }

    #[test]
    fn unprovisioned_engine_ignores_messages() {
        let mut engine = engine(MeshAddress::UNASSIGNED, "");
        let mut table = TopologyTable::new(10);
        let outcome = engine.handle(&mut table, &Inbound::new(PROVISIONER, "Q=P=N1", FAR_RSSI));
        assert_eq!(outcome, HandleOutcome::Ignored(IgnoreReason::NotProvisioned));
        assert!(table.is_empty());
    }

    #[test]
    fn provisioning_enables_gossip() {
        let mut engine = engine(MeshAddress::UNASSIGNED, "");
        let mut table = TopologyTable::new(10);
        engine.on_provisioned(&mut table, ME);
        assert_eq!(engine.state(), NodeState::Provisioned);
        assert_eq!(table.local(), ME);
        assert_eq!(engine.output.renders.get(), 1);
    }

    #[test]
    fn rejects_self_and_unassigned_senders() {
        let mut engine = engine(ME, "N1");
        let mut table = TopologyTable::with_local(ME, 10);
        assert_eq!(
            engine.handle(&mut table, &Inbound::new(ME, "S=N1=1=1", -40)),
            HandleOutcome::Ignored(IgnoreReason::FromSelf)
        );
        assert_eq!(
            engine.handle(&mut table, &Inbound::new(MeshAddress::UNASSIGNED, "S=N1=1=1", -40)),
            HandleOutcome::Ignored(IgnoreReason::FromUnassigned)
        );
        assert_eq!(engine.output.proximity.get(), 0);
    }

    #[test]
    fn introduction_seeds_edge_to_introducer() {
        let mut engine = engine(ME, "");
        let mut table = TopologyTable::with_local(ME, 10);

        let outcome = engine.handle(&mut table, &Inbound::new(PROVISIONER, "Q=P=N1", FAR_RSSI));
        let report = outcome.report().unwrap();
        assert_eq!(report.kind, MessageKind::Introduce);
        assert_eq!(report.appended, vec![0]);

        assert_eq!(table.len(), 1);
        let edge = table.get(0).unwrap();
        assert_eq!(edge.observer, ME);
        assert_eq!(edge.observer_name.as_str(), "N1");
        assert_eq!(edge.observed, PROVISIONER);
        assert_eq!(edge.observed_name.as_str(), "P");
        assert_eq!(edge.observer_telemetry, Telemetry::new(23, 41));
        assert_eq!(edge.rssi, Some(FAR_RSSI));

        assert!(engine.is_admitted());
        assert_eq!(engine.identity().name.as_str(), "N1");
        assert_eq!(engine.introducer(), Some(&(PROVISIONER, ShortName::new("P"))));

        // Telemetry goes back to the only neighbour; no T/U to the sender itself.
        assert_eq!(sent(&engine), vec![(PROVISIONER, "S=N1=23=41".to_string())]);
    }

    #[test]
    fn neighbour_announcement_adds_second_edge() {
        let mut engine = engine(ME, "N1");
        let mut table = TopologyTable::with_local(ME, 10);
        table.append(direct(0x0007, "N7")).unwrap();

        let outcome = engine.handle(&mut table, &Inbound::new(PROVISIONER, "R=3=N3", FAR_RSSI));
        assert_eq!(outcome.report().unwrap().appended, vec![1]);
        assert_eq!(table.len(), 2);
        let edge = table.get(1).unwrap();
        assert_eq!(edge.observer, ME);
        assert_eq!(edge.observed, MeshAddress(0x0003));
        assert_eq!(edge.observed_name.as_str(), "N3");
        assert!(!edge.observed_telemetry.is_known());
    }

    #[test]
    fn neighbour_announcement_for_known_or_self_is_ignored() {
        let mut engine = engine(ME, "N1");
        let mut table = TopologyTable::with_local(ME, 10);
        table.append(direct(0x0003, "N3")).unwrap();

        engine.handle(&mut table, &Inbound::new(PROVISIONER, "R=3=N3", FAR_RSSI));
        engine.handle(&mut table, &Inbound::new(PROVISIONER, "R=1=N1", FAR_RSSI));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn strong_signal_triggers_proximity() {
        let mut engine = engine(ME, "N1");
        let mut table = TopologyTable::with_local(ME, 10);
        let outcome = engine.handle(&mut table, &Inbound::new(PROVISIONER, "Q=P=N1", -45));
        let report = outcome.report().unwrap();
        assert!(report.proximity);
        assert!(report.distance < 2.0);
        assert_eq!(engine.output.proximity.get(), 1);
    }

    #[test]
    fn proximity_threshold_is_configurable() {
        let mut engine = GossipEngine::new(
            LocalIdentity::new(DeviceUuid([0xbb; 16]), ShortName::new("N1"), ME),
            RecordingTransport::default(),
            RecordingOutput::default(),
            FixedSensor,
            EngineConfig::default().with_proximity_threshold(5.0),
        );
        let mut table = TopologyTable::with_local(ME, 10);

        // About 3.4 m: outside the default threshold, inside 5 m.
        let outcome = engine.handle(&mut table, &Inbound::new(PROVISIONER, "S=P=20=50", -73));
        let report = outcome.report().unwrap();
        assert!(report.distance > 2.0 && report.distance < 5.0);
        assert!(report.proximity);
        assert_eq!(engine.output.proximity.get(), 1);
    }

    #[test]
    fn every_message_refreshes_sender_signal() {
        let mut engine = engine(ME, "N1");
        let mut table = TopologyTable::with_local(ME, 10);
        table.append(direct(0x0006, "P")).unwrap();

        engine.handle(&mut table, &Inbound::new(PROVISIONER, "T=9=N9", -59));
        let edge = table.get(0).unwrap();
        assert_eq!(edge.rssi, Some(-59));
        assert!((edge.distance.unwrap() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn telemetry_updates_sender_edge() {
        let mut engine = engine(ME, "N1");
        let mut table = TopologyTable::with_local(ME, 10);
        table.append(direct(0x0006, "")).unwrap();

        engine.handle(&mut table, &Inbound::new(PROVISIONER, "S=P=19=55", FAR_RSSI));
        let edge = table.get(0).unwrap();
        assert_eq!(edge.observed_name.as_str(), "P");
        assert_eq!(edge.observed_telemetry, Telemetry::new(19, 55));
    }

    #[test]
    fn two_hop_then_update() {
        let mut engine = engine(ME, "N1");
        let mut table = TopologyTable::with_local(ME, 10);
        table.append(direct(0x0006, "P")).unwrap();

        engine.handle(&mut table, &Inbound::new(PROVISIONER, "T=2=N2", FAR_RSSI));
        assert_eq!(table.len(), 2);
        let two_hop = table.get(1).unwrap();
        assert_eq!(two_hop.observer, PROVISIONER);
        assert_eq!(two_hop.observer_name.as_str(), "P");
        assert_eq!(two_hop.observed, MeshAddress(0x0002));
        assert_eq!(two_hop.observed_name.as_str(), "N2");

        // Repeated T does not duplicate.
        engine.handle(&mut table, &Inbound::new(PROVISIONER, "T=2=N2", FAR_RSSI));
        assert_eq!(table.len(), 2);

        engine.handle(&mut table, &Inbound::new(PROVISIONER, "U=2=3=Px", FAR_RSSI));
        let two_hop = table.get(1).unwrap();
        assert_eq!(two_hop.distance, Some(3.0));
        assert_eq!(two_hop.observer_name.as_str(), "Px");
    }

    #[test]
    fn two_hop_about_self_or_unassigned_is_ignored() {
        let mut engine = engine(ME, "N1");
        let mut table = TopologyTable::with_local(ME, 10);
        table.append(direct(0x0006, "P")).unwrap();

        engine.handle(&mut table, &Inbound::new(PROVISIONER, "T=1=N1", FAR_RSSI));
        engine.handle(&mut table, &Inbound::new(PROVISIONER, "T=0=N0", FAR_RSSI));
        engine.handle(&mut table, &Inbound::new(PROVISIONER, "T=x=N0", FAR_RSSI));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn update_without_two_hop_edge_is_noop() {
        let mut engine = engine(ME, "N1");
        let mut table = TopologyTable::with_local(ME, 10);
        table.append(direct(0x0006, "P")).unwrap();
        let before = table.snapshot();

        engine.handle(&mut table, &Inbound::new(PROVISIONER, "U=4=3=P", -59));
        // Only the sender edge's signal moves.
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(0).unwrap().observed_name, before.edges[0].observed_name);
    }

    #[test]
    fn forwarding_announces_other_neighbours_to_sender() {
        let mut engine = engine(ME, "N1");
        let mut table = TopologyTable::with_local(ME, 10);
        table.append(direct(0x0006, "P").with_signal(-59, 1.0)).unwrap();
        table.append(direct(0x0003, "N3").with_signal(-86, 10.0)).unwrap();

        let outcome = engine.handle(&mut table, &Inbound::new(PROVISIONER, "S=P=20=50", -59));
        assert_eq!(outcome.report().unwrap().sent, 4);

        assert_eq!(
            sent(&engine),
            vec![
                (PROVISIONER, "S=N1=23=41".to_string()),
                (MeshAddress(0x0003), "S=N1=23=41".to_string()),
                (PROVISIONER, "T=3=N3".to_string()),
                (PROVISIONER, "U=3=10=N1".to_string()),
            ]
        );
    }

    #[test]
    fn send_failures_are_counted_not_fatal() {
        let mut engine = engine(ME, "N1");
        engine.transport.fail_to = Some(MeshAddress(0x0003));
        let mut table = TopologyTable::with_local(ME, 10);
        table.append(direct(0x0006, "P")).unwrap();
        table.append(direct(0x0003, "N3")).unwrap();

        let outcome = engine.handle(&mut table, &Inbound::new(PROVISIONER, "S=P=20=50", FAR_RSSI));
        let report = outcome.report().unwrap();
        assert_eq!(report.send_failures, 1);
        assert_eq!(report.sent, 3);
        assert_eq!(engine.output.renders.get(), 1);
    }

    #[test]
    fn full_table_drops_silently() {
        let mut engine = engine(ME, "N1");
        let mut table = TopologyTable::with_local(ME, 1);
        table.append(direct(0x0006, "P")).unwrap();

        let outcome = engine.handle(&mut table, &Inbound::new(PROVISIONER, "R=3=N3", FAR_RSSI));
        let report = outcome.report().unwrap();
        assert_eq!(report.dropped, 1);
        assert!(report.appended.is_empty());
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(0).unwrap().rssi, Some(FAR_RSSI));
    }

    #[test]
    fn malformed_payload_leaves_table_untouched() {
        let mut engine = engine(ME, "N1");
        let mut table = TopologyTable::with_local(ME, 10);
        table.append(direct(0x0006, "P")).unwrap();

        let outcome = engine.handle(&mut table, &Inbound::new(PROVISIONER, "S=P=20", -40));
        assert!(matches!(outcome, HandleOutcome::Malformed(DecodeError::Incomplete { .. })));
        assert_eq!(table.get(0).unwrap().rssi, None);
        assert!(sent(&engine).is_empty());
        assert_eq!(engine.output.renders.get(), 0);
    }

    #[test]
    fn provisioner_engine_is_admitted() {
        let engine = GossipEngine::for_provisioner(
            LocalIdentity::new(DeviceUuid::default(), ShortName::new("P"), PROVISIONER),
            RecordingTransport::default(),
            RecordingOutput::default(),
            FixedSensor,
            EngineConfig::default(),
        );
        assert!(engine.is_admitted());
        assert_eq!(engine.state(), NodeState::Provisioned);
        assert!(engine.self_record().admitted);
    }
}
