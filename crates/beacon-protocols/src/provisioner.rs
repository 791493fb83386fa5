//! Provisioning Coordinator - admits new nodes into the mesh.
//!
//! Runs only on the provisioner, as a loop of steps. Each [`step`] does:
//!
//! 1. walk the commissioning database: configure what is unconfigured and
//!    announce the provisioner's neighbours to every configured peer,
//! 2. wait (bounded) for an unprovisioned beacon,
//! 3. pick an address and start provisioning,
//! 4. wait (bounded) for the confirmation,
//! 5. configure the new node, send it `Q` and seed the self→new-node edge.
//!
//! Any timeout abandons the attempt. The next step starts over with a walk,
//! so a node whose configuration failed is retried there.
//!
//! [`step`]: ProvisioningCoordinator::step

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use beacon_topology::{DeviceUuid, EdgeRecord, MeshAddress, ShortName, TopologyTable, ADDRESS_SUFFIX_MASK};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tokio::sync::{mpsc, RwLock};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::codec::Message;
use crate::error::{Error, Result};
use crate::interfaces::{Commissioner, LocalIdentity, MeshTransport, NodeAdded, SensorSource};

/// How a new node's address is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressAssignment {
    /// Suffix `table.len() + 1`, skipping addresses in use.
    #[default]
    Sequential,
    /// Uniform over the free suffixes.
    Random,
}

impl std::str::FromStr for AddressAssignment {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sequential" => Ok(Self::Sequential),
            "random" => Ok(Self::Random),
            other => Err(format!("unknown address mode '{other}'")),
        }
    }
}

/// Configuration for the provisioning coordinator.
#[derive(Debug, Clone)]
pub struct ProvisionerConfig {
    /// Wait for an unprovisioned beacon.
    pub scan_timeout: Duration,

    /// Wait for provisioning confirmation.
    pub provision_timeout: Duration,

    pub assignment: AddressAssignment,
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        Self {
            scan_timeout: Duration::from_secs(5),
            provision_timeout: Duration::from_secs(10),
            assignment: AddressAssignment::Sequential,
        }
    }
}

impl ProvisionerConfig {
    /// Set the scan timeout.
    #[must_use]
    pub fn with_scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = timeout;
        self
    }

    /// Set the provisioning confirmation timeout.
    #[must_use]
    pub fn with_provision_timeout(mut self, timeout: Duration) -> Self {
        self.provision_timeout = timeout;
        self
    }

    /// Set the address assignment mode.
    #[must_use]
    pub fn with_assignment(mut self, assignment: AddressAssignment) -> Self {
        self.assignment = assignment;
        self
    }
}

/// How one step ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    /// No beacon within the scan timeout.
    ScanTimedOut,
    /// A beacon was seen but every address is taken.
    AddressSpaceExhausted,
    /// The commissioner refused to start provisioning.
    ProvisioningFailed(DeviceUuid),
    /// No confirmation within the provisioning timeout.
    ProvisionTimedOut(DeviceUuid),
    /// Provisioned but configuration failed; retried on the next walk.
    ConfigureFailed(MeshAddress),
    /// A node was admitted.
    Provisioned { uuid: DeviceUuid, address: MeshAddress, name: ShortName },
    /// The beacon or confirmation source is gone. Ends [`run`](ProvisioningCoordinator::run).
    Closed,
}

/// What one commissioning-database walk did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkReport {
    pub configured: Vec<MeshAddress>,
    pub announcements: usize,
    pub failures: usize,
}

/// The provisioner's admission loop.
pub struct ProvisioningCoordinator<C, T, S> {
    identity: LocalIdentity,
    topology: Arc<RwLock<TopologyTable>>,
    commissioner: C,
    transport: T,
    sensor: S,
    beacons: mpsc::Receiver<DeviceUuid>,
    added: mpsc::Receiver<NodeAdded>,
    config: ProvisionerConfig,
    rng: StdRng,
    walks: u64,
}

impl<C, T, S> ProvisioningCoordinator<C, T, S>
where
    C: Commissioner,
    T: MeshTransport,
    S: SensorSource,
{
    /// Create a coordinator.
    ///
    /// `beacons` delivers UUIDs of unprovisioned nodes; `added` delivers
    /// provisioning confirmations.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        identity: LocalIdentity,
        topology: Arc<RwLock<TopologyTable>>,
        commissioner: C,
        transport: T,
        sensor: S,
        beacons: mpsc::Receiver<DeviceUuid>,
        added: mpsc::Receiver<NodeAdded>,
        config: ProvisionerConfig,
    ) -> Self {
        Self {
            identity,
            topology,
            commissioner,
            transport,
            sensor,
            beacons,
            added,
            config,
            rng: StdRng::from_entropy(),
            walks: 0,
        }
    }

    /// Use a seeded generator for random address assignment.
    #[must_use]
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Number of completed commissioning-database walks.
    pub const fn walk_count(&self) -> u64 {
        self.walks
    }

    pub fn commissioner(&self) -> &C {
        &self.commissioner
    }

    /// Step until the event sources close.
    pub async fn run(&mut self) {
        info!(
            address = %self.identity.address,
            name = %self.identity.name,
            "Provisioning coordinator started"
        );
        loop {
            match self.step().await {
                StepOutcome::Closed => break,
                outcome => debug!(outcome = ?outcome, "Provisioning step finished"),
            }
        }
        info!("Provisioning coordinator stopped");
    }

    /// One pass of the admission loop.
    pub async fn step(&mut self) -> StepOutcome {
        self.discard_stale_events();
        self.walk().await;

        let uuid = match timeout(self.config.scan_timeout, self.beacons.recv()).await {
            Err(_) => {
                debug!(timeout = ?self.config.scan_timeout, "No unprovisioned beacon");
                return StepOutcome::ScanTimedOut;
            }
            Ok(None) => return StepOutcome::Closed,
            Ok(Some(uuid)) => uuid,
        };
        info!(uuid = %uuid.short_hex(2), "Unprovisioned beacon detected");

        let address = match self.next_address().await {
            Ok(address) => address,
            Err(err) => {
                warn!(uuid = %uuid.short_hex(2), error = %err, "Cannot assign an address");
                return StepOutcome::AddressSpaceExhausted;
            }
        };

        if let Err(err) = self.commissioner.start_provisioning(uuid, address) {
            warn!(uuid = %uuid.short_hex(2), error = %err, "Provisioning failed to start");
            return StepOutcome::ProvisioningFailed(uuid);
        }

        let added = match self.await_confirmation(uuid).await {
            Ok(Some(added)) => added,
            Ok(None) => return StepOutcome::Closed,
            Err(err) => {
                warn!(uuid = %uuid.short_hex(2), error = %err, "Provisioning abandoned");
                return StepOutcome::ProvisionTimedOut(uuid);
            }
        };
        info!(uuid = %uuid.short_hex(2), address = %added.address, "Node provisioned");

        let result = match self.commissioner.node_added(added) {
            Ok(()) => self.configure_node(added.address).await,
            Err(err) => Err(err.into()),
        };
        match result {
            Ok(name) => StepOutcome::Provisioned {
                uuid,
                address: added.address,
                name,
            },
            Err(err) => {
                warn!(address = %added.address, error = %err, "Configuring new node failed");
                StepOutcome::ConfigureFailed(added.address)
            }
        }
    }

    /// Walk the commissioning database.
    pub async fn walk(&mut self) -> WalkReport {
        let mut report = WalkReport::default();
        let local = self.identity.address;

        for node in self.commissioner.nodes() {
            if !node.configured {
                let result = if node.address == local {
                    self.configure_self()
                } else {
                    self.configure_node(node.address).await.map(|_| ())
                };
                match result {
                    Ok(()) => report.configured.push(node.address),
                    Err(err) => {
                        warn!(address = %node.address, error = %err, "Configuration failed");
                        report.failures += 1;
                    }
                }
            } else if node.address != local {
                let (sent, failed) = self.announce_neighbours(node.address).await;
                report.announcements += sent;
                report.failures += failed;
            }
        }

        self.walks += 1;
        report
    }

    fn configure_self(&mut self) -> Result<()> {
        self.commissioner.configure(self.identity.address)?;
        info!(address = %self.identity.address, "Provisioner configured");
        Ok(())
    }

    /// Configure, introduce and seed the edge to a freshly provisioned node.
    async fn configure_node(&mut self, address: MeshAddress) -> Result<ShortName> {
        self.commissioner.configure(address)?;

        let mut table = self.topology.write().await;
        let name = ShortName::new(&format!("N{}", table.len() + 1));

        let intro = Message::Introduce {
            introducer: self.identity.name.clone(),
            assigned: name.clone(),
        };
        match self.transport.send(address, &intro.encode()) {
            Ok(()) => debug!(destination = %address, message = %intro, "Sent message"),
            Err(err) => warn!(error = %err, "Introduction not delivered"),
        }

        let edge = EdgeRecord::new(self.identity.address, self.identity.name.clone(), address, name.clone())
            .with_observer_telemetry(self.sensor.telemetry());
        if let Err(err) = table.append(edge) {
            debug!(address = %address, error = %err, "Edge to new node dropped");
        }

        info!(address = %address, name = %name, "Node configured");
        Ok(name)
    }

    /// Send `peer` an `R` for each of our direct neighbours other than itself.
    async fn announce_neighbours(&self, peer: MeshAddress) -> (usize, usize) {
        let table = self.topology.read().await;
        let mut sent = 0;
        let mut failed = 0;
        for edge in table.self_edges() {
            if edge.observed == peer || edge.observed.is_unassigned() {
                continue;
            }
            let message = Message::Neighbour {
                neighbour: edge.observed,
                name: edge.observed_name.clone(),
            };
            match self.transport.send(peer, &message.encode()) {
                Ok(()) => {
                    debug!(destination = %peer, message = %message, "Sent message");
                    sent += 1;
                }
                Err(err) => {
                    warn!(error = %err, "Send failed");
                    failed += 1;
                }
            }
        }
        (sent, failed)
    }

    /// Choose a free address under the shared prefix.
    async fn next_address(&mut self) -> Result<MeshAddress> {
        let mut taken: HashSet<MeshAddress> = self.commissioner.nodes().into_iter().map(|n| n.address).collect();
        taken.insert(self.identity.address);
        let table = self.topology.read().await;
        taken.extend(table.edges().iter().flat_map(|e| [e.observer, e.observed]));

        let slots = ADDRESS_SUFFIX_MASK as u8;
        let free: Vec<MeshAddress> = (1..=slots)
            .map(MeshAddress::from_suffix)
            .filter(|a| !taken.contains(a))
            .collect();

        let address = match self.config.assignment {
            AddressAssignment::Sequential => {
                let start = u8::try_from(table.len() + 1).unwrap_or(u8::MAX).clamp(1, slots);
                free.iter()
                    .find(|a| a.suffix() >= start)
                    .or_else(|| free.first())
                    .copied()
            }
            AddressAssignment::Random => free.choose(&mut self.rng).copied(),
        };
        address.ok_or(Error::AddressSpaceExhausted)
    }

    async fn await_confirmation(&mut self, uuid: DeviceUuid) -> Result<Option<NodeAdded>> {
        let limit = self.config.provision_timeout;
        let confirmations = &mut self.added;
        let wait = async move {
            while let Some(added) = confirmations.recv().await {
                if added.uuid == uuid {
                    return Some(added);
                }
                debug!(uuid = %added.uuid.short_hex(2), "Ignoring confirmation for another node");
            }
            None
        };
        timeout(limit, wait).await.map_err(|_| Error::Timeout(limit))
    }

    /// Events that arrived while nobody was waiting for them.
    fn discard_stale_events(&mut self) {
        while self.beacons.try_recv().is_ok() {}
        while self.added.try_recv().is_ok() {}
    }
}
