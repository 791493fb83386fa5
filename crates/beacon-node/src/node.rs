//! Beacon Node - the daemon runtime.
//!
//! Architecture:
//! - One UDP bearer task turning datagrams into [`BearerEvent`]s
//! - A router fanning events out to the engine and, on the provisioner, to
//!   the provisioning coordinator. Address assignment and gossip share one
//!   queue, so the engine sees its address before any message sent to it.
//! - The gossip engine loop, which owns message handling and takes the
//!   topology table's write lock for each input
//! - Provisioner only: the coordinator task, sharing the same table
//! - Beacon only: the unprovisioned announcer, silent once an address is set

use std::sync::Arc;
use std::time::Duration;

use beacon_protocols::{
    GossipEngine, HandleOutcome, Inbound, LocalIdentity, MeshTransport, NodeAdded, ProvisioningCoordinator,
};
use beacon_topology::{DeviceUuid, MeshAddress, TopologyTable};
use beacon_transfer::{BearerEvent, UdpBearer};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info, trace, warn};

use crate::commissioning::CommissioningDb;
use crate::config::{NodeConfig, Role};
use crate::display::ConsoleDisplay;
use crate::error::Result;
use crate::sensor::SimulatedSensor;

const CHANNEL_DEPTH: usize = 64;

/// Work for the engine loop, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineInput {
    /// This node accepted `address`.
    Provisioned(MeshAddress),
    /// Gossip addressed to this node.
    Message(Inbound),
}

/// Fans bearer events out to their consumers.
pub struct EventRouter {
    uuid: DeviceUuid,
    bearer: Arc<UdpBearer>,
    engine: mpsc::Sender<EngineInput>,
    beacons: Option<mpsc::Sender<DeviceUuid>>,
    added: Option<mpsc::Sender<NodeAdded>>,
}

impl EventRouter {
    pub fn new(uuid: DeviceUuid, bearer: Arc<UdpBearer>, engine: mpsc::Sender<EngineInput>) -> Self {
        Self {
            uuid,
            bearer,
            engine,
            beacons: None,
            added: None,
        }
    }

    /// Also feed the provisioning coordinator.
    #[must_use]
    pub fn with_coordinator(mut self, beacons: mpsc::Sender<DeviceUuid>, added: mpsc::Sender<NodeAdded>) -> Self {
        self.beacons = Some(beacons);
        self.added = Some(added);
        self
    }

    /// Deliver one event. Returns false once the engine is gone.
    pub async fn dispatch(&self, event: BearerEvent) -> bool {
        match event {
            BearerEvent::Message(inbound) => {
                return self.engine.send(EngineInput::Message(inbound)).await.is_ok();
            }
            BearerEvent::Beacon(uuid) => {
                if let Some(beacons) = &self.beacons {
                    // A full queue means a scan is already pending.
                    let _ = beacons.try_send(uuid);
                }
            }
            BearerEvent::Complete(added) => {
                if let Some(confirmations) = &self.added {
                    let _ = confirmations.try_send(added);
                }
            }
            BearerEvent::Invite { uuid, address } if uuid == self.uuid => {
                return self.accept_invite(address).await;
            }
            BearerEvent::Invite { .. } => {}
        }
        true
    }

    async fn accept_invite(&self, address: MeshAddress) -> bool {
        let current = self.bearer.local_address();
        if !current.is_unassigned() && current != address {
            debug!(current = %current, offered = %address, "Ignoring invitation, already provisioned");
            return true;
        }

        let added = NodeAdded {
            uuid: self.uuid,
            address,
        };
        if let Err(err) = self.bearer.complete(added) {
            warn!(error = %err, "Provisioning confirmation not sent");
        }
        if current == address {
            // Repeated invitation: our confirmation was lost.
            return true;
        }

        info!(address = %address, "Accepted invitation");
        self.bearer.set_local_address(address);
        self.engine.send(EngineInput::Provisioned(address)).await.is_ok()
    }

    /// Route until the bearer stops.
    pub async fn run(self, mut events: mpsc::Receiver<BearerEvent>) {
        while let Some(event) = events.recv().await {
            if !self.dispatch(event).await {
                break;
            }
        }
        debug!("Event router stopped");
    }
}

/// Announce `uuid` until the bearer has an address.
async fn announce_until_provisioned(bearer: Arc<UdpBearer>, uuid: DeviceUuid, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    loop {
        ticker.tick().await;
        if !bearer.local_address().is_unassigned() {
            break;
        }
        match bearer.announce(uuid) {
            Ok(reached) => trace!(reached, "Unprovisioned beacon sent"),
            Err(err) => warn!(error = %err, "Unprovisioned beacon not sent"),
        }
    }
    debug!("Announcer stopped");
}

/// A Beacon node instance.
pub struct BeaconNode {
    config: NodeConfig,
    table: Arc<RwLock<TopologyTable>>,
    display: Arc<ConsoleDisplay>,
    sensor: Arc<SimulatedSensor>,
}

impl BeaconNode {
    pub fn new(config: NodeConfig) -> Self {
        let table = TopologyTable::with_local(config.address, config.table_capacity);
        Self {
            config,
            table: Arc::new(RwLock::new(table)),
            display: Arc::new(ConsoleDisplay::default()),
            sensor: Arc::new(SimulatedSensor::default()),
        }
    }

    /// Render to `display` instead of stdout.
    #[must_use]
    pub fn with_display(mut self, display: ConsoleDisplay) -> Self {
        self.display = Arc::new(display);
        self
    }

    /// Shared topology table.
    pub fn table(&self) -> Arc<RwLock<TopologyTable>> {
        Arc::clone(&self.table)
    }

    /// Run until interrupted.
    pub async fn run(self) -> Result<()> {
        let config = &self.config;
        info!("Beacon node starting");
        info!("  Role: {:?}", config.role);
        info!("  UUID: {}", config.uuid);
        info!("  Bind: {}", config.transport.bind);
        info!("  Peers: {}", config.transport.peers.len());

        let bearer = Arc::new(UdpBearer::bind(config.transport.clone()).await?);
        let identity = LocalIdentity::new(config.uuid, config.name.clone(), config.address);

        let (events_tx, events_rx) = mpsc::channel(CHANNEL_DEPTH);
        let (engine_tx, mut engine_rx) = mpsc::channel(CHANNEL_DEPTH);
        let mut router = EventRouter::new(config.uuid, bearer.clone(), engine_tx);

        let mut engine = match config.role {
            Role::Provisioner => {
                bearer.set_local_address(config.address);

                let (beacons_tx, beacons_rx) = mpsc::channel(1);
                let (added_tx, added_rx) = mpsc::channel(4);
                router = router.with_coordinator(beacons_tx, added_tx);

                let db = CommissioningDb::open(&config.data_dir, config.uuid, config.address, bearer.clone())?;
                let mut coordinator = ProvisioningCoordinator::new(
                    identity.clone(),
                    self.table.clone(),
                    db,
                    bearer.clone(),
                    self.sensor.clone(),
                    beacons_rx,
                    added_rx,
                    config.provisioner.clone(),
                );
                tokio::spawn(async move { coordinator.run().await });

                GossipEngine::for_provisioner(
                    identity,
                    bearer.clone(),
                    self.display.clone(),
                    self.sensor.clone(),
                    config.engine.clone(),
                )
            }
            Role::Beacon => {
                tokio::spawn(announce_until_provisioned(
                    bearer.clone(),
                    config.uuid,
                    config.beacon_interval,
                ));
                GossipEngine::new(
                    identity,
                    bearer.clone(),
                    self.display.clone(),
                    self.sensor.clone(),
                    config.engine.clone(),
                )
            }
        };

        let bearer_task = bearer.clone();
        tokio::spawn(async move {
            if let Err(e) = bearer_task.run(events_tx).await {
                error!("Bearer error: {}", e);
            }
        });
        tokio::spawn(router.run(events_rx));

        engine.render(&*self.table.read().await);

        loop {
            tokio::select! {
                input = engine_rx.recv() => {
                    let Some(input) = input else {
                        warn!("Engine channel closed");
                        break;
                    };
                    let mut table = self.table.write().await;
                    match input {
                        EngineInput::Provisioned(address) => engine.on_provisioned(&mut table, address),
                        EngineInput::Message(inbound) => match engine.handle(&mut table, &inbound) {
                            HandleOutcome::Handled(report) => trace!(report = ?report, "Message handled"),
                            other => debug!(sender = %inbound.sender, outcome = ?other, "Message not handled"),
                        },
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutting down");
                    break;
                }
            }
        }

        info!(proximity = self.display.proximity_count(), "Beacon node stopped");
        Ok(())
    }
}
