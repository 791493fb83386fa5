//! UDP advertising bearer
//!
//! Each node binds one UDP socket and knows a fixed set of radio neighbours
//! (peer sockets). Every frame is flooded to all of them, as an advertising
//! bearer would broadcast it, and receivers keep only data frames addressed to
//! them. Signal strength is not measured; each link carries a configured RSSI.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use beacon_protocols::{Inbound, MeshTransport, NodeAdded, SendError};
use beacon_topology::{DeviceUuid, MeshAddress};
use socket2::{Domain, Protocol, Socket, Type};
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::frame::{Frame, FrameError, MAX_FRAME_LEN};

/// Transport errors
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("socket: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame: {0}")]
    Frame(#[from] FrameError),
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// A radio neighbour: its socket and the signal strength we hear it at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerLink {
    pub addr: SocketAddr,
    pub rssi: Option<i8>,
}

impl std::str::FromStr for PeerLink {
    type Err = String;

    /// `host:port` or `host:port@rssi`.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (addr, rssi) = match s.split_once('@') {
            Some((addr, rssi)) => {
                let rssi = rssi
                    .trim()
                    .parse::<i8>()
                    .map_err(|e| format!("invalid rssi in '{s}': {e}"))?;
                (addr, Some(rssi))
            }
            None => (s, None),
        };
        let addr = addr
            .trim()
            .parse()
            .map_err(|e| format!("invalid peer address in '{s}': {e}"))?;
        Ok(Self { addr, rssi })
    }
}

/// Transport configuration
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Address to bind to
    pub bind: SocketAddr,
    /// Radio neighbours
    pub peers: Vec<PeerLink>,
    /// RSSI for datagrams from sockets not in `peers`, or listed without one
    pub default_rssi: i8,
    /// Send buffer size in bytes
    pub sndbuf: usize,
    /// Receive buffer size in bytes
    pub rcvbuf: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 9100)),
            peers: Vec::new(),
            default_rssi: -70,
            sndbuf: 256 * 1024,
            rcvbuf: 256 * 1024,
        }
    }
}

impl TransportConfig {
    #[must_use]
    pub fn with_bind(mut self, bind: SocketAddr) -> Self {
        self.bind = bind;
        self
    }

    #[must_use]
    pub fn with_peer(mut self, peer: PeerLink) -> Self {
        self.peers.push(peer);
        self
    }

    #[must_use]
    pub fn with_default_rssi(mut self, rssi: i8) -> Self {
        self.default_rssi = rssi;
        self
    }
}

/// Something heard on the bearer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BearerEvent {
    /// Gossip payload addressed to this node.
    Message(Inbound),
    /// An unprovisioned node is advertising.
    Beacon(DeviceUuid),
    /// The provisioner assigned `address` to `uuid`.
    Invite { uuid: DeviceUuid, address: MeshAddress },
    /// A node confirmed its address.
    Complete(NodeAdded),
}

/// Bound bearer socket.
#[derive(Debug)]
pub struct UdpBearer {
    socket: UdpSocket,
    peers: Vec<SocketAddr>,
    rssi: HashMap<SocketAddr, i8>,
    default_rssi: i8,
    local: AtomicU16,
}

impl UdpBearer {
    /// Bind with configured buffer sizes.
    pub async fn bind(cfg: TransportConfig) -> Result<Self> {
        let domain = if cfg.bind.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };
        let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_send_buffer_size(cfg.sndbuf)?;
        socket.set_recv_buffer_size(cfg.rcvbuf)?;
        socket.set_reuse_address(true)?;
        socket.bind(&cfg.bind.into())?;
        socket.set_nonblocking(true)?;

        let std_socket: std::net::UdpSocket = socket.into();
        let socket = UdpSocket::from_std(std_socket)?;

        info!(
            bind = %socket.local_addr()?,
            peers = cfg.peers.len(),
            "UDP bearer bound"
        );

        Ok(Self {
            socket,
            peers: cfg.peers.iter().map(|p| p.addr).collect(),
            rssi: cfg
                .peers
                .iter()
                .filter_map(|p| p.rssi.map(|r| (p.addr, r)))
                .collect(),
            default_rssi: cfg.default_rssi,
            local: AtomicU16::new(MeshAddress::UNASSIGNED.value()),
        })
    }

    /// Socket address this bearer is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Set the mesh address data frames are filtered on.
    pub fn set_local_address(&self, address: MeshAddress) {
        self.local.store(address.value(), Ordering::Release);
    }

    /// Flood a frame to every peer. Returns how many peers it reached.
    pub fn flood(&self, frame: &Frame) -> Result<usize> {
        let datagram = frame.encode();
        let mut reached = 0;
        let mut last_err = None;
        for peer in &self.peers {
            match self.socket.try_send_to(&datagram, *peer) {
                Ok(_) => reached += 1,
                Err(err) => {
                    trace!(peer = %peer, error = %err, "Datagram not sent");
                    last_err = Some(err);
                }
            }
        }
        match last_err {
            Some(err) if reached == 0 && !self.peers.is_empty() => Err(err.into()),
            _ => Ok(reached),
        }
    }

    /// Advertise as an unprovisioned node.
    pub fn announce(&self, uuid: DeviceUuid) -> Result<usize> {
        self.flood(&Frame::Beacon { uuid })
    }

    /// Offer `address` to the node advertising `uuid`.
    pub fn invite(&self, uuid: DeviceUuid, address: MeshAddress) -> Result<usize> {
        self.flood(&Frame::Invite { uuid, address })
    }

    /// Confirm an accepted address.
    pub fn complete(&self, added: NodeAdded) -> Result<usize> {
        self.flood(&Frame::Complete {
            uuid: added.uuid,
            address: added.address,
        })
    }

    fn rssi_for(&self, from: &SocketAddr) -> i8 {
        self.rssi.get(from).copied().unwrap_or(self.default_rssi)
    }

    /// Turn one datagram into an event, if it is for us.
    fn classify(&self, datagram: &[u8], from: SocketAddr) -> Result<Option<BearerEvent>> {
        let frame = Frame::decode(datagram)?;
        let local = MeshAddress(self.local.load(Ordering::Acquire));
        let event = match frame {
            Frame::Data {
                source,
                destination,
                payload,
            } => {
                if local.is_unassigned() || destination != local || source == local {
                    return Ok(None);
                }
                Some(BearerEvent::Message(Inbound::new(
                    source,
                    payload.to_vec(),
                    self.rssi_for(&from),
                )))
            }
            Frame::Beacon { uuid } => Some(BearerEvent::Beacon(uuid)),
            Frame::Invite { uuid, address } => Some(BearerEvent::Invite { uuid, address }),
            Frame::Complete { uuid, address } => Some(BearerEvent::Complete(NodeAdded { uuid, address })),
        };
        Ok(event)
    }

    /// Receive until `events` closes.
    pub async fn run(self: Arc<Self>, events: mpsc::Sender<BearerEvent>) -> Result<()> {
        let mut buf = vec![0u8; MAX_FRAME_LEN.max(64)];
        loop {
            let (len, from) = self.socket.recv_from(&mut buf).await?;
            let event = match self.classify(&buf[..len], from) {
                Ok(Some(event)) => event,
                Ok(None) => continue,
                Err(err) => {
                    debug!(from = %from, error = %err, "Dropping datagram");
                    continue;
                }
            };
            trace!(from = %from, event = ?event, "Bearer event");
            if events.send(event).await.is_err() {
                info!("Bearer event channel closed");
                return Ok(());
            }
        }
    }
}

impl MeshTransport for UdpBearer {
    fn send(&self, destination: MeshAddress, payload: &[u8]) -> std::result::Result<(), SendError> {
        let source = self.local_address();
        let frame = Frame::data(source, destination, payload).map_err(|e| SendError::new(destination, e.to_string()))?;
        match self.flood(&frame) {
            Ok(_) => Ok(()),
            Err(err) => {
                warn!(destination = %destination, error = %err, "Bearer send failed");
                Err(SendError::new(destination, err.to_string()))
            }
        }
    }

    fn local_address(&self) -> MeshAddress {
        MeshAddress(self.local.load(Ordering::Acquire))
    }
}
