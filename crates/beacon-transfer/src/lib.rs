//! Beacon Transfer - UDP stand-in for the mesh advertising bearer
//!
//! This crate provides:
//! - A compact binary [`Frame`] format for gossip payloads and provisioning
//!   handshakes
//! - [`UdpBearer`], which floods frames to a fixed set of radio neighbours and
//!   implements [`MeshTransport`](beacon_protocols::MeshTransport)
//!
//! Several nodes on one host form a mesh by listing each other as peers.
//!
//! # Example
//!
//! ```rust,ignore
//! use beacon_transfer::{PeerLink, TransportConfig, UdpBearer};
//!
//! let config = TransportConfig::default()
//!     .with_bind("127.0.0.1:9101".parse()?)
//!     .with_peer("127.0.0.1:9100@-50".parse()?);
//! let bearer = Arc::new(UdpBearer::bind(config).await?);
//! tokio::spawn(bearer.clone().run(events_tx));
//! ```

pub mod frame;
pub mod transport;

pub use frame::{Frame, FrameError, FrameKind, MAX_FRAME_LEN};
pub use transport::{BearerEvent, PeerLink, TransportConfig, TransportError, UdpBearer};
