//! Beacon Node - Mesh Sensor Node Daemon
//!
//! A sensor node of the Beacon mesh. Runs the gossip engine over a UDP
//! stand-in for the advertising bearer and shows the topology table on the
//! console. In the provisioner role it also admits new nodes and keeps the
//! commissioning database.
//!
//! # Architecture
//!
//! - **Config**: `BEACON_*` environment variables
//! - **Display**: console rendering of the table, proximity counter
//! - **Sensor**: simulated temperature and humidity
//! - **Commissioning**: JSON-persisted commissioning database (provisioner)
//! - **Node**: tokio runtime wiring the bearer, engine and coordinator
//!
//! # Example
//!
//! ```no_run
//! use beacon_node::{BeaconNode, NodeConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = NodeConfig::from_env()?;
//!     BeaconNode::new(config).run().await?;
//!     Ok(())
//! }
//! ```

pub mod commissioning;
pub mod config;
pub mod display;
pub mod error;
pub mod node;
pub mod sensor;

pub use commissioning::{CommissioningDb, Inviter, StoredNode};
pub use config::{ConfigError, NodeConfig, Role, PROVISIONER_ADDRESS, PROVISIONER_NAME};
pub use display::ConsoleDisplay;
pub use error::{Error, Result};
pub use node::{BeaconNode, EngineInput, EventRouter};
pub use sensor::SimulatedSensor;
