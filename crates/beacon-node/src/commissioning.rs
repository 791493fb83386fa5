//! Commissioning database, persisted as JSON.
//!
//! Holds every node the provisioner has admitted (itself included), whether
//! each has been configured, and the mesh keys. The file is rewritten after
//! every change so a restarted provisioner resumes where it stopped.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use beacon_protocols::{CommissionError, CommissionedNode, Commissioner, NodeAdded};
use beacon_topology::{DeviceUuid, MeshAddress};
use beacon_transfer::UdpBearer;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Database file inside the data directory.
pub const DB_FILE: &str = "cdb.json";

/// Hands a provisioning invitation to the bearer.
pub trait Inviter {
    fn invite(&self, uuid: DeviceUuid, address: MeshAddress) -> std::result::Result<(), String>;
}

impl Inviter for UdpBearer {
    fn invite(&self, uuid: DeviceUuid, address: MeshAddress) -> std::result::Result<(), String> {
        UdpBearer::invite(self, uuid, address)
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}

impl<T: Inviter + ?Sized> Inviter for Arc<T> {
    fn invite(&self, uuid: DeviceUuid, address: MeshAddress) -> std::result::Result<(), String> {
        (**self).invite(uuid, address)
    }
}

/// One admitted node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredNode {
    pub uuid: DeviceUuid,
    pub address: MeshAddress,
    pub configured: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct DbFile {
    net_key: String,
    app_key: Option<String>,
    nodes: Vec<StoredNode>,
}

/// The provisioner's commissioning database.
pub struct CommissioningDb<I> {
    path: PathBuf,
    local: MeshAddress,
    net_key: [u8; 16],
    app_key: Option<[u8; 16]>,
    nodes: Vec<StoredNode>,
    /// Invitation awaiting its confirmation.
    pending: Option<(DeviceUuid, MeshAddress)>,
    inviter: I,
}

impl<I: Inviter> CommissioningDb<I> {
    /// Open the database in `dir`, creating it if needed.
    ///
    /// The provisioner's own entry is added, unconfigured, when missing.
    pub fn open(dir: impl AsRef<Path>, uuid: DeviceUuid, address: MeshAddress, inviter: I) -> Result<Self> {
        std::fs::create_dir_all(dir.as_ref())?;
        let path = dir.as_ref().join(DB_FILE);

        let mut db = if path.exists() {
            let file: DbFile = serde_json::from_slice(&std::fs::read(&path)?)?;
            let db = Self {
                net_key: decode_key(&file.net_key)?,
                app_key: file.app_key.as_deref().map(decode_key).transpose()?,
                nodes: file.nodes,
                path,
                local: address,
                pending: None,
                inviter,
            };
            info!(path = ?db.path, nodes = db.nodes.len(), "Loaded commissioning database");
            db
        } else {
            info!(path = ?path, "Creating commissioning database");
            Self {
                path,
                local: address,
                net_key: rand::random(),
                app_key: None,
                nodes: Vec::new(),
                pending: None,
                inviter,
            }
        };

        if !db.nodes.iter().any(|n| n.address == address) {
            db.nodes.insert(
                0,
                StoredNode {
                    uuid,
                    address,
                    configured: false,
                },
            );
        }
        db.save()?;
        Ok(db)
    }

    /// Stored entries.
    pub fn stored(&self) -> &[StoredNode] {
        &self.nodes
    }

    /// Whether the application key exists yet.
    pub fn has_app_key(&self) -> bool {
        self.app_key.is_some()
    }

    fn save(&self) -> Result<()> {
        let file = DbFile {
            net_key: hex::encode(self.net_key),
            app_key: self.app_key.map(hex::encode),
            nodes: self.nodes.clone(),
        };
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(&file)?)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!(path = ?self.path, "Commissioning database saved");
        Ok(())
    }

    fn persist(&self) -> std::result::Result<(), CommissionError> {
        self.save().map_err(|e| CommissionError::Storage(e.to_string()))
    }
}

fn decode_key(s: &str) -> Result<[u8; 16]> {
    let bytes = hex::decode(s).map_err(|e| Error::Storage(format!("bad key: {e}")))?;
    bytes
        .try_into()
        .map_err(|_| Error::Storage("key must be 16 bytes".to_string()))
}

impl<I: Inviter> Commissioner for CommissioningDb<I> {
    fn nodes(&self) -> Vec<CommissionedNode> {
        self.nodes
            .iter()
            .map(|n| CommissionedNode {
                uuid: n.uuid,
                address: n.address,
                configured: n.configured,
            })
            .collect()
    }

    fn start_provisioning(&mut self, uuid: DeviceUuid, address: MeshAddress) -> std::result::Result<(), CommissionError> {
        if let Some(owner) = self.nodes.iter().find(|n| n.address == address && n.uuid != uuid) {
            return Err(CommissionError::Provisioning(format!(
                "{address} already belongs to {}",
                owner.uuid.short_hex(2)
            )));
        }
        self.inviter
            .invite(uuid, address)
            .map_err(CommissionError::Provisioning)?;
        self.pending = Some((uuid, address));
        debug!(uuid = %uuid.short_hex(2), address = %address, "Invitation sent");
        Ok(())
    }

    fn node_added(&mut self, added: NodeAdded) -> std::result::Result<(), CommissionError> {
        if self.pending != Some((added.uuid, added.address)) {
            return Err(CommissionError::Unrequested {
                uuid: added.uuid,
                address: added.address,
            });
        }
        self.pending = None;
        match self.nodes.iter_mut().find(|n| n.uuid == added.uuid) {
            Some(node) => {
                node.address = added.address;
                node.configured = false;
            }
            None => self.nodes.push(StoredNode {
                uuid: added.uuid,
                address: added.address,
                configured: false,
            }),
        }
        self.persist()
    }

    fn configure(&mut self, address: MeshAddress) -> std::result::Result<(), CommissionError> {
        if address == self.local && self.app_key.is_none() {
            self.app_key = Some(rand::random());
            info!("Application key created");
        }
        if self.app_key.is_none() {
            return Err(CommissionError::Provisioning(
                "no application key yet; configure the provisioner first".to_string(),
            ));
        }
        let node = self
            .nodes
            .iter_mut()
            .find(|n| n.address == address)
            .ok_or(CommissionError::UnknownNode(address))?;
        node.configured = true;
        debug!(address = %address, "Application key added, vendor model bound");
        self.persist()
    }
}
