//! Bounded topology table.
//!
//! An ordered, append-only list of [`EdgeRecord`]s with a capacity fixed at
//! creation. Records are updated in place and never removed; once the table
//! is full new edges are refused while existing ones keep updating.
//!
//! Lookups are linear scans. Capacities are small (tens to low hundreds of
//! slots), so an index structure would cost more than it saves.

use thiserror::Error;

use crate::{EdgeRecord, MeshAddress, ShortName, Telemetry};

/// Default number of slots, matching the reel-board firmware.
pub const DEFAULT_CAPACITY: usize = 10;

/// Reasons an edge cannot be appended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AppendError {
    /// Every slot is taken.
    #[error("topology table full ({capacity} slots)")]
    Full { capacity: usize },

    /// One end of the edge is the unassigned address.
    #[error("edge references the unassigned address")]
    Unassigned,

    /// The local node would be recorded as someone's neighbour, or as its own.
    #[error("local address {0} cannot be an observed neighbour")]
    LocalAsNeighbour(MeshAddress),
}

impl AppendError {
    /// Whether the failure is capacity exhaustion.
    pub const fn is_full(&self) -> bool {
        matches!(self, Self::Full { .. })
    }
}

/// The bounded edge table owned by one node.
#[derive(Debug, Clone)]
pub struct TopologyTable {
    local: MeshAddress,
    capacity: usize,
    edges: Vec<EdgeRecord>,
}

impl Default for TopologyTable {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl TopologyTable {
    /// Create an empty table for a node that has no address yet.
    pub fn new(capacity: usize) -> Self {
        Self::with_local(MeshAddress::UNASSIGNED, capacity)
    }

    /// Create an empty table for a node with a known address.
    pub fn with_local(local: MeshAddress, capacity: usize) -> Self {
        Self {
            local,
            capacity,
            edges: Vec::new(),
        }
    }

    /// The local node's address.
    pub const fn local(&self) -> MeshAddress {
        self.local
    }

    /// Record the address assigned at provisioning.
    pub fn assign_local(&mut self, local: MeshAddress) {
        self.local = local;
    }

    /// Maximum number of records.
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    /// Whether the table holds no records.
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Whether every slot is taken.
    pub fn is_full(&self) -> bool {
        self.edges.len() >= self.capacity
    }

    /// All records in insertion order.
    pub fn edges(&self) -> &[EdgeRecord] {
        &self.edges
    }

    /// Record at `index`.
    pub fn get(&self, index: usize) -> Option<&EdgeRecord> {
        self.edges.get(index)
    }

    /// Mutable record at `index`.
    pub fn get_mut(&mut self, index: usize) -> Option<&mut EdgeRecord> {
        self.edges.get_mut(index)
    }

    /// Records whose observer is the local node.
    pub fn self_edges(&self) -> impl Iterator<Item = &EdgeRecord> {
        let local = self.local;
        self.edges.iter().filter(move |e| e.observer == local)
    }

    /// Records whose observer is some other node.
    pub fn two_hop_edges(&self) -> impl Iterator<Item = &EdgeRecord> {
        let local = self.local;
        self.edges.iter().filter(move |e| e.observer != local)
    }

    /// Index of the first record `(observer, observed)`.
    pub fn find_edge(&self, observer: MeshAddress, observed: MeshAddress) -> Option<usize> {
        self.edges
            .iter()
            .position(|e| e.observer == observer && e.observed == observed)
    }

    /// Index of the direct edge to `observed`.
    pub fn find_self_edge(&self, observed: MeshAddress) -> Option<usize> {
        self.find_edge(self.local, observed)
    }

    /// Whether `address` needs no new direct edge.
    ///
    /// True for the unassigned address and for the local address as well as
    /// for neighbours that already have a direct edge. Callers rely on this
    /// to skip both self-loops and duplicates with a single check.
    pub fn exists_as_my_neighbor(&self, address: MeshAddress) -> bool {
        address.is_unassigned() || address == self.local || self.find_self_edge(address).is_some()
    }

    /// Whether any record joins `a` and `b` in either direction.
    ///
    /// Always false when `b` is the local node.
    pub fn exists_as_two_hop_edge(&self, a: MeshAddress, b: MeshAddress) -> bool {
        b != self.local && self.edges.iter().any(|e| e.connects(a, b))
    }

    /// Append a record, or overwrite the existing record for the same
    /// `(observer, observed)` pair in place.
    ///
    /// Returns the slot index.
    pub fn append(&mut self, record: EdgeRecord) -> Result<usize, AppendError> {
        if record.observer.is_unassigned() || record.observed.is_unassigned() {
            return Err(AppendError::Unassigned);
        }
        if record.observed == self.local {
            return Err(AppendError::LocalAsNeighbour(self.local));
        }
        if record.observer == record.observed {
            return Err(AppendError::LocalAsNeighbour(record.observer));
        }

        if let Some(index) = self.find_edge(record.observer, record.observed) {
            self.edges[index] = record;
            return Ok(index);
        }

        if self.is_full() {
            return Err(AppendError::Full {
                capacity: self.capacity,
            });
        }

        self.edges.push(record);
        Ok(self.edges.len() - 1)
    }

    /// Refresh signal and distance on the direct edge to `observed`.
    ///
    /// Returns whether a record was updated.
    pub fn update_self_edge(&mut self, observed: MeshAddress, rssi: i8, distance: f64) -> bool {
        match self.find_self_edge(observed) {
            Some(index) => {
                let edge = &mut self.edges[index];
                edge.rssi = Some(rssi);
                edge.distance = Some(distance);
                true
            }
            None => false,
        }
    }

    /// Store a neighbour's telemetry on the direct edge to it.
    pub fn update_self_edge_telemetry(
        &mut self,
        observed: MeshAddress,
        name: ShortName,
        telemetry: Telemetry,
    ) -> bool {
        match self.find_self_edge(observed) {
            Some(index) => {
                let edge = &mut self.edges[index];
                edge.observed_name = name;
                edge.observed_telemetry = telemetry;
                true
            }
            None => false,
        }
    }

    /// Update distance and observer name of the two-hop edge
    /// `(observer, observed)`. Never touches direct edges.
    pub fn update_two_hop_edge(
        &mut self,
        observer: MeshAddress,
        observed: MeshAddress,
        distance: f64,
        observer_name: ShortName,
    ) -> bool {
        if observer == self.local {
            return false;
        }
        match self.find_edge(observer, observed) {
            Some(index) => {
                let edge = &mut self.edges[index];
                edge.distance = Some(distance);
                edge.observer_name = observer_name;
                true
            }
            None => false,
        }
    }

    /// Copy of the table for rendering.
    pub fn snapshot(&self) -> TopologySnapshot {
        TopologySnapshot {
            local: self.local,
            capacity: self.capacity,
            edges: self.edges.clone(),
        }
    }
}

/// Point-in-time copy of a [`TopologyTable`].
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TopologySnapshot {
    pub local: MeshAddress,
    pub capacity: usize,
    pub edges: Vec<EdgeRecord>,
}

impl TopologySnapshot {
    /// Direct edges ("my neighbours").
    pub fn neighbours(&self) -> impl Iterator<Item = &EdgeRecord> {
        let local = self.local;
        self.edges.iter().filter(move |e| e.observer == local)
    }

    /// Two-hop edges ("among neighbours").
    pub fn among_neighbours(&self) -> impl Iterator<Item = &EdgeRecord> {
        let local = self.local;
        self.edges.iter().filter(move |e| e.observer != local)
    }
}
