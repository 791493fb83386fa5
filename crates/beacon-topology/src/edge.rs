//! Edge records: "observer perceives observed as a neighbour".

use crate::{MeshAddress, ShortName};

/// Temperature and humidity last reported for a node.
///
/// `None` until the node has sent telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Telemetry {
    pub temperature: Option<i32>,
    pub humidity: Option<i32>,
}

impl Telemetry {
    /// No readings yet.
    pub const UNKNOWN: Self = Self {
        temperature: None,
        humidity: None,
    };

    /// Known readings in degrees Celsius and percent relative humidity.
    pub const fn new(temperature: i32, humidity: i32) -> Self {
        Self {
            temperature: Some(temperature),
            humidity: Some(humidity),
        }
    }

    /// Whether both readings are present.
    pub const fn is_known(&self) -> bool {
        self.temperature.is_some() && self.humidity.is_some()
    }
}

/// One row of the topology table.
///
/// Direct edges always have the local node as `observer`. Two-hop edges have
/// a peer as `observer` and one of that peer's neighbours as `observed`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EdgeRecord {
    pub observer: MeshAddress,
    pub observer_name: ShortName,
    pub observer_telemetry: Telemetry,
    pub observed: MeshAddress,
    pub observed_name: ShortName,
    pub observed_telemetry: Telemetry,
    /// Last signal-strength sample, dBm.
    pub rssi: Option<i8>,
    /// Last estimated distance, metres.
    pub distance: Option<f64>,
}

impl EdgeRecord {
    /// An edge with no telemetry or signal data yet.
    pub fn new(
        observer: MeshAddress,
        observer_name: ShortName,
        observed: MeshAddress,
        observed_name: ShortName,
    ) -> Self {
        Self {
            observer,
            observer_name,
            observer_telemetry: Telemetry::UNKNOWN,
            observed,
            observed_name,
            observed_telemetry: Telemetry::UNKNOWN,
            rssi: None,
            distance: None,
        }
    }

    /// Attach the observer's own readings.
    #[must_use]
    pub fn with_observer_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.observer_telemetry = telemetry;
        self
    }

    /// Attach a signal sample and its distance estimate.
    #[must_use]
    pub fn with_signal(mut self, rssi: i8, distance: f64) -> Self {
        self.rssi = Some(rssi);
        self.distance = Some(distance);
        self
    }

    /// Whether this edge joins `a` and `b` in either direction.
    pub fn connects(&self, a: MeshAddress, b: MeshAddress) -> bool {
        (self.observer == a && self.observed == b) || (self.observer == b && self.observed == a)
    }
}
