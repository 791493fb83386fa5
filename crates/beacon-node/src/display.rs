//! Console rendering of the topology table.
//!
//! The layout follows the node's small screen:
//!
//! ```text
//! -- Mesh Info --
//! Name: N1  UUID: bbbb
//! Status: Provisioned
//! Self: 0x0001  Intro: 0x0006 (P)
//! Env: 23C 41%
//! -- My Neighbours --
//! P:0x0006 1.0m -59 [20C 50%]
//! -- Among Neighbours --
//! P:0x0006 nbr:0x0002 3.0m
//! ```

use std::io::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use beacon_protocols::{NodeState, SelfRecord, TopologyOutput};
use beacon_topology::{EdgeRecord, Telemetry, TopologySnapshot};
use tracing::{info, warn};

/// Lines for one render.
pub fn render_lines(local: &SelfRecord, snapshot: &TopologySnapshot) -> Vec<String> {
    let identity = &local.identity;
    let mut lines = vec![
        "-- Mesh Info --".to_string(),
        format!("Name: {}  UUID: {}", or_dash(identity.name.as_str()), identity.uuid.short_hex(2)),
        format!("Status: {}", status(local)),
    ];

    let mut addresses = format!("Self: {}", identity.address);
    if let Some((address, name)) = &local.introducer {
        addresses.push_str(&format!("  Intro: {address} ({name})"));
    }
    lines.push(addresses);
    lines.push(format!("Env: {}", telemetry(&local.telemetry)));

    lines.push("-- My Neighbours --".to_string());
    lines.extend(snapshot.neighbours().map(neighbour_line));
    lines.push("-- Among Neighbours --".to_string());
    lines.extend(snapshot.among_neighbours().map(two_hop_line));
    lines
}

/// An addressed node still advertises until its introduction arrives.
fn status(local: &SelfRecord) -> NodeState {
    if local.admitted {
        local.state
    } else {
        NodeState::Unprovisioned
    }
}

fn neighbour_line(edge: &EdgeRecord) -> String {
    let rssi = edge.rssi.map_or_else(|| "?".to_string(), |r| r.to_string());
    format!(
        "{}:{} {} {} [{}]",
        or_dash(edge.observed_name.as_str()),
        edge.observed,
        metres(edge.distance),
        rssi,
        telemetry(&edge.observed_telemetry)
    )
}

fn two_hop_line(edge: &EdgeRecord) -> String {
    format!(
        "{}:{} nbr:{} {}",
        or_dash(edge.observer_name.as_str()),
        edge.observer,
        edge.observed,
        metres(edge.distance)
    )
}

fn metres(distance: Option<f64>) -> String {
    distance.map_or_else(|| "?m".to_string(), |d| format!("{d:.1}m"))
}

fn telemetry(t: &Telemetry) -> String {
    match (t.temperature, t.humidity) {
        (Some(temp), Some(hum)) => format!("{temp}C {hum}%"),
        _ => "--".to_string(),
    }
}

fn or_dash(s: &str) -> &str {
    if s.is_empty() {
        "-"
    } else {
        s
    }
}

/// Writes each render to a console and counts proximity notices.
pub struct ConsoleDisplay {
    out: Mutex<Box<dyn Write + Send>>,
    proximity: AtomicU64,
}

impl Default for ConsoleDisplay {
    fn default() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }
}

impl ConsoleDisplay {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
            proximity: AtomicU64::new(0),
        }
    }

    /// Proximity notices so far.
    pub fn proximity_count(&self) -> u64 {
        self.proximity.load(Ordering::Relaxed)
    }
}

impl TopologyOutput for ConsoleDisplay {
    fn render_topology(&self, local: &SelfRecord, snapshot: &TopologySnapshot) {
        let Ok(mut out) = self.out.lock() else {
            warn!("Display writer poisoned");
            return;
        };
        for line in render_lines(local, snapshot) {
            if let Err(err) = writeln!(out, "{line}") {
                warn!(error = %err, "Display write failed");
                return;
            }
        }
        let _ = out.flush();
    }

    fn notify_proximity(&self) {
        let count = self.proximity.fetch_add(1, Ordering::Relaxed) + 1;
        info!(count, "Neighbour in proximity");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use beacon_protocols::LocalIdentity;
    use beacon_topology::{DeviceUuid, MeshAddress, ShortName, TopologyTable};
    use std::sync::Arc;

    fn self_record() -> SelfRecord {
        SelfRecord {
            identity: LocalIdentity::new(DeviceUuid([0xbb; 16]), ShortName::new("N1"), MeshAddress(1)),
            state: NodeState::Provisioned,
            admitted: true,
            introducer: Some((MeshAddress(6), ShortName::new("P"))),
            telemetry: Telemetry::new(23, 41),
        }
    }

    fn snapshot() -> TopologySnapshot {
        let mut table = TopologyTable::with_local(MeshAddress(1), 10);
        table
            .append(
                EdgeRecord::new(MeshAddress(1), ShortName::new("N1"), MeshAddress(6), ShortName::new("P"))
                    .with_signal(-59, 1.0),
            )
            .unwrap();
        table.update_self_edge_telemetry(MeshAddress(6), ShortName::new("P"), Telemetry::new(20, 50));
        table
            .append(EdgeRecord::new(MeshAddress(6), ShortName::new("P"), MeshAddress(2), ShortName::new("N2")))
            .unwrap();
        table.update_two_hop_edge(MeshAddress(6), MeshAddress(2), 3.0, ShortName::new("P"));
        table
            .append(EdgeRecord::new(MeshAddress(1), ShortName::new("N1"), MeshAddress(3), ShortName::new("N3")))
            .unwrap();
        table.snapshot()
    }

    #[test]
    fn renders_screen_layout() {
        let lines = render_lines(&self_record(), &snapshot());
        assert_eq!(
            lines,
            vec![
                "-- Mesh Info --",
                "Name: N1  UUID: bbbb",
                "Status: Provisioned",
                "Self: 0x0001  Intro: 0x0006 (P)",
                "Env: 23C 41%",
                "-- My Neighbours --",
                "P:0x0006 1.0m -59 [20C 50%]",
                "N3:0x0003 ?m ? [--]",
                "-- Among Neighbours --",
                "P:0x0006 nbr:0x0002 3.0m",
            ]
        );
    }

    #[test]
    fn unprovisioned_header() {
        let mut local = self_record();
        local.identity.name = ShortName::default();
        local.identity.address = MeshAddress::UNASSIGNED;
        local.state = NodeState::Unprovisioned;
        local.admitted = false;
        local.introducer = None;
        let lines = render_lines(&local, &TopologySnapshot::default());
        assert_eq!(lines[1], "Name: -  UUID: bbbb");
        assert_eq!(lines[2], "Status: Advertising");
        assert_eq!(lines[3], "Self: 0x0000");
        assert_eq!(lines.len(), 7);
    }

    #[test]
    fn addressed_but_not_introduced_still_advertises() {
        let mut local = self_record();
        local.admitted = false;
        local.introducer = None;
        let lines = render_lines(&local, &TopologySnapshot::default());
        assert_eq!(lines[2], "Status: Advertising");
        assert_eq!(lines[3], "Self: 0x0001");
    }

    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn console_writes_and_counts() {
        let capture = Capture::default();
        let display = ConsoleDisplay::new(Box::new(capture.clone()));
        display.render_topology(&self_record(), &snapshot());
        display.notify_proximity();
        display.notify_proximity();

        let text = String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
        assert!(text.starts_with("-- Mesh Info --\n"));
        assert!(text.contains("P:0x0006 nbr:0x0002 3.0m\n"));
        assert_eq!(display.proximity_count(), 2);
    }
}
