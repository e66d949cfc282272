//! Topology graph construction from routers' OSPF neighbor tables.
//!
//! A link becomes an edge only once both ends list each other. The first
//! direction seen for a pair is held as the baseline; the reverse
//! direction confirms it and emits the edge.

use std::collections::HashMap;

use routewatch_core::{Device, DeviceId, TopologyEdge, TopologyGraph, TopologyNode};

/// State of one unordered device pair while walking the neighbor tables.
enum PairState {
    /// Only `from` has reported the link so far, at `cost`.
    Pending { from: DeviceId, cost: u32 },
    /// Both directions seen and the edge emitted.
    Emitted,
}

/// Map from IP to device, used to resolve neighbor records.
pub fn index_by_ip(devices: &[Device]) -> HashMap<&str, &Device> {
    devices.iter().map(|d| (d.ip.as_str(), d)).collect()
}

/// Build the node/edge view of the current device set.
///
/// The set of edges does not depend on the order of `devices`; only which
/// end ends up as `source` (and hence which cost is `reverse_cost`) does.
pub fn build_topology(devices: &[Device]) -> TopologyGraph {
    let by_ip = index_by_ip(devices);

    let nodes = devices
        .iter()
        .map(|d| TopologyNode {
            id: d.id,
            ip: d.ip.clone(),
            hostname: d.hostname.clone(),
            identity: d.identity.clone(),
            status: d.status,
        })
        .collect();

    let mut pairs: HashMap<String, PairState> = HashMap::new();
    let mut edges = Vec::new();

    for device in devices {
        for neighbor in &device.neighbors {
            let Some(remote) = by_ip.get(neighbor.neighbor_ip.as_str()) else {
                continue;
            };
            if remote.id == device.id {
                continue;
            }

            let key = TopologyEdge::key(device.id, remote.id);
            match pairs.get(&key) {
                None => {
                    pairs.insert(
                        key,
                        PairState::Pending {
                            from: device.id,
                            cost: neighbor.cost,
                        },
                    );
                }
                Some(PairState::Pending { from, cost }) if *from == remote.id => {
                    edges.push(TopologyEdge {
                        id: key.clone(),
                        source: device.id,
                        target: remote.id,
                        cost: neighbor.cost,
                        reverse_cost: *cost,
                        is_asymmetric: neighbor.cost != *cost,
                    });
                    pairs.insert(key, PairState::Emitted);
                }
                // Same direction listed twice, or pair already emitted.
                Some(_) => {}
            }
        }
    }

    tracing::debug!(
        nodes = devices.len(),
        edges = edges.len(),
        "Built topology graph"
    );

    TopologyGraph { nodes, edges }
}
