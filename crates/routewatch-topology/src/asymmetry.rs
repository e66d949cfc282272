//! Asymmetric routing detection.
//!
//! For every confirmed neighbor pair, compares the cost each router
//! advertises towards the other and grades the difference.

use std::collections::HashSet;

use routewatch_core::{AsymmetricRoute, Device, SeverityThresholds, TopologyEdge};

use crate::graph::index_by_ip;

/// Find every neighbor pair whose two directional costs differ.
///
/// Pairs where only one side lists the other are skipped, as are pairs
/// with equal costs.
pub fn detect_asymmetries(
    devices: &[Device],
    thresholds: &SeverityThresholds,
) -> Vec<AsymmetricRoute> {
    let by_ip = index_by_ip(devices);
    let mut visited: HashSet<String> = HashSet::new();
    let mut routes = Vec::new();

    for a in devices {
        for forward in &a.neighbors {
            let Some(b) = by_ip.get(forward.neighbor_ip.as_str()) else {
                continue;
            };
            if b.id == a.id || !visited.insert(TopologyEdge::key(a.id, b.id)) {
                continue;
            }

            let Some(reverse) = b.neighbors.iter().find(|n| n.neighbor_ip == a.ip) else {
                continue;
            };

            let difference = forward.cost.abs_diff(reverse.cost);
            let Some(severity) = thresholds.classify(difference) else {
                continue;
            };

            tracing::debug!(
                from = %a.ip,
                to = %b.ip,
                cost_forward = forward.cost,
                cost_reverse = reverse.cost,
                severity = ?severity,
                "Asymmetric link"
            );

            routes.push(AsymmetricRoute {
                device1_name: a.display_name().to_string(),
                device1_ip: a.ip.clone(),
                device2_name: b.display_name().to_string(),
                device2_ip: b.ip.clone(),
                cost1to2: forward.cost,
                cost2to1: reverse.cost,
                difference,
                severity,
            });
        }
    }

    routes
}
