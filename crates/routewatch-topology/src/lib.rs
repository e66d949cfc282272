//! routewatch-topology: Topology and asymmetric routing analysis.
//!
//! Reads the full device set from the store on every call and derives the
//! router adjacency graph and the list of asymmetric links from the
//! routers' OSPF neighbor tables. Nothing here is persisted.

pub mod asymmetry;
pub mod error;
pub mod graph;

pub use asymmetry::detect_asymmetries;
pub use error::TopologyError;
pub use graph::build_topology;

use std::sync::Arc;

use routewatch_core::{AsymmetricRoute, SeverityThresholds, TopologyGraph};
use routewatch_store::PersistenceStore;

/// On-demand topology views over a store.
#[derive(Clone)]
pub struct TopologyEngine {
    store: Arc<dyn PersistenceStore>,
    thresholds: SeverityThresholds,
}

impl TopologyEngine {
    /// Create an engine with the default severity thresholds.
    pub fn new(store: Arc<dyn PersistenceStore>) -> Self {
        Self {
            store,
            thresholds: SeverityThresholds::default(),
        }
    }

    pub fn with_thresholds(mut self, thresholds: SeverityThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Current topology graph.
    pub async fn topology(&self) -> error::Result<TopologyGraph> {
        let devices = self.store.list_devices().await?;
        Ok(build_topology(&devices))
    }

    /// Current asymmetric routes.
    pub async fn asymmetric_routes(&self) -> error::Result<Vec<AsymmetricRoute>> {
        let devices = self.store.list_devices().await?;
        Ok(detect_asymmetries(&devices, &self.thresholds))
    }
}
