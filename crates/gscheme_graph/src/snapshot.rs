// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph snapshots.
//!
//! A snapshot records the live nodes with their editable values and the
//! links between them. Generator values are never stored; pins holding them
//! come back with their class defaults.

use crate::graph::{Graph, GraphError};
use crate::id::{GraphId, NodeId};
use crate::registry::ClassRegistry;
use crate::settings::GraphSettings;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Current snapshot format version
pub const SNAPSHOT_VERSION: u32 = 1;

/// Serializable image of a graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    /// Format version
    pub version: u32,
    /// Graph identity
    pub id: GraphId,
    /// Graph name
    pub name: String,
    /// Number of node slots
    pub capacity: u16,
    /// Live nodes in slot order
    pub nodes: Vec<NodeSnapshot>,
    /// Links, sources before their consumers
    pub links: Vec<LinkSnapshot>,
}

/// One live node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    /// Slot id
    pub id: NodeId,
    /// Class name
    pub class: String,
    /// Embedded and unlinked input values
    #[serde(default)]
    pub values: Vec<PinValueSnapshot>,
}

/// Value of a named pin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinValueSnapshot {
    /// Pin name
    pub pin: String,
    /// Stored value
    pub value: Value,
}

/// Link between two named pins
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkSnapshot {
    /// Source node
    pub src_node: NodeId,
    /// Source output pin name
    pub src_pin: String,
    /// Destination node
    pub dst_node: NodeId,
    /// Destination input pin name
    pub dst_pin: String,
}

impl GraphSnapshot {
    /// Serialize to RON format
    pub fn to_ron(&self) -> Result<String, SnapshotError> {
        let config = ron::ser::PrettyConfig::default().struct_names(true);
        Ok(ron::ser::to_string_pretty(self, config)?)
    }

    /// Deserialize from RON format
    pub fn from_ron(s: &str) -> Result<Self, SnapshotError> {
        let snapshot: Self = ron::from_str(s)?;
        if snapshot.version > SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion {
                found: snapshot.version,
                supported: SNAPSHOT_VERSION,
            });
        }
        Ok(snapshot)
    }

    /// Save to a file
    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        std::fs::write(path, self.to_ron()?)?;
        Ok(())
    }

    /// Load from a file
    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_ron(&content)
    }
}

impl Graph {
    /// Capture the graph as a snapshot
    pub fn snapshot(&self) -> GraphSnapshot {
        let mut nodes = Vec::with_capacity(self.count_nodes());
        let mut links = Vec::new();

        for node in self.nodes() {
            let (Some(class), Some(instance)) = (node.class(), node.instance()) else {
                continue;
            };

            let mut values = Vec::new();
            let editable = class.embedded_range().chain(class.input_range());
            for index in editable {
                if node.is_connected_pin(index) {
                    continue;
                }
                let (Some(descriptor), Ok(value)) = (class.pin(index), class.value(index, &**instance))
                else {
                    continue;
                };
                if value.is_serializable() {
                    values.push(PinValueSnapshot {
                        pin: descriptor.name().to_string(),
                        value,
                    });
                }
            }
            nodes.push(NodeSnapshot {
                id: node.id(),
                class: class.name().to_string(),
                values,
            });

            for index in class.input_range() {
                let (Some(pin), Some(descriptor)) = (node.pin(index), class.pin(index)) else {
                    continue;
                };
                let Some(src) = pin.attached() else {
                    continue;
                };
                let src_name = self
                    .node(src.node_id())
                    .and_then(|source| source.class())
                    .and_then(|source| source.pin(src.pin_index()))
                    .map(|pin| pin.name().to_string());
                if let Some(src_pin) = src_name {
                    links.push((
                        node.order(),
                        LinkSnapshot {
                            src_node: src.node_id(),
                            src_pin,
                            dst_node: node.id(),
                            dst_pin: descriptor.name().to_string(),
                        },
                    ));
                }
            }
        }
        links.sort_by_key(|(order, _)| *order);

        GraphSnapshot {
            version: SNAPSHOT_VERSION,
            id: self.id(),
            name: self.name().to_string(),
            capacity: u16::try_from(self.capacity()).unwrap_or(u16::MAX),
            nodes,
            links: links.into_iter().map(|(_, link)| link).collect(),
        }
    }

    /// Rebuild a graph from a snapshot, keeping node ids.
    ///
    /// The capacity is the larger of the snapshot's and `settings`'.
    pub fn from_snapshot(
        registry: Arc<ClassRegistry>,
        settings: &GraphSettings,
        snapshot: &GraphSnapshot,
    ) -> Result<Self, SnapshotError> {
        let settings = GraphSettings {
            name: snapshot.name.clone(),
            capacity: settings.capacity.max(snapshot.capacity),
        };
        let mut graph = Graph::new(registry, &settings)?;
        graph.set_id(snapshot.id);

        for node in &snapshot.nodes {
            graph.place_node(node.id, &node.class)?;
            for stored in &node.values {
                let pin = graph.pin_id(node.id, &stored.pin)?;
                if pin.is_embedded() {
                    graph.set_embedded_value(pin, stored.value.clone())?;
                } else {
                    graph.set_input_value(pin, stored.value.clone())?;
                }
            }
        }

        // Stored graphs may hold convert errors; the update pass flags them again
        for link in &snapshot.links {
            let src = graph.pin_id(link.src_node, &link.src_pin)?;
            let dst = graph.pin_id(link.dst_node, &link.dst_pin)?;
            graph.restore_link(src, dst)?;
        }
        graph.update_state();

        tracing::info!(
            graph = %graph.name(),
            nodes = graph.count_nodes(),
            links = snapshot.links.len(),
            "Restored graph from snapshot"
        );
        Ok(graph)
    }
}

/// Error raised while storing or restoring a snapshot
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    /// Malformed RON document
    #[error("Failed to parse snapshot: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// Serialization failed
    #[error("Failed to serialize snapshot: {0}")]
    Serialize(#[from] ron::Error),

    /// File access failed
    #[error("Snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Written by a newer version
    #[error("Snapshot version {found} is newer than supported version {supported}")]
    UnsupportedVersion {
        /// Version in the document
        found: u32,
        /// Newest readable version
        supported: u32,
    },

    /// Replaying the snapshot failed
    #[error(transparent)]
    Graph(#[from] GraphError),
}
