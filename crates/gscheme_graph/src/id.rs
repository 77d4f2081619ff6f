// SPDX-License-Identifier: MIT OR Apache-2.0
//! Identifiers for graphs, nodes, pins and links.
//!
//! Pin ids pack the owning node, the pin index and the pin kind into 32 bits:
//! bits 31..16 hold the node id, bits 15..8 the pin index, bit 2 marks a pin
//! whose default type carries the universal bit, bit 1 marks embedded pins
//! and bit 0 marks inputs. Link ids put the source pin id in the high half and
//! the destination pin id in the low half.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Maximum number of pins a class may declare
pub const MAX_PINS_COUNT: usize = u8::MAX as usize;

/// Maximum number of node slots in a graph
pub const MAX_NODES: u16 = u16::MAX - 1;

const INPUT_FLAG: u32 = 1 << 0;
const EMBEDDED_FLAG: u32 = 1 << 1;
const UNIVERSAL_FLAG: u32 = 1 << 2;

/// Unique identifier for a graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GraphId(pub Uuid);

impl GraphId {
    /// Create a new random graph ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for GraphId {
    fn default() -> Self {
        Self::new()
    }
}

/// 1-based id of a node slot; 0 means "none"
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct NodeId(pub u16);

impl NodeId {
    /// Id of the slot at `index`
    pub fn from_index(index: usize) -> Self {
        Self(u16::try_from(index + 1).unwrap_or(0))
    }

    /// Slot index of this id
    pub fn index(self) -> usize {
        usize::from(self.0.wrapping_sub(1))
    }

    /// Whether this id refers to a slot
    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Pin kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PinKind {
    /// Configuration value owned by the node, never linked
    Embedded,
    /// Receives a value from one output
    Input,
    /// Produces a value for any number of inputs
    Output,
}

/// Packed pin identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PinId(pub u32);

impl PinId {
    /// Encode a pin identity
    pub fn new(node: NodeId, pin_index: u8, kind: PinKind, universal: bool) -> Self {
        let kind_bits = match kind {
            PinKind::Embedded => EMBEDDED_FLAG | INPUT_FLAG,
            PinKind::Input => INPUT_FLAG,
            PinKind::Output => 0,
        };
        let universal_bits = if universal { UNIVERSAL_FLAG } else { 0 };
        Self((u32::from(node.0) << 16) | (u32::from(pin_index) << 8) | kind_bits | universal_bits)
    }

    /// Owning node
    pub fn node_id(self) -> NodeId {
        NodeId((self.0 >> 16) as u16)
    }

    /// Slot index of the owning node
    pub fn node_index(self) -> usize {
        self.node_id().index()
    }

    /// Index of the pin within its node
    pub fn pin_index(self) -> usize {
        ((self.0 >> 8) & 0xFF) as usize
    }

    /// Kind of the pin
    pub fn kind(self) -> PinKind {
        if self.0 & EMBEDDED_FLAG != 0 {
            PinKind::Embedded
        } else if self.0 & INPUT_FLAG != 0 {
            PinKind::Input
        } else {
            PinKind::Output
        }
    }

    /// Whether this is an embedded pin
    pub fn is_embedded(self) -> bool {
        self.kind() == PinKind::Embedded
    }

    /// Whether this is an input pin
    pub fn is_input(self) -> bool {
        self.kind() == PinKind::Input
    }

    /// Whether this is an output pin
    pub fn is_output(self) -> bool {
        self.kind() == PinKind::Output
    }

    /// Whether the pin was declared with a universal type
    pub fn is_universal(self) -> bool {
        self.0 & UNIVERSAL_FLAG != 0
    }
}

impl fmt::Display for PinId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.node_id(), self.pin_index())
    }
}

/// Packed link identity, `(src << 32) | dst`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LinkId(pub u64);

impl LinkId {
    /// Link from an output pin to an input pin
    pub fn new(src: PinId, dst: PinId) -> Self {
        Self((u64::from(src.0) << 32) | u64::from(dst.0))
    }

    /// Source output pin
    pub fn src(self) -> PinId {
        PinId((self.0 >> 32) as u32)
    }

    /// Destination input pin
    pub fn dst(self) -> PinId {
        PinId(self.0 as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pin_id_layout() {
        let id = PinId::new(NodeId(3), 2, PinKind::Input, false);
        assert_eq!(id.0, 0x0003_0201);
        assert_eq!(id.node_id(), NodeId(3));
        assert_eq!(id.node_index(), 2);
        assert_eq!(id.pin_index(), 2);
        assert!(id.is_input());
        assert!(!id.is_universal());

        let embedded = PinId::new(NodeId(1), 0, PinKind::Embedded, false);
        assert_eq!(embedded.0 & 0b11, 0b11);
        assert!(embedded.is_embedded());
        assert!(!embedded.is_input());

        let output = PinId::new(NodeId(0xFFFE), 255, PinKind::Output, true);
        assert!(output.is_output());
        assert!(output.is_universal());
        assert_eq!(output.node_id(), NodeId(0xFFFE));
        assert_eq!(output.pin_index(), 255);
    }

    #[test]
    fn test_link_id() {
        let src = PinId::new(NodeId(1), 1, PinKind::Output, false);
        let dst = PinId::new(NodeId(2), 0, PinKind::Input, true);
        let link = LinkId::new(src, dst);
        assert_eq!(link.0, (u64::from(src.0) << 32) | u64::from(dst.0));
        assert_eq!(link.src(), src);
        assert_eq!(link.dst(), dst);
    }

    #[test]
    fn test_node_id_index() {
        assert_eq!(NodeId::from_index(0), NodeId(1));
        assert_eq!(NodeId(5).index(), 4);
        assert!(!NodeId::default().is_valid());
    }
}
