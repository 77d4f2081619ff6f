// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph data structure containing nodes and links.
//!
//! Nodes live in a fixed pool of slots. Vacant slots form a free list through
//! `next_index`; after an update pass the live slots form the evaluation chain
//! through the same field, sorted by dependency depth.

use crate::class::{ComputeError, Instance};
use crate::convert::ConvertError;
use crate::draw::Draw;
use crate::id::{GraphId, LinkId, NodeId, PinId, PinKind};
use crate::node::{Node, Pin, INVALID_NODE_INDEX};
use crate::registry::{ClassRegistry, RegistryError};
use crate::settings::{GraphSettings, SettingsError};
use crate::types::TypeId;
use crate::value::Value;
use std::cell::Cell;
use std::sync::Arc;

/// A node graph
pub struct Graph {
    id: GraphId,
    name: String,
    registry: Arc<ClassRegistry>,
    nodes: Vec<Node>,
    count_free: usize,
    first_free_index: u16,
    first_calc_index: u16,
    order_generation: u32,
    acyclicity_generation: Cell<u32>,
}

impl Graph {
    /// Create an empty graph with the capacity from `settings`
    pub fn new(registry: Arc<ClassRegistry>, settings: &GraphSettings) -> Result<Self, GraphError> {
        settings.validate()?;
        let capacity = usize::from(settings.capacity);
        let nodes = (0..capacity)
            .map(|index| {
                let mut node = Node::default();
                let next = if index + 1 < capacity {
                    (index + 1) as u16
                } else {
                    INVALID_NODE_INDEX
                };
                node.init(NodeId::from_index(index), next);
                node
            })
            .collect();

        Ok(Self {
            id: GraphId::new(),
            name: settings.name.clone(),
            registry,
            nodes,
            count_free: capacity,
            first_free_index: 0,
            first_calc_index: INVALID_NODE_INDEX,
            order_generation: 0,
            acyclicity_generation: Cell::new(0),
        })
    }

    /// Graph identity
    pub fn id(&self) -> GraphId {
        self.id
    }

    pub(crate) fn set_id(&mut self, id: GraphId) {
        self.id = id;
    }

    /// Graph name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rename the graph
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    /// Classes available to this graph
    pub fn registry(&self) -> &Arc<ClassRegistry> {
        &self.registry
    }

    /// Number of node slots
    pub fn capacity(&self) -> usize {
        self.nodes.len()
    }

    /// Number of live nodes
    pub fn count_nodes(&self) -> usize {
        self.nodes.len() - self.count_free
    }

    /// Live node by id
    pub fn node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes
            .get(node_id.index())
            .filter(|node| node_id.is_valid() && !node.is_removed())
    }

    fn node_mut(&mut self, node_id: NodeId) -> Result<&mut Node, GraphError> {
        self.nodes
            .get_mut(node_id.index())
            .filter(|node| node_id.is_valid() && !node.is_removed())
            .ok_or(GraphError::NodeNotFound(node_id))
    }

    /// All live nodes, in slot order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(|node| !node.is_removed())
    }

    /// All links, in destination slot order
    pub fn links(&self) -> impl Iterator<Item = LinkId> + '_ {
        self.nodes().flat_map(|node| {
            node.pins()[node.input_range()]
                .iter()
                .filter_map(|pin| pin.attached().map(|src| LinkId::new(src, pin.id())))
        })
    }

    /// Add a node of the class at `class_index`
    pub fn add_node(&mut self, class_index: usize) -> Result<NodeId, GraphError> {
        let class = Arc::clone(self.registry.class(class_index)?);
        if self.first_free_index == INVALID_NODE_INDEX {
            return Err(GraphError::CapacityExhausted(self.capacity()));
        }

        let index = usize::from(self.first_free_index);
        let node = &mut self.nodes[index];
        self.first_free_index = node.next_index();
        node.set_next_index(INVALID_NODE_INDEX);
        node.create(class);
        self.count_free -= 1;

        let node_id = node.id();
        tracing::debug!(graph = %self.name, node = %node_id, class_index, "Added node");
        Ok(node_id)
    }

    /// Add a node of the named class
    pub fn add_node_by_name(&mut self, class_name: &str) -> Result<NodeId, GraphError> {
        let class_index = self.registry.class_index(class_name)?;
        self.add_node(class_index)
    }

    /// Whether `node_id` refers to a live node
    pub fn test_remove_node(&self, node_id: NodeId) -> bool {
        self.node(node_id).is_some()
    }

    /// Remove a node with all its links; returns its native instance
    pub fn remove_node(&mut self, node_id: NodeId) -> Result<Instance, GraphError> {
        let sources: Vec<PinId> = {
            let node = self.node(node_id).ok_or(GraphError::NodeNotFound(node_id))?;
            node.pins()[node.input_range()]
                .iter()
                .filter_map(|pin| pin.attached())
                .collect()
        };

        for (index, node) in self.nodes.iter_mut().enumerate() {
            if index != node_id.index() && !node.is_removed() {
                node.detach_from_input_pin_if_exists(node_id)?;
            }
        }
        for src in sources {
            if let Some(source) = self.nodes.get_mut(src.node_index()) {
                source.dec_links_count(src.pin_index());
            }
        }

        let index = node_id.index();
        let instance = self.nodes[index].reset(self.first_free_index);
        self.first_free_index = index as u16;
        self.count_free += 1;
        tracing::debug!(graph = %self.name, node = %node_id, "Removed node");
        instance.ok_or(GraphError::NodeNotFound(node_id))
    }

    fn output_pin(&self, pin: PinId) -> Result<&Pin, GraphError> {
        if !pin.is_output() {
            return Err(GraphError::PinKindMismatch {
                pin,
                expected: PinKind::Output,
            });
        }
        self.node(pin.node_id())
            .and_then(|node| node.pin_by_id(pin))
            .ok_or(GraphError::PinNotFound(pin))
    }

    fn input_node(&self, pin: PinId) -> Result<&Node, GraphError> {
        if !pin.is_input() {
            return Err(GraphError::PinKindMismatch {
                pin,
                expected: PinKind::Input,
            });
        }
        self.node(pin.node_id())
            .filter(|node| node.pin_by_id(pin).is_some())
            .ok_or(GraphError::PinNotFound(pin))
    }

    /// Validate a prospective link from output `src` to input `dst`
    pub fn check_add_link(&self, src: PinId, dst: PinId) -> Result<(), GraphError> {
        self.check_link(src, dst, true)
    }

    fn check_link(&self, src: PinId, dst: PinId, check_types: bool) -> Result<(), GraphError> {
        let src_pin = self.output_pin(src)?;
        let dst_node = self.input_node(dst)?;
        if src.node_id() == dst.node_id() {
            return Err(GraphError::SelfLoop);
        }
        if dst_node.pin_by_id(dst).and_then(|pin| pin.attached()) == Some(src) {
            return Err(GraphError::LinkExists(LinkId::new(src, dst)));
        }

        let src_type = src_pin.type_id();
        if check_types && !dst_node.check_convert(dst.pin_index(), src_type) {
            let to = dst_node
                .class()
                .map_or(TypeId::Unknown, |class| class.decl_pin_type(dst.pin_index()));
            return Err(GraphError::IncompatibleTypes {
                src,
                dst,
                from: src_type,
                to,
            });
        }

        let generation = self.acyclicity_generation.get().wrapping_add(1).max(1);
        self.acyclicity_generation.set(generation);
        if !Node::check_acyclicity(&self.nodes, src.node_index(), dst.node_id(), generation) {
            return Err(GraphError::Cycle(LinkId::new(src, dst)));
        }
        Ok(())
    }

    /// Whether a link from output `src` to input `dst` may be added
    pub fn test_add_link(&self, src: PinId, dst: PinId) -> bool {
        self.check_add_link(src, dst).is_ok()
    }

    /// Link output `src` to input `dst`, replacing any link into `dst`
    pub fn add_link(&mut self, src: PinId, dst: PinId) -> Result<LinkId, GraphError> {
        self.check_add_link(src, dst)?;
        self.attach_link(src, dst)
    }

    /// Link without the type check. Incompatible kinds surface as a convert
    /// error on the next update instead of a rejection.
    pub(crate) fn restore_link(&mut self, src: PinId, dst: PinId) -> Result<LinkId, GraphError> {
        self.check_link(src, dst, false)?;
        self.attach_link(src, dst)
    }

    fn attach_link(&mut self, src: PinId, dst: PinId) -> Result<LinkId, GraphError> {
        let src_type = self.output_pin(src)?.type_id();

        let dst_node = self.node_mut(dst.node_id())?;
        let previous = dst_node.pin(dst.pin_index()).and_then(|pin| pin.attached());
        dst_node.attach_to_input_pin(dst.pin_index(), src, src_type);
        if let Some(previous) = previous {
            self.nodes[previous.node_index()].dec_links_count(previous.pin_index());
        }
        self.nodes[src.node_index()].inc_links_count(src.pin_index());

        let link_id = LinkId::new(src, dst);
        tracing::debug!(graph = %self.name, src = %src, dst = %dst, "Added link");
        Ok(link_id)
    }

    /// Whether the link exists
    pub fn test_remove_link(&self, link_id: LinkId) -> bool {
        let dst = link_id.dst();
        self.input_node(dst)
            .ok()
            .and_then(|node| node.pin_by_id(dst))
            .and_then(|pin| pin.attached())
            == Some(link_id.src())
    }

    /// Remove a link; the destination input returns to its default value
    pub fn remove_link(&mut self, link_id: LinkId) -> Result<(), GraphError> {
        if !self.test_remove_link(link_id) {
            return Err(GraphError::LinkNotFound(link_id));
        }
        let (src, dst) = (link_id.src(), link_id.dst());
        self.node_mut(dst.node_id())?
            .detach_from_input_pin(dst.pin_index())?;
        if let Some(source) = self.nodes.get_mut(src.node_index()) {
            source.dec_links_count(src.pin_index());
        }
        tracing::debug!(graph = %self.name, src = %src, dst = %dst, "Removed link");
        Ok(())
    }

    /// Recompute every node whose inputs or local values changed, sources first
    pub fn update_state(&mut self) {
        self.order_generation = self.order_generation.wrapping_add(1).max(1);
        let generation = self.order_generation;

        let mut live: Vec<usize> = (0..self.nodes.len())
            .filter(|&index| !self.nodes[index].is_removed())
            .collect();
        for &index in &live {
            Node::order_number(&mut self.nodes, index, generation);
        }
        live.sort_by_key(|&index| self.nodes[index].order());

        for pair in live.windows(2) {
            self.nodes[pair[0]].set_next_index(pair[1] as u16);
        }
        if let Some(&last) = live.last() {
            self.nodes[last].set_next_index(INVALID_NODE_INDEX);
        }
        self.first_calc_index = live.first().map_or(INVALID_NODE_INDEX, |&index| index as u16);

        let mut index = self.first_calc_index;
        while index != INVALID_NODE_INDEX {
            let slot = usize::from(index);
            let mut node = std::mem::take(&mut self.nodes[slot]);
            index = node.update_state(&self.nodes);
            self.nodes[slot] = node;
        }
        tracing::debug!(graph = %self.name, nodes = live.len(), "Updated graph state");
    }

    fn pin_node_mut(&mut self, pin: PinId) -> Result<&mut Node, GraphError> {
        let node = self.node_mut(pin.node_id())?;
        if node.pin_by_id(pin).is_none() {
            return Err(GraphError::PinNotFound(pin));
        }
        Ok(node)
    }

    /// Write an embedded pin
    pub fn set_embedded_value(&mut self, pin: PinId, value: Value) -> Result<(), GraphError> {
        self.pin_node_mut(pin)?.set_embedded_value(pin.pin_index(), value)
    }

    /// Write an unlinked input pin
    pub fn set_input_value(&mut self, pin: PinId, value: Value) -> Result<(), GraphError> {
        self.pin_node_mut(pin)?.set_input_value(pin.pin_index(), value)
    }

    /// Restore the class default of an embedded or unlinked input pin
    pub fn reset_to_default(&mut self, pin: PinId) -> Result<(), GraphError> {
        self.pin_node_mut(pin)?.reset_to_default(pin.pin_index())
    }

    /// Last computed value of an output pin
    pub fn output_value(&self, pin: PinId) -> Option<&Value> {
        self.node(pin.node_id())
            .filter(|node| node.pin_by_id(pin).is_some())
            .and_then(|node| node.output_value(pin.pin_index()))
    }

    /// Id of a node's pin by name
    pub fn pin_id(&self, node_id: NodeId, pin_name: &str) -> Result<PinId, GraphError> {
        let node = self.node(node_id).ok_or(GraphError::NodeNotFound(node_id))?;
        node.class()
            .and_then(|class| class.pin_index(pin_name))
            .and_then(|index| node.pin(index))
            .map(Pin::id)
            .ok_or_else(|| GraphError::UnknownPin {
                node: node_id,
                name: pin_name.to_string(),
            })
    }

    /// Draw every live node and link
    pub fn draw_graph(&self, drawer: &mut dyn Draw) {
        drawer.on_start_draw_graph();
        for node in self.nodes() {
            node.draw_graph(drawer);
        }
        for link in self.links() {
            drawer.on_draw_link(link, link.src(), link.dst());
        }
        drawer.on_finish_draw_graph();
    }

    /// Draw the property panel of a node and apply the edits
    pub fn draw_node_property(&mut self, node_id: NodeId, drawer: &mut dyn Draw) -> Result<(), GraphError> {
        let registry = Arc::clone(&self.registry);
        self.node_mut(node_id)?
            .draw_node_property(registry.types(), drawer)
    }

    /// Draw the full preview of a node; `None` or a vacant id disables the preview
    pub fn draw_node_preview(&self, node_id: Option<NodeId>, drawer: &mut dyn Draw) {
        match node_id.and_then(|id| self.node(id)) {
            Some(node) => node.draw_node_preview(drawer),
            None => drawer.on_draw_full_preview(None),
        }
    }

    pub(crate) fn place_node(&mut self, node_id: NodeId, class_name: &str) -> Result<(), GraphError> {
        let class = Arc::clone(self.registry.class_by_name(class_name)?);
        let target = node_id.index();
        if !node_id.is_valid() || target >= self.nodes.len() || !self.nodes[target].is_removed() {
            return Err(GraphError::SlotUnavailable(node_id));
        }

        // Unlink the slot from the free list
        let mut prev = INVALID_NODE_INDEX;
        let mut current = self.first_free_index;
        while current != INVALID_NODE_INDEX && usize::from(current) != target {
            prev = current;
            current = self.nodes[usize::from(current)].next_index();
        }
        if current == INVALID_NODE_INDEX {
            return Err(GraphError::SlotUnavailable(node_id));
        }
        let next = self.nodes[target].next_index();
        if prev == INVALID_NODE_INDEX {
            self.first_free_index = next;
        } else {
            self.nodes[usize::from(prev)].set_next_index(next);
        }

        let node = &mut self.nodes[target];
        node.set_next_index(INVALID_NODE_INDEX);
        node.create(class);
        self.count_free -= 1;
        Ok(())
    }
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("capacity", &self.capacity())
            .field("nodes", &self.nodes().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

/// Error raised by graph operations
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// No live node with this id
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// No pin with this exact id
    #[error("Pin not found: {0:?}")]
    PinNotFound(PinId),

    /// No pin with this name on the node
    #[error("Node {node} has no pin named {name}")]
    UnknownPin {
        /// Node
        node: NodeId,
        /// Requested pin name
        name: String,
    },

    /// Pin index past the end of the node's pins
    #[error("Node {node} has no pin at index {index}")]
    PinIndexOutOfRange {
        /// Node
        node: NodeId,
        /// Requested index
        index: usize,
    },

    /// The pin has the wrong kind for the operation
    #[error("Pin {pin} is not an {expected:?} pin")]
    PinKindMismatch {
        /// Offending pin
        pin: PinId,
        /// Kind the operation needs
        expected: PinKind,
    },

    /// Linked inputs cannot be edited
    #[error("Pin {0} is connected")]
    PinConnected(PinId),

    /// The value kind differs from the pin's current kind
    #[error("Pin {pin} holds {expected} values, got {actual}")]
    WrongValueType {
        /// Offending pin
        pin: PinId,
        /// Current kind of the pin
        expected: TypeId,
        /// Kind of the supplied value
        actual: TypeId,
    },

    /// Self-loop not allowed
    #[error("Self-loop not allowed")]
    SelfLoop,

    /// Link already present
    #[error("Link already exists: {0:?}")]
    LinkExists(LinkId),

    /// No such link
    #[error("Link not found: {0:?}")]
    LinkNotFound(LinkId),

    /// Source kind cannot be converted to the destination kind
    #[error("Cannot link {src} ({from}) to {dst} ({to})")]
    IncompatibleTypes {
        /// Source output pin
        src: PinId,
        /// Destination input pin
        dst: PinId,
        /// Current kind of the source
        from: TypeId,
        /// Declared kind of the destination
        to: TypeId,
    },

    /// The link would close a cycle
    #[error("Link would create a cycle: {0:?}")]
    Cycle(LinkId),

    /// Every slot is in use
    #[error("Graph capacity exhausted ({0} nodes)")]
    CapacityExhausted(usize),

    /// Slot cannot receive a node
    #[error("Node slot unavailable: {0}")]
    SlotUnavailable(NodeId),

    /// Registry lookup failed
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Conversion failed
    #[error(transparent)]
    Convert(#[from] ConvertError),

    /// Reading or writing a pin value failed
    #[error(transparent)]
    Compute(#[from] ComputeError),

    /// Invalid graph settings
    #[error(transparent)]
    Settings(#[from] SettingsError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::ClassBuilder;
    use crate::classes;
    use crate::node::ChangeState;
    use crate::registry::ClassRegistryBuilder;
    use crate::types::UniversalType;
    use glam::Vec3;

    #[derive(Default)]
    struct Sink {
        input: Vec3,
    }

    #[derive(Default)]
    struct Ratio {
        num: f32,
        den: f32,
    }

    fn define_test_classes(classes: &mut ClassRegistryBuilder) -> Result<(), RegistryError> {
        classes.define_class(
            ClassBuilder::<Sink>::new("Sink")
                .input("In", |s: &Sink| s.input, |s, v| s.input = v)
                .output("Sum", |s: &Sink| Ok(s.input.x + s.input.y + s.input.z)),
        )?;
        classes.define_class(
            ClassBuilder::<Ratio>::new("Ratio")
                .with_factory(|| Ratio { num: 1.0, den: 1.0 })
                .input("Num", |r: &Ratio| r.num, |r, v| r.num = v)
                .input("Den", |r: &Ratio| r.den, |r, v| r.den = v)
                .output("Product", |r: &Ratio| Ok(r.num * r.den))
                .output("Quotient", |r: &Ratio| {
                    if r.den == 0.0 {
                        Err(ComputeError::new("division by zero"))
                    } else {
                        Ok(r.num / r.den)
                    }
                }),
        )
    }

    fn test_graph() -> Graph {
        let mut registration = classes::registration();
        registration.add_define_classes_callback(define_test_classes);
        let registry = Arc::new(registration.run_define_callbacks().unwrap());
        Graph::new(registry, &GraphSettings::default()).unwrap()
    }

    fn pin(graph: &Graph, node: NodeId, name: &str) -> PinId {
        graph.pin_id(node, name).unwrap()
    }

    fn constant(graph: &mut Graph, value: f32) -> NodeId {
        let node = graph.add_node_by_name("Constant").unwrap();
        let value_pin = pin(graph, node, "Value");
        graph.set_embedded_value(value_pin, Value::Float(value)).unwrap();
        node
    }

    fn float_output(graph: &Graph, node: NodeId, name: &str) -> Option<f32> {
        graph.output_value(pin(graph, node, name))?.get::<f32>()
    }

    #[test]
    fn test_constant_output() {
        let mut graph = test_graph();
        let node = constant(&mut graph, 5.0);
        graph.update_state();
        assert_eq!(float_output(&graph, node, "Result"), Some(5.0));
    }

    #[test]
    fn test_add_two_constants() {
        let mut graph = test_graph();
        let c1 = constant(&mut graph, 2.0);
        let c2 = constant(&mut graph, 3.0);
        let add = graph.add_node_by_name("Add").unwrap();

        graph.add_link(pin(&graph, c1, "Result"), pin(&graph, add, "A")).unwrap();
        graph.add_link(pin(&graph, c2, "Result"), pin(&graph, add, "B")).unwrap();
        graph.update_state();

        assert_eq!(
            graph.output_value(pin(&graph, add, "Result")),
            Some(&Value::Universal(UniversalType::Float(5.0)))
        );
        assert_eq!(graph.links().count(), 2);
        assert_eq!(graph.count_nodes(), 3);
    }

    #[test]
    fn test_link_into_node_without_inputs() {
        let mut graph = test_graph();
        let c1 = constant(&mut graph, 2.0);
        let add = graph.add_node_by_name("Add").unwrap();
        graph.add_link(pin(&graph, c1, "Result"), pin(&graph, add, "A")).unwrap();
        graph.update_state();

        let result = pin(&graph, add, "Result");
        let embedded = pin(&graph, c1, "Value");
        let fake_input = PinId::new(c1, 1, PinKind::Input, false);
        assert!(!graph.test_add_link(result, embedded));
        assert!(!graph.test_add_link(result, fake_input));
        assert!(matches!(
            graph.add_link(result, fake_input),
            Err(GraphError::PinNotFound(_))
        ));
        assert_eq!(graph.links().count(), 1);
    }

    #[test]
    fn test_cycle_rejected() {
        let mut graph = test_graph();
        let a = graph.add_node_by_name("Add").unwrap();
        let b = graph.add_node_by_name("Add").unwrap();
        let c = graph.add_node_by_name("Add").unwrap();
        graph.add_link(pin(&graph, a, "Result"), pin(&graph, b, "A")).unwrap();
        graph.add_link(pin(&graph, b, "Result"), pin(&graph, c, "A")).unwrap();
        graph.update_state();

        let links_before: Vec<_> = graph.links().collect();
        let closing = (pin(&graph, c, "Result"), pin(&graph, a, "A"));
        assert!(!graph.test_add_link(closing.0, closing.1));
        assert!(matches!(
            graph.add_link(closing.0, closing.1),
            Err(GraphError::Cycle(_))
        ));
        assert!(matches!(
            graph.add_link(pin(&graph, a, "Result"), pin(&graph, a, "B")),
            Err(GraphError::SelfLoop)
        ));

        graph.update_state();
        assert_eq!(graph.links().collect::<Vec<_>>(), links_before);
        assert_eq!(graph.node(a).unwrap().order(), 0);
        assert_eq!(graph.node(b).unwrap().order(), 1);
        assert_eq!(graph.node(c).unwrap().order(), 2);
    }

    #[test]
    fn test_convert_error_blocks_outputs_until_detached() {
        let mut graph = test_graph();
        let add = graph.add_node_by_name("Add").unwrap();
        let sink = graph.add_node_by_name("Sink").unwrap();
        let noise = graph.add_node_by_name("ChessCubes").unwrap();
        graph
            .set_input_value(pin(&graph, add, "B"), Value::Float(1.0))
            .unwrap();
        let link = graph
            .add_link(pin(&graph, add, "Result"), pin(&graph, sink, "In"))
            .unwrap();
        graph.update_state();
        assert_eq!(float_output(&graph, sink, "Sum"), Some(3.0));

        graph
            .add_link(pin(&graph, noise, "Result"), pin(&graph, add, "A"))
            .unwrap();
        graph.update_state();
        let sink_node = graph.node(sink).unwrap();
        assert!(sink_node.exists_convert_error());
        assert_eq!(
            sink_node.error_message(),
            Some("connected pins are of incompatible types")
        );
        assert_eq!(float_output(&graph, sink, "Sum"), Some(3.0));

        graph.remove_link(link).unwrap();
        assert!(!graph.node(sink).unwrap().exists_convert_error());
        graph.update_state();
        assert_eq!(float_output(&graph, sink, "Sum"), Some(0.0));
        assert!(graph.node(sink).unwrap().is_valid());
    }

    #[test]
    fn test_incompatible_link_rejected() {
        let mut graph = test_graph();
        let noise = graph.add_node_by_name("ChessCubes").unwrap();
        let sink = graph.add_node_by_name("Sink").unwrap();
        let (src, dst) = (pin(&graph, noise, "Result"), pin(&graph, sink, "In"));
        assert!(matches!(
            graph.check_add_link(src, dst),
            Err(GraphError::IncompatibleTypes {
                from: TypeId::Generator3D,
                to: TypeId::Vector3f,
                ..
            })
        ));
        assert!(matches!(
            graph.check_add_link(dst, src),
            Err(GraphError::PinKindMismatch { .. })
        ));
    }

    #[test]
    fn test_result_error_is_isolated() {
        let mut graph = test_graph();
        let ratio = graph.add_node_by_name("Ratio").unwrap();
        let num = constant(&mut graph, 6.0);
        let den = constant(&mut graph, 3.0);
        graph.add_link(pin(&graph, num, "Result"), pin(&graph, ratio, "Num")).unwrap();
        let den_link = graph
            .add_link(pin(&graph, den, "Result"), pin(&graph, ratio, "Den"))
            .unwrap();
        graph.update_state();
        assert_eq!(float_output(&graph, ratio, "Quotient"), Some(2.0));

        graph
            .set_embedded_value(pin(&graph, den, "Value"), Value::Float(0.0))
            .unwrap();
        graph.update_state();
        let node = graph.node(ratio).unwrap();
        assert!(node.exists_result_error());
        assert_eq!(node.error_message(), Some("division by zero"));
        assert_eq!(float_output(&graph, ratio, "Product"), Some(0.0));
        assert_eq!(float_output(&graph, ratio, "Quotient"), Some(2.0));

        graph.remove_link(den_link).unwrap();
        graph.update_state();
        assert!(graph.node(ratio).unwrap().is_valid());
        assert_eq!(float_output(&graph, ratio, "Quotient"), Some(6.0));
    }

    #[test]
    fn test_order_follows_links() {
        let mut graph = test_graph();
        let sources: Vec<_> = (0..3).map(|i| constant(&mut graph, i as f32)).collect();
        let adds: Vec<_> = (0..4)
            .map(|_| graph.add_node_by_name("Add").unwrap())
            .collect();
        let wiring = [
            (sources[0], adds[3], "A"),
            (adds[3], adds[1], "A"),
            (sources[1], adds[1], "B"),
            (adds[1], adds[0], "A"),
            (adds[3], adds[0], "B"),
            (sources[2], adds[2], "A"),
            (adds[0], adds[2], "B"),
        ];
        for (src, dst, input) in wiring {
            graph
                .add_link(pin(&graph, src, "Result"), pin(&graph, dst, input))
                .unwrap();
        }
        graph.update_state();

        for link in graph.links() {
            let src = graph.node(link.src().node_id()).unwrap();
            let dst = graph.node(link.dst().node_id()).unwrap();
            assert!(dst.order() > src.order(), "{link:?}");
        }
        assert_eq!(
            graph.output_value(pin(&graph, adds[2], "Result")),
            Some(&Value::Universal(UniversalType::Float(2.0 + 1.0)))
        );
    }

    #[test]
    fn test_update_is_idempotent() {
        let mut graph = test_graph();
        let c1 = constant(&mut graph, 1.5);
        let add = graph.add_node_by_name("Add").unwrap();
        graph.add_link(pin(&graph, c1, "Result"), pin(&graph, add, "A")).unwrap();
        graph.update_state();
        let first: Vec<_> = graph
            .nodes()
            .flat_map(|node| node.pins().iter().map(|pin| pin.cached_value().cloned()))
            .collect();

        graph.update_state();
        let second: Vec<_> = graph
            .nodes()
            .flat_map(|node| node.pins().iter().map(|pin| pin.cached_value().cloned()))
            .collect();
        assert_eq!(first, second);
        assert!(graph
            .nodes()
            .all(|node| node.change_state() == ChangeState::NotChanged));
    }

    #[test]
    fn test_remove_node_detaches_links() {
        let mut graph = test_graph();
        let c1 = constant(&mut graph, 4.0);
        let add = graph.add_node_by_name("Add").unwrap();
        graph.add_link(pin(&graph, c1, "Result"), pin(&graph, add, "A")).unwrap();
        graph.update_state();

        assert!(graph.test_remove_node(c1));
        let instance = graph.remove_node(c1).unwrap();
        assert!(instance.is::<classes::Constant<f32>>());
        assert!(!graph.test_remove_node(c1));
        assert_eq!(graph.links().count(), 0);
        assert_eq!(graph.count_nodes(), 1);

        graph.update_state();
        assert_eq!(
            graph.output_value(pin(&graph, add, "Result")),
            Some(&Value::Universal(UniversalType::Float(0.0)))
        );

        let reused = graph.add_node_by_name("Constant").unwrap();
        assert_eq!(reused, c1);
    }

    #[test]
    fn test_relink_replaces_source() {
        let mut graph = test_graph();
        let c1 = constant(&mut graph, 1.0);
        let c2 = constant(&mut graph, 2.0);
        let add = graph.add_node_by_name("Add").unwrap();
        let input = pin(&graph, add, "A");
        graph.add_link(pin(&graph, c1, "Result"), input).unwrap();
        assert!(matches!(
            graph.add_link(pin(&graph, c1, "Result"), input),
            Err(GraphError::LinkExists(_))
        ));
        graph.add_link(pin(&graph, c2, "Result"), input).unwrap();

        let c1_out = graph.node(c1).unwrap().pin(1).unwrap();
        assert_eq!(c1_out.links_count(), 0);
        assert_eq!(graph.links().count(), 1);
        graph.update_state();
        assert_eq!(
            graph.output_value(pin(&graph, add, "Result")),
            Some(&Value::Universal(UniversalType::Float(2.0)))
        );
    }

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
    }

    impl Draw for Recorder {
        fn on_start_draw_graph(&mut self) {
            self.events.push("graph".to_string());
        }
        fn on_finish_draw_graph(&mut self) {
            self.events.push("/graph".to_string());
        }
        fn on_start_draw_node(&mut self, node_id: NodeId, display_name: &str) {
            self.events.push(format!("node {node_id} {display_name}"));
        }
        fn on_finish_draw_node(&mut self, is_valid: bool, error_message: Option<&str>) {
            self.events.push(format!("/node {is_valid} {error_message:?}"));
        }
        fn on_draw_input_pins(&mut self, pins: &[crate::draw::DrawPin<'_>]) {
            let connected = pins.iter().filter(|pin| pin.is_connected).count();
            self.events.push(format!("inputs {}/{connected}", pins.len()));
        }
        fn on_draw_output_pins(&mut self, pins: &[crate::draw::DrawPin<'_>]) {
            self.events.push(format!("outputs {}", pins.len()));
        }
        fn on_draw_mini_preview(&mut self, type_id: TypeId, value: &Value, _: u8) {
            self.events.push(format!("mini {type_id} {value:?}"));
        }
        fn on_draw_full_preview(&mut self, preview: Option<crate::draw::Preview<'_>>) {
            self.events.push(format!("full {:?}", preview.map(|p| p.type_id)));
        }
        fn on_draw_link(&mut self, _: LinkId, src: PinId, dst: PinId) {
            self.events.push(format!("link {} {}", src.node_id(), dst.node_id()));
        }
        fn on_start_draw_node_property(&mut self, display_name: &str) {
            self.events.push(format!("property {display_name}"));
        }
        fn on_draw_pin_property(
            &mut self,
            display_name: &str,
            _: &mut crate::draw::PropertyValue<'_>,
            disabled: bool,
        ) -> crate::draw::PropertyState {
            self.events.push(format!("pin {display_name} {disabled}"));
            crate::draw::PropertyState::Unchanged
        }
        fn on_finish_draw_node_property(&mut self) {
            self.events.push("/property".to_string());
        }
    }

    #[test]
    fn test_draw_graph_and_properties() {
        let mut graph = test_graph();
        let c1 = constant(&mut graph, 2.0);
        let add = graph.add_node_by_name("Add").unwrap();
        graph.add_link(pin(&graph, c1, "Result"), pin(&graph, add, "A")).unwrap();
        graph.update_state();

        let mut recorder = Recorder::default();
        graph.draw_graph(&mut recorder);
        assert_eq!(
            recorder.events,
            [
                "graph",
                "node #1 Constant",
                "inputs 0/0",
                "mini Float Float(2.0)",
                "outputs 1",
                "/node true None",
                "node #2 Add",
                "inputs 2/1",
                "mini Float Float(2.0)",
                "outputs 1",
                "/node true None",
                "link #1 #2",
                "/graph",
            ]
        );

        let mut recorder = Recorder::default();
        graph.draw_node_property(add, &mut recorder).unwrap();
        graph.draw_node_preview(Some(add), &mut recorder);
        graph.draw_node_preview(Some(NodeId(9)), &mut recorder);
        assert_eq!(
            recorder.events,
            [
                "property Add",
                "pin A true",
                "pin B false",
                "/property",
                "full Some(Float)",
                "full None",
            ]
        );
    }

    #[test]
    fn test_long_chain() {
        const LENGTH: u16 = 30_000;
        let registry = Arc::new(classes::registration().run_define_callbacks().unwrap());
        let settings = GraphSettings {
            capacity: LENGTH,
            ..GraphSettings::default()
        };
        let mut graph = Graph::new(registry, &settings).unwrap();
        let nodes: Vec<NodeId> = (0..LENGTH)
            .map(|_| graph.add_node_by_name("Add").unwrap())
            .collect();
        for &node in &nodes {
            graph
                .set_input_value(pin(&graph, node, "B"), Value::Float(1.0))
                .unwrap();
        }
        for pair in nodes.windows(2) {
            graph
                .add_link(pin(&graph, pair[1], "Result"), pin(&graph, pair[0], "A"))
                .unwrap();
        }
        graph.update_state();

        let head = nodes[0];
        assert_eq!(graph.node(head).unwrap().order(), LENGTH - 1);
        assert_eq!(
            graph.output_value(pin(&graph, head, "Result")),
            Some(&Value::Universal(UniversalType::Float(f32::from(LENGTH))))
        );

        let tail = nodes[nodes.len() - 1];
        assert!(matches!(
            graph.check_add_link(pin(&graph, head, "Result"), pin(&graph, tail, "A")),
            Err(GraphError::Cycle(_))
        ));
    }

    #[test]
    fn test_capacity_exhausted() {
        let mut registration = classes::registration();
        registration.add_define_classes_callback(define_test_classes);
        let registry = Arc::new(registration.run_define_callbacks().unwrap());
        let settings = GraphSettings {
            capacity: 2,
            ..GraphSettings::default()
        };
        let mut graph = Graph::new(registry, &settings).unwrap();
        graph.add_node_by_name("Constant").unwrap();
        graph.add_node_by_name("Constant").unwrap();
        assert!(matches!(
            graph.add_node_by_name("Constant"),
            Err(GraphError::CapacityExhausted(2))
        ));
        assert!(matches!(
            graph.add_node_by_name("Missing"),
            Err(GraphError::Registry(RegistryError::UnknownClass(_)))
        ));
    }
}
