// SPDX-License-Identifier: MIT OR Apache-2.0
//! Drawing callbacks.
//!
//! The graph never renders anything itself. Editors implement [`Draw`] and
//! the graph walks its nodes, pins and links through it. Property editing
//! flows back through [`PropertyValue`] and [`PropertyState`].

use crate::id::{LinkId, NodeId, PinId};
use crate::types::TypeId;
use crate::value::Value;

/// Pin as shown on a node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawPin<'a> {
    /// Pin identity
    pub id: PinId,
    /// Whether a link is attached (inputs) or leaves the pin (outputs)
    pub is_connected: bool,
    /// Name shown in the editor
    pub display_name: &'a str,
}

/// Value shown in the preview panel
#[derive(Debug, Clone, Copy)]
pub struct Preview<'a> {
    /// Node being previewed
    pub node_id: NodeId,
    /// Kind of the value, universal bit stripped
    pub type_id: TypeId,
    /// Last computed output value
    pub value: &'a Value,
    /// Output value version, changes whenever an output is recomputed
    pub version: u8,
}

/// Editable pin value handed to the property panel
#[derive(Debug)]
pub struct PropertyValue<'a> {
    /// Value to edit in place
    pub value: &'a mut Value,
    /// Kind of the value, universal bit stripped
    pub type_id: TypeId,
    /// Field names for composite kinds
    pub fields: Option<&'a [String]>,
}

/// Outcome of drawing one pin property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PropertyState {
    /// Nothing was edited
    #[default]
    Unchanged,
    /// The value was edited in place
    Changed,
    /// The user asked for the class default
    ResetToDefault,
}

/// Editor backend that renders graphs and node properties
pub trait Draw {
    /// A graph pass starts
    fn on_start_draw_graph(&mut self);

    /// A graph pass ends
    fn on_finish_draw_graph(&mut self);

    /// A node starts
    fn on_start_draw_node(&mut self, node_id: NodeId, display_name: &str);

    /// A node ends; `error_message` is set for invalid nodes
    fn on_finish_draw_node(&mut self, is_valid: bool, error_message: Option<&str>);

    /// Input pins of the current node
    fn on_draw_input_pins(&mut self, pins: &[DrawPin<'_>]);

    /// Output pins of the current node
    fn on_draw_output_pins(&mut self, pins: &[DrawPin<'_>]);

    /// Small preview of the current node's first output
    fn on_draw_mini_preview(&mut self, type_id: TypeId, value: &Value, version: u8);

    /// Large preview of the selected node; `None` disables the preview
    fn on_draw_full_preview(&mut self, preview: Option<Preview<'_>>);

    /// A link between two pins
    fn on_draw_link(&mut self, link_id: LinkId, src: PinId, dst: PinId);

    /// The property panel of a node starts
    fn on_start_draw_node_property(&mut self, display_name: &str);

    /// One editable pin; `disabled` is set for connected inputs
    fn on_draw_pin_property(
        &mut self,
        display_name: &str,
        property: &mut PropertyValue<'_>,
        disabled: bool,
    ) -> PropertyState;

    /// The property panel ends
    fn on_finish_draw_node_property(&mut self);
}
