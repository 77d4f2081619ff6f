// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph nodes: pins, change tracking and incremental evaluation.

use crate::class::{ClassDescriptor, Instance};
use crate::convert::{ConvertError, ConvertFn};
use crate::draw::{Draw, DrawPin, Preview, PropertyState, PropertyValue};
use crate::graph::GraphError;
use crate::id::{NodeId, PinId, PinKind};
use crate::registry::TypeRegistry;
use crate::types::TypeId;
use crate::value::Value;
use bitflags::bitflags;
use std::cell::Cell;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;

/// Slot index used to terminate free and evaluation chains
pub const INVALID_NODE_INDEX: u16 = u16::MAX;

const CONVERT_ERROR_MESSAGE: &str = "connected pins are of incompatible types";

bitflags! {
    /// Error conditions of a node; empty means valid
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ValidFlags: u8 {
        /// An output computation failed
        const RESULT_ERROR = 1 << 0;
        /// A linked input cannot be converted to its declared type
        const CONVERT_ERROR = 1 << 1;
    }
}

impl Default for ValidFlags {
    fn default() -> Self {
        Self::empty()
    }
}

/// What a node has to do in the next update pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChangeState {
    /// Up to date
    #[default]
    NotChanged,
    /// A link was attached; pull every linked input
    NeedUpdateInputs,
    /// A local value changed; recompute outputs
    NeedUpdateOutputs,
    /// Outputs changed during the current pass
    Updated,
}

/// Runtime state of one pin
#[derive(Debug, Clone)]
pub struct Pin {
    id: PinId,
    type_id: TypeId,
    attached: Option<PinId>,
    convert_func: Option<ConvertFn>,
    links_count: u32,
    cached_value: Option<Value>,
    result_error: Option<String>,
}

impl Pin {
    fn new(id: PinId, type_id: TypeId) -> Self {
        Self {
            id,
            type_id,
            attached: None,
            convert_func: None,
            links_count: 0,
            cached_value: None,
            result_error: None,
        }
    }

    /// Pin identity
    pub fn id(&self) -> PinId {
        self.id
    }

    /// Current type; differs from the class default while linked to another kind
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Output pin feeding this input
    pub fn attached(&self) -> Option<PinId> {
        self.attached
    }

    /// Whether a conversion runs when the input is pulled
    pub fn has_convert_func(&self) -> bool {
        self.convert_func.is_some()
    }

    /// Number of links leaving this output
    pub fn links_count(&self) -> u32 {
        self.links_count
    }

    /// Last successfully computed output value
    pub fn cached_value(&self) -> Option<&Value> {
        self.cached_value.as_ref()
    }

    /// Message of the last failed computation of this output
    pub fn result_error(&self) -> Option<&str> {
        self.result_error.as_deref()
    }
}

/// One slot of a graph; live while it has a class
#[derive(Default)]
pub struct Node {
    id: NodeId,
    class: Option<Arc<ClassDescriptor>>,
    instance: Option<Instance>,
    pins: Vec<Pin>,
    output_value_version: u8,
    valid_flags: ValidFlags,
    change_state: ChangeState,
    order: u16,
    order_generation: u32,
    acyclicity_generation: Cell<u32>,
    next_index: u16,
}

impl Node {
    pub(crate) fn init(&mut self, id: NodeId, next_index: u16) {
        self.id = id;
        self.next_index = next_index;
    }

    pub(crate) fn create(&mut self, class: Arc<ClassDescriptor>) {
        let instance = class.new_instance();
        let mut pins = Vec::with_capacity(class.count_pins());
        for (index, descriptor) in class.pins().iter().enumerate() {
            let universal = descriptor.kind() != PinKind::Embedded
                && descriptor.default_type().has_universal_bit();
            let id = PinId::new(self.id, index as u8, descriptor.kind(), universal);
            pins.push(Pin::new(id, descriptor.default_type()));
        }

        let mut valid_flags = ValidFlags::empty();
        for index in class.output_range() {
            let pin = &mut pins[index];
            match class.value(index, &*instance) {
                Ok(value) => {
                    if pin.type_id.has_universal_bit() {
                        pin.type_id = value.type_id();
                    }
                    pin.cached_value = Some(value);
                }
                Err(err) => {
                    tracing::warn!(node = %self.id, pin = %pin.id, error = %err, "Initial output computation failed");
                    pin.result_error = Some(err.to_string());
                    valid_flags.insert(ValidFlags::RESULT_ERROR);
                }
            }
        }

        self.pins = pins;
        self.instance = Some(instance);
        self.class = Some(class);
        self.output_value_version = 0;
        self.valid_flags = valid_flags;
        self.change_state = ChangeState::NotChanged;
    }

    pub(crate) fn reset(&mut self, next_index: u16) -> Option<Instance> {
        self.class = None;
        self.pins.clear();
        self.valid_flags = ValidFlags::empty();
        self.change_state = ChangeState::NotChanged;
        self.output_value_version = 0;
        self.next_index = next_index;
        self.instance.take()
    }

    /// Slot id, 1-based
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Whether the slot is vacant
    pub fn is_removed(&self) -> bool {
        self.class.is_none()
    }

    /// Class of a live node
    pub fn class(&self) -> Option<&Arc<ClassDescriptor>> {
        self.class.as_ref()
    }

    /// Native instance of a live node
    pub fn instance(&self) -> Option<&Instance> {
        self.instance.as_ref()
    }

    /// All pins, partitioned `[embedded][input][output]`
    pub fn pins(&self) -> &[Pin] {
        &self.pins
    }

    /// Pin by index
    pub fn pin(&self, index: usize) -> Option<&Pin> {
        self.pins.get(index)
    }

    /// Pin by id, only if the id matches exactly
    pub fn pin_by_id(&self, id: PinId) -> Option<&Pin> {
        self.pins.get(id.pin_index()).filter(|pin| pin.id == id)
    }

    /// Pending work for the next update pass
    pub fn change_state(&self) -> ChangeState {
        self.change_state
    }

    /// Error conditions
    pub fn valid_flags(&self) -> ValidFlags {
        self.valid_flags
    }

    /// Whether no error condition is set
    pub fn is_valid(&self) -> bool {
        self.valid_flags.is_empty()
    }

    /// Whether a linked input has an unconvertible type
    pub fn exists_convert_error(&self) -> bool {
        self.valid_flags.contains(ValidFlags::CONVERT_ERROR)
    }

    /// Whether any output failed its last computation
    pub fn exists_result_error(&self) -> bool {
        self.valid_flags.contains(ValidFlags::RESULT_ERROR)
    }

    /// Message to show for an invalid node
    pub fn error_message(&self) -> Option<&str> {
        if self.exists_result_error() {
            let range = self.output_range();
            return self.pins[range].iter().find_map(Pin::result_error);
        }
        if self.exists_convert_error() {
            return Some(CONVERT_ERROR_MESSAGE);
        }
        None
    }

    /// Version counter bumped by every successful output computation
    pub fn output_value_version(&self) -> u8 {
        self.output_value_version
    }

    /// Depth computed by the last update pass
    pub fn order(&self) -> u16 {
        self.order
    }

    pub(crate) fn next_index(&self) -> u16 {
        self.next_index
    }

    pub(crate) fn set_next_index(&mut self, next_index: u16) {
        self.next_index = next_index;
    }

    /// Indices of embedded pins
    pub fn embedded_range(&self) -> Range<usize> {
        self.class.as_ref().map_or(0..0, |class| class.embedded_range())
    }

    /// Indices of input pins
    pub fn input_range(&self) -> Range<usize> {
        self.class.as_ref().map_or(0..0, |class| class.input_range())
    }

    /// Indices of output pins
    pub fn output_range(&self) -> Range<usize> {
        self.class.as_ref().map_or(0..0, |class| class.output_range())
    }

    /// Whether a link touches the pin
    pub fn is_connected_pin(&self, index: usize) -> bool {
        match self.pins.get(index) {
            Some(pin) => match pin.id.kind() {
                PinKind::Input => pin.attached.is_some(),
                PinKind::Output => pin.links_count > 0,
                PinKind::Embedded => false,
            },
            None => false,
        }
    }

    /// Last computed value of an output pin
    pub fn output_value(&self, index: usize) -> Option<&Value> {
        if !self.output_range().contains(&index) {
            return None;
        }
        self.pins[index].cached_value.as_ref()
    }

    fn input_sources(&self) -> impl Iterator<Item = usize> + '_ {
        let range = self.input_range();
        self.pins[range]
            .iter()
            .filter_map(|pin| pin.attached.map(PinId::node_index))
    }

    /// Memoized depth: 0 without linked inputs, else one more than the deepest source
    pub(crate) fn order_number(nodes: &mut [Node], index: usize, generation: u32) -> u16 {
        let mut stack = vec![(index, false)];
        while let Some((current, sources_done)) = stack.pop() {
            let Some(node) = nodes.get_mut(current) else {
                continue;
            };
            let sources: Vec<usize> = node.input_sources().collect();
            if sources_done {
                let order = sources
                    .iter()
                    .filter_map(|&source| nodes.get(source))
                    .map(|source| source.order.saturating_add(1))
                    .max()
                    .unwrap_or(0);
                nodes[current].order = order;
                continue;
            }
            if node.order_generation == generation {
                continue;
            }
            node.order_generation = generation;
            node.order = 0;
            stack.push((current, true));
            stack.extend(sources.into_iter().map(|source| (source, false)));
        }
        nodes.get(index).map_or(0, |node| node.order)
    }

    /// False when `dst` is reachable upstream from the node at `index`
    pub(crate) fn check_acyclicity(nodes: &[Node], index: usize, dst: NodeId, generation: u32) -> bool {
        let mut stack = vec![index];
        while let Some(current) = stack.pop() {
            let Some(node) = nodes.get(current) else {
                continue;
            };
            if node.acyclicity_generation.get() == generation {
                continue;
            }
            node.acyclicity_generation.set(generation);
            if node.id == dst {
                return false;
            }
            stack.extend(node.input_sources());
        }
        true
    }

    fn need_convert_func(&self, index: usize, type_id: TypeId) -> bool {
        let Some(class) = &self.class else {
            return false;
        };
        let default_type = class.default_pin_type(index);
        if default_type.has_universal_bit() && type_id.has_universal_bit() {
            return false;
        }
        default_type != type_id
    }

    /// Whether values of `type_id` can feed the input pin
    pub fn check_convert(&self, index: usize, type_id: TypeId) -> bool {
        if !self.need_convert_func(index, type_id) {
            return true;
        }
        self.class
            .as_ref()
            .is_some_and(|class| class.can_convert_to_default_type(index, type_id))
    }

    /// Pull linked inputs and recompute outputs as needed; returns the next chain index
    pub(crate) fn update_state(&mut self, nodes: &[Node]) -> u16 {
        let Some(class) = self.class.clone() else {
            return self.next_index;
        };
        let Some(instance) = self.instance.as_mut() else {
            return self.next_index;
        };

        let mut is_changed = false;
        self.valid_flags.remove(ValidFlags::CONVERT_ERROR);
        for index in class.input_range() {
            let Some(attached) = self.pins[index].attached else {
                continue;
            };
            let Some(source) = nodes.get(attached.node_index()) else {
                continue;
            };
            let Some(source_pin) = source.pins.get(attached.pin_index()) else {
                continue;
            };

            let attached_type = source_pin.type_id;
            let default_type = class.default_pin_type(index);
            let need_convert = !(default_type.has_universal_bit() && attached_type.has_universal_bit())
                && default_type != attached_type;
            let pin = &mut self.pins[index];
            let mut type_changed = false;
            if attached_type == pin.type_id {
                if pin.convert_func.is_none() && need_convert {
                    self.valid_flags.insert(ValidFlags::CONVERT_ERROR);
                    continue;
                }
            } else {
                type_changed = true;
                pin.type_id = attached_type;
                pin.convert_func = None;
                if need_convert {
                    pin.convert_func = class.convert_func_to_default_type(index, attached_type);
                    if pin.convert_func.is_none() {
                        tracing::warn!(node = %self.id, pin = %pin.id, from = %attached_type, to = %class.decl_pin_type(index), "Linked pin type cannot be converted");
                        self.valid_flags.insert(ValidFlags::CONVERT_ERROR);
                        continue;
                    }
                }
            }

            let pull = type_changed
                || self.change_state == ChangeState::NeedUpdateInputs
                || source.change_state != ChangeState::NotChanged;
            if !pull {
                continue;
            }
            let Some(value) = source_pin.cached_value.as_ref() else {
                continue;
            };
            let value = match pin.convert_func {
                Some(convert) => convert(value),
                None => Ok(value.clone()),
            };
            let result = value
                .map_err(Into::into)
                .and_then(|value| class.set_value(index, &mut **instance, value));
            match result {
                Ok(()) => is_changed = true,
                Err(err) => {
                    tracing::warn!(node = %self.id, pin = %pin.id, error = %err, "Failed to pull linked value");
                    self.valid_flags.insert(ValidFlags::CONVERT_ERROR);
                }
            }
        }

        let recompute = is_changed || self.change_state == ChangeState::NeedUpdateOutputs;
        if !self.valid_flags.contains(ValidFlags::CONVERT_ERROR) && recompute {
            for index in class.output_range() {
                let pin = &mut self.pins[index];
                match class.value(index, &**instance) {
                    Ok(value) => {
                        if pin.type_id.has_universal_bit() {
                            pin.type_id = value.type_id();
                        }
                        pin.cached_value = Some(value);
                        pin.result_error = None;
                        self.output_value_version = self.output_value_version.wrapping_add(1);
                        is_changed = true;
                    }
                    Err(err) => {
                        tracing::warn!(node = %self.id, pin = %pin.id, error = %err, "Output computation failed");
                        pin.result_error = Some(err.to_string());
                    }
                }
            }
            let range = class.output_range();
            let has_error = self.pins[range].iter().any(|pin| pin.result_error.is_some());
            self.valid_flags.set(ValidFlags::RESULT_ERROR, has_error);
        }

        self.change_state = if is_changed {
            ChangeState::Updated
        } else {
            ChangeState::NotChanged
        };
        self.next_index
    }

    fn live_class(&self) -> Result<Arc<ClassDescriptor>, GraphError> {
        self.class.clone().ok_or(GraphError::NodeNotFound(self.id))
    }

    fn instance_mut(&mut self) -> Result<&mut Instance, GraphError> {
        self.instance.as_mut().ok_or(GraphError::NodeNotFound(self.id))
    }

    fn check_pin_kind(&self, index: usize, kind: PinKind) -> Result<(), GraphError> {
        match self.pins.get(index) {
            Some(pin) if pin.id.kind() == kind => Ok(()),
            Some(pin) => Err(GraphError::PinKindMismatch {
                pin: pin.id,
                expected: kind,
            }),
            None => Err(GraphError::PinIndexOutOfRange {
                node: self.id,
                index,
            }),
        }
    }

    /// Write an unlinked input; the value kind must match the pin's current kind
    pub fn set_input_value(&mut self, index: usize, value: Value) -> Result<(), GraphError> {
        self.check_pin_kind(index, PinKind::Input)?;
        let class = self.live_class()?;
        let pin = &self.pins[index];
        if pin.attached.is_some() {
            return Err(GraphError::PinConnected(pin.id));
        }

        let type_id = value.type_id();
        if type_id.to_base() != pin.type_id.to_base() {
            return Err(GraphError::WrongValueType {
                pin: pin.id,
                expected: pin.type_id.to_base(),
                actual: type_id,
            });
        }
        let value = if self.need_convert_func(index, type_id) {
            let convert = class
                .convert_func_to_default_type(index, type_id)
                .ok_or(ConvertError::Missing {
                    from: type_id,
                    to: class.decl_pin_type(index),
                })?;
            convert(&value)?
        } else {
            value
        };

        class.set_value(index, &mut **self.instance_mut()?, value)?;
        self.change_state = ChangeState::NeedUpdateOutputs;
        Ok(())
    }

    /// Write an embedded pin
    pub fn set_embedded_value(&mut self, index: usize, value: Value) -> Result<(), GraphError> {
        self.check_pin_kind(index, PinKind::Embedded)?;
        let class = self.live_class()?;
        class.set_value(index, &mut **self.instance_mut()?, value)?;
        self.change_state = ChangeState::NeedUpdateOutputs;
        Ok(())
    }

    /// Restore the class default of an embedded or unlinked input pin
    pub fn reset_to_default(&mut self, index: usize) -> Result<(), GraphError> {
        let pin = self.pins.get(index).ok_or(GraphError::PinIndexOutOfRange {
            node: self.id,
            index,
        })?;
        if pin.id.is_output() {
            return Err(GraphError::PinKindMismatch {
                pin: pin.id,
                expected: PinKind::Input,
            });
        }
        if pin.attached.is_some() {
            return Err(GraphError::PinConnected(pin.id));
        }

        let class = self.live_class()?;
        class.reset_to_default(index, &mut **self.instance_mut()?)?;
        self.change_state = ChangeState::NeedUpdateOutputs;
        Ok(())
    }

    pub(crate) fn attach_to_input_pin(&mut self, index: usize, attached: PinId, attached_type: TypeId) {
        self.change_state = ChangeState::NeedUpdateInputs;
        self.pins[index].attached = Some(attached);
        if attached_type == self.pins[index].type_id {
            return;
        }

        let need_convert = self.need_convert_func(index, attached_type);
        let convert_func = match &self.class {
            Some(class) if need_convert => class.convert_func_to_default_type(index, attached_type),
            _ => None,
        };
        let pin = &mut self.pins[index];
        pin.type_id = attached_type;
        pin.convert_func = convert_func;
        if need_convert && convert_func.is_none() {
            tracing::warn!(node = %self.id, pin = %pin.id, from = %attached_type, "Attached pin type cannot be converted");
            self.valid_flags.insert(ValidFlags::CONVERT_ERROR);
        }
    }

    pub(crate) fn detach_from_input_pin(&mut self, index: usize) -> Result<(), GraphError> {
        self.pins[index].attached = None;
        self.reset_to_default(index)?;
        self.detach_calc_type(index);
        Ok(())
    }

    /// Detach every input fed by `node_id`; returns how many were detached
    pub(crate) fn detach_from_input_pin_if_exists(&mut self, node_id: NodeId) -> Result<usize, GraphError> {
        let mut detached = 0;
        for index in self.input_range() {
            if self.pins[index].attached.map(PinId::node_id) == Some(node_id) {
                self.detach_from_input_pin(index)?;
                detached += 1;
            }
        }
        Ok(detached)
    }

    fn detach_calc_type(&mut self, index: usize) {
        let default_type = self
            .class
            .as_ref()
            .map_or(TypeId::Unknown, |class| class.default_pin_type(index));
        let pin = &mut self.pins[index];
        pin.type_id = default_type;
        pin.convert_func = None;

        if self.exists_convert_error() {
            self.valid_flags.remove(ValidFlags::CONVERT_ERROR);
            let still_broken = self.input_range().any(|i| {
                let pin = &self.pins[i];
                pin.attached.is_some() && pin.convert_func.is_none() && self.need_convert_func(i, pin.type_id)
            });
            if still_broken {
                self.valid_flags.insert(ValidFlags::CONVERT_ERROR);
            }
        }
    }

    pub(crate) fn inc_links_count(&mut self, index: usize) {
        if let Some(pin) = self.pins.get_mut(index) {
            pin.links_count += 1;
        }
    }

    pub(crate) fn dec_links_count(&mut self, index: usize) {
        if let Some(pin) = self.pins.get_mut(index) {
            pin.links_count = pin.links_count.saturating_sub(1);
        }
    }

    fn draw_pins<'a>(&'a self, class: &'a ClassDescriptor, range: Range<usize>) -> Vec<DrawPin<'a>> {
        range
            .filter_map(|index| {
                let descriptor = class.pin(index)?;
                Some(DrawPin {
                    id: self.pins[index].id,
                    is_connected: self.is_connected_pin(index),
                    display_name: descriptor.display_name(),
                })
            })
            .collect()
    }

    /// Draw the node body: pins, mini preview and validity
    pub fn draw_graph(&self, drawer: &mut dyn Draw) {
        let Some(class) = &self.class else {
            return;
        };
        drawer.on_start_draw_node(self.id, class.display_name());
        drawer.on_draw_input_pins(&self.draw_pins(class, class.input_range()));

        let first_output = class.output_range().start;
        if let Some(pin) = self.pins.get(first_output).filter(|_| class.count_output_pins() > 0) {
            if let Some(value) = &pin.cached_value {
                let value = value.clone().unwrap_universal();
                drawer.on_draw_mini_preview(pin.type_id.to_base(), &value, self.output_value_version);
            }
        }

        drawer.on_draw_output_pins(&self.draw_pins(class, class.output_range()));
        drawer.on_finish_draw_node(self.is_valid(), self.error_message());
    }

    /// Draw the full preview of the first output
    pub fn draw_node_preview(&self, drawer: &mut dyn Draw) {
        let first_output = self.output_range().next();
        let preview = first_output
            .and_then(|index| self.pins.get(index))
            .and_then(|pin| Some((pin.type_id, pin.cached_value.as_ref()?)));
        match preview {
            Some((type_id, value)) => {
                let value = value.clone().unwrap_universal();
                drawer.on_draw_full_preview(Some(Preview {
                    node_id: self.id,
                    type_id: type_id.to_base(),
                    value: &value,
                    version: self.output_value_version,
                }));
            }
            None => drawer.on_draw_full_preview(None),
        }
    }

    /// Draw editable embedded and input pins and apply the edits
    pub fn draw_node_property(&mut self, types: &TypeRegistry, drawer: &mut dyn Draw) -> Result<(), GraphError> {
        let class = self.live_class()?;
        drawer.on_start_draw_node_property(class.display_name());

        for index in class.embedded_range() {
            let mut value = self.pin_value(&class, index)?;
            let type_id = value.type_id();
            let mut property = PropertyValue {
                value: &mut value,
                type_id,
                fields: types.fields(type_id),
            };
            let display_name = class.pin(index).map_or("", |pin| pin.display_name());
            match drawer.on_draw_pin_property(display_name, &mut property, false) {
                PropertyState::Changed => self.set_embedded_value(index, value)?,
                PropertyState::ResetToDefault => self.reset_to_default(index)?,
                PropertyState::Unchanged => {}
            }
        }

        for index in class.input_range() {
            let draw_type = self.pins[index].type_id.to_base();
            if !draw_type.is_ui_enabled() {
                continue;
            }
            let mut value = self.pin_value(&class, index)?.unwrap_universal();
            let type_id = value.type_id();
            if !type_id.is_ui_enabled() {
                continue;
            }
            let disabled = self.is_connected_pin(index);
            let mut property = PropertyValue {
                value: &mut value,
                type_id,
                fields: types.fields(type_id),
            };
            let display_name = class.pin(index).map_or("", |pin| pin.display_name());
            let state = drawer.on_draw_pin_property(display_name, &mut property, disabled);
            if disabled {
                continue;
            }
            match state {
                PropertyState::Changed => self.set_input_value(index, value)?,
                PropertyState::ResetToDefault => self.reset_to_default(index)?,
                PropertyState::Unchanged => {}
            }
        }

        drawer.on_finish_draw_node_property();
        Ok(())
    }

    fn pin_value(&self, class: &ClassDescriptor, index: usize) -> Result<Value, GraphError> {
        let instance = self.instance.as_ref().ok_or(GraphError::NodeNotFound(self.id))?;
        Ok(class.value(index, &**instance)?)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("class", &self.class.as_ref().map(|class| class.name()))
            .field("pins", &self.pins)
            .field("valid_flags", &self.valid_flags)
            .field("change_state", &self.change_state)
            .field("order", &self.order)
            .finish_non_exhaustive()
    }
}
