// SPDX-License-Identifier: MIT OR Apache-2.0
//! Typed node graph runtime.
//!
//! This crate evaluates dataflow graphs whose nodes are reflected native
//! Rust types:
//! - Class reflection through typed pin accessors
//! - Typed pins with implicit conversions and universal pins
//! - Link validation with cycle rejection
//! - Incremental evaluation in dependency order
//! - Editor drawing and property editing callbacks
//!
//! ## Architecture
//!
//! The runtime is built on:
//! - A class registry filled once through registration callbacks
//! - A fixed pool of node slots per graph
//! - Change tracking so only affected nodes recompute
//! - RON settings and snapshots

pub mod class;
pub mod classes;
pub mod convert;
pub mod draw;
pub mod graph;
pub mod id;
pub mod node;
pub mod registry;
pub mod settings;
pub mod snapshot;
pub mod types;
pub mod value;

pub use class::{ClassBuilder, ClassDescriptor, ComputeError, Instance, PinDescriptor};
pub use convert::{ConversionTable, ConvertError, ConvertFn, ConvertTo};
pub use draw::{Draw, DrawPin, Preview, PropertyState, PropertyValue};
pub use graph::{Graph, GraphError};
pub use id::{GraphId, LinkId, NodeId, PinId, PinKind, MAX_NODES, MAX_PINS_COUNT};
pub use node::{ChangeState, Node, Pin, ValidFlags};
pub use registry::{
    ClassRegistry, ClassRegistryBuilder, DefineClassesFn, DefineTypesFn, Registration,
    RegistryError, TypeRegistry,
};
pub use settings::{GraphSettings, SettingsError};
pub use snapshot::{GraphSnapshot, LinkSnapshot, NodeSnapshot, PinValueSnapshot, SnapshotError};
pub use types::{max_type_id, Generator2d, Generator3d, TypeId, UniversalType};
pub use value::{type_id, GsType, Value};
