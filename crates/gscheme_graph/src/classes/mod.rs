// SPDX-License-Identifier: MIT OR Apache-2.0
//! Built-in node classes.
//!
//! - `Constant`, `Constant2`, `Constant3`, `Constant4`: embedded value to output
//! - `Add`, `Min`, `Max`: universal binary operations
//! - `ChessCubes`, `Spheres`, `Cylinders`: procedural 3D patterns

pub mod arithmetic;
pub mod constant;
pub mod noise;

pub use arithmetic::{BinaryOp, BinaryUniversal};
pub use constant::Constant;
pub use noise::{Noise, Pattern};

use crate::registry::{ClassRegistryBuilder, Registration, RegistryError, TypeRegistry};
use crate::types::TypeId;

fn define_types(types: &mut TypeRegistry) -> Result<(), RegistryError> {
    types.define_composite(TypeId::Vector2f, &["x", "y"])?;
    types.define_composite(TypeId::Vector3f, &["x", "y", "z"])?;
    types.define_composite(TypeId::Vector4f, &["x", "y", "z", "w"])
}

fn define_classes(classes: &mut ClassRegistryBuilder) -> Result<(), RegistryError> {
    constant::define_classes(classes)?;
    arithmetic::define_classes(classes)?;
    noise::define_classes(classes)
}

/// Callbacks registering the vector layouts and every built-in class
pub fn registration() -> Registration {
    let mut registration = Registration::new();
    registration
        .add_define_types_callback(define_types)
        .add_define_classes_callback(define_classes);
    registration
}
