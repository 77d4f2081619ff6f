// SPDX-License-Identifier: MIT OR Apache-2.0
//! Binary operations on universal values.
//!
//! Both operands are converted to the wider of their two kinds before the
//! operation runs. Scalars and vectors combine component-wise; generators
//! combine point-wise, with scalars and vectors entering as constants.

use crate::class::{ClassBuilder, ComputeError};
use crate::convert::ConversionTable;
use crate::registry::{ClassRegistryBuilder, RegistryError};
use crate::types::{max_type_id, Generator2d, Generator3d, UniversalType};
use crate::value::Value;
use glam::{Vec2, Vec3, Vec4};

/// Operation applied by a binary node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    /// `a + b`
    Add,
    /// Component-wise minimum
    Min,
    /// Component-wise maximum
    Max,
}

trait Combine: Sized {
    fn combine(self, other: Self, op: BinaryOp) -> Self;
}

macro_rules! impl_combine {
    ($($ty:ty),*) => {
        $(
            impl Combine for $ty {
                fn combine(self, other: Self, op: BinaryOp) -> Self {
                    match op {
                        BinaryOp::Add => self + other,
                        BinaryOp::Min => self.min(other),
                        BinaryOp::Max => self.max(other),
                    }
                }
            }
        )*
    };
}

impl_combine!(f32, f64, Vec2, Vec3, Vec4);

/// Native instance of the binary nodes
#[derive(Debug, Clone, Default)]
pub struct BinaryUniversal {
    /// First operand
    pub a: UniversalType,
    /// Second operand
    pub b: UniversalType,
}

impl BinaryUniversal {
    /// Apply `op` to both operands
    pub fn compute(&self, op: BinaryOp) -> Result<UniversalType, ComputeError> {
        let (a_type, b_type) = (self.a.type_id(), self.b.type_id());
        let target = max_type_id(a_type, b_type);
        let table = ConversionTable::global();
        let widen = |value: &UniversalType| {
            table
                .convert(&Value::Universal(value.clone()), target)
                .map_err(|_| {
                    ComputeError::new(format!(
                        "types {} and {} are not compatible",
                        a_type.to_base(),
                        b_type.to_base()
                    ))
                })
        };

        let result = match (widen(&self.a)?, widen(&self.b)?) {
            (Value::Float(a), Value::Float(b)) => UniversalType::Float(a.combine(b, op)),
            (Value::Vector2f(a), Value::Vector2f(b)) => UniversalType::Vector2f(a.combine(b, op)),
            (Value::Vector3f(a), Value::Vector3f(b)) => UniversalType::Vector3f(a.combine(b, op)),
            (Value::Vector4f(a), Value::Vector4f(b)) => UniversalType::Vector4f(a.combine(b, op)),
            (Value::Generator2D(a), Value::Generator2D(b)) => UniversalType::Generator2D(
                Generator2d::new(move |x, y| a.eval(x, y).combine(b.eval(x, y), op)),
            ),
            (Value::Generator3D(a), Value::Generator3D(b)) => UniversalType::Generator3D(
                Generator3d::new(move |x, y, z| a.eval(x, y, z).combine(b.eval(x, y, z), op)),
            ),
            (a, b) => {
                return Err(ComputeError::WrongValue {
                    expected: a.type_id(),
                    actual: b.type_id(),
                })
            }
        };
        Ok(result)
    }
}

fn define_binary(classes: &mut ClassRegistryBuilder, name: &str, op: BinaryOp) -> Result<(), RegistryError> {
    classes.define_class(
        ClassBuilder::<BinaryUniversal>::new(name)
            .input("A", |f: &BinaryUniversal| f.a.clone(), |f, v| f.a = v)
            .input("B", |f: &BinaryUniversal| f.b.clone(), |f, v| f.b = v)
            .output("Result", move |f: &BinaryUniversal| f.compute(op)),
    )
}

pub(super) fn define_classes(classes: &mut ClassRegistryBuilder) -> Result<(), RegistryError> {
    define_binary(classes, "Add", BinaryOp::Add)?;
    define_binary(classes, "Min", BinaryOp::Min)?;
    define_binary(classes, "Max", BinaryOp::Max)
}
