// SPDX-License-Identifier: MIT OR Apache-2.0
//! Implicit conversions between pin kinds.
//!
//! Scalars broadcast into vectors, vectors narrow by truncation and any
//! scalar or vector becomes a constant generator. Vectors never widen and
//! generators only convert to themselves. Every conversion accepts the
//! universal-tagged form of its source kind as well.

use crate::types::{Generator2d, Generator3d, TypeId, UniversalType};
use crate::value::{GsType, Value};
use glam::{Vec2, Vec3, Vec4};
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Typed conversion between native pin types
pub trait ConvertTo<To> {
    /// Convert `self` into `To`
    fn convert_to(&self) -> To;
}

/// Convert a native value, e.g. `convert_to::<Vec3, _>(&1.0_f32)`
pub fn convert_to<To, From: ConvertTo<To>>(from: &From) -> To {
    from.convert_to()
}

macro_rules! impl_convert {
    ($from:ty => $to:ty, |$v:ident| $body:expr) => {
        impl ConvertTo<$to> for $from {
            fn convert_to(&self) -> $to {
                let $v = self;
                $body
            }
        }
    };
}

impl_convert!(f32 => f32, |v| *v);
impl_convert!(f32 => Vec2, |v| Vec2::splat(*v));
impl_convert!(f32 => Vec3, |v| Vec3::splat(*v));
impl_convert!(f32 => Vec4, |v| Vec4::splat(*v));
impl_convert!(f32 => Generator2d, |v| Generator2d::constant(f64::from(*v)));
impl_convert!(f32 => Generator3d, |v| Generator3d::constant(f64::from(*v)));

impl_convert!(Vec2 => f32, |v| v.x);
impl_convert!(Vec2 => Vec2, |v| *v);
impl_convert!(Vec2 => Generator2d, |v| Generator2d::constant(f64::from(v.x)));
impl_convert!(Vec2 => Generator3d, |v| Generator3d::constant(f64::from(v.x)));

impl_convert!(Vec3 => f32, |v| v.x);
impl_convert!(Vec3 => Vec2, |v| v.truncate());
impl_convert!(Vec3 => Vec3, |v| *v);
impl_convert!(Vec3 => Generator2d, |v| Generator2d::constant(f64::from(v.x)));
impl_convert!(Vec3 => Generator3d, |v| Generator3d::constant(f64::from(v.x)));

impl_convert!(Vec4 => f32, |v| v.x);
impl_convert!(Vec4 => Vec2, |v| v.truncate().truncate());
impl_convert!(Vec4 => Vec3, |v| v.truncate());
impl_convert!(Vec4 => Vec4, |v| *v);
impl_convert!(Vec4 => Generator2d, |v| Generator2d::constant(f64::from(v.x)));
impl_convert!(Vec4 => Generator3d, |v| Generator3d::constant(f64::from(v.x)));

impl_convert!(Generator2d => Generator2d, |v| v.clone());
impl_convert!(Generator3d => Generator3d, |v| v.clone());

impl_convert!(f32 => UniversalType, |v| UniversalType::Float(*v));
impl_convert!(Vec2 => UniversalType, |v| UniversalType::Vector2f(*v));
impl_convert!(Vec3 => UniversalType, |v| UniversalType::Vector3f(*v));
impl_convert!(Vec4 => UniversalType, |v| UniversalType::Vector4f(*v));
impl_convert!(Generator2d => UniversalType, |v| UniversalType::Generator2D(v.clone()));
impl_convert!(Generator3d => UniversalType, |v| UniversalType::Generator3D(v.clone()));
impl_convert!(UniversalType => UniversalType, |v| v.clone());

/// Type-erased conversion stored in input pins
pub type ConvertFn = fn(&Value) -> Result<Value, ConvertError>;

fn convert_value<F, T>(value: &Value) -> Result<Value, ConvertError>
where
    F: GsType + ConvertTo<T>,
    T: GsType,
{
    let from = F::from_value(value).ok_or(ConvertError::UnexpectedValue {
        expected: F::TYPE_ID,
        actual: value.type_id(),
    })?;
    Ok(from.convert_to().into_value())
}

static GLOBAL_TABLE: Lazy<ConversionTable> = Lazy::new(ConversionTable::new);

/// Lookup table of every supported `(from, to)` conversion
pub struct ConversionTable {
    funcs: HashMap<u16, ConvertFn>,
}

impl ConversionTable {
    /// Build the table with the fixed conversion matrix
    pub fn new() -> Self {
        let mut table = Self {
            funcs: HashMap::new(),
        };

        macro_rules! register {
            ($from:ty => [$($to:ty),* $(,)?]) => {
                $(table.register::<$from, $to>();)*
            };
        }

        register!(f32 => [f32, Vec2, Vec3, Vec4, Generator2d, Generator3d, UniversalType]);
        register!(Vec2 => [f32, Vec2, Generator2d, Generator3d, UniversalType]);
        register!(Vec3 => [f32, Vec2, Vec3, Generator2d, Generator3d, UniversalType]);
        register!(Vec4 => [f32, Vec2, Vec3, Vec4, Generator2d, Generator3d, UniversalType]);
        register!(Generator2d => [Generator2d, UniversalType]);
        register!(Generator3d => [Generator3d, UniversalType]);
        register!(UniversalType => [UniversalType]);

        table
    }

    /// Shared process-wide table
    pub fn global() -> &'static ConversionTable {
        &GLOBAL_TABLE
    }

    fn register<F, T>(&mut self)
    where
        F: GsType + ConvertTo<T>,
        T: GsType,
    {
        let func: ConvertFn = convert_value::<F, T>;
        self.funcs.insert(Self::key(F::TYPE_ID, T::TYPE_ID), func);
        if F::TYPE_ID.is_universal_member() {
            self.funcs
                .insert(Self::key(F::TYPE_ID.to_universal(), T::TYPE_ID), func);
        }
    }

    fn key(from: TypeId, to: TypeId) -> u16 {
        (u16::from(from.as_u8()) << 8) | u16::from(to.as_u8())
    }

    /// Whether `from` converts into `to`
    pub fn can_convert(&self, from: TypeId, to: TypeId) -> bool {
        self.funcs.contains_key(&Self::key(from, to))
    }

    /// Conversion function for a pair of kinds
    pub fn convert_func(&self, from: TypeId, to: TypeId) -> Result<ConvertFn, ConvertError> {
        self.funcs
            .get(&Self::key(from, to))
            .copied()
            .ok_or(ConvertError::Missing { from, to })
    }

    /// Convert a value into `to`
    pub fn convert(&self, value: &Value, to: TypeId) -> Result<Value, ConvertError> {
        let func = self.convert_func(value.type_id(), to)?;
        func(value)
    }

    /// Number of registered pairs
    pub fn len(&self) -> usize {
        self.funcs.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.funcs.is_empty()
    }
}

impl Default for ConversionTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Error raised by a conversion
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConvertError {
    /// The pair of kinds has no conversion
    #[error("No conversion from {from} to {to}")]
    Missing {
        /// Source kind
        from: TypeId,
        /// Target kind
        to: TypeId,
    },

    /// The value handed to a conversion has the wrong kind
    #[error("Expected a {expected} value, got {actual}")]
    UnexpectedValue {
        /// Kind the conversion reads
        expected: TypeId,
        /// Kind of the value it received
        actual: TypeId,
    },
}
