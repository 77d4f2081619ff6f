// SPDX-License-Identifier: MIT OR Apache-2.0
//! Value kinds that can flow through pins.
//!
//! Every kind is identified by a [`TypeId`]. The six kinds that make up
//! [`UniversalType`] can additionally carry the universal bit, which marks a
//! pin that was declared as accepting any member of the closed set.

use glam::{Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

const UNIVERSAL_BIT: u8 = 0x80;

/// Identifier of a value kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum TypeId {
    /// Not a pin type (embedded pins, vacant slots)
    #[default]
    Unknown = 0,
    /// `i8`
    Int8 = 1,
    /// `u8`
    Uint8 = 2,
    /// `i16`
    Int16 = 3,
    /// `u16`
    Uint16 = 4,
    /// `i32`
    Int32 = 5,
    /// `u32`
    Uint32 = 6,
    /// `i64`
    Int64 = 7,
    /// `u64`
    Uint64 = 8,
    /// `f32`
    Float = 9,
    /// `f64`
    Double = 10,
    /// 2D vector
    Vector2f = 11,
    /// 3D vector
    Vector3f = 12,
    /// 4D vector
    Vector4f = 13,
    /// 2D procedural generator
    Generator2D = 14,
    /// 3D procedural generator
    Generator3D = 15,
    /// String value
    String = 16,
    /// Any member of [`UniversalType`], concrete kind not yet known
    UniversalType = UNIVERSAL_BIT,
    /// Float held by a universal pin
    UniversalFloat = UNIVERSAL_BIT + 9,
    /// 2D vector held by a universal pin
    UniversalVector2f = UNIVERSAL_BIT + 11,
    /// 3D vector held by a universal pin
    UniversalVector3f = UNIVERSAL_BIT + 12,
    /// 4D vector held by a universal pin
    UniversalVector4f = UNIVERSAL_BIT + 13,
    /// 2D generator held by a universal pin
    UniversalGenerator2D = UNIVERSAL_BIT + 14,
    /// 3D generator held by a universal pin
    UniversalGenerator3D = UNIVERSAL_BIT + 15,
}

impl TypeId {
    /// The members of [`UniversalType`], narrowest first
    pub const UNIVERSAL_MEMBERS: [TypeId; 6] = [
        TypeId::Float,
        TypeId::Vector2f,
        TypeId::Vector3f,
        TypeId::Vector4f,
        TypeId::Generator2D,
        TypeId::Generator3D,
    ];

    /// Raw numeric value
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Parse a raw numeric value
    pub fn from_u8(value: u8) -> Option<Self> {
        let type_id = match value {
            0 => Self::Unknown,
            1 => Self::Int8,
            2 => Self::Uint8,
            3 => Self::Int16,
            4 => Self::Uint16,
            5 => Self::Int32,
            6 => Self::Uint32,
            7 => Self::Int64,
            8 => Self::Uint64,
            9 => Self::Float,
            10 => Self::Double,
            11 => Self::Vector2f,
            12 => Self::Vector3f,
            13 => Self::Vector4f,
            14 => Self::Generator2D,
            15 => Self::Generator3D,
            16 => Self::String,
            128 => Self::UniversalType,
            137 => Self::UniversalFloat,
            139 => Self::UniversalVector2f,
            140 => Self::UniversalVector3f,
            141 => Self::UniversalVector4f,
            142 => Self::UniversalGenerator2D,
            143 => Self::UniversalGenerator3D,
            _ => return None,
        };
        Some(type_id)
    }

    /// Whether the universal bit is set (including the bare `UniversalType` tag)
    pub const fn has_universal_bit(self) -> bool {
        (self as u8) & UNIVERSAL_BIT != 0
    }

    /// Whether this is a concrete kind tagged with the universal bit
    pub const fn is_concrete_universal(self) -> bool {
        self.has_universal_bit() && !matches!(self, Self::UniversalType)
    }

    /// Strip the universal bit
    pub fn to_base(self) -> Self {
        Self::from_u8(self.as_u8() & !UNIVERSAL_BIT).unwrap_or(Self::Unknown)
    }

    /// Set the universal bit. Kinds outside [`UniversalType`] map to `Unknown`.
    pub fn to_universal(self) -> Self {
        if self == Self::UniversalType {
            return self;
        }
        let base = self.to_base();
        if !base.is_universal_member() {
            return Self::Unknown;
        }
        Self::from_u8(base.as_u8() | UNIVERSAL_BIT).unwrap_or(Self::Unknown)
    }

    /// Whether the base kind is one of the [`UniversalType`] members
    pub fn is_universal_member(self) -> bool {
        Self::UNIVERSAL_MEMBERS.contains(&self.to_base())
    }

    /// Whether input and output pins may be declared with this kind
    pub fn is_valid_pin_type(self) -> bool {
        self == Self::UniversalType || (!self.has_universal_bit() && self.is_universal_member())
    }

    /// Whether the property editor can edit values of this kind
    pub fn is_ui_enabled(self) -> bool {
        matches!(
            self.to_base(),
            Self::Float | Self::Vector2f | Self::Vector3f | Self::Vector4f
        )
    }

    /// Number of float components for vector-like kinds
    pub fn components(self) -> Option<usize> {
        match self.to_base() {
            Self::Float => Some(1),
            Self::Vector2f => Some(2),
            Self::Vector3f => Some(3),
            Self::Vector4f => Some(4),
            _ => None,
        }
    }

    /// Human readable name
    pub fn name(self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::Int8 => "Int8",
            Self::Uint8 => "Uint8",
            Self::Int16 => "Int16",
            Self::Uint16 => "Uint16",
            Self::Int32 => "Int32",
            Self::Uint32 => "Uint32",
            Self::Int64 => "Int64",
            Self::Uint64 => "Uint64",
            Self::Float => "Float",
            Self::Double => "Double",
            Self::Vector2f => "Vector2f",
            Self::Vector3f => "Vector3f",
            Self::Vector4f => "Vector4f",
            Self::Generator2D => "Generator2D",
            Self::Generator3D => "Generator3D",
            Self::String => "String",
            Self::UniversalType => "UniversalType",
            Self::UniversalFloat => "UniversalFloat",
            Self::UniversalVector2f => "UniversalVector2f",
            Self::UniversalVector3f => "UniversalVector3f",
            Self::UniversalVector4f => "UniversalVector4f",
            Self::UniversalGenerator2D => "UniversalGenerator2D",
            Self::UniversalGenerator3D => "UniversalGenerator3D",
        }
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The wider of two kinds, compared with the universal bit stripped
pub fn max_type_id(a: TypeId, b: TypeId) -> TypeId {
    let (a, b) = (a.to_base(), b.to_base());
    if a.as_u8() >= b.as_u8() {
        a
    } else {
        b
    }
}

type Generator2dFn = dyn Fn(f64, f64) -> f64 + Send + Sync;
type Generator3dFn = dyn Fn(f64, f64, f64) -> f64 + Send + Sync;

/// Procedural 2D function, e.g. a texture
#[derive(Clone)]
pub struct Generator2d(Arc<Generator2dFn>);

impl Generator2d {
    /// Wrap a function
    pub fn new(func: impl Fn(f64, f64) -> f64 + Send + Sync + 'static) -> Self {
        Self(Arc::new(func))
    }

    /// Function returning `value` everywhere
    pub fn constant(value: f64) -> Self {
        Self::new(move |_, _| value)
    }

    /// Sample at `(x, y)`
    pub fn eval(&self, x: f64, y: f64) -> f64 {
        (self.0)(x, y)
    }
}

impl Default for Generator2d {
    fn default() -> Self {
        Self::constant(0.0)
    }
}

impl PartialEq for Generator2d {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Generator2d {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Generator2d(..)")
    }
}

/// Procedural 3D function, e.g. a solid texture
#[derive(Clone)]
pub struct Generator3d(Arc<Generator3dFn>);

impl Generator3d {
    /// Wrap a function
    pub fn new(func: impl Fn(f64, f64, f64) -> f64 + Send + Sync + 'static) -> Self {
        Self(Arc::new(func))
    }

    /// Function returning `value` everywhere
    pub fn constant(value: f64) -> Self {
        Self::new(move |_, _, _| value)
    }

    /// Sample at `(x, y, z)`
    pub fn eval(&self, x: f64, y: f64, z: f64) -> f64 {
        (self.0)(x, y, z)
    }
}

impl Default for Generator3d {
    fn default() -> Self {
        Self::constant(0.0)
    }
}

impl PartialEq for Generator3d {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Generator3d {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Generator3d(..)")
    }
}

/// Value of a pin declared as accepting any member of the closed set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UniversalType {
    /// Scalar
    Float(f32),
    /// 2D vector
    Vector2f(Vec2),
    /// 3D vector
    Vector3f(Vec3),
    /// 4D vector
    Vector4f(Vec4),
    /// 2D generator
    #[serde(skip)]
    Generator2D(Generator2d),
    /// 3D generator
    #[serde(skip)]
    Generator3D(Generator3d),
}

impl UniversalType {
    /// Concrete kind with the universal bit set
    pub fn type_id(&self) -> TypeId {
        match self {
            Self::Float(_) => TypeId::UniversalFloat,
            Self::Vector2f(_) => TypeId::UniversalVector2f,
            Self::Vector3f(_) => TypeId::UniversalVector3f,
            Self::Vector4f(_) => TypeId::UniversalVector4f,
            Self::Generator2D(_) => TypeId::UniversalGenerator2D,
            Self::Generator3D(_) => TypeId::UniversalGenerator3D,
        }
    }
}

impl Default for UniversalType {
    fn default() -> Self {
        Self::Float(0.0)
    }
}

impl From<f32> for UniversalType {
    fn from(value: f32) -> Self {
        Self::Float(value)
    }
}

impl From<Vec2> for UniversalType {
    fn from(value: Vec2) -> Self {
        Self::Vector2f(value)
    }
}

impl From<Vec3> for UniversalType {
    fn from(value: Vec3) -> Self {
        Self::Vector3f(value)
    }
}

impl From<Vec4> for UniversalType {
    fn from(value: Vec4) -> Self {
        Self::Vector4f(value)
    }
}

impl From<Generator2d> for UniversalType {
    fn from(value: Generator2d) -> Self {
        Self::Generator2D(value)
    }
}

impl From<Generator3d> for UniversalType {
    fn from(value: Generator3d) -> Self {
        Self::Generator3D(value)
    }
}
