// SPDX-License-Identifier: MIT OR Apache-2.0
//! Values carried across pins.

use crate::types::{Generator2d, Generator3d, TypeId, UniversalType};
use glam::{Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};

/// Value of any pin kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// `i8`
    Int8(i8),
    /// `u8`
    Uint8(u8),
    /// `i16`
    Int16(i16),
    /// `u16`
    Uint16(u16),
    /// `i32`
    Int32(i32),
    /// `u32`
    Uint32(u32),
    /// `i64`
    Int64(i64),
    /// `u64`
    Uint64(u64),
    /// `f32`
    Float(f32),
    /// `f64`
    Double(f64),
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
    /// String
    String(String),
    /// Member of the universal set, held by a universal pin
    Universal(UniversalType),
}

impl Value {
    /// Kind of this value. Universal values report the concrete member with the universal bit.
    pub fn type_id(&self) -> TypeId {
        match self {
            Self::Int8(_) => TypeId::Int8,
            Self::Uint8(_) => TypeId::Uint8,
            Self::Int16(_) => TypeId::Int16,
            Self::Uint16(_) => TypeId::Uint16,
            Self::Int32(_) => TypeId::Int32,
            Self::Uint32(_) => TypeId::Uint32,
            Self::Int64(_) => TypeId::Int64,
            Self::Uint64(_) => TypeId::Uint64,
            Self::Float(_) => TypeId::Float,
            Self::Double(_) => TypeId::Double,
            Self::Vector2f(_) => TypeId::Vector2f,
            Self::Vector3f(_) => TypeId::Vector3f,
            Self::Vector4f(_) => TypeId::Vector4f,
            Self::Generator2D(_) => TypeId::Generator2D,
            Self::Generator3D(_) => TypeId::Generator3D,
            Self::String(_) => TypeId::String,
            Self::Universal(value) => value.type_id(),
        }
    }

    /// Zero value of a kind. `None` for `Unknown`.
    pub fn default_for(type_id: TypeId) -> Option<Self> {
        if type_id == TypeId::UniversalType {
            return Some(Self::Universal(UniversalType::default()));
        }
        if type_id.is_concrete_universal() {
            return Self::default_for(type_id.to_base())?.wrap_universal();
        }
        let value = match type_id {
            TypeId::Int8 => Self::Int8(0),
            TypeId::Uint8 => Self::Uint8(0),
            TypeId::Int16 => Self::Int16(0),
            TypeId::Uint16 => Self::Uint16(0),
            TypeId::Int32 => Self::Int32(0),
            TypeId::Uint32 => Self::Uint32(0),
            TypeId::Int64 => Self::Int64(0),
            TypeId::Uint64 => Self::Uint64(0),
            TypeId::Float => Self::Float(0.0),
            TypeId::Double => Self::Double(0.0),
            TypeId::Vector2f => Self::Vector2f(Vec2::ZERO),
            TypeId::Vector3f => Self::Vector3f(Vec3::ZERO),
            TypeId::Vector4f => Self::Vector4f(Vec4::ZERO),
            TypeId::Generator2D => Self::Generator2D(Generator2d::default()),
            TypeId::Generator3D => Self::Generator3D(Generator3d::default()),
            TypeId::String => Self::String(String::new()),
            _ => return None,
        };
        Some(value)
    }

    /// Wrap a member kind into [`Value::Universal`]. Other kinds give `None`.
    pub fn wrap_universal(self) -> Option<Self> {
        let universal = match self {
            Self::Float(v) => UniversalType::Float(v),
            Self::Vector2f(v) => UniversalType::Vector2f(v),
            Self::Vector3f(v) => UniversalType::Vector3f(v),
            Self::Vector4f(v) => UniversalType::Vector4f(v),
            Self::Generator2D(v) => UniversalType::Generator2D(v),
            Self::Generator3D(v) => UniversalType::Generator3D(v),
            Self::Universal(v) => v,
            _ => return None,
        };
        Some(Self::Universal(universal))
    }

    /// The concrete member held by a universal value; other values are returned as is.
    pub fn unwrap_universal(self) -> Self {
        match self {
            Self::Universal(UniversalType::Float(v)) => Self::Float(v),
            Self::Universal(UniversalType::Vector2f(v)) => Self::Vector2f(v),
            Self::Universal(UniversalType::Vector3f(v)) => Self::Vector3f(v),
            Self::Universal(UniversalType::Vector4f(v)) => Self::Vector4f(v),
            Self::Universal(UniversalType::Generator2D(v)) => Self::Generator2D(v),
            Self::Universal(UniversalType::Generator3D(v)) => Self::Generator3D(v),
            other => other,
        }
    }

    /// Whether the value can be written to a RON document
    pub fn is_serializable(&self) -> bool {
        !matches!(
            self,
            Self::Generator2D(_)
                | Self::Generator3D(_)
                | Self::Universal(UniversalType::Generator2D(_) | UniversalType::Generator3D(_))
        )
    }

    /// Extract a native value
    pub fn get<T: GsType>(&self) -> Option<T> {
        T::from_value(self)
    }
}

/// Native Rust types that can be stored in pins
pub trait GsType: Sized + Clone + Send + 'static {
    /// Kind identifier of this type
    const TYPE_ID: TypeId;

    /// Wrap into a [`Value`]
    fn into_value(self) -> Value;

    /// Extract from a [`Value`] of the same kind
    fn from_value(value: &Value) -> Option<Self>;
}

/// Kind identifier of a native type
pub const fn type_id<T: GsType>() -> TypeId {
    T::TYPE_ID
}

macro_rules! impl_scalar_gs_type {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl GsType for $ty {
                const TYPE_ID: TypeId = TypeId::$variant;

                fn into_value(self) -> Value {
                    Value::$variant(self)
                }

                fn from_value(value: &Value) -> Option<Self> {
                    match value {
                        Value::$variant(v) => Some(v.clone()),
                        _ => None,
                    }
                }
            }
        )*
    };
}

macro_rules! impl_member_gs_type {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl GsType for $ty {
                const TYPE_ID: TypeId = TypeId::$variant;

                fn into_value(self) -> Value {
                    Value::$variant(self)
                }

                fn from_value(value: &Value) -> Option<Self> {
                    match value {
                        Value::$variant(v) | Value::Universal(UniversalType::$variant(v)) => {
                            Some(v.clone())
                        }
                        _ => None,
                    }
                }
            }
        )*
    };
}

impl_scalar_gs_type! {
    i8 => Int8,
    u8 => Uint8,
    i16 => Int16,
    u16 => Uint16,
    i32 => Int32,
    u32 => Uint32,
    i64 => Int64,
    u64 => Uint64,
    f64 => Double,
    String => String,
}

impl_member_gs_type! {
    f32 => Float,
    Vec2 => Vector2f,
    Vec3 => Vector3f,
    Vec4 => Vector4f,
    Generator2d => Generator2D,
    Generator3d => Generator3D,
}

impl GsType for UniversalType {
    const TYPE_ID: TypeId = TypeId::UniversalType;

    fn into_value(self) -> Value {
        Value::Universal(self)
    }

    fn from_value(value: &Value) -> Option<Self> {
        match value.clone().wrap_universal()? {
            Value::Universal(v) => Some(v),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_ids() {
        assert_eq!(type_id::<f32>(), TypeId::Float);
        assert_eq!(type_id::<Vec3>(), TypeId::Vector3f);
        assert_eq!(type_id::<Generator2d>(), TypeId::Generator2D);
        assert_eq!(type_id::<UniversalType>(), TypeId::UniversalType);
        assert_eq!(type_id::<String>(), TypeId::String);
        assert_eq!(type_id::<u64>(), TypeId::Uint64);
    }

    #[test]
    fn test_universal_value_type_id() {
        let value = Value::Universal(UniversalType::Vector4f(Vec4::ONE));
        assert_eq!(value.type_id(), TypeId::UniversalVector4f);
        assert_eq!(value.clone().unwrap_universal().type_id(), TypeId::Vector4f);
        assert_eq!(value.get::<Vec4>(), Some(Vec4::ONE));
        assert_eq!(value.get::<Vec3>(), None);
    }

    #[test]
    fn test_default_for() {
        assert_eq!(Value::default_for(TypeId::Float), Some(Value::Float(0.0)));
        assert_eq!(
            Value::default_for(TypeId::UniversalVector2f),
            Some(Value::Universal(UniversalType::Vector2f(Vec2::ZERO)))
        );
        assert_eq!(
            Value::default_for(TypeId::UniversalType).map(|v| v.type_id()),
            Some(TypeId::UniversalFloat)
        );
        assert_eq!(Value::default_for(TypeId::Unknown), None);
    }

    #[test]
    fn test_wrap_rejects_non_members() {
        assert_eq!(Value::Int32(4).wrap_universal(), None);
        assert_eq!(
            Value::Float(2.0).wrap_universal(),
            Some(Value::Universal(UniversalType::Float(2.0)))
        );
        assert_eq!(UniversalType::from_value(&Value::Float(2.0)), Some(UniversalType::Float(2.0)));
    }

    #[test]
    fn test_generators_are_not_serializable() {
        assert!(Value::Vector2f(Vec2::X).is_serializable());
        assert!(!Value::Generator3D(Generator3d::default()).is_serializable());
        assert!(!Value::Universal(UniversalType::Generator2D(Generator2d::default())).is_serializable());
    }
}
