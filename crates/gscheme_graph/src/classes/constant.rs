// SPDX-License-Identifier: MIT OR Apache-2.0
//! Constant nodes

use crate::class::ClassBuilder;
use crate::registry::{ClassRegistryBuilder, RegistryError};
use crate::value::GsType;
use glam::{Vec2, Vec3, Vec4};

/// Outputs its embedded value
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Constant<T> {
    /// Stored value
    pub value: T,
}

fn define_constant<T>(classes: &mut ClassRegistryBuilder, name: &str) -> Result<(), RegistryError>
where
    T: GsType + Copy + Default,
{
    classes.define_class(
        ClassBuilder::<Constant<T>>::new(name)
            .embedded("Value", |c: &Constant<T>| c.value, |c, v| c.value = v)
            .output("Result", |c: &Constant<T>| Ok(c.value)),
    )
}

pub(super) fn define_classes(classes: &mut ClassRegistryBuilder) -> Result<(), RegistryError> {
    define_constant::<f32>(classes, "Constant")?;
    define_constant::<Vec2>(classes, "Constant2")?;
    define_constant::<Vec3>(classes, "Constant3")?;
    define_constant::<Vec4>(classes, "Constant4")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Registration;
    use crate::types::TypeId;
    use crate::value::Value;

    #[test]
    fn test_constant_classes() {
        let mut registration = Registration::new();
        registration.add_define_classes_callback(define_classes);
        let registry = registration.run_define_callbacks().unwrap();
        assert_eq!(registry.len(), 4);

        let class = registry.class_by_name("Constant3").unwrap();
        assert_eq!(class.embedded_value_type(0), TypeId::Vector3f);
        assert_eq!(class.default_pin_type(1), TypeId::Vector3f);

        let mut instance = class.new_instance();
        class
            .set_value(0, &mut *instance, Value::Vector3f(Vec3::new(1.0, 2.0, 3.0)))
            .unwrap();
        assert_eq!(
            class.value(1, &*instance).unwrap(),
            Value::Vector3f(Vec3::new(1.0, 2.0, 3.0))
        );
    }
}
