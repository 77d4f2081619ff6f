// SPDX-License-Identifier: MIT OR Apache-2.0
//! Class descriptors: reflected native types that back graph nodes.
//!
//! A class is built from a native Rust type with [`ClassBuilder`], which
//! records typed accessors for every pin. Pins are stored partitioned as
//! `[embedded][input][output]` whatever order they were declared in.

use crate::convert::{ConversionTable, ConvertError, ConvertFn};
use crate::id::{PinKind, MAX_PINS_COUNT};
use crate::registry::RegistryError;
use crate::types::TypeId;
use crate::value::{GsType, Value};
use std::any::Any;
use std::collections::HashSet;
use std::fmt;
use std::marker::PhantomData;
use std::ops::Range;

/// Native instance owned by a node
pub type Instance = Box<dyn Any + Send>;

type Getter = Box<dyn Fn(&(dyn Any + Send)) -> Result<Value, ComputeError> + Send + Sync>;
type Setter = Box<dyn Fn(&mut (dyn Any + Send), Value) -> Result<(), ComputeError> + Send + Sync>;
type Factory = Box<dyn Fn() -> Instance + Send + Sync>;

/// Reflected pin of a class
pub struct PinDescriptor {
    name: String,
    display_name: String,
    kind: PinKind,
    decl_type: TypeId,
    default_type: TypeId,
    value_type: TypeId,
    get: Getter,
    set: Option<Setter>,
}

impl PinDescriptor {
    /// Unique name within the class
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name shown in the editor
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Pin kind
    pub fn kind(&self) -> PinKind {
        self.kind
    }

    /// Declared type: `UniversalType` for universal pins, `Unknown` for embedded pins
    pub fn decl_type(&self) -> TypeId {
        self.decl_type
    }

    /// Type a fresh node starts with
    pub fn default_type(&self) -> TypeId {
        self.default_type
    }

    /// Native type of the field behind the pin
    pub fn value_type(&self) -> TypeId {
        self.value_type
    }
}

impl fmt::Debug for PinDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PinDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("decl_type", &self.decl_type)
            .field("default_type", &self.default_type)
            .finish_non_exhaustive()
    }
}

/// Immutable description of a node class
pub struct ClassDescriptor {
    name: String,
    display_name: String,
    pins: Vec<PinDescriptor>,
    defaults: Vec<Value>,
    count_embedded: usize,
    count_inputs: usize,
    count_outputs: usize,
    factory: Factory,
}

impl ClassDescriptor {
    /// Unique class name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name shown in the editor
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// All pins, partitioned `[embedded][input][output]`
    pub fn pins(&self) -> &[PinDescriptor] {
        &self.pins
    }

    /// Pin by index
    pub fn pin(&self, index: usize) -> Option<&PinDescriptor> {
        self.pins.get(index)
    }

    /// Index of a pin by name
    pub fn pin_index(&self, name: &str) -> Option<usize> {
        self.pins.iter().position(|pin| pin.name == name)
    }

    /// Number of embedded pins
    pub fn count_embedded_pins(&self) -> usize {
        self.count_embedded
    }

    /// Number of input pins
    pub fn count_input_pins(&self) -> usize {
        self.count_inputs
    }

    /// Number of output pins
    pub fn count_output_pins(&self) -> usize {
        self.count_outputs
    }

    /// Total number of pins
    pub fn count_pins(&self) -> usize {
        self.pins.len()
    }

    /// Indices of embedded pins
    pub fn embedded_range(&self) -> Range<usize> {
        0..self.count_embedded
    }

    /// Indices of input pins
    pub fn input_range(&self) -> Range<usize> {
        self.count_embedded..self.count_embedded + self.count_inputs
    }

    /// Indices of output pins
    pub fn output_range(&self) -> Range<usize> {
        let start = self.count_embedded + self.count_inputs;
        start..start + self.count_outputs
    }

    /// Default type of a pin, `Unknown` for embedded pins
    pub fn default_pin_type(&self, index: usize) -> TypeId {
        self.pins
            .get(index)
            .map_or(TypeId::Unknown, |pin| pin.default_type)
    }

    /// Declared type of a pin, `Unknown` for embedded pins
    pub fn decl_pin_type(&self, index: usize) -> TypeId {
        self.pins
            .get(index)
            .map_or(TypeId::Unknown, |pin| pin.decl_type)
    }

    /// Native type of an embedded pin
    pub fn embedded_value_type(&self, index: usize) -> TypeId {
        match self.pins.get(index) {
            Some(pin) if pin.kind == PinKind::Embedded => pin.value_type,
            _ => TypeId::Unknown,
        }
    }

    /// Whether values of `type_id` can feed the pin
    pub fn can_convert_to_default_type(&self, index: usize, type_id: TypeId) -> bool {
        match self.pins.get(index) {
            Some(pin) if pin.kind != PinKind::Embedded => {
                ConversionTable::global().can_convert(type_id, pin.decl_type)
            }
            _ => false,
        }
    }

    /// Conversion from `type_id` into the pin's declared type
    pub fn convert_func_to_default_type(&self, index: usize, type_id: TypeId) -> Option<ConvertFn> {
        match self.pins.get(index) {
            Some(pin) if pin.kind != PinKind::Embedded => ConversionTable::global()
                .convert_func(type_id, pin.decl_type)
                .ok(),
            _ => None,
        }
    }

    /// Create a fresh native instance
    pub fn new_instance(&self) -> Instance {
        (self.factory)()
    }

    /// Read a pin value from an instance; outputs run the class computation
    pub fn value(&self, index: usize, instance: &(dyn Any + Send)) -> Result<Value, ComputeError> {
        let pin = self.pins.get(index).ok_or(ComputeError::PinOutOfRange(index))?;
        (pin.get)(instance)
    }

    /// Write an embedded or input pin value into an instance
    pub fn set_value(
        &self,
        index: usize,
        instance: &mut (dyn Any + Send),
        value: Value,
    ) -> Result<(), ComputeError> {
        let pin = self.pins.get(index).ok_or(ComputeError::PinOutOfRange(index))?;
        let set = pin
            .set
            .as_ref()
            .ok_or_else(|| ComputeError::ReadOnly(pin.name.clone()))?;
        set(instance, value)
    }

    /// Value captured from the prototype instance for an embedded or input pin
    pub fn default_value(&self, index: usize) -> Option<&Value> {
        self.defaults.get(index)
    }

    /// Restore the captured default of an embedded or input pin
    pub fn reset_to_default(&self, index: usize, instance: &mut (dyn Any + Send)) -> Result<(), ComputeError> {
        let value = self
            .defaults
            .get(index)
            .cloned()
            .ok_or(ComputeError::PinOutOfRange(index))?;
        self.set_value(index, instance, value)
    }
}

impl fmt::Debug for ClassDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassDescriptor")
            .field("name", &self.name)
            .field("display_name", &self.display_name)
            .field("pins", &self.pins)
            .finish_non_exhaustive()
    }
}

/// Typed builder that reflects a native type into a [`ClassDescriptor`]
pub struct ClassBuilder<T> {
    name: String,
    display_name: Option<String>,
    pins: Vec<PinDescriptor>,
    factory: Factory,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Default + Send + 'static> ClassBuilder<T> {
    /// Start a class whose instances are created with `T::default()`
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: None,
            pins: Vec::new(),
            factory: Box::new(|| Box::new(T::default())),
            _marker: PhantomData,
        }
    }
}

impl<T: Send + 'static> ClassBuilder<T> {
    /// Create instances with a custom factory
    pub fn with_factory(mut self, factory: impl Fn() -> T + Send + Sync + 'static) -> Self {
        self.factory = Box::new(move || Box::new(factory()));
        self
    }

    /// Set the name shown in the editor
    pub fn display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    /// Set the editor name of an already declared pin
    pub fn pin_display_name(mut self, pin: &str, display_name: impl Into<String>) -> Self {
        if let Some(descriptor) = self.pins.iter_mut().find(|p| p.name == pin) {
            descriptor.display_name = display_name.into();
        }
        self
    }

    /// Declare an embedded pin (configuration value, never linked)
    pub fn embedded<V: GsType>(
        mut self,
        name: impl Into<String>,
        get: impl Fn(&T) -> V + Send + Sync + 'static,
        set: impl Fn(&mut T, V) + Send + Sync + 'static,
    ) -> Self {
        let name = name.into();
        let getter = Self::getter(move |instance: &T| Ok(get(instance)));
        let setter = Self::setter(set);
        self.pins.push(PinDescriptor {
            display_name: name.clone(),
            name,
            kind: PinKind::Embedded,
            decl_type: TypeId::Unknown,
            default_type: TypeId::Unknown,
            value_type: V::TYPE_ID,
            get: getter,
            set: Some(setter),
        });
        self
    }

    /// Declare an input pin
    pub fn input<V: GsType>(
        mut self,
        name: impl Into<String>,
        get: impl Fn(&T) -> V + Send + Sync + 'static,
        set: impl Fn(&mut T, V) + Send + Sync + 'static,
    ) -> Self {
        let name = name.into();
        let getter = Self::getter(move |instance: &T| Ok(get(instance)));
        let setter = Self::setter(set);
        self.pins.push(PinDescriptor {
            display_name: name.clone(),
            name,
            kind: PinKind::Input,
            decl_type: V::TYPE_ID,
            default_type: V::TYPE_ID,
            value_type: V::TYPE_ID,
            get: getter,
            set: Some(setter),
        });
        self
    }

    /// Declare an output pin computed from the instance
    pub fn output<V: GsType>(
        mut self,
        name: impl Into<String>,
        compute: impl Fn(&T) -> Result<V, ComputeError> + Send + Sync + 'static,
    ) -> Self {
        let name = name.into();
        let getter = Self::getter(compute);
        self.pins.push(PinDescriptor {
            display_name: name.clone(),
            name,
            kind: PinKind::Output,
            decl_type: V::TYPE_ID,
            default_type: V::TYPE_ID,
            value_type: V::TYPE_ID,
            get: getter,
            set: None,
        });
        self
    }

    fn getter<V: GsType>(get: impl Fn(&T) -> Result<V, ComputeError> + Send + Sync + 'static) -> Getter {
        Box::new(move |instance| {
            let instance = instance
                .downcast_ref::<T>()
                .ok_or_else(|| ComputeError::InstanceMismatch(std::any::type_name::<T>().to_string()))?;
            get(instance).map(GsType::into_value)
        })
    }

    fn setter<V: GsType>(set: impl Fn(&mut T, V) + Send + Sync + 'static) -> Setter {
        Box::new(move |instance, value| {
            let instance = instance
                .downcast_mut::<T>()
                .ok_or_else(|| ComputeError::InstanceMismatch(std::any::type_name::<T>().to_string()))?;
            let value = V::from_value(&value).ok_or(ComputeError::WrongValue {
                expected: V::TYPE_ID,
                actual: value.type_id(),
            })?;
            set(instance, value);
            Ok(())
        })
    }

    /// Validate the declaration and capture defaults from a prototype instance
    pub fn build(self) -> Result<ClassDescriptor, RegistryError> {
        let class = self.name;
        if class.is_empty() {
            return Err(RegistryError::EmptyClassName);
        }
        if self.pins.len() > MAX_PINS_COUNT {
            return Err(RegistryError::TooManyPins {
                class,
                count: self.pins.len(),
            });
        }

        let mut seen = HashSet::new();
        for pin in &self.pins {
            if pin.name.is_empty() {
                return Err(RegistryError::EmptyPinName { class });
            }
            if !seen.insert(pin.name.as_str()) {
                return Err(RegistryError::DuplicatePin {
                    class,
                    pin: pin.name.clone(),
                });
            }
            if pin.kind != PinKind::Embedded && !pin.value_type.is_valid_pin_type() {
                return Err(RegistryError::UnsupportedPinType {
                    class,
                    pin: pin.name.clone(),
                    type_id: pin.value_type,
                });
            }
        }

        let mut pins = self.pins;
        pins.sort_by_key(|pin| match pin.kind {
            PinKind::Embedded => 0,
            PinKind::Input => 1,
            PinKind::Output => 2,
        });
        let count_embedded = pins.iter().filter(|p| p.kind == PinKind::Embedded).count();
        let count_inputs = pins.iter().filter(|p| p.kind == PinKind::Input).count();
        let count_outputs = pins.len() - count_embedded - count_inputs;

        let prototype = (self.factory)();
        let mut defaults = Vec::with_capacity(count_embedded + count_inputs);
        for pin in &mut pins {
            let value = match (pin.get)(&*prototype) {
                Ok(value) => value,
                Err(source) if pin.kind != PinKind::Output => {
                    return Err(RegistryError::DefaultValue {
                        class,
                        pin: pin.name.clone(),
                        source,
                    });
                }
                Err(_) => continue,
            };
            if pin.decl_type == TypeId::UniversalType && value.type_id().is_concrete_universal() {
                pin.default_type = value.type_id();
            }
            if pin.kind != PinKind::Output {
                defaults.push(value);
            }
        }

        let display_name = self.display_name.unwrap_or_else(|| class.clone());
        Ok(ClassDescriptor {
            name: class,
            display_name,
            pins,
            defaults,
            count_embedded,
            count_inputs,
            count_outputs,
            factory: self.factory,
        })
    }
}

/// Error raised while reading, writing or computing a pin value
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ComputeError {
    /// Computation failed
    #[error("{0}")]
    Message(String),

    /// The value has the wrong kind for the pin
    #[error("Expected a {expected} value, got {actual}")]
    WrongValue {
        /// Kind the pin holds
        expected: TypeId,
        /// Kind that was supplied
        actual: TypeId,
    },

    /// The instance is not of the class's native type
    #[error("Instance is not a {0}")]
    InstanceMismatch(String),

    /// Output pins cannot be written
    #[error("Pin {0} is read-only")]
    ReadOnly(String),

    /// No pin at this index
    #[error("Pin index out of range: {0}")]
    PinOutOfRange(usize),

    /// A conversion inside the computation failed
    #[error(transparent)]
    Convert(#[from] ConvertError),
}

impl ComputeError {
    /// Computation failure with a message
    pub fn new(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UniversalType;
    use glam::Vec3;

    #[derive(Default)]
    struct Mixer {
        gain: f32,
        a: UniversalType,
        b: Vec3,
    }

    fn mixer_class() -> ClassDescriptor {
        ClassBuilder::<Mixer>::new("Mixer")
            .with_factory(|| Mixer {
                gain: 2.0,
                a: UniversalType::Vector3f(Vec3::ONE),
                b: Vec3::ZERO,
            })
            .output("Scaled", |m: &Mixer| Ok(m.b * m.gain))
            .input("A", |m: &Mixer| m.a.clone(), |m, v| m.a = v)
            .embedded("Gain", |m: &Mixer| m.gain, |m, v| m.gain = v)
            .input("B", |m: &Mixer| m.b, |m, v| m.b = v)
            .output("Level", |m: &Mixer| {
                if m.gain < 0.0 {
                    Err(ComputeError::new("negative gain"))
                } else {
                    Ok(m.gain)
                }
            })
            .pin_display_name("Gain", "Gain (dB)")
            .build()
            .unwrap()
    }

    #[test]
    fn test_pins_are_partitioned() {
        let class = mixer_class();
        let names: Vec<_> = class.pins().iter().map(PinDescriptor::name).collect();
        assert_eq!(names, ["Gain", "A", "B", "Scaled", "Level"]);
        assert_eq!(class.embedded_range(), 0..1);
        assert_eq!(class.input_range(), 1..3);
        assert_eq!(class.output_range(), 3..5);
        assert_eq!(class.pin(0).unwrap().display_name(), "Gain (dB)");
        assert_eq!(class.display_name(), "Mixer");
    }

    #[test]
    fn test_pin_types() {
        let class = mixer_class();
        assert_eq!(class.decl_pin_type(0), TypeId::Unknown);
        assert_eq!(class.embedded_value_type(0), TypeId::Float);
        assert_eq!(class.decl_pin_type(1), TypeId::UniversalType);
        assert_eq!(class.default_pin_type(1), TypeId::UniversalVector3f);
        assert_eq!(class.default_pin_type(2), TypeId::Vector3f);
        assert_eq!(class.default_pin_type(4), TypeId::Float);

        assert!(class.can_convert_to_default_type(2, TypeId::Float));
        assert!(!class.can_convert_to_default_type(2, TypeId::Vector2f));
        assert!(class.can_convert_to_default_type(1, TypeId::Generator2D));
        assert!(!class.can_convert_to_default_type(0, TypeId::Float));
        assert!(class.convert_func_to_default_type(2, TypeId::Generator3D).is_none());
    }

    #[test]
    fn test_defaults_and_values() {
        let class = mixer_class();
        let mut instance = class.new_instance();
        assert_eq!(class.default_value(0), Some(&Value::Float(2.0)));

        class
            .set_value(2, &mut *instance, Value::Vector3f(Vec3::new(1.0, 2.0, 3.0)))
            .unwrap();
        assert_eq!(
            class.value(3, &*instance).unwrap(),
            Value::Vector3f(Vec3::new(2.0, 4.0, 6.0))
        );

        class.set_value(0, &mut *instance, Value::Float(-1.0)).unwrap();
        assert_eq!(
            class.value(4, &*instance),
            Err(ComputeError::new("negative gain"))
        );

        class.reset_to_default(0, &mut *instance).unwrap();
        assert_eq!(class.value(4, &*instance).unwrap(), Value::Float(2.0));
    }

    #[test]
    fn test_value_errors() {
        let class = mixer_class();
        let mut instance = class.new_instance();
        assert_eq!(
            class.set_value(2, &mut *instance, Value::Float(1.0)),
            Err(ComputeError::WrongValue {
                expected: TypeId::Vector3f,
                actual: TypeId::Float,
            })
        );
        assert!(matches!(
            class.set_value(3, &mut *instance, Value::Vector3f(Vec3::ONE)),
            Err(ComputeError::ReadOnly(_))
        ));
        let foreign: Instance = Box::new(0_u32);
        assert!(matches!(
            class.value(0, &*foreign),
            Err(ComputeError::InstanceMismatch(_))
        ));
    }

    #[test]
    fn test_build_errors() {
        let err = ClassBuilder::<Mixer>::new("").build().unwrap_err();
        assert!(matches!(err, RegistryError::EmptyClassName));

        let err = ClassBuilder::<Mixer>::new("Dup")
            .embedded("X", |m: &Mixer| m.gain, |m, v| m.gain = v)
            .input("X", |m: &Mixer| m.b, |m, v| m.b = v)
            .build()
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicatePin { .. }));

        let err = ClassBuilder::<Mixer>::new("Text")
            .output("Label", |_: &Mixer| Ok(String::from("mixer")))
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::UnsupportedPinType {
                type_id: TypeId::String,
                ..
            }
        ));

        let mut builder = ClassBuilder::<Mixer>::new("Wide");
        for i in 0..=MAX_PINS_COUNT {
            builder = builder.embedded(format!("P{i}"), |m: &Mixer| m.gain, |m, v| m.gain = v);
        }
        assert!(matches!(
            builder.build().unwrap_err(),
            RegistryError::TooManyPins { count: 256, .. }
        ));
    }
}
