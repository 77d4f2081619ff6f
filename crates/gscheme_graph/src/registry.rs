// SPDX-License-Identifier: MIT OR Apache-2.0
//! Class and type registries.
//!
//! Applications describe their classes through callbacks collected in a
//! [`Registration`]. Running the callbacks produces an immutable
//! [`ClassRegistry`] that graphs share through an `Arc`.

use crate::class::{ClassBuilder, ClassDescriptor, ComputeError};
use crate::types::TypeId;
use indexmap::IndexMap;
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::sync::Arc;

/// Callback that registers composite type layouts
pub type DefineTypesFn = fn(&mut TypeRegistry) -> Result<(), RegistryError>;

/// Callback that registers classes
pub type DefineClassesFn = fn(&mut ClassRegistryBuilder) -> Result<(), RegistryError>;

static GLOBAL_REGISTRY: OnceCell<Arc<ClassRegistry>> = OnceCell::new();

/// Field layouts of composite kinds, used by property editors
#[derive(Debug, Default)]
pub struct TypeRegistry {
    composites: HashMap<TypeId, Vec<String>>,
}

impl TypeRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the named fields of a composite kind
    pub fn define_composite(&mut self, type_id: TypeId, fields: &[&str]) -> Result<(), RegistryError> {
        let Some(expected) = type_id.components().filter(|&count| count >= 2) else {
            return Err(RegistryError::NotCompositeType(type_id));
        };
        if fields.len() != expected {
            return Err(RegistryError::FieldCountMismatch {
                type_id,
                expected,
                actual: fields.len(),
            });
        }
        let type_id = type_id.to_base();
        if self.composites.contains_key(&type_id) {
            return Err(RegistryError::DuplicateType(type_id));
        }
        self.composites
            .insert(type_id, fields.iter().map(|field| (*field).to_string()).collect());
        Ok(())
    }

    /// Field names of a composite kind, universal bit ignored
    pub fn fields(&self, type_id: TypeId) -> Option<&[String]> {
        self.composites.get(&type_id.to_base()).map(Vec::as_slice)
    }
}

/// Collects classes while the class callbacks run
#[derive(Debug, Default)]
pub struct ClassRegistryBuilder {
    classes: IndexMap<String, Arc<ClassDescriptor>>,
}

impl ClassRegistryBuilder {
    /// Build and register a class
    pub fn define_class<T: Send + 'static>(&mut self, builder: ClassBuilder<T>) -> Result<(), RegistryError> {
        self.add_class(builder.build()?)
    }

    /// Register an already built class
    pub fn add_class(&mut self, class: ClassDescriptor) -> Result<(), RegistryError> {
        if self.classes.contains_key(class.name()) {
            return Err(RegistryError::DuplicateClass(class.name().to_string()));
        }
        tracing::debug!(class = class.name(), pins = class.count_pins(), "Defined class");
        self.classes.insert(class.name().to_string(), Arc::new(class));
        Ok(())
    }

    /// Number of classes registered so far
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Whether no class is registered yet
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

/// Immutable set of classes, in registration order
#[derive(Debug)]
pub struct ClassRegistry {
    types: TypeRegistry,
    classes: IndexMap<String, Arc<ClassDescriptor>>,
}

impl ClassRegistry {
    /// Composite type layouts
    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    /// Class by registration index
    pub fn class(&self, index: usize) -> Result<&Arc<ClassDescriptor>, RegistryError> {
        self.classes
            .get_index(index)
            .map(|(_, class)| class)
            .ok_or(RegistryError::ClassIndexOutOfRange(index))
    }

    /// Class by unique name
    pub fn class_by_name(&self, name: &str) -> Result<&Arc<ClassDescriptor>, RegistryError> {
        self.classes
            .get(name)
            .ok_or_else(|| RegistryError::UnknownClass(name.to_string()))
    }

    /// Registration index of a class
    pub fn class_index(&self, name: &str) -> Result<usize, RegistryError> {
        self.classes
            .get_index_of(name)
            .ok_or_else(|| RegistryError::UnknownClass(name.to_string()))
    }

    /// All classes in registration order
    pub fn classes(&self) -> impl Iterator<Item = &Arc<ClassDescriptor>> {
        self.classes.values()
    }

    /// Number of classes
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Whether the registry has no classes
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

/// Registration callbacks, run once to build a [`ClassRegistry`]
#[derive(Debug, Default, Clone)]
pub struct Registration {
    define_types: Vec<DefineTypesFn>,
    define_classes: Vec<DefineClassesFn>,
}

impl Registration {
    /// Create an empty registration
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a type callback
    pub fn add_define_types_callback(&mut self, callback: DefineTypesFn) -> &mut Self {
        self.define_types.push(callback);
        self
    }

    /// Queue a class callback
    pub fn add_define_classes_callback(&mut self, callback: DefineClassesFn) -> &mut Self {
        self.define_classes.push(callback);
        self
    }

    /// Append the callbacks of another registration
    pub fn merge(&mut self, other: Registration) -> &mut Self {
        self.define_types.extend(other.define_types);
        self.define_classes.extend(other.define_classes);
        self
    }

    /// Run every type callback, then every class callback
    pub fn run_define_callbacks(self) -> Result<ClassRegistry, RegistryError> {
        let mut types = TypeRegistry::new();
        for callback in &self.define_types {
            callback(&mut types)?;
        }

        let mut builder = ClassRegistryBuilder::default();
        for callback in &self.define_classes {
            callback(&mut builder)?;
        }

        Ok(ClassRegistry {
            types,
            classes: builder.classes,
        })
    }
}

/// Build the process-wide registry. Fails if it was already built.
pub fn initialize(registration: Registration) -> Result<Arc<ClassRegistry>, RegistryError> {
    let mut initialized = false;
    let registry = GLOBAL_REGISTRY.get_or_try_init(|| {
        initialized = true;
        let registry = registration.run_define_callbacks()?;
        tracing::info!(classes = registry.len(), "Class registry initialized");
        Ok::<_, RegistryError>(Arc::new(registry))
    })?;
    if !initialized {
        return Err(RegistryError::AlreadyInitialized);
    }
    Ok(Arc::clone(registry))
}

/// The process-wide registry built by [`initialize`]
pub fn global() -> Result<Arc<ClassRegistry>, RegistryError> {
    GLOBAL_REGISTRY
        .get()
        .cloned()
        .ok_or(RegistryError::NotInitialized)
}

/// Error raised while registering or looking up classes
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Class declared without a name
    #[error("Class name is empty")]
    EmptyClassName,

    /// Two classes share a name
    #[error("Class already defined: {0}")]
    DuplicateClass(String),

    /// Pin declared without a name
    #[error("Class {class} has a pin with an empty name")]
    EmptyPinName {
        /// Class name
        class: String,
    },

    /// Two pins of a class share a name
    #[error("Class {class} defines pin {pin} twice")]
    DuplicatePin {
        /// Class name
        class: String,
        /// Pin name
        pin: String,
    },

    /// More pins than a pin id can address
    #[error("Class {class} has {count} pins, the limit is 255")]
    TooManyPins {
        /// Class name
        class: String,
        /// Declared pin count
        count: usize,
    },

    /// Input or output pin of a kind that cannot flow through links
    #[error("Class {class} pin {pin} has unsupported type {type_id}")]
    UnsupportedPinType {
        /// Class name
        class: String,
        /// Pin name
        pin: String,
        /// Declared kind
        type_id: TypeId,
    },

    /// Reading a default value from the prototype instance failed
    #[error("Class {class} pin {pin} has no default value")]
    DefaultValue {
        /// Class name
        class: String,
        /// Pin name
        pin: String,
        /// Underlying failure
        source: ComputeError,
    },

    /// Composite layout registered twice
    #[error("Type already defined: {0}")]
    DuplicateType(TypeId),

    /// Layout registered for a kind without named fields
    #[error("Type {0} is not a composite type")]
    NotCompositeType(TypeId),

    /// Field list that does not match the component count
    #[error("Type {type_id} has {expected} components, got {actual} field names")]
    FieldCountMismatch {
        /// Composite kind
        type_id: TypeId,
        /// Component count of the kind
        expected: usize,
        /// Number of names supplied
        actual: usize,
    },

    /// Class index past the end of the registry
    #[error("Class index out of range: {0}")]
    ClassIndexOutOfRange(usize),

    /// No class with this name
    #[error("Unknown class: {0}")]
    UnknownClass(String),

    /// [`initialize`] was called twice
    #[error("Class registry is already initialized")]
    AlreadyInitialized,

    /// [`global`] was called before [`initialize`]
    #[error("Class registry is not initialized")]
    NotInitialized,
}
