use std::collections::{HashMap, HashSet};

use crate::{
    metadata::descriptor::{CustomAttribute, MethodDescriptor, ModuleDescriptor, TypeDescriptor},
    Error, Result,
};

/// The types of a module that could be loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeListing {
    /// Types that loaded successfully
    pub types: Vec<TypeDescriptor>,
    /// Number of types that failed to load
    pub failed: usize,
}

impl TypeListing {
    /// Total number of types in the module, loaded or not
    #[must_use]
    pub fn total(&self) -> usize {
        self.types.len() + self.failed
    }

    /// True if some types could not be loaded
    #[must_use]
    pub fn is_partial(&self) -> bool {
        self.failed > 0
    }
}

/// The reflection facility of the host runtime.
///
/// Returning an error from any method only skips the affected module, type or method.
pub trait ModuleSource: Send + Sync {
    /// Snapshot of the currently loaded modules, in load order
    fn modules(&self) -> Vec<ModuleDescriptor>;

    /// Enumerate the types of `module`.
    ///
    /// # Errors
    /// Returns an error if the module's types cannot be enumerated at all.
    fn types(&self, module: &ModuleDescriptor) -> Result<TypeListing>;

    /// Enumerate the methods declared by `ty`, of any visibility.
    ///
    /// # Errors
    /// Returns an error if the type's methods cannot be accessed.
    fn methods(&self, ty: &TypeDescriptor) -> Result<Vec<MethodDescriptor>>;

    /// Custom attributes applied to `method`.
    ///
    /// # Errors
    /// Returns an error if the attributes cannot be read.
    fn attributes(&self, method: &MethodDescriptor) -> Result<Vec<CustomAttribute>>;
}

#[derive(Debug, Clone, Default)]
struct ModuleEntry {
    types: Vec<TypeDescriptor>,
    failed: usize,
    unreadable: Option<String>,
}

/// A [`ModuleSource`] over fixed descriptors.
///
/// Serves hosts that enumerate reflection data up front, and tests.
///
/// # Examples
///
/// ```rust
/// use ownerscope::{
///     discovery::{InMemorySource, ModuleSource},
///     metadata::descriptor::{CustomAttribute, MethodDescriptor, TypeDescriptor},
/// };
///
/// let source = InMemorySource::new().with_method(
///     TypeDescriptor::new("Assembly-CSharp", "", "Foo"),
///     MethodDescriptor::new("Assembly-CSharp", "Foo", "DoThingServerRpc"),
///     [CustomAttribute::new("ServerRpcAttribute")],
/// );
///
/// let modules = source.modules();
/// assert_eq!(modules.len(), 1);
/// assert_eq!(source.types(&modules[0])?.types.len(), 1);
/// # Ok::<(), ownerscope::Error>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    order: Vec<ModuleDescriptor>,
    modules: HashMap<String, ModuleEntry>,
    methods: HashMap<String, Vec<MethodDescriptor>>,
    attributes: HashMap<String, Vec<CustomAttribute>>,
    broken_types: HashSet<String>,
}

impl InMemorySource {
    /// Creates an empty source
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a module without types
    #[must_use]
    pub fn with_module(mut self, module: ModuleDescriptor) -> Self {
        self.entry(&module.name);
        if !self.order.iter().any(|known| known.name == module.name) {
            self.order.push(module);
        }
        self
    }

    /// Adds a type, creating its module on first use
    #[must_use]
    pub fn with_type(mut self, ty: TypeDescriptor) -> Self {
        self = self.with_module(ModuleDescriptor::new(ty.module.clone()));
        let entry = self.entry(&ty.module);
        if !entry.types.contains(&ty) {
            entry.types.push(ty);
        }
        self
    }

    /// Adds a method with its custom attributes, creating its type on first use
    #[must_use]
    pub fn with_method<I>(mut self, ty: TypeDescriptor, method: MethodDescriptor, attributes: I) -> Self
    where
        I: IntoIterator<Item = CustomAttribute>,
    {
        let key = type_key(&ty);
        self = self.with_type(ty);
        self.attributes
            .insert(method.signature(), attributes.into_iter().collect());
        self.methods.entry(key).or_default().push(method);
        self
    }

    /// Marks `failed` types of `module` as unloadable
    #[must_use]
    pub fn with_failed_types(mut self, module: &str, failed: usize) -> Self {
        self = self.with_module(ModuleDescriptor::new(module));
        self.entry(module).failed = failed;
        self
    }

    /// Makes type enumeration of `module` fail with `reason`
    #[must_use]
    pub fn with_unreadable_module(mut self, module: &str, reason: impl Into<String>) -> Self {
        self = self.with_module(ModuleDescriptor::new(module));
        self.entry(module).unreadable = Some(reason.into());
        self
    }

    /// Makes method enumeration of `ty` fail
    #[must_use]
    pub fn with_broken_type(mut self, ty: TypeDescriptor) -> Self {
        self.broken_types.insert(type_key(&ty));
        self.with_type(ty)
    }

    fn entry(&mut self, module: &str) -> &mut ModuleEntry {
        self.modules.entry(module.to_string()).or_default()
    }
}

fn type_key(ty: &TypeDescriptor) -> String {
    format!("{}!{}", ty.module, ty.full_name())
}

impl ModuleSource for InMemorySource {
    fn modules(&self) -> Vec<ModuleDescriptor> {
        self.order.clone()
    }

    fn types(&self, module: &ModuleDescriptor) -> Result<TypeListing> {
        let Some(entry) = self.modules.get(&module.name) else {
            return Err(Error::Error(format!("Unknown module {}", module.name)));
        };

        if let Some(reason) = &entry.unreadable {
            return Err(Error::Error(reason.clone()));
        }

        Ok(TypeListing {
            types: entry.types.clone(),
            failed: entry.failed,
        })
    }

    fn methods(&self, ty: &TypeDescriptor) -> Result<Vec<MethodDescriptor>> {
        let key = type_key(ty);
        if self.broken_types.contains(&key) {
            return Err(Error::Error(format!(
                "Could not load methods of {}",
                ty.full_name()
            )));
        }

        Ok(self.methods.get(&key).cloned().unwrap_or_default())
    }

    fn attributes(&self, method: &MethodDescriptor) -> Result<Vec<CustomAttribute>> {
        Ok(self
            .attributes
            .get(&method.signature())
            .cloned()
            .unwrap_or_default())
    }
}
