use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::builtins;
use crate::collections;
use crate::types::{ClassDef, TypeHandle, TypeInfo};
use crate::value::{ObjectRef, Value};

/// Builds the member table of a generic instantiation from its type arguments.
pub type GenericFactory = Rc<dyn Fn(&[TypeHandle]) -> ClassDef>;

#[derive(Clone)]
pub struct GenericDef {
    pub name: String,
    pub namespace: Option<String>,
    pub arity: usize,
    factory: GenericFactory,
}

impl GenericDef {
    pub fn new(
        name: impl Into<String>,
        arity: usize,
        factory: impl Fn(&[TypeHandle]) -> ClassDef + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            arity,
            factory: Rc::new(factory),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    fn full_name(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{ns}.{}", self.name),
            None => self.name.clone(),
        }
    }

    pub fn instantiate(&self, args: Vec<TypeHandle>) -> Option<TypeHandle> {
        if args.len() != self.arity {
            return None;
        }
        let class = Rc::new((self.factory)(&args));
        Some(TypeInfo::generic(
            &self.name,
            self.namespace.as_deref(),
            args,
            class,
        ))
    }
}

/// Host type catalog: registered classes, generic definitions and the
/// built-in member tables. One per interpreter instance.
pub struct TypeCatalog {
    classes: Vec<TypeHandle>,
    by_full_name: HashMap<String, TypeHandle>,
    by_rust_type: HashMap<TypeId, TypeHandle>,
    builtin_generics: Vec<GenericDef>,
    generics: Vec<GenericDef>,
    string_type: TypeHandle,
    string_class: Rc<ClassDef>,
    array_class: Rc<ClassDef>,
}

impl Default for TypeCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeCatalog {
    pub fn new() -> Self {
        Self {
            classes: Vec::new(),
            by_full_name: HashMap::new(),
            by_rust_type: HashMap::new(),
            builtin_generics: collections::builtin_generics(),
            generics: Vec::new(),
            string_type: crate::types::PrimitiveKind::String.handle(),
            string_class: Rc::new(builtins::string_class()),
            array_class: Rc::new(collections::array_class()),
        }
    }

    pub fn register_class(&mut self, def: ClassDef) -> TypeHandle {
        let rust_type = def.rust_type;
        let handle = TypeInfo::class(Rc::new(def));
        if let Some(id) = rust_type {
            self.by_rust_type.insert(id, handle.clone());
        }
        self.by_full_name
            .insert(handle.full_name().to_string(), handle.clone());
        self.classes.retain(|existing| !existing.same_as(&handle));
        self.classes.push(handle.clone());
        handle
    }

    pub fn register_generic(&mut self, def: GenericDef) {
        self.generics
            .retain(|existing| !(existing.full_name() == def.full_name() && existing.arity == def.arity));
        self.generics.push(def);
    }

    /// Exact namespace-qualified lookup.
    pub fn by_full_name(&self, name: &str) -> Option<TypeHandle> {
        self.by_full_name.get(name).cloned()
    }

    /// Scan by simple or qualified name, first registration wins.
    pub fn scan(&self, name: &str) -> Option<TypeHandle> {
        self.classes
            .iter()
            .find(|ty| ty.name() == name || ty.full_name() == name)
            .cloned()
    }

    pub fn builtin_generic(&self, name: &str, arity: usize) -> Option<&GenericDef> {
        self.builtin_generics
            .iter()
            .find(|def| def.arity == arity && (def.name == name || def.full_name() == name))
    }

    pub fn generic(&self, name: &str, arity: usize) -> Option<&GenericDef> {
        self.generics
            .iter()
            .find(|def| def.arity == arity && (def.name == name || def.full_name() == name))
    }

    pub fn array_of(&self, element: TypeHandle) -> TypeHandle {
        TypeInfo::array(element, self.array_class.clone())
    }

    pub fn string_type(&self) -> &TypeHandle {
        &self.string_type
    }

    pub(crate) fn string_class(&self) -> &Rc<ClassDef> {
        &self.string_class
    }

    pub fn type_of<T: Any>(&self) -> Option<TypeHandle> {
        self.by_rust_type.get(&TypeId::of::<T>()).cloned()
    }

    /// Wraps a host instance as an object value using its registered type.
    pub fn object_value<T: Any>(&self, instance: Rc<T>) -> Option<Value> {
        let ty = self.type_of::<T>()?;
        Some(Value::Object(ObjectRef::new(ty, instance)))
    }

    pub fn type_names(&self) -> Vec<String> {
        self.classes
            .iter()
            .map(|ty| ty.full_name().to_string())
            .collect()
    }
}

impl fmt::Debug for TypeCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeCatalog")
            .field("classes", &self.type_names())
            .field("generics", &self.generics.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ClassBuilder;

    struct Marker;

    #[test]
    fn registered_classes_are_found_by_both_names() {
        let mut catalog = TypeCatalog::new();
        catalog.register_class(ClassBuilder::<Marker>::new("Marker").namespace("Game").build());
        assert!(catalog.by_full_name("Game.Marker").is_some());
        assert!(catalog.by_full_name("Marker").is_none());
        assert!(catalog.scan("Marker").is_some());
        assert!(catalog.type_of::<Marker>().is_some());
    }

    #[test]
    fn builtin_generics_match_by_arity() {
        let catalog = TypeCatalog::new();
        assert!(catalog.builtin_generic("List", 1).is_some());
        assert!(catalog.builtin_generic("List", 2).is_none());
        assert!(catalog.builtin_generic("Dictionary", 2).is_some());
        assert!(catalog.builtin_generic("HashSet", 1).is_some());
    }
}
