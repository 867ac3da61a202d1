//! Textual type names to type handles, cached per interpreter.

use std::cell::RefCell;
use std::collections::HashMap;

use tracing::debug;

use crate::catalog::TypeCatalog;
use crate::scan;
use crate::types::{PrimitiveKind, TypeHandle};

/// Most generic or array brackets one type name may nest.
const MAX_TYPE_NESTING: usize = 32;

/// Resolves names such as `int`, `Game.Actor`, `Actor[]` or
/// `Dictionary<string, List<int>>`.
///
/// The cache is keyed by the exact text looked up and only remembers
/// successes, so a type registered after a failed lookup still resolves.
#[derive(Debug, Default)]
pub struct TypeResolver {
    cache: RefCell<HashMap<String, TypeHandle>>,
}

impl TypeResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn resolve(&self, name: &str, catalog: &TypeCatalog) -> Option<TypeHandle> {
        if let Some(hit) = self.cache.borrow().get(name) {
            return Some(hit.clone());
        }
        if name.bytes().filter(|b| matches!(b, b'<' | b'[')).count() > MAX_TYPE_NESTING {
            debug!(len = name.len(), "type name nests too deeply");
            return None;
        }
        let resolved = self.resolve_uncached(name.trim(), catalog)?;
        debug!(name, full_name = resolved.full_name(), "type resolved");
        self.cache
            .borrow_mut()
            .insert(name.to_string(), resolved.clone());
        Some(resolved)
    }

    pub fn cached_len(&self) -> usize {
        self.cache.borrow().len()
    }

    fn resolve_uncached(&self, name: &str, catalog: &TypeCatalog) -> Option<TypeHandle> {
        if let Some(element) = name.strip_suffix("[]") {
            let element = self.resolve(element, catalog)?;
            return Some(catalog.array_of(element));
        }
        if name.ends_with('>') {
            return self.resolve_generic(name, catalog);
        }
        primitive(name)
            .map(PrimitiveKind::handle)
            .or_else(|| catalog.by_full_name(name))
            .or_else(|| catalog.scan(name))
    }

    fn resolve_generic(&self, name: &str, catalog: &TypeCatalog) -> Option<TypeHandle> {
        let open = name.find('<')?;
        if scan::generic_close(name, open)? != name.len() - 1 {
            return None;
        }
        let base = name[..open].trim();
        let args = scan::split_top_level(&name[open + 1..name.len() - 1], b',')
            .ok()?
            .into_iter()
            .map(|arg| self.resolve(arg.trim(), catalog))
            .collect::<Option<Vec<_>>>()?;
        let def = catalog
            .builtin_generic(base, args.len())
            .or_else(|| catalog.generic(base, args.len()))?;
        def.instantiate(args)
    }
}

fn primitive(name: &str) -> Option<PrimitiveKind> {
    PrimitiveKind::from_keyword(name).or_else(|| {
        let system = name.strip_prefix("System.")?;
        PrimitiveKind::ALL
            .into_iter()
            .find(|kind| kind.system_name() == system)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::GenericDef;
    use crate::types::ClassBuilder;

    struct Actor;
    struct Pair;

    #[test]
    fn primitives_resolve_by_keyword_and_system_name() {
        let catalog = TypeCatalog::new();
        let resolver = TypeResolver::new();
        let int = resolver.resolve("int", &catalog).unwrap();
        let system = resolver.resolve("System.Int32", &catalog).unwrap();
        assert!(int.same_as(&system));
        assert_eq!(resolver.resolve("string", &catalog).unwrap().full_name(), "System.String");
    }

    #[test]
    fn nested_generics_resolve() {
        let catalog = TypeCatalog::new();
        let resolver = TypeResolver::new();
        let ty = resolver
            .resolve("Dictionary<string, List<int>>", &catalog)
            .unwrap();
        assert_eq!(
            ty.full_name(),
            "System.Collections.Generic.Dictionary<System.String,System.Collections.Generic.List<System.Int32>>"
        );
        assert_eq!(ty.type_args().len(), 2);
        assert!(resolver.resolve("List<int, int>", &catalog).is_none());
        assert!(resolver.resolve("List<Missing>", &catalog).is_none());
    }

    #[test]
    fn failures_are_not_cached() {
        let mut catalog = TypeCatalog::new();
        let resolver = TypeResolver::new();
        assert!(resolver.resolve("Actor", &catalog).is_none());
        assert_eq!(resolver.cached_len(), 0);
        catalog.register_class(ClassBuilder::<Actor>::new("Actor").namespace("Game").build());
        assert!(resolver.resolve("Actor", &catalog).is_some());
        assert!(resolver.resolve("Game.Actor", &catalog).is_some());
        assert_eq!(resolver.cached_len(), 2);
    }

    #[test]
    fn cache_is_keyed_by_literal_text() {
        let catalog = TypeCatalog::new();
        let resolver = TypeResolver::new();
        let first = resolver.resolve("List<int>", &catalog).unwrap();
        let again = resolver.resolve("List<int>", &catalog).unwrap();
        assert!(std::rc::Rc::ptr_eq(&first, &again));
        let spaced = resolver.resolve("List< int >", &catalog).unwrap();
        assert!(!std::rc::Rc::ptr_eq(&first, &spaced));
        assert!(first.same_as(&spaced));
    }

    #[test]
    fn deeply_nested_names_do_not_resolve() {
        let catalog = TypeCatalog::new();
        let resolver = TypeResolver::new();
        let deep = format!("{}int{}", "List<".repeat(10_000), ">".repeat(10_000));
        assert!(resolver.resolve(&deep, &catalog).is_none());
        let jagged = format!("int{}", "[]".repeat(10_000));
        assert!(resolver.resolve(&jagged, &catalog).is_none());
        assert!(resolver.resolve("List<List<List<int>>>", &catalog).is_some());
        assert!(resolver.resolve("int[][]", &catalog).is_some());
    }

    #[test]
    fn host_generics_and_arrays() {
        let mut catalog = TypeCatalog::new();
        catalog.register_generic(
            GenericDef::new("Pair", 2, |_args| ClassBuilder::<Pair>::new("Pair").build())
                .with_namespace("Game"),
        );
        let resolver = TypeResolver::new();
        let pair = resolver.resolve("Game.Pair<int, bool>", &catalog).unwrap();
        assert_eq!(pair.name(), "Pair<int, bool>");
        let array = resolver.resolve("int[]", &catalog).unwrap();
        assert_eq!(array.full_name(), "System.Int32[]");
        assert_eq!(array.element_type().unwrap().name(), "int");
    }
}
