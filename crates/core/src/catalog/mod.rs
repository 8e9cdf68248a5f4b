pub mod dwarf;
pub mod symbols;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use log::{debug, trace};

use crate::consts::PRIMITIVE_TYPES;
use crate::matchers::matchers_from_config;
use crate::models::{FieldLayout, LensConfig, TypeDescriptor, TypeRef};
use crate::traits::ProxyMatcher;

pub use dwarf::{load_catalog_from_file, DwarfTypeLoader};
pub use symbols::{decode_tag_symbol, TagSymbol};

#[derive(Debug, Clone, PartialEq)]
pub struct TagEntry {
    pub type_name: String,
    pub offset_to_top: i64,
}

/// Known types and the identity tags that name them at runtime.
///
/// Loaded once (from a snapshot, DWARF, or by hand) and then shared read-only
/// behind an `Arc` by every resolution in the session.
pub struct TypeCatalog {
    types: HashMap<String, TypeRef>,
    tags: HashMap<u64, TagEntry>,
    matchers: Vec<Box<dyn ProxyMatcher>>,
    tag_mask: u64,
    max_class_depth: usize,
}

impl Default for TypeCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeCatalog {
    pub fn new() -> Self {
        Self::with_config(&LensConfig::default())
    }

    pub fn with_config(config: &LensConfig) -> Self {
        let mut catalog = Self {
            types: HashMap::new(),
            tags: HashMap::new(),
            matchers: matchers_from_config(config),
            tag_mask: config.tag_mask,
            max_class_depth: config.max_class_depth,
        };

        for (name, size, encoding) in PRIMITIVE_TYPES {
            catalog.register_type(TypeDescriptor::scalar(name, *size, *encoding));
        }

        catalog
    }

    pub fn register_type(&mut self, descriptor: TypeDescriptor) -> TypeRef {
        trace!("Registering type {}", descriptor.description());
        let type_ref = Arc::new(descriptor);
        self.types.insert(type_ref.name.clone(), type_ref.clone());
        type_ref
    }

    pub fn register_tag(&mut self, tag: u64, type_name: &str, offset_to_top: i64) {
        let masked = self.mask_tag(tag);
        trace!("Registering tag 0x{:x} -> {}", masked, type_name);
        self.tags.insert(
            masked,
            TagEntry {
                type_name: type_name.to_string(),
                offset_to_top,
            },
        );
    }

    pub fn register_matcher(&mut self, matcher: Box<dyn ProxyMatcher>) {
        debug!("Registering proxy matcher: {}", matcher.name());
        self.matchers.push(matcher);
    }

    pub fn mask_tag(&self, tag: u64) -> u64 {
        tag & self.tag_mask
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn tag_count(&self) -> usize {
        self.tags.len()
    }

    pub fn types(&self) -> impl Iterator<Item = &TypeRef> {
        self.types.values()
    }

    /// Looks a type up by name. Pointer types (`Foo *`) are synthesized from their pointee.
    pub fn lookup_by_name(&self, name: &str) -> Option<TypeRef> {
        let name = name.trim();
        if let Some(found) = self.types.get(name) {
            return Some(found.clone());
        }

        let pointee = name.strip_suffix('*')?.trim_end();
        let pointee = self.lookup_by_name(pointee)?;
        Some(Arc::new(TypeDescriptor::pointer_to(&pointee.name)))
    }

    /// Type named by an identity tag exactly as the runtime reports it (proxies included)
    pub fn lookup_raw_by_identity_tag(&self, tag: u64) -> Option<TypeRef> {
        let entry = self.tags.get(&self.mask_tag(tag))?;
        self.lookup_by_name(&entry.type_name)
    }

    /// Type named by an identity tag, with proxy classes unmasked to the class they stand in for
    pub fn lookup_by_identity_tag(&self, tag: u64) -> Option<TypeRef> {
        self.lookup_raw_by_identity_tag(tag)
            .map(|raw| self.unmask(&raw))
    }

    pub fn offset_to_top(&self, tag: u64) -> i64 {
        self.tags
            .get(&self.mask_tag(tag))
            .map(|entry| entry.offset_to_top)
            .unwrap_or(0)
    }

    /// One unmasking step: the class a proxy stands in for.
    /// The proxy's declared superclass wins over the name the matcher derives.
    fn proxy_base(&self, ty: &TypeDescriptor) -> Option<TypeRef> {
        let derived_name = self
            .matchers
            .iter()
            .find_map(|m| m.base_name(&ty.name))?;

        if let Some(superclass) = self.superclass_of(ty) {
            return Some(superclass);
        }

        self.lookup_by_name(&derived_name)
    }

    pub fn unmask(&self, ty: &TypeRef) -> TypeRef {
        let mut current = ty.clone();
        for _ in 0..self.max_class_depth {
            match self.proxy_base(&current) {
                Some(base) => {
                    debug!("Unmasked proxy class {} -> {}", current.name, base.name);
                    current = base;
                }
                None => break,
            }
        }
        current
    }

    pub fn superclass_of(&self, ty: &TypeDescriptor) -> Option<TypeRef> {
        let superclass = ty.as_class()?.superclass.as_deref()?;
        self.lookup_by_name(superclass)
    }

    /// The class followed by its superclasses, most derived first
    pub fn class_chain(&self, ty: &TypeRef) -> Vec<TypeRef> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();
        let mut current = Some(ty.clone());

        while let Some(class) = current {
            if chain.len() >= self.max_class_depth || !seen.insert(class.name.clone()) {
                break;
            }
            current = self.superclass_of(&class);
            chain.push(class);
        }

        chain
    }

    pub fn is_same_or_derived(&self, ty: &TypeRef, base_name: &str) -> bool {
        self.class_chain(ty).iter().any(|class| class.name == base_name)
    }

    /// Offset of the identity tag, inherited from the nearest superclass that declares one
    pub fn identity_tag_offset(&self, ty: &TypeRef) -> Option<u64> {
        self.class_chain(ty)
            .iter()
            .find_map(|class| class.as_class().and_then(|layout| layout.identity_tag_offset))
    }

    /// Every field of the class including inherited ones, root class first
    pub fn all_fields(&self, ty: &TypeRef) -> Vec<FieldLayout> {
        self.class_chain(ty)
            .iter()
            .rev()
            .filter_map(|class| class.as_class())
            .flat_map(|layout| layout.fields.iter().cloned())
            .collect()
    }

    /// Finds a field by name; a field declared closer to `ty` shadows inherited ones
    pub fn find_field(&self, ty: &TypeRef, name: &str) -> Option<FieldLayout> {
        self.class_chain(ty)
            .iter()
            .filter_map(|class| class.as_class())
            .find_map(|layout| layout.fields.iter().find(|f| f.name == name).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matchers::PatternMatcher;
    use crate::models::ClassLayout;

    fn field(name: &str, offset: u64, type_name: &str) -> FieldLayout {
        FieldLayout {
            name: name.to_string(),
            offset,
            type_name: type_name.to_string(),
        }
    }

    fn class(name: &str, size: u64, superclass: Option<&str>, fields: Vec<FieldLayout>) -> TypeDescriptor {
        TypeDescriptor::class(
            name,
            size,
            ClassLayout {
                superclass: superclass.map(str::to_string),
                identity_tag_offset: if superclass.is_none() { Some(0) } else { None },
                fields,
                methods: vec![],
            },
        )
    }

    fn sample_catalog() -> TypeCatalog {
        let mut catalog = TypeCatalog::new();
        catalog.register_type(class("NSObject", 8, None, vec![field("isa", 0, "Class")]));
        catalog.register_type(class("SourceBase", 12, Some("NSObject"), vec![field("_value", 8, "int")]));
        catalog.register_type(class(
            "SourceDerived",
            16,
            Some("SourceBase"),
            vec![field("_derivedValue", 12, "int")],
        ));
        catalog.register_type(class("NSKVONotifying_SourceDerived", 16, Some("SourceDerived"), vec![]));
        catalog.register_tag(0x1100, "SourceBase", 0);
        catalog.register_tag(0x1300, "SourceDerived", 0);
        catalog.register_tag(0x1400, "NSKVONotifying_SourceDerived", 0);
        catalog
    }

    #[test]
    fn test_lookup_by_name_synthesizes_pointers() {
        let catalog = sample_catalog();
        let ptr = catalog.lookup_by_name("SourceBase *").unwrap();
        assert_eq!(ptr.pointee_name(), Some("SourceBase"));
        assert!(catalog.lookup_by_name("SourceBase**").unwrap().is_pointer());
        assert!(catalog.lookup_by_name("Missing *").is_none());
        assert!(catalog.lookup_by_name("int").is_some());
    }

    #[test]
    fn test_tag_lookup_unmasks_proxies() {
        let catalog = sample_catalog();
        assert_eq!(
            catalog.lookup_by_identity_tag(0x1400).unwrap().name,
            "SourceDerived"
        );
        assert_eq!(
            catalog.lookup_raw_by_identity_tag(0x1400).unwrap().name,
            "NSKVONotifying_SourceDerived"
        );
        assert_eq!(catalog.lookup_by_identity_tag(0x1300).unwrap().name, "SourceDerived");
        assert!(catalog.lookup_by_identity_tag(0x9999_0000).is_none());
    }

    #[test]
    fn test_tag_mask_applies_to_lookup() {
        let catalog = sample_catalog();
        // high bits carry refcount/flags in non-pointer isa
        let tagged = 0x0100_0000_0000_1300 | 0x1;
        assert_eq!(catalog.lookup_by_identity_tag(tagged).unwrap().name, "SourceDerived");
    }

    #[test]
    fn test_proxy_without_superclass_uses_matcher_name() {
        let mut catalog = sample_catalog();
        catalog.register_type(class("_Zombie_SourceBase", 12, None, vec![]));
        catalog.register_matcher(Box::new(PatternMatcher::new(r"^_Zombie_(?P<base>\w+)$").unwrap()));

        let zombie = catalog.lookup_by_name("_Zombie_SourceBase").unwrap();
        assert_eq!(catalog.unmask(&zombie).name, "SourceBase");
    }

    #[test]
    fn test_fields_include_inherited() {
        let catalog = sample_catalog();
        let kvo = catalog.lookup_by_name("NSKVONotifying_SourceDerived").unwrap();
        let names: Vec<String> = catalog.all_fields(&kvo).into_iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["isa", "_value", "_derivedValue"]);
        assert_eq!(catalog.identity_tag_offset(&kvo), Some(0));
        assert!(catalog.is_same_or_derived(&kvo, "SourceBase"));

        let base = catalog.lookup_by_name("SourceBase").unwrap();
        assert!(catalog.find_field(&base, "_derivedValue").is_none());
        assert!(!catalog.is_same_or_derived(&base, "SourceDerived"));
    }

    #[test]
    fn test_cyclic_superclasses_terminate() {
        let mut catalog = TypeCatalog::new();
        catalog.register_type(class("A", 8, Some("B"), vec![]));
        catalog.register_type(class("B", 8, Some("A"), vec![]));
        let a = catalog.lookup_by_name("A").unwrap();
        assert_eq!(catalog.class_chain(&a).len(), 2);
        assert_eq!(catalog.identity_tag_offset(&a), None);
    }
}
