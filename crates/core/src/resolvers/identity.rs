use std::fmt;
use std::sync::Arc;

use log::{debug, trace};
use serde::Serialize;

use crate::catalog::TypeCatalog;
use crate::error::{LensError, MemoryFault};
use crate::memory::ProcessHandle;
use crate::models::{LensConfig, ResolutionPolicy, TypeRef};

/// Why a value keeps its static type
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum UnresolvedReason {
    PolicyDisabled,
    /// The static type carries no identity tag (scalars, tagless structs)
    NoIdentityTag,
    NullPointer,
    NullTag,
    UnknownTag(u64),
    /// The tag names a class that is not the static type or one of its subclasses
    UnrelatedType(String),
}

impl fmt::Display for UnresolvedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnresolvedReason::PolicyDisabled => write!(f, "dynamic values disabled"),
            UnresolvedReason::NoIdentityTag => write!(f, "type has no identity tag"),
            UnresolvedReason::NullPointer => write!(f, "null pointer"),
            UnresolvedReason::NullTag => write!(f, "identity tag is zero"),
            UnresolvedReason::UnknownTag(tag) => write!(f, "unknown identity tag 0x{:x}", tag),
            UnresolvedReason::UnrelatedType(name) => write!(f, "tag names unrelated type {}", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeIdentity {
    pub tag_value: u64,
    /// Class shown to users: proxies unmasked
    pub display_type: TypeRef,
    /// Class the runtime actually allocated; its layout backs child access
    pub layout_type: TypeRef,
    /// Start of the full object, after applying the tag's offset-to-top
    pub object_address: u64,
    pub via_runtime_call: bool,
}

impl RuntimeIdentity {
    pub fn resolved_type_name(&self) -> &str {
        &self.display_type.name
    }

    pub fn is_proxy(&self) -> bool {
        self.display_type.name != self.layout_type.name
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Resolved(RuntimeIdentity),
    Unresolved(UnresolvedReason),
}

impl Resolution {
    pub fn identity(&self) -> Option<&RuntimeIdentity> {
        match self {
            Resolution::Resolved(identity) => Some(identity),
            Resolution::Unresolved(_) => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Resolution::Resolved(_))
    }
}

/// Maps the identity tag stored in an object to its most-derived class
pub struct RuntimeIdentityResolver {
    catalog: Arc<TypeCatalog>,
    process: Arc<ProcessHandle>,
    config: LensConfig,
}

impl RuntimeIdentityResolver {
    pub fn new(catalog: Arc<TypeCatalog>, process: Arc<ProcessHandle>, config: LensConfig) -> Self {
        Self {
            catalog,
            process,
            config,
        }
    }

    /// Resolves the object at `address`, statically known as class `static_type`.
    ///
    /// An unknown tag is not an error: the caller keeps the static type. Memory
    /// and runtime-call failures are returned for the caller to fall back on.
    pub fn resolve(
        &self,
        address: u64,
        static_type: &TypeRef,
        policy: ResolutionPolicy,
    ) -> Result<Resolution, LensError> {
        let policy = self.config.effective_policy(policy);
        if !policy.is_dynamic() {
            return Ok(Resolution::Unresolved(UnresolvedReason::PolicyDisabled));
        }

        if static_type.as_class().is_none() {
            return Ok(Resolution::Unresolved(UnresolvedReason::NoIdentityTag));
        }
        let Some(tag_offset) = self.catalog.identity_tag_offset(static_type) else {
            trace!("{} has no identity tag", static_type.name);
            return Ok(Resolution::Unresolved(UnresolvedReason::NoIdentityTag));
        };
        if address == 0 {
            return Ok(Resolution::Unresolved(UnresolvedReason::NullPointer));
        }

        let tag_address = address.checked_add(tag_offset).ok_or(LensError::MemoryReadError {
            address,
            length: 8,
            fault: MemoryFault::Unmapped,
        })?;
        let raw_tag = self.process.read_u64(tag_address)?;
        let tag = self.catalog.mask_tag(raw_tag);
        debug!("Object at 0x{:x} has identity tag 0x{:x}", address, tag);

        if tag == 0 {
            return Ok(Resolution::Unresolved(UnresolvedReason::NullTag));
        }

        let (tag, layout_type, via_runtime_call) = match self.catalog.lookup_raw_by_identity_tag(tag) {
            Some(found) => (tag, found, false),
            None if policy.may_run_target() => {
                let answered = self.catalog.mask_tag(self.process.call_class_of(address)?);
                match self.catalog.lookup_raw_by_identity_tag(answered) {
                    Some(found) => {
                        debug!("Runtime reports class {} for 0x{:x}", found.name, address);
                        (answered, found, true)
                    }
                    None => return Ok(Resolution::Unresolved(UnresolvedReason::UnknownTag(answered))),
                }
            }
            None => {
                debug!("Tag 0x{:x} not in catalog and runtime calls not allowed", tag);
                return Ok(Resolution::Unresolved(UnresolvedReason::UnknownTag(tag)));
            }
        };

        let display_type = self.catalog.unmask(&layout_type);
        if !self.catalog.is_same_or_derived(&layout_type, &static_type.name)
            && !self.catalog.is_same_or_derived(&display_type, &static_type.name)
        {
            debug!(
                "Tag 0x{:x} names {}, which does not derive from {}",
                tag, layout_type.name, static_type.name
            );
            return Ok(Resolution::Unresolved(UnresolvedReason::UnrelatedType(
                layout_type.name.clone(),
            )));
        }

        let object_address = address.wrapping_add_signed(self.catalog.offset_to_top(tag));

        Ok(Resolution::Resolved(RuntimeIdentity {
            tag_value: tag,
            display_type,
            layout_type,
            object_address,
            via_runtime_call,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::load_session;
    use crate::models::SnapshotFile;

    const FIXTURE: &str = include_str!("../../tests/fixtures/kvo_observer.json");

    fn resolver(config: LensConfig) -> (RuntimeIdentityResolver, Arc<TypeCatalog>) {
        let snapshot = SnapshotFile::from_json(FIXTURE).unwrap();
        let session = load_session(snapshot, config.clone()).unwrap();
        let catalog = session.catalog().clone();
        (
            RuntimeIdentityResolver::new(catalog.clone(), session.process().clone(), config),
            catalog,
        )
    }

    #[test]
    fn test_proxy_is_unmasked() {
        let (resolver, catalog) = resolver(LensConfig::default());
        let base = catalog.lookup_by_name("SourceBase").unwrap();

        let resolution = resolver
            .resolve(0x3000, &base, ResolutionPolicy::DynamicAllowRunTarget)
            .unwrap();
        let identity = resolution.identity().unwrap();
        assert_eq!(identity.resolved_type_name(), "SourceDerived");
        assert_eq!(identity.layout_type.name, "NSKVONotifying_SourceDerived");
        assert!(identity.is_proxy());
        assert!(!identity.via_runtime_call);
        assert_eq!(identity.object_address, 0x3000);
    }

    #[test]
    fn test_policy_disabled() {
        let (resolver, catalog) = resolver(LensConfig::default());
        let base = catalog.lookup_by_name("SourceBase").unwrap();
        assert_eq!(
            resolver.resolve(0x3000, &base, ResolutionPolicy::NoDynamic).unwrap(),
            Resolution::Unresolved(UnresolvedReason::PolicyDisabled)
        );
    }

    #[test]
    fn test_unknown_tag_needs_runtime_call() {
        let (resolver, catalog) = resolver(LensConfig::default());
        let base = catalog.lookup_by_name("SourceBase").unwrap();

        assert_eq!(
            resolver.resolve(0x3200, &base, ResolutionPolicy::DynamicNoRunTarget).unwrap(),
            Resolution::Unresolved(UnresolvedReason::UnknownTag(0x1500))
        );

        let resolution = resolver
            .resolve(0x3200, &base, ResolutionPolicy::DynamicAllowRunTarget)
            .unwrap();
        let identity = resolution.identity().unwrap();
        assert_eq!(identity.resolved_type_name(), "SourceDerived");
        assert!(identity.via_runtime_call);
    }

    #[test]
    fn test_runtime_calls_switched_off() {
        let config = LensConfig {
            allow_runtime_calls: false,
            ..LensConfig::default()
        };
        let (resolver, catalog) = resolver(config);
        let base = catalog.lookup_by_name("SourceBase").unwrap();
        assert!(!resolver
            .resolve(0x3200, &base, ResolutionPolicy::DynamicAllowRunTarget)
            .unwrap()
            .is_resolved());
    }

    #[test]
    fn test_unrelated_and_tagless() {
        let (resolver, catalog) = resolver(LensConfig::default());
        let source = catalog.lookup_by_name("Source").unwrap();
        // 0x2000 is an Observer
        assert_eq!(
            resolver.resolve(0x2000, &source, ResolutionPolicy::DynamicNoRunTarget).unwrap(),
            Resolution::Unresolved(UnresolvedReason::UnrelatedType("Observer".to_string()))
        );

        let int = catalog.lookup_by_name("int").unwrap();
        assert_eq!(
            resolver.resolve(0x3008, &int, ResolutionPolicy::DynamicNoRunTarget).unwrap(),
            Resolution::Unresolved(UnresolvedReason::NoIdentityTag)
        );
    }

    #[test]
    fn test_unmapped_object() {
        let (resolver, catalog) = resolver(LensConfig::default());
        let base = catalog.lookup_by_name("SourceBase").unwrap();
        assert!(matches!(
            resolver.resolve(0x9000, &base, ResolutionPolicy::DynamicNoRunTarget),
            Err(LensError::MemoryReadError { address: 0x9000, .. })
        ));
        assert_eq!(
            resolver.resolve(0, &base, ResolutionPolicy::DynamicNoRunTarget).unwrap(),
            Resolution::Unresolved(UnresolvedReason::NullPointer)
        );
    }

    const SECONDARY_BASE: &str = r#"{
      "types": [
        { "name": "Mixin", "size": 16, "kind": { "class": {
            "identity_tag_offset": 0,
            "fields": [ { "name": "_vptr.Mixin", "offset": 0, "type_name": "long" },
                        { "name": "m", "offset": 8, "type_name": "int" } ] } } },
        { "name": "Both", "size": 32, "kind": { "class": {
            "superclass": "Mixin",
            "fields": [ { "name": "c", "offset": 24, "type_name": "int" } ] } } }
      ],
      "tags": [
        { "tag": "0x6010", "type_name": "Both" },
        { "tag": "0x6040", "type_name": "Both", "offset_to_top": -16 }
      ],
      "process": {
        "regions": [
          { "address": "0x5000", "bytes": "1060000000000000 0000000000000000 4060000000000000 2a00000000000000" },
          { "address": "0x7000", "bytes": "1050000000000000" }
        ]
      },
      "frames": [
        { "function": "main", "variables": [
            { "name": "mixin", "type_name": "Mixin *", "address": "0x7000" } ] }
      ]
    }"#;

    #[test]
    fn test_secondary_tag_adjusts_to_full_object() {
        let snapshot = SnapshotFile::from_json(SECONDARY_BASE).unwrap();
        let session = load_session(snapshot, LensConfig::default()).unwrap();
        let catalog = session.catalog().clone();
        let resolver = RuntimeIdentityResolver::new(
            catalog.clone(),
            session.process().clone(),
            LensConfig::default(),
        );
        let mixin = catalog.lookup_by_name("Mixin").unwrap();

        let resolution = resolver
            .resolve(0x5010, &mixin, ResolutionPolicy::DynamicNoRunTarget)
            .unwrap();
        let identity = resolution.identity().unwrap();
        assert_eq!(identity.resolved_type_name(), "Both");
        assert_eq!(identity.tag_value, 0x6040);
        assert_eq!(identity.object_address, 0x5000);

        let primary = resolver
            .resolve(0x5000, &mixin, ResolutionPolicy::DynamicNoRunTarget)
            .unwrap();
        assert_eq!(primary.identity().unwrap().object_address, 0x5000);

        // children are laid out from the start of the full object
        let value = session
            .frame(0)
            .unwrap()
            .evaluate("mixin->c", ResolutionPolicy::DynamicNoRunTarget)
            .unwrap();
        assert_eq!(value.as_i64().unwrap(), 42);
        assert_eq!(value.address(), 0x5018);
    }
}
