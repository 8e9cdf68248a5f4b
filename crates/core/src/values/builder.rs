use std::collections::HashMap;
use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;

use crate::catalog::TypeCatalog;
use crate::models::{ResolutionPolicy, TypeDescriptor, TypeRef};
use crate::resolvers::{Resolution, UnresolvedReason};

use super::{Contents, DynamicValue, StaticValue};

/// Everything read and resolved for one static value before building
pub struct ResolvedTarget {
    pub contents: Contents,
    /// Address and declared class of the object the value is or points to
    pub object: Option<(u64, TypeRef)>,
    pub resolution: Resolution,
    pub error: Option<String>,
}

impl ResolvedTarget {
    pub fn new() -> Self {
        Self {
            contents: Contents::Unavailable,
            object: None,
            resolution: Resolution::Unresolved(UnresolvedReason::NoIdentityTag),
            error: None,
        }
    }
}

impl Default for ResolvedTarget {
    fn default() -> Self {
        Self::new()
    }
}

pub struct DynamicValueBuilder {
    catalog: Arc<TypeCatalog>,
}

impl DynamicValueBuilder {
    pub fn new(catalog: Arc<TypeCatalog>) -> Self {
        Self { catalog }
    }

    /// Combines a static value with what its resolution produced. Children are
    /// laid out by the allocated class; nothing below this value is resolved yet.
    pub fn build(
        &self,
        source: &Arc<StaticValue>,
        target: ResolvedTarget,
        policy: ResolutionPolicy,
    ) -> Arc<DynamicValue> {
        let static_type = source.declared_type().clone();
        let is_pointer = static_type.is_pointer();

        let (display_type, raw_type, object_type, object_address) =
            match (target.resolution.identity(), target.object) {
                (Some(identity), _) => {
                    let (display, raw) = if is_pointer {
                        (
                            Arc::new(TypeDescriptor::pointer_to(&identity.display_type.name)),
                            Arc::new(TypeDescriptor::pointer_to(&identity.layout_type.name)),
                        )
                    } else {
                        (identity.display_type.clone(), identity.layout_type.clone())
                    };
                    (
                        display,
                        raw,
                        Some(identity.layout_type.clone()),
                        Some(identity.object_address),
                    )
                }
                (None, Some((address, declared_class))) => (
                    static_type.clone(),
                    static_type.clone(),
                    Some(declared_class),
                    Some(address),
                ),
                (None, None) => (static_type.clone(), static_type.clone(), None, None),
            };

        if let Some(object) = &object_type {
            debug!(
                "Built {} as {} ({} fields via {})",
                source.name(),
                display_type.name,
                self.catalog.all_fields(object).len(),
                object.name
            );
        }

        Arc::new(DynamicValue {
            session: source.session().clone(),
            name: source.name().to_string(),
            address: source.address(),
            kind: source.kind(),
            scope: source.scope(),
            policy,
            static_type,
            display_type,
            raw_type,
            object_type,
            object_address,
            contents: target.contents,
            resolution: target.resolution,
            resolution_error: target.error,
            source: Arc::downgrade(source),
            children: Mutex::new(HashMap::new()),
        })
    }
}
