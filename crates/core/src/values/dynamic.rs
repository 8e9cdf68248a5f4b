use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};

use log::trace;
use parking_lot::Mutex;

use crate::error::LensError;
use crate::models::{ResolutionPolicy, TypeRef, VariableKind};
use crate::resolvers::{Resolution, RuntimeIdentity};
use crate::session::Session;

use super::{Contents, ScopeRef, StaticValue, Value};

/// A value re-interpreted with its runtime type.
///
/// Immutable once built apart from the child cache. It keeps no strong
/// reference to the static value it came from.
pub struct DynamicValue {
    pub(super) session: Arc<Session>,
    pub(super) name: String,
    pub(super) address: u64,
    pub(super) kind: VariableKind,
    pub(super) scope: ScopeRef,
    pub(super) policy: ResolutionPolicy,
    pub(super) static_type: TypeRef,
    pub(super) display_type: TypeRef,
    pub(super) raw_type: TypeRef,
    pub(super) object_type: Option<TypeRef>,
    pub(super) object_address: Option<u64>,
    pub(super) contents: Contents,
    pub(super) resolution: Resolution,
    pub(super) resolution_error: Option<String>,
    pub(super) source: Weak<StaticValue>,
    pub(super) children: Mutex<HashMap<(String, ResolutionPolicy), Value>>,
}

impl DynamicValue {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Same as the static value's address; promotion never moves a value
    pub fn address(&self) -> u64 {
        self.address
    }

    pub fn kind(&self) -> VariableKind {
        self.kind
    }

    pub fn scope(&self) -> ScopeRef {
        self.scope
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn policy(&self) -> ResolutionPolicy {
        self.policy
    }

    pub fn static_type(&self) -> &TypeRef {
        &self.static_type
    }

    pub fn display_type(&self) -> &TypeRef {
        &self.display_type
    }

    pub fn raw_type(&self) -> &TypeRef {
        &self.raw_type
    }

    /// Class whose layout backs child access (the allocated class, proxies included)
    pub fn object_type(&self) -> Option<&TypeRef> {
        self.object_type.as_ref()
    }

    pub fn object_address(&self) -> Option<u64> {
        self.object_address
    }

    pub fn contents(&self) -> &Contents {
        &self.contents
    }

    pub fn resolution(&self) -> &Resolution {
        &self.resolution
    }

    pub fn identity(&self) -> Option<&RuntimeIdentity> {
        self.resolution.identity()
    }

    /// Memory or runtime-call failure that forced the static type
    pub fn resolution_error(&self) -> Option<&str> {
        self.resolution_error.as_deref()
    }

    /// Whether the static value this was promoted from still exists
    pub fn source_alive(&self) -> bool {
        self.source.strong_count() > 0
    }

    pub fn cached_child_count(&self) -> usize {
        self.children.lock().len()
    }

    pub fn child_names(&self) -> Vec<String> {
        if matches!(self.contents, Contents::Pointer(0)) {
            return Vec::new();
        }
        match &self.object_type {
            Some(object) => self
                .session
                .catalog()
                .all_fields(object)
                .into_iter()
                .map(|field| field.name)
                .collect(),
            None => Vec::new(),
        }
    }

    /// A fresh static value over the same storage, independent of the original
    pub fn static_counterpart(&self) -> Arc<StaticValue> {
        StaticValue::new(
            self.session.clone(),
            &self.name,
            self.address,
            self.static_type.clone(),
            self.scope,
            self.kind,
        )
    }

    /// Child member laid out by the runtime type, resolved on first access and cached
    pub fn child(&self, name: &str, policy: ResolutionPolicy) -> Result<Value, LensError> {
        let key = (name.to_string(), policy);
        if let Some(cached) = self.children.lock().get(&key) {
            return Ok(cached.clone());
        }

        let current = self.session.stop_id();
        if current != self.scope.stop_id {
            return Err(LensError::StaleValue {
                resolved: self.scope.stop_id,
                current,
            });
        }

        if matches!(self.contents, Contents::Pointer(0)) {
            return Err(LensError::NullDereference(name.to_string()));
        }
        let (Some(object), Some(base)) = (&self.object_type, self.object_address) else {
            return Err(LensError::ChildNotFound(name.to_string()));
        };
        let field = self
            .session
            .catalog()
            .find_field(object, name)
            .ok_or_else(|| LensError::ChildNotFound(name.to_string()))?;

        trace!("Materializing {}.{} at +{}", self.name, name, field.offset);
        let member = self.session.member_value(&field, base, self.scope)?;
        // cached children must outlive the stop, so static ones are snapshotted too
        let child = match self.session.promote(&member, policy)? {
            Value::Static(member) => Value::Dynamic(self.session.snapshot(&member)?),
            dynamic => dynamic,
        };

        Ok(self.children.lock().entry(key).or_insert(child).clone())
    }
}

impl PartialEq for DynamicValue {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
            && self.display_type.name == other.display_type.name
            && self.raw_type.name == other.raw_type.name
            && self.object_address == other.object_address
            && self.contents == other.contents
    }
}

impl fmt::Debug for DynamicValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DynamicValue")
            .field("name", &self.name)
            .field("address", &format_args!("0x{:x}", self.address))
            .field("display_type", &self.display_type.name)
            .field("raw_type", &self.raw_type.name)
            .field("contents", &self.contents)
            .field("resolution_error", &self.resolution_error)
            .finish()
    }
}
