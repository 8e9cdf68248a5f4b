pub mod builder;
pub mod dynamic;
pub mod static_value;

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::error::LensError;
use crate::models::{ResolutionPolicy, ScalarValue, TypeRef, VariableKind};
use crate::utils::format_address;

pub use builder::{DynamicValueBuilder, ResolvedTarget};
pub use dynamic::DynamicValue;
pub use static_value::{ScopeRef, StaticValue};

/// What a value holds, as read at the stop it was resolved in
#[derive(Debug, Clone, PartialEq)]
pub enum Contents {
    Scalar(ScalarValue),
    Pointer(u64),
    /// An object laid out inline; its contents are its children
    Object,
    Unavailable,
}

/// Serializable view of a value and its children, used for comparisons and reports
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValueSummary {
    pub name: String,
    pub type_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ValueSummary>,
}

/// A value as handed to callers: either as declared, or promoted to its runtime type
#[derive(Clone)]
pub enum Value {
    Static(Arc<StaticValue>),
    Dynamic(Arc<DynamicValue>),
}

impl Value {
    pub fn name(&self) -> &str {
        match self {
            Value::Static(v) => v.name(),
            Value::Dynamic(v) => v.name(),
        }
    }

    pub fn address(&self) -> u64 {
        match self {
            Value::Static(v) => v.address(),
            Value::Dynamic(v) => v.address(),
        }
    }

    pub fn kind(&self) -> VariableKind {
        match self {
            Value::Static(v) => v.kind(),
            Value::Dynamic(v) => v.kind(),
        }
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, Value::Dynamic(_))
    }

    pub fn policy(&self) -> ResolutionPolicy {
        match self {
            Value::Static(_) => ResolutionPolicy::NoDynamic,
            Value::Dynamic(v) => v.policy(),
        }
    }

    /// Type name for display: proxy classes are never shown
    pub fn type_name(&self) -> &str {
        match self {
            Value::Static(v) => &v.declared_type().name,
            Value::Dynamic(v) => &v.display_type().name,
        }
    }

    /// Type name including proxy classes, as the runtime reports them
    pub fn raw_type_name(&self) -> &str {
        match self {
            Value::Static(v) => &v.declared_type().name,
            Value::Dynamic(v) => &v.raw_type().name,
        }
    }

    pub fn static_type(&self) -> &TypeRef {
        match self {
            Value::Static(v) => v.declared_type(),
            Value::Dynamic(v) => v.static_type(),
        }
    }

    pub fn is_pointer(&self) -> bool {
        self.static_type().is_pointer()
    }

    /// Class whose methods and layout apply to this value
    pub fn object_type(&self) -> Option<TypeRef> {
        match self {
            Value::Static(v) => v.object_type(),
            Value::Dynamic(v) => v.object_type().cloned(),
        }
    }

    pub fn contents(&self) -> Result<Contents, LensError> {
        match self {
            Value::Static(v) => v.contents(),
            Value::Dynamic(v) => Ok(v.contents().clone()),
        }
    }

    pub fn resolution_error(&self) -> Option<&str> {
        match self {
            Value::Static(_) => None,
            Value::Dynamic(v) => v.resolution_error(),
        }
    }

    pub fn value_string(&self) -> Option<String> {
        match self.contents().ok()? {
            Contents::Scalar(scalar) => Some(scalar.to_string()),
            Contents::Pointer(pointer) => Some(format_address(pointer)),
            Contents::Object | Contents::Unavailable => None,
        }
    }

    pub fn as_i64(&self) -> Result<i64, LensError> {
        match self.contents()? {
            Contents::Scalar(scalar) => scalar
                .as_i64()
                .ok_or_else(|| LensError::NotAScalar(self.type_name().to_string())),
            _ => Err(LensError::NotAScalar(self.type_name().to_string())),
        }
    }

    pub fn pointer_value(&self) -> Option<u64> {
        match self.contents().ok()? {
            Contents::Pointer(pointer) => Some(pointer),
            _ => None,
        }
    }

    pub fn child_names(&self) -> Vec<String> {
        match self {
            Value::Static(v) => {
                if self.pointer_value() == Some(0) {
                    return Vec::new();
                }
                v.child_names()
            }
            Value::Dynamic(v) => v.child_names(),
        }
    }

    /// Looks up a child member. A static value only knows the members of its
    /// declared type; the child itself is then resolved with `policy`.
    pub fn get_child_member_with_name(
        &self,
        name: &str,
        policy: ResolutionPolicy,
    ) -> Result<Value, LensError> {
        match self {
            Value::Static(v) => {
                let member = v.child_member(name)?;
                v.session().promote(&member, policy)
            }
            Value::Dynamic(v) => v.child(name, policy),
        }
    }

    /// Same value under another policy, through the same promotion path as a fresh lookup
    pub fn get_dynamic_value(&self, policy: ResolutionPolicy) -> Result<Value, LensError> {
        match self {
            Value::Static(v) => v.session().promote(v, policy),
            Value::Dynamic(v) if v.policy() == policy => Ok(self.clone()),
            Value::Dynamic(v) => {
                let counterpart = v.static_counterpart();
                v.session().promote(&counterpart, policy)
            }
        }
    }

    pub fn get_static_value(&self) -> Arc<StaticValue> {
        match self {
            Value::Static(v) => v.clone(),
            Value::Dynamic(v) => v.static_counterpart(),
        }
    }

    pub fn summarize(&self, depth: usize) -> ValueSummary {
        let children = if depth == 0 {
            Vec::new()
        } else {
            self.child_names()
                .into_iter()
                .map(|name| match self.get_child_member_with_name(&name, self.policy()) {
                    Ok(child) => child.summarize(depth - 1),
                    Err(e) => ValueSummary {
                        name,
                        type_name: String::new(),
                        value: None,
                        error: Some(e.to_string()),
                        children: Vec::new(),
                    },
                })
                .collect()
        };

        ValueSummary {
            name: self.name().to_string(),
            type_name: self.type_name().to_string(),
            value: self.value_string(),
            error: self.resolution_error().map(str::to_string),
            children,
        }
    }

    /// Same type name and the same child values down to `depth`
    pub fn structurally_eq(&self, other: &Value, depth: usize) -> bool {
        self.summarize(depth) == other.summarize(depth)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Static(v) => fmt::Debug::fmt(v.as_ref(), f),
            Value::Dynamic(v) => fmt::Debug::fmt(v.as_ref(), f),
        }
    }
}
