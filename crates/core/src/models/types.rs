use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::consts::POINTER_SIZE;
use crate::utils::deserialize_optional_address;

/// Shared, immutable handle to a type descriptor held by the catalog
pub type TypeRef = Arc<TypeDescriptor>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarEncoding {
    Signed,
    Unsigned,
    Float,
    Bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDescriptor {
    pub name: String,
    pub size: u64,
    pub kind: TypeKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeKind {
    Scalar(ScalarEncoding),
    Pointer { pointee: String },
    Class(ClassLayout),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassLayout {
    /// Name of the direct superclass, if any
    #[serde(default)]
    pub superclass: Option<String>,
    /// Offset of the runtime identity tag (isa / vptr); inherited when absent
    #[serde(default)]
    pub identity_tag_offset: Option<u64>,
    /// Fields declared by this class only, superclass fields are not repeated
    #[serde(default)]
    pub fields: Vec<FieldLayout>,
    #[serde(default)]
    pub methods: Vec<MethodEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldLayout {
    pub name: String,
    pub offset: u64,
    pub type_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodEntry {
    pub selector: String,
    #[serde(default, deserialize_with = "deserialize_optional_address")]
    pub address: Option<u64>,
    #[serde(default)]
    pub file: Option<String>,
    /// Line of the implementation's entry; runtime-generated implementations have none
    #[serde(default)]
    pub line: Option<u32>,
}

impl MethodEntry {
    /// Implementations without line info are trampolines that the stepper walks through
    pub fn has_source(&self) -> bool {
        self.line.is_some()
    }
}

impl TypeDescriptor {
    pub fn scalar(name: &str, size: u64, encoding: ScalarEncoding) -> Self {
        Self {
            name: name.to_string(),
            size,
            kind: TypeKind::Scalar(encoding),
        }
    }

    pub fn pointer_to(pointee: &str) -> Self {
        let name = if pointee.ends_with('*') {
            format!("{}*", pointee)
        } else {
            format!("{} *", pointee)
        };

        Self {
            name,
            size: POINTER_SIZE,
            kind: TypeKind::Pointer {
                pointee: pointee.to_string(),
            },
        }
    }

    pub fn class(name: &str, size: u64, layout: ClassLayout) -> Self {
        Self {
            name: name.to_string(),
            size,
            kind: TypeKind::Class(layout),
        }
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self.kind, TypeKind::Pointer { .. })
    }

    pub fn pointee_name(&self) -> Option<&str> {
        match &self.kind {
            TypeKind::Pointer { pointee } => Some(pointee),
            _ => None,
        }
    }

    pub fn as_class(&self) -> Option<&ClassLayout> {
        match &self.kind {
            TypeKind::Class(layout) => Some(layout),
            _ => None,
        }
    }

    pub fn as_class_mut(&mut self) -> Option<&mut ClassLayout> {
        match &mut self.kind {
            TypeKind::Class(layout) => Some(layout),
            _ => None,
        }
    }

    pub fn scalar_encoding(&self) -> Option<ScalarEncoding> {
        match self.kind {
            TypeKind::Scalar(encoding) => Some(encoding),
            _ => None,
        }
    }

    pub fn description(&self) -> String {
        match &self.kind {
            TypeKind::Scalar(_) => self.name.clone(),
            TypeKind::Pointer { .. } => self.name.clone(),
            TypeKind::Class(layout) => match &layout.superclass {
                Some(superclass) => format!("{} : {}", self.name, superclass),
                None => self.name.clone(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pointer_names() {
        let ptr = TypeDescriptor::pointer_to("SourceBase");
        assert_eq!(ptr.name, "SourceBase *");
        assert_eq!(ptr.pointee_name(), Some("SourceBase"));
        assert_eq!(ptr.size, 8);

        let ptr_ptr = TypeDescriptor::pointer_to(&ptr.name);
        assert_eq!(ptr_ptr.name, "SourceBase **");
    }

    #[test]
    fn test_class_kind_from_json() {
        let json = r#"{
            "name": "Source",
            "size": 16,
            "kind": { "class": {
                "superclass": "SourceBase",
                "fields": [ { "name": "_property", "offset": 12, "type_name": "int" } ],
                "methods": [ { "selector": "setProperty:", "line": 52 } ]
            } }
        }"#;

        let ty: TypeDescriptor = serde_json::from_str(json).unwrap();
        let layout = ty.as_class().unwrap();
        assert_eq!(layout.superclass.as_deref(), Some("SourceBase"));
        assert_eq!(layout.identity_tag_offset, None);
        assert_eq!(layout.fields[0].offset, 12);
        assert!(layout.methods[0].has_source());
        assert_eq!(ty.description(), "Source : SourceBase");
    }
}
