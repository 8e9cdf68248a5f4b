use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::error::LensError;
use crate::models::{TypeKind, TypeRef, VariableKind};
use crate::session::Session;

use super::Contents;

/// The stack frame and stop a value was produced in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScopeRef {
    pub frame_index: Option<usize>,
    pub stop_id: u64,
}

/// A value interpreted with its declared type only.
///
/// Reads memory on demand, so it is only meaningful while the process is
/// still at the stop it was looked up in.
pub struct StaticValue {
    session: Arc<Session>,
    name: String,
    address: u64,
    declared_type: TypeRef,
    scope: ScopeRef,
    kind: VariableKind,
}

impl StaticValue {
    pub(crate) fn new(
        session: Arc<Session>,
        name: &str,
        address: u64,
        declared_type: TypeRef,
        scope: ScopeRef,
        kind: VariableKind,
    ) -> Arc<Self> {
        Arc::new(Self {
            session,
            name: name.to_string(),
            address,
            declared_type,
            scope,
            kind,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> u64 {
        self.address
    }

    pub fn declared_type(&self) -> &TypeRef {
        &self.declared_type
    }

    pub fn scope(&self) -> ScopeRef {
        self.scope
    }

    pub fn kind(&self) -> VariableKind {
        self.kind
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn is_valid(&self) -> bool {
        self.session.stop_id() == self.scope.stop_id
    }

    pub fn check_valid(&self) -> Result<(), LensError> {
        let current = self.session.stop_id();
        if current != self.scope.stop_id {
            return Err(LensError::StaleValue {
                resolved: self.scope.stop_id,
                current,
            });
        }
        Ok(())
    }

    /// Class of the object this value is or points to, by declaration
    pub fn object_type(&self) -> Option<TypeRef> {
        match &self.declared_type.kind {
            TypeKind::Pointer { pointee } => self
                .session
                .catalog()
                .lookup_by_name(pointee)
                .filter(|t| t.as_class().is_some()),
            TypeKind::Class(_) => Some(self.declared_type.clone()),
            TypeKind::Scalar(_) => None,
        }
    }

    pub fn contents(&self) -> Result<Contents, LensError> {
        self.check_valid()?;
        let process = self.session.process();

        match &self.declared_type.kind {
            TypeKind::Scalar(encoding) => Ok(process
                .read_scalar(self.address, self.declared_type.size, *encoding)?
                .map(Contents::Scalar)
                .unwrap_or(Contents::Unavailable)),
            TypeKind::Pointer { .. } => Ok(Contents::Pointer(process.read_u64(self.address)?)),
            TypeKind::Class(_) => Ok(Contents::Object),
        }
    }

    pub fn child_names(&self) -> Vec<String> {
        match self.object_type() {
            Some(object) => self
                .session
                .catalog()
                .all_fields(&object)
                .into_iter()
                .map(|field| field.name)
                .collect(),
            None => Vec::new(),
        }
    }

    /// Child laid out by the declared type; members only a subclass declares are not found
    pub fn child_member(self: &Arc<Self>, name: &str) -> Result<Arc<StaticValue>, LensError> {
        let object = self
            .object_type()
            .ok_or_else(|| LensError::ChildNotFound(name.to_string()))?;
        let field = self
            .session
            .catalog()
            .find_field(&object, name)
            .ok_or_else(|| LensError::ChildNotFound(name.to_string()))?;

        let base = match self.contents()? {
            Contents::Pointer(0) => return Err(LensError::NullDereference(name.to_string())),
            Contents::Pointer(pointer) => pointer,
            Contents::Object => self.address,
            _ => return Err(LensError::ChildNotFound(name.to_string())),
        };

        self.session.member_value(&field, base, self.scope)
    }
}

impl fmt::Debug for StaticValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticValue")
            .field("name", &self.name)
            .field("address", &format_args!("0x{:x}", self.address))
            .field("declared_type", &self.declared_type.name)
            .field("scope", &self.scope)
            .field("kind", &self.kind)
            .finish()
    }
}
