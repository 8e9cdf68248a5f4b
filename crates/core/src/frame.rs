use std::sync::Arc;

use log::debug;

use crate::error::LensError;
use crate::models::{FrameInfo, ResolutionPolicy, VariableInfo, VariableKind};
use crate::parsing::{PathParser, PathSegment};
use crate::session::Session;
use crate::values::{ScopeRef, Value};

/// A stack frame at a particular stop; the entry point for variable lookups
pub struct Frame {
    session: Arc<Session>,
    index: usize,
    info: FrameInfo,
    stop_id: u64,
}

impl Frame {
    pub(crate) fn new(session: Arc<Session>, index: usize, info: FrameInfo, stop_id: u64) -> Self {
        Self {
            session,
            index,
            info,
            stop_id,
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn function(&self) -> &str {
        &self.info.function
    }

    pub fn file(&self) -> Option<&str> {
        self.info.file.as_deref()
    }

    pub fn line(&self) -> Option<u32> {
        self.info.line
    }

    pub fn variables(&self) -> &[VariableInfo] {
        &self.info.variables
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    fn scope(&self) -> ScopeRef {
        ScopeRef {
            frame_index: Some(self.index),
            stop_id: self.stop_id,
        }
    }

    fn lookup(&self, variable: &VariableInfo, policy: ResolutionPolicy) -> Result<Value, LensError> {
        let current = self.session.stop_id();
        if current != self.stop_id {
            return Err(LensError::StaleValue {
                resolved: self.stop_id,
                current,
            });
        }

        let value = self.session.variable_value(variable, self.scope())?;
        self.session.promote(&value, policy)
    }

    /// Finds a local or argument in this frame
    pub fn find_variable(&self, name: &str, policy: ResolutionPolicy) -> Result<Value, LensError> {
        let variable = self
            .info
            .variables
            .iter()
            .find(|v| v.name == name && matches!(v.kind, VariableKind::Local | VariableKind::Argument))
            .ok_or_else(|| LensError::VariableNotFound(name.to_string()))?;
        self.lookup(variable, policy)
    }

    /// Finds a variable of exactly the given kind
    pub fn find_value(
        &self,
        name: &str,
        kind: VariableKind,
        policy: ResolutionPolicy,
    ) -> Result<Value, LensError> {
        let variable = self
            .info
            .variables
            .iter()
            .find(|v| v.name == name && v.kind == kind)
            .ok_or_else(|| LensError::VariableNotFound(name.to_string()))?;
        self.lookup(variable, policy)
    }

    /// Evaluates a member path such as `myObserver->_source`. Locals and
    /// arguments shadow globals of the same name.
    pub fn evaluate(&self, expression: &str, policy: ResolutionPolicy) -> Result<Value, LensError> {
        let path = PathParser::new()?.parse(expression)?;
        debug!("Evaluating {} in frame #{}", path, self.index);

        let mut value = match self.find_variable(&path.root, policy) {
            Err(LensError::VariableNotFound(_)) => {
                self.find_value(&path.root, VariableKind::Global, policy)?
            }
            other => other?,
        };

        for segment in &path.segments {
            match segment {
                PathSegment::Arrow(member) if !value.is_pointer() => {
                    return Err(LensError::ExpressionError(format!(
                        "'{}' is not a pointer; use '.{}'",
                        value.name(),
                        member
                    )));
                }
                PathSegment::Dot(member) if value.is_pointer() => {
                    return Err(LensError::ExpressionError(format!(
                        "'{}' is a pointer; use '->{}'",
                        value.name(),
                        member
                    )));
                }
                _ => {}
            }
            value = value.get_child_member_with_name(segment.member(), policy)?;
        }

        Ok(value)
    }

    /// Upgrades an already obtained value without another lookup
    pub fn promote(&self, value: &Value, policy: ResolutionPolicy) -> Result<Value, LensError> {
        value.get_dynamic_value(policy)
    }
}
