use std::sync::Arc;

use log::{debug, warn};

use crate::catalog::TypeCatalog;
use crate::error::LensError;
use crate::frame::Frame;
use crate::memory::ProcessHandle;
use crate::models::{
    FieldLayout, FrameInfo, LensConfig, ResolutionPolicy, TypeKind, VariableInfo, VariableKind,
};
use crate::resolvers::{MethodDispatcher, Resolution, RuntimeIdentityResolver, UnresolvedReason};
use crate::traits::ProcessCoordinator;
use crate::values::{Contents, DynamicValue, DynamicValueBuilder, ResolvedTarget, ScopeRef, StaticValue, Value};

/// One debugging session: a loaded catalog, the target process and its stack.
///
/// Every value produced in the session holds an `Arc` to it, so values stay
/// usable independently of the frame or lookup that created them.
pub struct Session {
    catalog: Arc<TypeCatalog>,
    process: Arc<ProcessHandle>,
    config: LensConfig,
    frames: Vec<FrameInfo>,
    resolver: RuntimeIdentityResolver,
    builder: DynamicValueBuilder,
    dispatcher: MethodDispatcher,
}

impl Session {
    pub fn new(
        catalog: TypeCatalog,
        coordinator: Box<dyn ProcessCoordinator>,
        config: LensConfig,
        frames: Vec<FrameInfo>,
    ) -> Arc<Self> {
        let catalog = Arc::new(catalog);
        let process = Arc::new(ProcessHandle::new(coordinator));
        let resolver = RuntimeIdentityResolver::new(catalog.clone(), process.clone(), config.clone());

        Arc::new(Self {
            builder: DynamicValueBuilder::new(catalog.clone()),
            dispatcher: MethodDispatcher::new(catalog.clone()),
            catalog,
            process,
            config,
            frames,
            resolver,
        })
    }

    pub fn catalog(&self) -> &Arc<TypeCatalog> {
        &self.catalog
    }

    pub fn process(&self) -> &Arc<ProcessHandle> {
        &self.process
    }

    pub fn config(&self) -> &LensConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &MethodDispatcher {
        &self.dispatcher
    }

    pub fn stop_id(&self) -> u64 {
        self.process.stop_id()
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn frame(self: &Arc<Self>, index: usize) -> Result<Frame, LensError> {
        let info = self.frames.get(index).ok_or(LensError::FrameNotFound(index))?;
        Ok(Frame::new(self.clone(), index, info.clone(), self.stop_id()))
    }

    pub fn resume(&self) -> Result<(), LensError> {
        self.process.resume()
    }

    pub fn halt(&self) -> Result<u64, LensError> {
        self.process.halt()
    }

    pub(crate) fn variable_value(
        self: &Arc<Self>,
        variable: &VariableInfo,
        scope: ScopeRef,
    ) -> Result<Arc<StaticValue>, LensError> {
        let declared = self
            .catalog
            .lookup_by_name(&variable.type_name)
            .ok_or_else(|| LensError::TypeNotFound(variable.type_name.clone()))?;

        Ok(StaticValue::new(
            self.clone(),
            &variable.name,
            variable.address,
            declared,
            scope,
            variable.kind,
        ))
    }

    pub(crate) fn member_value(
        self: &Arc<Self>,
        field: &FieldLayout,
        base: u64,
        scope: ScopeRef,
    ) -> Result<Arc<StaticValue>, LensError> {
        let declared = self
            .catalog
            .lookup_by_name(&field.type_name)
            .ok_or_else(|| LensError::TypeNotFound(field.type_name.clone()))?;

        Ok(StaticValue::new(
            self.clone(),
            &field.name,
            base.wrapping_add(field.offset),
            declared,
            scope,
            VariableKind::Member,
        ))
    }

    /// Upgrades a static value into its dynamic form.
    ///
    /// Frame lookups, expression evaluation, child access and explicit
    /// promotion all end up here. Memory and runtime-call failures leave the
    /// static type in place and are recorded on the returned value; losing
    /// the target is returned as an error.
    pub fn promote(
        self: &Arc<Self>,
        value: &Arc<StaticValue>,
        policy: ResolutionPolicy,
    ) -> Result<Value, LensError> {
        value.check_valid()?;

        let policy = self.config.effective_policy(policy);
        if !policy.is_dynamic() {
            return Ok(Value::Static(value.clone()));
        }

        Ok(Value::Dynamic(self.materialize(value, policy)?))
    }

    /// Captures a value's contents as of the current stop without resolving
    /// its runtime type. The result stays readable after the process moves on.
    pub(crate) fn snapshot(self: &Arc<Self>, value: &Arc<StaticValue>) -> Result<Arc<DynamicValue>, LensError> {
        value.check_valid()?;
        self.materialize(value, ResolutionPolicy::NoDynamic)
    }

    fn materialize(
        self: &Arc<Self>,
        value: &Arc<StaticValue>,
        policy: ResolutionPolicy,
    ) -> Result<Arc<DynamicValue>, LensError> {
        let mut target = ResolvedTarget::new();
        if let Err(e) = self.resolve_target(value, policy, &mut target) {
            if e.is_fatal() {
                return Err(e);
            }
            warn!(
                "Using static type {} for {}: {}",
                value.declared_type().name,
                value.name(),
                e
            );
            target.error = Some(e.to_string());
        }

        Ok(self.builder.build(value, target, policy))
    }

    fn resolve_target(
        &self,
        value: &StaticValue,
        policy: ResolutionPolicy,
        target: &mut ResolvedTarget,
    ) -> Result<(), LensError> {
        let declared = value.declared_type();

        match &declared.kind {
            TypeKind::Scalar(encoding) => {
                if let Some(scalar) = self.process.read_scalar(value.address(), declared.size, *encoding)? {
                    target.contents = Contents::Scalar(scalar);
                }
            }
            TypeKind::Pointer { pointee } => {
                let pointer = self.process.read_u64(value.address())?;
                target.contents = Contents::Pointer(pointer);

                let Some(class) = self.catalog.lookup_by_name(pointee).filter(|t| t.as_class().is_some())
                else {
                    return Ok(());
                };
                target.object = Some((pointer, class.clone()));
                target.resolution = self.resolver.resolve(pointer, &class, policy)?;
            }
            TypeKind::Class(_) => {
                target.contents = Contents::Object;
                target.object = Some((value.address(), declared.clone()));
                target.resolution = self.resolver.resolve(value.address(), declared, policy)?;
            }
        }

        if let Resolution::Unresolved(reason) = &target.resolution {
            if *reason != UnresolvedReason::NoIdentityTag {
                debug!("{} keeps its static type: {}", value.name(), reason);
            }
        }
        Ok(())
    }
}
