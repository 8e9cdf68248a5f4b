use std::sync::Arc;

use log::debug;
use serde::Serialize;

use crate::catalog::TypeCatalog;
use crate::error::LensError;
use crate::models::TypeRef;
use crate::values::Value;

/// Where a single step into a message send lands
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepTarget {
    pub class_name: String,
    pub selector: String,
    pub file: Option<String>,
    pub line: u32,
    pub address: Option<u64>,
    /// Implementations without line info that the step ran through, nearest first
    pub stepped_through: Vec<String>,
}

pub struct MethodDispatcher {
    catalog: Arc<TypeCatalog>,
}

impl MethodDispatcher {
    pub fn new(catalog: Arc<TypeCatalog>) -> Self {
        Self { catalog }
    }

    /// Steps into `selector` sent to `receiver`. Dynamic values dispatch on the
    /// class the runtime allocated (proxies included), static ones on their declared class.
    pub fn step_into(&self, receiver: &Value, selector: &str) -> Result<StepTarget, LensError> {
        let class = receiver
            .object_type()
            .ok_or_else(|| LensError::MethodNotFound {
                type_name: receiver.type_name().to_string(),
                selector: selector.to_string(),
            })?;
        self.dispatch_from(&class, selector)
    }

    pub fn dispatch_from(&self, class: &TypeRef, selector: &str) -> Result<StepTarget, LensError> {
        let mut stepped_through = Vec::new();

        for candidate in self.catalog.class_chain(class) {
            let Some(layout) = candidate.as_class() else {
                continue;
            };
            let Some(method) = layout.methods.iter().find(|m| m.selector == selector) else {
                continue;
            };

            match method.line {
                Some(line) => {
                    debug!(
                        "Step into {} lands in {} at line {}",
                        selector, candidate.name, line
                    );
                    return Ok(StepTarget {
                        class_name: candidate.name.clone(),
                        selector: selector.to_string(),
                        file: method.file.clone(),
                        line,
                        address: method.address,
                        stepped_through,
                    });
                }
                None => {
                    debug!("Stepping through {} in {}", selector, candidate.name);
                    stepped_through.push(candidate.name.clone());
                }
            }
        }

        Err(LensError::MethodNotFound {
            type_name: class.name.clone(),
            selector: selector.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClassLayout, MethodEntry, TypeDescriptor};

    fn method(selector: &str, line: Option<u32>) -> MethodEntry {
        MethodEntry {
            selector: selector.to_string(),
            address: None,
            file: None,
            line,
        }
    }

    fn catalog() -> Arc<TypeCatalog> {
        let mut catalog = TypeCatalog::new();
        catalog.register_type(TypeDescriptor::class(
            "Source",
            16,
            ClassLayout {
                methods: vec![method("setProperty:", Some(52))],
                ..ClassLayout::default()
            },
        ));
        catalog.register_type(TypeDescriptor::class(
            "NSKVONotifying_Source",
            16,
            ClassLayout {
                superclass: Some("Source".to_string()),
                methods: vec![method("setProperty:", None)],
                ..ClassLayout::default()
            },
        ));
        Arc::new(catalog)
    }

    #[test]
    fn test_steps_through_trampoline() {
        let catalog = catalog();
        let dispatcher = MethodDispatcher::new(catalog.clone());
        let proxy = catalog.lookup_by_name("NSKVONotifying_Source").unwrap();

        let target = dispatcher.dispatch_from(&proxy, "setProperty:").unwrap();
        assert_eq!(target.class_name, "Source");
        assert_eq!(target.line, 52);
        assert_eq!(target.stepped_through, vec!["NSKVONotifying_Source".to_string()]);
    }

    #[test]
    fn test_missing_selector() {
        let catalog = catalog();
        let dispatcher = MethodDispatcher::new(catalog.clone());
        let source = catalog.lookup_by_name("Source").unwrap();
        assert!(matches!(
            dispatcher.dispatch_from(&source, "dealloc"),
            Err(LensError::MethodNotFound { .. })
        ));
    }
}
