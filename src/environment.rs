use std::{cell::RefCell, rc::Rc};

use indexmap::IndexMap;

use crate::{
    diagnostics::{BouquetError, Diagnostic, Result, SourceSpan},
    value::Value,
};

pub type EnvironmentRef = Rc<RefCell<Environment>>;

/// One lexical scope. Module environments sit at the bottom of a chain of
/// block scopes; lookups walk towards the root.
#[derive(Debug, Default)]
pub struct Environment {
    parent: Option<EnvironmentRef>,
    bindings: IndexMap<String, Binding>,
}

impl Environment {
    pub fn new() -> EnvironmentRef {
        Rc::new(RefCell::new(Self::default()))
    }

    pub fn with_parent(parent: EnvironmentRef) -> EnvironmentRef {
        Rc::new(RefCell::new(Self {
            parent: Some(parent),
            bindings: IndexMap::new(),
        }))
    }

    pub fn define(&mut self, name: impl Into<String>, value: Value, mutable: bool) {
        self.bindings.insert(name.into(), Binding { value, mutable });
    }

    /// Values bound directly in this scope, in definition order.
    pub fn snapshot(&self) -> IndexMap<String, Value> {
        self.bindings
            .iter()
            .map(|(name, binding)| (name.clone(), binding.value.clone()))
            .collect()
    }

    pub fn assign(env: &EnvironmentRef, name: &str, value: Value, span: SourceSpan) -> Result<()> {
        let parent = {
            let mut scope = env.borrow_mut();
            if let Some(binding) = scope.bindings.get_mut(name) {
                if !binding.mutable {
                    return Err(BouquetError::from(
                        Diagnostic::runtime(format!("cannot assign to immutable binding `{name}`"))
                            .with_span(span),
                    ));
                }
                binding.value = value;
                return Ok(());
            }
            scope.parent.clone()
        };
        match parent {
            Some(parent) => Environment::assign(&parent, name, value, span),
            None => Err(undefined(name, span)),
        }
    }

    pub fn get(env: &EnvironmentRef, name: &str, span: SourceSpan) -> Result<Value> {
        let parent = {
            let scope = env.borrow();
            if let Some(binding) = scope.bindings.get(name) {
                return Ok(binding.value.clone());
            }
            scope.parent.clone()
        };
        match parent {
            Some(parent) => Environment::get(&parent, name, span),
            None => Err(undefined(name, span)),
        }
    }
}

fn undefined(name: &str, span: SourceSpan) -> BouquetError {
    Diagnostic::runtime(format!("undefined variable `{name}`"))
        .with_span(span)
        .into()
}

#[derive(Debug, Clone)]
pub struct Binding {
    pub value: Value,
    pub mutable: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignment_walks_to_the_defining_scope() {
        let root = Environment::new();
        root.borrow_mut().define("count", Value::int(1), true);
        let inner = Environment::with_parent(Rc::clone(&root));
        let span = SourceSpan::new(0, 0);
        Environment::assign(&inner, "count", Value::int(2), span).unwrap();
        assert_eq!(Environment::get(&root, "count", span).unwrap(), Value::int(2));
        assert!(inner.borrow().snapshot().is_empty());
    }

    #[test]
    fn immutable_bindings_reject_assignment() {
        let root = Environment::new();
        root.borrow_mut().define("limit", Value::int(1), false);
        let err = Environment::assign(&root, "limit", Value::int(2), SourceSpan::new(4, 9))
            .unwrap_err();
        assert!(err.to_string().contains("immutable binding `limit`"));
    }
}
