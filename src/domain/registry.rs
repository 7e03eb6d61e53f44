//! The component registry.
//!
//! A [`Registry`] starts out [`Open`], accepting registrations. Once every
//! component is registered it is [sealed](Registry::seal), after which it is
//! read-only and can be shared freely between compilations, including across
//! threads. Compilation only accepts a sealed registry, so the
//! initialise-then-read lifecycle is enforced by the type system.

use std::{collections::HashMap, fmt, sync::Arc};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{ComponentId, ComponentRef, Params, compiler::CompileError};

/// A function from a component's effective parameters to the components it
/// contains.
pub type ExpandFn = dyn Fn(&Params) -> Vec<ComponentRef> + Send + Sync;

/// How a component expands into child components.
#[derive(Clone, Default)]
pub enum ExpansionRule {
    /// The component contains nothing.
    #[default]
    Leaf,
    /// The component always contains the same references.
    Static(Vec<ComponentRef>),
    /// The contained references depend on the component's parameters.
    Dynamic(Arc<ExpandFn>),
}

impl ExpansionRule {
    /// Wraps a closure as a [`ExpansionRule::Dynamic`] rule.
    #[must_use]
    pub fn dynamic<F>(f: F) -> Self
    where
        F: Fn(&Params) -> Vec<ComponentRef> + Send + Sync + 'static,
    {
        Self::Dynamic(Arc::new(f))
    }

    /// Returns the child references for the given effective parameters.
    #[must_use]
    pub fn expand(&self, params: &Params) -> Vec<ComponentRef> {
        match self {
            Self::Leaf => Vec::new(),
            Self::Static(children) => children.clone(),
            Self::Dynamic(f) => f(params),
        }
    }
}

impl fmt::Debug for ExpansionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Leaf => f.write_str("Leaf"),
            Self::Static(children) => f.debug_tuple("Static").field(children).finish(),
            Self::Dynamic(_) => f.write_str("Dynamic(..)"),
        }
    }
}

/// A registered component: identity, expansion rule and default parameters.
#[derive(Debug, Clone)]
pub struct ComponentDefinition {
    id: ComponentId,
    rule: ExpansionRule,
    defaults: Params,
}

impl ComponentDefinition {
    /// Creates a leaf definition with no default parameters.
    #[must_use]
    pub fn leaf(id: ComponentId) -> Self {
        Self {
            id,
            rule: ExpansionRule::Leaf,
            defaults: Params::new(),
        }
    }

    /// Creates a definition with the given rule and defaults.
    #[must_use]
    pub const fn new(id: ComponentId, rule: ExpansionRule, defaults: Params) -> Self {
        Self { id, rule, defaults }
    }

    /// Sets the default parameters.
    #[must_use]
    pub fn with_defaults(mut self, defaults: Params) -> Self {
        self.defaults = defaults;
        self
    }

    /// Sets the expansion rule.
    #[must_use]
    pub fn with_rule(mut self, rule: ExpansionRule) -> Self {
        self.rule = rule;
        self
    }

    /// The component's identity.
    #[must_use]
    pub const fn id(&self) -> &ComponentId {
        &self.id
    }

    /// The component's expansion rule.
    #[must_use]
    pub const fn rule(&self) -> &ExpansionRule {
        &self.rule
    }

    /// The component's default parameters.
    #[must_use]
    pub const fn defaults(&self) -> &Params {
        &self.defaults
    }
}

/// How repeated references to the same component are reconciled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergePolicy {
    /// Repeated references merge into one instance; for conflicting keys the
    /// later reference wins.
    #[default]
    Merge,
    /// Repeated references merge into one instance, but assigning a
    /// different value to a key that an earlier reference already assigned
    /// is an error.
    Strict,
}

/// Errors that can occur while populating a registry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// A component with this identity was already registered.
    #[error("component {0} is already registered")]
    Duplicate(ComponentId),
}

/// Registry state: still accepting registrations.
#[derive(Debug, Default)]
pub struct Open;

/// Registry state: read-only, ready for compilation.
#[derive(Debug)]
pub struct Sealed;

/// Known component definitions, keyed by identity.
#[derive(Debug)]
pub struct Registry<S> {
    /// Definitions in registration order.
    definitions: Vec<ComponentDefinition>,

    /// Lookup from identity to position in `definitions`.
    index: HashMap<ComponentId, usize>,

    merge_policy: MergePolicy,

    _state: S,
}

impl Default for Registry<Open> {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry<Open> {
    /// Creates an empty registry with the default merge policy.
    #[must_use]
    pub fn new() -> Self {
        Self::with_merge_policy(MergePolicy::default())
    }

    /// Creates an empty registry with the given merge policy.
    #[must_use]
    pub fn with_merge_policy(merge_policy: MergePolicy) -> Self {
        Self {
            definitions: Vec::new(),
            index: HashMap::new(),
            merge_policy,
            _state: Open,
        }
    }

    /// Registers a component definition.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] if a component with the same
    /// identity is already registered. The registry is left unchanged.
    pub fn register(&mut self, definition: ComponentDefinition) -> Result<(), RegistryError> {
        if self.index.contains_key(definition.id()) {
            return Err(RegistryError::Duplicate(definition.id().clone()));
        }

        tracing::trace!(id = %definition.id(), "registered component");
        self.index
            .insert(definition.id().clone(), self.definitions.len());
        self.definitions.push(definition);
        Ok(())
    }

    /// Registers a leaf component with no defaults.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Duplicate`] if the identity is taken.
    pub fn register_leaf(&mut self, id: ComponentId) -> Result<(), RegistryError> {
        self.register(ComponentDefinition::leaf(id))
    }

    /// Ends registration. The returned registry is read-only.
    #[must_use]
    pub fn seal(self) -> Registry<Sealed> {
        tracing::debug!(components = self.definitions.len(), "registry sealed");
        Registry {
            definitions: self.definitions,
            index: self.index,
            merge_policy: self.merge_policy,
            _state: Sealed,
        }
    }
}

impl<S> Registry<S> {
    /// Returns the definition registered under `id`, if any.
    #[must_use]
    pub fn get(&self, id: &ComponentId) -> Option<&ComponentDefinition> {
        self.index.get(id).map(|&position| &self.definitions[position])
    }

    /// Returns the definition registered under `id`.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError::UnknownComponent`] if nothing is registered
    /// under `id`.
    pub fn lookup(&self, id: &ComponentId) -> Result<&ComponentDefinition, CompileError> {
        self.get(id).ok_or_else(|| CompileError::UnknownComponent {
            id: id.clone(),
            referenced_by: None,
        })
    }

    /// Checks whether a component is registered under `id`.
    #[must_use]
    pub fn contains(&self, id: &ComponentId) -> bool {
        self.index.contains_key(id)
    }

    /// Iterates over the definitions in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &ComponentDefinition> {
        self.definitions.iter()
    }

    /// Returns the number of registered components.
    #[must_use]
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Returns `true` if nothing has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// The policy applied to repeated references during compilation.
    #[must_use]
    pub const fn merge_policy(&self) -> MergePolicy {
        self.merge_policy
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;

    fn id(s: &str) -> ComponentId {
        s.parse().unwrap()
    }

    #[test]
    fn rejects_duplicate_registration() {
        let mut registry = Registry::new();
        registry.register_leaf(id("profile::a")).unwrap();

        let err = registry
            .register(ComponentDefinition::leaf(id("profile::a")).with_defaults(
                Params::new().with("x", 1),
            ))
            .expect_err("duplicate should be rejected");
        assert_eq!(err, RegistryError::Duplicate(id("profile::a")));

        // The registered definition is untouched.
        let sealed = registry.seal();
        assert_eq!(sealed.len(), 1);
        assert!(sealed.lookup(&id("profile::a")).unwrap().defaults().is_empty());
    }

    #[test]
    fn lookup_of_unknown_component_fails() {
        let registry = Registry::new().seal();
        let err = registry.lookup(&id("profile::missing")).unwrap_err();
        assert!(matches!(
            err,
            CompileError::UnknownComponent { ref id, referenced_by: None }
                if id.as_str() == "profile::missing"
        ));
    }

    #[test]
    fn iterates_in_registration_order() {
        let mut registry = Registry::new();
        for name in ["profile::c", "profile::a", "profile::b"] {
            registry.register_leaf(id(name)).unwrap();
        }

        let ids: Vec<_> = registry.iter().map(|d| d.id().as_str()).collect();
        assert_eq!(ids, ["profile::c", "profile::a", "profile::b"]);
    }

    #[test]
    fn dynamic_rule_sees_parameters() {
        let rule = ExpansionRule::dynamic(|params: &Params| {
            if params.get("monitoring").and_then(Value::as_bool) == Some(true) {
                vec![ComponentRef::new("profile::datadog".parse().unwrap())]
            } else {
                Vec::new()
            }
        });

        assert!(rule.expand(&Params::new()).is_empty());
        assert_eq!(
            rule.expand(&Params::new().with("monitoring", true)).len(),
            1
        );
    }

    #[test]
    fn sealed_registry_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Registry<Sealed>>();
    }

    #[test]
    fn merge_policy_is_carried_through_sealing() {
        let registry = Registry::with_merge_policy(MergePolicy::Strict).seal();
        assert_eq!(registry.merge_policy(), MergePolicy::Strict);
    }
}
