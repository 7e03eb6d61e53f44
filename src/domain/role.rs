use serde::{Deserialize, Serialize};

use crate::domain::{ComponentId, Params};

/// A reference to a component, together with parameter overrides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentRef {
    /// The referenced component.
    pub id: ComponentId,
    /// Overrides applied on top of the component's defaults.
    #[serde(skip_serializing_if = "Params::is_empty")]
    pub params: Params,
}

impl ComponentRef {
    /// Creates a reference with no parameter overrides.
    #[must_use]
    pub fn new(id: ComponentId) -> Self {
        Self {
            id,
            params: Params::new(),
        }
    }

    /// Creates a reference with the given parameter overrides.
    #[must_use]
    pub const fn with_params(id: ComponentId, params: Params) -> Self {
        Self { id, params }
    }
}

impl From<ComponentId> for ComponentRef {
    fn from(id: ComponentId) -> Self {
        Self::new(id)
    }
}

/// Manifests may write a reference either as a bare identity or as a table
/// with `id` and `params`.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawRef {
    Bare(ComponentId),
    Full {
        id: ComponentId,
        #[serde(default)]
        params: Params,
    },
}

impl<'de> Deserialize<'de> for ComponentRef {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match RawRef::deserialize(deserializer)? {
            RawRef::Bare(id) => Self::new(id),
            RawRef::Full { id, params } => Self::with_params(id, params),
        })
    }
}

/// The declared intent of a role: an ordered list of component references.
///
/// Declaration order is significant; it determines the order of instances
/// in the compiled graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Role {
    name: String,
    entries: Vec<ComponentRef>,
}

impl Role {
    /// Creates an empty role with the given name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
        }
    }

    /// Appends a reference with no parameter overrides.
    #[must_use]
    pub fn include(mut self, id: ComponentId) -> Self {
        self.entries.push(ComponentRef::new(id));
        self
    }

    /// Appends a reference with parameter overrides.
    #[must_use]
    pub fn include_with(mut self, id: ComponentId, params: Params) -> Self {
        self.entries.push(ComponentRef::with_params(id, params));
        self
    }

    /// Returns the role's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the role's entries in declaration order.
    #[must_use]
    pub fn entries(&self) -> &[ComponentRef] {
        &self.entries
    }

    /// Removes every entry referencing `id`, returning how many were removed.
    pub fn exclude(&mut self, id: &ComponentId) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| &entry.id != id);
        before - self.entries.len()
    }
}

impl Extend<ComponentRef> for Role {
    fn extend<T: IntoIterator<Item = ComponentRef>>(&mut self, iter: T) {
        self.entries.extend(iter);
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn id(s: &str) -> ComponentId {
        s.parse().unwrap()
    }

    #[test]
    fn preserves_declaration_order() {
        let role = Role::new("role::kubernetes")
            .include(id("profile::b"))
            .include(id("profile::a"))
            .include(id("profile::c"));

        let ids: Vec<_> = role.entries().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["profile::b", "profile::a", "profile::c"]);
    }

    #[test]
    fn exclude_removes_all_matching_entries() {
        let mut role = Role::new("role::web")
            .include(id("profile::a"))
            .include(id("profile::b"))
            .include(id("profile::a"));

        assert_eq!(role.exclude(&id("profile::a")), 2);
        assert_eq!(role.entries().len(), 1);
        assert_eq!(role.exclude(&id("profile::missing")), 0);
    }

    #[test]
    fn deserialises_bare_and_full_references() {
        let refs: Vec<ComponentRef> = serde_json::from_value(json!([
            "profile::a",
            { "id": "profile::b", "params": { "replicas": 2 } },
            { "id": "profile::c" },
        ]))
        .unwrap();

        assert_eq!(refs[0], ComponentRef::new(id("profile::a")));
        assert_eq!(refs[1].params.get("replicas"), Some(&json!(2)));
        assert!(refs[2].params.is_empty());
    }

    #[test]
    fn rejects_invalid_reference() {
        let result: Result<ComponentRef, _> = serde_json::from_value(json!("Not Valid"));
        assert!(result.is_err());
    }
}
