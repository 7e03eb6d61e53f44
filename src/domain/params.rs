//! Component parameters.

use std::collections::{BTreeMap, btree_map};

use serde::{Deserialize, Serialize};
pub use serde_json::Value;

/// A set of named parameter values.
///
/// Keys are kept sorted so that two parameter sets with the same contents
/// always compare, print and serialise identically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(BTreeMap<String, Value>);

impl Params {
    /// Creates an empty parameter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a parameter, returning the previous value if there was one.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Builder-style variant of [`Params::insert`].
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Returns the value of a parameter.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Returns the number of parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there are no parameters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the parameters in key order.
    pub fn iter(&self) -> btree_map::Iter<'_, String, Value> {
        self.0.iter()
    }

    /// Applies `overrides` on top of these parameters.
    ///
    /// Keys present in `overrides` replace existing values; all other keys
    /// are left as they were.
    pub fn merge(&mut self, overrides: &Self) {
        for (key, value) in overrides {
            self.0.insert(key.clone(), value.clone());
        }
    }

    /// Returns the first key that both sets assign, but to different values.
    #[must_use]
    pub fn conflict_with<'a>(&'a self, other: &Self) -> Option<&'a str> {
        self.0
            .iter()
            .find(|(key, value)| other.get(key).is_some_and(|theirs| theirs != *value))
            .map(|(key, _)| key.as_str())
    }
}

impl<'a> IntoIterator for &'a Params {
    type Item = (&'a String, &'a Value);
    type IntoIter = btree_map::Iter<'a, String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl<K, V> FromIterator<(K, V)> for Params
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn merge_overrides_conflicting_keys_only() {
        let mut params = Params::new().with("replicas", 1).with("namespace", "monitoring");
        params.merge(&Params::new().with("replicas", 3).with("image", "dd:7"));

        assert_eq!(params.get("replicas"), Some(&json!(3)));
        assert_eq!(params.get("namespace"), Some(&json!("monitoring")));
        assert_eq!(params.get("image"), Some(&json!("dd:7")));
        assert_eq!(params.len(), 3);
    }

    #[test]
    fn merging_empty_overrides_is_a_no_op() {
        let mut params = Params::new().with("replicas", 1);
        let before = params.clone();
        params.merge(&Params::new());
        assert_eq!(params, before);
    }

    #[test]
    fn conflict_requires_a_shared_key_with_different_values() {
        let a = Params::new().with("replicas", 1).with("image", "dd:7");

        assert_eq!(a.conflict_with(&Params::new().with("replicas", 1)), None);
        assert_eq!(a.conflict_with(&Params::new().with("other", true)), None);
        assert_eq!(
            a.conflict_with(&Params::new().with("replicas", 2)),
            Some("replicas")
        );
    }

    #[test]
    fn deserialises_from_toml_and_yaml() {
        let from_toml: Params = toml::from_str("replicas = 2\nenabled = true\n").unwrap();
        let from_yaml: Params = serde_yaml::from_str("replicas: 2\nenabled: true\n").unwrap();

        assert_eq!(from_toml, from_yaml);
        assert_eq!(from_toml.get("enabled"), Some(&json!(true)));
    }
}
