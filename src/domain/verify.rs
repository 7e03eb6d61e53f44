//! Containment verification.
//!
//! [`verify`] checks a compiled [`CompositionGraph`] against an
//! [`ExpectationSet`]. It only checks containment: instances in the graph
//! that no expectation mentions are ignored.

use serde::{Deserialize, Serialize};

use crate::domain::{ComponentId, CompositionGraph, Params, component_id, params::Value};

/// A single assertion about a compiled role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "expect", rename_all = "snake_case")]
pub enum Expectation {
    /// The component must be present. Every parameter in `with` must have
    /// exactly that effective value.
    Present {
        /// The expected component.
        id: ComponentId,
        /// Required parameter values; empty means any parameters will do.
        #[serde(default, skip_serializing_if = "Params::is_empty")]
        with: Params,
    },
    /// The component must not be present.
    Absent {
        /// The excluded component.
        id: ComponentId,
    },
}

impl Expectation {
    /// The identity this expectation is about.
    #[must_use]
    pub const fn id(&self) -> &ComponentId {
        match self {
            Self::Present { id, .. } | Self::Absent { id } => id,
        }
    }
}

/// An ordered list of expectations, as written by the test author.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExpectationSet(Vec<Expectation>);

impl ExpectationSet {
    /// Creates an empty expectation set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set of presence expectations from identity strings.
    ///
    /// # Errors
    ///
    /// Returns an error for the first string that is not a valid identity.
    pub fn from_ids<I, S>(ids: I) -> Result<Self, component_id::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        ids.into_iter()
            .map(|s| s.as_ref().parse::<ComponentId>())
            .collect()
    }

    /// Expects `id` to be present.
    #[must_use]
    pub fn contains(self, id: ComponentId) -> Self {
        self.contains_with(id, Params::new())
    }

    /// Expects `id` to be present with the given parameter values.
    #[must_use]
    pub fn contains_with(mut self, id: ComponentId, with: Params) -> Self {
        self.0.push(Expectation::Present { id, with });
        self
    }

    /// Expects `id` to be absent.
    #[must_use]
    pub fn excludes(mut self, id: ComponentId) -> Self {
        self.0.push(Expectation::Absent { id });
        self
    }

    /// Appends an expectation.
    pub fn push(&mut self, expectation: Expectation) {
        self.0.push(expectation);
    }

    /// Iterates over the expectations in the order they were written.
    pub fn iter(&self) -> std::slice::Iter<'_, Expectation> {
        self.0.iter()
    }

    /// Returns the number of expectations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there are no expectations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<ComponentId> for ExpectationSet {
    fn from_iter<T: IntoIterator<Item = ComponentId>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|id| Expectation::Present {
                    id,
                    with: Params::new(),
                })
                .collect(),
        )
    }
}

impl FromIterator<Expectation> for ExpectationSet {
    fn from_iter<T: IntoIterator<Item = Expectation>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a ExpectationSet {
    type Item = &'a Expectation;
    type IntoIter = std::slice::Iter<'a, Expectation>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// A present component whose parameter did not have the required value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParamMismatch {
    /// The component.
    pub id: ComponentId,
    /// The parameter.
    pub key: String,
    /// The required value.
    pub expected: Value,
    /// The effective value, or `None` if the parameter is unset.
    pub actual: Option<Value>,
}

/// The outcome of checking one expectation set against one graph.
///
/// Every list preserves the order of the expectations that produced it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VerificationResult {
    /// Expected components that are not in the graph.
    pub missing: Vec<ComponentId>,
    /// Expected parameter values that did not match.
    pub mismatched: Vec<ParamMismatch>,
    /// Components expected to be absent that are in the graph.
    pub unexpected: Vec<ComponentId>,
}

impl VerificationResult {
    /// Returns `true` if every expectation held.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.missing.is_empty() && self.mismatched.is_empty() && self.unexpected.is_empty()
    }

    /// Total number of failed checks.
    #[must_use]
    pub fn failure_count(&self) -> usize {
        self.missing.len() + self.mismatched.len() + self.unexpected.len()
    }
}

/// Checks every expectation against the graph.
///
/// This never short-circuits: all failures are collected so that a single
/// run reports everything that is wrong.
#[must_use]
pub fn verify(graph: &CompositionGraph, expectations: &ExpectationSet) -> VerificationResult {
    let mut result = VerificationResult::default();

    for expectation in expectations {
        match expectation {
            Expectation::Present { id, with } => {
                let Some(instance) = graph.get(id) else {
                    result.missing.push(id.clone());
                    continue;
                };

                for (key, expected) in with {
                    let actual = instance.params.get(key);
                    if actual != Some(expected) {
                        result.mismatched.push(ParamMismatch {
                            id: id.clone(),
                            key: key.clone(),
                            expected: expected.clone(),
                            actual: actual.cloned(),
                        });
                    }
                }
            }
            Expectation::Absent { id } => {
                if graph.contains(id) {
                    result.unexpected.push(id.clone());
                }
            }
        }
    }

    tracing::debug!(
        role = graph.role(),
        expectations = expectations.len(),
        failures = result.failure_count(),
        "verified role"
    );
    result
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::domain::{
        Role,
        compiler::compile,
        registry::{ComponentDefinition, Registry},
    };

    fn id(s: &str) -> ComponentId {
        s.parse().unwrap()
    }

    fn graph_of(ids: &[&str]) -> CompositionGraph {
        let mut registry = Registry::new();
        for s in ids {
            registry
                .register(
                    ComponentDefinition::leaf(id(s)).with_defaults(Params::new().with("port", 80)),
                )
                .unwrap();
        }
        let registry = registry.seal();
        let role = ids
            .iter()
            .fold(Role::new("role::test"), |role, s| role.include(id(s)));
        compile(&registry, &role).unwrap()
    }

    #[test]
    fn empty_expectations_always_succeed() {
        let graph = graph_of(&[]);
        let result = verify(&graph, &ExpectationSet::new());
        assert!(result.is_success());

        let graph = graph_of(&["profile::a"]);
        assert!(verify(&graph, &ExpectationSet::new()).is_success());
    }

    #[test]
    fn reports_every_missing_identity_in_expectation_order() {
        let graph = graph_of(&["profile::b", "profile::d"]);
        let expectations =
            ExpectationSet::from_ids(["profile::e", "profile::b", "profile::a", "profile::d"])
                .unwrap();

        let result = verify(&graph, &expectations);
        assert!(!result.is_success());
        assert_eq!(result.missing, vec![id("profile::e"), id("profile::a")]);
        assert_eq!(result.failure_count(), 2);
    }

    #[test]
    fn extra_instances_are_ignored() {
        let graph = graph_of(&["profile::a", "profile::b", "profile::c"]);
        let expectations = ExpectationSet::from_ids(["profile::b"]).unwrap();
        assert!(verify(&graph, &expectations).is_success());
    }

    #[test]
    fn verification_is_idempotent() {
        let graph = graph_of(&["profile::a"]);
        let expectations = ExpectationSet::from_ids(["profile::a", "profile::z"]).unwrap();
        assert_eq!(verify(&graph, &expectations), verify(&graph, &expectations));
    }

    #[test]
    fn reports_parameter_mismatches() {
        let graph = graph_of(&["profile::web"]);
        let expectations = ExpectationSet::new()
            .contains_with(
                id("profile::web"),
                Params::new().with("port", 80).with("tls", true),
            )
            .contains_with(id("profile::web"), Params::new().with("port", 443));

        let result = verify(&graph, &expectations);
        assert!(result.missing.is_empty());
        assert_eq!(
            result.mismatched,
            vec![
                ParamMismatch {
                    id: id("profile::web"),
                    key: "tls".to_string(),
                    expected: json!(true),
                    actual: None,
                },
                ParamMismatch {
                    id: id("profile::web"),
                    key: "port".to_string(),
                    expected: json!(443),
                    actual: Some(json!(80)),
                },
            ]
        );
    }

    #[test]
    fn missing_component_is_not_also_a_mismatch() {
        let graph = graph_of(&[]);
        let expectations = ExpectationSet::new()
            .contains_with(id("profile::web"), Params::new().with("port", 80));

        let result = verify(&graph, &expectations);
        assert_eq!(result.missing, vec![id("profile::web")]);
        assert!(result.mismatched.is_empty());
    }

    #[test]
    fn reports_unexpected_presence() {
        let graph = graph_of(&["profile::a", "profile::legacy"]);
        let expectations = ExpectationSet::new()
            .contains(id("profile::a"))
            .excludes(id("profile::legacy"))
            .excludes(id("profile::gone"));

        let result = verify(&graph, &expectations);
        assert_eq!(result.unexpected, vec![id("profile::legacy")]);
        assert!(result.missing.is_empty());
    }

    #[test]
    fn from_ids_rejects_invalid_identity() {
        assert!(ExpectationSet::from_ids(["profile::ok", "Not::Ok"]).is_err());
    }

    #[test]
    fn expectations_deserialise_with_tag() {
        let set: ExpectationSet = serde_json::from_value(json!([
            { "expect": "present", "id": "profile::a" },
            { "expect": "present", "id": "profile::b", "with": { "port": 80 } },
            { "expect": "absent", "id": "profile::c" },
        ]))
        .unwrap();

        let expected = ExpectationSet::new()
            .contains(id("profile::a"))
            .contains_with(id("profile::b"), Params::new().with("port", 80))
            .excludes(id("profile::c"));
        assert_eq!(set, expected);
    }
}
