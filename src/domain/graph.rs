//! The compiled form of a role.
//!
//! A [`CompositionGraph`] holds one [`Instance`] per distinct component
//! identity, in the order each identity was first reached while expanding
//! the role, together with the containment relation between them.

use std::collections::HashMap;

use petgraph::{
    Direction,
    algo::{astar, has_path_connecting},
    graphmap::DiGraphMap,
};
use serde::Serialize;

use crate::domain::{ComponentId, Params};

/// Where an instance came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Provenance {
    /// Index of the role entry whose expansion first reached this instance.
    pub entry: usize,
    /// The component that contains this instance, or `None` if it was
    /// declared directly by the role.
    pub parent: Option<ComponentId>,
}

/// A resolved component within a compiled role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Instance {
    /// The component's identity.
    pub id: ComponentId,
    /// Defaults merged with every override applied so far.
    pub params: Params,
    /// Where the instance was first introduced.
    pub provenance: Provenance,
}

/// A compiled role: resolved instances plus containment edges.
///
/// Storage is decomposed the same way throughout:
/// - instances: `Vec<Instance>`, in first-occurrence order
/// - identity lookup: `HashMap<ComponentId, usize>`
/// - containment: `DiGraphMap<usize, ()>`, edges point from container to
///   contained
#[derive(Debug, Clone, Default)]
pub struct CompositionGraph {
    role: String,

    instances: Vec<Instance>,

    index: HashMap<ComponentId, usize>,

    containment: DiGraphMap<usize, ()>,
}

impl PartialEq for CompositionGraph {
    fn eq(&self, other: &Self) -> bool {
        let mut ours: Vec<_> = self.containment.all_edges().map(|(a, b, _)| (a, b)).collect();
        let mut theirs: Vec<_> = other.containment.all_edges().map(|(a, b, _)| (a, b)).collect();
        ours.sort_unstable();
        theirs.sort_unstable();

        self.role == other.role && self.instances == other.instances && ours == theirs
    }
}

impl Eq for CompositionGraph {}

/// What happened when an instance was merged into the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Merged {
    /// A new instance was created at this position.
    Inserted(usize),
    /// An existing instance at this position absorbed the overrides, and its
    /// effective parameters changed.
    Updated(usize),
    /// An existing instance at this position absorbed the overrides without
    /// any change to its effective parameters.
    Unchanged(usize),
}

impl Merged {
    pub(crate) const fn position(self) -> usize {
        match self {
            Self::Inserted(position) | Self::Updated(position) | Self::Unchanged(position) => {
                position
            }
        }
    }
}

impl CompositionGraph {
    pub(crate) fn new(role: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            ..Self::default()
        }
    }

    /// Inserts a new instance, or merges `overrides` into the existing
    /// instance with the same identity.
    ///
    /// `defaults` is only consulted when a new instance is created.
    pub(crate) fn merge(
        &mut self,
        id: &ComponentId,
        defaults: &Params,
        overrides: &Params,
        provenance: Provenance,
    ) -> Merged {
        if let Some(&position) = self.index.get(id) {
            let params = &mut self.instances[position].params;
            let changed = overrides
                .iter()
                .any(|(key, value)| params.get(key) != Some(value));
            params.merge(overrides);
            tracing::trace!(%id, changed, "merged repeated reference");
            return if changed {
                Merged::Updated(position)
            } else {
                Merged::Unchanged(position)
            };
        }

        let mut params = defaults.clone();
        params.merge(overrides);

        let position = self.instances.len();
        self.instances.push(Instance {
            id: id.clone(),
            params,
            provenance,
        });
        self.index.insert(id.clone(), position);
        self.containment.add_node(position);
        tracing::trace!(%id, position, "added instance");
        Merged::Inserted(position)
    }

    /// Records that the instance at `container` contains the one at
    /// `contained`. Repeated edges are idempotent.
    pub(crate) fn link(&mut self, container: usize, contained: usize) {
        self.containment.add_edge(container, contained, ());
    }

    pub(crate) fn position_of(&self, id: &ComponentId) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub(crate) fn params_at(&self, position: usize) -> &Params {
        &self.instances[position].params
    }

    pub(crate) fn id_at(&self, position: usize) -> &ComponentId {
        &self.instances[position].id
    }

    /// A shortest containment path from `from` to `to`, both included.
    pub(crate) fn path(&self, from: usize, to: usize) -> Option<Vec<usize>> {
        astar(&self.containment, from, |node| node == to, |_| 1_usize, |_| 0_usize)
            .map(|(_, path)| path)
    }

    /// The name of the role this graph was compiled from.
    #[must_use]
    pub fn role(&self) -> &str {
        &self.role
    }

    /// Checks whether an instance with this identity is present.
    #[must_use]
    pub fn contains(&self, id: &ComponentId) -> bool {
        self.index.contains_key(id)
    }

    /// Returns the instance with this identity.
    #[must_use]
    pub fn get(&self, id: &ComponentId) -> Option<&Instance> {
        self.index.get(id).map(|&position| &self.instances[position])
    }

    /// Iterates over instances in first-occurrence order.
    pub fn instances(&self) -> impl ExactSizeIterator<Item = &Instance> {
        self.instances.iter()
    }

    /// Iterates over instance identities in first-occurrence order.
    pub fn ids(&self) -> impl Iterator<Item = &ComponentId> {
        self.instances.iter().map(|instance| &instance.id)
    }

    /// Returns the number of instances.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// Returns `true` if the role compiled to nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Instances directly contained by `id`, in first-occurrence order.
    #[must_use]
    pub fn children(&self, id: &ComponentId) -> Vec<&Instance> {
        self.neighbours(id, Direction::Outgoing)
    }

    /// Instances that directly contain `id`, in first-occurrence order.
    #[must_use]
    pub fn containers(&self, id: &ComponentId) -> Vec<&Instance> {
        self.neighbours(id, Direction::Incoming)
    }

    /// Checks whether `descendant` is reachable from `ancestor` through one
    /// or more containment edges.
    #[must_use]
    pub fn contains_transitively(&self, ancestor: &ComponentId, descendant: &ComponentId) -> bool {
        let (Some(&from), Some(&to)) = (self.index.get(ancestor), self.index.get(descendant))
        else {
            return false;
        };
        from != to && has_path_connecting(&self.containment, from, to, None)
    }

    fn neighbours(&self, id: &ComponentId, direction: Direction) -> Vec<&Instance> {
        let Some(&position) = self.index.get(id) else {
            return Vec::new();
        };

        let mut positions: Vec<usize> = self
            .containment
            .neighbors_directed(position, direction)
            .collect();
        positions.sort_unstable();
        positions
            .into_iter()
            .map(|position| &self.instances[position])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn id(s: &str) -> ComponentId {
        s.parse().unwrap()
    }

    fn top(entry: usize) -> Provenance {
        Provenance {
            entry,
            parent: None,
        }
    }

    #[test]
    fn keeps_first_occurrence_order() {
        let mut graph = CompositionGraph::new("role::test");
        let empty = Params::new();

        graph.merge(&id("profile::b"), &empty, &empty, top(0));
        graph.merge(&id("profile::a"), &empty, &empty, top(1));
        graph.merge(&id("profile::b"), &empty, &empty, top(2));

        let ids: Vec<_> = graph.ids().map(ComponentId::as_str).collect();
        assert_eq!(ids, ["profile::b", "profile::a"]);
        assert_eq!(graph.get(&id("profile::b")).unwrap().provenance, top(0));
    }

    #[test]
    fn merge_layers_overrides_on_defaults() {
        let mut graph = CompositionGraph::new("role::test");
        let defaults = Params::new().with("replicas", 1).with("image", "dd:6");

        let first = graph.merge(
            &id("profile::datadog"),
            &defaults,
            &Params::new().with("image", "dd:7"),
            top(0),
        );
        let second = graph.merge(
            &id("profile::datadog"),
            &defaults,
            &Params::new().with("replicas", 3),
            top(1),
        );

        let third = graph.merge(
            &id("profile::datadog"),
            &defaults,
            &Params::new().with("replicas", 3),
            top(2),
        );

        assert_eq!(first, Merged::Inserted(0));
        assert_eq!(second, Merged::Updated(0));
        assert_eq!(third, Merged::Unchanged(0));

        let params = &graph.get(&id("profile::datadog")).unwrap().params;
        assert_eq!(params.get("image"), Some(&json!("dd:7")));
        assert_eq!(params.get("replicas"), Some(&json!(3)));
    }

    #[test]
    fn tracks_containment() {
        let mut graph = CompositionGraph::new("role::test");
        let empty = Params::new();

        let base = graph.merge(&id("profile::base"), &empty, &empty, top(0)).position();
        let ntp = graph
            .merge(
                &id("profile::ntp"),
                &empty,
                &empty,
                Provenance {
                    entry: 0,
                    parent: Some(id("profile::base")),
                },
            )
            .position();
        let chrony = graph
            .merge(
                &id("profile::chrony"),
                &empty,
                &empty,
                Provenance {
                    entry: 0,
                    parent: Some(id("profile::ntp")),
                },
            )
            .position();
        graph.link(base, ntp);
        graph.link(ntp, chrony);
        graph.link(base, ntp);

        let children: Vec<_> = graph
            .children(&id("profile::base"))
            .iter()
            .map(|i| i.id.as_str())
            .collect();
        assert_eq!(children, ["profile::ntp"]);

        let containers: Vec<_> = graph
            .containers(&id("profile::chrony"))
            .iter()
            .map(|i| i.id.as_str())
            .collect();
        assert_eq!(containers, ["profile::ntp"]);

        assert_eq!(graph.path(base, chrony), Some(vec![base, ntp, chrony]));
        assert_eq!(graph.path(chrony, base), None);
        assert_eq!(graph.id_at(ntp), &id("profile::ntp"));

        assert!(graph.contains_transitively(&id("profile::base"), &id("profile::chrony")));
        assert!(!graph.contains_transitively(&id("profile::chrony"), &id("profile::base")));
        assert!(!graph.contains_transitively(&id("profile::base"), &id("profile::base")));
        assert!(!graph.contains_transitively(&id("profile::base"), &id("profile::missing")));
    }

    #[test]
    fn unknown_identity_has_no_relations() {
        let graph = CompositionGraph::new("role::empty");
        assert!(graph.is_empty());
        assert!(graph.children(&id("profile::a")).is_empty());
        assert!(graph.containers(&id("profile::a")).is_empty());
        assert!(!graph.contains(&id("profile::a")));
    }
}
