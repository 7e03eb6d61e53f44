//! Expands a [`Role`] into a [`CompositionGraph`].
//!
//! Entries are expanded depth-first in declaration order, so a component
//! always precedes the components it contains and the graph's instance order
//! is the order in which each identity was first reached.

use std::collections::HashSet;

use nonempty::NonEmpty;
use thiserror::Error;
use tracing::instrument;

use crate::domain::{
    ComponentId, ComponentRef, CompositionGraph, Params, Role,
    graph::{Merged, Provenance},
    registry::{ExpansionRule, MergePolicy, Registry, Sealed},
};

/// Structural errors that abort compilation.
///
/// These indicate a broken configuration model rather than a failed
/// expectation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// A reference names a component that was never registered.
    #[error("unknown component {id}{}", referenced_by_suffix(.referenced_by.as_ref()))]
    UnknownComponent {
        /// The unregistered identity.
        id: ComponentId,
        /// The component whose expansion produced the reference, or `None`
        /// if the role referenced it directly.
        referenced_by: Option<ComponentId>,
    },

    /// A component's expansion leads back to itself.
    #[error("composition cycle: {}", join(.cycle))]
    Cycle {
        /// The expansion path, starting and ending with the repeated
        /// identity.
        cycle: NonEmpty<ComponentId>,
    },

    /// Under [`MergePolicy::Strict`], two references to the same component
    /// assigned different values to the same parameter.
    #[error("conflicting values for parameter '{key}' of {id}")]
    ConflictingParameters {
        /// The component declared twice.
        id: ComponentId,
        /// The parameter with conflicting values.
        key: String,
    },
}

fn referenced_by_suffix(referenced_by: Option<&ComponentId>) -> String {
    referenced_by.map_or_else(String::new, |parent| format!(" (referenced by {parent})"))
}

fn join(cycle: &NonEmpty<ComponentId>) -> String {
    cycle
        .iter()
        .map(ComponentId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Compiles a role against a sealed registry.
///
/// The registry is only read, so any number of compilations may share it.
/// Given the same registry and role the result is always identical.
///
/// Each component is expanded when it is first reached. A repeated
/// reference is merged and linked, but only expanded again if the component
/// has a [`ExpansionRule::Dynamic`] rule and the reference changed its
/// effective parameters; any other rule would yield the same children as
/// last time. Expansion uses an explicit work stack, so nesting depth is
/// bounded by memory rather than the call stack.
///
/// # Errors
///
/// - [`CompileError::UnknownComponent`] if any reference, direct or produced
///   by an expansion, is not registered
/// - [`CompileError::Cycle`] if a component transitively contains itself
/// - [`CompileError::ConflictingParameters`] if the registry's merge policy
///   is [`MergePolicy::Strict`] and two references disagree on a parameter
#[instrument(level = "debug", skip_all, fields(role = role.name()))]
pub fn compile(registry: &Registry<Sealed>, role: &Role) -> Result<CompositionGraph, CompileError> {
    let mut compiler = Compiler {
        registry,
        graph: CompositionGraph::new(role.name()),
        assigned: Vec::new(),
        stack: Vec::new(),
        open: HashSet::new(),
    };

    for (entry, reference) in role.entries().iter().enumerate() {
        compiler.expand_entry(reference, entry)?;
    }

    tracing::debug!(instances = compiler.graph.len(), "compiled role");
    Ok(compiler.graph)
}

/// Pending work for one role entry.
enum Task {
    /// Resolve, merge and expand a reference.
    Visit(ComponentRef),
    /// Every child of the innermost open component has been visited.
    Leave,
}

struct Compiler<'r> {
    registry: &'r Registry<Sealed>,

    graph: CompositionGraph,

    /// Explicit overrides applied to each instance so far, by position.
    /// Defaults are excluded; only these count as conflicts under
    /// [`MergePolicy::Strict`].
    assigned: Vec<Params>,

    /// The chain of components currently being expanded, with their
    /// positions in the graph.
    stack: Vec<(ComponentId, usize)>,

    /// Identities on `stack`.
    open: HashSet<ComponentId>,
}

impl Compiler<'_> {
    fn expand_entry(&mut self, reference: &ComponentRef, entry: usize) -> Result<(), CompileError> {
        let mut tasks = vec![Task::Visit(reference.clone())];

        while let Some(task) = tasks.pop() {
            match task {
                Task::Visit(reference) => {
                    let children = self.visit(&reference, entry)?;
                    if !children.is_empty() {
                        tasks.push(Task::Leave);
                        tasks.extend(children.into_iter().rev().map(Task::Visit));
                    }
                }
                Task::Leave => {
                    if let Some((id, _)) = self.stack.pop() {
                        self.open.remove(&id);
                    }
                }
            }
        }

        Ok(())
    }

    /// Merges one reference into the graph and returns the children still to
    /// be visited. When there are any, the reference is left open on the
    /// expansion stack until its [`Task::Leave`].
    fn visit(
        &mut self,
        reference: &ComponentRef,
        entry: usize,
    ) -> Result<Vec<ComponentRef>, CompileError> {
        self.check_cycle(&reference.id)?;

        let registry = self.registry;
        let parent = self.stack.last().cloned();
        let definition = registry.get(&reference.id).ok_or_else(|| {
            CompileError::UnknownComponent {
                id: reference.id.clone(),
                referenced_by: parent.as_ref().map(|(id, _)| id.clone()),
            }
        })?;

        if registry.merge_policy() == MergePolicy::Strict {
            self.check_conflict(reference)?;
        }

        let provenance = Provenance {
            entry,
            parent: parent.as_ref().map(|(id, _)| id.clone()),
        };
        let merged = self.graph.merge(
            &reference.id,
            definition.defaults(),
            &reference.params,
            provenance,
        );
        match merged {
            Merged::Inserted(_) => self.assigned.push(reference.params.clone()),
            Merged::Updated(position) | Merged::Unchanged(position) => {
                self.assigned[position].merge(&reference.params);
            }
        }
        let position = merged.position();
        let expand = match merged {
            Merged::Inserted(_) => true,
            Merged::Updated(_) => matches!(definition.rule(), ExpansionRule::Dynamic(_)),
            Merged::Unchanged(_) => false,
        };

        if let Some((_, container)) = parent {
            if !expand {
                self.check_closed_loop(position, container)?;
            }
            self.graph.link(container, position);
        }

        if !expand {
            tracing::trace!(id = %reference.id, "already expanded");
            return Ok(Vec::new());
        }

        let children = definition.rule().expand(self.graph.params_at(position));
        if !children.is_empty() {
            self.stack.push((reference.id.clone(), position));
            self.open.insert(reference.id.clone());
        }
        Ok(children)
    }

    fn check_cycle(&self, id: &ComponentId) -> Result<(), CompileError> {
        if !self.open.contains(id) {
            return Ok(());
        }
        let Some(start) = self.stack.iter().position(|(open, _)| open == id) else {
            return Ok(());
        };

        let mut cycle = NonEmpty::new(id.clone());
        for (open, _) in &self.stack[start + 1..] {
            cycle.push(open.clone());
        }
        cycle.push(id.clone());

        tracing::debug!(%id, depth = self.stack.len(), "composition cycle detected");
        Err(CompileError::Cycle { cycle })
    }

    /// An instance that is not expanded again still closes a cycle if its
    /// earlier expansion reaches the container it is being linked under.
    fn check_closed_loop(&self, position: usize, container: usize) -> Result<(), CompileError> {
        let Some(path) = self.graph.path(position, container) else {
            return Ok(());
        };

        let id = self.graph.id_at(position);
        let mut cycle = NonEmpty::new(id.clone());
        for &step in &path[1..] {
            cycle.push(self.graph.id_at(step).clone());
        }
        cycle.push(id.clone());

        tracing::debug!(%id, "composition cycle detected through an expanded instance");
        Err(CompileError::Cycle { cycle })
    }

    fn check_conflict(&self, reference: &ComponentRef) -> Result<(), CompileError> {
        let Some(position) = self.graph.position_of(&reference.id) else {
            return Ok(());
        };

        self.assigned[position]
            .conflict_with(&reference.params)
            .map_or(Ok(()), |key| {
                Err(CompileError::ConflictingParameters {
                    id: reference.id.clone(),
                    key: key.to_string(),
                })
            })
    }
}
