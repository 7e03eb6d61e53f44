//! Domain models for role composition and containment verification.
//!
//! The pipeline runs leaves first: a [`Registry`] of component definitions
//! is populated and sealed, a [`Role`] is compiled against it into a
//! [`CompositionGraph`], and the graph is verified against an
//! [`ExpectationSet`], usually through a [`Harness`].

/// Component identity types and parsing.
pub mod component_id;
pub use component_id::ComponentId;

pub mod params;
pub use params::Params;

mod role;
pub use role::{ComponentRef, Role};

pub mod registry;
pub use registry::{ComponentDefinition, ExpansionRule, MergePolicy, Registry, RegistryError};

pub mod graph;
pub use graph::{CompositionGraph, Instance, Provenance};

pub mod compiler;
pub use compiler::{CompileError, compile};

pub mod verify;
pub use verify::{Expectation, ExpectationSet, ParamMismatch, VerificationResult, verify};

pub mod harness;
pub use harness::{
    CompiledRole, ContainmentFailure, Harness, Outcome, Report, Suite, SuiteReport, Verdict,
};
