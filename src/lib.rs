//! Role composition and containment verification
//!
//! A role is an ordered list of component references. Compiling it against a
//! registry of component definitions yields a composition graph, which can
//! then be checked for the presence (or absence) of expected components.
//!
//! ```
//! use rolecheck::{ExpectationSet, Harness, Outcome, Registry, Role};
//!
//! let mut registry = Registry::new();
//! registry.register_leaf("profile::kubernetes::resources::datadog".parse()?)?;
//! registry.register_leaf("profile::kubernetes::resources::fluentd".parse()?)?;
//! let registry = registry.seal();
//!
//! let role = Role::new("role::kubernetes")
//!     .include("profile::kubernetes::resources::datadog".parse()?);
//! let expectations = ExpectationSet::from_ids([
//!     "profile::kubernetes::resources::datadog",
//!     "profile::kubernetes::resources::fluentd",
//! ])?;
//!
//! let Outcome::Fail(failure) = Harness::new(&registry).check(&role, &expectations)? else {
//!     panic!("fluentd is not part of the role");
//! };
//! assert_eq!(failure.result.missing.len(), 1);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod domain;
pub use domain::{
    CompileError, ComponentDefinition, ComponentId, ComponentRef, CompositionGraph,
    ExpansionRule, Expectation, ExpectationSet, Harness, MergePolicy, Outcome, Params, Registry,
    RegistryError, Role, VerificationResult, compile, verify,
};

/// Loading components, roles and checks from manifest files.
pub mod storage;
pub use storage::{Manifest, ManifestError};
