//! Drives expectation checks against compiled roles.
//!
//! Containment failures are ordinary values ([`Outcome::Fail`]) so that many
//! checks can be aggregated into one [`Report`]. Structural problems with the
//! configuration model ([`CompileError`]) are reported separately and are
//! never folded into a containment failure.

use std::fmt;

use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use serde::Serialize;
use tracing::instrument;

use crate::domain::{
    CompositionGraph, Role,
    compiler::{CompileError, compile},
    registry::{Registry, Sealed},
    verify::{ExpectationSet, VerificationResult, verify},
};

/// A failed containment check, naming every expectation that did not hold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainmentFailure {
    /// The role that was checked.
    pub role: String,
    /// What was missing, mismatched or unexpectedly present.
    #[serde(flatten)]
    pub result: VerificationResult,
}

impl fmt::Display for ContainmentFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "role {} failed {} expectation(s)",
            self.role,
            self.result.failure_count()
        )?;
        for id in &self.result.missing {
            write!(f, "\n  missing: {id}")?;
        }
        for mismatch in &self.result.mismatched {
            let actual = mismatch
                .actual
                .as_ref()
                .map_or_else(|| "is unset".to_string(), |actual| format!("= {actual}"));
            write!(
                f,
                "\n  mismatched: {} {} {actual} (expected {})",
                mismatch.id, mismatch.key, mismatch.expected
            )?;
        }
        for id in &self.result.unexpected {
            write!(f, "\n  unexpected: {id}")?;
        }
        Ok(())
    }
}

/// The result of one containment check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome {
    /// Every expectation held.
    Pass,
    /// At least one expectation did not hold.
    Fail(ContainmentFailure),
}

impl Outcome {
    /// Returns `true` for [`Outcome::Pass`].
    #[must_use]
    pub const fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }

    fn from_result(role: &str, result: VerificationResult) -> Self {
        if result.is_success() {
            Self::Pass
        } else {
            Self::Fail(ContainmentFailure {
                role: role.to_string(),
                result,
            })
        }
    }
}

/// A role compiled once, ready for any number of checks.
#[derive(Debug, Clone)]
pub struct CompiledRole {
    graph: CompositionGraph,
}

impl CompiledRole {
    /// Checks one expectation set against the compiled role.
    #[must_use]
    pub fn check(&self, expectations: &ExpectationSet) -> Outcome {
        Outcome::from_result(self.graph.role(), verify(&self.graph, expectations))
    }

    /// The compiled graph.
    #[must_use]
    pub const fn graph(&self) -> &CompositionGraph {
        &self.graph
    }

    /// Consumes the compiled role, returning its graph.
    #[must_use]
    pub fn into_graph(self) -> CompositionGraph {
        self.graph
    }
}

/// A role together with the expectations to check against it.
#[derive(Debug, Clone)]
pub struct Suite {
    /// The role to compile.
    pub role: Role,
    /// The expectations to verify.
    pub expectations: ExpectationSet,
}

/// How a suite ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Every expectation held.
    Passed,
    /// The role compiled but some expectations did not hold.
    Failed(ContainmentFailure),
    /// The role could not be compiled.
    Errored(CompileError),
}

impl From<Result<Outcome, CompileError>> for Verdict {
    fn from(result: Result<Outcome, CompileError>) -> Self {
        match result {
            Ok(Outcome::Pass) => Self::Passed,
            Ok(Outcome::Fail(failure)) => Self::Failed(failure),
            Err(error) => Self::Errored(error),
        }
    }
}

/// The verdict for one suite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuiteReport {
    /// Name of the role the suite checked.
    pub role: String,
    /// Number of expectations in the suite.
    pub expectations: usize,
    /// How the suite ended.
    pub verdict: Verdict,
}

/// Aggregated verdicts, in the order the suites were given.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    /// One entry per suite.
    pub suites: Vec<SuiteReport>,
}

impl Report {
    /// Number of suites whose expectations all held.
    #[must_use]
    pub fn passed(&self) -> usize {
        self.count(|verdict| matches!(verdict, Verdict::Passed))
    }

    /// Number of suites with containment failures.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(|verdict| matches!(verdict, Verdict::Failed(_)))
    }

    /// Number of suites whose role failed to compile.
    #[must_use]
    pub fn errored(&self) -> usize {
        self.count(|verdict| matches!(verdict, Verdict::Errored(_)))
    }

    /// Returns `true` if every suite passed.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.passed() == self.suites.len()
    }

    fn count(&self, predicate: impl Fn(&Verdict) -> bool) -> usize {
        self.suites
            .iter()
            .filter(|suite| predicate(&suite.verdict))
            .count()
    }
}

/// Runs containment checks against a sealed registry.
#[derive(Debug, Clone)]
pub struct Harness<'r> {
    registry: &'r Registry<Sealed>,
}

impl<'r> Harness<'r> {
    /// Creates a harness over a fully populated registry.
    #[must_use]
    pub const fn new(registry: &'r Registry<Sealed>) -> Self {
        Self { registry }
    }

    /// Compiles a role once so that several expectation sets can be checked
    /// against it.
    ///
    /// # Errors
    ///
    /// Propagates any [`CompileError`] unchanged.
    pub fn compile(&self, role: &Role) -> Result<CompiledRole, CompileError> {
        compile(self.registry, role).map(|graph| CompiledRole { graph })
    }

    /// Compiles `role` exactly once and verifies `expectations` against it.
    ///
    /// # Errors
    ///
    /// Returns a [`CompileError`] if the role cannot be compiled. Failed
    /// expectations are not errors; they are returned as [`Outcome::Fail`].
    #[instrument(level = "debug", skip_all, fields(role = role.name()))]
    pub fn check(&self, role: &Role, expectations: &ExpectationSet) -> Result<Outcome, CompileError> {
        Ok(self.compile(role)?.check(expectations))
    }

    /// Runs independent suites in parallel.
    ///
    /// The registry is only read, so suites share it without locking. The
    /// report lists suites in the order they were given.
    #[instrument(level = "debug", skip_all, fields(suites = suites.len()))]
    pub fn run(&self, suites: &[Suite]) -> Report {
        let suites = suites
            .par_iter()
            .map(|suite| SuiteReport {
                role: suite.role.name().to_string(),
                expectations: suite.expectations.len(),
                verdict: self.check(&suite.role, &suite.expectations).into(),
            })
            .collect();

        let report = Report { suites };
        tracing::info!(
            passed = report.passed(),
            failed = report.failed(),
            errored = report.errored(),
            "checks complete"
        );
        report
    }
}
