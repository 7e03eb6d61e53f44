use clap::Parser;
use rolecheck::{
    Harness, Manifest,
    domain::{Report, Verdict},
};
use serde_json::json;
use tracing::instrument;

use super::terminal::Colorize;

#[derive(Debug, Default, Parser)]
#[command(about = "Verify that compiled roles contain their expected components")]
pub struct Check {
    /// Only run checks against this role (can be specified multiple times)
    #[arg(long, value_name = "ROLE")]
    role: Vec<String>,

    /// Output format
    #[arg(long, value_name = "FORMAT", default_value = "table")]
    output: OutputFormat,

    /// Suppress all output except failures
    #[arg(long, short)]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Table,
    Json,
    Summary,
}

impl Check {
    #[instrument(level = "debug", skip_all)]
    pub fn run(self, manifest: &Manifest) -> anyhow::Result<()> {
        let registry = manifest.registry()?;
        let suites = manifest.suites(&self.role)?;

        if suites.is_empty() {
            if !self.quiet {
                println!("{}", "No checks to run".dim());
            }
            return Ok(());
        }

        let report = Harness::new(&registry).run(&suites);

        match self.output {
            OutputFormat::Table => self.output_table(&report),
            OutputFormat::Json => Self::output_json(&report)?,
            OutputFormat::Summary => Self::output_summary(&report),
        }

        if !report.is_success() {
            std::process::exit(2);
        }

        Ok(())
    }

    fn output_table(&self, report: &Report) {
        for suite in &report.suites {
            match &suite.verdict {
                Verdict::Passed => {
                    if !self.quiet {
                        println!(
                            "{}",
                            format!("✓ {}  {} expectations", suite.role, suite.expectations)
                                .success()
                        );
                    }
                }
                Verdict::Failed(failure) => {
                    println!("{}", format!("✗ {}", suite.role).warning());
                    for id in &failure.result.missing {
                        println!("    missing     {id}");
                    }
                    for mismatch in &failure.result.mismatched {
                        let actual = mismatch
                            .actual
                            .as_ref()
                            .map_or_else(|| "unset".to_string(), ToString::to_string);
                        println!(
                            "    mismatched  {} {}: expected {}, found {actual}",
                            mismatch.id, mismatch.key, mismatch.expected
                        );
                    }
                    for id in &failure.result.unexpected {
                        println!("    unexpected  {id}");
                    }
                }
                Verdict::Errored(error) => {
                    println!("{}", format!("! {}", suite.role).warning());
                    println!("    error       {error}");
                }
            }
        }

        if self.quiet {
            return;
        }

        let summary = format!(
            "{} passed, {} failed, {} errored",
            report.passed(),
            report.failed(),
            report.errored()
        );
        if report.is_success() {
            println!("\n{}", summary.success());
        } else {
            println!("\n{}", summary.warning());
        }
    }

    fn output_json(report: &Report) -> anyhow::Result<()> {
        let suites: Vec<_> = report
            .suites
            .iter()
            .map(|suite| match &suite.verdict {
                Verdict::Passed => json!({
                    "role": suite.role,
                    "status": "passed",
                }),
                Verdict::Failed(failure) => json!({
                    "role": suite.role,
                    "status": "failed",
                    "missing": failure.result.missing,
                    "mismatched": failure.result.mismatched,
                    "unexpected": failure.result.unexpected,
                }),
                Verdict::Errored(error) => json!({
                    "role": suite.role,
                    "status": "errored",
                    "error": error.to_string(),
                }),
            })
            .collect();

        let output = json!({
            "status": if report.is_success() { "passed" } else { "failed" },
            "suites": suites,
            "summary": {
                "passed": report.passed(),
                "failed": report.failed(),
                "errored": report.errored(),
            }
        });

        println!("{}", serde_json::to_string_pretty(&output)?);
        Ok(())
    }

    fn output_summary(report: &Report) {
        println!(
            "passed={} failed={} errored={}",
            report.passed(),
            report.failed(),
            report.errored()
        );
    }
}
