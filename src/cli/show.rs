use clap::Parser;
use rolecheck::{CompositionGraph, Manifest, compile};
use tracing::instrument;

use super::terminal::Colorize;

#[derive(Debug, Parser)]
#[command(about = "Display the compiled composition of a role")]
pub struct Show {
    /// The name of the role to compile
    role: String,

    /// Output format
    #[arg(long, value_name = "FORMAT", default_value = "pretty")]
    output: OutputFormat,
}

#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Pretty,
    Json,
}

impl Show {
    #[instrument(level = "debug", skip(manifest))]
    pub fn run(self, manifest: &Manifest) -> anyhow::Result<()> {
        let Some(role) = manifest.role(&self.role) else {
            eprintln!("Role {} not found", self.role);
            std::process::exit(1);
        };

        let registry = manifest.registry()?;
        let graph = compile(&registry, &role)?;

        match self.output {
            OutputFormat::Pretty => Self::output_pretty(&graph),
            OutputFormat::Json => Self::output_json(&graph)?,
        }

        Ok(())
    }

    fn output_pretty(graph: &CompositionGraph) {
        println!("# {}", graph.role());
        println!("{}\n", format!("{} components", graph.len()).dim());

        for instance in graph.instances() {
            let depth = ancestry_depth(graph, instance);
            let indent = "  ".repeat(depth);
            println!("{indent}{}", instance.id.as_str().info());

            for (key, value) in &instance.params {
                println!("{indent}  {} = {value}", key.dim());
            }
        }
    }

    fn output_json(graph: &CompositionGraph) -> anyhow::Result<()> {
        let instances: Vec<_> = graph.instances().collect();
        let output = serde_json::json!({
            "role": graph.role(),
            "instances": instances,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        Ok(())
    }
}

/// Number of containers between an instance and the role, following the
/// container that first introduced it.
fn ancestry_depth(graph: &CompositionGraph, instance: &rolecheck::domain::Instance) -> usize {
    let mut depth = 0;
    let mut parent = instance.provenance.parent.as_ref();
    while let Some(id) = parent {
        depth += 1;
        parent = graph
            .get(id)
            .and_then(|container| container.provenance.parent.as_ref());
    }
    depth
}
