use clap::Parser;
use rolecheck::Manifest;
use tracing::instrument;

use super::terminal::Colorize;

#[derive(Debug, Parser)]
#[command(about = "List registered components and defined roles")]
pub struct List {
    /// Only list components within this namespace (e.g. `profile::kubernetes`)
    #[arg(long, value_name = "NAMESPACE")]
    namespace: Option<rolecheck::ComponentId>,
}

impl List {
    #[instrument(level = "debug", skip(manifest))]
    pub fn run(self, manifest: &Manifest) -> anyhow::Result<()> {
        let registry = manifest.registry()?;

        println!("{}", "Components".dim());
        for definition in registry.iter() {
            let outside = self
                .namespace
                .as_ref()
                .is_some_and(|namespace| !definition.id().is_within(namespace));
            if outside {
                continue;
            }

            let defaults = definition.defaults().len();
            if defaults == 0 {
                println!("  {}", definition.id());
            } else {
                println!(
                    "  {} {}",
                    definition.id(),
                    format!("({defaults} defaults)").dim()
                );
            }
        }

        println!("\n{}", "Roles".dim());
        for name in manifest.role_names() {
            println!("  {name}");
        }

        Ok(())
    }
}
