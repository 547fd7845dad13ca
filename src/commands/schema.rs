//! `nimbus schema` — emits the JSON Schema for the run configuration, so
//! external tooling (editors, values-file generators) can validate a
//! values file before handing it to `--values`.

use crate::cli::SchemaArgs;
use crate::config::RunConfig;
use anyhow::{Context, Result};
use schemars::schema_for;

pub fn run(args: SchemaArgs) -> Result<()> {
    let schema = schema_for!(RunConfig);
    let json = serde_json::to_string_pretty(&schema).context("serializing RunConfig schema")?;

    match args.output {
        Some(path) => {
            std::fs::write(&path, json)
                .with_context(|| format!("writing schema to {}", path.display()))?;
            println!("wrote schema to {}", path.display());
        }
        None => println!("{json}"),
    }

    Ok(())
}
