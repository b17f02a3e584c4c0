use parser::{Cli, Commands::*};

use std::error::Error;

#[macro_use]
extern crate log;

/// Dispatch a parsed command line onto the matching module runner.
pub fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    match cli.commands {
        Infer { common, infer: args } => {
            info!("Loading reference data...");
            inference::run(&common, &args)?;
        }

        Validate { common, validate: args } => {
            info!("Loading reference data...");
            inference::validate(&common, &args)?;
        }

        BuildAims { common, build } => {
            aim_build::run(&common, &build)?;
        }

        FromYaml { yaml } => {
            let cli: Cli = match Cli::deserialize(&yaml) {
                Ok(cli) => cli,
                Err(e) => return Err(format!("Unable to deserialize arguments from {yaml:?} file: [{e}]").into()),
            };
            self::run(cli)?;
        }
    };
    Ok(())
}
