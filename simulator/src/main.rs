use clap::Parser;
use log::LevelFilter;
use spsim_common::{read_toml, TomlParameters};
use spsim_simulator::simulation_object::*;
use std::error::Error;
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser)]
pub struct CommandLineArguments {
    #[arg(long, short)]
    toml: String,
    #[arg(long, short)]
    verbose: bool,
    /// Only validate the configuration and build the simulation
    #[arg(long)]
    test: bool,
    /// Root directory for simulation output
    #[arg(long, short, default_value = "sim-data")]
    output: PathBuf,
}

fn main() -> Result<(), Box<dyn Error>> {
    // Parse path to toml
    let args = CommandLineArguments::parse();

    let mut builder = env_logger::builder();
    builder.format_timestamp_secs();
    if args.verbose {
        builder.filter_level(LevelFilter::Info);
    }
    builder.init();

    // Start timer
    let now = Instant::now();

    let toml: TomlParameters = read_toml(&args.toml)?;
    let parameters = SimulationParameters::from_toml(toml)?;

    // New sim obj from toml
    let mut simulation_object = SimulationObject::new_from_params(parameters)?;

    if args.verbose {
        println!(
            "Working on simulation {}",
            simulation_object.parameters.sim_name
        );
        println!("Simulation Parameters\n{}", simulation_object.parameters);
    }

    if !args.test {
        simulation_object.run_to_completion()?;
        let dir = simulation_object.dump(&args.output)?;

        if args.verbose {
            println!(
                "Finished {} in {} seconds, output in {}",
                simulation_object.parameters.sim_name,
                now.elapsed().as_secs(),
                dir.display()
            );
        }
    }

    Ok(())
}
