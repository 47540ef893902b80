//! Starcode simulator
//!
//! Entry point for the scheduling simulator. Parses CLI arguments, installs
//! logging and runs the requested number of ticks.

use clap::Parser as ClapParser;
use sim_cli::{Cli, Simulation};
use tracing_subscriber::EnvFilter;

fn install_subscriber() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .init();
}

fn main() {
    let cli = Cli::parse();
    install_subscriber();

    let mut simulation = match Simulation::new(&cli) {
        Ok(simulation) => simulation,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let verbose = cli.verbose;
    let result = simulation.run(cli.ticks, |tick| {
        if verbose {
            println!(
                "tick {:>4}: {} rounds, {} interrupted, {:.1} ms",
                tick.tick,
                tick.rounds.len(),
                tick.interrupted().count(),
                tick.elapsed.as_secs_f64() * 1000.0
            );
        }
    });

    match result {
        Ok(summary) => {
            println!("ticks:         {}", summary.ticks);
            println!("rounds:        {}", summary.rounds);
            println!("interrupted:   {}", summary.interrupted);
            println!("script errors: {}", summary.script_errors);
            println!(
                "slowest tick:  {:.1} ms",
                summary.slowest_tick.as_secs_f64() * 1000.0
            );
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
