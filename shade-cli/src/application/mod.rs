pub mod handlers;

use crate::presentation::cli::{Cli, Commands};
use clap::Parser;
use shade_core::error::Result;

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::new().parse_filters(&cli.log_level).init();

    log::debug!("parsed shared args: {:?}", cli.shared);

    match cli.command {
        Commands::Build { package, output } => handlers::handle_build(&cli.shared, &package, output.as_deref()),
        Commands::Test { package } => handlers::handle_test(&cli.shared, &package),
        Commands::Run { package, args } => handlers::handle_run(&cli.shared, &package, &args),
        Commands::Reverse { package, input } => handlers::handle_reverse(&cli.shared, &package, input.as_deref()),
    }
}
