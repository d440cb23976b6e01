use buildprov::{
    cli::{self, commands::ProvenanceCommands},
    error::Result,
};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provenance attestation commands
    Provenance {
        #[command(subcommand)]
        command: ProvenanceCommands,
    },
}

fn main() -> Result<()> {
    // Initialize logging
    buildprov::init_logging()?;

    // Parse command line arguments
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Provenance { command } => cli::handlers::handle_provenance_command(command),
    };

    // Format and display any errors
    if let Err(ref e) = result {
        eprintln!("{}", cli::format_error(e));
    }

    result
}
