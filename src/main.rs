use clap::Parser;
use tracing_subscriber::EnvFilter;

use ace_assembly::cli;

fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    // Initialize logging based on verbosity flag
    let filter = if cli.verbose {
        EnvFilter::new("ace_assembly=debug,info")
    } else {
        EnvFilter::new("ace_assembly=warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let config = cli::load_config(cli.config.as_deref())?;

    match cli.command {
        cli::Commands::Stats(args) => {
            cli::stats::run(args, cli.format, &config, cli.verbose)?;
        }
        cli::Commands::Extract(args) => {
            cli::extract::run(args, cli.format, &config, cli.verbose)?;
        }
        cli::Commands::Rewrite(args) => {
            cli::rewrite::run(args, cli.format, &config, cli.verbose)?;
        }
    }

    Ok(())
}
