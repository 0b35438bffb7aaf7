use clap::Parser;
use poly_deribit_link::cli::{Cli, Commands, DiscoverArgs};
use poly_deribit_link::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: Could not load config from {}: {}", cli.config, e);
            eprintln!("Using default configuration");
            Config::example()?
        }
    }
    .with_env();
    config.validate()?;

    let _telemetry = poly_deribit_link::telemetry::init_telemetry(&config.telemetry)?;

    match cli.command.unwrap_or(Commands::Discover(DiscoverArgs::default())) {
        Commands::Link(args) => {
            tracing::info!(slug = %args.slug, "Starting single pair mode");
            args.execute(&config).await?;
        }
        Commands::Discover(args) => {
            tracing::info!("Starting discovery mode");
            args.execute(&config).await?;
        }
        Commands::Match(args) => {
            args.execute(&config).await?;
        }
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config.redacted())?);
        }
    }

    Ok(())
}
