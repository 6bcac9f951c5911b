//! CLI entry point.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use whistlectl_cli::{Cli, Commands, StartArgs, handlers};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env before the environment snapshot is taken
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.default_log_level()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let binary = cli.binary.as_deref();

    match cli.command {
        Commands::Start {
            instance,
            port,
            no_clear_port,
            launch_timeout,
            health_timeout,
        } => {
            let args = StartArgs {
                instance,
                port,
                no_clear_port,
                launch_timeout,
                health_timeout,
            };
            handlers::start::execute(binary, args).await?;
        }
        Commands::Stop { port } => handlers::stop::execute(binary, port).await?,
        Commands::StopAll => handlers::stop::execute_all(binary).await?,
        Commands::Status { port, timeout } => handlers::status::execute(binary, port, timeout).await?,
        Commands::GenConfig { rules } => {
            handlers::rules::gen_config(&rules)?;
        }
        Commands::SetRules {
            target,
            rules,
            force,
        } => handlers::rules::set_rules(binary, &target, &rules, force).await?,
        Commands::Install {
            file,
            target,
            force,
        } => handlers::rules::install(binary, &file, &target, force).await?,
    }

    Ok(())
}
