//! Polity CLI entry point.

use clap::Parser;

use polity::cli::{commands, Cli, Commands};
use polity::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let json = cli.json;

    if let Err(err) = run(cli).await {
        polity::cli::handle_error(err, json);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = polity::cli::load_config(&cli)?;
    let _logger = LoggerImpl::init(&LogConfig::from(&config.logging))?;

    match cli.command {
        Commands::Context { game, refresh } => {
            commands::context::execute(config, game, refresh, cli.json).await
        }
        Commands::Whoami { game, user } => {
            commands::identity::whoami(config, game, user, cli.json).await
        }
        Commands::Repair { game, user, actor } => {
            commands::identity::repair(config, game, user, actor, cli.json).await
        }
        Commands::Join {
            game,
            user,
            card,
            name,
        } => commands::identity::join(config, game, user, card, name, cli.json).await,
        Commands::Watch { game, seconds } => {
            commands::watch::execute(config, game, seconds, cli.json).await
        }
        Commands::Config => commands::config::execute(config, cli.json),
    }
}
