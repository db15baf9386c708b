//! roomboard service entry point.

use std::process::ExitCode;

use clap::Parser;
use roomboard_core::{LogFormat, TracingConfig, init_tracing};
use tracing::{Level, error};

use roomboard_server::cli::{Cli, Command, ConfigAction};
use roomboard_server::{ServerResult, ServiceConfig, SignalHandler, Sources, build_cache, serve};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let format = if cli.log_json {
        LogFormat::Json
    } else {
        LogFormat::Text
    };
    let mut tracing = TracingConfig::new(format);
    if cli.debug {
        tracing = tracing.with_level(Level::DEBUG);
    }
    if let Err(e) = init_tracing(tracing) {
        eprintln!("warning: {e}");
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "roomboard failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> ServerResult<()> {
    let mut config = match &cli.config {
        Some(path) => ServiceConfig::load_from(path)?,
        None => ServiceConfig::default(),
    };
    cli.apply(&mut config);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            config.validate()?;
            let signals = SignalHandler::new();
            signals.spawn_listener();
            serve(config, signals.shutdown()).await
        }
        Command::Status => {
            config.validate()?;
            let cache = build_cache(&config, Sources::from_config(&config)?);
            let payload = cache.status().await?;
            println!("{}", serde_json::to_string_pretty(&payload)?);
            Ok(())
        }
        Command::Config { action } => match action {
            ConfigAction::Dump => {
                let text = toml::to_string_pretty(&config.redacted())
                    .map_err(|e| roomboard_server::ServerError::config(e.to_string()))?;
                print!("{text}");
                Ok(())
            }
            ConfigAction::Validate => {
                config.validate()?;
                println!("configuration is valid");
                Ok(())
            }
        },
    }
}
