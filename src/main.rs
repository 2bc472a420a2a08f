use clap::Parser;
use log::info;
use std::io;

use chess_referee::cli::{seat_identity, Cli, Command};
use chess_referee::config::load_config;
use chess_referee::models::Seats;
use chess_referee::{play, server};

#[actix_web::main]
async fn main() -> io::Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let cli = Cli::parse();
    let mut config =
        load_config(&cli.config).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    info!("Loaded config from {}", cli.config.display());

    match cli.command.unwrap_or(Command::Serve { bind: None }) {
        Command::Serve { bind } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            server::serve(config).await
        }
        Command::Play {
            white_provider,
            white_model,
            black_provider,
            black_model,
            max_plies,
            retry_budget,
            clock_secs,
        } => {
            if let Some(max_plies) = max_plies {
                config.game.max_plies = max_plies;
            }
            if let Some(retry_budget) = retry_budget {
                config.game.retry_budget = retry_budget;
            }
            if let Some(clock_secs) = clock_secs {
                config.game.initial_clock_secs = clock_secs;
            }
            config
                .validate()
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;

            let seats = Seats {
                white: seat_identity(
                    white_provider.as_deref(),
                    white_model.as_deref(),
                    &config.seats.white,
                ),
                black: seat_identity(
                    black_provider.as_deref(),
                    black_model.as_deref(),
                    &config.seats.black,
                ),
            };
            let session = config.session_config(seats);
            let record = play::run(&config, session)
                .await
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            println!("{}", play::summary(&record));
            Ok(())
        }
    }
}
