mod cli;

use clap::Parser;
use cli::{Args, Command, ConfigAction};
use donation_celebrator::config::{Config, AIML_API_KEY_ENV};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Load .env file and check for AIMLAPI_KEY
///
/// Loads environment variables from .env file in the working directory.
/// Does not override existing environment variables.
fn load_env() {
    // dotenv::dotenv() returns Err if .env doesn't exist, which is fine
    let _ = dotenv::dotenv();

    if std::env::var(AIML_API_KEY_ENV).is_err() {
        eprintln!("Warning: {} environment variable not set.", AIML_API_KEY_ENV);
        eprintln!("         Video generation will be disabled.");
        eprintln!("         Set {} in .env or environment to enable.\n", AIML_API_KEY_ENV);
    }
}

/// Route `log` records from the library through a tracing fmt subscriber.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("donation_celebrator=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[tokio::main]
async fn main() {
    load_env();
    init_logging();

    let args = Args::parse();

    // `config init` must work even when the existing file is broken.
    if let Command::Config {
        action: ConfigAction::Init,
    } = args.command
    {
        if let Err(e) = cli::handle_config_action(ConfigAction::Init, args.config.as_deref(), None) {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
        return;
    }

    let config = match Config::load(args.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let result = match args.command {
        Command::Run {
            threshold,
            stats_interval,
        } => cli::run(&config, threshold, stats_interval).await,
        Command::Generate {
            amount,
            currency,
            username,
            message,
            prompt,
        } => cli::generate(&config, amount, currency, username, message, prompt).await,
        Command::Convert { amount, currency } => cli::convert(&config, amount, &currency).await,
        Command::Auth { action } => cli::handle_auth_action(&config, action).await,
        Command::TestConnection => cli::test_connection(&config).await,
        Command::Videos => {
            cli::list_videos(&config);
            Ok(())
        }
        Command::Config { action } => {
            cli::handle_config_action(action, args.config.as_deref(), Some(&config))
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
