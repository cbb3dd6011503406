//! CLI argument parsing with clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Polls DonationAlerts and turns big donations into AI celebration videos
#[derive(Parser, Debug)]
#[command(name = "donation-celebrator")]
#[command(version, about = "Donation-triggered celebration videos for streams", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Config file path
    #[arg(long, short, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Poll for donations until Ctrl+C
    Run {
        /// Override the donation threshold (reference currency)
        #[arg(long, short)]
        threshold: Option<f64>,

        /// Seconds between statistics log lines
        #[arg(long, default_value = "60")]
        stats_interval: u64,
    },
    /// Generate a single celebration video
    Generate {
        /// Donation amount
        #[arg(long, short)]
        amount: f64,

        /// Currency of the amount (default: reference currency)
        #[arg(long)]
        currency: Option<String>,

        /// Donor name
        #[arg(long, short, default_value = "Anonymous")]
        username: String,

        /// Donation message, used as the prompt when no --prompt is given
        #[arg(long, short, default_value = "")]
        message: String,

        /// Explicit prompt, overrides message and templates
        #[arg(long, short)]
        prompt: Option<String>,
    },
    /// Convert an amount into the reference currency
    Convert {
        amount: f64,
        currency: String,
    },
    /// DonationAlerts OAuth helpers
    Auth {
        #[command(subcommand)]
        action: AuthAction,
    },
    /// Fetch one page of donations to check the token
    TestConnection,
    /// List generated videos
    Videos,
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum AuthAction {
    /// Print the authorization URL
    Url,
    /// Exchange an authorization code for tokens
    Exchange { code: String },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Show current configuration
    Show,
    /// Create default config file
    Init,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_defaults() {
        let args = Args::parse_from(["donation-celebrator", "run"]);
        match args.command {
            Command::Run {
                threshold,
                stats_interval,
            } => {
                assert!(threshold.is_none());
                assert_eq!(stats_interval, 60);
            }
            other => panic!("Expected Run, got {:?}", other),
        }
        assert!(args.config.is_none());
    }

    #[test]
    fn test_run_threshold_override() {
        let args = Args::parse_from(["donation-celebrator", "run", "-t", "250"]);
        assert!(matches!(
            args.command,
            Command::Run { threshold: Some(t), .. } if t == 250.0
        ));
    }

    #[test]
    fn test_config_is_global() {
        let args = Args::parse_from(["donation-celebrator", "videos", "--config", "/tmp/c.toml"]);
        assert_eq!(args.config, Some(PathBuf::from("/tmp/c.toml")));

        let args = Args::parse_from(["donation-celebrator", "-c", "/tmp/d.toml", "test-connection"]);
        assert_eq!(args.config, Some(PathBuf::from("/tmp/d.toml")));
        assert!(matches!(args.command, Command::TestConnection));
    }

    #[test]
    fn test_generate_options() {
        let args = Args::parse_from([
            "donation-celebrator",
            "generate",
            "--amount",
            "1500",
            "--username",
            "Ivan",
            "--message",
            "Dragons please",
        ]);
        match args.command {
            Command::Generate {
                amount,
                currency,
                username,
                message,
                prompt,
            } => {
                assert_eq!(amount, 1500.0);
                assert!(currency.is_none());
                assert_eq!(username, "Ivan");
                assert_eq!(message, "Dragons please");
                assert!(prompt.is_none());
            }
            other => panic!("Expected Generate, got {:?}", other),
        }
    }

    #[test]
    fn test_generate_requires_amount() {
        assert!(Args::try_parse_from(["donation-celebrator", "generate"]).is_err());
    }

    #[test]
    fn test_convert_positionals() {
        let args = Args::parse_from(["donation-celebrator", "convert", "10", "usd"]);
        match args.command {
            Command::Convert { amount, currency } => {
                assert_eq!(amount, 10.0);
                assert_eq!(currency, "usd");
            }
            other => panic!("Expected Convert, got {:?}", other),
        }
    }

    #[test]
    fn test_auth_subcommands() {
        let args = Args::parse_from(["donation-celebrator", "auth", "url"]);
        assert!(matches!(args.command, Command::Auth { action: AuthAction::Url }));

        let args = Args::parse_from(["donation-celebrator", "auth", "exchange", "abc123"]);
        match args.command {
            Command::Auth {
                action: AuthAction::Exchange { code },
            } => assert_eq!(code, "abc123"),
            other => panic!("Expected Auth Exchange, got {:?}", other),
        }
    }

    #[test]
    fn test_config_subcommands() {
        let args = Args::parse_from(["donation-celebrator", "config", "show"]);
        assert!(matches!(
            args.command,
            Command::Config {
                action: ConfigAction::Show
            }
        ));

        let args = Args::parse_from(["donation-celebrator", "config", "init"]);
        assert!(matches!(
            args.command,
            Command::Config {
                action: ConfigAction::Init
            }
        ));
    }

    #[test]
    fn test_subcommand_is_required() {
        assert!(Args::try_parse_from(["donation-celebrator"]).is_err());
    }
}
