//! Subcommand handlers.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use donation_celebrator::config::{default_path, mask_secret, Config, Settings};
use donation_celebrator::currency::CurrencyConverter;
use donation_celebrator::donation::DonationSnapshot;
use donation_celebrator::donation_alerts::DonationAlertsClient;
use donation_celebrator::poller::{DonationPoller, PollerStats, PollerTiming};
use donation_celebrator::video::VideoGenerator;
use donation_celebrator::widget::Widget;

use super::args::{AuthAction, ConfigAction};

/// Set by the Ctrl+C handler.
static CTRLC_RECEIVED: AtomicBool = AtomicBool::new(false);

fn setup_ctrlc_handler() -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
        CTRLC_RECEIVED.store(true, Ordering::SeqCst);
        eprintln!("\nReceived Ctrl+C, shutting down...");
    })
}

/// Everything the poller needs, wired from one config.
struct Services {
    poller: DonationPoller,
    converter: Arc<CurrencyConverter>,
    generator: Arc<VideoGenerator>,
}

impl Services {
    fn build(config: &Config, settings: Settings) -> Result<Self, String> {
        let client = DonationAlertsClient::from_config(config, settings.clone())
            .map_err(|e| format!("Failed to create DonationAlerts client: {}", e))?;
        let converter = Arc::new(
            CurrencyConverter::from_config(config, settings.clone())
                .map_err(|e| format!("Failed to create currency converter: {}", e))?,
        );
        let generator = Arc::new(VideoGenerator::from_config(config, settings));
        let poller = DonationPoller::new(
            client,
            Arc::clone(&converter),
            generator.clone(),
            PollerTiming::from_config(config),
        );
        Ok(Self {
            poller,
            converter,
            generator,
        })
    }
}

fn print_stats(stats: &PollerStats) {
    println!("  Running: {}", if stats.is_running { "yes" } else { "no" });
    println!("  Donations processed: {}", stats.total_donations_processed);
    println!("  Videos generated: {}", stats.total_videos_generated);
    println!("  API errors: {}", stats.api_errors);
    println!("  Tracked donation ids: {}", stats.processed_donations_count);
    println!(
        "  Last poll: {}",
        stats.last_poll_time.as_deref().unwrap_or("never")
    );
}

/// Poll until Ctrl+C, logging statistics every `stats_interval` seconds.
pub async fn run(config: &Config, threshold: Option<f64>, stats_interval: u64) -> Result<(), String> {
    let settings = Settings::from_config(config);
    if let Some(threshold) = threshold {
        settings.set_threshold(threshold);
    }

    let services = Services::build(config, settings.clone())?;
    if !services.poller.has_token() {
        return Err(
            "No DonationAlerts access token configured. Run 'donation-celebrator auth url' to authorize."
                .to_string(),
        );
    }
    if !services.generator.has_api_key() {
        eprintln!("Warning: AIMLAPI_KEY not set; qualifying donations will not produce videos.\n");
    }

    if let Err(e) = setup_ctrlc_handler() {
        eprintln!("Warning: Could not set up Ctrl+C handler: {}", e);
    }

    println!(
        "Polling DonationAlerts (threshold {} {}). Press Ctrl+C to stop.",
        settings.threshold(),
        settings.reference_currency()
    );
    services.poller.start();

    let stats_interval = Duration::from_secs(stats_interval.max(1));
    let mut last_stats = Instant::now();
    while !CTRLC_RECEIVED.load(Ordering::SeqCst) {
        tokio::time::sleep(Duration::from_millis(200)).await;
        if last_stats.elapsed() >= stats_interval {
            let stats = services.poller.stats();
            log::info!(
                "Stats: processed={} videos={} api_errors={} last_poll={}",
                stats.total_donations_processed,
                stats.total_videos_generated,
                stats.api_errors,
                stats.last_poll_time.as_deref().unwrap_or("never")
            );
            last_stats = Instant::now();
        }
    }

    services.poller.stop().await;
    println!("Final statistics:");
    print_stats(&services.poller.stats());
    Ok(())
}

/// Generate one video as if a donation had arrived.
pub async fn generate(
    config: &Config,
    amount: f64,
    currency: Option<String>,
    username: String,
    message: String,
    prompt: Option<String>,
) -> Result<(), String> {
    let settings = Settings::from_config(config);
    let services = Services::build(config, settings.clone())?;
    if !services.generator.has_api_key() {
        return Err("AIMLAPI_KEY is required for video generation".to_string());
    }

    let reference = settings.reference_currency();
    let currency = currency
        .map(|c| c.trim().to_uppercase())
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| reference.clone());
    let amount_converted = services
        .converter
        .try_convert(amount, &currency)
        .await
        .map_err(|e| format!("Currency conversion failed: {}", e))?;

    let snapshot = DonationSnapshot {
        id: format!("manual-{}", chrono::Utc::now().timestamp()),
        username,
        amount,
        currency,
        amount_converted,
        message,
        created_at: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
    };

    println!(
        "Generating video for {:.2} {} from {}...",
        amount_converted, reference, snapshot.username
    );
    match services
        .generator
        .generate(&snapshot, amount_converted, prompt.as_deref())
        .await
    {
        Some(path) => {
            println!("Video saved: {}", path.display());
            Ok(())
        }
        None => {
            let status = services.generator.generation_status();
            Err(format!(
                "Video generation failed: {}",
                status.state.error.as_deref().unwrap_or("unknown error")
            ))
        }
    }
}

pub async fn convert(config: &Config, amount: f64, currency: &str) -> Result<(), String> {
    let settings = Settings::from_config(config);
    let converter = CurrencyConverter::from_config(config, settings)
        .map_err(|e| format!("Failed to create currency converter: {}", e))?;
    let converted = converter
        .try_convert(amount, currency)
        .await
        .map_err(|e| e.to_string())?;
    println!(
        "{} {} = {:.2} {}",
        amount,
        currency.to_uppercase(),
        converted,
        converter.reference_currency()
    );
    Ok(())
}

pub async fn handle_auth_action(config: &Config, action: AuthAction) -> Result<(), String> {
    let client = DonationAlertsClient::from_config(config, Settings::from_config(config))
        .map_err(|e| e.to_string())?;

    match action {
        AuthAction::Url => {
            let url = client.authorize_url(None).map_err(|e| e.to_string())?;
            println!("Open this URL to authorize DonationAlerts access:");
            println!("  {}", url);
            println!();
            println!("Then run 'donation-celebrator auth exchange <CODE>' with the returned code.");
        }
        AuthAction::Exchange { code } => {
            let grant = client.exchange_code(&code).await.map_err(|e| e.to_string())?;
            println!("Authorization succeeded.");
            println!("  Access token: {}", mask_secret(&grant.access_token));
            if let Some(refresh) = &grant.refresh_token {
                println!("  Refresh token: {}", mask_secret(refresh));
            }
            if let Some(expires_at) = grant.expires_at {
                if let Some(at) = chrono::DateTime::from_timestamp(expires_at, 0) {
                    println!("  Expires: {}", at.with_timezone(&chrono::Local));
                }
            }
            println!();
            println!("Add the tokens to .env to use them:");
            println!("  DA_ACCESS_TOKEN={}", grant.access_token);
            if let Some(refresh) = &grant.refresh_token {
                println!("  DA_REFRESH_TOKEN={}", refresh);
            }
        }
    }
    Ok(())
}

pub async fn test_connection(config: &Config) -> Result<(), String> {
    let services = Services::build(config, Settings::from_config(config))?;
    let report = services.poller.test_api_connection().await;
    let json = serde_json::to_string_pretty(&report).map_err(|e| e.to_string())?;
    println!("{}", json);
    if report.is_success() {
        Ok(())
    } else {
        Err("Connection test failed".to_string())
    }
}

pub fn list_videos(config: &Config) {
    let widget = Widget::new(config.video.videos_dir.clone());
    let videos = widget.list_videos();
    if videos.is_empty() {
        println!("No videos in {}", widget.videos_dir().display());
        return;
    }

    println!("Generated videos ({}):", videos.len());
    for video in videos {
        println!(
            "  {}  {:>10} bytes  {}",
            video.created.format("%Y-%m-%d %H:%M:%S"),
            video.size,
            video.filename
        );
    }
}

/// Handle config subcommand actions.
pub fn handle_config_action(
    action: ConfigAction,
    config_path: Option<&Path>,
    config: Option<&Config>,
) -> Result<(), String> {
    let config_path = config_path
        .map(Path::to_path_buf)
        .unwrap_or_else(default_path);

    match action {
        ConfigAction::Show => {
            let default_config = Config::default();
            let config = config.unwrap_or(&default_config);
            let da = &config.donation_alerts;
            let secret = |value: &Option<String>| mask_secret(value.as_deref().unwrap_or(""));

            println!("Current configuration:");
            println!("  Threshold: {} {}", config.threshold.amount, config.currency.reference);
            println!("  DonationAlerts API: {}", da.api_base);
            println!("  Client id: {}", da.client_id.as_deref().unwrap_or("<unset>"));
            println!("  Client secret: {}", secret(&da.client_secret));
            println!("  Access token: {}", secret(&da.access_token));
            println!("  Refresh token: {}", secret(&da.refresh_token));
            println!("  Redirect URI: {}", da.redirect_uri);
            println!("  Rates API: {} (ttl {}s)", config.currency.api_base, config.currency.cache_ttl_secs);
            println!("  Video API: {} ({})", config.video.api_base, config.video.model);
            println!("  AIML API key: {}", secret(&config.video.api_key));
            println!("  Videos directory: {}", config.video.videos_dir.display());
            println!("  Prompt tiers: {}", config.prompt_tiers().len());
            println!(
                "  Poll interval: {} ms (error back-off {} ms)",
                config.poller.min_request_interval_ms, config.poller.error_backoff_ms
            );
            println!();

            if config_path.exists() {
                println!("Config file: {} (exists)", config_path.display());
            } else {
                println!("Config file: {} (not found)", config_path.display());
            }
            Ok(())
        }
        ConfigAction::Init => {
            if config_path.exists() {
                return Err(format!(
                    "Config file already exists: {}\nUse 'donation-celebrator config show' to view current settings.",
                    config_path.display()
                ));
            }

            if let Some(parent) = config_path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| format!("Error creating config directory: {}", e))?;
            }

            std::fs::write(&config_path, DEFAULT_CONFIG)
                .map_err(|e| format!("Error writing config file: {}", e))?;
            println!("Created config file: {}", config_path.display());
            Ok(())
        }
    }
}

const DEFAULT_CONFIG: &str = r#"# donation-celebrator configuration
# Secrets are best kept in .env: AIMLAPI_KEY, DA_CLIENT_ID, DA_CLIENT_SECRET,
# DA_ACCESS_TOKEN, DA_REFRESH_TOKEN

[threshold]
# Minimum donation (reference currency) that triggers a video
amount = 1000.0

[currency]
reference = "RUB"
api_base = "https://api.exchangerate-api.com/v4/latest"
cache_ttl_secs = 300

[donation_alerts]
api_base = "https://www.donationalerts.com/api/v1"
oauth_base = "https://www.donationalerts.com/oauth"
redirect_uri = "http://localhost:5002/api/da/oauth/callback"

[video]
api_base = "https://api.aimlapi.com/v2"
model = "google/veo3"
videos_dir = "generated_videos"
# Prepended to every prompt
system_prompt = ""
# resolution = "720P"
# duration = 8
enhance_prompt = true
generate_audio = true
poll_interval_secs = 10
max_wait_secs = 1000

[poller]
min_request_interval_ms = 2000
error_backoff_ms = 5000
rate_limit_backoff_ms = 10000
page_limit = 10
freshness_window_secs = 300

# Amount-tiered fallback prompts, used when a donation has no message.
# [[prompts]]
# min_amount = 1000.0
# prompt = "A spectacular celebration with golden confetti..."
"#;
