//! Integration tests for DonationPoller.
//!
//! These tests cover:
//! - The per-donation pipeline: dedupe, test alerts, freshness, conversion, threshold
//! - Dispatch to the celebration handler and the dedupe-before-dispatch ordering
//! - Recent history, stats and the connection check
//! - Starting and stopping the background loop against a mock provider

use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use donation_celebrator::config::{RuntimeSettings, Settings};
use donation_celebrator::currency::CurrencyConverter;
use donation_celebrator::donation::{Donation, DonationSnapshot};
use donation_celebrator::donation_alerts::DonationAlertsClient;
use donation_celebrator::poller::{CelebrationHandler, DonationOutcome, DonationPoller, PollerTiming};
use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// === Helpers ===

/// Records every donation it is asked to celebrate.
#[derive(Default)]
struct RecordingHandler {
    calls: Mutex<Vec<DonationSnapshot>>,
    /// Set after construction so the handler can inspect the poller that called it.
    poller: OnceLock<DonationPoller>,
    seen_as_processed: Mutex<Vec<bool>>,
    succeed: bool,
}

impl RecordingHandler {
    fn succeeding() -> Self {
        Self {
            succeed: true,
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<DonationSnapshot> {
        self.calls.lock().unwrap().clone()
    }

    async fn wait_for_calls(&self, count: usize) -> Vec<DonationSnapshot> {
        for _ in 0..200 {
            let calls = self.calls();
            if calls.len() >= count {
                return calls;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.calls()
    }
}

#[async_trait]
impl CelebrationHandler for RecordingHandler {
    async fn celebrate(&self, donation: &DonationSnapshot) -> Option<PathBuf> {
        if let Some(poller) = self.poller.get() {
            self.seen_as_processed
                .lock()
                .unwrap()
                .push(poller.is_processed(&donation.id));
        }
        self.calls.lock().unwrap().push(donation.clone());
        self.succeed
            .then(|| PathBuf::from(format!("celebration_{}.mp4", donation.id)))
    }
}

struct Harness {
    poller: DonationPoller,
    handler: Arc<RecordingHandler>,
    settings: Settings,
    provider: MockServer,
    _rates: MockServer,
}

async fn harness_with(handler: RecordingHandler, token: Option<&str>) -> Harness {
    let provider = MockServer::start().await;
    let rates = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/USD"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "rates": {"RUB": 90.0}
        })))
        .mount(&rates)
        .await;
    Mock::given(method("GET"))
        .and(path("/EUR"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&rates)
        .await;

    let settings = Settings::new(RuntimeSettings {
        donation_threshold: 100.0,
        reference_currency: "RUB".to_string(),
        access_token: token.map(str::to_string),
        ..RuntimeSettings::default()
    });

    let client = DonationAlertsClient::with_base_urls(
        settings.clone(),
        format!("{}/api/v1", provider.uri()),
        format!("{}/oauth", provider.uri()),
    )
    .unwrap()
    .with_rate_limit_backoff(Duration::from_millis(10));
    let converter = Arc::new(
        CurrencyConverter::with_base_url(settings.clone(), rates.uri(), Duration::from_secs(60))
            .unwrap(),
    );

    let timing = PollerTiming {
        min_request_interval: Duration::from_millis(20),
        error_backoff: Duration::from_millis(20),
        ..PollerTiming::default()
    };

    let handler = Arc::new(handler);
    let poller = DonationPoller::new(client, converter, handler.clone(), timing);

    Harness {
        poller,
        handler,
        settings,
        provider,
        _rates: rates,
    }
}

async fn harness() -> Harness {
    harness_with(RecordingHandler::succeeding(), Some("token-1")).await
}

fn now_utc() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

fn minutes_ago(minutes: i64) -> String {
    (Utc::now() - chrono::Duration::minutes(minutes))
        .format("%Y-%m-%dT%H:%M:%SZ")
        .to_string()
}

fn donation(value: Value) -> Donation {
    serde_json::from_value(value).unwrap()
}

fn real(id: &str, amount: f64, currency: &str) -> Donation {
    donation(json!({
        "id": id,
        "username": "Alice",
        "amount": amount,
        "currency": currency,
        "message": "gg",
        "created_at": now_utc()
    }))
}

// === Pipeline ===

#[tokio::test]
async fn test_qualifying_donation_is_dispatched_once() {
    let h = harness().await;

    let outcome = h.poller.process_donation(&real("d1", 150.0, "RUB")).await;
    assert_eq!(outcome, DonationOutcome::Dispatched { amount_converted: 150.0 });
    assert!(h.poller.is_processed("d1"));

    let calls = h.handler.wait_for_calls(1).await;
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].id, "d1");
    assert_eq!(calls[0].username, "Alice");
    assert_eq!(calls[0].currency, "RUB");
    assert_eq!(calls[0].amount_converted, 150.0);
    assert_eq!(calls[0].message, "gg");

    let again = h.poller.process_donation(&real("d1", 150.0, "RUB")).await;
    assert_eq!(again, DonationOutcome::AlreadyProcessed);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.handler.calls().len(), 1);
    assert_eq!(h.poller.stats().total_donations_processed, 1);
}

#[tokio::test]
async fn test_donation_is_marked_before_handler_runs() {
    let h = harness().await;
    h.handler.poller.set(h.poller.clone()).ok().unwrap();

    h.poller.process_donation(&real("early", 500.0, "RUB")).await;
    h.handler.wait_for_calls(1).await;

    assert_eq!(*h.handler.seen_as_processed.lock().unwrap(), vec![true]);
}

#[tokio::test]
async fn test_videos_counted_only_when_handler_returns_file() {
    let h = harness_with(RecordingHandler::default(), Some("token-1")).await;

    h.poller.process_donation(&real("d1", 150.0, "RUB")).await;
    h.handler.wait_for_calls(1).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(h.poller.stats().total_videos_generated, 0);

    let ok = harness().await;
    ok.poller.process_donation(&real("d2", 150.0, "RUB")).await;
    ok.handler.wait_for_calls(1).await;
    for _ in 0..100 {
        if ok.poller.stats().total_videos_generated == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(ok.poller.stats().total_videos_generated, 1);
}

#[tokio::test]
async fn test_test_donation_is_never_dispatched() {
    let h = harness().await;

    let flagged = donation(json!({
        "id": "t1",
        "amount": 1000,
        "currency": "RUB",
        "created_at": now_utc(),
        "is_test": true
    }));
    assert_eq!(h.poller.process_donation(&flagged).await, DonationOutcome::Test);

    let typed = donation(json!({
        "id": "t2",
        "amount": 1000,
        "currency": "RUB",
        "created_at": now_utc(),
        "alert_type": "",
        "type": "TEST"
    }));
    assert_eq!(h.poller.process_donation(&typed).await, DonationOutcome::Test);

    let unreadable = donation(json!({
        "id": "t3",
        "amount": 1000,
        "currency": "RUB",
        "created_at": now_utc(),
        "testing": {"nested": true}
    }));
    assert_eq!(h.poller.process_donation(&unreadable).await, DonationOutcome::Test);

    assert!(h.poller.is_processed("t1"));
    assert!(h.poller.is_processed("t2"));
    assert!(h.poller.is_processed("t3"));
    assert_eq!(h.poller.stats().total_donations_processed, 0);

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert!(h.handler.calls().is_empty());
}

#[tokio::test]
async fn test_stale_and_undated_donations_are_skipped() {
    let h = harness().await;

    let stale = donation(json!({
        "id": "s1",
        "amount": 1000,
        "currency": "RUB",
        "created_at": minutes_ago(11)
    }));
    assert_eq!(h.poller.process_donation(&stale).await, DonationOutcome::Stale);

    let undated = donation(json!({"id": "s2", "amount": 1000, "currency": "RUB"}));
    assert_eq!(h.poller.process_donation(&undated).await, DonationOutcome::Stale);

    let garbled = donation(json!({
        "id": "s3",
        "amount": 1000,
        "currency": "RUB",
        "created_at": "yesterday-ish"
    }));
    assert_eq!(h.poller.process_donation(&garbled).await, DonationOutcome::Stale);

    let recent = donation(json!({
        "id": "s4",
        "amount": 1000,
        "currency": "RUB",
        "created_at": minutes_ago(2)
    }));
    assert!(h.poller.process_donation(&recent).await.is_dispatched());

    assert!(h.poller.is_processed("s1"));
    assert_eq!(h.poller.stats().total_donations_processed, 1);
}

#[tokio::test]
async fn test_missing_id_is_ignored() {
    let h = harness().await;

    let anonymous = donation(json!({"amount": 1000, "currency": "RUB", "created_at": now_utc()}));
    assert_eq!(h.poller.process_donation(&anonymous).await, DonationOutcome::MissingId);

    let blank = donation(json!({"id": "  ", "amount": 1000, "created_at": now_utc()}));
    assert_eq!(h.poller.process_donation(&blank).await, DonationOutcome::MissingId);

    assert_eq!(h.poller.stats().processed_donations_count, 0);
    assert!(h.poller.get_recent_donations(10).is_empty());
}

#[tokio::test]
async fn test_below_threshold_is_marked_without_dispatch() {
    let h = harness().await;

    let outcome = h.poller.process_donation(&real("small", 99.99, "RUB")).await;
    assert_eq!(outcome, DonationOutcome::BelowThreshold { amount_converted: 99.99 });
    assert!(h.poller.is_processed("small"));
    assert_eq!(h.poller.stats().total_donations_processed, 1);

    let exact = h.poller.process_donation(&real("exact", 100.0, "RUB")).await;
    assert!(exact.is_dispatched());
}

#[tokio::test]
async fn test_threshold_change_applies_to_next_donation() {
    let h = harness().await;
    h.settings.set_threshold(500.0);

    let outcome = h.poller.process_donation(&real("d1", 150.0, "RUB")).await;
    assert!(matches!(outcome, DonationOutcome::BelowThreshold { .. }));
}

// === Currency Conversion ===

#[tokio::test]
async fn test_foreign_currency_is_converted() {
    let h = harness().await;

    let outcome = h.poller.process_donation(&real("usd", 2.0, "usd")).await;
    assert_eq!(outcome, DonationOutcome::Dispatched { amount_converted: 180.0 });

    let calls = h.handler.wait_for_calls(1).await;
    assert_eq!(calls[0].amount, 2.0);
    assert_eq!(calls[0].currency, "USD");
    assert_eq!(calls[0].amount_converted, 180.0);
}

#[tokio::test]
async fn test_failed_conversion_falls_back_to_raw_amount() {
    let h = harness().await;

    let small = h.poller.process_donation(&real("eur-small", 50.0, "EUR")).await;
    assert_eq!(small, DonationOutcome::BelowThreshold { amount_converted: 50.0 });

    let large = h.poller.process_donation(&real("eur-large", 150.0, "EUR")).await;
    assert_eq!(large, DonationOutcome::Dispatched { amount_converted: 150.0 });
}

#[tokio::test]
async fn test_missing_currency_defaults_to_reference() {
    let h = harness().await;

    let outcome = h
        .poller
        .process_donation(&donation(json!({"id": "nc", "amount": 120, "created_at": now_utc()})))
        .await;
    assert_eq!(outcome, DonationOutcome::Dispatched { amount_converted: 120.0 });

    let calls = h.handler.wait_for_calls(1).await;
    assert_eq!(calls[0].currency, "RUB");
    assert_eq!(calls[0].username, "Anonymous");
}

// === Batches, History And Stats ===

#[tokio::test]
async fn test_batch_is_processed_in_order() {
    let h = harness().await;

    let batch = vec![
        real("a", 150.0, "RUB"),
        real("a", 150.0, "RUB"),
        real("b", 10.0, "RUB"),
        real("c", 300.0, "RUB"),
    ];
    let outcomes = h.poller.process_donations(&batch).await;

    assert_eq!(
        outcomes,
        vec![
            DonationOutcome::Dispatched { amount_converted: 150.0 },
            DonationOutcome::AlreadyProcessed,
            DonationOutcome::BelowThreshold { amount_converted: 10.0 },
            DonationOutcome::Dispatched { amount_converted: 300.0 },
        ]
    );

    let recent = h.poller.get_recent_donations(10);
    let ids: Vec<&str> = recent.iter().map(|d| d.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);

    let latest = h.poller.get_recent_donations(1);
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].id, "c");

    let stats = h.poller.stats();
    assert_eq!(stats.total_donations_processed, 3);
    assert_eq!(stats.processed_donations_count, 3);
    assert!(stats.has_token);
    assert!(!stats.is_running);
}

#[tokio::test]
async fn test_poll_once_fetches_and_processes() {
    let h = harness().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/alerts/donations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"id": 1, "username": "Bob", "amount": 250, "currency": "RUB", "created_at": now_utc()},
                {"id": 2, "amount": 5, "currency": "RUB", "created_at": now_utc(), "is_test": 1}
            ]
        })))
        .mount(&h.provider)
        .await;

    let outcomes = h.poller.poll_once().await;
    assert_eq!(
        outcomes,
        vec![
            DonationOutcome::Dispatched { amount_converted: 250.0 },
            DonationOutcome::Test,
        ]
    );
    assert!(h.poller.stats().last_poll_time.is_some());

    let calls = h.handler.wait_for_calls(1).await;
    assert_eq!(calls[0].id, "1");
    assert_eq!(calls[0].username, "Bob");
}

#[tokio::test]
async fn test_connection_check() {
    let h = harness().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/alerts/donations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{"id": 1, "amount": 1}]
        })))
        .mount(&h.provider)
        .await;

    let report = h.poller.test_api_connection().await;
    assert!(report.is_success());
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["status"], "Connected successfully");
    assert_eq!(json["total_donations"], 1);

    let no_token = harness_with(RecordingHandler::succeeding(), None).await;
    let report = no_token.poller.test_api_connection().await;
    assert!(!report.is_success());
    assert_eq!(
        serde_json::to_value(&report).unwrap()["error"],
        "API token not configured"
    );
}

// === Background Loop ===

#[tokio::test]
async fn test_start_requires_token() {
    let h = harness_with(RecordingHandler::succeeding(), None).await;
    assert!(!h.poller.has_token());

    h.poller.start();
    assert!(!h.poller.is_running());

    h.poller.set_api_token("token-2");
    assert!(h.poller.has_token());
    assert_eq!(h.settings.access_token().as_deref(), Some("token-2"));
}

#[tokio::test]
async fn test_loop_dispatches_and_stops() {
    let h = harness().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/alerts/donations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {"id": "loop-1", "username": "Carol", "amount": 1000, "currency": "RUB", "created_at": now_utc()}
            ]
        })))
        .mount(&h.provider)
        .await;

    h.poller.start();
    assert!(h.poller.is_running());
    h.poller.start();

    let calls = h.handler.wait_for_calls(1).await;
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].id, "loop-1");

    // Several more cycles see the same donation; it stays deduplicated.
    tokio::time::sleep(Duration::from_millis(100)).await;
    h.poller.stop().await;
    assert!(!h.poller.is_running());
    assert_eq!(h.handler.calls().len(), 1);
    assert_eq!(h.poller.stats().api_errors, 0);
}

#[tokio::test]
async fn test_poll_once_with_failed_fetch_is_empty_cycle() {
    let h = harness().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/alerts/donations"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&h.provider)
        .await;

    assert!(h.poller.poll_once().await.is_empty());
    let stats = h.poller.stats();
    assert!(stats.last_poll_time.is_some());
    assert_eq!(stats.api_errors, 0);
}

#[tokio::test]
async fn test_loop_survives_provider_errors() {
    let h = harness().await;

    Mock::given(method("GET"))
        .and(path("/api/v1/alerts/donations"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2..)
        .mount(&h.provider)
        .await;

    h.poller.start();
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(h.poller.is_running());

    let stats = h.poller.stats();
    assert!(stats.last_poll_time.is_some());
    assert_eq!(stats.api_errors, 0);
    assert!(h.handler.calls().is_empty());

    h.poller.stop().await;
    assert!(!h.poller.is_running());
}
