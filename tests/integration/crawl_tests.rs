//! Integration tests for the crawler
//!
//! Crawl scenarios run against a scripted fetcher so relay behavior is
//! deterministic; the WebSocket client is exercised against an in-process
//! relay built on tokio-tungstenite.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use relay_atlas::config::Config;
use relay_atlas::crawler::{
    Coordinator, CrawlOutcome, RelayFetcher, Scheduler, SchedulerSettings, StartMode,
    WebSocketFetcher,
};
use relay_atlas::registry::Registry;
use relay_atlas::storage::{RunStatus, SqliteStorage, Storage};
use relay_atlas::{Category, CrawlState, FetchError, FetchResult, RelayUrl};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

/// Serves canned relay lists; relays without a list fail to connect
#[derive(Default)]
struct ScriptedFetcher {
    lists: HashMap<RelayUrl, Vec<String>>,
    delay: Duration,
    attempts: Mutex<HashMap<RelayUrl, Vec<Instant>>>,
    running: Mutex<HashMap<RelayUrl, usize>>,
    overlap: AtomicBool,
    cancel_after: Option<(RelayUrl, CancellationToken)>,
}

impl ScriptedFetcher {
    fn serve(mut self, relay: &str, children: &[&str]) -> Self {
        self.lists.insert(
            RelayUrl::new(relay),
            children.iter().map(|c| c.to_string()).collect(),
        );
        self
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Cancels `token` as soon as `relay` has answered
    fn cancel_after(mut self, relay: &str, token: CancellationToken) -> Self {
        self.cancel_after = Some((RelayUrl::new(relay), token));
        self
    }

    fn attempts(&self, relay: &str) -> Vec<Instant> {
        self.attempts
            .lock()
            .unwrap()
            .get(&RelayUrl::new(relay))
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl RelayFetcher for ScriptedFetcher {
    async fn fetch(&self, url: &RelayUrl, _timeout: Duration) -> FetchResult<Vec<String>> {
        {
            let mut running = self.running.lock().unwrap();
            let count = running.entry(url.clone()).or_insert(0);
            *count += 1;
            if *count > 1 {
                self.overlap.store(true, Ordering::SeqCst);
            }
        }
        self.attempts
            .lock()
            .unwrap()
            .entry(url.clone())
            .or_default()
            .push(Instant::now());

        tokio::time::sleep(self.delay).await;
        *self.running.lock().unwrap().get_mut(url).unwrap() -= 1;

        let result = match self.lists.get(url) {
            Some(children) => Ok(children.clone()),
            None => Err(FetchError::Connect {
                url: url.to_string(),
                message: "connection refused".to_string(),
            }),
        };

        if let Some((relay, token)) = &self.cancel_after {
            if relay == url {
                token.cancel();
            }
        }

        result
    }
}

fn settings(concurrency: usize, retries: u32, backoff: Duration) -> SchedulerSettings {
    SchedulerSettings {
        concurrency_limit: concurrency,
        max_retries: retries,
        attempt_timeout: Duration::from_secs(1),
        retry_backoff: backoff,
        repoll_interval: Duration::from_millis(5),
    }
}

fn record(registry: &Registry, url: &str) -> relay_atlas::RelayRecord {
    registry
        .get(&RelayUrl::new(url))
        .unwrap_or_else(|| panic!("{} not registered", url))
}

fn test_config(dir: &TempDir, seeds: &[&str]) -> Config {
    let mut config = Config::default();
    config.seeds = seeds.iter().map(|s| s.to_string()).collect();
    config.crawler.max_retries = 2;
    config.crawler.retry_backoff_ms = 10;
    config.crawler.repoll_interval_ms = 5;
    config.output.database_path = dir.path().join("atlas.db").display().to_string();
    config.output.export_dir = dir.path().join("relays").display().to_string();
    config.output.checkpoint_interval_secs = 1;
    config
}

// ===== Crawl scenarios =====

#[tokio::test]
async fn test_scenario_a_single_pass_classification() {
    let registry = Arc::new(Registry::new(None));
    registry.register_seed("wss://r1.example.com");

    let cancel = CancellationToken::new();
    let fetcher = Arc::new(
        ScriptedFetcher::default()
            .serve(
                "wss://r1.example.com",
                &[
                    "wss://r2.example.com",
                    "ws://192.168.1.5",
                    "wss://abc.onion",
                    "wss://r2.example.com/filter",
                    "not-a-url",
                ],
            )
            .cancel_after("wss://r1.example.com", cancel.clone()),
    );

    let scheduler = Scheduler::new(
        registry.clone(),
        fetcher.clone(),
        settings(4, 2, Duration::from_millis(10)),
    );
    let outcome = scheduler.run(&cancel).await;
    assert_eq!(outcome, CrawlOutcome::Cancelled);

    assert_eq!(record(&registry, "wss://r1.example.com").state, CrawlState::Crawled);

    let r2 = record(&registry, "wss://r2.example.com");
    assert_eq!(r2.category, Category::ClearOnline);
    assert_eq!(r2.state, CrawlState::Pending);
    assert_eq!(r2.discovery_count, 1);
    assert_eq!(r2.depth, 1);

    for (url, category) in [
        ("ws://192.168.1.5", Category::Local),
        ("wss://abc.onion", Category::Onion),
        ("wss://r2.example.com/filter", Category::ClearApi),
        ("not-a-url", Category::Malformed),
    ] {
        let excluded = record(&registry, url);
        assert_eq!(excluded.category, category, "{}", url);
        assert_eq!(excluded.state, CrawlState::Excluded, "{}", url);
    }

    assert!(fetcher.attempts("wss://r2.example.com").is_empty());
}

#[tokio::test]
async fn test_scenario_b_unreachable_relay_goes_offline() {
    let registry = Arc::new(Registry::new(None));
    registry.register_seed("wss://r1.example.com");

    let backoff = Duration::from_millis(50);
    let fetcher = Arc::new(
        ScriptedFetcher::default().serve("wss://r1.example.com", &["wss://r2.example.com"]),
    );

    let scheduler = Scheduler::new(registry.clone(), fetcher.clone(), settings(4, 2, backoff));
    let outcome = scheduler.run(&CancellationToken::new()).await;
    assert_eq!(outcome, CrawlOutcome::Drained);

    let attempts = fetcher.attempts("wss://r2.example.com");
    assert_eq!(attempts.len(), 2);
    assert!(attempts[1] - attempts[0] >= backoff);

    let r2 = record(&registry, "wss://r2.example.com");
    assert_eq!(r2.state, CrawlState::Offline);
    assert_eq!(r2.category, Category::ClearOffline);
    assert_eq!(r2.attempts, 2);
    assert!(registry.completed());
}

#[tokio::test]
async fn test_scenario_c_concurrent_rediscovery() {
    let registry = Arc::new(Registry::new(None));
    registry.register_seed("wss://r1.example.com");
    registry.register_seed("wss://r2.example.com");

    let fetcher = Arc::new(
        ScriptedFetcher::default()
            .serve("wss://r1.example.com", &["wss://r3.example.com"])
            .serve("wss://r2.example.com", &["wss://r3.example.com"])
            .serve("wss://r3.example.com", &[])
            .with_delay(Duration::from_millis(20)),
    );

    let scheduler = Scheduler::new(
        registry.clone(),
        fetcher.clone(),
        settings(8, 2, Duration::from_millis(10)),
    );
    scheduler.run(&CancellationToken::new()).await;

    let r3 = record(&registry, "wss://r3.example.com");
    assert_eq!(r3.discovery_count, 2);
    assert_eq!(r3.state, CrawlState::Crawled);
    assert_eq!(fetcher.attempts("wss://r3.example.com").len(), 1);
    assert!(!fetcher.overlap.load(Ordering::SeqCst));
    assert_eq!(registry.len(), 3);
}

#[tokio::test]
async fn test_closed_graph_reaches_fixed_point() {
    let registry = Arc::new(Registry::new(None));
    registry.register_seed("wss://hub.example.com");

    let spokes: Vec<String> = (0..12).map(|i| format!("wss://s{}.example.com", i)).collect();
    let spoke_refs: Vec<&str> = spokes.iter().map(String::as_str).collect();

    let mut fetcher = ScriptedFetcher::default()
        .serve("wss://hub.example.com", &spoke_refs)
        .with_delay(Duration::from_millis(2));
    // Every third spoke is down; the rest point back at the hub and an onion
    for (i, spoke) in spokes.iter().enumerate() {
        if i % 3 != 0 {
            fetcher = fetcher.serve(spoke, &["wss://hub.example.com", "wss://hidden.onion"]);
        }
    }
    let fetcher = Arc::new(fetcher);

    let scheduler = Scheduler::new(
        registry.clone(),
        fetcher.clone(),
        settings(3, 2, Duration::from_millis(5)),
    );
    assert_eq!(
        scheduler.run(&CancellationToken::new()).await,
        CrawlOutcome::Drained
    );

    assert!(registry.completed());
    let counts = registry.counts();
    assert_eq!(counts.crawled(), 9);
    assert_eq!(counts.offline(), 4);
    assert_eq!(counts.category(Category::Onion), 1);
    assert_eq!(record(&registry, "wss://hidden.onion").discovery_count, 8);
    assert_eq!(record(&registry, "wss://hub.example.com").discovery_count, 9);
    assert!(!fetcher.overlap.load(Ordering::SeqCst));
}

// ===== Coordinator and checkpoint =====

#[tokio::test]
async fn test_coordinator_full_run_and_new_sweep() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir, &["wss://r1.example.com"]);

    let fetcher = Arc::new(
        ScriptedFetcher::default()
            .serve(
                "wss://r1.example.com",
                &["wss://r2.example.com", "wss://r3.example.com", "wss://abc.onion"],
            )
            .serve("wss://r2.example.com", &["wss://r1.example.com"]),
    );

    let mut coordinator = Coordinator::new(config.clone(), "hash-1", false)
        .unwrap()
        .with_fetcher(fetcher.clone());
    assert_eq!(coordinator.start_mode(), StartMode::Fresh);

    let report = coordinator.run(CancellationToken::new()).await.unwrap();
    assert_eq!(report.outcome, CrawlOutcome::Drained);
    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.counts.crawled(), 2);
    assert_eq!(report.counts.offline(), 1);
    drop(coordinator);

    let storage = SqliteStorage::new(Path::new(&config.output.database_path)).unwrap();
    let run = storage.get_latest_run().unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.config_hash, "hash-1");
    assert_eq!(storage.count_relays().unwrap(), 4);

    let export_dir = Path::new(&config.output.export_dir);
    for file in ["online_relays.csv", "offline_relays.csv", "onion_relays.csv"] {
        assert!(export_dir.join(file).exists(), "{} missing", file);
    }
    let online = std::fs::read_to_string(export_dir.join("online_relays.csv")).unwrap();
    assert!(online.starts_with("Relay URL,Count,Discovered By,Category,Crawl State,Depth"));
    assert!(online.contains("wss://r1.example.com,2,seed,clear_online,crawled,0"));
    drop(storage);

    // A finished run is followed by a new sweep over the reachable relays only
    let next = Coordinator::new(config, "hash-2", false).unwrap();
    assert_eq!(next.start_mode(), StartMode::NewSweep);
    assert_ne!(next.run_id(), run.id);
    let registry = next.registry();
    assert_eq!(registry.len(), 2);
    assert_eq!(record(registry, "wss://r1.example.com").state, CrawlState::Pending);
    assert_eq!(record(registry, "wss://r2.example.com").state, CrawlState::Pending);
    assert!(registry.get(&RelayUrl::new("wss://r3.example.com")).is_none());
}

#[tokio::test]
async fn test_cancelled_run_resumes() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir, &["wss://r1.example.com"]);

    let cancel = CancellationToken::new();
    let fetcher = Arc::new(
        ScriptedFetcher::default()
            .serve("wss://r1.example.com", &["wss://r2.example.com", "wss://r3.example.com"])
            .cancel_after("wss://r1.example.com", cancel.clone()),
    );

    let mut coordinator = Coordinator::new(config.clone(), "hash", false)
        .unwrap()
        .with_fetcher(fetcher);
    let first_run = coordinator.run_id();
    let report = coordinator.run(cancel).await.unwrap();
    assert_eq!(report.outcome, CrawlOutcome::Cancelled);
    assert_eq!(report.status, RunStatus::Interrupted);
    drop(coordinator);

    let resumed_fetcher = Arc::new(
        ScriptedFetcher::default()
            .serve("wss://r2.example.com", &[])
            .serve("wss://r3.example.com", &["wss://r2.example.com"]),
    );
    let mut resumed = Coordinator::new(config.clone(), "hash", false)
        .unwrap()
        .with_fetcher(resumed_fetcher.clone());
    assert_eq!(resumed.start_mode(), StartMode::Resume);
    assert_eq!(resumed.run_id(), first_run);
    assert_eq!(
        record(resumed.registry(), "wss://r1.example.com").state,
        CrawlState::Crawled
    );

    let report = resumed.run(CancellationToken::new()).await.unwrap();
    assert_eq!(report.status, RunStatus::Completed);
    assert!(resumed_fetcher.attempts("wss://r1.example.com").is_empty());
    assert_eq!(record(resumed.registry(), "wss://r2.example.com").discovery_count, 2);
    assert_eq!(report.counts.crawled(), 3);
}

// ===== WebSocket client =====

/// How the fake relay ends the session after playing its frames
enum Hangup {
    /// Keep the socket open until the client leaves
    Linger,
    /// Send a close frame first
    CloseFrame,
    /// Drop the TCP connection with no close handshake
    DropSocket,
    /// Write raw bytes straight onto the socket, then linger
    RawBytes(Vec<u8>),
}

/// Accepts one connection, checks the request and plays `frames` back
async fn spawn_relay(frames: Vec<String>, hangup: Hangup) -> (String, JoinHandle<Value>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let (socket, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(socket).await.unwrap();

        let request = match ws.next().await {
            Some(Ok(Message::Text(text))) => serde_json::from_str::<Value>(&text).unwrap(),
            other => panic!("expected REQ, got {:?}", other),
        };

        for frame in frames {
            if ws.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }

        match hangup {
            Hangup::Linger => {}
            Hangup::CloseFrame => {
                let _ = ws.close(None).await;
            }
            Hangup::DropSocket => {
                drop(ws);
                return request;
            }
            Hangup::RawBytes(bytes) => {
                let socket = ws.get_mut();
                socket.write_all(&bytes).await.unwrap();
                socket.flush().await.unwrap();
            }
        }

        // Drain until the client hangs up
        while let Some(Ok(_)) = ws.next().await {}

        request
    });

    (url, handle)
}

fn relay_list_event(urls: &[&str]) -> String {
    let tags: Vec<Value> = urls.iter().map(|url| json!(["r", url])).collect();
    json!(["EVENT", "relay-atlas", {"kind": 10002, "tags": tags}]).to_string()
}

async fn fetch_from(url: &str, attempt_timeout: Duration) -> FetchResult<Vec<String>> {
    WebSocketFetcher::new(Duration::from_secs(2), 50)
        .fetch(&RelayUrl::new(url), attempt_timeout)
        .await
}

#[tokio::test]
async fn test_websocket_fetch_until_eose() {
    let frames = vec![
        json!(["NOTICE", "welcome"]).to_string(),
        json!(["EVENT", "relay-atlas", {
            "kind": 10002,
            "tags": [
                ["r", "wss://r2.example.com"],
                ["r", "wss://r3.example.com/", "write"],
                ["p", "ff"]
            ]
        }])
        .to_string(),
        "this is not json".to_string(),
        relay_list_event(&["wss://r2.example.com"]),
        json!(["EOSE", "relay-atlas"]).to_string(),
        relay_list_event(&["wss://late.example.com"]),
    ];
    let (url, server) = spawn_relay(frames, Hangup::Linger).await;

    let children = fetch_from(&url, Duration::from_secs(2)).await.unwrap();

    assert_eq!(
        children,
        vec![
            "wss://r2.example.com".to_string(),
            "wss://r3.example.com/".to_string(),
            "wss://r2.example.com".to_string(),
        ]
    );

    let request = server.await.unwrap();
    assert_eq!(request, json!(["REQ", "relay-atlas", {"kinds": [10002], "limit": 50}]));
}

#[tokio::test]
async fn test_websocket_clean_close_is_success() {
    let frames = vec![relay_list_event(&["wss://r2.example.com"])];
    let (url, server) = spawn_relay(frames, Hangup::CloseFrame).await;

    let children = fetch_from(&url, Duration::from_secs(2)).await.unwrap();

    assert_eq!(children, vec!["wss://r2.example.com".to_string()]);
    server.await.unwrap();
}

#[tokio::test]
async fn test_websocket_dropped_connection_keeps_discoveries() {
    let frames = vec![relay_list_event(&["wss://r2.example.com"])];
    let (url, server) = spawn_relay(frames, Hangup::DropSocket).await;

    let children = fetch_from(&url, Duration::from_secs(2)).await.unwrap();

    assert_eq!(children, vec!["wss://r2.example.com".to_string()]);
    server.await.unwrap();
}

#[tokio::test]
async fn test_websocket_invalid_frame_is_protocol_error() {
    let frames = vec![relay_list_event(&["wss://r2.example.com"])];
    // FIN + reserved data opcode 0x3, empty payload
    let (url, server) = spawn_relay(frames, Hangup::RawBytes(vec![0x83, 0x00])).await;

    let result = fetch_from(&url, Duration::from_secs(2)).await;

    assert!(matches!(result, Err(FetchError::Protocol { .. })), "{:?}", result);
    server.abort();
}

#[tokio::test]
async fn test_websocket_closed_subscription_ends_stream() {
    let frames = vec![json!(["CLOSED", "relay-atlas", "auth-required: sign in first"]).to_string()];
    let (url, server) = spawn_relay(frames, Hangup::Linger).await;

    let children = fetch_from(&url, Duration::from_secs(2)).await.unwrap();

    assert!(children.is_empty());
    server.await.unwrap();
}

#[tokio::test]
async fn test_websocket_silent_relay_times_out() {
    let (url, server) = spawn_relay(vec![], Hangup::Linger).await;

    let started = Instant::now();
    let result = fetch_from(&url, Duration::from_millis(200)).await;

    assert!(matches!(result, Err(FetchError::Timeout { .. })), "{:?}", result);
    assert!(started.elapsed() >= Duration::from_millis(200));
    server.await.unwrap();
}
