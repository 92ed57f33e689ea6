use cookie_sync::browser::{domain_matches, Cookie};
use cookie_sync::config::{Config, Preset, MAX_INTERVAL};
use cookie_sync::harvest::CookieSource;
use cookie_sync::model::Session;
use cookie_sync::scheduler::Scheduler;
use cookie_sync::service::Service;
use cookie_sync::store::{keys, KeyValueStore, MemoryStore, SharedStore};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn can_bind_localhost() -> bool {
    std::net::TcpListener::bind("127.0.0.1:0").is_ok()
}

struct Jar(Vec<Cookie>);

impl CookieSource for Jar {
    async fn get_all(&self, domain: &str) -> cookie_sync::Result<Vec<Cookie>> {
        Ok(self
            .0
            .iter()
            .filter(|cookie| domain_matches(&cookie.domain, domain))
            .cloned()
            .collect())
    }
}

async fn count(server: &MockServer, wanted: &str) -> usize {
    server
        .received_requests()
        .await
        .expect("recording enabled")
        .iter()
        .filter(|request| request.url.path() == wanted)
        .count()
}

#[tokio::test]
async fn test_startup_refreshes_then_syncs_and_timers_keep_syncing() {
    if !can_bind_localhost() {
        return;
    }

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/external-auth"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "a2"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/external-data-receiver"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let store = MemoryStore::shared();
    Session {
        access_token: "a1".to_string(),
        refresh_token: "r1".to_string(),
        user_email: "ana@example.com".to_string(),
        user_name: "Ana".to_string(),
    }
    .save(store.as_ref())
    .expect("seed session");

    let config = Config {
        api_base_url: Some(server.uri()),
        ..Config::preset(Preset::Receiver)
    };
    let shared: SharedStore = store.clone();
    let jar = Jar(vec![Cookie::new("ssid", "abc", ".mercadolivre.com.br")]);
    let service = Service::new(&config, shared, jar).expect("service");

    let scheduler = Scheduler::new(Duration::from_millis(150), Duration::from_secs(60));
    scheduler
        .run(&service, tokio::time::sleep(Duration::from_millis(500)))
        .await;

    assert_eq!(count(&server, "/external-auth").await, 1);
    assert!(count(&server, "/external-data-receiver").await >= 2);
    assert_eq!(
        store.get_string(keys::ACCESS_TOKEN).expect("read").as_deref(),
        Some("a2")
    );
}

#[tokio::test]
async fn test_logged_out_startup_does_nothing_until_shutdown() {
    if !can_bind_localhost() {
        return;
    }

    let server = MockServer::start().await;
    let store = MemoryStore::shared();
    let config = Config {
        api_base_url: Some(server.uri()),
        ..Config::default()
    };
    let shared: SharedStore = store.clone();
    let service = Service::new(&config, shared, Jar(Vec::new())).expect("service");

    let scheduler = Scheduler::new(Duration::from_millis(50), Duration::from_millis(50));
    scheduler
        .run(&service, tokio::time::sleep(Duration::from_millis(200)))
        .await;

    let requests = server.received_requests().await.expect("recording enabled");
    assert!(requests.is_empty());
}

#[tokio::test]
async fn test_oversized_config_intervals_are_capped_instead_of_panicking() {
    let config = Config {
        sync_interval_minutes: 200_000_000_000_000_000,
        token_refresh_interval_minutes: u64::MAX,
        ..Config::default()
    };
    let scheduler = Scheduler::from_config(&config);
    assert_eq!(scheduler.sync_every(), MAX_INTERVAL);
    assert_eq!(scheduler.refresh_every(), MAX_INTERVAL);

    let service = Service::new(&config, MemoryStore::shared(), Jar(Vec::new())).expect("service");
    scheduler
        .run(&service, tokio::time::sleep(Duration::from_millis(50)))
        .await;
}
