use cookie_sync::browser::{domain_matches, Cookie};
use cookie_sync::config::{Config, Preset};
use cookie_sync::harvest::CookieSource;
use cookie_sync::model::{SyncResult, SyncStatus};
use cookie_sync::service::{Request, Service};
use cookie_sync::store::{keys, KeyValueStore, MemoryStore, SharedStore};
use cookie_sync::sync::SyncOutcome;
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_json, header, method, path};
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

fn service(config: &Config, store: &Arc<MemoryStore>) -> Service<Jar> {
    let shared: SharedStore = store.clone();
    let jar = Jar(vec![Cookie::new("ssid", "abc", ".mercadolivre.com.br")]);
    Service::new(config, shared, jar).expect("service")
}

fn credential_config(server: &MockServer) -> Config {
    Config {
        api_base_url: Some(server.uri()),
        ..Config::preset(Preset::Credential)
    }
}

async fn mount_credential_flow(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/platforms/mercadolivre/credentials"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 7}])))
        .mount(server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/platforms/mercadolivre/credentials/7"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_login_persists_session_and_syncs_once() {
    if !can_bind_localhost() {
        return;
    }

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .and(body_json(json!({"email": "ana@example.com", "password": "pw"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"access_token": "a1", "refresh_token": "r1"},
            "user": {"user_metadata": {"display_name": "Ana"}}
        })))
        .expect(1)
        .mount(&server)
        .await;
    mount_credential_flow(&server).await;

    let store = MemoryStore::shared();
    store
        .set_json(json!({ keys::CREDENTIAL_ID: "stale" }))
        .expect("seed stale id");
    let service = service(&credential_config(&server), &store);

    let response = service
        .handle(Request::Login {
            email: "ana@example.com".to_string(),
            password: "pw".to_string(),
            api_url: None,
        })
        .await;
    assert!(response.success, "{response:?}");
    assert_eq!(
        response.user,
        Some(json!({"user_metadata": {"display_name": "Ana"}}))
    );

    assert_eq!(
        store.get_string(keys::ACCESS_TOKEN).expect("read").as_deref(),
        Some("a1")
    );
    assert_eq!(
        store.get_string(keys::USER_NAME).expect("read").as_deref(),
        Some("Ana")
    );
    assert_eq!(
        store.get_string(keys::CREDENTIAL_ID).expect("read").as_deref(),
        Some("7")
    );
    let stored = SyncResult::load(store.as_ref()).expect("load").expect("synced");
    assert_eq!(stored.status, SyncStatus::Success);
}

#[tokio::test]
async fn test_login_failure_reports_server_message() {
    if !can_bind_localhost() {
        return;
    }

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"error": "Invalid credentials"})),
        )
        .mount(&server)
        .await;

    let store = MemoryStore::shared();
    let service = service(&credential_config(&server), &store);
    let response = service
        .handle(Request::Login {
            email: "ana@example.com".to_string(),
            password: "wrong".to_string(),
            api_url: None,
        })
        .await;
    assert!(!response.success);
    assert_eq!(response.error.as_deref(), Some("Invalid credentials"));
    assert_eq!(store.get_string(keys::ACCESS_TOKEN).expect("read"), None);
}

#[tokio::test]
async fn test_login_stores_api_url_override_and_falls_back_to_email() {
    if !can_bind_localhost() {
        return;
    }

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"access_token": "a1"})))
        .mount(&server)
        .await;
    mount_credential_flow(&server).await;

    let store = MemoryStore::shared();
    let service = service(&Config::default(), &store);
    let logged_in = service
        .login("ana@example.com", "pw", Some(&server.uri()))
        .await
        .expect("login");

    assert_eq!(logged_in.session.user_name, "ana@example.com");
    assert_eq!(
        store.get_string(keys::API_BASE_URL).expect("read"),
        Some(server.uri())
    );
    assert_eq!(store.get_string(keys::REFRESH_TOKEN).expect("read"), None);
}

#[tokio::test]
async fn test_logout_clears_session_even_when_backend_fails() {
    if !can_bind_localhost() {
        return;
    }

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/logout"))
        .and(header("authorization", "Bearer a1"))
        .and(body_json(json!({"refresh_token": "r1"})))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;

    let store = MemoryStore::shared();
    store
        .set_json(json!({
            keys::ACCESS_TOKEN: "a1",
            keys::REFRESH_TOKEN: "r1",
            keys::USER_EMAIL: "ana@example.com",
            keys::USER_NAME: "Ana",
            keys::CREDENTIAL_ID: "7",
            keys::LAST_SYNC_STATUS: "success",
        }))
        .expect("seed");
    let service = service(&credential_config(&server), &store);

    let response = service.handle(Request::Logout).await;
    assert!(response.success);
    for key in [
        keys::ACCESS_TOKEN,
        keys::REFRESH_TOKEN,
        keys::USER_EMAIL,
        keys::USER_NAME,
        keys::CREDENTIAL_ID,
        keys::LAST_SYNC_STATUS,
    ] {
        assert_eq!(store.get(key).expect("read"), None, "{key} should be cleared");
    }
    assert_eq!(store.get_string(keys::BADGE_TEXT).expect("read"), None);
    assert_eq!(
        store.get_string(keys::BADGE_COLOR).expect("read").as_deref(),
        Some("#999999")
    );
}

#[tokio::test]
async fn test_logout_without_backend_still_succeeds() {
    let store = MemoryStore::shared();
    store
        .set_json(json!({ keys::ACCESS_TOKEN: "a1", keys::REFRESH_TOKEN: "r1" }))
        .expect("seed");
    let config = Config {
        api_base_url: Some("http://127.0.0.1:9".to_string()),
        connect_timeout_seconds: 1,
        ..Config::default()
    };
    let service = service(&config, &store);

    assert!(service.handle(Request::Logout).await.success);
    assert_eq!(store.get_string(keys::ACCESS_TOKEN).expect("read"), None);
}

#[tokio::test]
async fn test_sync_after_refresh_failure_reports_not_logged_in() {
    if !can_bind_localhost() {
        return;
    }

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/refresh"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let store = MemoryStore::shared();
    store
        .set_json(json!({
            keys::ACCESS_TOKEN: "a1",
            keys::REFRESH_TOKEN: "r1",
            keys::USER_EMAIL: "ana@example.com",
        }))
        .expect("seed");
    let service = service(&credential_config(&server), &store);

    assert!(!service.refresh().await);
    assert_eq!(service.sync_now().await, SyncOutcome::NotLoggedIn);

    let response = service.handle(Request::SyncNow).await;
    assert!(!response.success);
    assert_eq!(response.error.as_deref(), Some("Not logged in"));
    assert_eq!(
        store.get_string(keys::BADGE_TEXT).expect("read").as_deref(),
        Some("!")
    );
}

#[tokio::test]
async fn test_status_reflects_store() {
    let store = MemoryStore::shared();
    let service = service(&Config::default(), &store);

    let report = service.status().expect("status");
    assert!(!report.logged_in);
    assert_eq!(report.api_base_url, None);
    assert_eq!(report.last_sync, None);

    SyncResult::failed("HTTP 502", Default::default())
        .persist(store.as_ref())
        .expect("persist");
    store
        .set_json(json!({ keys::ACCESS_TOKEN: "a1", keys::USER_EMAIL: "ana@example.com" }))
        .expect("seed");
    let report = service.status().expect("status");
    assert!(report.logged_in);
    assert_eq!(report.user_email.as_deref(), Some("ana@example.com"));
    let last = report.last_sync.expect("last sync");
    assert_eq!(last.status, SyncStatus::Error);
    assert_eq!(last.error_message.as_deref(), Some("HTTP 502"));
}
