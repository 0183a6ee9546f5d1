//! End-to-end tests for the pop and leaderboard endpoints
//!
//! Requests run through the full router, token gateway included, against
//! an in-memory SQLite database.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use popcat::api::build_app;
use popcat::auth::TokenCodec;
use popcat::config::{
    Config, DatabaseBackend, DatabaseConfig, GeoIpConfig, PopConfig, ServerConfig, TokenConfig,
};
use popcat::geo::{RegionResolver, StaticRegionResolver};
use popcat::models::Pop;
use popcat::storage::{PopTotals, SqliteStorage, Storage, StorageResult};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::{Layer, ServiceExt};

const KR_IP: &str = "203.0.113.7";
const US_IP: &str = "198.51.100.20";

fn test_config() -> Config {
    Config {
        database: DatabaseConfig {
            backend: DatabaseBackend::Sqlite,
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            timeout_ms: 2000,
        },
        api_server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
        },
        token: TokenConfig {
            secret: "popcat-integration-secret-0123456789".to_string(),
            server_address: "127.0.0.1:8080".to_string(),
            ttl_secs: 3600,
            clock_skew_secs: 60,
            pin_region: false,
        },
        pop: PopConfig::default(),
        geoip: GeoIpConfig::default(),
    }
}

async fn create_test_storage() -> Arc<dyn Storage> {
    let storage = SqliteStorage::new("sqlite::memory:", 1).await.unwrap();
    storage.init().await.unwrap();
    Arc::new(storage)
}

fn test_regions() -> Arc<dyn RegionResolver> {
    Arc::new(
        StaticRegionResolver::new("UNKNOWN")
            .with_region(KR_IP, "KR")
            .with_region(US_IP, "US"),
    )
}

/// Helper layer to inject ConnectInfo for tests
#[derive(Clone)]
struct TestConnectInfoLayer;

impl<S> Layer<S> for TestConnectInfoLayer {
    type Service = TestConnectInfoMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TestConnectInfoMiddleware { inner }
    }
}

#[derive(Clone)]
struct TestConnectInfoMiddleware<S> {
    inner: S,
}

impl<S, B> tower::Service<Request<B>> for TestConnectInfoMiddleware<S>
where
    S: tower::Service<Request<B>> + Clone,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        let addr = SocketAddr::from(([127, 0, 0, 1], 12345));
        req.extensions_mut()
            .insert(axum::extract::connect_info::ConnectInfo(addr));
        self.inner.call(req)
    }
}

/// Backend that never answers
struct StalledStorage;

#[async_trait::async_trait]
impl Storage for StalledStorage {
    async fn init(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn add_pops(&self, _: &str, _: &str, _: u64) -> StorageResult<PopTotals> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(PopTotals {
            visitor_count: 0,
            region_count: 0,
        })
    }

    async fn get_visitor_pop(&self, _: &str, _: &str) -> StorageResult<Option<Pop>> {
        Ok(None)
    }

    async fn get_region_pop(&self, _: &str) -> StorageResult<Option<Pop>> {
        Ok(None)
    }

    async fn list_region_pops(&self) -> StorageResult<Vec<Pop>> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(Vec::new())
    }
}

struct TestApp {
    router: Router,
    storage: Arc<dyn Storage>,
    codec: Arc<TokenCodec>,
}

fn build_test_router(
    config: &Config,
    codec: &Arc<TokenCodec>,
    storage: &Arc<dyn Storage>,
) -> Router {
    build_app(config, Arc::clone(codec), Arc::clone(storage), test_regions())
        .layer(TestConnectInfoLayer)
}

async fn create_test_app_with(config: Config) -> TestApp {
    let storage = create_test_storage().await;
    let codec = Arc::new(TokenCodec::new(&config.token).unwrap());
    let router = build_test_router(&config, &codec, &storage);

    TestApp {
        router,
        storage,
        codec,
    }
}

async fn create_test_app() -> TestApp {
    create_test_app_with(test_config()).await
}

fn pop_request(query: &str, ip: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(format!("/api/v1/pop{}", query))
        .header("x-forwarded-for", ip);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    builder.body(Body::empty()).unwrap()
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&body).unwrap())
}

async fn region_count(storage: &Arc<dyn Storage>, region: &str) -> u64 {
    storage
        .get_region_pop(region)
        .await
        .unwrap()
        .map(|p| p.count())
        .unwrap_or(0)
}

#[tokio::test]
async fn test_health_check() {
    let app = create_test_app().await;
    let request = Request::builder()
        .uri("/health")
        .body(Body::empty())
        .unwrap();

    let (status, json) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "OK");
}

#[tokio::test]
async fn test_first_request_only_issues_token() {
    let app = create_test_app().await;

    let (status, json) = send(&app.router, pop_request("?count=10", KR_IP, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["isProcessed"], false);
    assert!(json["data"]["countAppend"].is_null());

    let token = json["data"]["newToken"].as_str().unwrap();
    let claims = app.codec.validate(token, KR_IP).unwrap();
    assert_eq!(claims.region_code, "KR");

    // Absorbed: nothing counted
    assert_eq!(region_count(&app.storage, "KR").await, 0);
    assert!(app
        .storage
        .get_visitor_pop(KR_IP, "KR")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_full_pop_flow() {
    let app = create_test_app().await;

    let (_, json) = send(&app.router, pop_request("", KR_IP, None)).await;
    let first_token = json["data"]["newToken"].as_str().unwrap().to_string();

    let (status, json) = send(
        &app.router,
        pop_request("?count=10", KR_IP, Some(&first_token)),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["isProcessed"], true);
    assert_eq!(json["data"]["countAppend"], 10);
    let second_token = json["data"]["newToken"].as_str().unwrap();
    assert_ne!(second_token, first_token);
    assert!(app.codec.validate(second_token, KR_IP).is_ok());

    let visitor = app.storage.get_visitor_pop(KR_IP, "KR").await.unwrap();
    assert_eq!(visitor.map(|p| p.count()), Some(10));
    assert_eq!(region_count(&app.storage, "KR").await, 10);

    let request = Request::builder()
        .uri("/api/v1/leaderboard")
        .body(Body::empty())
        .unwrap();
    let (status, json) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["globalSum"], 10);
    assert_eq!(json["data"]["rankingList"][0]["regionCode"], "KR");
    assert_eq!(json["data"]["rankingList"][0]["count"], 10);
}

#[tokio::test]
async fn test_pop_count_is_clamped() {
    let app = create_test_app().await;
    let token = app.codec.issue(KR_IP, "KR").unwrap();

    let (_, json) = send(&app.router, pop_request("?count=5000", KR_IP, Some(&token))).await;
    assert_eq!(json["data"]["countAppend"], 800);

    let (_, json) = send(&app.router, pop_request("?count=-5", KR_IP, Some(&token))).await;
    assert_eq!(json["data"]["isProcessed"], true);
    assert_eq!(json["data"]["countAppend"], 0);

    assert_eq!(region_count(&app.storage, "KR").await, 800);
}

#[tokio::test]
async fn test_custom_pop_limit() {
    let mut config = test_config();
    config.pop.max_per_request = 50;
    let app = create_test_app_with(config).await;
    let token = app.codec.issue(KR_IP, "KR").unwrap();

    let (_, json) = send(&app.router, pop_request("?count=60", KR_IP, Some(&token))).await;
    assert_eq!(json["data"]["countAppend"], 50);
}

#[tokio::test]
async fn test_expired_token_is_reissued_without_counting() {
    let app = create_test_app().await;
    let stale = app.codec.issue_at(KR_IP, "KR", 1_000).unwrap();

    let (status, json) = send(&app.router, pop_request("?count=10", KR_IP, Some(&stale))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["isProcessed"], false);
    assert!(json["data"]["countAppend"].is_null());
    let fresh = json["data"]["newToken"].as_str().unwrap();
    assert!(app.codec.validate(fresh, KR_IP).is_ok());

    assert_eq!(region_count(&app.storage, "KR").await, 0);
}

#[tokio::test]
async fn test_token_from_other_ip_is_rejected() {
    let app = create_test_app().await;
    let token = app.codec.issue(KR_IP, "KR").unwrap();

    let (status, json) = send(&app.router, pop_request("?count=10", US_IP, Some(&token))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["success"], false);
    assert_eq!(json["error"]["code"], "INVALID_TOKEN");
    assert!(json.get("data").is_none());

    assert_eq!(region_count(&app.storage, "KR").await, 0);
    assert_eq!(region_count(&app.storage, "US").await, 0);
}

#[tokio::test]
async fn test_garbage_and_foreign_tokens_are_rejected() {
    let app = create_test_app().await;

    let (status, json) = send(&app.router, pop_request("?count=1", KR_IP, Some("not.a.jwt"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"]["code"], "INVALID_TOKEN");

    let mut other = test_config();
    other.token.secret = "a-completely-different-secret-value-xyz".to_string();
    let foreign = TokenCodec::new(&other.token)
        .unwrap()
        .issue(KR_IP, "KR")
        .unwrap();
    let (status, _) = send(&app.router, pop_request("?count=1", KR_IP, Some(&foreign))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_missing_or_bad_count_is_a_validation_error() {
    let app = create_test_app().await;
    let token = app.codec.issue(KR_IP, "KR").unwrap();

    let (status, json) = send(&app.router, pop_request("", KR_IP, Some(&token))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "VALIDATION_ERROR");
    assert!(json["error"]["details"]["count"].is_string());

    let (status, json) = send(&app.router, pop_request("?count=abc", KR_IP, Some(&token))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["details"]["count"], "must be an integer");
}

#[tokio::test]
async fn test_forwarded_for_takes_precedence_over_real_ip() {
    let app = create_test_app().await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/pop")
        .header("x-forwarded-for", format!("{}, 10.0.0.1", US_IP))
        .header("x-real-ip", KR_IP)
        .body(Body::empty())
        .unwrap();
    let (_, json) = send(&app.router, request).await;

    let token = json["data"]["newToken"].as_str().unwrap();
    let claims = app.codec.validate(token, US_IP).unwrap();
    assert_eq!(claims.region_code, "US");
}

#[tokio::test]
async fn test_socket_address_is_used_without_headers() {
    let app = create_test_app().await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/pop")
        .body(Body::empty())
        .unwrap();
    let (status, json) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::OK);

    let token = json["data"]["newToken"].as_str().unwrap();
    let claims = app.codec.validate(token, "127.0.0.1").unwrap();
    assert_eq!(claims.region_code, "UNKNOWN");
}

#[tokio::test]
async fn test_unparseable_ip_fails_issuance() {
    let app = create_test_app().await;

    // Passes the shape check, fails the region lookup
    let (status, json) = send(&app.router, pop_request("", "999.1.1.1", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"]["code"], "INVALID_IP_ADDRESS");
}

#[tokio::test]
async fn test_leaderboard_is_public_and_ranked() {
    let app = create_test_app().await;
    app.storage.add_pops(US_IP, "US", 30).await.unwrap();
    app.storage.add_pops(KR_IP, "KR", 70).await.unwrap();
    app.storage.add_pops("192.0.2.1", "JP", 30).await.unwrap();

    let request = Request::builder()
        .uri("/api/v1/leaderboard")
        .body(Body::empty())
        .unwrap();
    let (status, json) = send(&app.router, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["data"]["globalSum"], 130);

    let ranking: Vec<(&str, u64)> = json["data"]["rankingList"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| (e["regionCode"].as_str().unwrap(), e["count"].as_u64().unwrap()))
        .collect();
    assert_eq!(ranking, vec![("KR", 70), ("JP", 30), ("US", 30)]);
}

#[tokio::test]
async fn test_concurrent_pops_through_api() {
    let app = create_test_app().await;
    let token = app.codec.issue(KR_IP, "KR").unwrap();

    let mut handles = vec![];
    for _ in 0..10 {
        let router = app.router.clone();
        let request = pop_request("?count=7", KR_IP, Some(&token));
        handles.push(tokio::spawn(async move {
            router.oneshot(request).await.unwrap().status()
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap(), StatusCode::OK);
    }

    assert_eq!(region_count(&app.storage, "KR").await, 70);
}

#[tokio::test]
async fn test_pinned_region_rejects_moved_client() {
    let mut config = test_config();
    config.token.pin_region = true;
    let app = create_test_app_with(config).await;

    let token = app.codec.issue(KR_IP, "KR").unwrap();
    let (status, _) = send(&app.router, pop_request("?count=1", KR_IP, Some(&token))).await;
    assert_eq!(status, StatusCode::OK);

    // The resolver maps KR_IP to KR, so a JP-pinned token no longer fits.
    let drifted = app.codec.issue(KR_IP, "JP").unwrap();
    let (status, json) = send(&app.router, pop_request("?count=1", KR_IP, Some(&drifted))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"]["code"], "INVALID_TOKEN");
}

#[tokio::test]
async fn test_stalled_storage_fails_with_internal_error() {
    let mut config = test_config();
    config.database.timeout_ms = 50;
    let storage: Arc<dyn Storage> = Arc::new(StalledStorage);
    let codec = Arc::new(TokenCodec::new(&config.token).unwrap());
    let router = build_test_router(&config, &codec, &storage);

    let token = codec.issue(KR_IP, "KR").unwrap();
    let (status, json) = send(&router, pop_request("?count=10", KR_IP, Some(&token))).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["success"], false);
    assert_eq!(json["error"]["code"], "INTERNAL_SERVER_ERROR");
    assert_eq!(json["error"]["message"], "An unexpected error occurred");

    let request = Request::builder()
        .uri("/api/v1/leaderboard")
        .body(Body::empty())
        .unwrap();
    let (status, json) = send(&router, request).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json["error"]["code"], "INTERNAL_SERVER_ERROR");
}
