//! End-to-end tests for the verification endpoint.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use tokio::net::TcpListener;
use tower::ServiceExt;

use ip_gate::{
    AccessDecisionEngine, AccessGate, AppState, AuthorizationRecord, AuthorizationStore,
    CandidateExtractor, MemoryStore, PublicAccessConfig, ResponseMode, StoreError,
    VerifyResponse, allowlist::parse_entries, build_router,
};

struct UnavailableStore;

#[async_trait]
impl AuthorizationStore for UnavailableStore {
    async fn active_records(&self) -> Result<Vec<AuthorizationRecord>, StoreError> {
        Err(StoreError::Unavailable("firestore down".into()))
    }

    async fn public_access(&self) -> Result<PublicAccessConfig, StoreError> {
        Err(StoreError::Unavailable("firestore down".into()))
    }
}

struct BrokenStore;

#[async_trait]
impl AuthorizationStore for BrokenStore {
    async fn active_records(&self) -> Result<Vec<AuthorizationRecord>, StoreError> {
        panic!("corrupted client state")
    }

    async fn public_access(&self) -> Result<PublicAccessConfig, StoreError> {
        Ok(PublicAccessConfig::default())
    }
}

fn make_state(
    store: Arc<dyn AuthorizationStore>,
    hardcoded: &[&str],
    response_mode: ResponseMode,
) -> AppState {
    let engine = AccessDecisionEngine::new(
        CandidateExtractor::default(),
        parse_entries(hardcoded).expect("entries"),
    );
    AppState {
        gate: Arc::new(AccessGate::new(engine, store, Duration::from_millis(200))),
        response_mode,
    }
}

fn default_state() -> AppState {
    let store = MemoryStore::with_records(vec![
        AuthorizationRecord {
            ip: "198.51.100.20".to_string(),
            kind: Some("ipv4".to_string()),
            description: Some("Escritório".to_string()),
            added_by: Some("admin@genoi.com".to_string()),
            active: true,
        },
        AuthorizationRecord {
            ip: "198.51.100.21".to_string(),
            active: false,
            ..AuthorizationRecord::default()
        },
    ]);
    make_state(Arc::new(store), &["127.0.0.1"], ResponseMode::AlwaysOk)
}

fn verify_request(headers: &[(&str, &str)]) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri("/verify-ip");
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(Body::empty()).expect("req")
}

async fn send(state: AppState, request: Request<Body>) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let resp = build_router(state).oneshot(request).await.expect("resp");
    let status = resp.status();
    let headers = resp.headers().clone();
    let body = axum::body::to_bytes(resp.into_body(), 16 * 1024)
        .await
        .expect("body");
    (status, headers, body.to_vec())
}

async fn verify(state: AppState, headers: &[(&str, &str)]) -> (StatusCode, VerifyResponse) {
    let (status, _, body) = send(state, verify_request(headers)).await;
    let parsed = serde_json::from_slice(&body).expect("json body");
    (status, parsed)
}

mod decisions {
    use super::*;

    #[tokio::test]
    async fn hardcoded_address_is_allowed() {
        let (status, body) = verify(default_state(), &[("x-real-ip", "127.0.0.1")]).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.allowed);
        assert_eq!(body.reason, "HARDCODED_IP");
        assert_eq!(body.client_ip.as_deref(), Some("127.0.0.1"));
        assert_eq!(body.ip_type.as_deref(), Some("ipv4"));
        assert_eq!(body.matched_ip.as_deref(), Some("127.0.0.1"));
    }

    #[tokio::test]
    async fn dynamic_address_is_allowed() {
        let (_, body) = verify(
            default_state(),
            &[("x-forwarded-for", "198.51.100.20, 10.0.0.1")],
        )
        .await;
        assert!(body.allowed);
        assert_eq!(body.reason, "FIREBASE_IP");
        assert_eq!(body.matched_ip.as_deref(), Some("198.51.100.20"));
        assert_eq!(body.all_detected_ips, ["198.51.100.20"]);
    }

    #[tokio::test]
    async fn inactive_dynamic_address_is_denied() {
        let (status, body) = verify(default_state(), &[("x-real-ip", "198.51.100.21")]).await;
        assert_eq!(status, StatusCode::OK);
        assert!(!body.allowed);
        assert_eq!(body.reason, "IP_NOT_AUTHORIZED");
        assert!(body.matched_ip.is_none());
    }

    #[tokio::test]
    async fn missing_address_is_not_detected() {
        let (_, body) = verify(default_state(), &[("x-forwarded-for", "unknown")]).await;
        assert!(!body.allowed);
        assert_eq!(body.reason, "IP_NOT_DETECTED");
        assert!(body.client_ip.is_none());
        assert!(body.all_detected_ips.is_empty());
    }

    #[tokio::test]
    async fn public_access_allows_anyone() {
        let store = MemoryStore::new();
        store
            .set_public_access(PublicAccessConfig {
                enabled: true,
                enabled_by: Some("ops".to_string()),
                ..PublicAccessConfig::default()
            })
            .expect("set");
        let state = make_state(Arc::new(store), &[], ResponseMode::AlwaysOk);
        let (_, body) = verify(state, &[]).await;
        assert!(body.allowed);
        assert_eq!(body.reason, "PUBLIC_ACCESS_ENABLED");
    }

    #[tokio::test]
    async fn mapped_ipv6_header_matches_ipv4_entry() {
        let (_, body) = verify(
            default_state(),
            &[("x-nf-client-connection-ip", "::ffff:127.0.0.1")],
        )
        .await;
        assert!(body.allowed);
        assert_eq!(body.ip_type.as_deref(), Some("ipv6"));
    }
}

mod failures {
    use super::*;

    #[tokio::test]
    async fn unavailable_store_fails_closed() {
        let state = make_state(Arc::new(UnavailableStore), &["127.0.0.1"], ResponseMode::AlwaysOk);
        let (_, body) = verify(state.clone(), &[("x-real-ip", "203.0.113.50")]).await;
        assert!(!body.allowed);
        assert_eq!(body.reason, "IP_NOT_AUTHORIZED");

        let (_, body) = verify(state, &[("x-real-ip", "127.0.0.1")]).await;
        assert!(body.allowed);
        assert_eq!(body.reason, "HARDCODED_IP");
    }

    #[tokio::test]
    async fn evaluation_failure_is_a_server_error() {
        for mode in [ResponseMode::AlwaysOk, ResponseMode::HttpStatus] {
            let state = make_state(Arc::new(BrokenStore), &["127.0.0.1"], mode);
            let (status, body) = verify(state, &[("x-real-ip", "127.0.0.1")]).await;
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
            assert!(!body.allowed);
            assert_eq!(body.reason, "VERIFICATION_ERROR");
        }
    }
}

mod response_modes {
    use super::*;

    #[tokio::test]
    async fn http_status_mode_uses_403_for_denial() {
        let state = make_state(Arc::new(MemoryStore::new()), &["127.0.0.1"], ResponseMode::HttpStatus);
        let (status, body) = verify(state.clone(), &[("x-real-ip", "203.0.113.50")]).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(!body.allowed);

        let (status, body) = verify(state, &[("x-real-ip", "127.0.0.1")]).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.allowed);
    }
}

mod transport {
    use super::*;

    fn assert_cors(headers: &axum::http::HeaderMap) {
        assert_eq!(headers["access-control-allow-origin"], "*");
        assert!(
            headers["access-control-allow-headers"]
                .to_str()
                .expect("ascii")
                .contains("Content-Type")
        );
        assert!(
            headers["access-control-allow-methods"]
                .to_str()
                .expect("ascii")
                .contains("POST, OPTIONS")
        );
    }

    #[tokio::test]
    async fn preflight_is_empty_ok_with_cors() {
        let request = Request::builder()
            .method("OPTIONS")
            .uri("/verify-ip")
            .body(Body::empty())
            .expect("req");
        let (status, headers, body) = send(default_state(), request).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.is_empty());
        assert_cors(&headers);
    }

    #[tokio::test]
    async fn decisions_carry_cors_headers() {
        let (_, headers, _) = send(default_state(), verify_request(&[])).await;
        assert_cors(&headers);
    }

    #[tokio::test]
    async fn other_methods_are_rejected_with_cors() {
        let request = Request::builder()
            .method("GET")
            .uri("/verify-ip")
            .body(Body::empty())
            .expect("req");
        let (status, headers, _) = send(default_state(), request).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_cors(&headers);
    }

    #[tokio::test]
    async fn unknown_paths_are_not_found() {
        let request = Request::builder()
            .uri("/nope")
            .body(Body::empty())
            .expect("req");
        let (status, headers, _) = send(default_state(), request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_cors(&headers);
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .expect("req");
        let (status, _, body) = send(default_state(), request).await;
        assert_eq!(status, StatusCode::OK);
        assert!(String::from_utf8(body).expect("utf8").contains("ok"));
    }

    #[tokio::test]
    async fn connection_address_is_used_without_headers() {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        let app = build_router(default_state()).into_make_service_with_connect_info::<SocketAddr>();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        let response = reqwest::Client::new()
            .post(format!("http://{addr}/verify-ip"))
            .send()
            .await
            .expect("send");
        assert_eq!(response.status(), 200);
        let body: VerifyResponse = response.json().await.expect("json");
        assert!(body.allowed);
        assert_eq!(body.reason, "HARDCODED_IP");
        assert_eq!(body.client_ip.as_deref(), Some("127.0.0.1"));
    }
}
