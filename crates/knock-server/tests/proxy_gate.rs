//! The full host: gate middleware in front of the reverse proxy.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::ConnectInfo,
    http::{Request, StatusCode, header::LOCATION},
};
use knock_gate::{GateConfig, KnockGate};
use knock_server::build_app;
use knock_server::config::ServerConfig;
use knock_server::proxy::Upstream;
use serde_json::json;
use tower::ServiceExt;
use wiremock::matchers::{body_string, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Harness {
    knock: MockServer,
    upstream: MockServer,
    gate: Arc<KnockGate>,
    app: Router,
}

async fn harness() -> Harness {
    let knock = MockServer::start().await;
    let upstream = MockServer::start().await;
    let gate = Arc::new(
        KnockGate::new(&GateConfig {
            server: knock.uri(),
            svcname: "wiki".to_string(),
            svcsecret: "s3cret".to_string(),
            ..Default::default()
        })
        .unwrap(),
    );
    let proxy = Upstream::new(&ServerConfig {
        upstream: upstream.uri(),
        ..Default::default()
    })
    .unwrap();
    let app = build_app(gate.clone(), Arc::new(proxy));
    Harness {
        knock,
        upstream,
        gate,
        app,
    }
}

async fn mount_verdict(server: &MockServer, ok: bool) {
    Mock::given(method("POST"))
        .and(path("/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": ok })))
        .mount(server)
        .await;
}

fn from_peer(builder: axum::http::request::Builder, body: Body) -> Request<Body> {
    let mut req = builder.body(body).unwrap();
    let addr: SocketAddr = "198.51.100.7:40000".parse().unwrap();
    req.extensions_mut().insert(ConnectInfo(addr));
    req
}

async fn read_body(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn authorized_request_reaches_upstream() {
    let h = harness().await;
    mount_verdict(&h.knock, true).await;
    Mock::given(method("POST"))
        .and(path("/pages"))
        .and(query_param("id", "7"))
        .and(header("x-forwarded-for", "198.51.100.7"))
        .and(body_string("edit"))
        .respond_with(
            ResponseTemplate::new(201)
                .insert_header("x-page", "7")
                .set_body_string("created"),
        )
        .expect(1)
        .mount(&h.upstream)
        .await;

    let req = from_peer(
        Request::builder().method("POST").uri("/pages?id=7"),
        Body::from("edit"),
    );
    let response = h.app.oneshot(req).await.unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(response.headers().get("x-page").unwrap(), "7");
    assert_eq!(read_body(response).await, "created");
}

#[tokio::test]
async fn denied_request_never_reaches_upstream() {
    let h = harness().await;
    mount_verdict(&h.knock, false).await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&h.upstream)
        .await;

    let req = from_peer(Request::builder().uri("/secret"), Body::empty());
    let response = h.app.oneshot(req).await.unwrap();

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response.headers().get(LOCATION).unwrap(),
        format!("{}/", h.knock.uri()).as_str()
    );
}

#[tokio::test]
async fn healthz_bypasses_the_gate() {
    let h = harness().await;

    let req = Request::builder().uri("/healthz").body(Body::empty()).unwrap();
    let response = h.app.oneshot(req).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_body(response).await, "ok");
    assert!(h.knock.received_requests().await.unwrap().is_empty());
    assert_eq!(h.gate.stats().loads, 0);
}

#[tokio::test]
async fn unreachable_upstream_is_bad_gateway() {
    let knock = MockServer::start().await;
    mount_verdict(&knock, true).await;
    let gate = Arc::new(
        KnockGate::new(&GateConfig {
            server: knock.uri(),
            svcname: "wiki".to_string(),
            svcsecret: "s3cret".to_string(),
            ..Default::default()
        })
        .unwrap(),
    );
    let free = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let dead = format!("http://{}", free.local_addr().unwrap());
    drop(free);
    let proxy = Upstream::new(&ServerConfig {
        upstream: dead,
        ..Default::default()
    })
    .unwrap();
    let app = build_app(gate, Arc::new(proxy));

    let req = from_peer(Request::builder().uri("/"), Body::empty());
    let response = app.oneshot(req).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
}
