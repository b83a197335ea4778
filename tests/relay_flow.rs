//! End-to-end tests for the `/http/` proxy flow.

use axum::http::StatusCode;
use cors_relay::config::RelayConfig;
use cors_relay_client::{RelayClient, RelayRequest};

mod common;

use common::{start_programmable_backend, start_relay, start_relay_with, test_client, upstream_client, MockResponse, RecordedRequest};

const MEDIA_HOSTS: [&str; 3] = [
    "video123.googlevideo.com",
    "video456.googlevideo.com",
    "video789.googlevideo.com",
];

fn referer(relay: &common::TestRelay, query: &str) -> String {
    format!("{}/?{}", relay.base(), query)
}

fn exposure(response: &reqwest::Response) -> Vec<String> {
    response.headers()["access-control-expose-headers"]
        .to_str()
        .unwrap()
        .split(',')
        .map(str::to_string)
        .collect()
}

/// Port the client addressed, taken from the `host` header.
fn request_port(request: &RecordedRequest) -> String {
    request
        .header("host")
        .and_then(|h| h.rsplit_once(':'))
        .map(|(_, port)| port.to_string())
        .unwrap_or_default()
}

fn media_url(host: &str, port: &str, id: u32) -> String {
    format!("http://{}:{}/videoplayback?id={}", host, port, id)
}

#[tokio::test]
async fn test_missing_control_channel_is_forbidden() {
    let backend = common::start_mock_backend("never").await;
    let relay = start_relay().await;

    let res = test_client()
        .get(format!("{}/http/{}", relay.base(), backend.url("/")))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    assert_eq!(res.headers()["access-control-allow-origin"], "*");
    assert_eq!(res.text().await.unwrap(), "missing params");
    assert!(backend.requests().is_empty());
}

#[tokio::test]
async fn test_invalid_target_is_rejected_before_dispatch() {
    let relay = start_relay().await;

    let res = test_client()
        .get(format!("{}/http/nonsense", relay.base()))
        .header("referer", referer(&relay, "accept=*/*"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(res.text().await.unwrap(), "invalid url: nonsense");
}

#[tokio::test]
async fn test_malformed_raw_info_is_rejected() {
    let backend = common::start_mock_backend("never").await;
    let relay = start_relay().await;

    let res = test_client()
        .get(format!("{}/http/{}", relay.base(), backend.url("/")))
        .header("referer", referer(&relay, "--raw-info=1000"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert!(backend.requests().is_empty());
}

#[tokio::test]
async fn test_overrides_rebuild_outbound_headers() {
    let backend = common::start_mock_backend("ok").await;
    let relay = start_relay().await;

    let res = test_client()
        .get(format!("{}/http/{}", relay.base(), backend.url("/page?q=1")))
        .header("accept-language", "fr")
        .header("x-inbound", "kept")
        .header("referer", referer(&relay, "x-custom=abc&accept-language=&cookie=a%3D1"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["--s"], "200");
    assert_eq!(res.headers()["--ver"], "10");
    assert_eq!(res.text().await.unwrap(), "ok");

    let requests = backend.requests();
    assert_eq!(requests.len(), 1);
    let seen = &requests[0];
    assert_eq!(seen.path, "/page?q=1");
    assert_eq!(seen.header("x-custom"), Some("abc"));
    assert_eq!(seen.header("cookie"), Some("a=1"));
    assert_eq!(seen.header("x-inbound"), Some("kept"));
    assert_eq!(seen.header("accept-language"), None);
    assert_eq!(seen.header("referer"), None);
    assert_eq!(seen.header("x-cors-relay"), Some("1"));
    assert_eq!(seen.header("host"), Some(backend.addr.to_string().as_str()));
}

#[tokio::test]
async fn test_referer_override_is_forwarded() {
    let backend = common::start_mock_backend("ok").await;
    let relay = start_relay().await;

    let res = test_client()
        .get(format!("{}/http/{}", relay.base(), backend.url("/")))
        .header(
            "referer",
            referer(&relay, "referer=https%3A%2F%2Forigin.example.com%2Fpage"),
        )
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        backend.requests()[0].header("referer"),
        Some("https://origin.example.com/page")
    );
}

#[tokio::test]
async fn test_post_body_is_forwarded() {
    let backend = start_programmable_backend(|req| MockResponse::new(201, req.body.clone())).await;
    let relay = start_relay().await;

    let res = test_client()
        .post(format!("{}/http/{}", relay.base(), backend.url("/submit")))
        .header("referer", referer(&relay, "content-type=text%2Fplain"))
        .body("hello")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::CREATED);
    assert_eq!(res.text().await.unwrap(), "hello");

    let seen = &backend.requests()[0];
    assert_eq!(seen.method, "POST");
    assert_eq!(seen.body, b"hello");
    assert_eq!(seen.header("content-type"), Some("text/plain"));
}

#[tokio::test]
async fn test_redirect_is_remapped_not_followed() {
    let backend = start_programmable_backend(|_| {
        MockResponse::new(302, "")
            .header("Location", "/next")
            .header("Access-Control-Allow-Origin", "https://only.example.com")
    })
    .await;
    let relay = start_relay().await;

    let res = test_client()
        .get(format!("{}/http/{}", relay.base(), backend.url("/start")))
        .header("referer", referer(&relay, "accept=*/*"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status().as_u16(), 312);
    assert_eq!(res.headers()["--s"], "302");
    assert_eq!(res.headers()["--location"], "/next");
    assert!(res.headers().get("location").is_none());
    assert_eq!(res.headers()["access-control-allow-origin"], "*");
    assert_eq!(
        res.headers()["--access-control-allow-origin"],
        "https://only.example.com"
    );
    assert_eq!(backend.requests().len(), 1);
}

#[tokio::test]
async fn test_non_redirect_status_passes_through() {
    let backend = start_programmable_backend(|_| MockResponse::new(404, "gone")).await;
    let relay = start_relay().await;

    let res = test_client()
        .get(format!("{}/http/{}", relay.base(), backend.url("/missing")))
        .header("referer", referer(&relay, "accept=*/*"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    assert_eq!(res.headers()["--s"], "404");
    assert_eq!(res.text().await.unwrap(), "gone");
}

#[tokio::test]
async fn test_embedding_blockers_are_stripped() {
    let backend = start_programmable_backend(|_| {
        MockResponse::new(200, "<html></html>")
            .header("Content-Security-Policy", "default-src 'none'")
            .header("Content-Type", "text/html")
    })
    .await;
    let relay = start_relay().await;

    let res = test_client()
        .get(format!("{}/http/{}", relay.base(), backend.url("/")))
        .header("referer", referer(&relay, "accept=*/*"))
        .send()
        .await
        .unwrap();

    assert!(res.headers().get("content-security-policy").is_none());
    assert_eq!(res.headers()["content-type"], "text/html");
}

#[tokio::test]
async fn test_legacy_client_gets_explicit_exposure() {
    let backend = start_programmable_backend(|_| {
        MockResponse::new(200, "ok")
            .header("Set-Cookie", "a=1")
            .header("Set-Cookie", "b=2")
            .header("X-Foo", "bar")
            .header("Content-Type", "text/plain")
    })
    .await;
    let relay = start_relay().await;

    let res = test_client()
        .get(format!("{}/http/{}", relay.base(), backend.url("/")))
        .header("referer", referer(&relay, "--aceh=1"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["--t"], "1");
    assert!(res.headers().get("set-cookie").is_none());
    let cookies: Vec<_> = res.headers().get_all("--set-cookie").iter().collect();
    assert_eq!(cookies, vec!["a=1", "b=2"]);

    let exposed = exposure(&res);
    assert_eq!(exposed[0], "*");
    for name in ["--set-cookie", "x-foo", "--s", "--ver"] {
        assert!(exposed.iter().any(|n| n == name), "{} not exposed: {:?}", name, exposed);
    }
    assert!(!exposed.iter().any(|n| n == "content-type"));
}

#[tokio::test]
async fn test_modern_client_gets_wildcard_exposure() {
    let backend = start_programmable_backend(|_| {
        MockResponse::new(200, "ok").header("Set-Cookie", "a=1")
    })
    .await;
    let relay = start_relay().await;

    let res = test_client()
        .get(format!("{}/http/{}", relay.base(), backend.url("/")))
        .header("referer", referer(&relay, "accept=*/*"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.headers()["access-control-expose-headers"], "*");
    assert_eq!(res.headers()["--set-cookie"], "a=1");
    assert!(res.headers().get("--t").is_none());
}

#[tokio::test]
async fn test_matching_length_is_not_retried() {
    let backend = start_programmable_backend(|_| MockResponse::new(200, vec![b'x'; 1000])).await;
    let relay = start_relay().await;

    let res = test_client()
        .get(format!("{}/http/{}", relay.base(), backend.url("/file")))
        .header("referer", referer(&relay, "--raw-info=1%7C1000%7C"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert!(res.headers().get("--retry").is_none());
    assert_eq!(res.bytes().await.unwrap().len(), 1000);
    assert_eq!(backend.requests().len(), 1);
}

#[tokio::test]
async fn test_length_mismatch_on_plain_host_is_rejected_without_retry() {
    let backend = start_programmable_backend(|_| MockResponse::new(200, "short")).await;
    let relay = start_relay().await;

    let res = test_client()
        .get(format!("{}/http/{}", relay.base(), backend.url("/file")))
        .header("referer", referer(&relay, "--raw-info=1%7C1000%7C%22tag%22"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(res.headers()["--error"], "bad len: 5, expected: 1000");
    assert_eq!(res.headers()["access-control-expose-headers"], "--error");
    assert_eq!(res.headers()["access-control-allow-origin"], "*");
    assert_eq!(res.text().await.unwrap(), "short");
    assert_eq!(backend.requests().len(), 1);
}

#[tokio::test]
async fn test_media_redirect_payload_is_followed_once() {
    let backend = start_programmable_backend(|req| {
        let port = request_port(req);
        if req.path.ends_with("id=1") {
            MockResponse::new(200, media_url(MEDIA_HOSTS[1], &port, 2))
        } else {
            MockResponse::new(200, vec![b'v'; 1000])
        }
    })
    .await;
    let relay = start_relay_with(
        RelayConfig::default(),
        upstream_client(&MEDIA_HOSTS, backend.addr),
    )
    .await;

    let target = media_url(MEDIA_HOSTS[0], &backend.port().to_string(), 1);
    let res = test_client()
        .get(format!("{}/http/{}", relay.base(), target))
        .header("referer", referer(&relay, "--raw-info=1%7C1000%7C"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    // a single retry is not reported
    assert!(res.headers().get("--retry").is_none());
    assert_eq!(res.bytes().await.unwrap().len(), 1000);

    let requests = backend.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].path, "/videoplayback?id=2");
    assert!(requests[1].header("host").unwrap().starts_with(MEDIA_HOSTS[1]));
}

#[tokio::test]
async fn test_media_retry_outcome_is_final() {
    let backend = start_programmable_backend(|req| {
        let port = request_port(req);
        let next = if req.path.ends_with("id=1") { 2 } else { 3 };
        MockResponse::new(200, media_url(MEDIA_HOSTS[1], &port, next))
    })
    .await;
    let relay = start_relay_with(
        RelayConfig::default(),
        upstream_client(&MEDIA_HOSTS, backend.addr),
    )
    .await;

    let target = media_url(MEDIA_HOSTS[0], &backend.port().to_string(), 1);
    let res = test_client()
        .get(format!("{}/http/{}", relay.base(), target))
        .header("referer", referer(&relay, "--raw-info=1%7C1000%7C"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert!(res.headers()["--error"].to_str().unwrap().starts_with("bad len:"));
    assert_eq!(backend.requests().len(), 2);
}

#[tokio::test]
async fn test_payload_outside_media_pattern_is_not_followed() {
    let backend = start_programmable_backend(|_| {
        MockResponse::new(200, "https://elsewhere.example.com/videoplayback?id=2")
    })
    .await;
    let relay = start_relay_with(
        RelayConfig::default(),
        upstream_client(&MEDIA_HOSTS, backend.addr),
    )
    .await;

    let target = media_url(MEDIA_HOSTS[0], &backend.port().to_string(), 1);
    let res = test_client()
        .get(format!("{}/http/{}", relay.base(), target))
        .header("referer", referer(&relay, "--raw-info=1%7C1000%7C"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        res.text().await.unwrap(),
        "https://elsewhere.example.com/videoplayback?id=2"
    );
    assert_eq!(backend.requests().len(), 1);
}

/// Media backend whose first answer is built by `first`; the alternate
/// (`id=2`) always has the expected 1000 bytes.
async fn media_backend<F>(first: F) -> common::MockBackend
where
    F: Fn(String) -> MockResponse + Send + Sync + 'static,
{
    start_programmable_backend(move |req| {
        if req.path.ends_with("id=1") {
            first(media_url(MEDIA_HOSTS[1], &request_port(req), 2))
        } else {
            MockResponse::new(200, vec![b'v'; 1000])
        }
    })
    .await
}

async fn fetch_media(relay: &common::TestRelay, backend: &common::MockBackend) -> reqwest::Response {
    let target = media_url(MEDIA_HOSTS[0], &backend.port().to_string(), 1);
    test_client()
        .get(format!("{}/http/{}", relay.base(), target))
        .header("referer", referer(relay, "--raw-info=1%7C1000%7C"))
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn test_cut_off_redirect_payload_is_not_followed() {
    let backend = media_backend(|alternate| {
        let cut = &alternate[..alternate.len() - 2];
        MockResponse::new(200, cut).declare_length(80)
    })
    .await;
    let relay = start_relay_with(
        RelayConfig::default(),
        upstream_client(&MEDIA_HOSTS, backend.addr),
    )
    .await;

    let res = fetch_media(&relay, &backend).await;

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(res.headers()["--error"], "bad len: 80, expected: 1000");
    let body = res.text().await.unwrap();
    let alternate = media_url(MEDIA_HOSTS[1], &backend.port().to_string(), 2);
    assert!(alternate[..alternate.len() - 2].starts_with(&body));
    let paths: Vec<_> = backend.requests().into_iter().map(|r| r.path).collect();
    assert_eq!(paths, vec!["/videoplayback?id=1"]);
}

fn padded_alternate(alternate: String) -> Vec<u8> {
    let mut body = alternate.into_bytes();
    body.resize(2100, b' ');
    body
}

#[tokio::test]
async fn test_large_announced_payload_is_passed_back_whole() {
    let backend = media_backend(|alternate| MockResponse::new(200, padded_alternate(alternate))).await;
    let relay = start_relay_with(
        RelayConfig::default(),
        upstream_client(&MEDIA_HOSTS, backend.addr),
    )
    .await;

    let res = fetch_media(&relay, &backend).await;

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(res.headers()["--error"], "bad len: 2100, expected: 1000");
    let expected = padded_alternate(media_url(MEDIA_HOSTS[1], &backend.port().to_string(), 2));
    assert_eq!(res.bytes().await.unwrap().to_vec(), expected);
    assert_eq!(backend.requests().len(), 1);
}

#[tokio::test]
async fn test_large_chunked_payload_is_passed_back_whole() {
    let backend = media_backend(|alternate| {
        MockResponse::new(200, padded_alternate(alternate)).chunked(1000)
    })
    .await;
    let relay = start_relay_with(
        RelayConfig::default(),
        upstream_client(&MEDIA_HOSTS, backend.addr),
    )
    .await;

    let res = fetch_media(&relay, &backend).await;

    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(res.headers()["--error"], "bad len: , expected: 1000");
    let expected = padded_alternate(media_url(MEDIA_HOSTS[1], &backend.port().to_string(), 2));
    assert_eq!(res.bytes().await.unwrap().to_vec(), expected);
    assert_eq!(backend.requests().len(), 1);
}

#[tokio::test]
async fn test_configured_retry_limit_reports_attempts() {
    let backend = start_programmable_backend(|req| {
        let port = request_port(req);
        if req.path.ends_with("id=1") {
            MockResponse::new(200, media_url(MEDIA_HOSTS[1], &port, 2))
        } else if req.path.ends_with("id=2") {
            MockResponse::new(200, media_url(MEDIA_HOSTS[2], &port, 3))
        } else {
            MockResponse::new(200, vec![b'v'; 1000])
        }
    })
    .await;
    let mut config = RelayConfig::default();
    config.relay.max_retry = 2;
    let relay = start_relay_with(config, upstream_client(&MEDIA_HOSTS, backend.addr)).await;

    let target = media_url(MEDIA_HOSTS[0], &backend.port().to_string(), 1);
    let res = test_client()
        .get(format!("{}/http/{}", relay.base(), target))
        .header("referer", referer(&relay, "--raw-info=1%7C1000%7C"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["--retry"], "2");
    assert_eq!(backend.requests().len(), 3);
}

#[tokio::test]
async fn test_unreachable_origin_is_bad_gateway() {
    let closed = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = closed.local_addr().unwrap();
    drop(closed);
    let relay = start_relay().await;

    let res = test_client()
        .get(format!("{}/http/http://{}/", relay.base(), addr))
        .header("referer", referer(&relay, "accept=*/*"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::BAD_GATEWAY);
    assert_eq!(res.headers()["access-control-allow-origin"], "*");
    assert!(res.text().await.unwrap().starts_with("proxy error:"));
}

#[tokio::test]
async fn test_relayed_request_is_refused() {
    let backend = common::start_mock_backend("never").await;
    let relay = start_relay().await;

    let res = test_client()
        .get(format!("{}/http/{}", relay.base(), backend.url("/")))
        .header("referer", referer(&relay, "accept=*/*"))
        .header("x-cors-relay", "1")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::LOOP_DETECTED);
    assert!(backend.requests().is_empty());
}

#[tokio::test]
async fn test_sdk_round_trip() {
    let backend = start_programmable_backend(|_| {
        MockResponse::new(301, "")
            .header("Location", "https://example.com/moved")
            .header("Set-Cookie", "sid=1")
    })
    .await;
    let relay = start_relay().await;

    let client = RelayClient::with_client(&relay.base(), test_client());
    let response = client
        .fetch(RelayRequest::get(&backend.url("/old")).header("x-token", "t"))
        .await
        .unwrap();

    assert_eq!(response.relay_status.as_u16(), 311);
    assert_eq!(response.status, StatusCode::MOVED_PERMANENTLY);
    assert_eq!(response.headers["location"], "https://example.com/moved");
    assert_eq!(response.headers["set-cookie"], "sid=1");
    assert_eq!(response.retries, 0);
    assert!(response.error.is_none());
    assert_eq!(backend.requests()[0].header("x-token"), Some("t"));
}
