//! End-to-end dispatch over in-memory connections

use squall_core::server::{serve_connection, ConnectionLimits};
use squall_core::{
    handler, Body, ChunkSource, DateHeaderCache, DispatchOutcome, DynamicRoute, HeaderName,
    MediaType, Method, RouteTemplate, Router, StaticRoute, StatusCode, Tier, UnmatchedPolicy,
};
use bytes::Bytes;
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt};

fn limits() -> ConnectionLimits {
    ConnectionLimits {
        max_head_size: 8 * 1024,
        max_body_size: 64 * 1024,
        read_timeout: Duration::from_secs(5),
    }
}

fn epoch_dates() -> Arc<DateHeaderCache> {
    Arc::new(DateHeaderCache::at(UNIX_EPOCH + Duration::from_secs(784111777)))
}

/// Send `raw`, return the dispatch outcome and everything written back
async fn roundtrip(router: &Router, raw: &str) -> (DispatchOutcome, String) {
    let (mut client, server) = duplex(64 * 1024);
    client.write_all(raw.as_bytes()).await.unwrap();
    let outcome = serve_connection(router, server, &limits()).await.unwrap();
    let mut out = Vec::new();
    client.read_to_end(&mut out).await.unwrap();
    (outcome, String::from_utf8(out).unwrap())
}

fn split(response: &str) -> (&str, &str) {
    response.split_once("\r\n\r\n").unwrap()
}

fn echo_parameters() -> squall_core::DynamicHandler {
    handler(|_, response| async move {
        let joined = response.parameters.join(",");
        Ok(response.with_body(Body::Text(joined)))
    })
}

#[tokio::test]
async fn hello_round_trip() {
    let router = Router::builder()
        .dates(epoch_dates())
        .get_static("/hello", RouteTemplate::text("Hello, World!").dated(true))
        .build()
        .unwrap();

    let (outcome, response) = roundtrip(&router, "GET /hello HTTP/1.1\r\nHost: localhost\r\n\r\n").await;
    assert_eq!(outcome, DispatchOutcome::Responded(Tier::StaticSensitive));
    assert_eq!(
        response,
        "HTTP/1.1 200\r\n\
         date: Sun, 06 Nov 1994 08:49:37 GMT\r\n\
         content-type: text/plain\r\n\
         content-length: 13\r\n\
         \r\n\
         Hello, World!"
    );
}

#[tokio::test]
async fn query_string_ignored_for_static_lookup() {
    let router = Router::builder()
        .get_static("/hello", RouteTemplate::text("hi"))
        .build()
        .unwrap();
    let (outcome, response) = roundtrip(&router, "GET /hello?name=x#frag HTTP/1.1\r\n\r\n").await;
    assert!(outcome.responded());
    assert!(response.ends_with("\r\n\r\nhi"));
}

#[tokio::test]
async fn case_insensitive_fallback() {
    let router = Router::builder()
        .static_route(StaticRoute::get("/Status", RouteTemplate::json(r#"{"ok":true}"#)).case_insensitive())
        .build()
        .unwrap();

    for path in ["/Status", "/status", "/STATUS"] {
        let (outcome, response) = roundtrip(&router, &format!("GET {} HTTP/1.1\r\n\r\n", path)).await;
        assert_eq!(outcome, DispatchOutcome::Responded(Tier::StaticInsensitive), "{}", path);
        assert!(response.ends_with(r#"{"ok":true}"#));
    }

    let (outcome, _) = roundtrip(&router, "POST /status HTTP/1.1\r\n\r\n").await;
    assert_eq!(outcome, DispatchOutcome::Unmatched);
}

#[tokio::test]
async fn dynamic_parameter_echo() {
    let router = Router::builder()
        .get("/users/:id", echo_parameters())
        .build()
        .unwrap();

    let (outcome, response) = roundtrip(&router, "GET /users/42 HTTP/1.1\r\n\r\n").await;
    assert_eq!(outcome, DispatchOutcome::Responded(Tier::DynamicSensitive));
    let (head, body) = split(&response);
    assert!(head.starts_with("HTTP/1.1 200\r\ndate: "));
    assert!(head.contains("content-type: text/plain; charset=utf-8"));
    assert!(head.ends_with("content-length: 2"));
    assert_eq!(body, "42");
}

#[tokio::test]
async fn no_match_without_not_found_closes() {
    let router = Router::builder()
        .get_static("/hello", RouteTemplate::text("hi"))
        .build()
        .unwrap();
    let (outcome, response) = roundtrip(&router, "GET /missing HTTP/1.1\r\n\r\n").await;
    assert_eq!(outcome, DispatchOutcome::Unmatched);
    assert!(response.is_empty());

    let router = Router::builder()
        .unmatched(UnmatchedPolicy::BareNotFound)
        .build()
        .unwrap();
    let (_, response) = roundtrip(&router, "GET /missing HTTP/1.1\r\n\r\n").await;
    assert_eq!(response, "HTTP/1.1 404\r\ncontent-length: 0\r\n\r\n");
}

#[tokio::test]
async fn no_match_with_not_found() {
    let router = Router::builder()
        .not_found(
            RouteTemplate::html("<h1>Not Found</h1>")
                .status(StatusCode::NOT_FOUND)
                .header(HeaderName::CacheControl, "no-store"),
        )
        .build()
        .unwrap();
    let (outcome, response) = roundtrip(&router, "GET /missing HTTP/1.1\r\n\r\n").await;
    assert_eq!(outcome, DispatchOutcome::NotFound);
    assert_eq!(
        response,
        "HTTP/1.1 404\r\n\
         cache-control: no-store\r\n\
         content-type: text/html; charset=utf-8\r\n\
         content-length: 18\r\n\
         \r\n\
         <h1>Not Found</h1>"
    );
}

#[tokio::test]
async fn catch_all_absorbs_tail() {
    let router = Router::builder()
        .get("/static/*", echo_parameters())
        .get("/repo/:owner/*", echo_parameters())
        .build()
        .unwrap();

    let (_, response) = roundtrip(&router, "GET /static/css/app.css HTTP/1.1\r\n\r\n").await;
    assert_eq!(split(&response).1, "css,app.css");

    let (_, response) = roundtrip(&router, "GET /repo/squall/tree/main/src HTTP/1.1\r\n\r\n").await;
    assert_eq!(split(&response).1, "squall,tree,main,src");

    let (outcome, _) = roundtrip(&router, "GET /other/x HTTP/1.1\r\n\r\n").await;
    assert_eq!(outcome, DispatchOutcome::Unmatched);
}

#[tokio::test]
async fn parameterless_priority() {
    let router = Router::builder()
        .get("/:name", echo_parameters())
        .get("/health", handler(|_, r| async move { Ok(r.with_body(Body::Text("healthy".into()))) }))
        .build()
        .unwrap();

    let (_, response) = roundtrip(&router, "GET /health HTTP/1.1\r\n\r\n").await;
    assert_eq!(split(&response).1, "healthy");
    let (_, response) = roundtrip(&router, "GET /metrics HTTP/1.1\r\n\r\n").await;
    assert_eq!(split(&response).1, "metrics");
}

#[tokio::test]
async fn bucket_isolation() {
    let router = Router::builder()
        .get("/a/:x", handler(|_, r| async move { Ok(r.with_body(Body::Text("two".into()))) }))
        .get("/a/:x/:y", handler(|_, r| async move { Ok(r.with_body(Body::Text("three".into()))) }))
        .build()
        .unwrap();

    let (_, response) = roundtrip(&router, "GET /a/1 HTTP/1.1\r\n\r\n").await;
    assert_eq!(split(&response).1, "two");
    let (_, response) = roundtrip(&router, "GET /a/1/2 HTTP/1.1\r\n\r\n").await;
    assert_eq!(split(&response).1, "three");
    let (outcome, _) = roundtrip(&router, "GET /a/1/2/3 HTTP/1.1\r\n\r\n").await;
    assert_eq!(outcome, DispatchOutcome::Unmatched);
}

#[tokio::test]
async fn content_length_matches_body() {
    let body = "é".repeat(100);
    let router = Router::builder()
        .get_static("/big", RouteTemplate::text(body.as_str()))
        .post(
            "/echo",
            handler(|request, r| async move { Ok(r.with_body(Body::Bytes(request.body()))) }),
        )
        .build()
        .unwrap();

    let (_, response) = roundtrip(&router, "GET /big HTTP/1.1\r\n\r\n").await;
    let (head, rest) = split(&response);
    assert!(head.ends_with(&format!("content-length: {}", body.len())));
    assert_eq!(rest, body);

    let (_, response) =
        roundtrip(&router, "POST /echo HTTP/1.1\r\nContent-Length: 11\r\n\r\nhello world").await;
    let (head, rest) = split(&response);
    assert!(head.ends_with("content-length: 11"));
    assert_eq!(rest, "hello world");
}

#[tokio::test]
async fn chunked_static_route() {
    let source = ChunkSource::from_chunks([
        Bytes::from_static(b"first "),
        Bytes::from_static(b"second"),
    ]);
    let router = Router::builder()
        .get_static("/stream", RouteTemplate::chunked(MediaType::TextPlain, source))
        .build()
        .unwrap();

    for _ in 0..2 {
        let (_, response) = roundtrip(&router, "GET /stream HTTP/1.1\r\n\r\n").await;
        assert!(response.contains("transfer-encoding: chunked\r\n\r\n"));
        assert!(response.ends_with("6\r\nfirst \r\n6\r\nsecond\r\n0\r\n\r\n"));
    }
}

#[tokio::test]
async fn http10_route_is_separate() {
    let router = Router::builder()
        .static_route(StaticRoute::get("/old", RouteTemplate::text("1.0")).version(squall_core::HttpVersion::Http10))
        .dynamic(
            DynamicRoute::new(Method::Get, "/old").unwrap(),
            handler(|_, r| async move { Ok(r.with_body(Body::Text("1.1".into()))) }),
        )
        .build()
        .unwrap();

    let (_, response) = roundtrip(&router, "GET /old HTTP/1.0\r\n\r\n").await;
    assert!(response.starts_with("HTTP/1.0 200\r\n"));
    assert!(response.ends_with("1.0"));
    let (_, response) = roundtrip(&router, "GET /old HTTP/1.1\r\n\r\n").await;
    assert!(response.ends_with("1.1"));
}

#[tokio::test]
async fn many_static_routes_resolve_exactly() {
    let mut builder = Router::builder();
    for i in 0..120 {
        builder = builder.get_static(&format!("/page/{}", i), RouteTemplate::text(format!("page {}", i)));
    }
    let router = builder.build().unwrap();
    assert_eq!(router.route_count(), 120);

    for i in [0, 7, 63, 119] {
        let (_, response) = roundtrip(&router, &format!("GET /page/{} HTTP/1.1\r\n\r\n", i)).await;
        assert_eq!(split(&response).1, format!("page {}", i));
    }
    let (outcome, _) = roundtrip(&router, "GET /page/120 HTTP/1.1\r\n\r\n").await;
    assert_eq!(outcome, DispatchOutcome::Unmatched);
}
