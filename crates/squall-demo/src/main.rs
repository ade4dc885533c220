//! squall demo server
//!
//! ```text
//! SQUALL_PORT=8080 RUST_LOG=squall_core=debug cargo run -p squall-demo
//! curl -i localhost:8080/hello
//! curl -i localhost:8080/users/42
//! ```

use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use serde_json::json;
use squall_core::middleware::{RequestId, SecurityHeaders};
use squall_core::response::ChunkError;
use squall_core::{
    handler, Body, ChunkSource, DynamicResponse, MediaType, RouteGroup, RouteTemplate, Router,
    Server, ServerConfig, StaticRoute, StatusCode,
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// Use mimalloc for better performance
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env()?;
    tracing::info!(
        host = %config.hostname,
        port = config.port,
        workers = config.workers,
        "configuration loaded"
    );

    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.workers)
        .enable_all()
        .build()?
        .block_on(run(config))
}

fn routes() -> Result<Router, squall_core::RouterError> {
    let ticker = ChunkSource::new(|| {
        stream::iter(0..5)
            .then(|i| async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Ok::<_, ChunkError>(Bytes::from(format!("tick {}\n", i)))
            })
            .boxed()
    });

    let api = RouteGroup::new("/api")
        .middleware(RequestId::default())
        .get(
            "/users/:id",
            handler(|_, response| async move {
                let id = response.parameter(0).unwrap_or_default().to_string();
                Ok(response.with_body(Body::Json(json!({ "id": id }))))
            }),
        )
        .post(
            "/echo",
            handler(|request, response| async move {
                Ok(response.with_body(Body::Bytes(request.body())))
            }),
        );

    Router::builder()
        .static_middleware(SecurityHeaders::default())
        .get_static("/", RouteTemplate::html("<h1>squall</h1>").dated(true))
        .get_static("/hello", RouteTemplate::text("Hello, World!").dated(true))
        .static_route(
            StaticRoute::get("/Status", RouteTemplate::json(r#"{"status":"ok"}"#)).case_insensitive(),
        )
        .get_static("/ticker", RouteTemplate::chunked(MediaType::TextPlain, ticker))
        .get(
            "/users/:id",
            handler(|_, response| async move {
                let id = response.parameter(0).unwrap_or_default().to_string();
                Ok(response.with_body(Body::Text(id)))
            }),
        )
        .get(
            "/files/*",
            handler(|_, response| async move {
                let path = response.parameters.join("/");
                Ok(response.with_body(Body::Text(path)))
            }),
        )
        .group(api)
        .not_found_handler(handler(|request, _| async move {
            Ok(DynamicResponse::json(json!({
                "error": "not found",
                "path": request.path(),
            }))
            .with_status(StatusCode::NOT_FOUND))
        }))
        .build()
}

async fn run(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let router = routes()?;
    tracing::info!(routes = router.route_count(), "router ready");

    let server = Server::bind(&config, Arc::new(router)).await?;
    let handle = server.shutdown_handle();
    let serving = tokio::spawn(server.serve());

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");
    handle.graceful_shutdown(Some(DRAIN_TIMEOUT)).await;
    serving.await??;
    Ok(())
}
