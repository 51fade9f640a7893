//! Inbound HTTP adapter.
//!
//! A thin dispatch layer over the store: the key is the request path after
//! the leading `/`, the body is the raw value, and the `X-Replication`
//! header marks a mutation as a replication echo (apply locally, never fan
//! out). Everything stateful lives in the store; this module only maps
//! HTTP to store calls and errors to status codes.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use hyper_util::server::graceful::GracefulShutdown;
use quorumkv_store::{PeerClient, Store, REPLICATION_HEADER};
use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::time::Duration;

/// Grace window for draining in-flight requests after shutdown is
/// requested; requests still running afterwards are abandoned.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Accept connections on `listener` and serve the store until `shutdown`
/// resolves, then drain in-flight requests for up to [`DRAIN_TIMEOUT`].
pub async fn serve<C, F>(
    listener: TcpListener,
    store: Arc<Store<C>>,
    shutdown: F,
) -> std::io::Result<()>
where
    C: PeerClient,
    F: Future<Output = ()>,
{
    let graceful = GracefulShutdown::new();
    let mut shutdown = std::pin::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, _) = accepted?;
                let io = TokioIo::new(stream);
                let store = store.clone();
                let conn = http1::Builder::new().serve_connection(
                    io,
                    service_fn(move |req| handle(store.clone(), req)),
                );
                let conn = graceful.watch(conn);
                tokio::spawn(async move {
                    if let Err(e) = conn.await {
                        tracing::debug!(error = %e, "connection error");
                    }
                });
            }
            _ = &mut shutdown => break,
        }
    }

    tokio::select! {
        _ = graceful.shutdown() => {
            tracing::info!("in-flight requests drained");
        }
        _ = tokio::time::sleep(DRAIN_TIMEOUT) => {
            tracing::warn!("drain window elapsed, abandoning in-flight requests");
        }
    }
    Ok(())
}

async fn handle<C: PeerClient>(
    store: Arc<Store<C>>,
    req: Request<Incoming>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = match (&method, path.as_str()) {
        (&Method::GET, "/health") => text(StatusCode::OK, "OK"),
        (&Method::GET, _) => handle_get(store, &path).await,
        (&Method::PUT, _) => handle_put(store, req, &path).await,
        (&Method::DELETE, _) => handle_delete(store, &req, &path).await,
        _ => text(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed"),
    };

    tracing::info!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        "request"
    );
    Ok(response)
}

async fn handle_get<C: PeerClient>(store: Arc<Store<C>>, path: &str) -> Response<Full<Bytes>> {
    let key = key_from_path(path);
    match store.get(&key).await {
        Some(value) => text(StatusCode::OK, value),
        None => text(StatusCode::NOT_FOUND, "Not found"),
    }
}

async fn handle_put<C: PeerClient>(
    store: Arc<Store<C>>,
    req: Request<Incoming>,
    path: &str,
) -> Response<Full<Bytes>> {
    let key = key_from_path(path);
    let skip_replication = is_replication_echo(&req);
    let existed = store.get(&key).await.is_some();

    let body = match req.into_body().collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(_) => return text(StatusCode::BAD_REQUEST, "Invalid request body"),
    };
    let value = match String::from_utf8(body.to_vec()) {
        Ok(value) => value,
        Err(_) => return text(StatusCode::BAD_REQUEST, "Invalid request body"),
    };

    match store.set(&key, &value, skip_replication).await {
        Ok(()) if existed => text(StatusCode::OK, ""),
        Ok(()) => text(StatusCode::CREATED, ""),
        Err(e) => text(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

async fn handle_delete<C: PeerClient>(
    store: Arc<Store<C>>,
    req: &Request<Incoming>,
    path: &str,
) -> Response<Full<Bytes>> {
    let key = key_from_path(path);
    let skip_replication = is_replication_echo(req);

    match store.delete(&key, skip_replication).await {
        Ok(()) => text(StatusCode::OK, ""),
        Err(e) => text(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    }
}

/// Key = path after the leading `/`, whitespace-trimmed.
fn key_from_path(path: &str) -> String {
    path.strip_prefix('/').unwrap_or(path).trim().to_string()
}

fn is_replication_echo<B>(req: &Request<B>) -> bool {
    req.headers()
        .get(REPLICATION_HEADER)
        .and_then(|value| value.to_str().ok())
        == Some("true")
}

fn text(status: StatusCode, body: impl Into<Bytes>) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .body(Full::new(body.into()))
        .expect("valid HTTP response")
}
