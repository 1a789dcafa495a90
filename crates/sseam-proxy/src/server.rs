//! Actix Web proxy server.
//!
//! Every inbound request, whatever its method and path, lands on one handler
//! that forwards it to the configured upstream with auth injected, then
//! relays the response in one of three modes: rewritten SSE streaming,
//! verbatim passthrough, or mirrored upstream error. Transport failures
//! reaching the upstream become a 502 with a plain-text explanation.

use crate::{config::ProxyConfig, rewrite, streaming};
use actix_web::dev::Server;
use actix_web::{http::StatusCode, web, App, HttpRequest, HttpResponse, HttpServer};
use anyhow::{Context, Result};
use futures::StreamExt;
use tracing::{debug, error, info};

/// Framing headers the proxy regenerates rather than mirrors.
const UNMIRRORED_HEADERS: [&str; 3] = ["transfer-encoding", "connection", "content-length"];

/// Request bodies larger than this are rejected before forwarding.
const MAX_INBOUND_BODY_BYTES: usize = 64 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub config: ProxyConfig,
    pub client: reqwest::Client,
}

/// Bind the proxy and return the server future plus the bound port.
///
/// Binding is split from serving so a caller asking for port `0` can learn
/// the kernel-assigned port before the server starts accepting.
pub fn bind(config: ProxyConfig, host: &str, port: u16) -> Result<(Server, u16)> {
    let client = reqwest::Client::builder()
        // Force HTTP/1.1 upstream to avoid HTTP/2 RST_STREAM resets
        // mid-generation.
        .http1_only()
        .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
        .build()
        .context("failed to build reqwest client")?;

    let state = web::Data::new(AppState { config, client });

    let server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .app_data(web::PayloadConfig::new(MAX_INBOUND_BODY_BYTES))
            .default_service(web::to(proxy))
    })
    .bind((host, port))
    .with_context(|| format!("failed to bind {}:{}", host, port))?;

    let bound_port = server
        .addrs()
        .first()
        .map(|addr| addr.port())
        .context("server bound no addresses")?;

    Ok((server.run(), bound_port))
}

/// Bind and serve until the process is killed.
pub async fn serve(config: ProxyConfig, host: &str, port: u16) -> Result<()> {
    let (server, bound_port) = bind(config, host, port)?;
    info!(%host, port = bound_port, "sseam-proxy listening");
    server.await.context("server error")
}

async fn proxy(state: web::Data<AppState>, req: HttpRequest, body: web::Bytes) -> HttpResponse {
    let config = &state.config;

    // Rewrite hardcoded fast-model names in the request too, so request
    // and response stay consistent.
    let body = match config.model_override.as_deref() {
        Some(model) if !body.is_empty() => rewrite::rewrite_request_model(&body, model)
            .map(web::Bytes::from)
            .unwrap_or(body),
        _ => body,
    };

    let path = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| req.uri().path());
    let url = config.upstream_url(path);

    let method = reqwest::Method::from_bytes(req.method().as_str().as_bytes())
        .unwrap_or(reqwest::Method::GET);
    let content_type = req
        .headers()
        .get(actix_web::http::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("application/json");

    debug!(%method, %url, "forwarding request");

    let mut outgoing = state
        .client
        .request(method, &url)
        .header("Authorization", format!("Bearer {}", config.api_key))
        .header("Content-Type", content_type)
        .header("Connection", "keep-alive");
    if !body.is_empty() {
        outgoing = outgoing.body(body.to_vec());
    }

    let upstream = match outgoing.send().await {
        Ok(resp) => resp,
        Err(e) => {
            error!(error = %e, %url, "upstream request failed");
            return upstream_failure(&e);
        }
    };

    forward_response(upstream, config.model_override.clone()).await
}

async fn forward_response(
    upstream: reqwest::Response,
    model_override: Option<String>,
) -> HttpResponse {
    let status = StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::OK);
    let headers = upstream.headers().clone();

    let mut response = HttpResponse::build(status);
    for (name, value) in headers.iter() {
        if UNMIRRORED_HEADERS.contains(&name.as_str()) {
            continue;
        }
        response.append_header((name.as_str(), value.as_bytes()));
    }

    // Upstream-reported errors are mirrored verbatim, body included; they
    // are not proxy failures.
    if upstream.status().is_client_error() || upstream.status().is_server_error() {
        return match upstream.bytes().await {
            Ok(body) => response.body(body),
            Err(e) => upstream_failure(&e),
        };
    }

    let content_type = headers
        .get("content-type")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");

    if content_type.contains("text/event-stream") {
        let stream = streaming::normalize_sse(upstream.bytes_stream(), model_override).map(|item| {
            item.map(web::Bytes::from)
                .map_err(|e| actix_web::error::ErrorInternalServerError(e.to_string()))
        });
        return response.streaming(stream);
    }

    match upstream.bytes().await {
        Ok(body) => response.body(body),
        Err(e) => upstream_failure(&e),
    }
}

/// The proxy's own error for transport-level upstream failures, distinct
/// from errors the upstream itself reported.
fn upstream_failure(e: &dyn std::error::Error) -> HttpResponse {
    HttpResponse::BadGateway()
        .content_type("text/plain")
        .body(format!("Upstream error: {}\n", e))
}
