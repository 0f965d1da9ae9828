//! Development server with hot reload via Server-Sent Events.
//!
//! Serves generated files straight from the output store, disk assets from
//! allow-listed directories, and the endpoints the reload client talks to.

use async_trait::async_trait;
use axum::{
    body::Body,
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response, Sse},
    routing::{get, post},
    Json, Router,
};
use percent_encoding::percent_decode_str;
use serde::Deserialize;
use std::path::{Component, Path};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio_stream::{wrappers::ReceiverStream, StreamExt};
use tower_http::cors::{Any, CorsLayer};

use cinder_config::ServeConfig;

use crate::dev::channel::{ClientEvent, ClientHub};
use crate::dev::lifecycle::{ServerContext, ServerFactory, ServerHandle};
use crate::dev::store::{is_component_stylesheet, StyleEncapsulation, ROOT_DOCUMENT};
use crate::error::{DevError, Result};

pub const SSE_ROUTE: &str = "/__cinder_sse__";
pub const CLIENT_EVENT_ROUTE: &str = "/__cinder_client__";
pub const CLIENT_SCRIPT_ROUTE: &str = "/__cinder_client__.js";
pub const COMPONENT_ROUTE: &str = "/__cinder_component__";
pub const EXTERNALS_ROUTE: &str = "/__cinder_externals__";

const CLIENT_SCRIPT: &str = include_str!("../../assets/dev/client.js");

/// Starts an axum server on the configured address.
#[derive(Debug, Clone)]
pub struct AxumServerFactory {
    serve: ServeConfig,
    hub: Arc<ClientHub>,
}

impl AxumServerFactory {
    pub fn new(serve: ServeConfig, hub: Arc<ClientHub>) -> Self {
        Self { serve, hub }
    }
}

#[async_trait]
impl ServerFactory for AxumServerFactory {
    async fn start(&self, context: ServerContext) -> Result<ServerHandle> {
        let addr = format!("{}:{}", self.serve.host, self.serve.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| DevError::Server(format!("Failed to bind to {}: {}", addr, e)))?;
        let local = listener.local_addr()?;

        let protocol = if self.serve.https { "https" } else { "http" };
        let base_url = format!(
            "{}://{}:{}{}",
            protocol,
            self.serve.host,
            local.port(),
            self.serve.base_path
        );

        let app = build_router(AppState {
            context,
            hub: self.hub.clone(),
        });

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let hub = self.hub.clone();
        let task = tokio::spawn(async move {
            let shutdown = async move {
                let _ = shutdown_rx.await;
                // Open event streams would otherwise hold the shutdown forever.
                hub.disconnect_all();
            };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                tracing::error!("Server error: {}", e);
            }
        });

        Ok(ServerHandle::new(base_url, shutdown_tx, task))
    }
}

#[derive(Debug, Clone)]
struct AppState {
    context: ServerContext,
    hub: Arc<ClientHub>,
}

fn build_router(state: AppState) -> Router {
    Router::new()
        .route(SSE_ROUTE, get(handle_sse))
        .route(CLIENT_EVENT_ROUTE, post(handle_client_event))
        .route(CLIENT_SCRIPT_ROUTE, get(handle_client_script))
        .route(COMPONENT_ROUTE, get(handle_component_template))
        .route(EXTERNALS_ROUTE, get(handle_externals))
        .fallback(handle_request)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

async fn handle_sse(
    State(state): State<AppState>,
) -> Sse<impl tokio_stream::Stream<Item = std::result::Result<axum::response::sse::Event, std::convert::Infallible>>>
{
    use axum::response::sse::{Event, KeepAlive};

    let (id, rx) = state.hub.register_client();
    tracing::debug!("Client {} connected", id);

    let stream = ReceiverStream::new(rx).map(|data| Ok(Event::default().data(data)));

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(std::time::Duration::from_secs(15))
            .text("ping"),
    )
}

async fn handle_client_event(
    State(state): State<AppState>,
    Json(event): Json<ClientEvent>,
) -> StatusCode {
    state.context.inbound.dispatch(event).await;
    StatusCode::NO_CONTENT
}

async fn handle_client_script() -> Response {
    (
        [
            (header::CONTENT_TYPE, "application/javascript"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        CLIENT_SCRIPT,
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
struct ComponentQuery {
    c: String,
}

async fn handle_component_template(
    State(state): State<AppState>,
    Query(query): Query<ComponentQuery>,
) -> Response {
    let code = state
        .context
        .store
        .read()
        .template_update(&query.c)
        .map(str::to_string);

    match code {
        Some(code) => (
            [
                (header::CONTENT_TYPE, "application/javascript"),
                (header::CACHE_CONTROL, "no-cache"),
            ],
            code,
        )
            .into_response(),
        None => not_found(&format!("No pending update for component {}", query.c)),
    }
}

async fn handle_externals(State(state): State<AppState>) -> Response {
    let externals = state.context.store.read().externals().clone();
    Json(externals).into_response()
}

#[derive(Debug, Default, Deserialize)]
struct StyleQuery {
    component: Option<String>,
    encapsulation: Option<String>,
}

/// Serve generated files, component stylesheets and disk assets.
async fn handle_request(
    State(state): State<AppState>,
    uri: Uri,
    Query(query): Query<StyleQuery>,
    headers: HeaderMap,
) -> Response {
    let base_href = state.context.store.read().base_href().map(str::to_owned);
    let Some(path) = request_path(uri.path(), base_href.as_deref()) else {
        return (StatusCode::BAD_REQUEST, "Invalid request path").into_response();
    };

    if is_component_stylesheet(&path) {
        let encapsulation = match query.encapsulation.as_deref() {
            None => StyleEncapsulation::default(),
            Some(value) => match StyleEncapsulation::parse(value) {
                Some(encapsulation) => encapsulation,
                None => {
                    return (
                        StatusCode::BAD_REQUEST,
                        format!("Unknown encapsulation: {}", value),
                    )
                        .into_response();
                }
            },
        };

        let css = state.context.store.write().serve_component_style(
            &path,
            query.component.as_deref(),
            encapsulation,
        );
        if let Some(css) = css {
            return (
                [
                    (header::CONTENT_TYPE, "text/css"),
                    (header::CACHE_CONTROL, "no-cache"),
                ],
                css,
            )
                .into_response();
        }
    }

    if let Some(response) = serve_generated(&state, &path, &headers) {
        return response;
    }

    let source = state
        .context
        .store
        .read()
        .asset(&path)
        .map(|asset| asset.source.clone());
    if let Some(source) = source {
        return serve_asset(&state, &path, &source).await;
    }

    // Client-side routes fall back to the root document.
    if !path.rsplit('/').next().unwrap_or("").contains('.') {
        if let Some(response) = serve_generated(&state, ROOT_DOCUMENT, &headers) {
            return response;
        }
    }

    not_found(&format!("File not found: {}", path))
}

fn serve_generated(state: &AppState, path: &str, headers: &HeaderMap) -> Option<Response> {
    let (contents, hash) = {
        let store = state.context.store.read();
        let record = store.file(path).filter(|record| record.is_servable())?;
        (record.contents().to_vec(), record.hash().to_string())
    };

    let etag = format!("\"{}\"", hash);
    let cached = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == etag);
    if cached {
        return Some((StatusCode::NOT_MODIFIED, [(header::ETAG, etag)]).into_response());
    }

    let content_type = determine_content_type(path);
    let body = if content_type.starts_with("text/html") {
        inject_client_script(&contents)
    } else {
        contents
    };

    Some(
        (
            [
                (header::CONTENT_TYPE, content_type.to_string()),
                (header::CACHE_CONTROL, "no-cache".to_string()),
                (header::ETAG, etag),
            ],
            Body::from(body),
        )
            .into_response(),
    )
}

async fn serve_asset(state: &AppState, path: &str, source: &Path) -> Response {
    let traverses = source
        .components()
        .any(|component| component == Component::ParentDir);
    if traverses || !state.context.allow_list.permits(source) {
        tracing::warn!("Refusing to serve {} outside the allowed roots", source.display());
        return (StatusCode::FORBIDDEN, format!("Access denied: {}", path)).into_response();
    }

    match tokio::fs::read(source).await {
        Ok(content) => (
            [
                (header::CONTENT_TYPE, determine_content_type(path)),
                (header::CACHE_CONTROL, "no-cache"),
            ],
            content,
        )
            .into_response(),
        Err(e) => {
            tracing::warn!("Failed to read asset {}: {}", source.display(), e);
            not_found(&format!("File not found: {}", path))
        }
    }
}

fn not_found(message: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        [(header::CONTENT_TYPE, "text/plain")],
        message.to_string(),
    )
        .into_response()
}

/// Decode a request path and map it onto the store's keys.
///
/// The base href prefix is stripped and `/` becomes the root document.
/// Returns `None` when the path is not valid UTF-8 once decoded.
fn request_path(raw: &str, base_href: Option<&str>) -> Option<String> {
    let decoded = percent_decode_str(raw).decode_utf8().ok()?.into_owned();

    let relative = match base_href {
        Some(base) if base != "/" && decoded.starts_with(base) => &decoded[base.len()..],
        _ => decoded.trim_start_matches('/'),
    };

    if relative.is_empty() {
        Some(ROOT_DOCUMENT.to_string())
    } else {
        Some(format!("/{}", relative.trim_start_matches('/')))
    }
}

/// Insert the reload client before the closing `</body>` tag.
fn inject_client_script(content: &[u8]) -> Vec<u8> {
    let html = String::from_utf8_lossy(content);
    let script_tag = format!(r#"<script src="{}"></script>"#, CLIENT_SCRIPT_ROUTE);

    if let Some(pos) = html.rfind("</body>") {
        let mut result = String::with_capacity(html.len() + script_tag.len() + 4);
        result.push_str(&html[..pos]);
        result.push_str(&script_tag);
        result.push('\n');
        result.push_str(&html[pos..]);
        return result.into_bytes();
    }

    let mut result = html.into_owned();
    result.push('\n');
    result.push_str(&script_tag);
    result.into_bytes()
}

fn determine_content_type(path: &str) -> &'static str {
    let extension = Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("");

    match extension {
        "wasm" => "application/wasm",
        "js" | "mjs" => "application/javascript",
        "json" | "map" => "application/json",
        "html" => "text/html; charset=utf-8",
        "css" => "text/css",
        "txt" => "text/plain; charset=utf-8",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "svg" => "image/svg+xml",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        _ => "application/octet-stream",
    }
}
