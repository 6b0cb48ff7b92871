use std::future::Future;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use pagebridge_channels::HubTransport;
use pagebridge_core::{Config, Result};
use pagebridge_relay::{Relay, RelayOptions};
use pagebridge_tools::CapabilityRegistry;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::rpc::{self, Incoming, McpService};
use crate::session::{SessionStore, SESSION_HEADER};

/// Shared state passed to the endpoint handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub service: Arc<McpService>,
    pub sessions: Arc<SessionStore>,
}

impl GatewayState {
    pub fn new(service: McpService) -> Self {
        Self {
            service: Arc::new(service),
            sessions: Arc::new(SessionStore::new()),
        }
    }
}

/// How a request response is framed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    Json,
    EventStream,
}

/// Pick the response framing from an `Accept` header.
///
/// Both framings are always acceptable: a missing header, `*/*`, or a list
/// naming only one of them is widened to both. JSON wins unless the client
/// names `text/event-stream` first or names it without `application/json`.
pub fn negotiate(accept: Option<&str>) -> ResponseMode {
    let types: Vec<String> = accept
        .unwrap_or("")
        .split(',')
        .filter_map(|part| part.split(';').next())
        .map(|t| t.trim().to_ascii_lowercase())
        .filter(|t| !t.is_empty())
        .collect();

    let json = types.iter().position(|t| t == "application/json");
    let sse = types.iter().position(|t| t == "text/event-stream");
    if json.is_none() || sse.is_none() {
        debug!(accept = ?accept, "Accept widened to application/json, text/event-stream");
    }
    match (json, sse) {
        (None, Some(_)) => ResponseMode::EventStream,
        (Some(j), Some(s)) if s < j => ResponseMode::EventStream,
        _ => ResponseMode::Json,
    }
}

fn session_header(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

fn reply(mode: ResponseMode, body: Value) -> Response {
    match mode {
        ResponseMode::Json => Json(body).into_response(),
        ResponseMode::EventStream => (
            [
                (header::CONTENT_TYPE, "text/event-stream"),
                (header::CACHE_CONTROL, "no-cache"),
            ],
            format!("event: message\ndata: {}\n\n", body),
        )
            .into_response(),
    }
}

async fn handle_info(State(state): State<GatewayState>) -> impl IntoResponse {
    Json(json!({
        "name": state.service.name(),
        "version": state.service.version(),
    }))
}

/// The CORS layer answers every `OPTIONS` itself; report those as `204`.
async fn options_no_content(req: Request, next: Next) -> Response {
    let is_options = req.method() == Method::OPTIONS;
    let mut response = next.run(req).await;
    if is_options && response.status() == StatusCode::OK {
        *response.status_mut() = StatusCode::NO_CONTENT;
    }
    response
}

async fn handle_post(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let mode = negotiate(headers.get(header::ACCEPT).and_then(|v| v.to_str().ok()));

    // Bodies that fail to parse never open a session.
    let incoming = match rpc::parse_message(&body) {
        Ok(incoming) => incoming,
        Err(e) => {
            warn!(code = e.code, error = %e.message, "Rejected request body");
            return (StatusCode::BAD_REQUEST, Json(e.to_response(Value::Null))).into_response();
        }
    };

    let (session, _) = state.sessions.resolve(session_header(&headers));
    let mut response = match incoming {
        Incoming::Notification { method } => {
            debug!(session = %session, method = %method, "Notification");
            StatusCode::ACCEPTED.into_response()
        }
        Incoming::Request(request) => {
            debug!(session = %session, method = %request.method, "Request");
            reply(mode, state.service.handle(request).await)
        }
    };

    if let Ok(value) = HeaderValue::from_str(&session) {
        response.headers_mut().insert(SESSION_HEADER, value);
    }
    response
}

async fn handle_delete(State(state): State<GatewayState>, headers: HeaderMap) -> Response {
    match session_header(&headers) {
        Some(id) if state.sessions.close(id) => StatusCode::NO_CONTENT.into_response(),
        Some(id) => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": format!("Unknown session: {}", id)})),
        )
            .into_response(),
        None => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": format!("Missing {} header", SESSION_HEADER)})),
        )
            .into_response(),
    }
}

fn build_cors_layer() -> CorsLayer {
    let session = HeaderName::from_static(SESSION_HEADER);
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS, Method::DELETE])
        .allow_headers([
            header::CONTENT_TYPE,
            session.clone(),
            header::ACCEPT,
            header::AUTHORIZATION,
            HeaderName::from_static("last-event-id"),
        ])
        .expose_headers([session])
}

/// Router serving the MCP endpoint at `path`.
pub fn endpoint_router(state: GatewayState, path: &str) -> Router {
    Router::new()
        .route(
            path,
            get(handle_info).post(handle_post).delete(handle_delete),
        )
        .layer(build_cors_layer())
        .layer(middleware::from_fn(options_no_content))
        .with_state(state)
}

/// The assembled server: MCP endpoint, page websocket, relay between them.
pub struct Gateway {
    config: Config,
    hub: HubTransport,
    relay: Relay,
    state: GatewayState,
}

impl Gateway {
    pub fn new(config: Config) -> Self {
        let registry = CapabilityRegistry::with_defaults().without(&config.capabilities.disabled);
        Self::with_registry(config, registry)
    }

    pub fn with_registry(config: Config, registry: CapabilityRegistry) -> Self {
        let hub = HubTransport::new();
        let relay = Relay::new(Arc::new(hub.clone()), RelayOptions::from(&config.relay));
        let service = McpService::new(
            Arc::new(registry),
            relay.clone(),
            config.server.name.clone(),
            config.server.version.clone(),
        );
        Self {
            config,
            hub,
            relay,
            state: GatewayState::new(service),
        }
    }

    pub fn relay(&self) -> &Relay {
        &self.relay
    }

    pub fn hub(&self) -> &HubTransport {
        &self.hub
    }

    pub fn state(&self) -> GatewayState {
        self.state.clone()
    }

    pub fn router(&self) -> Router {
        endpoint_router(self.state.clone(), &self.config.server.endpoint_path)
            .merge(self.hub.router(&self.config.server.bridge_path))
            .layer(TraceLayer::new_for_http())
    }

    /// Bind and serve until `shutdown` resolves.
    pub async fn serve(self, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
        let listener_handle = self.relay.start();
        let sweeper_handle = self
            .relay
            .options()
            .call_timeout
            .map(|_| self.relay.spawn_sweeper(self.config.relay.sweep_interval()));

        let bind_addr = self.config.bind_addr();
        let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
        info!(
            addr = %bind_addr,
            endpoint = %self.config.server.endpoint_path,
            bridge = %self.config.server.bridge_path,
            tools = self.state.service.registry().len(),
            "Gateway listening"
        );

        let app = self.router();
        let served = axum::serve(listener, app).with_graceful_shutdown(shutdown).await;

        listener_handle.abort();
        if let Some(handle) = sweeper_handle {
            handle.abort();
        }
        info!(pending = self.relay.pending_count(), "Gateway stopped");
        served?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use pagebridge_browser::{Dispatcher, MemoryPage};
    use pagebridge_channels::LoopbackTransport;
    use pagebridge_core::config::PageConfig;
    use std::time::Duration;
    use tower::ServiceExt;

    const PATH: &str = "/__mcp";

    /// Endpoint wired through a loopback relay to an in-memory page.
    fn live_state() -> GatewayState {
        let (server, page) = LoopbackTransport::pair();
        let relay = Relay::new(
            Arc::new(server),
            RelayOptions {
                call_timeout: Some(Duration::from_secs(5)),
            },
        );
        relay.start();
        let page_env = Arc::new(MemoryPage::new().unwrap());
        page_env.console_sink().unwrap().info("hello from the page");
        let dispatcher = Dispatcher::with_builtin_handlers(page_env, &PageConfig::default());
        tokio::spawn(Arc::new(dispatcher).run(Arc::new(page)));

        GatewayState::new(McpService::new(
            Arc::new(CapabilityRegistry::with_defaults()),
            relay,
            "pagebridge",
            "9.9.9",
        ))
    }

    fn post(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(PATH)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_negotiate() {
        assert_eq!(negotiate(None), ResponseMode::Json);
        assert_eq!(negotiate(Some("*/*")), ResponseMode::Json);
        assert_eq!(negotiate(Some("application/json")), ResponseMode::Json);
        assert_eq!(negotiate(Some("text/event-stream")), ResponseMode::EventStream);
        assert_eq!(
            negotiate(Some("application/json, text/event-stream")),
            ResponseMode::Json
        );
        assert_eq!(
            negotiate(Some("text/event-stream;q=1, application/json")),
            ResponseMode::EventStream
        );
    }

    #[tokio::test]
    async fn test_get_reports_name_and_version() {
        let app = endpoint_router(live_state(), PATH);
        let response = app
            .oneshot(Request::builder().uri(PATH).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await, json!({"name": "pagebridge", "version": "9.9.9"}));
    }

    #[tokio::test]
    async fn test_options_is_no_content() {
        let app = endpoint_router(live_state(), PATH);
        let response = app
            .oneshot(Request::builder().method("OPTIONS").uri(PATH).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_cors_preflight() {
        let app = endpoint_router(live_state(), PATH);
        let response = app
            .oneshot(
                Request::builder()
                    .method("OPTIONS")
                    .uri(PATH)
                    .header(header::ORIGIN, "http://localhost:3000")
                    .header(header::ACCESS_CONTROL_REQUEST_METHOD, "DELETE")
                    .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "mcp-session-id")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let headers = response.headers();
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        let methods = headers[header::ACCESS_CONTROL_ALLOW_METHODS].to_str().unwrap();
        assert!(methods.contains("DELETE"));
        let allowed = headers[header::ACCESS_CONTROL_ALLOW_HEADERS].to_str().unwrap();
        assert!(allowed.contains("mcp-session-id"));
    }

    #[tokio::test]
    async fn test_session_created_then_reused() {
        let state = live_state();
        let app = endpoint_router(state.clone(), PATH);

        let first = app
            .clone()
            .oneshot(post(json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}})))
            .await
            .unwrap();
        let session = first.headers()[SESSION_HEADER].to_str().unwrap().to_string();
        assert_eq!(body_json(first).await["result"]["serverInfo"]["version"], "9.9.9");

        let mut req = post(json!({"jsonrpc": "2.0", "id": 2, "method": "ping"}));
        req.headers_mut()
            .insert(SESSION_HEADER, HeaderValue::from_str(&session).unwrap());
        let second = app.oneshot(req).await.unwrap();
        assert_eq!(second.headers()[SESSION_HEADER], session.as_str());
        assert_eq!(state.sessions.len(), 1);
    }

    #[tokio::test]
    async fn test_notification_is_accepted_without_body() {
        let app = endpoint_router(live_state(), PATH);
        let response = app
            .oneshot(post(json!({"jsonrpc": "2.0", "method": "notifications/initialized"})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert!(bytes.is_empty());
    }

    #[tokio::test]
    async fn test_parse_error_and_batch() {
        let app = endpoint_router(live_state(), PATH);
        let bad = Request::builder()
            .method("POST")
            .uri(PATH)
            .body(Body::from("{not json"))
            .unwrap();
        let response = app.clone().oneshot(bad).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["error"]["code"], rpc::PARSE_ERROR);

        let response = app.oneshot(post(json!([{"jsonrpc": "2.0", "id": 1, "method": "ping"}]))).await.unwrap();
        assert_eq!(body_json(response).await["error"]["code"], rpc::INVALID_REQUEST);
    }

    #[tokio::test]
    async fn test_rejected_bodies_open_no_session() {
        let state = live_state();
        let app = endpoint_router(state.clone(), PATH);

        for body in ["{not json", "[]", r#"{"jsonrpc":"1.0","id":1,"method":"ping"}"#] {
            let req = Request::builder()
                .method("POST")
                .uri(PATH)
                .body(Body::from(body))
                .unwrap();
            let response = app.clone().oneshot(req).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
            assert!(response.headers().get(SESSION_HEADER).is_none());
        }
        assert_eq!(state.sessions.len(), 0);
    }

    #[tokio::test]
    async fn test_tools_call_reaches_page() {
        let app = endpoint_router(live_state(), PATH);
        let response = app
            .oneshot(post(json!({
                "jsonrpc": "2.0",
                "id": 7,
                "method": "tools/call",
                "params": {"name": "read_console", "arguments": {"limit": 5}}
            })))
            .await
            .unwrap();
        let out = body_json(response).await;
        assert_eq!(out["id"], 7);
        assert!(out["result"].get("isError").is_none());
        let text = out["result"]["content"][0]["text"].as_str().unwrap();
        let readout: Value = serde_json::from_str(text).unwrap();
        assert_eq!(readout["count"], 1);
        assert_eq!(readout["logs"][0]["message"], "hello from the page");
    }

    #[tokio::test]
    async fn test_event_stream_reply() {
        let app = endpoint_router(live_state(), PATH);
        let mut req = post(json!({"jsonrpc": "2.0", "id": 3, "method": "ping"}));
        req.headers_mut()
            .insert(header::ACCEPT, HeaderValue::from_static("text/event-stream"));
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/event-stream");
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.starts_with("event: message\ndata: "));
        assert!(text.ends_with("\n\n"));
        let data: Value = serde_json::from_str(text["event: message\ndata: ".len()..].trim()).unwrap();
        assert_eq!(data["id"], 3);
    }

    #[tokio::test]
    async fn test_delete_session() {
        let state = live_state();
        let (id, _) = state.sessions.resolve(None);
        let app = endpoint_router(state.clone(), PATH);

        let delete = |id: &str| {
            Request::builder()
                .method("DELETE")
                .uri(PATH)
                .header(SESSION_HEADER, id)
                .body(Body::empty())
                .unwrap()
        };
        let response = app.clone().oneshot(delete(&id)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let response = app.oneshot(delete(&id)).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(state.sessions.is_empty());
    }

    #[test]
    fn test_disabled_capabilities_are_hidden() {
        let mut config = Config::default();
        config.capabilities.disabled = vec!["cookie".to_string()];
        let gateway = Gateway::new(config);
        let names = gateway.state().service.registry().names();
        assert!(!names.contains(&"cookie".to_string()));
        assert_eq!(names.len(), 6);
    }
}
