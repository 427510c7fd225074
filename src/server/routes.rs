//! HTTP routes over a running [`Node`]
//!
//! | Method | Path | Action |
//! |--------|------|--------|
//! | GET | `/health` | liveness |
//! | GET | `/session` | reconciled session |
//! | GET | `/adapters` | per-adapter lifecycle state |
//! | POST | `/adapters/:source/initialize` | initialize / manual retry |
//! | POST | `/adapters/:source/connect` | connect through one adapter |
//! | POST | `/adapters/:source/disconnect` | log out of one adapter |
//! | POST | `/connect/manual` | read-only connect with an account id |
//! | POST | `/logout` | log out everywhere |
//! | POST | `/balance/refresh` | query balance now |
//! | POST | `/revalidate` | re-check live connections |
//! | POST | `/payments/buy` | launch the payment widget |
//! | POST | `/payments/completed` | widget completion callback |

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::errors::WalletError;
use crate::payment::{BuyRequest, PaymentCompletion};
use crate::runtime::Shutdown;
use crate::session::ConnectionSource;
use crate::Node;

#[derive(Clone)]
pub struct NodeState { pub node: Arc<Node>, pub app_name: String }

impl NodeState {
    pub fn new(node: Arc<Node>, app_name: impl Into<String>) -> Self {
        Self { node, app_name: app_name.into() }
    }
}

type ApiError = (StatusCode, Json<Value>);
type ApiResult = Result<Json<Value>, ApiError>;

fn api_error(e: WalletError) -> ApiError {
    let status = match &e {
        WalletError::InvalidRequest(_) | WalletError::Derivation(_) => StatusCode::BAD_REQUEST,
        WalletError::NotFound(_) => StatusCode::NOT_FOUND,
        WalletError::NotReady { .. } => StatusCode::SERVICE_UNAVAILABLE,
        WalletError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
        WalletError::SubmissionRejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
        WalletError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        WalletError::Network(_) | WalletError::Provider(_) => StatusCode::BAD_GATEWAY,
        WalletError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": e.to_string(), "retryable": e.is_transient() })))
}

fn source(name: &str) -> Result<ConnectionSource, ApiError> {
    match ConnectionSource::from_str(name) {
        Some(ConnectionSource::None) | None => Err(api_error(WalletError::InvalidRequest(format!(
            "unknown adapter {:?}",
            name
        )))),
        Some(source) => Ok(source),
    }
}

#[derive(Deserialize)]
pub struct ManualConnect { address: String }

pub fn create_router(node: Arc<Node>, app_name: &str) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/session", get(session))
        .route("/adapters", get(adapters))
        .route("/adapters/:source/initialize", post(initialize))
        .route("/adapters/:source/connect", post(connect))
        .route("/adapters/:source/disconnect", post(disconnect))
        .route("/connect/manual", post(connect_manual))
        .route("/logout", post(logout))
        .route("/balance/refresh", post(refresh_balance))
        .route("/revalidate", post(revalidate))
        .route("/payments/buy", post(buy))
        .route("/payments/completed", post(payment_completed))
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(NodeState::new(node, app_name))
}

/// Serve until `shutdown` fires.
pub async fn serve(
    node: Arc<Node>,
    app_name: &str,
    addr: SocketAddr,
    shutdown: Shutdown,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("listening on http://{}", addr);
    axum::serve(listener, create_router(node, app_name))
        .with_graceful_shutdown(async move { shutdown.wait().await })
        .await
}

async fn health(State(s): State<NodeState>) -> impl IntoResponse {
    Json(json!({"status": "ok", "service": s.app_name}))
}

async fn session(State(s): State<NodeState>) -> impl IntoResponse {
    Json(s.node.session())
}

async fn adapters(State(s): State<NodeState>) -> ApiResult {
    let mut out = serde_json::Map::new();
    for source in s.node.sources() {
        let state = s.node.adapter(source).map_err(api_error)?.state();
        out.insert(source.as_str().to_string(), json!(state));
    }
    Ok(Json(Value::Object(out)))
}

async fn initialize(State(s): State<NodeState>, Path(name): Path<String>) -> ApiResult {
    let status = s.node.initialize(source(&name)?).await.map_err(api_error)?;
    Ok(Json(json!({ "status": status.as_str() })))
}

async fn connect(State(s): State<NodeState>, Path(name): Path<String>) -> ApiResult {
    let public_key = s.node.connect(source(&name)?).await.map_err(api_error)?;
    Ok(Json(json!({ "publicKey": public_key })))
}

async fn disconnect(State(s): State<NodeState>, Path(name): Path<String>) -> ApiResult {
    s.node.disconnect(source(&name)?).await.map_err(api_error)?;
    Ok(Json(json!({ "ok": true })))
}

async fn connect_manual(State(s): State<NodeState>, Json(body): Json<ManualConnect>) -> ApiResult {
    let public_key = s.node.connect_manual(&body.address).await.map_err(api_error)?;
    Ok(Json(json!({ "publicKey": public_key })))
}

async fn logout(State(s): State<NodeState>) -> impl IntoResponse {
    s.node.logout().await;
    Json(json!({ "ok": true }))
}

async fn refresh_balance(State(s): State<NodeState>) -> ApiResult {
    s.node.refresh_balance().await.map_err(api_error)?;
    Ok(Json(json!(s.node.session().balance)))
}

async fn revalidate(State(s): State<NodeState>) -> impl IntoResponse {
    s.node.revalidate().await;
    Json(s.node.session())
}

async fn buy(State(s): State<NodeState>, Json(request): Json<BuyRequest>) -> ApiResult {
    let launched = s.node.buy(&request).await.map_err(api_error)?;
    Ok(Json(json!(launched)))
}

async fn payment_completed(
    State(s): State<NodeState>,
    Json(completion): Json<PaymentCompletion>,
) -> ApiResult {
    s.node.complete_payment(&completion).map_err(api_error)?;
    Ok(Json(json!({ "ok": true })))
}
