//! HTTP server.
//!
//! Routes, handlers, and the serve loop. The webhook endpoints follow
//! Meta's contract exactly: the `GET` handshake echoes `hub.challenge` only
//! for a matching verify token, and the `POST` intake acknowledges every
//! delivery so Meta never retries. The single exception is a payload whose
//! `X-Hub-Signature-256` header is present but wrong.

use std::{collections::HashMap, sync::Arc};

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::Sha256;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::{
    config::Config,
    error::Error,
    graph::GraphClient,
    onboarding::{complete_onboarding, discover, Discovery, OnboardingParams},
};

/// Shared state behind every handler.
pub struct AppState {
    pub config: Config,
    pub graph: GraphClient,
}

/// Builds the service router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/oauth/callback", get(oauth_callback))
        .route("/exchange-token", post(exchange_token))
        .route("/waba-info", get(waba_info))
        .route("/register-phone", post(register_phone))
        .route("/webhook", get(verify_webhook).post(receive_webhook))
        .route("/whatsapp-flow", post(flow_action))
        .fallback(not_found)
        .with_state(state)
}

/// Binds the configured address and serves until a shutdown signal.
pub async fn serve(state: Arc<AppState>) -> std::io::Result<()> {
    let addr = state.config.listen_addr;
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "onboarding server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown signal received"),
        Err(err) => {
            // Without a signal handler we can only run until killed.
            error!("failed to install shutdown handler: {err}");
            std::future::pending::<()>().await;
        }
    }
}

async fn health() -> &'static str {
    "WhatsApp onboarding service is running"
}

async fn not_found() -> StatusCode {
    StatusCode::NOT_FOUND
}

#[derive(Deserialize, Debug)]
struct CallbackQuery {
    code: Option<String>,
    waba_id: Option<String>,
    phone_number_id: Option<String>,
}

impl CallbackQuery {
    fn into_parts(self) -> Result<(String, OnboardingParams), Error> {
        let code = self
            .code
            .filter(|code| !code.is_empty())
            .ok_or(Error::MissingParameter("code"))?;
        Ok((
            code,
            OnboardingParams {
                waba_id: self.waba_id,
                phone_number_id: self.phone_number_id,
            },
        ))
    }
}

/// `GET /oauth/callback` — the embedded-signup redirect target.
///
/// Runs the full onboarding pipeline, then sends the browser to the
/// configured success page. The token never appears in the redirect.
async fn oauth_callback(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CallbackQuery>,
) -> Result<Redirect, Error> {
    let (code, params) = query.into_parts()?;
    complete_onboarding(&state.graph, &state.config, &code, params).await?;
    Ok(Redirect::to(&state.config.success_url))
}

#[derive(Deserialize, Debug)]
struct ExchangeTokenRequest {
    code: Option<String>,
    waba_id: Option<String>,
    phone_number_id: Option<String>,
}

#[derive(Serialize, Debug)]
struct ExchangeTokenResponse {
    success: bool,
    access_token: String,
    waba_id: String,
    phone_number_id: String,
}

/// `POST /exchange-token` — the same pipeline for API callers that want
/// the token back instead of a redirect.
async fn exchange_token(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ExchangeTokenRequest>,
) -> Result<Json<ExchangeTokenResponse>, Error> {
    let code = body
        .code
        .filter(|code| !code.is_empty())
        .ok_or(Error::MissingParameter("code"))?;
    let params = OnboardingParams {
        waba_id: body.waba_id,
        phone_number_id: body.phone_number_id,
    };

    let onboarded = complete_onboarding(&state.graph, &state.config, &code, params).await?;
    Ok(Json(ExchangeTokenResponse {
        success: true,
        waba_id: onboarded.waba_id,
        phone_number_id: onboarded.phone_number_id,
        access_token: onboarded.token.into_access_token(),
    }))
}

#[derive(Deserialize, Debug)]
struct WabaInfoQuery {
    access_token: Option<String>,
}

/// `GET /waba-info` — resolves business, WABA, and phone number from a
/// token without subscribing or registering anything.
async fn waba_info(
    State(state): State<Arc<AppState>>,
    Query(query): Query<WabaInfoQuery>,
) -> Result<Json<Discovery>, Error> {
    let access_token = query
        .access_token
        .filter(|token| !token.is_empty())
        .ok_or(Error::MissingParameter("access_token"))?;

    Ok(Json(discover(&state.graph, &access_token).await?))
}

#[derive(Deserialize, Debug)]
struct RegisterPhoneRequest {
    access_token: Option<String>,
    phone_number_id: Option<String>,
}

/// `POST /register-phone` — registers a phone number on demand, outside a
/// full onboarding run.
async fn register_phone(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RegisterPhoneRequest>,
) -> Result<Redirect, Error> {
    let access_token = body
        .access_token
        .filter(|token| !token.is_empty())
        .ok_or(Error::MissingParameter("access_token"))?;
    let phone_number_id = body
        .phone_number_id
        .or_else(|| state.config.default_phone_number_id.clone())
        .ok_or(Error::MissingParameter("phone_number_id"))?;

    state
        .graph
        .register_phone(&access_token, &phone_number_id, &state.config.phone_pin)
        .await?;

    info!(%phone_number_id, "phone number registered");
    Ok(Redirect::to(&state.config.success_url))
}

/// `GET /webhook` — Meta's subscription handshake.
///
/// Echoes `hub.challenge` verbatim when `hub.mode` is `subscribe` and the
/// verify token matches; otherwise a bare 403.
async fn verify_webhook(
    State(state): State<Arc<AppState>>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Response, Error> {
    let mode = query.get("hub.mode").map(String::as_str).unwrap_or_default();
    let token = query
        .get("hub.verify_token")
        .map(String::as_str)
        .unwrap_or_default();
    let challenge = query.get("hub.challenge").cloned().unwrap_or_default();

    if mode == "subscribe" && constant_time_eq(token, &state.config.verify_token) {
        info!("webhook endpoint verified");
        Ok((StatusCode::OK, challenge).into_response())
    } else {
        warn!(mode, "webhook handshake rejected");
        Err(Error::VerificationFailed)
    }
}

/// `POST /webhook` — event intake.
///
/// Always acknowledges so Meta does not retry; payload shape never causes a
/// rejection. The one exception: a delivery carrying an
/// `X-Hub-Signature-256` header that fails the HMAC check is refused.
async fn receive_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if let Some(signature) = headers.get("x-hub-signature-256") {
        if !signature_valid(&state.config.app_secret, signature, &body) {
            warn!("discarding webhook delivery with an invalid signature");
            return StatusCode::UNAUTHORIZED;
        }
    }

    match serde_json::from_slice::<serde_json::Value>(&body) {
        Ok(payload) => info!(%payload, "webhook event received"),
        Err(_) => info!(
            payload = %String::from_utf8_lossy(&body),
            "webhook delivery with a non-JSON body received"
        ),
    }

    StatusCode::OK
}

#[derive(Deserialize, Debug)]
struct FlowActionRequest {
    #[serde(default)]
    action: String,
}

/// `POST /whatsapp-flow` — flow data-exchange hook. Only the `INIT`
/// health-check action is implemented.
async fn flow_action(
    Json(body): Json<FlowActionRequest>,
) -> Result<Json<serde_json::Value>, Error> {
    if body.action == "INIT" {
        Ok(Json(json!({ "status": "ok" })))
    } else {
        Err(Error::UnsupportedAction(body.action))
    }
}

// Signature verification
fn signature_valid(app_secret: &str, header: &HeaderValue, body: &[u8]) -> bool {
    let Ok(signature) = header.to_str() else {
        return false;
    };
    let Some(received) = signature.strip_prefix("sha256=") else {
        return false;
    };

    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(app_secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    let expected = hex::encode(mac.finalize().into_bytes());

    constant_time_eq(received, &expected)
}

/// Constant-time comparison to prevent timing attacks.
fn constant_time_eq(a: &str, b: &str) -> bool {
    subtle::ConstantTimeEq::ct_eq(a.as_bytes(), b.as_bytes()).into()
}
