//! HTTP surface: the inbound-email webhook and a health check.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::channels::webhook::parse_webhook;
use crate::pipeline::{InvoicePipeline, PipelineOutcome};

/// Path the email provider posts inbound mail to.
pub const WEBHOOK_PATH: &str = "/webhooks/inbound-email";

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<InvoicePipeline>,
}

const CORS_ALLOW_HEADERS: &str = "authorization, x-client-info, apikey, content-type";
const CORS_ALLOW_METHODS: &str = "GET, POST, OPTIONS";

/// Build the Axum router. Every response carries permissive CORS headers;
/// preflight requests are answered by `preflight`.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(WEBHOOK_PATH, post(inbound_email).options(preflight))
        .route("/health", get(health))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(CORS_ALLOW_HEADERS),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(CORS_ALLOW_METHODS),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "invoice-inbox"
    }))
}

async fn preflight() -> &'static str {
    "ok"
}

// ── Webhook ─────────────────────────────────────────────────────────────

async fn inbound_email(State(state): State<AppState>, body: Bytes) -> Response {
    let email = match parse_webhook(&body) {
        Ok(email) => email,
        Err(e) => {
            warn!(error = %e, "Rejected inbound webhook");
            return failure(StatusCode::BAD_REQUEST, e.to_string());
        }
    };

    match state.pipeline.process(email).await {
        Ok(outcome) => outcome_response(outcome),
        Err(e) => {
            error!(error = %e, "Inbound email processing failed");
            failure(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        }
    }
}

fn outcome_response(outcome: PipelineOutcome) -> Response {
    match outcome {
        PipelineOutcome::MissingRecipient => {
            failure(StatusCode::BAD_REQUEST, "No recipient email".to_string())
        }
        PipelineOutcome::CompanyNotFound { email } => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "success": false,
                "error": "No company found for this email address",
                "email": email,
            })),
        )
            .into_response(),
        PipelineOutcome::EmailOnly { invoice_id } => {
            info!(%invoice_id, "Email without PDF stored for manual review");
            (
                StatusCode::OK,
                Json(json!({
                    "success": true,
                    "message": "Email received without PDF attachment, created for manual review",
                    "invoice_id": invoice_id,
                })),
            )
                .into_response()
        }
        PipelineOutcome::Invoices(invoices) => {
            info!(count = invoices.len(), "Inbound email processed");
            (
                StatusCode::OK,
                Json(json!({
                    "success": true,
                    "message": format!("Processed {} invoice(s)", invoices.len()),
                    "invoices": invoices,
                })),
            )
                .into_response()
        }
    }
}

fn failure(status: StatusCode, error: String) -> Response {
    (
        status,
        Json(json!({
            "success": false,
            "error": error,
        })),
    )
        .into_response()
}
