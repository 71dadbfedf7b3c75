//! Inference-device pairing endpoints.

use crate::app::AppContext;
use crate::error::{MfaError, Result};
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

pub fn open_routes() -> Router<AppContext> {
    Router::new().route("/check-box-configured", get(check_box_configured))
}

pub fn gated_routes() -> Router<AppContext> {
    Router::new()
        .route("/configure-inference-box", post(configure_inference_box))
        .route("/verify-inference-box-mfa", post(verify_inference_box_mfa))
}

#[derive(Deserialize)]
struct ConfigureRequest {
    #[serde(default)]
    name: String,
    #[serde(rename = "boxNo", default)]
    box_no: String,
}

#[derive(Serialize)]
struct QrResponse {
    #[serde(rename = "qrCodeURL")]
    qr_code_url: String,
}

#[derive(Deserialize)]
struct VerifyRequest {
    #[serde(rename = "boxNo", default)]
    box_no: String,
    token: String,
}

#[derive(Serialize)]
struct MessageResponse {
    message: String,
}

#[derive(Serialize)]
struct ExistsResponse {
    exists: bool,
}

/// Stage a pairing secret for a device and return its QR.
async fn configure_inference_box(
    State(ctx): State<AppContext>,
    Json(req): Json<ConfigureRequest>,
) -> Result<Json<QrResponse>> {
    if req.name.trim().is_empty() || req.box_no.trim().is_empty() {
        return Err(MfaError::bad_request("Name and boxNo are required"));
    }

    let setup = ctx
        .device_authority
        .begin_pairing(req.name.trim(), req.box_no.trim())
        .await?;
    Ok(Json(QrResponse {
        qr_code_url: setup.qr_code_url,
    }))
}

/// Confirm a staged pairing with a device code.
async fn verify_inference_box_mfa(
    State(ctx): State<AppContext>,
    Json(req): Json<VerifyRequest>,
) -> Result<Json<MessageResponse>> {
    if req.box_no.trim().is_empty() {
        return Err(MfaError::bad_request("boxNo is required"));
    }
    ctx.attempts.check(req.box_no.trim())?;

    ctx.device_authority
        .confirm_pairing(req.box_no.trim(), &req.token)
        .await?;
    Ok(Json(MessageResponse {
        message: "Inference box configured successfully".to_string(),
    }))
}

/// Whether any device is paired. Open so clients can branch before login.
async fn check_box_configured(State(ctx): State<AppContext>) -> Result<Json<ExistsResponse>> {
    let exists = ctx.device_authority.is_any_device_paired().await?;
    Ok(Json(ExistsResponse { exists }))
}
