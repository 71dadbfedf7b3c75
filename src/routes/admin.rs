//! Administrator endpoints: factor enrollment, the grant ceremony, and
//! direct ledger adjustments.

use crate::app::AppContext;
use crate::error::{MfaError, Result};
use crate::identity::{AdminIdentity, AdminStore};
use crate::ledger::{Tier, TokenLedger};
use crate::registry::{SecretRegistry, StagedSecret};
use axum::{
    extract::{Path, State},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};

/// Routes reachable before the gate passes (bootstrap enrollment).
pub fn open_routes() -> Router<AppContext> {
    Router::new()
        .route("/setup-mfa", post(setup_mfa))
        .route("/verify-mfa-setup", post(verify_mfa_setup))
}

/// Routes behind the MFA gate.
pub fn gated_routes() -> Router<AppContext> {
    Router::new()
        .route("/initiateAdminMFA", post(initiate_admin_mfa))
        .route("/verifyAdminMFA", post(verify_admin_mfa))
        .route("/verify-payment-token", post(verify_payment_token))
        .route("/assign-tokens-after-mfa", post(assign_tokens_after_mfa))
        .route("/assignTokens/:id", post(assign_tokens))
        .route("/removeTokens/:id", post(remove_tokens))
        .route("/adminTokens", get(admin_tokens))
}

#[derive(Serialize)]
struct QrResponse {
    #[serde(rename = "qrCodeURL")]
    qr_code_url: String,
}

#[derive(Deserialize)]
struct TokenRequest {
    token: String,
}

#[derive(Serialize)]
struct MessageResponse {
    message: String,
}

#[derive(Serialize)]
struct SuccessResponse {
    success: bool,
}

#[derive(Deserialize)]
struct PaymentTokenRequest {
    #[serde(rename = "paymentToken")]
    payment_token: String,
}

#[derive(Deserialize)]
struct TierGrantRequest {
    tier: Tier,
    #[serde(rename = "tierToken")]
    tier_token: String,
}

#[derive(Serialize)]
struct GrantResponse {
    message: String,
    #[serde(rename = "newTotal")]
    new_total: u64,
}

#[derive(Deserialize)]
struct AssignRequest {
    tier: Tier,
}

#[derive(Deserialize)]
struct RemoveRequest {
    tokens: u64,
}

#[derive(Serialize)]
struct BalanceResponse {
    tokens: u64,
}

async fn primary_admin(ctx: &AppContext) -> Result<AdminIdentity> {
    ctx.admins
        .primary()
        .await?
        .ok_or_else(|| MfaError::not_found("Admin not found"))
}

/// Stage a fresh sign-in factor for the primary administrator.
///
/// Open so the very first enrollment can happen; re-staging before
/// confirmation simply replaces the pending secret. Re-enrolling over an
/// already-enabled factor is refused.
async fn setup_mfa(State(ctx): State<AppContext>) -> Result<Json<QrResponse>> {
    let admin = primary_admin(&ctx).await?;
    if admin.mfa_enabled {
        return Err(MfaError::conflict("MFA is already enabled"));
    }

    let setup = ctx.totp.generate_setup(&admin.email)?;
    ctx.admin_registry
        .stage(
            &admin.id,
            StagedSecret {
                secret: setup.secret,
                label: admin.email.clone(),
            },
        )
        .await?;

    tracing::info!(target: "mfa.enroll", admin_id = %admin.id, "Sign-in factor staged");
    Ok(Json(QrResponse {
        qr_code_url: setup.qr_code_url,
    }))
}

/// Confirm the staged sign-in factor with a code.
async fn verify_mfa_setup(
    State(ctx): State<AppContext>,
    Json(req): Json<TokenRequest>,
) -> Result<Json<MessageResponse>> {
    let admin = primary_admin(&ctx).await?;
    ctx.attempts.check(&admin.id)?;

    let staged = ctx
        .admin_registry
        .peek(&admin.id)
        .await?
        .ok_or_else(|| MfaError::not_found("MFA secret not found. Please generate QR again."))?;

    if !ctx.totp.verify(&staged.secret, &req.token, &admin.email)? {
        return Err(MfaError::unauthorized("Invalid MFA token"));
    }

    let staged = ctx
        .admin_registry
        .consume(&admin.id)
        .await?
        .ok_or_else(|| MfaError::not_found("MFA secret not found. Please generate QR again."))?;
    ctx.admins.enable_mfa(&admin.id, staged.secret).await?;

    tracing::info!(target: "mfa.enroll", admin_id = %admin.id, "Sign-in factor enabled");
    Ok(Json(MessageResponse {
        message: "MFA enabled successfully".to_string(),
    }))
}

/// Stage the payment factor for the gated administrator.
async fn initiate_admin_mfa(
    State(ctx): State<AppContext>,
    Extension(admin): Extension<AdminIdentity>,
) -> Result<Json<QrResponse>> {
    if admin.payment_enabled {
        return Err(MfaError::conflict("Payment MFA is already enabled"));
    }

    let setup = ctx.totp.generate_setup(&admin.email)?;
    ctx.payment_registry
        .stage(
            &admin.id,
            StagedSecret {
                secret: setup.secret,
                label: admin.email.clone(),
            },
        )
        .await?;

    tracing::info!(target: "mfa.enroll", admin_id = %admin.id, "Payment factor staged");
    Ok(Json(QrResponse {
        qr_code_url: setup.qr_code_url,
    }))
}

/// Confirm the staged payment factor with a code.
async fn verify_admin_mfa(
    State(ctx): State<AppContext>,
    Extension(admin): Extension<AdminIdentity>,
    Json(req): Json<TokenRequest>,
) -> Result<Json<SuccessResponse>> {
    ctx.attempts.check(&admin.id)?;

    let staged = ctx
        .payment_registry
        .peek(&admin.id)
        .await?
        .ok_or_else(|| MfaError::not_found("MFA secret not found. Please generate QR again."))?;

    if !ctx.totp.verify(&staged.secret, &req.token, &admin.email)? {
        return Err(MfaError::unauthorized("Invalid MFA token"));
    }

    let staged = ctx
        .payment_registry
        .consume(&admin.id)
        .await?
        .ok_or_else(|| MfaError::not_found("MFA secret not found. Please generate QR again."))?;
    ctx.admins
        .enable_payment_mfa(&admin.id, staged.secret)
        .await?;

    tracing::info!(target: "mfa.enroll", admin_id = %admin.id, "Payment factor enabled");
    Ok(Json(SuccessResponse { success: true }))
}

/// First ceremony step: verify a payment-factor code.
async fn verify_payment_token(
    State(ctx): State<AppContext>,
    Extension(admin): Extension<AdminIdentity>,
    Json(req): Json<PaymentTokenRequest>,
) -> Result<Json<SuccessResponse>> {
    ctx.attempts.check(&admin.id)?;
    ctx.ceremonies
        .verify_payment_step(&admin, &req.payment_token)
        .await?;
    Ok(Json(SuccessResponse { success: true }))
}

/// Second ceremony step: verify the tier code and credit the ledger.
async fn assign_tokens_after_mfa(
    State(ctx): State<AppContext>,
    Extension(admin): Extension<AdminIdentity>,
    Json(req): Json<TierGrantRequest>,
) -> Result<Json<GrantResponse>> {
    ctx.attempts.check(&admin.id)?;
    let new_total = ctx
        .ceremonies
        .verify_tier_step_and_grant(&admin, req.tier, &req.tier_token)
        .await?;
    Ok(Json(GrantResponse {
        message: "Tokens assigned successfully".to_string(),
        new_total,
    }))
}

/// Direct tier credit to an administrator by id, no ceremony.
async fn assign_tokens(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    Json(req): Json<AssignRequest>,
) -> Result<Json<GrantResponse>> {
    ctx.admins
        .find(&id)
        .await?
        .ok_or_else(|| MfaError::not_found("Admin not found"))?;

    let new_total = ctx.ledger.credit(&id, req.tier.amount()).await?;
    tracing::info!(
        target: "mfa.ledger",
        admin_id = %id,
        tier = req.tier.number(),
        new_total,
        "Direct tier credit"
    );
    Ok(Json(GrantResponse {
        message: "Tokens assigned successfully".to_string(),
        new_total,
    }))
}

/// Direct debit from an administrator by id.
async fn remove_tokens(
    State(ctx): State<AppContext>,
    Path(id): Path<String>,
    Json(req): Json<RemoveRequest>,
) -> Result<Json<GrantResponse>> {
    ctx.admins
        .find(&id)
        .await?
        .ok_or_else(|| MfaError::not_found("Admin not found"))?;

    let new_total = ctx.ledger.debit(&id, req.tokens).await?;
    tracing::info!(
        target: "mfa.ledger",
        admin_id = %id,
        removed = req.tokens,
        new_total,
        "Direct debit"
    );
    Ok(Json(GrantResponse {
        message: "Tokens removed successfully".to_string(),
        new_total,
    }))
}

/// Current balance of the gated administrator.
async fn admin_tokens(
    State(ctx): State<AppContext>,
    Extension(admin): Extension<AdminIdentity>,
) -> Result<Json<BalanceResponse>> {
    let tokens = ctx.ledger.balance(&admin.id).await?;
    Ok(Json(BalanceResponse { tokens }))
}
