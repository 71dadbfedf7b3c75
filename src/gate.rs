//! Privileged-operation gate.
//!
//! Routes wrapped by [`require_mfa`] only run once the primary administrator
//! exists and has an enabled sign-in factor. Denials carry the structured
//! `mfaRequired` flag so clients can route straight to enrollment. The loaded
//! identity is placed in request extensions for downstream handlers.
//!
//! # Example
//!
//! ```rust,ignore
//! use axum::{middleware, routing::post, Router};
//! use radioiq_mfa::gate::require_mfa;
//!
//! let gated = Router::new()
//!     .route("/assignTokens/:id", post(assign_tokens))
//!     .layer(middleware::from_fn_with_state(ctx.clone(), require_mfa));
//! ```

use crate::app::AppContext;
use crate::error::{MfaError, Result};
use crate::identity::{AdminIdentity, AdminStore};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

/// Resolve the primary administrator if their sign-in factor is enabled.
pub async fn authorize(ctx: &AppContext) -> Result<AdminIdentity> {
    let admin = ctx
        .admins
        .primary()
        .await?
        .ok_or_else(|| MfaError::mfa_required("MFA verification required"))?;

    if !admin.mfa_enabled {
        tracing::warn!(
            target: "mfa.gate",
            admin_id = %admin.id,
            "Privileged request denied, MFA factor not enabled"
        );
        return Err(MfaError::mfa_required("MFA verification required"));
    }

    Ok(admin)
}

/// Middleware that denies the request unless the MFA gate passes.
pub async fn require_mfa(
    State(ctx): State<AppContext>,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    let admin = authorize(&ctx).await?;
    request.extensions_mut().insert(admin);
    Ok(next.run(request).await)
}
