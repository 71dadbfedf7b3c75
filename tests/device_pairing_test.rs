//! End-to-end tests for inference-device pairing.

use radioiq_mfa::{
    app::{router, AppContextBuilder},
    identity::{AdminIdentity, AdminStore, NewAdmin},
    registry::SecretRegistry,
    testing, AppContext,
};
use serde_json::json;

async fn enrolled_context() -> (AppContext, AdminIdentity) {
    let ctx = AppContextBuilder::new().build();
    let admin = ctx
        .admins
        .create_primary(NewAdmin {
            name: "Primary".into(),
            email: "admin@example.com".into(),
            password_hash: "hash".into(),
            tier_secrets: vec![],
        })
        .await
        .unwrap();
    let setup = ctx.totp.generate_setup(&admin.email).unwrap();
    let admin = ctx.admins.enable_mfa(&admin.id, setup.secret).await.unwrap();
    (ctx, admin)
}

async fn device_code(ctx: &AppContext, box_no: &str) -> String {
    let staged = ctx.device_registry.peek(box_no).await.unwrap().unwrap();
    ctx.totp.generate_current(&staged.secret, box_no).unwrap()
}

#[tokio::test]
async fn pairing_is_gated() {
    let ctx = AppContextBuilder::new().build();

    let response = testing::post(router(ctx), "/inference/configure-inference-box")
        .json_body(&json!({ "name": "Lab Box", "boxNo": "box-7" }))
        .execute()
        .await
        .assert_forbidden();
    let body: serde_json::Value = response.json().await;
    assert_eq!(body["mfaRequired"], true);
}

#[tokio::test]
async fn pairing_happy_path() {
    let (ctx, _) = enrolled_context().await;

    let body: serde_json::Value = testing::get(router(ctx.clone()), "/inference/check-box-configured")
        .execute()
        .await
        .assert_ok()
        .json()
        .await;
    assert_eq!(body["exists"], false);

    let body: serde_json::Value =
        testing::post(router(ctx.clone()), "/inference/configure-inference-box")
            .json_body(&json!({ "name": "Lab Box", "boxNo": "box-7" }))
            .execute()
            .await
            .assert_ok()
            .json()
            .await;
    assert!(body["qrCodeURL"]
        .as_str()
        .unwrap()
        .starts_with("data:image/png;base64,"));

    let code = device_code(&ctx, "box-7").await;
    let body: serde_json::Value =
        testing::post(router(ctx.clone()), "/inference/verify-inference-box-mfa")
            .json_body(&json!({ "boxNo": "box-7", "token": code }))
            .execute()
            .await
            .assert_ok()
            .json()
            .await;
    assert_eq!(body["message"], "Inference box configured successfully");

    let body: serde_json::Value = testing::get(router(ctx), "/inference/check-box-configured")
        .execute()
        .await
        .assert_ok()
        .json()
        .await;
    assert_eq!(body["exists"], true);
}

#[tokio::test]
async fn missing_fields_are_rejected() {
    let (ctx, _) = enrolled_context().await;

    let response = testing::post(router(ctx), "/inference/configure-inference-box")
        .json_body(&json!({ "name": "", "boxNo": "" }))
        .execute()
        .await
        .assert_bad_request();
    let body: serde_json::Value = response.json().await;
    assert_eq!(body["message"], "Name and boxNo are required");
}

#[tokio::test]
async fn confirm_without_a_staged_secret_is_not_found() {
    let (ctx, _) = enrolled_context().await;

    testing::post(router(ctx), "/inference/verify-inference-box-mfa")
        .json_body(&json!({ "boxNo": "box-7", "token": "000000" }))
        .execute()
        .await
        .assert_not_found();
}

#[tokio::test]
async fn wrong_code_allows_retry() {
    let (ctx, _) = enrolled_context().await;

    testing::post(router(ctx.clone()), "/inference/configure-inference-box")
        .json_body(&json!({ "name": "Lab Box", "boxNo": "box-7" }))
        .execute()
        .await
        .assert_ok();

    testing::post(router(ctx.clone()), "/inference/verify-inference-box-mfa")
        .json_body(&json!({ "boxNo": "box-7", "token": "000000" }))
        .execute()
        .await
        .assert_unauthorized();

    // The staged secret survives the failure.
    let code = device_code(&ctx, "box-7").await;
    testing::post(router(ctx.clone()), "/inference/verify-inference-box-mfa")
        .json_body(&json!({ "boxNo": "box-7", "token": code }))
        .execute()
        .await
        .assert_ok();
}

#[tokio::test]
async fn only_one_device_may_be_paired() {
    let (ctx, _) = enrolled_context().await;

    testing::post(router(ctx.clone()), "/inference/configure-inference-box")
        .json_body(&json!({ "name": "First", "boxNo": "box-1" }))
        .execute()
        .await
        .assert_ok();
    let code = device_code(&ctx, "box-1").await;
    testing::post(router(ctx.clone()), "/inference/verify-inference-box-mfa")
        .json_body(&json!({ "boxNo": "box-1", "token": code }))
        .execute()
        .await
        .assert_ok();

    testing::post(router(ctx), "/inference/configure-inference-box")
        .json_body(&json!({ "name": "Second", "boxNo": "box-2" }))
        .execute()
        .await
        .assert_conflict();
}
