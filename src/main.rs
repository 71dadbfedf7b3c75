use radioiq_mfa::{
    app::{self, AppContextBuilder},
    config::ConfigBuilder,
    identity::{AdminStore, NewAdmin},
    ledger::{Tier, TokenLedger},
    Result,
};

/// Seed balance for a freshly created administrator.
const INITIAL_TOKENS: u64 = 10_000;

#[tokio::main]
async fn main() -> Result<()> {
    radioiq_mfa::init_tracing();

    let config = ConfigBuilder::new().from_env().build();
    let ctx = AppContextBuilder::new().with_config(config).build();

    bootstrap(&ctx).await?;
    app::serve(ctx).await
}

/// Create the primary administrator on first boot.
///
/// Tier secrets are generated here and their provisioning URIs logged once;
/// the operator loads them into authenticators out of band.
async fn bootstrap(ctx: &radioiq_mfa::AppContext) -> Result<()> {
    if ctx.admins.primary().await?.is_some() {
        return Ok(());
    }

    let name = std::env::var("RADIOIQ_ADMIN_NAME").unwrap_or_else(|_| "Primary Admin".to_string());
    let email =
        std::env::var("RADIOIQ_ADMIN_EMAIL").unwrap_or_else(|_| "admin@radioiq.local".to_string());

    let mut tier_secrets = Vec::with_capacity(Tier::ALL.len());
    for tier in Tier::ALL {
        let setup = ctx
            .totp
            .generate_setup(&format!("{} (tier {})", email, tier.number()))?;
        tracing::info!(
            target: "mfa.bootstrap",
            tier = tier.number(),
            uri = %setup.uri,
            "Tier secret provisioned"
        );
        tier_secrets.push(setup.secret);
    }

    let admin = ctx
        .admins
        .create_primary(NewAdmin {
            name,
            email,
            password_hash: String::new(),
            tier_secrets,
        })
        .await?;
    ctx.ledger.credit(&admin.id, INITIAL_TOKENS).await?;

    tracing::info!(
        target: "mfa.bootstrap",
        admin_id = %admin.id,
        initial_tokens = INITIAL_TOKENS,
        "Primary admin created"
    );
    Ok(())
}
