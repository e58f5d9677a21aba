// SPDX-FileCopyrightText: 2026 Area Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `area serve` and `area migrate` command implementations.
//!
//! Serve opens the database, unlocks the credential vault, assembles the
//! service catalog and OAuth providers, then runs the HTTP API and the
//! evaluation engine side by side until SIGTERM or Ctrl+C.

use std::sync::Arc;
use std::time::Duration;

use area_config::AreaConfig;
use area_core::AreaError;
use area_engine::{Engine, EngineSettings, Evaluator, drain, install_signal_handler};
use area_gateway::GatewayState;
use area_oauth::{OAuthGateway, ProviderRegistry};
use area_registry::{HttpSettings, ServiceRegistry};
use area_storage::Database;
use area_storage::queries::services;
use area_vault::{CredentialVault, MasterKey, VaultSettings};
use secrecy::SecretString;
use tracing::{error, info, warn};

/// Time allowed for in-flight evaluations after the server stops.
const ENGINE_DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs the `area serve` command.
pub async fn run_serve(config: AreaConfig) -> Result<(), AreaError> {
    init_tracing(&config.server.log_level);
    info!("starting area serve");

    let db = Database::open(&config.storage.database_path).await?;

    let passphrase = config
        .vault
        .passphrase
        .clone()
        .map(SecretString::from)
        .ok_or_else(|| AreaError::Config("vault.passphrase is required to serve".to_string()))?;
    let master_key = MasterKey::unlock_or_init(&db, &passphrase, &config.vault)
        .await
        .inspect_err(|e| error!(error = %e, "vault unlock failed"))?;
    info!("credential vault unlocked");

    let provider_timeout = Duration::from_secs(config.engine.provider_timeout_secs.max(1));
    let catalog = Arc::new(ServiceRegistry::builtin(&HttpSettings {
        timeout: provider_timeout,
        ..HttpSettings::default()
    })?);
    services::seed_services(&db, &catalog.service_rows()).await?;
    info!(services = catalog.services().len(), "service catalog seeded");

    let providers = Arc::new(ProviderRegistry::from_config(&config.oauth, provider_timeout)?);
    for service in catalog.services() {
        if let Some(provider) = service.oauth_provider
            && providers.get(provider).is_none()
        {
            warn!(service = service.name, provider, "no OAuth provider configured; service cannot be connected");
        }
    }

    let vault = Arc::new(CredentialVault::new(
        db.clone(),
        master_key,
        providers.clients(),
        VaultSettings::from(&config.engine),
    ));
    let oauth = Arc::new(OAuthGateway::new(
        db.clone(),
        providers,
        catalog.clone(),
        vault.clone(),
        Duration::from_secs(config.oauth.state_ttl_secs),
    ));
    let evaluator = Arc::new(Evaluator::new(
        db.clone(),
        vault.clone(),
        catalog.clone(),
        EngineSettings::from(&config.engine),
    ));
    let engine = Arc::new(Engine::new(db.clone(), evaluator, vault.clone()));
    let state = GatewayState::new(db.clone(), catalog, oauth, vault, &config.auth)?
        .with_webhooks(engine.clone(), &config.webhooks);
    if config.webhooks.github_secret.is_none() {
        info!("no webhooks.github_secret configured, GitHub webhooks disabled");
    }

    let cancel = install_signal_handler();

    let engine_task = tokio::spawn(engine.run(cancel.child_token()));

    let server_result = area_gateway::start_server(&config.server, state, cancel.clone()).await;
    if let Err(e) = &server_result {
        error!(error = %e, "API server stopped with an error");
    }
    // The server may have exited on its own; make sure the engine stops too.
    cancel.cancel();

    let drained = drain(
        async {
            match engine_task.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(error = %e, "engine stopped with an error"),
                Err(e) => error!(error = %e, "engine task panicked"),
            }
        },
        ENGINE_DRAIN_TIMEOUT,
    )
    .await;
    if !drained {
        warn!(timeout_secs = ENGINE_DRAIN_TIMEOUT.as_secs(), "engine did not drain in time");
    }

    if let Err(e) = db.close().await {
        warn!(error = %e, "database close failed");
    }
    info!("area serve shutdown complete");
    server_result
}

/// Runs the `area migrate` command.
pub async fn run_migrate(config: &AreaConfig) -> Result<(), AreaError> {
    init_tracing(&config.server.log_level);
    let db = Database::open(&config.storage.database_path).await?;
    db.close().await?;
    println!("area: database at {} is up to date", config.storage.database_path);
    Ok(())
}

/// `RUST_LOG` wins over the configured level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("area={log_level},warn")));

    // A second call (tests, repeated commands) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .try_init();
}
