// SPDX-FileCopyrightText: 2026 Area Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` assembles a complete broker stack around a temp SQLite
//! database: an ephemeral vault, a service registry holding a mock service,
//! a mock OAuth provider, the OAuth gateway, and the engine evaluator.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use area_config::{AreaConfig, FlowConfig, ProviderConfig};
use area_core::{AreaError, AreaStatus, ParamType, Params, TokenSet};
use area_engine::{Engine, EngineSettings, Evaluator};
use area_oauth::{OAuthGateway, ProviderRegistry};
use area_registry::{CapabilityDef, HttpSettings, ParamSpec, ServiceDef, ServiceRegistry};
use area_storage::queries::{accounts, areas, services, users};
use area_storage::{AccountIdentity, Area, Database, NewArea, ServiceAccount, User};
use area_vault::{CredentialVault, MasterKey, VaultSettings};

use crate::mock_capability::{MockExecutor, MockPoller};
use crate::mock_provider::MockOAuthProvider;

pub const MOCK_PROVIDER: &str = "mock";
pub const MOCK_SERVICE_ID: i64 = 100;
pub const MOCK_ACTION: i64 = 1000;
pub const MOCK_REACTION: i64 = 1000;

/// A catalog service backed by the mock provider, polled by [`MockPoller`]
/// and acted on by [`MockExecutor`].
pub static MOCK_SERVICE: ServiceDef = ServiceDef {
    id: MOCK_SERVICE_ID,
    name: "mock",
    display_name: "Mock",
    description: "In-process service for tests",
    oauth_provider: Some(MOCK_PROVIDER),
    icon: "mock",
    color: "#123456",
    category: "test",
    actions: &[CapabilityDef {
        id: MOCK_ACTION,
        key: "new_item",
        name: "New item",
        description: "An item was appended to the feed",
        params: &[ParamSpec::optional("label", ParamType::String, "Only items with this label")],
    }],
    reactions: &[CapabilityDef {
        id: MOCK_REACTION,
        key: "record",
        name: "Record",
        description: "Record the rendered text",
        params: &[ParamSpec::required("text", ParamType::String, "Text to record")],
    }],
};

/// Provider settings for [`MOCK_PROVIDER`] with both flows configured.
pub fn mock_provider_config() -> ProviderConfig {
    let flow = |redirect: &str, pkce: bool| FlowConfig {
        client_id: format!("mock-client-{redirect}"),
        client_secret: Some("mock-secret".to_string()),
        redirect_uri: format!("https://app.test/{redirect}/callback"),
        scopes: vec!["read".to_string(), "write".to_string()],
        pkce,
    };
    ProviderConfig {
        display_name: "Mock".to_string(),
        icon: Some("mock".to_string()),
        color: Some("#123456".to_string()),
        auth_url: "https://mock.test/oauth/authorize".to_string(),
        token_url: "https://mock.test/oauth/token".to_string(),
        userinfo_url: Some("https://mock.test/me".to_string()),
        web: Some(flow("web", false)),
        mobile: Some(flow("mobile", true)),
    }
}

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    builtins: bool,
    engine: EngineSettings,
    vault: VaultSettings,
    provider_delay: Duration,
    state_ttl: Duration,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            builtins: false,
            engine: EngineSettings {
                min_interval: Duration::ZERO,
                backoff_base: Duration::from_millis(10),
                ..EngineSettings::default()
            },
            vault: VaultSettings::default(),
            provider_delay: Duration::ZERO,
            state_ttl: Duration::from_secs(600),
        }
    }

    /// Also register the built-in catalog.
    pub fn with_builtins(mut self) -> Self {
        self.builtins = true;
        self
    }

    pub fn with_engine_settings(mut self, settings: EngineSettings) -> Self {
        self.engine = settings;
        self
    }

    pub fn with_vault_settings(mut self, settings: VaultSettings) -> Self {
        self.vault = settings;
        self
    }

    /// Delay every call to the mock provider.
    pub fn with_provider_delay(mut self, delay: Duration) -> Self {
        self.provider_delay = delay;
        self
    }

    pub fn with_state_ttl(mut self, ttl: Duration) -> Self {
        self.state_ttl = ttl;
        self
    }

    /// Build the harness, creating all required subsystems.
    pub async fn build(self) -> Result<TestHarness, AreaError> {
        let temp_dir = tempfile::TempDir::new().map_err(AreaError::storage)?;
        let db_path = temp_dir.path().join("test.db");
        let db = Database::open(&db_path.to_string_lossy()).await?;

        let poller = Arc::new(MockPoller::new());
        let executor = Arc::new(MockExecutor::new());
        let mut builder = ServiceRegistry::builder();
        if self.builtins {
            builder = builder.with_builtins(&HttpSettings::default())?;
        }
        let catalog = Arc::new(
            builder
                .services(std::slice::from_ref(&MOCK_SERVICE))
                .poller(MOCK_ACTION, poller.clone())
                .executor(MOCK_REACTION, executor.clone())
                .build()?,
        );
        services::seed_services(&db, &catalog.service_rows()).await?;

        let provider = Arc::new(MockOAuthProvider::new(MOCK_PROVIDER).with_delay(self.provider_delay));
        let providers = Arc::new(ProviderRegistry::empty().with_client(
            MOCK_PROVIDER,
            mock_provider_config(),
            provider.clone(),
        ));
        let vault = Arc::new(CredentialVault::new(
            db.clone(),
            MasterKey::ephemeral()?,
            providers.clients(),
            self.vault,
        ));
        let oauth = Arc::new(OAuthGateway::new(
            db.clone(),
            providers.clone(),
            catalog.clone(),
            vault.clone(),
            self.state_ttl,
        ));
        let evaluator = Arc::new(Evaluator::new(
            db.clone(),
            vault.clone(),
            catalog.clone(),
            self.engine,
        ));

        let mut config = AreaConfig::default();
        config.auth.jwt_secret = Some("test-jwt-secret".to_string());
        config.auth.admin_token = Some("test-admin-token".to_string());
        config.vault.passphrase = Some("test-passphrase".to_string());
        config
            .oauth
            .providers
            .insert(MOCK_PROVIDER.to_string(), mock_provider_config());

        Ok(TestHarness {
            db,
            catalog,
            providers,
            provider,
            poller,
            executor,
            vault,
            oauth,
            evaluator,
            config,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete test environment with mock capabilities and temp storage.
pub struct TestHarness {
    /// Temp database, removed on drop.
    pub db: Database,
    pub catalog: Arc<ServiceRegistry>,
    pub providers: Arc<ProviderRegistry>,
    /// The client behind [`MOCK_PROVIDER`].
    pub provider: Arc<MockOAuthProvider>,
    /// Poller of [`MOCK_ACTION`].
    pub poller: Arc<MockPoller>,
    /// Executor of [`MOCK_REACTION`].
    pub executor: Arc<MockExecutor>,
    pub vault: Arc<CredentialVault>,
    pub oauth: Arc<OAuthGateway>,
    pub evaluator: Arc<Evaluator>,
    /// Configuration matching the assembled stack, with test secrets filled in.
    pub config: AreaConfig,
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    pub async fn create_user(&self, email: &str) -> Result<User, AreaError> {
        users::create_user(&self.db, email, None, None).await
    }

    /// Attach an account for `service_id` to a user and store its tokens.
    pub async fn connect(
        &self,
        user_id: i64,
        service_id: i64,
        tokens: &TokenSet,
    ) -> Result<ServiceAccount, AreaError> {
        let account = accounts::upsert_account(
            &self.db,
            user_id,
            service_id,
            &AccountIdentity {
                remote_account_id: Some(format!("remote-{user_id}")),
                ..AccountIdentity::default()
            },
        )
        .await?;
        self.vault.store_tokens(account.id, tokens, Utc::now()).await?;
        Ok(account)
    }

    /// Create an active Area from the mock action to the mock reaction.
    pub async fn create_mock_area(
        &self,
        user_id: i64,
        params_action: Params,
        params_reaction: Params,
    ) -> Result<Area, AreaError> {
        areas::create_area(
            &self.db,
            &NewArea {
                user_id,
                name: "New item → Record".to_string(),
                action_service_id: MOCK_SERVICE_ID,
                action_id: MOCK_ACTION,
                params_action,
                reaction_service_id: MOCK_SERVICE_ID,
                reaction_id: MOCK_REACTION,
                params_reaction,
                status: AreaStatus::Active,
            },
        )
        .await
    }

    /// An engine over this harness's evaluator.
    pub fn engine(&self) -> Engine {
        Engine::new(self.db.clone(), self.evaluator.clone(), self.vault.clone())
    }
}

/// Build `Params` from a JSON object literal. Non-objects yield empty params.
pub fn params(value: serde_json::Value) -> Params {
    match value {
        serde_json::Value::Object(map) => map,
        _ => Params::new(),
    }
}
