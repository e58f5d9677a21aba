// SPDX-FileCopyrightText: 2026 Area Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Capability registry: the catalog joined with the code that runs it.
//!
//! Built once at startup and shared read-only afterwards. Pollers and
//! executors are keyed by capability id, so the engine never branches on a
//! provider name.

use std::collections::HashMap;
use std::sync::Arc;

use area_core::{ActionPoller, AreaError, Params, ReactionExecutor};
use area_storage::ServiceRow;

use crate::builtin::{discord, github, google, timer};
use crate::catalog::{self, BUILTIN_SERVICES, CapabilityDef, ServiceDef};
use crate::http::{self, HttpSettings};
use crate::schema::{ExtraKeys, validate_params};

/// Read-only view of services and their runnable capabilities.
pub struct ServiceRegistry {
    services: Vec<ServiceDef>,
    pollers: HashMap<i64, Arc<dyn ActionPoller>>,
    executors: HashMap<i64, Arc<dyn ReactionExecutor>>,
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut pollers: Vec<_> = self.pollers.keys().collect();
        pollers.sort();
        let mut executors: Vec<_> = self.executors.keys().collect();
        executors.sort();
        f.debug_struct("ServiceRegistry")
            .field("services", &self.services.iter().map(|s| s.name).collect::<Vec<_>>())
            .field("pollers", &pollers)
            .field("executors", &executors)
            .finish()
    }
}

impl ServiceRegistry {
    pub fn builder() -> ServiceRegistryBuilder {
        ServiceRegistryBuilder::default()
    }

    /// Registry over the built-in catalog with the built-in implementations.
    pub fn builtin(settings: &HttpSettings) -> Result<Self, AreaError> {
        Self::builder().with_builtins(settings)?.build()
    }

    pub fn services(&self) -> &[ServiceDef] {
        &self.services
    }

    pub fn service(&self, id: i64) -> Option<&ServiceDef> {
        self.services.iter().find(|s| s.id == id)
    }

    pub fn service_by_name(&self, name: &str) -> Option<&ServiceDef> {
        self.services.iter().find(|s| s.name == name)
    }

    /// The service owning an action, and the action itself.
    pub fn action(&self, action_id: i64) -> Option<(&ServiceDef, &CapabilityDef)> {
        self.services
            .iter()
            .find_map(|s| s.actions.iter().find(|a| a.id == action_id).map(|a| (s, a)))
    }

    pub fn reaction(&self, reaction_id: i64) -> Option<(&ServiceDef, &CapabilityDef)> {
        self.services
            .iter()
            .find_map(|s| s.reactions.iter().find(|r| r.id == reaction_id).map(|r| (s, r)))
    }

    pub fn poller(&self, action_id: i64) -> Option<Arc<dyn ActionPoller>> {
        self.pollers.get(&action_id).cloned()
    }

    pub fn executor(&self, reaction_id: i64) -> Option<Arc<dyn ReactionExecutor>> {
        self.executors.get(&reaction_id).cloned()
    }

    /// Check that `action_id` belongs to `service_id` and that `params` fit
    /// its schema. Undeclared keys are kept as event filters.
    pub fn validate_action(&self, service_id: i64, action_id: i64, params: &Params) -> Result<&CapabilityDef, AreaError> {
        let (_, action) = self
            .action(action_id)
            .filter(|(s, _)| s.id == service_id)
            .ok_or_else(|| AreaError::BadRequest("Invalid action".into()))?;
        validate_params(action.params, params, ExtraKeys::Allow)?;
        Ok(action)
    }

    /// Check that `reaction_id` belongs to `service_id` and that `params` fit
    /// its schema exactly.
    pub fn validate_reaction(&self, service_id: i64, reaction_id: i64, params: &Params) -> Result<&CapabilityDef, AreaError> {
        let (_, reaction) = self
            .reaction(reaction_id)
            .filter(|(s, _)| s.id == service_id)
            .ok_or_else(|| AreaError::BadRequest("Invalid reaction".into()))?;
        validate_params(reaction.params, params, ExtraKeys::Reject)?;
        Ok(reaction)
    }

    /// Rows used to seed the `services` table.
    pub fn service_rows(&self) -> Vec<ServiceRow> {
        self.services
            .iter()
            .map(|s| ServiceRow {
                id: s.id,
                name: s.name.to_string(),
                display_name: s.display_name.to_string(),
                description: s.description.to_string(),
                oauth_provider: s.oauth_provider.map(str::to_string),
                icon: Some(s.icon.to_string()),
                color: Some(s.color.to_string()),
                category: Some(s.category.to_string()),
            })
            .collect()
    }
}

/// Assembles a [`ServiceRegistry`]. Later registrations replace earlier ones,
/// which lets tests swap a built-in for a mock.
#[derive(Default)]
pub struct ServiceRegistryBuilder {
    services: Vec<ServiceDef>,
    pollers: HashMap<i64, Arc<dyn ActionPoller>>,
    executors: HashMap<i64, Arc<dyn ReactionExecutor>>,
}

impl ServiceRegistryBuilder {
    /// Add the built-in catalog and its implementations.
    pub fn with_builtins(mut self, settings: &HttpSettings) -> Result<Self, AreaError> {
        let client = http::build_client(settings)?;
        let github = github::GitHubApi::new(client.clone(), settings);
        let gmail = google::GmailApi::new(client.clone(), settings);

        self = self.services(BUILTIN_SERVICES);
        self = self
            .poller(catalog::TIMER_EVERY_INTERVAL, Arc::new(timer::EveryIntervalPoller))
            .poller(catalog::GITHUB_NEW_ISSUE, Arc::new(github::NewIssuePoller::new(github.clone())))
            .poller(catalog::GITHUB_NEW_STAR, Arc::new(github::NewStarPoller::new(github.clone())))
            .poller(catalog::GMAIL_NEW_EMAIL, Arc::new(google::NewEmailPoller::new(gmail.clone())))
            .executor(catalog::GITHUB_CREATE_ISSUE, Arc::new(github::CreateIssueExecutor::new(github)))
            .executor(catalog::GMAIL_SEND_EMAIL, Arc::new(google::SendEmailExecutor::new(gmail)))
            .executor(
                catalog::DISCORD_WEBHOOK_MESSAGE,
                Arc::new(discord::WebhookMessageExecutor::new(client, settings)),
            );
        Ok(self)
    }

    /// Add service definitions. A definition with an id already present replaces it.
    pub fn services(mut self, defs: &[ServiceDef]) -> Self {
        for def in defs {
            self.services.retain(|s| s.id != def.id);
            self.services.push(*def);
        }
        self
    }

    pub fn poller(mut self, action_id: i64, poller: Arc<dyn ActionPoller>) -> Self {
        self.pollers.insert(action_id, poller);
        self
    }

    pub fn executor(mut self, reaction_id: i64, executor: Arc<dyn ReactionExecutor>) -> Self {
        self.executors.insert(reaction_id, executor);
        self
    }

    /// Finish the registry, rejecting duplicate names or capability ids and
    /// capabilities without an implementation.
    pub fn build(mut self) -> Result<ServiceRegistry, AreaError> {
        self.services.sort_by_key(|s| s.id);
        let mut names = std::collections::HashSet::new();
        let mut actions = std::collections::HashSet::new();
        let mut reactions = std::collections::HashSet::new();
        for service in &self.services {
            if !names.insert(service.name) {
                return Err(AreaError::InvariantViolation(format!(
                    "duplicate service name `{}`",
                    service.name
                )));
            }
            for action in service.actions {
                if !actions.insert(action.id) {
                    return Err(AreaError::InvariantViolation(format!("duplicate action id {}", action.id)));
                }
                if !self.pollers.contains_key(&action.id) {
                    return Err(AreaError::InvariantViolation(format!(
                        "action `{}.{}` has no poller",
                        service.name, action.key
                    )));
                }
            }
            for reaction in service.reactions {
                if !reactions.insert(reaction.id) {
                    return Err(AreaError::InvariantViolation(format!("duplicate reaction id {}", reaction.id)));
                }
                if !self.executors.contains_key(&reaction.id) {
                    return Err(AreaError::InvariantViolation(format!(
                        "reaction `{}.{}` has no executor",
                        service.name, reaction.key
                    )));
                }
            }
        }
        Ok(ServiceRegistry {
            services: self.services,
            pollers: self.pollers,
            executors: self.executors,
        })
    }
}
