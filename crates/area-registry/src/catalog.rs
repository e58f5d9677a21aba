// SPDX-FileCopyrightText: 2026 Area Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Built-in service catalog.
//!
//! Compiled-in reference data. Ids are stable: Areas store them, and the
//! `services` table is seeded from them at startup.

use area_core::ParamType;
use serde::Serialize;

use crate::schema::ParamSpec;

/// An action or reaction offered by a service.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct CapabilityDef {
    pub id: i64,
    /// Machine key, unique within the service.
    pub key: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub params: &'static [ParamSpec],
}

/// A supported third-party service.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ServiceDef {
    pub id: i64,
    /// Immutable key, e.g. `github`.
    pub name: &'static str,
    pub display_name: &'static str,
    pub description: &'static str,
    /// OAuth provider key. `None` when the service needs no account.
    pub oauth_provider: Option<&'static str>,
    pub icon: &'static str,
    pub color: &'static str,
    pub category: &'static str,
    pub actions: &'static [CapabilityDef],
    pub reactions: &'static [CapabilityDef],
}

impl ServiceDef {
    pub fn requires_account(&self) -> bool {
        self.oauth_provider.is_some()
    }
}

pub const TIMER_EVERY_INTERVAL: i64 = 1;
pub const GITHUB_NEW_ISSUE: i64 = 2;
pub const GITHUB_NEW_STAR: i64 = 3;
pub const GMAIL_NEW_EMAIL: i64 = 4;

pub const GITHUB_CREATE_ISSUE: i64 = 1;
pub const GMAIL_SEND_EMAIL: i64 = 2;
pub const DISCORD_WEBHOOK_MESSAGE: i64 = 3;

/// Longest timer interval accepted, one year.
pub const MAX_INTERVAL_MINUTES: i64 = 525_600;

const REPOSITORY_PATTERN: &str = r"^[A-Za-z0-9_.-]+/[A-Za-z0-9_.-]+$";

/// Every service compiled into the broker.
pub static BUILTIN_SERVICES: &[ServiceDef] = &[
    ServiceDef {
        id: 1,
        name: "timer",
        display_name: "Timer",
        description: "Time-based triggers",
        oauth_provider: None,
        icon: "clock",
        color: "#6B7280",
        category: "utility",
        actions: &[CapabilityDef {
            id: TIMER_EVERY_INTERVAL,
            key: "every_interval",
            name: "Every interval",
            description: "Fires once every N minutes",
            params: &[ParamSpec::required("every_minutes", ParamType::Integer, "Minutes between runs")
                .at_least(1)
                .at_most(MAX_INTERVAL_MINUTES)],
        }],
        reactions: &[],
    },
    ServiceDef {
        id: 2,
        name: "github",
        display_name: "GitHub",
        description: "Repositories, issues, and stars",
        oauth_provider: Some("github"),
        icon: "github",
        color: "#181717",
        category: "development",
        actions: &[
            CapabilityDef {
                id: GITHUB_NEW_ISSUE,
                key: "new_issue",
                name: "New issue",
                description: "An issue is opened in a repository",
                params: &[ParamSpec::required("repository", ParamType::String, "owner/name")
                    .matching(REPOSITORY_PATTERN)],
            },
            CapabilityDef {
                id: GITHUB_NEW_STAR,
                key: "new_star",
                name: "New star",
                description: "A repository gains stargazers",
                params: &[ParamSpec::required("repository", ParamType::String, "owner/name")
                    .matching(REPOSITORY_PATTERN)],
            },
        ],
        reactions: &[CapabilityDef {
            id: GITHUB_CREATE_ISSUE,
            key: "create_issue",
            name: "Create issue",
            description: "Open an issue in a repository",
            params: &[
                ParamSpec::required("repository", ParamType::String, "owner/name")
                    .matching(REPOSITORY_PATTERN),
                ParamSpec::required("title", ParamType::String, "Issue title"),
                ParamSpec::optional("body", ParamType::String, "Issue body"),
            ],
        }],
    },
    ServiceDef {
        id: 3,
        name: "google",
        display_name: "Google",
        description: "Gmail",
        oauth_provider: Some("google"),
        icon: "google",
        color: "#4285F4",
        category: "productivity",
        actions: &[CapabilityDef {
            id: GMAIL_NEW_EMAIL,
            key: "gmail_new_email",
            name: "New email",
            description: "A new message arrives in Gmail",
            params: &[ParamSpec::optional("query", ParamType::String, "Gmail search query")],
        }],
        reactions: &[CapabilityDef {
            id: GMAIL_SEND_EMAIL,
            key: "gmail_send_email",
            name: "Send email",
            description: "Send a message from the connected Gmail account",
            params: &[
                ParamSpec::required("to", ParamType::String, "Recipient address")
                    .matching(r"^[^@\s]+@[^@\s]+$"),
                ParamSpec::required("subject", ParamType::String, "Subject line"),
                ParamSpec::required("body", ParamType::String, "Plain-text body"),
            ],
        }],
    },
    ServiceDef {
        id: 4,
        name: "discord",
        display_name: "Discord",
        description: "Channel messages through webhooks",
        oauth_provider: None,
        icon: "discord",
        color: "#5865F2",
        category: "communication",
        actions: &[],
        reactions: &[CapabilityDef {
            id: DISCORD_WEBHOOK_MESSAGE,
            key: "send_webhook_message",
            name: "Send webhook message",
            description: "Post a message to a channel webhook",
            params: &[
                ParamSpec::required("webhook_url", ParamType::String, "Channel webhook URL")
                    .matching(r"^https://"),
                ParamSpec::required("content", ParamType::String, "Message text"),
                ParamSpec::optional("username", ParamType::String, "Display name override"),
                ParamSpec::optional("avatar_url", ParamType::String, "Avatar override"),
            ],
        }],
    },
];

/// Derive a capability key from a display name.
///
/// Drops a leading `"Service - "` prefix, lowercases, turns spaces into
/// underscores, and removes everything outside `[a-z0-9_]`.
pub fn reaction_name_to_key(name: &str) -> String {
    let name = name.split_once(" - ").map_or(name, |(_, rest)| rest);
    name.trim()
        .to_lowercase()
        .replace(' ', "_")
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_')
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_and_names_are_unique() {
        let services: HashSet<_> = BUILTIN_SERVICES.iter().map(|s| s.id).collect();
        assert_eq!(services.len(), BUILTIN_SERVICES.len());
        let names: HashSet<_> = BUILTIN_SERVICES.iter().map(|s| s.name).collect();
        assert_eq!(names.len(), BUILTIN_SERVICES.len());

        let actions: Vec<_> = BUILTIN_SERVICES.iter().flat_map(|s| s.actions).map(|a| a.id).collect();
        assert_eq!(actions.iter().collect::<HashSet<_>>().len(), actions.len());
        let reactions: Vec<_> = BUILTIN_SERVICES.iter().flat_map(|s| s.reactions).map(|r| r.id).collect();
        assert_eq!(reactions.iter().collect::<HashSet<_>>().len(), reactions.len());
    }

    #[test]
    fn keys_match_display_names() {
        for service in BUILTIN_SERVICES {
            for cap in service.reactions {
                assert!(cap.key.ends_with(&reaction_name_to_key(cap.name)), "{}", cap.name);
            }
        }
    }

    #[test]
    fn reaction_key_derivation() {
        assert_eq!(reaction_name_to_key("GitHub - Create Issue"), "create_issue");
        assert_eq!(reaction_name_to_key("Send e-mail!"), "send_email");
        assert_eq!(reaction_name_to_key("  Post  Message "), "post__message");
    }
}
