// SPDX-FileCopyrightText: 2026 Area Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! GitHub REST capabilities.

use std::time::Duration;

use area_core::{
    ActionPoller, AreaError, Params, PollContext, PollOutcome, PushedEvent, ReactionContext,
    ReactionExecutor, TriggerEvent,
};
use async_trait::async_trait;
use serde_json::{Value, json};

use crate::catalog;
use crate::http::{self, HttpSettings};

const SERVICE: &str = "github";

/// Authenticated access to the GitHub API.
#[derive(Debug, Clone)]
pub struct GitHubApi {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl GitHubApi {
    pub fn new(client: reqwest::Client, settings: &HttpSettings) -> Self {
        Self {
            client,
            base_url: settings.github_api.trim_end_matches('/').to_string(),
            timeout: settings.timeout,
        }
    }

    fn request(&self, method: reqwest::Method, path: &str, token: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{path}", self.base_url))
            .bearer_auth(token)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value, AreaError> {
        http::send_json(SERVICE, self.timeout, request).await
    }
}

fn repository<'a>(params: &'a Params) -> Result<&'a str, AreaError> {
    params
        .get("repository")
        .and_then(Value::as_str)
        .ok_or_else(|| AreaError::InvalidParameters("missing required parameter `repository`".into()))
}

fn parse_cursor(raw: &str) -> Result<i64, AreaError> {
    raw.parse()
        .map_err(|_| AreaError::InvariantViolation(format!("corrupt github watermark `{raw}`")))
}

/// `github.new_issue`: issues numbered above the last seen number.
#[derive(Debug, Clone)]
pub struct NewIssuePoller {
    api: GitHubApi,
}

impl NewIssuePoller {
    pub fn new(api: GitHubApi) -> Self {
        Self { api }
    }
}

#[async_trait]
impl ActionPoller for NewIssuePoller {
    async fn poll(&self, ctx: PollContext<'_>) -> Result<PollOutcome, AreaError> {
        let token = http::require_token(SERVICE, ctx.access_token)?;
        let repo = repository(ctx.params)?;
        let body = self
            .api
            .send(
                self.api
                    .request(reqwest::Method::GET, &format!("/repos/{repo}/issues"), token)
                    .query(&[("state", "all"), ("sort", "created"), ("direction", "desc"), ("per_page", "50")]),
            )
            .await?;

        // The issues endpoint also lists pull requests.
        let mut issues: Vec<&Value> = body
            .as_array()
            .map(|items| items.iter().filter(|i| i.get("pull_request").is_none()).collect())
            .unwrap_or_default();
        issues.sort_by_key(|i| i["number"].as_i64().unwrap_or(0));
        let newest = issues.last().and_then(|i| i["number"].as_i64());

        let Some(cursor) = ctx.watermark.map(parse_cursor).transpose()? else {
            return Ok(PollOutcome::quiet(Some(newest.unwrap_or(0).to_string())));
        };

        let events = issues
            .into_iter()
            .filter(|i| i["number"].as_i64().is_some_and(|n| n > cursor))
            .map(|issue| issue_event(repo, issue))
            .collect();
        Ok(PollOutcome {
            events,
            watermark: newest.filter(|n| *n > cursor).map(|n| n.to_string()),
        })
    }
}

/// `github.new_star`: the stargazer count grew.
#[derive(Debug, Clone)]
pub struct NewStarPoller {
    api: GitHubApi,
}

impl NewStarPoller {
    pub fn new(api: GitHubApi) -> Self {
        Self { api }
    }
}

#[async_trait]
impl ActionPoller for NewStarPoller {
    async fn poll(&self, ctx: PollContext<'_>) -> Result<PollOutcome, AreaError> {
        let token = http::require_token(SERVICE, ctx.access_token)?;
        let repo = repository(ctx.params)?;
        let body = self
            .api
            .send(self.api.request(reqwest::Method::GET, &format!("/repos/{repo}"), token))
            .await?;
        let count = body["stargazers_count"].as_i64().ok_or_else(|| {
            AreaError::TransientProvider("github response lacks `stargazers_count`".into())
        })?;

        let Some(previous) = ctx.watermark.map(parse_cursor).transpose()? else {
            return Ok(PollOutcome::quiet(Some(count.to_string())));
        };
        if count <= previous {
            let moved = (count != previous).then(|| count.to_string());
            return Ok(PollOutcome::quiet(moved));
        }
        Ok(PollOutcome {
            events: vec![star_event(repo, count, previous, &body["html_url"])],
            watermark: Some(count.to_string()),
        })
    }
}

fn issue_event(repo: &str, issue: &Value) -> TriggerEvent {
    TriggerEvent {
        id: format!("issue-{}", issue["number"]),
        data: json!({
            "repository": repo,
            "number": issue["number"],
            "title": issue["title"],
            "body": issue["body"],
            "url": issue["html_url"],
            "state": issue["state"],
            "author": issue["user"]["login"],
            "labels": issue["labels"]
                .as_array()
                .map(|ls| ls.iter().filter_map(|l| l["name"].as_str()).collect::<Vec<_>>())
                .unwrap_or_default(),
            "created_at": issue["created_at"],
        }),
    }
}

fn star_event(repo: &str, count: i64, previous: i64, url: &Value) -> TriggerEvent {
    TriggerEvent {
        id: format!("stars-{count}"),
        data: json!({
            "repository": repo,
            "stargazers_count": count,
            "previous_count": previous,
            "new_stars": count - previous,
            "url": url,
        }),
    }
}

/// Map a GitHub webhook delivery onto the action it triggers.
///
/// `event` is the `X-GitHub-Event` header. Opened issues feed
/// `github.new_issue` and new stars feed `github.new_star`, with the same
/// event ids their pollers assign. Anything else yields `None`.
pub fn push_event(event: &str, payload: &Value) -> Option<PushedEvent> {
    let repo = payload["repository"]["full_name"].as_str()?;
    let action = payload["action"].as_str().unwrap_or_default();
    let (action_id, trigger) = match (event, action) {
        ("issues", "opened") => {
            let issue = &payload["issue"];
            if issue.get("pull_request").is_some() || issue["number"].as_i64().is_none() {
                return None;
            }
            (catalog::GITHUB_NEW_ISSUE, issue_event(repo, issue))
        }
        ("star", "created") | ("watch", "started") => {
            let count = payload["repository"]["stargazers_count"].as_i64()?;
            let url = &payload["repository"]["html_url"];
            (catalog::GITHUB_NEW_STAR, star_event(repo, count, count - 1, url))
        }
        _ => return None,
    };
    let mut selector = Params::new();
    selector.insert("repository".into(), Value::from(repo));
    Some(PushedEvent {
        action_id,
        selector,
        event: trigger,
    })
}

/// `github.create_issue`.
#[derive(Debug, Clone)]
pub struct CreateIssueExecutor {
    api: GitHubApi,
}

impl CreateIssueExecutor {
    pub fn new(api: GitHubApi) -> Self {
        Self { api }
    }
}

#[async_trait]
impl ReactionExecutor for CreateIssueExecutor {
    async fn execute(&self, ctx: ReactionContext<'_>) -> Result<(), AreaError> {
        let token = http::require_token(SERVICE, ctx.access_token)?;
        let repo = repository(ctx.params)?;
        let mut payload = json!({ "title": ctx.params.get("title").cloned().unwrap_or_default() });
        if let Some(body) = ctx.params.get("body").filter(|b| !b.is_null()) {
            payload["body"] = body.clone();
        }
        self.api
            .send(
                self.api
                    .request(reqwest::Method::POST, &format!("/repos/{repo}/issues"), token)
                    .json(&payload),
            )
            .await?;
        Ok(())
    }
}
