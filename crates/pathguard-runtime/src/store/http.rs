//! HTTP policy store backed by the admin server.
//!
//! # Endpoints
//!
//! | Call | Request |
//! |------|---------|
//! | `set_rule` | `POST /api/admin/policy/set-rule?agentId=&agentUrl=&path=` + rule JSON |
//! | `clear_rule` | `POST /api/admin/policy/clear-rule?agentId=&agentUrl=&path=` |
//! | `get_all_rules` | `GET /api/admin/policy/rules?agentId=` |
//!
//! The rule listing may be a JSON array of rules or an object keyed by
//! path, bare or under a `rules` field of the usual envelope.
//!
//! Transport errors, 502/503/504 and a 500 whose error mentions the network
//! (the admin server could not reach the agent) are
//! [`StoreError::Unreachable`]. Any other non-2xx status or a
//! `"success": false` body is [`StoreError::Rejected`].

use super::{PolicyStore, RuleRecord};
use crate::transport::{is_upstream_failure, truncate_for_error, Envelope, MAX_ERROR_BODY};
use crate::StoreError;
use async_trait::async_trait;
use pathguard_policy::{CanonicalPath, PermissionSet};
use pathguard_types::AgentId;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::debug;

/// Policy store that talks to the admin server's policy registry.
#[derive(Debug, Clone)]
pub struct HttpPolicyStore {
    client: reqwest::Client,
    base_url: String,
    agent_url: Option<String>,
}

impl HttpPolicyStore {
    /// Creates a store for the admin server at `base_url`.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Creates a store reusing an existing client.
    #[must_use]
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            base_url,
            agent_url: None,
        }
    }

    /// Sets the agent URL the admin server should forward rules to.
    #[must_use]
    pub fn with_agent_url(mut self, agent_url: impl Into<String>) -> Self {
        self.agent_url = Some(agent_url.into());
        self
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/api/admin/policy/{endpoint}", self.base_url)
    }

    fn rule_query<'a>(&'a self, agent: &'a AgentId, path: &'a CanonicalPath) -> Vec<(&'a str, &'a str)> {
        let mut query = vec![("agentId", agent.as_str()), ("path", path.as_str())];
        if let Some(agent_url) = &self.agent_url {
            query.push(("agentUrl", agent_url.as_str()));
        }
        query
    }

    /// Sends `req` and returns the body of a confirmed response.
    async fn execute(&self, req: reqwest::RequestBuilder, endpoint: &str) -> Result<String, StoreError> {
        let resp = req
            .send()
            .await
            .map_err(|e| StoreError::unreachable(self.url(endpoint), e.to_string()))?;
        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| StoreError::unreachable(self.url(endpoint), e.to_string()))?;

        let envelope = Envelope::parse(&body);
        if is_upstream_failure(status, &envelope) {
            return Err(StoreError::unreachable(self.url(endpoint), envelope.reason(&body)));
        }
        if !status.is_success() || envelope.is_failure() {
            return Err(StoreError::rejected(status.as_u16(), envelope.reason(&body)));
        }
        debug!(endpoint, status = status.as_u16(), "Policy store call confirmed");
        Ok(body)
    }
}

#[async_trait]
impl PolicyStore for HttpPolicyStore {
    async fn set_rule(
        &self,
        agent: &AgentId,
        path: &CanonicalPath,
        perms: PermissionSet,
    ) -> Result<(), StoreError> {
        let record = RuleRecord::new(Some(agent), path.as_str(), perms);
        let req = self
            .client
            .post(self.url("set-rule"))
            .query(&self.rule_query(agent, path))
            .json(&record);
        self.execute(req, "set-rule").await.map(|_| ())
    }

    async fn clear_rule(&self, agent: &AgentId, path: &CanonicalPath) -> Result<(), StoreError> {
        let req = self
            .client
            .post(self.url("clear-rule"))
            .query(&self.rule_query(agent, path));
        self.execute(req, "clear-rule").await.map(|_| ())
    }

    async fn get_all_rules(&self, agent: &AgentId) -> Result<Vec<RuleRecord>, StoreError> {
        let req = self
            .client
            .get(self.url("rules"))
            .query(&[("agentId", agent.as_str())]);
        let body = self.execute(req, "rules").await?;
        decode_rules(&body)
    }
}

/// Flags-only rule, as found under a path key.
#[derive(Debug, Deserialize)]
struct KeyedRule {
    #[serde(default)]
    can_read: bool,
    #[serde(default)]
    can_write: bool,
    #[serde(default)]
    can_download: bool,
    #[serde(default)]
    can_execute: bool,
    #[serde(default)]
    can_search: bool,
    #[serde(default)]
    can_delete: bool,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RulesPayload {
    List(Vec<RuleRecord>),
    /// `{"success": true, "rules": ...}`
    Wrapped { rules: Box<RulesPayload> },
    Keyed(BTreeMap<String, KeyedRule>),
}

fn decode_rules(body: &str) -> Result<Vec<RuleRecord>, StoreError> {
    let payload: RulesPayload = serde_json::from_str(body).map_err(|e| {
        StoreError::Codec(format!(
            "{e} in '{}'",
            truncate_for_error(body, MAX_ERROR_BODY)
        ))
    })?;
    Ok(flatten(payload))
}

fn flatten(payload: RulesPayload) -> Vec<RuleRecord> {
    match payload {
        RulesPayload::List(rules) => rules,
        RulesPayload::Wrapped { rules } => flatten(*rules),
        RulesPayload::Keyed(map) => map
            .into_iter()
            .map(|(path, r)| {
                let perms = PermissionSet::new(
                    r.can_read,
                    r.can_write,
                    r.can_download,
                    r.can_execute,
                    r.can_search,
                    r.can_delete,
                );
                RuleRecord::new(None, path, perms)
            })
            .collect(),
    }
}
