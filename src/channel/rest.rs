//! REST-backed approval channel
//!
//! Talks to a Mattermost-compatible chat server: resolves the team and
//! channel by name, then creates a post. Every resolution failure is a
//! non-fatal `Ok(false)` so the caller can fall back to denying the action.

use crate::channel::ApprovalChannel;
use crate::config::ApprovalConfig;
use crate::error::AgentError;
use crate::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{error, info};

pub struct RestChannel {
    client: reqwest::Client,
    base_url: String,
    token: String,
    team: String,
}

#[derive(Debug, Deserialize)]
struct IdObject {
    id: String,
}

impl RestChannel {
    pub fn new(config: &ApprovalConfig) -> Result<Self> {
        if config.server_url.is_empty() {
            return Err(AgentError::ConfigError(
                "APPROVAL_SERVER_URL is not configured".to_string(),
            ));
        }
        if config.token.is_empty() {
            return Err(AgentError::ConfigError(
                "APPROVAL_TOKEN is not configured".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .pool_max_idle_per_host(8)
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            base_url: config.server_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            team: config.team.clone(),
        })
    }

    async fn get_id(&self, path: &str) -> Result<Option<String>> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Ok(None);
        }

        let body: IdObject = response.json().await?;
        Ok(Some(body.id))
    }

    async fn resolve_channel_id(&self, channel_name: &str) -> Result<Option<String>> {
        let Some(team_id) = self
            .get_id(&format!("/api/v4/teams/name/{}", self.team))
            .await?
        else {
            error!(team = %self.team, "Approval team not found");
            return Ok(None);
        };

        let channel_id = self
            .get_id(&format!(
                "/api/v4/teams/{}/channels/name/{}",
                team_id, channel_name
            ))
            .await?;

        if channel_id.is_none() {
            error!(
                channel = %channel_name,
                team = %self.team,
                "Approval channel not found"
            );
        }

        Ok(channel_id)
    }
}

#[async_trait]
impl ApprovalChannel for RestChannel {
    async fn send(&self, destination: &str, message: &str) -> Result<bool> {
        let Some(channel_id) = self.resolve_channel_id(destination).await? else {
            return Ok(false);
        };

        let url = format!("{}/api/v4/posts", self.base_url);
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.token)
            .json(&json!({
                "channel_id": channel_id,
                "message": message,
            }))
            .send()
            .await?;

        if response.status().is_success() {
            info!(channel = %destination, "Message posted to approval channel");
            Ok(true)
        } else {
            error!(
                status = %response.status(),
                "Failed to post to approval channel"
            );
            Ok(false)
        }
    }
}
