//! HTTP implementation of the assistant boundary.
//!
//! One call per turn: post the user's utterance, read the reply text.
//! The controller never sees transport details; any failure here is
//! recovered locally with a fixed apology message.

use crate::config::Config;
use crate::ports::AssistantClient;
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
struct AssistantRequest<'a> {
    message: &'a str,
}

#[derive(Debug, Deserialize)]
struct AssistantReply {
    reply: String,
}

pub struct HttpAssistantClient {
    client: Client,
    url: String,
}

impl HttpAssistantClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.assistant_url.clone())
    }
}

#[async_trait]
impl AssistantClient for HttpAssistantClient {
    async fn dispatch(&self, text: &str) -> Result<String> {
        let response = self
            .client
            .post(&self.url)
            .json(&AssistantRequest { message: text })
            .send()
            .await
            .context("Failed to reach the assistant backend")?
            .error_for_status()
            .context("Assistant backend returned an error status")?;

        let body: AssistantReply = response
            .json()
            .await
            .context("Failed to parse the assistant reply")?;
        Ok(body.reply)
    }
}
