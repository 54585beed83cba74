use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::GraphConfig;
use crate::webhook::{ReplyChannel, ReplyRequest};

#[derive(Debug, Serialize)]
struct DmRequest<'a> {
    recipient: Recipient<'a>,
    message: MessageText<'a>,
}

#[derive(Debug, Serialize)]
struct Recipient<'a> {
    id: &'a str,
}

#[derive(Debug, Serialize)]
struct MessageText<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct CommentReplyRequest<'a> {
    message: &'a str,
}

/// Thin client for the Graph messaging endpoints. Sends are awaited
/// inline and never retried; the webhook response has already been
/// decided by the time these run, so outcomes are only logged.
pub struct GraphClient {
    client: reqwest::Client,
    config: GraphConfig,
}

impl GraphClient {
    pub fn new(config: GraphConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Dispatch one planned reply through the right endpoint.
    pub async fn send(&self, reply: &ReplyRequest) -> Result<()> {
        match reply.channel {
            ReplyChannel::DirectMessage => self.send_dm(&reply.target_id, &reply.text).await,
            ReplyChannel::CommentReply => {
                self.reply_to_comment(&reply.target_id, &reply.text).await
            }
        }
    }

    /// `POST /{version}/me/messages` — direct message to a user.
    pub async fn send_dm(&self, recipient_id: &str, text: &str) -> Result<()> {
        let url = format!(
            "{}/{}/me/messages",
            self.config.base_url, self.config.api_version
        );
        let body = DmRequest {
            recipient: Recipient { id: recipient_id },
            message: MessageText { text },
        };
        self.post(&url, &body, &format!("DM to {}", recipient_id))
            .await
    }

    /// `POST /{version}/{comment_id}/replies` — threaded reply under a comment.
    pub async fn reply_to_comment(&self, comment_id: &str, text: &str) -> Result<()> {
        let url = format!(
            "{}/{}/{}/replies",
            self.config.base_url, self.config.api_version, comment_id
        );
        let body = CommentReplyRequest { message: text };
        self.post(&url, &body, &format!("reply to comment {}", comment_id))
            .await
    }

    async fn post<B: Serialize>(&self, url: &str, body: &B, what: &str) -> Result<()> {
        let response = self
            .client
            .post(url)
            .query(&[("access_token", self.config.access_token.as_str())])
            .json(body)
            .send()
            .await
            .with_context(|| format!("Failed to send {}", what))?;

        let status = response.status();
        let response_body = response.text().await.unwrap_or_default();
        if status.is_success() {
            info!("Sent {}: {} {}", what, status, response_body);
        } else {
            warn!("Graph API rejected {}: {} {}", what, status, response_body);
        }

        Ok(())
    }
}
