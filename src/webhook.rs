use serde::Deserialize;
use tracing::debug;

use crate::config::{BotConfig, ReplyMode};
use crate::lookup::LookupTable;

/// Top-level webhook notification body. Instagram batches items as
/// `entry[].changes[]` (comments) and `entry[].messaging[]` (DMs).
#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub entry: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
pub struct Entry {
    #[serde(default)]
    pub changes: Vec<Change>,
    #[serde(default)]
    pub messaging: Vec<Messaging>,
}

#[derive(Debug, Deserialize)]
pub struct Change {
    #[serde(default)]
    pub field: String,
    #[serde(default)]
    pub value: ChangeValue,
}

#[derive(Debug, Deserialize, Default)]
pub struct ChangeValue {
    pub from: Option<Author>,
    /// The comment's own id.
    pub id: Option<String>,
    pub media: Option<Media>,
    /// Legacy field from before media ids; still sent by old subscriptions.
    pub media_shortcode: Option<String>,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Author {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct Media {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct Messaging {
    pub sender: Option<Author>,
    pub message: Option<MessageBody>,
}

#[derive(Debug, Deserialize)]
pub struct MessageBody {
    pub text: Option<String>,
    /// Set on our own outbound messages echoed back by the platform.
    #[serde(default)]
    pub is_echo: bool,
}

/// A single actionable event pulled out of the payload.
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookEvent {
    Comment {
        commenter_id: String,
        comment_id: String,
        media_id: Option<String>,
    },
    Message {
        sender_id: String,
        text: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReplyChannel {
    DirectMessage,
    CommentReply,
}

/// One outbound send the dispatcher decided on. `target_id` is a user id
/// for DMs and a comment id for comment replies.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplyRequest {
    pub target_id: String,
    pub text: String,
    pub channel: ReplyChannel,
}

/// Pull typed events out of a parsed payload. Items with missing fields
/// are skipped, never failing the whole delivery.
pub fn extract_events(payload: &WebhookPayload) -> Vec<WebhookEvent> {
    let mut events = Vec::new();

    for entry in &payload.entry {
        for change in &entry.changes {
            if change.field != "comments" {
                debug!("Ignoring change field: {}", change.field);
                continue;
            }
            let value = &change.value;
            let (Some(from), Some(comment_id)) = (&value.from, &value.id) else {
                debug!("Comment change missing author or comment id, skipping");
                continue;
            };
            let media_id = value
                .media
                .as_ref()
                .map(|m| m.id.clone())
                .or_else(|| value.media_shortcode.clone());
            events.push(WebhookEvent::Comment {
                commenter_id: from.id.clone(),
                comment_id: comment_id.clone(),
                media_id,
            });
        }

        for messaging in &entry.messaging {
            let Some(sender) = &messaging.sender else {
                debug!("Messaging item without sender, skipping");
                continue;
            };
            let Some(message) = &messaging.message else {
                debug!("Messaging item without message body, skipping");
                continue;
            };
            if message.is_echo {
                debug!("Skipping echo of our own message");
                continue;
            }
            events.push(WebhookEvent::Message {
                sender_id: sender.id.clone(),
                text: message.text.clone().unwrap_or_default(),
            });
        }
    }

    events
}

/// Decide what to send for each event. Pure: the caller performs the
/// actual Graph API calls.
pub fn plan_replies(
    events: &[WebhookEvent],
    table: &LookupTable,
    bot: &BotConfig,
) -> Vec<ReplyRequest> {
    let mut replies = Vec::new();

    for event in events {
        match event {
            WebhookEvent::Comment {
                commenter_id,
                comment_id,
                media_id,
            } => {
                // Replying to our own comments would loop forever.
                if *commenter_id == bot.account_id {
                    debug!("Skipping our own comment {}", comment_id);
                    continue;
                }
                match bot.reply_mode {
                    ReplyMode::Dm => {
                        let url = match media_id {
                            Some(id) => table.url_for(id),
                            None => table.default_url(),
                        };
                        replies.push(ReplyRequest {
                            target_id: commenter_id.clone(),
                            text: render_template(&bot.dm_template, url),
                            channel: ReplyChannel::DirectMessage,
                        });
                    }
                    ReplyMode::Comment => {
                        replies.push(ReplyRequest {
                            target_id: comment_id.clone(),
                            text: bot.comment_reply_text.clone(),
                            channel: ReplyChannel::CommentReply,
                        });
                    }
                }
            }
            WebhookEvent::Message { sender_id, .. } => {
                if *sender_id == bot.account_id {
                    debug!("Skipping message from our own account");
                    continue;
                }
                // A DM thread carries no media id, so there is nothing to
                // look up; answer with the default URL.
                replies.push(ReplyRequest {
                    target_id: sender_id.clone(),
                    text: render_template(&bot.dm_template, table.default_url()),
                    channel: ReplyChannel::DirectMessage,
                });
            }
        }
    }

    replies
}

fn render_template(template: &str, url: &str) -> String {
    template.replace("{url}", url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SheetConfig;

    const BOT_ID: &str = "17841400000000000";

    fn bot_config(reply_mode: &str) -> BotConfig {
        toml::from_str(&format!(
            r#"
                account_id = "{BOT_ID}"
                reply_mode = "{reply_mode}"
                default_url = "https://example.com"
                dm_template = "Link: {{url}}"
                comment_reply_text = "Check your DMs!"
            "#
        ))
        .unwrap()
    }

    fn table() -> LookupTable {
        let sheet: SheetConfig = toml::from_str(
            r#"
                spreadsheet_id = "1AbC"
                api_key = "k"
            "#,
        )
        .unwrap();
        LookupTable::from_rows(
            &[
                vec!["Media ID".to_string(), "Blog URL".to_string()],
                vec!["18012345".to_string(), "https://example.com/post-a".to_string()],
            ],
            &sheet,
            "https://example.com".to_string(),
        )
        .unwrap()
    }

    fn comment_payload(commenter_id: &str, media_id: &str) -> WebhookPayload {
        serde_json::from_value(serde_json::json!({
            "object": "instagram",
            "entry": [{
                "id": "0",
                "time": 1700000000,
                "changes": [{
                    "field": "comments",
                    "value": {
                        "from": { "id": commenter_id, "username": "someone" },
                        "media": { "id": media_id, "media_product_type": "FEED" },
                        "id": "17900001111222333",
                        "text": "Where can I read more?"
                    }
                }]
            }]
        }))
        .unwrap()
    }

    fn message_payload(sender_id: &str, text: &str) -> WebhookPayload {
        serde_json::from_value(serde_json::json!({
            "object": "instagram",
            "entry": [{
                "id": "0",
                "time": 1700000000,
                "messaging": [{
                    "sender": { "id": sender_id },
                    "recipient": { "id": BOT_ID },
                    "timestamp": 1700000000,
                    "message": { "mid": "m_abc", "text": text }
                }]
            }]
        }))
        .unwrap()
    }

    #[test]
    fn test_comment_with_known_media_id_gets_mapped_url() {
        let payload = comment_payload("42", "18012345");
        let events = extract_events(&payload);
        let replies = plan_replies(&events, &table(), &bot_config("dm"));
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].target_id, "42");
        assert_eq!(replies[0].channel, ReplyChannel::DirectMessage);
        assert_eq!(replies[0].text, "Link: https://example.com/post-a");
    }

    #[test]
    fn test_comment_with_unknown_media_id_gets_default_url() {
        let payload = comment_payload("42", "99999999");
        let events = extract_events(&payload);
        let replies = plan_replies(&events, &table(), &bot_config("dm"));
        assert_eq!(replies[0].text, "Link: https://example.com");
    }

    #[test]
    fn test_own_comment_is_skipped() {
        let payload = comment_payload(BOT_ID, "18012345");
        let events = extract_events(&payload);
        let replies = plan_replies(&events, &table(), &bot_config("dm"));
        assert!(replies.is_empty());
    }

    #[test]
    fn test_comment_mode_replies_under_the_comment() {
        let payload = comment_payload("42", "18012345");
        let events = extract_events(&payload);
        let replies = plan_replies(&events, &table(), &bot_config("comment"));
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].channel, ReplyChannel::CommentReply);
        assert_eq!(replies[0].target_id, "17900001111222333");
        assert_eq!(replies[0].text, "Check your DMs!");
    }

    #[test]
    fn test_message_event_plans_exactly_one_dm() {
        let payload = message_payload("42", "hi");
        let events = extract_events(&payload);
        let replies = plan_replies(&events, &table(), &bot_config("dm"));
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].channel, ReplyChannel::DirectMessage);
        assert_eq!(replies[0].target_id, "42");
        assert_eq!(replies[0].text, "Link: https://example.com");
    }

    #[test]
    fn test_echo_message_is_ignored() {
        let payload: WebhookPayload = serde_json::from_value(serde_json::json!({
            "entry": [{
                "messaging": [{
                    "sender": { "id": BOT_ID },
                    "message": { "mid": "m_abc", "text": "Link: ...", "is_echo": true }
                }]
            }]
        }))
        .unwrap();
        assert!(extract_events(&payload).is_empty());
    }

    #[test]
    fn test_legacy_shortcode_used_when_media_id_absent() {
        let payload: WebhookPayload = serde_json::from_value(serde_json::json!({
            "entry": [{
                "changes": [{
                    "field": "comments",
                    "value": {
                        "from": { "id": "42" },
                        "id": "17900001111222333",
                        "media_shortcode": "18012345"
                    }
                }]
            }]
        }))
        .unwrap();
        let events = extract_events(&payload);
        assert_eq!(
            events,
            vec![WebhookEvent::Comment {
                commenter_id: "42".to_string(),
                comment_id: "17900001111222333".to_string(),
                media_id: Some("18012345".to_string()),
            }]
        );
    }

    #[test]
    fn test_non_comment_changes_and_incomplete_items_are_skipped() {
        let payload: WebhookPayload = serde_json::from_value(serde_json::json!({
            "entry": [{
                "changes": [
                    { "field": "mentions", "value": { "from": { "id": "42" }, "id": "1" } },
                    { "field": "comments", "value": { "text": "no author" } }
                ],
                "messaging": [
                    { "sender": { "id": "42" } }
                ]
            }]
        }))
        .unwrap();
        assert!(extract_events(&payload).is_empty());
    }

    #[test]
    fn test_replayed_payload_plans_replies_again() {
        // No dedup: two deliveries mean two sends.
        let payload = comment_payload("42", "18012345");
        let events = extract_events(&payload);
        let first = plan_replies(&events, &table(), &bot_config("dm"));
        let second = plan_replies(&events, &table(), &bot_config("dm"));
        assert_eq!(first, second);
        assert_eq!(first.len(), 1);
    }
}
