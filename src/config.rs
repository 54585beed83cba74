use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReplyMode {
    /// DM the commenter with the looked-up URL.
    #[default]
    Dm,
    /// Post a static reply under the comment instead.
    Comment,
}

impl std::fmt::Display for ReplyMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplyMode::Dm => write!(f, "dm"),
            ReplyMode::Comment => write!(f, "comment"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub webhook: WebhookConfig,
    pub graph: GraphConfig,
    pub bot: BotConfig,
    pub sheet: SheetConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_addr: default_bind_addr(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebhookConfig {
    /// Shared secret checked during the platform's verification GET.
    #[serde(default)]
    pub verify_token: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GraphConfig {
    /// Access token for the messaging API, passed as a query parameter.
    #[serde(default)]
    pub access_token: String,
    #[serde(default = "default_graph_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BotConfig {
    /// The bot's own account id, used to skip self-authored events.
    pub account_id: String,
    #[serde(default)]
    pub reply_mode: ReplyMode,
    #[serde(default = "default_url")]
    pub default_url: String,
    #[serde(default = "default_dm_template")]
    pub dm_template: String,
    #[serde(default = "default_comment_reply_text")]
    pub comment_reply_text: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SheetConfig {
    pub spreadsheet_id: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_range")]
    pub range: String,
    #[serde(default = "default_media_column")]
    pub media_column: String,
    #[serde(default = "default_url_column")]
    pub url_column: String,
}

fn default_bind_addr() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_graph_base_url() -> String {
    "https://graph.facebook.com".to_string()
}

fn default_api_version() -> String {
    "v19.0".to_string()
}

fn default_url() -> String {
    "https://techboltx.com".to_string()
}

fn default_dm_template() -> String {
    "Thanks for commenting! Here's the blog post link: {url}".to_string()
}

fn default_comment_reply_text() -> String {
    "Thanks for commenting! Check your DMs 📩".to_string()
}

fn default_range() -> String {
    "Sheet1".to_string()
}

fn default_media_column() -> String {
    "Media ID".to_string()
}

fn default_url_column() -> String {
    "Blog URL".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let mut config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.fill_from_env();
        config.validate()?;
        Ok(config)
    }

    /// Secrets left empty in the file come from the environment instead,
    /// so config.toml can be committed without tokens in it.
    fn fill_from_env(&mut self) {
        if self.graph.access_token.is_empty() {
            if let Ok(token) = std::env::var("IG_ACCESS_TOKEN") {
                self.graph.access_token = token;
            }
        }
        if self.webhook.verify_token.is_empty() {
            if let Ok(token) = std::env::var("VERIFY_TOKEN") {
                self.webhook.verify_token = token;
            }
        }
        if self.sheet.api_key.is_empty() {
            if let Ok(key) = std::env::var("SHEETS_API_KEY") {
                self.sheet.api_key = key;
            }
        }
    }

    fn validate(&self) -> Result<()> {
        if self.graph.access_token.is_empty() {
            anyhow::bail!("No Graph access token: set [graph] access_token or IG_ACCESS_TOKEN");
        }
        if self.webhook.verify_token.is_empty() {
            anyhow::bail!("No verify token: set [webhook] verify_token or VERIFY_TOKEN");
        }
        if self.sheet.api_key.is_empty() {
            anyhow::bail!("No Sheets API key: set [sheet] api_key or SHEETS_API_KEY");
        }
        Ok(())
    }
}
