use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Router,
};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::graph::GraphClient;
use crate::lookup::LookupTable;
use crate::webhook::{self, WebhookPayload};

/// Shared application state. The lookup table is immutable after load,
/// so handlers only ever read through the Arc.
pub struct AppState {
    pub config: Config,
    pub table: LookupTable,
    pub graph: GraphClient,
}

impl AppState {
    pub fn new(config: Config, table: LookupTable) -> Self {
        let graph = GraphClient::new(config.graph.clone());
        Self {
            config,
            table,
            graph,
        }
    }
}

/// Start the webhook server.
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let addr = state.config.server.bind_addr.clone();

    let app = Router::new()
        .route("/", get(home))
        .route("/webhook", get(verify_webhook).post(receive_webhook))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    info!("Webhook server listening on {}", addr);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

async fn home() -> &'static str {
    "Instagram comment-to-link DM bot is running."
}

/// The platform's one-time subscription handshake: echo the challenge
/// back iff the verify token matches.
async fn verify_webhook(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> (StatusCode, String) {
    verification_response(&params, &state.config.webhook.verify_token)
}

/// Plain equality on purpose: the handshake proves endpoint ownership to
/// the platform, it is not a secret comparison.
fn verification_response(
    params: &HashMap<String, String>,
    verify_token: &str,
) -> (StatusCode, String) {
    let supplied = params.get("hub.verify_token").map(String::as_str);
    if supplied == Some(verify_token) {
        let challenge = params.get("hub.challenge").cloned().unwrap_or_default();
        info!("Webhook verification handshake succeeded");
        (StatusCode::OK, challenge)
    } else {
        warn!("Webhook verification token mismatch");
        (StatusCode::FORBIDDEN, "Verification token mismatch".to_string())
    }
}

/// Event ingestion. Once the body parses, every item is dispatched and
/// the delivery is acknowledged with 200 regardless of send outcomes;
/// the platform retries whole deliveries, not individual items.
async fn receive_webhook(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> (StatusCode, &'static str) {
    if body.is_empty() {
        warn!("Webhook POST with empty body");
        return (StatusCode::BAD_REQUEST, "bad request");
    }

    let payload: WebhookPayload = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(e) => {
            warn!("Webhook POST with unparseable body: {}", e);
            return (StatusCode::BAD_REQUEST, "bad request");
        }
    };

    let events = webhook::extract_events(&payload);
    info!("Webhook delivery: {} event(s)", events.len());

    let replies = webhook::plan_replies(&events, &state.table, &state.config.bot);
    for reply in &replies {
        // Fire-and-forget: a failed send is logged and swallowed.
        if let Err(e) = state.graph.send(reply).await {
            error!("Failed to send reply to {}: {:#}", reply.target_id, e);
        }
    }

    (StatusCode::OK, "ok")
}
