//! Realtime status subscriptions.
//!
//! A client first asks for a token scoped to one `(channel, topic)` pair,
//! then opens the SSE stream with it. The stream only ever carries events
//! for that pair.

use std::convert::Infallible;

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use serde::Deserialize;
use tokio_stream::{
    wrappers::{errors::BroadcastStreamRecvError, BroadcastStream},
    Stream, StreamExt,
};
use tracing::{debug, warn};

use engine::SubscriptionToken;
use nodes::STATUS_TOPIC;

use super::AppState;
use crate::ApiError;

fn default_topic() -> String {
    STATUS_TOPIC.to_owned()
}

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub channel: String,
    #[serde(default = "default_topic")]
    pub topic: String,
}

pub async fn issue_token(
    State(state): State<AppState>,
    Json(request): Json<TokenRequest>,
) -> Json<SubscriptionToken> {
    Json(state.status.subscribe(&request.channel, &request.topic))
}

pub async fn stream(
    Path(token): Path<String>,
    State(state): State<AppState>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let subscription = state.status.attach(&token)?;
    debug!(channel = %subscription.channel, topic = %subscription.topic, "status stream opened");

    let events = BroadcastStream::new(subscription.into_receiver()).filter_map(|message| {
        match message {
            Ok(event) => match Event::default().event("status").json_data(&event) {
                Ok(sse) => Some(Ok(sse)),
                Err(e) => {
                    warn!("failed to encode status event: {e}");
                    None
                }
            },
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                debug!(skipped, "status stream lagged");
                None
            }
        }
    });

    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
