//! Demo relay server streaming a scripted session over SSE.
//!
//! Run with: cargo run -p sse-relay-demo
//!
//! Then:
//! ```text
//! curl -N -H 'content-type: application/json' \
//!      -d '{"content":"hello there"}' \
//!      http://localhost:3000/session/ses_demo/prompt
//! ```
//!
//! A prompt containing the word `fail` makes the scripted provider reject
//! halfway through, which shows up as an `error` record before `stream.end`.

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use anyhow::Context;
use async_trait::async_trait;
use axum::{
    Json, Router,
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
};
use futures::StreamExt;
use serde_json::json;
use session_sync_core::{Event, MessageInfo, Part, PromptRequest, Role, event::PartUpdated};
use session_sync_relay::{ProviderError, UpdateProvider, UpdateStream, open};
use session_sync_transport::{protocol::now_millis, sse::sse_response};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Listen address override.
const ADDR_ENV: &str = "SESSION_SYNC_ADDR";

/// Delay between streamed tokens.
const TOKEN_DELAY: Duration = Duration::from_millis(40);

#[derive(Clone)]
struct AppState {
    provider: Arc<ScriptedProvider>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let addr: SocketAddr = std::env::var(ADDR_ENV)
        .unwrap_or_else(|_| "127.0.0.1:3000".to_string())
        .parse()
        .with_context(|| format!("invalid {ADDR_ENV}"))?;

    let state = AppState {
        provider: Arc::new(ScriptedProvider::new()),
    };

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/session/{session_id}/prompt", post(prompt_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state);

    tracing::info!("Relay listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn prompt_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<PromptRequest>,
) -> impl IntoResponse {
    let (tx, rx) = mpsc::channel(64);
    let provider = Arc::clone(&state.provider);

    tokio::spawn(async move {
        let report = open(tx, session_id.clone(), request, provider.as_ref()).await;
        tracing::info!(
            %session_id,
            outcome = ?report.outcome,
            records = report.records_written,
            "Stream finished"
        );
    });

    sse_response(rx)
}

/// Echoes the prompt back word by word, the way a model streams tokens.
struct ScriptedProvider {
    next_id: AtomicU64,
}

impl ScriptedProvider {
    fn new() -> Self {
        Self {
            next_id: AtomicU64::new(u64::try_from(now_millis()).unwrap_or_default() << 16),
        }
    }

    /// Ids ascend in creation order.
    fn id(&self, prefix: &str) -> String {
        format!("{prefix}_{:016x}", self.next_id.fetch_add(1, Ordering::Relaxed))
    }
}

#[async_trait]
impl UpdateProvider for ScriptedProvider {
    async fn start(
        &self,
        session_id: &str,
        request: PromptRequest,
    ) -> Result<UpdateStream, ProviderError> {
        if request.content.trim().is_empty() {
            return Err(ProviderError::new("BadRequestError", "empty prompt"));
        }

        let script = Script {
            session_id: session_id.to_string(),
            user_id: self.id("msg"),
            user_part_id: self.id("prt"),
            reply_id: self.id("msg"),
            reply_part_id: self.id("prt"),
            content: request.content,
            started: now_millis(),
        };

        let (tx, rx) = mpsc::channel(16);
        tokio::spawn(script.play(tx));
        Ok(ReceiverStream::new(rx).boxed())
    }
}

struct Script {
    session_id: String,
    user_id: String,
    user_part_id: String,
    reply_id: String,
    reply_part_id: String,
    content: String,
    started: i64,
}

impl Script {
    fn info(&self, id: &str, role: Role) -> MessageInfo {
        let mut info = MessageInfo::new(id);
        info.session_id = Some(self.session_id.clone());
        info.role = Some(role);
        info.fields.insert("time".to_string(), json!({ "created": self.started }));
        info
    }

    async fn play(self, tx: mpsc::Sender<Result<Event, ProviderError>>) {
        let opening = [
            Event::message_updated(self.info(&self.user_id, Role::User)),
            Event::part_updated(Part::text(
                &self.user_part_id,
                &self.user_id,
                &self.session_id,
                &self.content,
            )),
            Event::message_updated(self.info(&self.reply_id, Role::Assistant)),
        ];
        for event in opening {
            if tx.send(Ok(event)).await.is_err() {
                return;
            }
        }

        let fail = self.content.split_whitespace().any(|word| word == "fail");
        let mut text = String::new();
        for word in self.content.split_whitespace() {
            tokio::time::sleep(TOKEN_DELAY).await;
            if fail && !text.is_empty() {
                let _ = tx
                    .send(Err(ProviderError::new("ProviderError", "scripted failure")))
                    .await;
                return;
            }

            let delta = if text.is_empty() {
                word.to_string()
            } else {
                format!(" {word}")
            };
            text.push_str(&delta);
            let part = Part::text(&self.reply_part_id, &self.reply_id, &self.session_id, &text);
            let event = Event::PartUpdated(PartUpdated {
                part,
                delta: Some(delta),
            });
            if tx.send(Ok(event)).await.is_err() {
                return;
            }
        }

        let mut info = self.info(&self.reply_id, Role::Assistant);
        info.fields.insert(
            "time".to_string(),
            json!({ "created": self.started, "completed": now_millis() }),
        );
        info.fields.insert("finish".to_string(), json!("stop"));
        let _ = tx.send(Ok(Event::message_updated(info))).await;
    }
}
