use std::sync::Arc;

use axum::{
    extract::{FromRef, State},
    routing::{get, post, put},
    Json, Router,
};
use dotenv::dotenv;
use serde::Deserialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod api;
mod auth;
mod comments;
mod config;
mod context;
mod error;
mod mutation;
mod response;
mod store;

use api::GithubApi;
use config::settings::Settings;
use context::DiscussionContext;
use mutation::MutationEngine;
use response::ApiResponse;
use store::CommentStore;

#[derive(Clone)]
pub struct AppState {
    store: CommentStore,
    engine: MutationEngine,
    context: DiscussionContext,
}

impl FromRef<AppState> for CommentStore {
    fn from_ref(app_state: &AppState) -> CommentStore {
        app_state.store.clone()
    }
}

impl FromRef<AppState> for MutationEngine {
    fn from_ref(app_state: &AppState) -> MutationEngine {
        app_state.engine.clone()
    }
}

impl FromRef<AppState> for DiscussionContext {
    fn from_ref(app_state: &AppState) -> DiscussionContext {
        app_state.context.clone()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContextPayload {
    discussion_number: Option<u64>,
}

/// Publish the discussion the host is currently showing
/// PUT /api/context
async fn update_context(
    State(context): State<DiscussionContext>,
    Json(payload): Json<ContextPayload>,
) -> ApiResponse<Option<u64>> {
    context.publish(payload.discussion_number);
    ApiResponse::success(context.current())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {:?}", e);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let settings = Settings::new();

    let api = GithubApi::new(&settings.graphql_url, settings.api_timeout)?;
    info!("discussion API at {}", settings.graphql_url);

    let store = CommentStore::new(settings.reconcile_policy);
    info!("reconciling failed confirmations with {:?}", store.policy());

    let app_state = AppState {
        store: store.clone(),
        engine: MutationEngine::new(Arc::new(api)),
        context: DiscussionContext::default(),
    };

    let comment_router = Router::new()
        .route(
            "/",
            post(comments::handler::ingest_comments).get(comments::handler::list_comments),
        )
        .route("/:id", get(comments::handler::get_comment))
        .route("/:id/upvote", post(comments::handler::upvote_comment))
        .route("/:id/reactions", post(comments::handler::react_to_comment))
        .route(
            "/:id/replies/previous",
            post(comments::handler::show_previous_replies),
        )
        .route(
            "/:id/replies/:reply_id/upvote",
            post(comments::handler::upvote_reply),
        )
        .route(
            "/:id/replies/:reply_id/reactions",
            post(comments::handler::react_to_reply),
        );

    let app = Router::new()
        .route("/", get(|| async { "Hello, World!" }))
        .nest("/api/comments", comment_router)
        .route(
            "/api/confirmations/failures",
            get(comments::handler::take_failures),
        )
        .route("/api/context", put(update_context))
        .with_state(app_state);

    info!("Server running on http://localhost:{}", settings.port);

    let listener = tokio::net::TcpListener::bind(settings.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("waiting for in-flight confirmations");
    store.settle().await;

    Ok(())
}
