use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use validator::Validate;

use crate::{
    auth::AuthToken,
    comments::{
        view::{CommentView, ViewContext},
        Comment, IngestComments, Post, ReactionPayload, SubjectId,
    },
    context::DiscussionContext,
    error::AppError,
    mutation::{MutationEngine, Optimistic},
    response::ApiResponse,
    store::{CommentStore, StoreError},
};

fn view_context(token: &Option<AuthToken>, context: &DiscussionContext) -> ViewContext {
    ViewContext {
        signed_in: token.is_some(),
        discussion_number: context.current(),
    }
}

fn load_view(
    store: &CommentStore,
    id: &SubjectId,
    ctx: &ViewContext,
) -> Result<CommentView, AppError> {
    store
        .view(id, ctx)
        .ok_or_else(|| AppError::NotFound(format!("Comment {id} not found")))
}

/// The action surface is absent for hidden posts; refuse to act on them.
fn ensure_visible(post: &Post, action: &str) -> Result<(), AppError> {
    if post.is_hidden() {
        return Err(AppError::UnprocessableEntity(format!(
            "Hidden comments cannot be {action}"
        )));
    }
    Ok(())
}

fn ensure_can_upvote(post: &Post) -> Result<(), AppError> {
    ensure_visible(post, "upvoted")?;
    if !post.viewer_can_upvote {
        return Err(AppError::Forbidden(
            "You cannot upvote this comment".to_string(),
        ));
    }
    Ok(())
}

/// Load comment records into the store
/// POST /api/comments
pub async fn ingest_comments(
    State(store): State<CommentStore>,
    Json(payload): Json<IngestComments>,
) -> Result<impl IntoResponse, AppError> {
    payload
        .validate()
        .map_err(|e| AppError::UnprocessableEntity(e.to_string()))?;

    let summary = store.ingest(payload.comments);

    Ok(ApiResponse::ok(format!(
        "{} comments added, {} replaced",
        summary.inserted, summary.replaced
    ))
    .created())
}

/// List every comment instance as a view
/// GET /api/comments
pub async fn list_comments(
    State(store): State<CommentStore>,
    State(context): State<DiscussionContext>,
    token: Option<AuthToken>,
) -> impl IntoResponse {
    let ctx = view_context(&token, &context);
    ApiResponse::success(store.views(&ctx))
}

/// Get a single comment with its visible replies
/// GET /api/comments/:id
pub async fn get_comment(
    State(store): State<CommentStore>,
    State(context): State<DiscussionContext>,
    token: Option<AuthToken>,
    Path(id): Path<SubjectId>,
) -> Result<impl IntoResponse, AppError> {
    let ctx = view_context(&token, &context);
    Ok(ApiResponse::success(load_view(&store, &id, &ctx)?))
}

/// Reveal the next page of cached replies
/// POST /api/comments/:id/replies/previous
pub async fn show_previous_replies(
    State(store): State<CommentStore>,
    State(context): State<DiscussionContext>,
    token: Option<AuthToken>,
    Path(id): Path<SubjectId>,
) -> Result<impl IntoResponse, AppError> {
    store.show_previous(&id)?;

    let ctx = view_context(&token, &context);
    Ok(ApiResponse::success(load_view(&store, &id, &ctx)?))
}

/// Toggle the viewer's upvote on a comment
/// POST /api/comments/:id/upvote
pub async fn upvote_comment(
    State(store): State<CommentStore>,
    State(engine): State<MutationEngine>,
    State(context): State<DiscussionContext>,
    token: AuthToken,
    Path(id): Path<SubjectId>,
) -> Result<impl IntoResponse, AppError> {
    store.mutate(&id, |comment| -> Result<Optimistic<Comment>, AppError> {
        ensure_can_upvote(&comment.post)?;
        Ok(engine.upvote(comment, &token))
    })?;

    let ctx = view_context(&Some(token), &context);
    Ok(ApiResponse::success(load_view(&store, &id, &ctx)?).accepted())
}

/// Toggle one of the viewer's reactions on a comment
/// POST /api/comments/:id/reactions
pub async fn react_to_comment(
    State(store): State<CommentStore>,
    State(engine): State<MutationEngine>,
    State(context): State<DiscussionContext>,
    token: AuthToken,
    Path(id): Path<SubjectId>,
    Json(payload): Json<ReactionPayload>,
) -> Result<impl IntoResponse, AppError> {
    store.mutate(&id, |comment| -> Result<Optimistic<Comment>, AppError> {
        ensure_visible(&comment.post, "reacted to")?;
        Ok(engine.react(comment, payload.reaction, &token))
    })?;

    let ctx = view_context(&Some(token), &context);
    Ok(ApiResponse::success(load_view(&store, &id, &ctx)?).accepted())
}

#[derive(Debug, Deserialize)]
pub struct ReplyPath {
    pub id: SubjectId,
    pub reply_id: SubjectId,
}

/// Toggle the viewer's upvote on a reply
/// POST /api/comments/:id/replies/:reply_id/upvote
pub async fn upvote_reply(
    State(store): State<CommentStore>,
    State(engine): State<MutationEngine>,
    State(context): State<DiscussionContext>,
    token: AuthToken,
    Path(ReplyPath { id, reply_id }): Path<ReplyPath>,
) -> Result<impl IntoResponse, AppError> {
    store.mutate(&id, |comment| -> Result<Optimistic<Comment>, AppError> {
        let reply = comment
            .reply(&reply_id)
            .ok_or_else(|| StoreError::ReplyNotFound(reply_id.clone()))?;
        ensure_can_upvote(&reply.post)?;

        engine
            .upvote_reply(comment, &reply_id, &token)
            .ok_or_else(|| StoreError::ReplyNotFound(reply_id.clone()).into())
    })?;

    let ctx = view_context(&Some(token), &context);
    Ok(ApiResponse::success(load_view(&store, &id, &ctx)?).accepted())
}

/// Toggle one of the viewer's reactions on a reply
/// POST /api/comments/:id/replies/:reply_id/reactions
pub async fn react_to_reply(
    State(store): State<CommentStore>,
    State(engine): State<MutationEngine>,
    State(context): State<DiscussionContext>,
    token: AuthToken,
    Path(ReplyPath { id, reply_id }): Path<ReplyPath>,
    Json(payload): Json<ReactionPayload>,
) -> Result<impl IntoResponse, AppError> {
    store.mutate(&id, |comment| -> Result<Optimistic<Comment>, AppError> {
        let reply = comment
            .reply(&reply_id)
            .ok_or_else(|| StoreError::ReplyNotFound(reply_id.clone()))?;
        ensure_visible(&reply.post, "reacted to")?;

        engine
            .react_reply(comment, &reply_id, payload.reaction, &token)
            .ok_or_else(|| StoreError::ReplyNotFound(reply_id.clone()).into())
    })?;

    let ctx = view_context(&Some(token), &context);
    Ok(ApiResponse::success(load_view(&store, &id, &ctx)?).accepted())
}

/// Drain the confirmation failures recorded since the last call
/// GET /api/confirmations/failures
pub async fn take_failures(State(store): State<CommentStore>) -> impl IntoResponse {
    ApiResponse::success(store.take_failures())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::StatusCode;

    use super::*;
    use crate::{
        api::testing::FakeApi,
        comments::{fixtures, Reaction},
        store::ReconcilePolicy,
    };

    struct Harness {
        api: Arc<FakeApi>,
        store: CommentStore,
        engine: MutationEngine,
        context: DiscussionContext,
    }

    fn harness() -> Harness {
        let api = Arc::new(FakeApi::default());
        Harness {
            engine: MutationEngine::new(api.clone()),
            api,
            store: CommentStore::new(ReconcilePolicy::Rollback),
            context: DiscussionContext::new(Some(7)),
        }
    }

    fn token() -> AuthToken {
        AuthToken::new("gho_test")
    }

    fn status(response: impl IntoResponse) -> StatusCode {
        response.into_response().status()
    }

    #[tokio::test]
    async fn ingest_rejects_broken_invariant() {
        let h = harness();
        let payload = IngestComments {
            comments: vec![fixtures::comment("c1", 6, 2)],
        };

        let result = ingest_comments(State(h.store.clone()), Json(payload)).await;
        assert!(matches!(result, Err(AppError::UnprocessableEntity(_))));
        assert!(h.store.get(&"c1".into()).is_none());
    }

    #[tokio::test]
    async fn ingest_then_read() {
        let h = harness();
        let payload = IngestComments {
            comments: vec![fixtures::comment("c1", 3, 3)],
        };

        let response = ingest_comments(State(h.store.clone()), Json(payload))
            .await
            .unwrap();
        assert_eq!(status(response), StatusCode::CREATED);

        let response = get_comment(
            State(h.store.clone()),
            State(h.context.clone()),
            None,
            Path("c1".into()),
        )
        .await
        .unwrap();
        assert_eq!(status(response), StatusCode::OK);
    }

    #[tokio::test]
    async fn upvote_is_accepted_before_confirmation() {
        let h = harness();
        let mut comment = fixtures::comment("c1", 0, 0);
        comment.post.upvote_count = 3;
        h.store.ingest(vec![comment]);

        let response = upvote_comment(
            State(h.store.clone()),
            State(h.engine.clone()),
            State(h.context.clone()),
            token(),
            Path("c1".into()),
        )
        .await
        .unwrap();
        assert_eq!(status(response), StatusCode::ACCEPTED);
        assert_eq!(h.store.get(&"c1".into()).unwrap().post.upvote_count, 4);

        h.store.settle().await;
        assert_eq!(h.api.calls().len(), 1);
    }

    #[tokio::test]
    async fn upvote_refused_without_permission() {
        let h = harness();
        let mut comment = fixtures::comment("c1", 0, 0);
        comment.post.viewer_can_upvote = false;
        h.store.ingest(vec![comment]);

        let result = upvote_comment(
            State(h.store.clone()),
            State(h.engine.clone()),
            State(h.context.clone()),
            token(),
            Path("c1".into()),
        )
        .await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));
        assert!(h.api.calls().is_empty());
    }

    #[tokio::test]
    async fn upvoting_hidden_comment_names_the_action() {
        let h = harness();
        let mut comment = fixtures::comment("c1", 0, 0);
        comment.post.deleted_at = Some(chrono::Utc::now());
        h.store.ingest(vec![comment]);

        let result = upvote_comment(
            State(h.store.clone()),
            State(h.engine.clone()),
            State(h.context.clone()),
            token(),
            Path("c1".into()),
        )
        .await;
        match result {
            Err(AppError::UnprocessableEntity(message)) => {
                assert_eq!(message, "Hidden comments cannot be upvoted")
            }
            _ => panic!("expected a 422 for a hidden comment"),
        }
        assert!(h.api.calls().is_empty());
    }

    #[tokio::test]
    async fn reacting_to_hidden_reply_is_refused() {
        let h = harness();
        let mut comment = fixtures::comment("c1", 2, 2);
        comment.replies[0].post.is_minimized = true;
        h.store.ingest(vec![comment]);

        let result = react_to_reply(
            State(h.store.clone()),
            State(h.engine.clone()),
            State(h.context.clone()),
            token(),
            Path(ReplyPath {
                id: "c1".into(),
                reply_id: "c1-r0".into(),
            }),
            Json(ReactionPayload {
                reaction: Reaction::Heart,
            }),
        )
        .await;
        assert!(matches!(result, Err(AppError::UnprocessableEntity(_))));
        assert!(h.api.calls().is_empty());
    }

    #[tokio::test]
    async fn unknown_reply_is_not_found() {
        let h = harness();
        h.store.ingest(vec![fixtures::comment("c1", 2, 2)]);

        let result = upvote_reply(
            State(h.store.clone()),
            State(h.engine.clone()),
            State(h.context.clone()),
            token(),
            Path(ReplyPath {
                id: "c1".into(),
                reply_id: "c1-r9".into(),
            }),
        )
        .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn show_previous_without_older_page_is_rejected() {
        let h = harness();
        h.store.ingest(vec![fixtures::comment("c1", 5, 40)]);

        let result = show_previous_replies(
            State(h.store.clone()),
            State(h.context.clone()),
            None,
            Path("c1".into()),
        )
        .await;
        assert!(matches!(result, Err(AppError::UnprocessableEntity(_))));
    }
}
