use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{
    pagination::{Disclosure, PaginationController},
    Author, AuthorAssociation, Comment, Post, Reaction, Reply, SubjectId,
};

/// What the viewer brings to a render.
#[derive(Debug, Clone, Copy, Default)]
pub struct ViewContext {
    pub signed_in: bool,
    pub discussion_number: Option<u64>,
}

/// Presentational projection of a comment thread.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentView {
    #[serde(flatten)]
    pub post: PostView,
    pub back_page: u32,
    pub reply_count: u32,
    #[serde(skip_serializing_if = "Disclosure::is_empty")]
    pub disclosure: Disclosure,
    pub replies: Vec<PostView>,
}

/// One rendered comment or reply.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostView {
    pub id: SubjectId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<Placeholder>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header: Option<Header>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_html: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upvote: Option<UpvoteControl>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reactions: Vec<ReactionView>,
    pub can_react: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub edit: Option<EditAffordance>,
}

/// Neutral text shown in place of a hidden post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Placeholder {
    Deleted,
    Minimized,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Header {
    pub author: Author,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub badge: Option<AuthorAssociation>,
    pub created_at: DateTime<Utc>,
    pub edited: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum UpvoteControl {
    /// No token: the count is replaced by a sign-in prompt.
    SignIn,
    Toggle {
        count: u32,
        upvoted: bool,
        enabled: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionView {
    pub reaction: Reaction,
    pub emoji: &'static str,
    pub count: u32,
    pub viewer_has_reacted: bool,
}

/// Shown only to the author, pointing at the current discussion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EditAffordance {
    pub discussion_number: u64,
}

impl PostView {
    pub fn new(post: &Post, ctx: &ViewContext) -> Self {
        if post.is_hidden() {
            let placeholder = if post.deleted_at.is_some() {
                Placeholder::Deleted
            } else {
                Placeholder::Minimized
            };

            return Self {
                id: post.id.clone(),
                placeholder: Some(placeholder),
                header: None,
                body_html: None,
                upvote: None,
                reactions: Vec::new(),
                can_react: false,
                edit: None,
            };
        }

        let badge = (post.author_association != AuthorAssociation::None)
            .then_some(post.author_association);

        let upvote = if ctx.signed_in {
            UpvoteControl::Toggle {
                count: post.upvote_count,
                upvoted: post.viewer_has_upvoted,
                enabled: post.viewer_can_upvote,
            }
        } else {
            UpvoteControl::SignIn
        };

        let reactions = post
            .reactions
            .iter()
            .filter(|(_, group)| group.count > 0)
            .map(|(reaction, group)| ReactionView {
                reaction: *reaction,
                emoji: reaction.emoji(),
                count: group.count,
                viewer_has_reacted: group.viewer_has_reacted,
            })
            .collect();

        let edit = ctx
            .discussion_number
            .filter(|_| post.viewer_did_author)
            .map(|discussion_number| EditAffordance { discussion_number });

        Self {
            id: post.id.clone(),
            placeholder: None,
            header: Some(Header {
                author: post.author.clone(),
                badge,
                created_at: post.created_at,
                edited: post.last_edited_at.is_some(),
            }),
            body_html: Some(post.body_html.clone()),
            upvote: Some(upvote),
            reactions,
            can_react: ctx.signed_in,
            edit,
        }
    }
}

impl CommentView {
    pub fn new(comment: &Comment, pagination: &PaginationController, ctx: &ViewContext) -> Self {
        Self {
            post: PostView::new(&comment.post, ctx),
            back_page: pagination.back_page(),
            reply_count: comment.reply_count,
            disclosure: pagination.disclosure(comment),
            replies: pagination
                .window(comment)
                .visible()
                .iter()
                .map(|Reply { post }| PostView::new(post, ctx))
                .collect(),
        }
    }
}
