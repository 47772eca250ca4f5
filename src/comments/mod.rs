use std::fmt;

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

pub mod handler;
pub mod pagination;
pub mod view;
pub mod window;

/// Opaque node identifier assigned by the discussion API.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubjectId(pub String);

impl SubjectId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for SubjectId {
    fn from(id: &str) -> Self {
        SubjectId(id.to_string())
    }
}

/// Identity of whoever wrote a comment or reply
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub login: String,
    pub avatar_url: String,
    pub url: String,
}

/// Relationship between the poster and the repository hosting the discussion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthorAssociation {
    Collaborator,
    Contributor,
    FirstTimer,
    FirstTimeContributor,
    Mannequin,
    Member,
    #[default]
    None,
    Owner,
    App,
}

/// Reaction contents supported by the discussion API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Reaction {
    ThumbsUp,
    ThumbsDown,
    Laugh,
    Hooray,
    Confused,
    Heart,
    Rocket,
    Eyes,
}

impl Reaction {
    pub fn emoji(self) -> &'static str {
        match self {
            Reaction::ThumbsUp => "👍",
            Reaction::ThumbsDown => "👎",
            Reaction::Laugh => "😄",
            Reaction::Hooray => "🎉",
            Reaction::Confused => "😕",
            Reaction::Heart => "❤️",
            Reaction::Rocket => "🚀",
            Reaction::Eyes => "👀",
        }
    }

    /// Wire name used by the GraphQL `ReactionContent` enum.
    pub fn content(self) -> &'static str {
        match self {
            Reaction::ThumbsUp => "THUMBS_UP",
            Reaction::ThumbsDown => "THUMBS_DOWN",
            Reaction::Laugh => "LAUGH",
            Reaction::Hooray => "HOORAY",
            Reaction::Confused => "CONFUSED",
            Reaction::Heart => "HEART",
            Reaction::Rocket => "ROCKET",
            Reaction::Eyes => "EYES",
        }
    }
}

/// Aggregate of one emoji's reactions on a post.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionGroup {
    pub count: u32,
    pub viewer_has_reacted: bool,
}

/// Fields shared by top-level comments and their replies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: SubjectId,
    pub author: Author,
    pub created_at: DateTime<Utc>,
    pub last_edited_at: Option<DateTime<Utc>>,
    /// Pre-rendered HTML body, passed through untouched.
    pub body_html: String,
    pub deleted_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_minimized: bool,
    #[serde(default)]
    pub author_association: AuthorAssociation,
    #[serde(default)]
    pub viewer_did_author: bool,
    pub upvote_count: u32,
    #[serde(default)]
    pub viewer_has_upvoted: bool,
    #[serde(default)]
    pub viewer_can_upvote: bool,
    /// Reaction groups keyed by emoji, in display order.
    #[serde(default)]
    pub reactions: IndexMap<Reaction, ReactionGroup>,
    #[validate(url(message = "Comment url must be a valid URL"))]
    pub url: String,
}

impl Post {
    /// Deleted or minimized posts render as a placeholder only.
    pub fn is_hidden(&self) -> bool {
        self.deleted_at.is_some() || self.is_minimized
    }
}

/// A reply to a top-level comment. Replies never nest further.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    #[serde(flatten)]
    #[validate(nested)]
    pub post: Post,
}

/// A top-level comment and the locally cached slice of its replies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
#[validate(schema(function = "validate_reply_count"))]
pub struct Comment {
    #[serde(flatten)]
    #[validate(nested)]
    pub post: Post,
    /// Total replies known to the remote source.
    pub reply_count: u32,
    /// Cached replies, oldest first.
    #[serde(default)]
    #[validate(nested)]
    pub replies: Vec<Reply>,
}

impl Comment {
    pub fn id(&self) -> &SubjectId {
        &self.post.id
    }

    pub fn reply(&self, id: &SubjectId) -> Option<&Reply> {
        self.replies.iter().find(|reply| &reply.post.id == id)
    }

    /// Returns a copy of this comment with the reply sharing `reply`'s id
    /// swapped out. `None` when no such reply is cached.
    pub fn with_reply(&self, reply: Reply) -> Option<Comment> {
        let index = self
            .replies
            .iter()
            .position(|existing| existing.post.id == reply.post.id)?;

        let mut updated = self.clone();
        updated.replies[index] = reply;
        Some(updated)
    }
}

fn validate_reply_count(comment: &Comment) -> Result<(), ValidationError> {
    if (comment.reply_count as usize) < comment.replies.len() {
        let mut err = ValidationError::new("reply_count");
        err.message = Some("replyCount cannot be lower than the number of cached replies".into());
        return Err(err);
    }
    Ok(())
}

/// Request payload for loading comments into the store
#[derive(Debug, Deserialize, Validate)]
pub struct IngestComments {
    #[validate(nested)]
    pub comments: Vec<Comment>,
}

/// Request payload for toggling a reaction
#[derive(Debug, Deserialize)]
pub struct ReactionPayload {
    pub reaction: Reaction,
}
