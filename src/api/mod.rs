//! Request functions against the remote discussion API.

use async_trait::async_trait;
use thiserror::Error;

use crate::{
    auth::AuthToken,
    comments::{Reaction, SubjectId},
};

pub mod github;

pub use github::GithubApi;

/// Why a remote mutation did not go through.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("not authorized to perform this action")]
    Unauthorized,
    #[error("rate limited by the discussion API")]
    RateLimited,
    #[error("rejected by the discussion API: {0}")]
    Rejected(String),
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("confirmation task did not complete: {0}")]
    Join(String),
}

/// The four mutations the optimistic engine confirms remotely.
#[async_trait]
pub trait DiscussionApi: Send + Sync {
    async fn add_upvote(&self, subject: &SubjectId, token: &AuthToken) -> Result<(), ApiError>;

    async fn remove_upvote(&self, subject: &SubjectId, token: &AuthToken)
        -> Result<(), ApiError>;

    async fn add_reaction(
        &self,
        subject: &SubjectId,
        reaction: Reaction,
        token: &AuthToken,
    ) -> Result<(), ApiError>;

    async fn remove_reaction(
        &self,
        subject: &SubjectId,
        reaction: Reaction,
        token: &AuthToken,
    ) -> Result<(), ApiError>;
}
