use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header::HeaderMap, Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{ApiError, DiscussionApi};
use crate::{
    auth::AuthToken,
    comments::{Reaction, SubjectId},
};

const ADD_UPVOTE: &str = r#"
mutation($subjectId: ID!) {
  addUpvote(input: { subjectId: $subjectId }) { subject { upvoteCount } }
}"#;

const REMOVE_UPVOTE: &str = r#"
mutation($subjectId: ID!) {
  removeUpvote(input: { subjectId: $subjectId }) { subject { upvoteCount } }
}"#;

const ADD_REACTION: &str = r#"
mutation($subjectId: ID!, $content: ReactionContent!) {
  addReaction(input: { subjectId: $subjectId, content: $content }) { reaction { content } }
}"#;

const REMOVE_REACTION: &str = r#"
mutation($subjectId: ID!, $content: ReactionContent!) {
  removeReaction(input: { subjectId: $subjectId, content: $content }) { reaction { content } }
}"#;

#[derive(Debug, Deserialize)]
struct GraphqlResponse {
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
}

/// GitHub GraphQL implementation of [`DiscussionApi`].
#[derive(Clone, Debug)]
pub struct GithubApi {
    http: Client,
    endpoint: String,
}

impl GithubApi {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, ApiError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("threadline/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            endpoint: endpoint.to_string(),
        })
    }

    async fn mutate(&self, query: &str, variables: Value, token: &AuthToken) -> Result<(), ApiError> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(token.as_str())
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;

        let status = response.status();
        if let Some(err) = status_error(status, response.headers()) {
            tracing::warn!("Discussion API answered {}: {}", status, err);
            return Err(err);
        }

        let body: GraphqlResponse = response.json().await?;
        graphql_result(body)
    }
}

fn status_error(status: StatusCode, headers: &HeaderMap) -> Option<ApiError> {
    if status.is_success() {
        return None;
    }

    let exhausted = headers
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == "0");

    Some(match status {
        StatusCode::TOO_MANY_REQUESTS => ApiError::RateLimited,
        StatusCode::FORBIDDEN if exhausted => ApiError::RateLimited,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ApiError::Unauthorized,
        other => ApiError::Rejected(format!("unexpected status {other}")),
    })
}

fn graphql_result(body: GraphqlResponse) -> Result<(), ApiError> {
    if body.errors.is_empty() {
        return Ok(());
    }

    let message = body
        .errors
        .into_iter()
        .map(|e| e.message)
        .collect::<Vec<_>>()
        .join("; ");
    Err(ApiError::Rejected(message))
}

#[async_trait]
impl DiscussionApi for GithubApi {
    async fn add_upvote(&self, subject: &SubjectId, token: &AuthToken) -> Result<(), ApiError> {
        self.mutate(ADD_UPVOTE, json!({ "subjectId": subject }), token)
            .await
    }

    async fn remove_upvote(&self, subject: &SubjectId, token: &AuthToken) -> Result<(), ApiError> {
        self.mutate(REMOVE_UPVOTE, json!({ "subjectId": subject }), token)
            .await
    }

    async fn add_reaction(
        &self,
        subject: &SubjectId,
        reaction: Reaction,
        token: &AuthToken,
    ) -> Result<(), ApiError> {
        let variables = json!({ "subjectId": subject, "content": reaction.content() });
        self.mutate(ADD_REACTION, variables, token).await
    }

    async fn remove_reaction(
        &self,
        subject: &SubjectId,
        reaction: Reaction,
        token: &AuthToken,
    ) -> Result<(), ApiError> {
        let variables = json!({ "subjectId": subject, "content": reaction.content() });
        self.mutate(REMOVE_REACTION, variables, token).await
    }
}
