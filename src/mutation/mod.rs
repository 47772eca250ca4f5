//! Optimistic updates for upvotes and reactions.
//!
//! Every mutation yields the updated record right away together with a
//! [`Confirmation`]: a spawned task carrying the remote call. The engine never
//! awaits that task and never undoes anything itself; whoever receives the
//! pair through an [`UpdateSink`] decides how to reconcile a failure.

use std::{
    fmt,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{ready, Context, Poll},
};

use serde::Serialize;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::{
    api::{ApiError, DiscussionApi},
    auth::AuthToken,
    comments::{Comment, Post, Reaction, Reply, SubjectId},
};

/// What a confirmation is confirming. Holds the state before the toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MutationKind {
    #[serde(rename_all = "camelCase")]
    Upvote { was_upvoted: bool },
    #[serde(rename_all = "camelCase")]
    Reaction { reaction: Reaction, had_reacted: bool },
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationKind::Upvote { was_upvoted: false } => f.write_str("add upvote"),
            MutationKind::Upvote { was_upvoted: true } => f.write_str("remove upvote"),
            MutationKind::Reaction {
                reaction,
                had_reacted: false,
            } => write!(f, "add {} reaction", reaction.content()),
            MutationKind::Reaction {
                reaction,
                had_reacted: true,
            } => write!(f, "remove {} reaction", reaction.content()),
        }
    }
}

/// Pending remote confirmation of an optimistic update.
///
/// The remote call starts running as soon as the confirmation is created;
/// awaiting it only observes the outcome.
#[derive(Debug)]
pub struct Confirmation {
    id: Uuid,
    subject: SubjectId,
    kind: MutationKind,
    handle: JoinHandle<Result<(), ApiError>>,
}

impl Confirmation {
    pub fn spawn<F>(subject: SubjectId, kind: MutationKind, call: F) -> Self
    where
        F: Future<Output = Result<(), ApiError>> + Send + 'static,
    {
        let id = Uuid::new_v4();
        tracing::debug!("Confirmation {} started: {} on {}", id, kind, subject);

        Self {
            id,
            subject,
            kind,
            handle: tokio::spawn(call),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The post (comment or reply) the remote call targets.
    pub fn subject(&self) -> &SubjectId {
        &self.subject
    }

    pub fn kind(&self) -> MutationKind {
        self.kind
    }
}

impl Future for Confirmation {
    type Output = Result<(), ApiError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let joined = ready!(Pin::new(&mut this.handle).poll(cx));
        Poll::Ready(joined.unwrap_or_else(|e| Err(ApiError::Join(e.to_string()))))
    }
}

/// Receives an optimistic record together with its confirmation.
pub trait UpdateSink {
    fn on_update(&self, record: Comment, confirmation: Confirmation);
}

impl<F> UpdateSink for F
where
    F: Fn(Comment, Confirmation),
{
    fn on_update(&self, record: Comment, confirmation: Confirmation) {
        self(record, confirmation)
    }
}

/// An applied local change and the remote call confirming it.
#[derive(Debug)]
#[must_use = "an optimistic update does nothing until delivered"]
pub struct Optimistic<T> {
    applied: T,
    confirmation: Confirmation,
}

#[cfg(test)]
impl<T> Optimistic<T> {
    pub fn applied(&self) -> &T {
        &self.applied
    }

    pub fn confirmation(&self) -> &Confirmation {
        &self.confirmation
    }
}

impl Optimistic<Comment> {
    /// Hands record and confirmation to `sink` in one call.
    pub fn deliver(self, sink: &impl UpdateSink) {
        sink.on_update(self.applied, self.confirmation)
    }
}

/// Flip the viewer's upvote, moving the count by exactly one.
pub fn toggle_upvote(post: &Post) -> Post {
    let mut next = post.clone();
    next.viewer_has_upvoted = !post.viewer_has_upvoted;
    next.upvote_count = if post.viewer_has_upvoted {
        post.upvote_count.saturating_sub(1)
    } else {
        post.upvote_count.saturating_add(1)
    };
    next
}

/// Flip the viewer's reaction for one emoji; other groups are left as is.
pub fn toggle_reaction(post: &Post, reaction: Reaction) -> Post {
    let mut next = post.clone();
    let group = next.reactions.entry(reaction).or_default();
    group.count = if group.viewer_has_reacted {
        group.count.saturating_sub(1)
    } else {
        group.count.saturating_add(1)
    };
    group.viewer_has_reacted = !group.viewer_has_reacted;
    next
}

impl MutationKind {
    /// Flip the state this kind describes on `post`. A toggle is its own
    /// inverse, so this also undoes an earlier application.
    pub fn toggle(&self, post: &Post) -> Post {
        match *self {
            MutationKind::Upvote { .. } => toggle_upvote(post),
            MutationKind::Reaction { reaction, .. } => toggle_reaction(post, reaction),
        }
    }
}

/// Undo one rejected toggle on `subject` (the comment or one of its replies)
/// against the current record. Later toggles, confirmed or not, are kept.
pub fn revert(comment: &Comment, subject: &SubjectId, kind: MutationKind) -> Option<Comment> {
    if comment.id() == subject {
        return Some(Comment {
            post: kind.toggle(&comment.post),
            ..comment.clone()
        });
    }

    let reply = comment.reply(subject)?;
    comment.with_reply(Reply {
        post: kind.toggle(&reply.post),
    })
}

/// Builds optimistic updates and launches their confirmations.
#[derive(Clone)]
pub struct MutationEngine {
    api: Arc<dyn DiscussionApi>,
}

impl MutationEngine {
    pub fn new(api: Arc<dyn DiscussionApi>) -> Self {
        Self { api }
    }

    pub fn upvote(&self, comment: &Comment, token: &AuthToken) -> Optimistic<Comment> {
        let confirmation = self.confirm_upvote(&comment.post, token);
        Optimistic {
            applied: Comment {
                post: toggle_upvote(&comment.post),
                ..comment.clone()
            },
            confirmation,
        }
    }

    pub fn react(
        &self,
        comment: &Comment,
        reaction: Reaction,
        token: &AuthToken,
    ) -> Optimistic<Comment> {
        let confirmation = self.confirm_reaction(&comment.post, reaction, token);
        Optimistic {
            applied: Comment {
                post: toggle_reaction(&comment.post, reaction),
                ..comment.clone()
            },
            confirmation,
        }
    }

    /// Upvote a cached reply. The applied record is the parent comment.
    pub fn upvote_reply(
        &self,
        comment: &Comment,
        reply_id: &SubjectId,
        token: &AuthToken,
    ) -> Option<Optimistic<Comment>> {
        let original = comment.reply(reply_id)?;
        let applied = comment.with_reply(Reply {
            post: toggle_upvote(&original.post),
        })?;

        let confirmation = self.confirm_upvote(&original.post, token);
        Some(Optimistic {
            applied,
            confirmation,
        })
    }

    /// React to a cached reply. The applied record is the parent comment.
    pub fn react_reply(
        &self,
        comment: &Comment,
        reply_id: &SubjectId,
        reaction: Reaction,
        token: &AuthToken,
    ) -> Option<Optimistic<Comment>> {
        let original = comment.reply(reply_id)?;
        let applied = comment.with_reply(Reply {
            post: toggle_reaction(&original.post, reaction),
        })?;

        let confirmation = self.confirm_reaction(&original.post, reaction, token);
        Some(Optimistic {
            applied,
            confirmation,
        })
    }

    fn confirm_upvote(&self, post: &Post, token: &AuthToken) -> Confirmation {
        let api = Arc::clone(&self.api);
        let subject = post.id.clone();
        let token = token.clone();
        let was_upvoted = post.viewer_has_upvoted;

        Confirmation::spawn(
            post.id.clone(),
            MutationKind::Upvote { was_upvoted },
            async move {
                if was_upvoted {
                    api.remove_upvote(&subject, &token).await
                } else {
                    api.add_upvote(&subject, &token).await
                }
            },
        )
    }

    fn confirm_reaction(&self, post: &Post, reaction: Reaction, token: &AuthToken) -> Confirmation {
        let api = Arc::clone(&self.api);
        let subject = post.id.clone();
        let token = token.clone();
        let had_reacted = post
            .reactions
            .get(&reaction)
            .is_some_and(|group| group.viewer_has_reacted);

        Confirmation::spawn(
            post.id.clone(),
            MutationKind::Reaction {
                reaction,
                had_reacted,
            },
            async move {
                if had_reacted {
                    api.remove_reaction(&subject, reaction, &token).await
                } else {
                    api.add_reaction(&subject, reaction, &token).await
                }
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::{
        api::testing::{Call, FakeApi},
        comments::{fixtures, ReactionGroup},
    };

    fn engine(api: &Arc<FakeApi>) -> MutationEngine {
        MutationEngine::new(api.clone())
    }

    fn token() -> AuthToken {
        AuthToken::new("gho_test")
    }

    #[test]
    fn upvote_toggle_moves_count_by_one() {
        let mut post = fixtures::post("c1");
        post.upvote_count = 3;

        let up = toggle_upvote(&post);
        assert!(up.viewer_has_upvoted);
        assert_eq!(up.upvote_count, 4);

        let back = toggle_upvote(&up);
        assert!(!back.viewer_has_upvoted);
        assert_eq!(back.upvote_count, 3);
        assert_eq!(back, post);
    }

    #[test]
    fn upvote_toggle_never_underflows() {
        let mut post = fixtures::post("c1");
        post.viewer_has_upvoted = true;
        post.upvote_count = 0;

        let next = toggle_upvote(&post);
        assert_eq!(next.upvote_count, 0);
        assert!(!next.viewer_has_upvoted);
    }

    #[test]
    fn reaction_toggle_touches_one_group() {
        let mut post = fixtures::post("c1");
        post.reactions.insert(
            Reaction::Heart,
            ReactionGroup {
                count: 2,
                viewer_has_reacted: false,
            },
        );
        post.reactions.insert(
            Reaction::Rocket,
            ReactionGroup {
                count: 5,
                viewer_has_reacted: true,
            },
        );

        let next = toggle_reaction(&post, Reaction::Heart);
        assert_eq!(
            next.reactions[&Reaction::Heart],
            ReactionGroup {
                count: 3,
                viewer_has_reacted: true
            }
        );
        assert_eq!(next.reactions[&Reaction::Rocket], post.reactions[&Reaction::Rocket]);

        let next = toggle_reaction(&next, Reaction::Rocket);
        assert_eq!(
            next.reactions[&Reaction::Rocket],
            ReactionGroup {
                count: 4,
                viewer_has_reacted: false
            }
        );
        assert_eq!(next.reactions[&Reaction::Heart].count, 3);
    }

    #[test]
    fn reaction_toggle_adds_missing_group_last() {
        let mut post = fixtures::post("c1");
        post.reactions.insert(Reaction::Eyes, ReactionGroup::default());

        let next = toggle_reaction(&post, Reaction::Hooray);
        assert_eq!(
            next.reactions.keys().copied().collect::<Vec<_>>(),
            vec![Reaction::Eyes, Reaction::Hooray]
        );
        assert_eq!(
            next.reactions[&Reaction::Hooray],
            ReactionGroup {
                count: 1,
                viewer_has_reacted: true
            }
        );
        assert!(post.reactions.get(&Reaction::Hooray).is_none());
    }

    #[test]
    fn revert_undoes_one_toggle_among_others() {
        let comment = fixtures::comment("c1", 0, 0);
        let heart = MutationKind::Reaction {
            reaction: Reaction::Heart,
            had_reacted: false,
        };
        let upvote = MutationKind::Upvote { was_upvoted: false };

        let current = Comment {
            post: toggle_upvote(&toggle_reaction(&comment.post, Reaction::Heart)),
            ..comment.clone()
        };

        let reverted = revert(&current, &"c1".into(), heart).unwrap();
        assert_eq!(
            reverted.post.reactions[&Reaction::Heart],
            ReactionGroup::default()
        );
        assert_eq!(reverted.post.upvote_count, 1);
        assert!(reverted.post.viewer_has_upvoted);

        let reverted = revert(&reverted, &"c1".into(), upvote).unwrap();
        assert_eq!(reverted.post.upvote_count, 0);
        assert!(!reverted.post.viewer_has_upvoted);
    }

    #[test]
    fn revert_targets_reply_inside_parent() {
        let comment = fixtures::comment("c1", 2, 2);
        let target = SubjectId::from("c1-r1");
        let kind = MutationKind::Upvote { was_upvoted: false };

        let applied = comment
            .with_reply(Reply {
                post: toggle_upvote(&comment.replies[1].post),
            })
            .unwrap();
        assert_eq!(revert(&applied, &target, kind).unwrap(), comment);
        assert!(revert(&applied, &"c1-r7".into(), kind).is_none());
    }

    #[tokio::test]
    async fn upvote_applies_immediately_and_calls_add() {
        let api = Arc::new(FakeApi::default());
        let mut comment = fixtures::comment("c1", 0, 0);
        comment.post.upvote_count = 3;

        let update = engine(&api).upvote(&comment, &token());
        assert_eq!(update.applied().post.upvote_count, 4);
        assert!(update.applied().post.viewer_has_upvoted);
        assert_eq!(comment.post.upvote_count, 3);
        assert_eq!(
            update.confirmation().kind(),
            MutationKind::Upvote { was_upvoted: false }
        );

        let Optimistic { confirmation, .. } = update;
        confirmation.await.unwrap();
        assert_eq!(api.calls(), vec![Call::AddUpvote("c1".into())]);
    }

    #[tokio::test]
    async fn removing_upvote_calls_remove() {
        let api = Arc::new(FakeApi::default());
        let mut comment = fixtures::comment("c1", 0, 0);
        comment.post.upvote_count = 1;
        comment.post.viewer_has_upvoted = true;

        let update = engine(&api).upvote(&comment, &token());
        assert_eq!(update.applied().post.upvote_count, 0);

        let Optimistic { confirmation, .. } = update;
        confirmation.await.unwrap();
        assert_eq!(api.calls(), vec![Call::RemoveUpvote("c1".into())]);
    }

    #[tokio::test]
    async fn rejected_confirmation_is_observable() {
        let api = Arc::new(FakeApi::failing());
        let comment = fixtures::comment("c1", 0, 0);

        let update = engine(&api).react(&comment, Reaction::Laugh, &token());
        let Optimistic { confirmation, .. } = update;
        assert!(matches!(confirmation.await, Err(ApiError::Rejected(_))));
    }

    #[tokio::test]
    async fn deliver_hands_over_record_and_confirmation_together() {
        let api = Arc::new(FakeApi::default());
        let comment = fixtures::comment("c1", 0, 0);
        let received = Mutex::new(Vec::new());

        let sink = |record: Comment, confirmation: Confirmation| {
            received.lock().unwrap().push((record, confirmation));
        };
        engine(&api).upvote(&comment, &token()).deliver(&sink);

        let (record, confirmation) = received.lock().unwrap().pop().unwrap();
        assert_eq!(record.post.upvote_count, 1);
        assert_eq!(confirmation.subject(), &SubjectId::from("c1"));
        confirmation.await.unwrap();
    }

    #[tokio::test]
    async fn successive_toggles_each_get_a_confirmation() {
        let api = Arc::new(FakeApi::default());
        let engine = engine(&api);
        let comment = fixtures::comment("c1", 0, 0);

        let first = engine.upvote(&comment, &token());
        let second = engine.upvote(first.applied(), &token());
        assert_eq!(second.applied().post, comment.post);
        assert_ne!(first.confirmation().id(), second.confirmation().id());

        let Optimistic {
            confirmation: first,
            ..
        } = first;
        let Optimistic {
            confirmation: second,
            ..
        } = second;
        first.await.unwrap();
        second.await.unwrap();

        assert_eq!(
            api.calls(),
            vec![
                Call::AddUpvote("c1".into()),
                Call::RemoveUpvote("c1".into())
            ]
        );
    }

    #[tokio::test]
    async fn reply_mutations_replace_one_reply() {
        let api = Arc::new(FakeApi::default());
        let comment = fixtures::comment("c1", 3, 3);
        let target = SubjectId::from("c1-r1");

        let update = engine(&api)
            .react_reply(&comment, &target, Reaction::Rocket, &token())
            .unwrap();
        let applied = update.applied();
        assert_eq!(applied.post, comment.post);
        assert_eq!(applied.replies[0], comment.replies[0]);
        assert_eq!(applied.replies[2], comment.replies[2]);
        assert_eq!(applied.replies[1].post.reactions[&Reaction::Rocket].count, 1);

        let Optimistic { confirmation, .. } = update;
        confirmation.await.unwrap();
        assert_eq!(
            api.calls(),
            vec![Call::AddReaction(target.clone(), Reaction::Rocket)]
        );

        let update = engine(&api)
            .upvote_reply(&comment, &target, &token())
            .unwrap();
        assert_eq!(update.applied().replies[1].post.upvote_count, 1);
        let Optimistic { confirmation, .. } = update;
        confirmation.await.unwrap();
    }

    #[tokio::test]
    async fn unknown_reply_yields_nothing() {
        let api = Arc::new(FakeApi::default());
        let comment = fixtures::comment("c1", 1, 1);

        assert!(engine(&api)
            .upvote_reply(&comment, &"missing".into(), &token())
            .is_none());
        assert!(api.calls().is_empty());
    }
}
