use super::{Comment, Reply};

/// Replies shown before any older page has been revealed.
pub const INITIAL_WINDOW: usize = 5;

/// Replies revealed per "show previous" step.
pub const PAGE_SIZE: usize = 50;

/// Number of trailing replies visible after `back_page` steps.
pub fn window_size(back_page: u32) -> usize {
    INITIAL_WINDOW.saturating_add((back_page as usize).saturating_mul(PAGE_SIZE))
}

/// The visible suffix of a comment's cached replies.
#[derive(Debug, Clone, Copy)]
pub struct ReplyWindow<'a> {
    visible: &'a [Reply],
    cached: usize,
    reply_count: u32,
}

impl<'a> ReplyWindow<'a> {
    pub fn new(comment: &'a Comment, back_page: u32) -> Self {
        let cached = comment.replies.len();
        let start = cached.saturating_sub(window_size(back_page));

        Self {
            visible: &comment.replies[start..],
            cached,
            reply_count: comment.reply_count,
        }
    }

    pub fn visible(&self) -> &'a [Reply] {
        self.visible
    }

    /// Replies that exist but are not shown, locally cached or not.
    pub fn remaining(&self) -> u32 {
        let visible = u32::try_from(self.visible.len()).unwrap_or(u32::MAX);
        self.reply_count.saturating_sub(visible)
    }

    pub fn has_cached_replies(&self) -> bool {
        self.cached > 0
    }

    /// More cached replies sit above the current window.
    pub fn has_local_older_page(&self) -> bool {
        self.visible.len() < self.cached
    }

    /// Older replies exist, but only on the remote source.
    pub fn has_only_remote_older_replies(&self) -> bool {
        !self.has_local_older_page() && self.remaining() > 0
    }
}
