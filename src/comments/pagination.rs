use serde::Serialize;

use super::{window::ReplyWindow, Comment};

/// Link relation for the out-of-band "view on source" link.
pub const REMOTE_LINK_REL: &str = "noreferrer noopener";

/// Browsing context the remote link opens in.
pub const REMOTE_LINK_TARGET: &str = "_blank";

/// Owns the `back_page` counter of one comment instance.
///
/// The counter starts at zero and only ever moves forward, one step per
/// "show previous replies" action, for as long as the instance lives.
#[derive(Debug, Clone, Default)]
pub struct PaginationController {
    back_page: u32,
}

impl PaginationController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn back_page(&self) -> u32 {
        self.back_page
    }

    /// Reveal one more page of cached replies.
    pub fn show_previous(&mut self) {
        self.back_page = self.back_page.saturating_add(1);
    }

    pub fn window<'a>(&self, comment: &'a Comment) -> ReplyWindow<'a> {
        ReplyWindow::new(comment, self.back_page)
    }

    pub fn disclosure(&self, comment: &Comment) -> Disclosure {
        Disclosure::for_window(&self.window(comment), &comment.post.url)
    }
}

/// Controls offered for replies older than the visible window.
///
/// Each control is decided on its own, so a renderer that finds both set
/// shows them side by side with the local one first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Disclosure {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_previous: Option<ShowPrevious>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view_on_source: Option<RemoteLink>,
}

/// "Show N previous replies": grows the local window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShowPrevious {
    pub count: u32,
}

/// "View N previous replies on GitHub": leaves local state untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteLink {
    pub count: u32,
    pub href: String,
    pub rel: &'static str,
    pub target: &'static str,
}

impl Disclosure {
    pub fn for_window(window: &ReplyWindow<'_>, url: &str) -> Self {
        // Nothing cached means nothing to page through, even if the remote
        // source reports replies.
        if !window.has_cached_replies() {
            return Self::default();
        }

        let count = window.remaining();

        let show_previous = window
            .has_local_older_page()
            .then_some(ShowPrevious { count });

        let view_on_source = window
            .has_only_remote_older_replies()
            .then(|| RemoteLink {
                count,
                href: url.to_string(),
                rel: REMOTE_LINK_REL,
                target: REMOTE_LINK_TARGET,
            });

        Self {
            show_previous,
            view_on_source,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.show_previous.is_none() && self.view_on_source.is_none()
    }
}
