use tokio::sync::watch;

/// The discussion currently being viewed, as published by the host.
///
/// Readers ask for the current value or subscribe to changes; the host is
/// the only writer. `None` means no discussion is resolved yet.
#[derive(Clone, Debug)]
pub struct DiscussionContext {
    tx: watch::Sender<Option<u64>>,
}

impl DiscussionContext {
    pub fn new(initial: Option<u64>) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    pub fn current(&self) -> Option<u64> {
        *self.tx.borrow()
    }

    /// Publish a new value. Subscribers are only woken when it changes.
    pub fn publish(&self, number: Option<u64>) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == number {
                return false;
            }
            *current = number;
            true
        });

        if changed {
            tracing::info!("Discussion context changed to {:?}", number);
        }
        changed
    }

    #[cfg(test)]
    pub fn subscribe(&self) -> watch::Receiver<Option<u64>> {
        self.tx.subscribe()
    }
}

impl Default for DiscussionContext {
    fn default() -> Self {
        Self::new(None)
    }
}
