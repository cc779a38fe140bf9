use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Notify;

/// Reference count of in-flight deliveries; the run is quiescent exactly
/// when it returns to zero.
///
/// The accounting discipline is the single most failure-prone invariant of
/// the engine:
///
/// - `track` fires at the moment an envelope is handed to one specific
///   consumer's input queue (seed deliveries included).
/// - `settle` fires exactly once per terminal envelope (collected as a
///   result, or dropped at dispatch with no sink) and exactly once per node
///   failure; an error always ends the lineage of the delivery that
///   caused it.
///
/// An off-by-one here either terminates the run early (dropped results) or
/// hangs it forever.
#[derive(Default)]
pub struct CompletionTracker {
    pending: AtomicUsize,
    zero: Notify,
}

impl CompletionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&self) {
        self.pending.fetch_add(1, Ordering::SeqCst);
    }

    pub fn settle(&self) {
        let prev = self.pending.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(prev > 0, "completion tracker underflow");
        if prev == 1 {
            self.zero.notify_waiters();
        }
    }

    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Resolves when the pending count is zero. An empty graph (or an empty
    /// seed batch) is quiescent immediately.
    pub async fn quiescent(&self) {
        loop {
            // Register interest before the check so a settle racing with us
            // cannot be missed.
            let zero = self.zero.notified();
            if self.pending.load(Ordering::SeqCst) == 0 {
                return;
            }
            zero.await;
        }
    }
}
