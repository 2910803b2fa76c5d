//! Optional event stream delivered by the façade on mutation (§4.3, §6).

/// A namespace mutation event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Create,
    Write,
    Remove,
}

/// Delivery is best-effort and may be synchronous (§4.3); a watcher must
/// not block the caller for long.
pub trait Watcher: Send + Sync {
    fn notify(&self, event: Event, path: &str);
}
