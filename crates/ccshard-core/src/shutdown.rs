//! Graceful shutdown support via a shared atomic flag

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cooperative stop signal owned by one run.
///
/// Set by the SIGINT/SIGTERM handler; workers check it before claiming the
/// next shard and finish whatever they already hold.
#[derive(Debug, Clone, Default)]
pub struct Shutdown(Arc<AtomicBool>);

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown. Returns `true` if it had already been requested.
    pub fn request(&self) -> bool {
        self.0.swap(true, Ordering::Relaxed)
    }

    /// Check if shutdown was requested
    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_state() {
        let a = Shutdown::new();
        let b = a.clone();
        assert!(!b.is_requested());
        assert!(!a.request());
        assert!(b.is_requested());
        assert!(b.request());
    }
}
