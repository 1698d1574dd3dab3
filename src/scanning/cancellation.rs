//! Abort flag shared by block-scan workers
//!
//! One flag is shared by every worker of a scan. The first worker that hits
//! an unrecoverable error trips it; the others check it before each block
//! and after each fetch, and stop promptly. An [`AbortHandle`] lets code
//! outside the scan (for example a Ctrl+C handler) trip the same flag.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Something a scan can poll to learn it should stop
pub trait AbortSignal: Send + Sync + std::fmt::Debug {
    fn is_aborted(&self) -> bool;

    fn abort(&self);
}

/// Atomic abort flag, cheap to clone into every worker
#[derive(Debug, Clone, Default)]
pub struct ScanAbortFlag {
    aborted: Arc<AtomicBool>,
}

impl ScanAbortFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle that can trip this flag from another context
    pub fn handle(&self) -> AbortHandle {
        AbortHandle {
            aborted: Arc::clone(&self.aborted),
        }
    }
}

impl AbortSignal for ScanAbortFlag {
    fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    fn abort(&self) {
        self.aborted.store(true, Ordering::Release);
    }
}

/// Trigger for a [`ScanAbortFlag`], without access to the scan itself
#[derive(Debug, Clone)]
pub struct AbortHandle {
    aborted: Arc<AtomicBool>,
}

impl AbortHandle {
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::Release);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_state() {
        let flag = ScanAbortFlag::new();
        let worker = flag.clone();
        assert!(!worker.is_aborted());
        flag.abort();
        assert!(worker.is_aborted());
    }

    #[test]
    fn test_handle_trips_flag() {
        let flag = ScanAbortFlag::new();
        let handle = flag.handle();
        handle.abort();
        assert!(flag.is_aborted());
        assert!(handle.is_aborted());
    }
}
