//! Concurrent block-range scanning

pub mod block_scanner;
pub mod cancellation;

pub use block_scanner::{default_worker_count, BlockRangeScanner, ScanSummary};
pub use cancellation::{AbortHandle, AbortSignal, ScanAbortFlag};
