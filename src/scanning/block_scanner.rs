//! Block-range scanning with a bounded worker pool
//!
//! Heights are handed out from a shared counter to a fixed number of tokio
//! tasks. Each task ingests one block at a time through
//! [`UtxoChainAdaptor::get_utxo_transactions_by_height`] and streams the
//! resulting replies over an mpsc channel. The first failure trips the shared
//! [`ScanAbortFlag`]; replies sent before that stay delivered.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::adaptor::UtxoChainAdaptor;
use crate::data_structures::QueryUtxoTransactionReply;
use crate::errors::{GatewayError, GatewayResult};
use crate::scanning::cancellation::{AbortSignal, ScanAbortFlag};

/// Outcome of a completed or aborted scan
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub from_height: u64,
    pub to_height: u64,
    pub blocks_scanned: u64,
    pub transactions: u64,
    /// True when the scan stopped before covering the range
    pub aborted: bool,
}

/// Number of workers used when none is configured
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

pub struct BlockRangeScanner {
    adaptor: Arc<dyn UtxoChainAdaptor>,
    workers: usize,
}

#[derive(Default)]
struct ScanCounters {
    blocks: AtomicU64,
    transactions: AtomicU64,
}

impl BlockRangeScanner {
    pub fn new(adaptor: Arc<dyn UtxoChainAdaptor>) -> Self {
        Self {
            adaptor,
            workers: default_worker_count(),
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Scan `from_height..=to_height`, sending every transaction reply to `sender`
    ///
    /// Returns the first worker error, if any, after every worker has stopped.
    pub async fn scan(
        &self,
        from_height: u64,
        to_height: u64,
        sender: mpsc::Sender<QueryUtxoTransactionReply>,
        abort: ScanAbortFlag,
    ) -> GatewayResult<ScanSummary> {
        if from_height > to_height || to_height == u64::MAX {
            return Err(GatewayError::InvalidRequest(format!(
                "invalid block range {from_height}..={to_height}"
            )));
        }

        let span = to_height - from_height + 1;
        let worker_count = usize::try_from(span)
            .map(|span| span.min(self.workers))
            .unwrap_or(self.workers);
        info!(from_height, to_height, workers = worker_count, "Starting block range scan");

        let next_height = Arc::new(AtomicU64::new(from_height));
        let counters = Arc::new(ScanCounters::default());
        let first_error: Arc<Mutex<Option<GatewayError>>> = Arc::new(Mutex::new(None));

        let mut handles = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let adaptor = Arc::clone(&self.adaptor);
            let next_height = Arc::clone(&next_height);
            let counters = Arc::clone(&counters);
            let first_error = Arc::clone(&first_error);
            let sender = sender.clone();
            let abort = abort.clone();

            handles.push(tokio::spawn(async move {
                loop {
                    if abort.is_aborted() {
                        break;
                    }
                    let height = next_height.fetch_add(1, Ordering::SeqCst);
                    if height > to_height {
                        break;
                    }

                    match adaptor.get_utxo_transactions_by_height(height).await {
                        Ok(replies) => {
                            if abort.is_aborted() {
                                debug!(worker_id, height, "Discarding block fetched after abort");
                                break;
                            }
                            counters.blocks.fetch_add(1, Ordering::Relaxed);
                            for reply in replies {
                                if sender.send(reply).await.is_err() {
                                    warn!(worker_id, height, "Reply receiver dropped, aborting scan");
                                    abort.abort();
                                    return;
                                }
                                counters.transactions.fetch_add(1, Ordering::Relaxed);
                            }
                        }
                        Err(e) => {
                            error!(worker_id, height, error = %e, "Block scan failed, aborting");
                            abort.abort();
                            if let Ok(mut slot) = first_error.lock() {
                                slot.get_or_insert(e);
                            }
                            break;
                        }
                    }
                }
            }));
        }
        drop(sender);

        for handle in handles {
            if let Err(e) = handle.await {
                abort.abort();
                if let Ok(mut slot) = first_error.lock() {
                    slot.get_or_insert(GatewayError::Internal(format!("scan worker failed: {e}")));
                }
            }
        }

        let summary = ScanSummary {
            from_height,
            to_height,
            blocks_scanned: counters.blocks.load(Ordering::Relaxed),
            transactions: counters.transactions.load(Ordering::Relaxed),
            aborted: abort.is_aborted(),
        };

        let failure = first_error.lock().ok().and_then(|mut slot| slot.take());
        if let Some(e) = failure {
            warn!(blocks = summary.blocks_scanned, "Block range scan aborted");
            return Err(e);
        }
        info!(
            blocks = summary.blocks_scanned,
            transactions = summary.transactions,
            aborted = summary.aborted,
            "Block range scan finished"
        );
        Ok(summary)
    }
}
