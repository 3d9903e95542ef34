//! Block-height notifications: "wake me at height H" and height streams.
//!
//! The counter owns a single driver task that consumes new-head
//! notifications from the ledger. Waiters are woken in ascending height
//! order once the observed height reaches theirs; watchers get every newly
//! observed height unless they are slow, in which case heights are dropped
//! for that watcher only and never redelivered.

use crate::error::ChainError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tess_core::Backoff;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, warn};

/// Per-watcher buffer; a watcher further behind than this drops heights.
const WATCHER_BUFFER: usize = 16;

/// Source of new-head notifications from the ledger.
///
/// `subscribe` is called again after an upstream failure; the counter
/// retries with bounded backoff indefinitely.
#[async_trait]
pub trait NewHeadsSource: Send + Sync + 'static {
    /// Open a subscription delivering block heights as they are observed.
    async fn subscribe(&self) -> Result<mpsc::Receiver<u64>, ChainError>;
}

struct CounterState {
    waiters: BTreeMap<u64, Vec<oneshot::Sender<()>>>,
    watchers: Vec<mpsc::Sender<u64>>,
}

struct CounterInner {
    latest: watch::Sender<u64>,
    state: Mutex<CounterState>,
}

/// Monotonic source of block-height notifications.
///
/// Cheap to clone; all clones observe the same driver task.
#[derive(Clone)]
pub struct BlockCounter {
    inner: Arc<CounterInner>,
}

impl BlockCounter {
    /// Start a counter at `initial_height`, driven by `source`.
    pub fn start(source: Arc<dyn NewHeadsSource>, initial_height: u64) -> Self {
        let inner = Arc::new(CounterInner {
            latest: watch::channel(initial_height).0,
            state: Mutex::new(CounterState {
                waiters: BTreeMap::new(),
                watchers: Vec::new(),
            }),
        });
        let driver = Arc::downgrade(&inner);
        tokio::spawn(async move {
            let mut backoff = Backoff::chain();
            loop {
                let mut heads = match source.subscribe().await {
                    Ok(heads) => {
                        backoff.reset(tess_core::defaults::CHAIN_BACKOFF_INITIAL);
                        heads
                    }
                    Err(e) => {
                        let delay = backoff.next_delay();
                        warn!(error = %e, retry_in = ?delay, "new-heads subscription failed");
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                };
                while let Some(height) = heads.recv().await {
                    let Some(inner) = driver.upgrade() else {
                        return;
                    };
                    inner.observe(height);
                }
                // Waiters are woken only by real progress, never by upstream
                // failures; fall through to reconnect.
                if driver.upgrade().is_none() {
                    return;
                }
                let delay = backoff.next_delay();
                warn!(retry_in = ?delay, "new-heads subscription ended, reconnecting");
                tokio::time::sleep(delay).await;
            }
        });
        Self { inner }
    }

    /// The latest observed block height.
    pub fn current_height(&self) -> u64 {
        *self.inner.latest.borrow()
    }

    /// Resolve once the observed height is at least `height`.
    ///
    /// Returns immediately when the height has already been observed; never
    /// resolves early otherwise.
    pub async fn wait_for_block_height(&self, height: u64) {
        if self.current_height() >= height {
            return;
        }
        let rx = {
            let mut state = self.inner.state.lock();
            let (tx, rx) = oneshot::channel();
            state.waiters.entry(height).or_default().push(tx);
            rx
        };
        // The driver may have advanced between the fast check and the
        // registration; the re-check keeps the wait from stranding.
        if self.current_height() >= height {
            return;
        }
        let _ = rx.await;
    }

    /// Stream strictly increasing heights starting at the next observed
    /// block. Ends when the watcher is dropped.
    pub fn watch_blocks(&self) -> BlockWatcher {
        let (tx, rx) = mpsc::channel(WATCHER_BUFFER);
        self.inner.state.lock().watchers.push(tx);
        BlockWatcher { rx }
    }
}

impl CounterInner {
    fn observe(&self, height: u64) {
        let previous = *self.latest.borrow();
        if height <= previous {
            debug!(height, previous, "ignoring non-increasing block height");
            return;
        }
        let _ = self.latest.send(height);

        let (due, watchers) = {
            let mut state = self.state.lock();
            let pending = state.waiters.split_off(&(height + 1));
            let due = std::mem::replace(&mut state.waiters, pending);
            state.watchers.retain(|w| !w.is_closed());
            (due, state.watchers.clone())
        };
        // Ascending order over (previous, height]; BTreeMap iteration
        // provides it.
        for (_, waiters) in due {
            for waiter in waiters {
                let _ = waiter.send(());
            }
        }
        for watcher in watchers {
            // A watcher that is not ready misses this height for good.
            let _ = watcher.try_send(height);
        }
    }
}

/// Consumer end of [`BlockCounter::watch_blocks`].
pub struct BlockWatcher {
    rx: mpsc::Receiver<u64>,
}

impl BlockWatcher {
    /// The next observed height, or `None` once the counter is gone.
    pub async fn next(&mut self) -> Option<u64> {
        self.rx.recv().await
    }
}
