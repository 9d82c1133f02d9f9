//! Store - キューと wake コールバックが共有する保留中 action の置き場

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::domain::Runnable;
use crate::error::QueueError;

/// 1 つの Mutex で守られた FIFO
///
/// ロックを持つのは O(1) の追加と取り出しの間だけで、action は常にロックの外で実行。
/// pop が空を観測するたびに `drained` を通知します。
pub(crate) struct Store<A> {
    pending: Mutex<VecDeque<A>>,
    drained: Condvar,
    pushed: AtomicU64,
    executed: AtomicU64,
}

impl<A: Runnable> Store<A> {
    pub(crate) fn new() -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            drained: Condvar::new(),
            pushed: AtomicU64::new(0),
            executed: AtomicU64::new(0),
        }
    }

    /// 末尾に追加し、追加後の件数を返す
    pub(crate) fn push(&self, action: A) -> usize {
        let mut pending = self.lock();
        pending.push_back(action);
        self.pushed.fetch_add(1, Ordering::Relaxed);
        pending.len()
    }

    pub(crate) fn pop(&self) -> Option<A> {
        let mut pending = self.lock();
        let next = pending.pop_front();
        if pending.is_empty() {
            self.drained.notify_all();
        }
        next
    }

    /// pop が空を返すまで取り出して実行
    ///
    /// drain 中の push（実行中の action 自身からの push も含む）も同じ呼び出しで拾う。
    pub(crate) fn run_sync(&self) -> usize {
        let mut ran = 0;
        while let Some(action) = self.pop() {
            action.run();
            self.executed.fetch_add(1, Ordering::Relaxed);
            ran += 1;
        }
        if ran > 0 {
            tracing::trace!(ran, "drained actions");
        }
        ran
    }

    pub(crate) fn wait_for_sync(&self, timeout: Option<Duration>) -> Result<(), QueueError> {
        let pending = self.lock();
        match timeout {
            None => {
                let _pending = self
                    .drained
                    .wait_while(pending, |p| !p.is_empty())
                    .unwrap_or_else(PoisonError::into_inner);
                Ok(())
            }
            Some(limit) => {
                let (pending, result) = self
                    .drained
                    .wait_timeout_while(pending, limit, |p| !p.is_empty())
                    .unwrap_or_else(PoisonError::into_inner);
                if result.timed_out() && !pending.is_empty() {
                    return Err(QueueError::WaitTimedOut(limit));
                }
                Ok(())
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    pub(crate) fn pushed(&self) -> u64 {
        self.pushed.load(Ordering::Relaxed)
    }

    pub(crate) fn executed(&self) -> u64 {
        self.executed.load(Ordering::Relaxed)
    }

    /// 実行せずに全て取り除く
    pub(crate) fn take_pending(&self) -> VecDeque<A> {
        let taken = std::mem::take(&mut *self.lock());
        self.drained.notify_all();
        taken
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<A>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
