//! Queue - スレッド安全な action の FIFO
//!
//! 任意のスレッドから push し、1 つの消費スレッドで drain します。
//!
//! # 学習ポイント
//! - [`Queue`] は保留中の action と drain ロジックを持つ
//! - [`SyncQueue`] はイベントループに結び付き、push のたびにループを起こす
//! - 何を起こすかは [`Notifier`] で差し替える（継承ではなく capability）

mod stats;
mod store;
mod sync;

pub use stats::QueueStats;
pub use sync::{ActionSyncQueue, SyncQueue};

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::domain::{Action, Runnable};
use crate::error::QueueError;
use crate::impls::Polled;
use crate::ports::Notifier;

use self::store::Store;

/// ポーリング専用の Action キュー
pub type ActionQueue = Queue<Action, Polled>;

/// 保留中の action と、消費側に drain を促す Notifier
///
/// # 設計意図
/// - [`push`](Self::push) はどのスレッドからでも呼べる
/// - [`run_sync`](Self::run_sync) は 1 つの消費スレッドが呼ぶ（action はそこで実行）
/// - [`close`](Self::close) 後も push は積まれるが、誰も起こさない
///
/// action を残したまま drop すると、コールバックは実行せずに破棄します。
pub struct Queue<A: Runnable = Action, N: Notifier = Polled> {
    store: Arc<Store<A>>,
    notifier: N,
    closed: AtomicBool,
}

impl<A: Runnable> Queue<A, Polled> {
    /// 起こす仕組みのないキュー（`run_sync` は外から呼ぶ）
    pub fn new() -> Self {
        Self::with_notifier(Polled)
    }
}

impl<A: Runnable> Default for Queue<A, Polled> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: Runnable, N: Notifier> Queue<A, N> {
    pub fn with_notifier(notifier: N) -> Self {
        Self::from_parts(Arc::new(Store::new()), notifier)
    }

    pub(crate) fn from_parts(store: Arc<Store<A>>, notifier: N) -> Self {
        Self {
            store,
            notifier,
            closed: AtomicBool::new(false),
        }
    }

    /// 末尾に積み、ロックを外してから消費側に通知
    pub fn push(&self, action: A) {
        let pending = self.store.push(action);
        tracing::trace!(pending, "action pushed");
        self.post();
    }

    /// 先頭を取り出す。所有権は呼び出し側へ移る
    pub fn pop(&self) -> Option<A> {
        self.store.pop()
    }

    /// 呼び出したスレッドで、古い順に全て実行する
    ///
    /// 空を観測するまで続けるので、drain 中に push された分も実行されます。
    /// 戻り値は実行した件数。action が panic した場合はそのまま呼び出し側へ伝わり、
    /// 後ろの action はキューに残ります。
    pub fn run_sync(&self) -> usize {
        self.store.run_sync()
    }

    /// 消費側を起こすのをやめる（冪等）
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            tracing::debug!(pending = self.store.len(), "queue closed");
        }
        self.notifier.close();
    }

    /// 消費側に通知。close 後は何もしない
    pub fn post(&self) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        self.notifier.fire();
    }

    /// キューが空になるのを観測するまでブロック
    ///
    /// `None` は無期限。drain するスレッド自身から呼ぶと自分を待ち続けるので禁止。
    pub fn wait_for_sync(&self, timeout: Option<Duration>) -> Result<(), QueueError> {
        self.store.wait_for_sync(timeout)
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            pending: self.store.len(),
            pushed: self.store.pushed(),
            executed: self.store.executed(),
            closed: self.is_closed(),
        }
    }
}

impl<A: Runnable, N: Notifier> Drop for Queue<A, N> {
    fn drop(&mut self) {
        // Close first so a wake callback cannot start draining mid-drop.
        self.notifier.close();
        let discarded = self.store.take_pending();
        if !discarded.is_empty() {
            tracing::warn!(
                discarded = discarded.len(),
                "queue dropped with pending actions; they will not run"
            );
        }
    }
}
