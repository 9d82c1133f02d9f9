//! WakeSlot - ThreadLoop / TokioLoop 共通の wake source 管理
//!
//! slot は登録されたコールバック 1 つ分です。
//! producer はどのスレッドからでも fired を立て、ループスレッドがそれを取ってコールバックを実行します。
//!
//! # 学習ポイント
//! - fired フラグで連続した fire を 1 回にまとめる
//! - `gate` の Mutex で、close が実行中のコールバックの終了を待つ
//! - コールバックの panic は `catch_unwind` でループに波及させない

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use crate::domain::SourceId;
use crate::error::LoopError;
use crate::ports::WakeCallback;

pub(crate) struct WakeSlot {
    id: SourceId,
    callback: WakeCallback,
    fired: AtomicBool,
    closed: AtomicBool,
    /// コールバック実行中は保持。close はこれを取って実行完了を待つ
    gate: Mutex<()>,
    loop_thread: ThreadId,
}

impl WakeSlot {
    pub(crate) fn new(callback: WakeCallback, loop_thread: ThreadId) -> Self {
        Self {
            id: SourceId::generate(),
            callback,
            fired: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            gate: Mutex::new(()),
            loop_thread,
        }
    }

    pub(crate) fn id(&self) -> SourceId {
        self.id
    }

    /// ループを起こす必要があれば `true`（open で、まだ fired でない）
    pub(crate) fn mark_fired(&self) -> bool {
        if self.is_closed() {
            return false;
        }
        !self.fired.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn take_fired(&self) -> bool {
        self.fired.swap(false, Ordering::AcqRel)
    }

    /// close されていなければコールバックを実行（ループスレッド専用）
    pub(crate) fn invoke(&self) {
        let _gate = self.gate();
        if self.is_closed() {
            return;
        }
        if catch_unwind(AssertUnwindSafe(|| (self.callback)())).is_err() {
            tracing::error!(source = %self.id, "wake callback panicked");
        }
    }

    /// slot を閉じる。最初の呼び出しだけ `true`
    ///
    /// ループスレッド以外から呼ぶと実行中のコールバックを待つので、
    /// 戻った後にコールバックが走ることはない。
    pub(crate) fn close(&self) -> bool {
        let first = !self.closed.swap(true, Ordering::AcqRel);
        if thread::current().id() != self.loop_thread {
            drop(self.gate());
        }
        first
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn gate(&self) -> MutexGuard<'_, ()> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// 1 つのループに登録された slot と停止フラグ
#[derive(Default)]
pub(crate) struct SlotRegistry {
    slots: Mutex<Vec<Arc<WakeSlot>>>,
    stopping: AtomicBool,
}

impl SlotRegistry {
    pub(crate) fn register(&self, slot: Arc<WakeSlot>) -> Result<(), LoopError> {
        let mut slots = self.slots();
        if self.is_stopping() {
            return Err(LoopError::Stopped);
        }
        slots.retain(|s| !s.is_closed());
        slots.push(slot);
        Ok(())
    }

    /// fired かつ open な slot を全て実行（ループスレッド専用）
    pub(crate) fn dispatch_fired(&self) -> usize {
        let snapshot: Vec<Arc<WakeSlot>> = {
            let mut slots = self.slots();
            slots.retain(|s| !s.is_closed());
            slots.clone()
        };
        let mut ran = 0;
        for slot in snapshot {
            if slot.take_fired() {
                slot.invoke();
                ran += 1;
            }
        }
        ran
    }

    /// 停止フラグを立てる。最初の呼び出しだけ `true`
    pub(crate) fn stop(&self) -> bool {
        let _slots = self.slots();
        !self.stopping.swap(true, Ordering::AcqRel)
    }

    pub(crate) fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::Acquire)
    }

    pub(crate) fn len(&self) -> usize {
        self.slots().iter().filter(|s| !s.is_closed()).count()
    }

    fn slots(&self) -> MutexGuard<'_, Vec<Arc<WakeSlot>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
