//! ThreadLoop - 専用 OS スレッドで動くイベントループ
//!
//! # 学習ポイント
//! - park/unpark によるスレッドの休止と起床
//! - "wake pending" フラグで unpark の嵐を防ぐ（合併 wake）
//! - close 後のコールバックを `WakeSlot` のゲートで確実に止める
//!
//! # ループ 1 周の流れ
//! 1. fire 済みの wake source のコールバックを全て実行
//! 2. 実行中に wake が来ていたら park せずにもう 1 周
//! 3. それ以外は park して次の unpark を待つ

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle, Thread, ThreadId};

use crate::config::LoopConfig;
use crate::domain::SourceId;
use crate::error::LoopError;
use crate::ports::{EventLoop, Notifier, WakeCallback, WakeSource};

use super::wake_slot::{SlotRegistry, WakeSlot};

#[derive(Default)]
struct LoopShared {
    registry: SlotRegistry,
    wake_pending: AtomicBool,
}

impl LoopShared {
    fn wake(&self, thread: &Thread) {
        if !self.wake_pending.swap(true, Ordering::AcqRel) {
            thread.unpark();
        }
    }
}

/// Event loop driven by one dedicated OS thread.
///
/// The thread sleeps until a wake source fires, runs the callbacks of every
/// fired source, and sleeps again. Dropping the loop shuts it down.
pub struct ThreadLoop {
    shared: Arc<LoopShared>,
    thread: Thread,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl ThreadLoop {
    pub fn spawn(config: LoopConfig) -> Result<Self, LoopError> {
        let shared = Arc::new(LoopShared::default());
        let for_thread = Arc::clone(&shared);
        let name = config.thread_name;

        let join = thread::Builder::new()
            .name(name.clone())
            .spawn(move || run_loop(&for_thread))
            .map_err(LoopError::Spawn)?;
        let thread = join.thread().clone();
        tracing::info!(thread = %name, "thread loop spawned");

        Ok(Self {
            shared,
            thread,
            join: Mutex::new(Some(join)),
        })
    }

    /// Id of the loop's thread; every callback runs there.
    pub fn thread_id(&self) -> ThreadId {
        self.thread.id()
    }

    /// Number of open wake sources.
    pub fn source_count(&self) -> usize {
        self.shared.registry.len()
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.registry.is_stopping()
    }

    /// Stop the loop and join its thread. Idempotent.
    ///
    /// Sources fired before this call still get their callback run once. New
    /// bindings are refused with [`LoopError::Stopped`]. Called from the loop
    /// thread itself it only requests the stop.
    pub fn shutdown(&self) -> Result<(), LoopError> {
        if self.shared.registry.stop() {
            tracing::debug!("thread loop stop requested");
        }
        self.thread.unpark();

        if thread::current().id() == self.thread.id() {
            return Ok(());
        }
        let join = self
            .join
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match join {
            Some(join) => join.join().map_err(|_| LoopError::ThreadPanicked),
            None => Ok(()),
        }
    }
}

impl EventLoop for ThreadLoop {
    type Source = ThreadWakeSource;

    fn wake_source(&self, callback: WakeCallback) -> Result<ThreadWakeSource, LoopError> {
        let slot = Arc::new(WakeSlot::new(callback, self.thread.id()));
        self.shared.registry.register(Arc::clone(&slot))?;
        tracing::debug!(source = %slot.id(), "wake source bound");
        Ok(ThreadWakeSource {
            slot,
            shared: Arc::clone(&self.shared),
            thread: self.thread.clone(),
        })
    }
}

impl Drop for ThreadLoop {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            tracing::warn!(%err, "thread loop shutdown failed");
        }
    }
}

fn run_loop(shared: &LoopShared) {
    tracing::info!("thread loop started");
    loop {
        let stopping = shared.registry.is_stopping();
        shared.registry.dispatch_fired();
        if stopping {
            break;
        }
        if shared.wake_pending.swap(false, Ordering::AcqRel) {
            continue;
        }
        thread::park();
    }
    tracing::info!("thread loop stopped");
}

/// Wake source bound to a [`ThreadLoop`]. Closed on drop.
pub struct ThreadWakeSource {
    slot: Arc<WakeSlot>,
    shared: Arc<LoopShared>,
    thread: Thread,
}

impl ThreadWakeSource {
    pub fn id(&self) -> SourceId {
        self.slot.id()
    }
}

impl Notifier for ThreadWakeSource {
    fn fire(&self) {
        if self.slot.mark_fired() {
            self.shared.wake(&self.thread);
        }
    }

    fn close(&self) {
        if self.slot.close() {
            tracing::debug!(source = %self.slot.id(), "wake source closed");
        }
    }
}

impl WakeSource for ThreadWakeSource {
    fn is_closed(&self) -> bool {
        self.slot.is_closed()
    }
}

impl Drop for ThreadWakeSource {
    fn drop(&mut self) {
        self.close();
    }
}
