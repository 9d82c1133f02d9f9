//! TokioLoop - current-thread tokio ランタイムで動くイベントループ
//!
//! # 学習ポイント
//! - `Notify` の permit で fire をまとめる（待機者がいなくても取りこぼさない）
//! - current-thread ランタイムでは spawn したタスクも `block_on` しているスレッドで動く
//! - 停止時はランタイムを落とす前に、fire 済みのコールバックを同期的に流す

use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};

use tokio::runtime::Handle;
use tokio::sync::{Notify, oneshot};

use crate::config::LoopConfig;
use crate::domain::SourceId;
use crate::error::LoopError;
use crate::ports::{EventLoop, Notifier, WakeCallback, WakeSource};

use super::wake_slot::{SlotRegistry, WakeSlot};

/// Event loop backed by a single-threaded tokio runtime on a dedicated thread.
///
/// Each wake source is a task parked on a [`Notify`]; firing the source hands
/// it a permit and the task runs the callback on the loop thread.
pub struct TokioLoop {
    registry: Arc<SlotRegistry>,
    handle: Handle,
    thread_id: ThreadId,
    stop_tx: Mutex<Option<oneshot::Sender<()>>>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl TokioLoop {
    pub fn spawn(config: LoopConfig) -> Result<Self, LoopError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .map_err(LoopError::Runtime)?;
        let handle = runtime.handle().clone();
        let registry = Arc::new(SlotRegistry::default());
        let for_thread = Arc::clone(&registry);
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let name = config.thread_name;

        let join = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                tracing::info!("tokio loop started");
                runtime.block_on(async {
                    let _ = stop_rx.await;
                });
                // Sources fired while stopping have not been polled yet.
                for_thread.dispatch_fired();
                drop(runtime);
                tracing::info!("tokio loop stopped");
            })
            .map_err(LoopError::Spawn)?;
        let thread_id = join.thread().id();
        tracing::info!(thread = %name, "tokio loop spawned");

        Ok(Self {
            registry,
            handle,
            thread_id,
            stop_tx: Mutex::new(Some(stop_tx)),
            join: Mutex::new(Some(join)),
        })
    }

    pub fn thread_id(&self) -> ThreadId {
        self.thread_id
    }

    pub fn source_count(&self) -> usize {
        self.registry.len()
    }

    pub fn is_stopped(&self) -> bool {
        self.registry.is_stopping()
    }

    /// Stop the runtime and join the loop thread. Idempotent.
    pub fn shutdown(&self) -> Result<(), LoopError> {
        if self.registry.stop() {
            tracing::debug!("tokio loop stop requested");
        }
        let stop_tx = self
            .stop_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(stop_tx) = stop_tx {
            let _ = stop_tx.send(());
        }

        if thread::current().id() == self.thread_id {
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

impl EventLoop for TokioLoop {
    type Source = TokioWakeSource;

    fn wake_source(&self, callback: WakeCallback) -> Result<TokioWakeSource, LoopError> {
        let slot = Arc::new(WakeSlot::new(callback, self.thread_id));
        self.registry.register(Arc::clone(&slot))?;
        let notify = Arc::new(Notify::new());
        self.handle.spawn(drive(Arc::clone(&slot), Arc::clone(&notify)));
        tracing::debug!(source = %slot.id(), "wake source bound");
        Ok(TokioWakeSource { slot, notify })
    }
}

impl Drop for TokioLoop {
    fn drop(&mut self) {
        if let Err(err) = self.shutdown() {
            tracing::warn!(%err, "tokio loop shutdown failed");
        }
    }
}

async fn drive(slot: Arc<WakeSlot>, notify: Arc<Notify>) {
    loop {
        notify.notified().await;
        if slot.is_closed() {
            break;
        }
        if slot.take_fired() {
            slot.invoke();
        }
    }
}

/// Wake source bound to a [`TokioLoop`]. Closed on drop.
pub struct TokioWakeSource {
    slot: Arc<WakeSlot>,
    notify: Arc<Notify>,
}

impl TokioWakeSource {
    pub fn id(&self) -> SourceId {
        self.slot.id()
    }
}

impl Notifier for TokioWakeSource {
    fn fire(&self) {
        if self.slot.mark_fired() {
            self.notify.notify_one();
        }
    }

    fn close(&self) {
        if self.slot.close() {
            // let the driver task observe the close and exit
            self.notify.notify_one();
            tracing::debug!(source = %self.slot.id(), "wake source closed");
        }
    }
}

impl WakeSource for TokioWakeSource {
    fn is_closed(&self) -> bool {
        self.slot.is_closed()
    }
}

impl Drop for TokioWakeSource {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::time::Duration;

    const WAIT: Duration = Duration::from_secs(5);

    fn spawn_loop() -> TokioLoop {
        TokioLoop::spawn(LoopConfig::named("tokio-loop-test")).unwrap()
    }

    #[test]
    fn callback_runs_on_runtime_thread() {
        let event_loop = spawn_loop();
        let (tx, rx) = mpsc::channel();
        let source = event_loop
            .wake_source(Box::new(move || {
                let _ = tx.send(thread::current().id());
            }))
            .unwrap();

        thread::scope(|s| {
            s.spawn(|| source.fire());
        });

        assert_eq!(rx.recv_timeout(WAIT).unwrap(), event_loop.thread_id());
    }

    #[test]
    fn fires_before_first_poll_are_not_lost() {
        let event_loop = spawn_loop();
        let (tx, rx) = mpsc::channel();
        let source = event_loop
            .wake_source(Box::new(move || {
                let _ = tx.send(());
            }))
            .unwrap();
        // no await point has run yet on the loop; the Notify permit carries the fire
        source.fire();
        source.fire();
        rx.recv_timeout(WAIT).unwrap();
    }

    #[test]
    fn closed_source_never_fires() {
        let event_loop = spawn_loop();
        let count = Arc::new(AtomicUsize::new(0));
        let hits = Arc::clone(&count);
        let source = event_loop
            .wake_source(Box::new(move || {
                hits.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();

        source.close();
        source.close();
        source.fire();
        event_loop.shutdown().unwrap();

        assert!(source.is_closed());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn shutdown_flushes_fired_sources() {
        let event_loop = spawn_loop();
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);
        let blocker = event_loop
            .wake_source(Box::new(move || {
                let _ = started_tx.send(());
                let _ = release_rx.lock().unwrap().recv_timeout(WAIT);
            }))
            .unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let sources: Vec<_> = (0..4)
            .map(|_| {
                let hits = Arc::clone(&count);
                event_loop
                    .wake_source(Box::new(move || {
                        hits.fetch_add(1, Ordering::SeqCst);
                    }))
                    .unwrap()
            })
            .collect();

        blocker.fire();
        started_rx.recv_timeout(WAIT).unwrap();
        // the runtime is busy: these fires and the stop request queue up together
        for source in &sources {
            source.fire();
        }
        thread::scope(|s| {
            s.spawn(|| {
                thread::sleep(Duration::from_millis(50));
                release_tx.send(()).unwrap();
            });
            event_loop.shutdown().unwrap();
        });

        assert_eq!(count.load(Ordering::SeqCst), 4);
        assert!(event_loop.is_stopped());
    }

    #[test]
    fn close_waits_for_in_flight_callback() {
        let event_loop = spawn_loop();
        let (started_tx, started_rx) = mpsc::channel();
        let finished = Arc::new(AtomicBool::new(false));
        let done = Arc::clone(&finished);
        let source = event_loop
            .wake_source(Box::new(move || {
                let _ = started_tx.send(());
                thread::sleep(Duration::from_millis(100));
                done.store(true, Ordering::SeqCst);
            }))
            .unwrap();

        source.fire();
        started_rx.recv_timeout(WAIT).unwrap();
        source.close();
        assert!(finished.load(Ordering::SeqCst));
    }

    #[test]
    fn shutdown_is_idempotent_and_refuses_new_sources() {
        let event_loop = spawn_loop();
        event_loop.shutdown().unwrap();
        event_loop.shutdown().unwrap();
        assert!(event_loop.is_stopped());

        let result = event_loop.wake_source(Box::new(|| {}));
        assert!(matches!(result, Err(LoopError::Stopped)));
        assert_eq!(event_loop.source_count(), 0);
    }
}
