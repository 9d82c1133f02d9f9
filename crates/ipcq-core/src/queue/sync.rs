//! SyncQueue - イベントループと同期するキュー
//!
//! push のたびに wake source を fire し、ループのスレッドで `run_sync` を実行させます。
//!
//! # 学習ポイント
//! - wake コールバックは `Weak<Store>` だけを持つ（ループがキューを延命しない）
//! - close は wake source を閉じるだけで、保留中の action は実行しない
//! - action が panic しても、残りを drain し終えてから panic を上に渡す

use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};
use std::sync::Arc;
use std::time::Duration;

use crate::domain::{Action, Runnable};
use crate::error::{LoopError, QueueError};
use crate::ports::{EventLoop, WakeSource};

use super::store::Store;
use super::{Queue, QueueStats};

/// SyncQueue of default actions bound to wake source `S`.
pub type ActionSyncQueue<S> = SyncQueue<Action, S>;

/// Queue whose pushes wake an event loop; the loop thread drains it.
///
/// # 使用例
/// ```ignore
/// let event_loop = ThreadLoop::spawn(LoopConfig::default())?;
/// let queue = ActionSyncQueue::new(&event_loop)?;
/// queue.push(Action::new(|a| println!("on loop thread: {}", a.payload())));
/// ```
pub struct SyncQueue<A: Runnable, S: WakeSource> {
    queue: Queue<A, S>,
}

impl<A: Runnable, S: WakeSource> SyncQueue<A, S> {
    /// Bind a new queue to `event_loop`.
    pub fn new<L>(event_loop: &L) -> Result<Self, LoopError>
    where
        L: EventLoop<Source = S>,
    {
        let store = Arc::new(Store::<A>::new());
        let weak = Arc::downgrade(&store);
        let source = event_loop.wake_source(Box::new(move || {
            if let Some(store) = weak.upgrade() {
                drain_on_loop(&store);
            }
        }))?;
        Ok(Self {
            queue: Queue::from_parts(store, source),
        })
    }

    pub fn push(&self, action: A) {
        self.queue.push(action);
    }

    pub fn pop(&self) -> Option<A> {
        self.queue.pop()
    }

    /// Drain on the calling thread. Normally the loop does this on wake.
    pub fn run_sync(&self) -> usize {
        self.queue.run_sync()
    }

    /// Release the wake source. Idempotent; pending actions are left in place.
    pub fn close(&self) {
        self.queue.close();
    }

    pub fn post(&self) {
        self.queue.post();
    }

    pub fn wait_for_sync(&self, timeout: Option<Duration>) -> Result<(), QueueError> {
        self.queue.wait_for_sync(timeout)
    }

    /// The bound wake source.
    pub fn sync(&self) -> &S {
        self.queue.notifier()
    }

    pub fn queue(&self) -> &Queue<A, S> {
        &self.queue
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }

    pub fn stats(&self) -> QueueStats {
        self.queue.stats()
    }
}

/// ループスレッドでの drain
///
/// panic した action は pop 済みなので、その後ろに並ぶ action はもう fire されない。
/// 空になるまで drain を続け、最初の panic はその後で投げ直す。
fn drain_on_loop<A: Runnable>(store: &Store<A>) {
    let mut first_panic = None;
    loop {
        match catch_unwind(AssertUnwindSafe(|| store.run_sync())) {
            Ok(_) => break,
            Err(payload) => {
                tracing::error!(pending = store.len(), "action panicked on loop thread");
                first_panic.get_or_insert(payload);
            }
        }
    }
    if let Some(payload) = first_panic {
        resume_unwind(payload);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Mutex, mpsc};
    use std::thread;
    use crate::ports::notifier::Notifier;

    use rstest::rstest;

    use crate::config::LoopConfig;
    use crate::impls::{ThreadLoop, TokioLoop};

    const WAIT: Duration = Duration::from_secs(5);

    fn thread_loop() -> ThreadLoop {
        ThreadLoop::spawn(LoopConfig::named("sync-queue-test")).unwrap()
    }

    #[test]
    fn action_pushed_from_worker_runs_on_loop_thread() {
        let event_loop = thread_loop();
        let queue = Arc::new(ActionSyncQueue::new(&event_loop).unwrap());
        let (tx, rx) = mpsc::channel();

        let worker = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                queue.push(Action::new(move |a| {
                    tx.send((thread::current().id(), a.payload().to_string())).unwrap();
                }).with_payload("from worker"));
                thread::current().id()
            })
        };
        let worker_id = worker.join().unwrap();

        let (ran_on, payload) = rx.recv_timeout(WAIT).unwrap();
        assert_eq!(payload, "from worker");
        assert_eq!(ran_on, event_loop.thread_id());
        assert_ne!(ran_on, worker_id);
    }

    #[test]
    fn tokio_loop_runs_actions_on_its_thread() {
        let event_loop = TokioLoop::spawn(LoopConfig::named("sync-queue-tokio")).unwrap();
        let queue = ActionSyncQueue::new(&event_loop).unwrap();
        let (tx, rx) = mpsc::channel();

        for payload in ["a", "b", "c"] {
            let tx = tx.clone();
            queue.push(
                Action::new(move |a| {
                    tx.send((thread::current().id(), a.payload().to_string())).unwrap();
                })
                .with_payload(payload),
            );
        }

        let received: Vec<_> = (0..3).map(|_| rx.recv_timeout(WAIT).unwrap()).collect();
        assert!(received.iter().all(|(id, _)| *id == event_loop.thread_id()));
        let order: Vec<_> = received.into_iter().map(|(_, p)| p).collect();
        assert_eq!(order, vec!["a", "b", "c"]);
        queue.wait_for_sync(Some(WAIT)).unwrap();
    }

    #[rstest]
    #[case::two_producers(2)]
    #[case::six_producers(6)]
    fn loop_drains_everything_pushed(#[case] producers: usize) {
        const PER_PRODUCER: usize = 500;
        let event_loop = thread_loop();
        let queue = Arc::new(ActionSyncQueue::new(&event_loop).unwrap());
        let hits = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..producers)
            .map(|_| {
                let queue = Arc::clone(&queue);
                let hits = Arc::clone(&hits);
                thread::spawn(move || {
                    for _ in 0..PER_PRODUCER {
                        let hits = Arc::clone(&hits);
                        queue.push(Action::new(move |_| {
                            hits.fetch_add(1, Ordering::SeqCst);
                        }));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        queue.wait_for_sync(Some(WAIT)).unwrap();
        event_loop.shutdown().unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), producers * PER_PRODUCER);
        assert_eq!(queue.stats().executed, (producers * PER_PRODUCER) as u64);
    }

    #[test]
    fn close_stops_waking_but_keeps_pushes() {
        let event_loop = thread_loop();
        let queue = ActionSyncQueue::new(&event_loop).unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));

        queue.close();
        queue.close();
        assert!(queue.sync().is_closed());
        assert!(queue.is_closed());

        let sink = Arc::clone(&log);
        queue.push(Action::new(move |a| sink.lock().unwrap().push(a.payload().to_string())).with_payload("late"));

        // nothing wakes the loop for it
        assert!(queue.wait_for_sync(Some(Duration::from_millis(100))).is_err());
        assert_eq!(queue.len(), 1);

        assert_eq!(queue.run_sync(), 1);
        assert_eq!(*log.lock().unwrap(), vec!["late"]);
    }

    #[test]
    fn dropped_queue_discards_unwoken_actions() {
        let event_loop = thread_loop();
        let ran = Arc::new(AtomicUsize::new(0));
        {
            let queue = ActionSyncQueue::new(&event_loop).unwrap();
            queue.close();
            let ran = Arc::clone(&ran);
            queue.push(Action::new(move |_| {
                ran.fetch_add(1, Ordering::SeqCst);
            }));
        }
        event_loop.shutdown().unwrap();
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    fn actions_behind_a_panic_still_run<L: EventLoop>(event_loop: &L) {
        let (started_tx, started_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);
        // keeps the loop thread busy so all pushes land before the drain
        let blocker = event_loop
            .wake_source(Box::new(move || {
                let _ = started_tx.send(());
                let _ = release_rx.lock().unwrap().recv_timeout(WAIT);
            }))
            .unwrap();
        let queue = ActionSyncQueue::new(event_loop).unwrap();
        let hits = Arc::new(AtomicUsize::new(0));

        blocker.fire();
        started_rx.recv_timeout(WAIT).unwrap();
        queue.push(Action::new(|_| panic!("action failed")));
        for _ in 0..2 {
            let hits = Arc::clone(&hits);
            queue.push(Action::new(move |_| {
                hits.fetch_add(1, Ordering::SeqCst);
            }));
        }
        release_tx.send(()).unwrap();

        queue.wait_for_sync(Some(WAIT)).unwrap();
        queue.close();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        let stats = queue.stats();
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.executed, 2);
    }

    #[test]
    fn thread_loop_drains_past_panicking_action() {
        actions_behind_a_panic_still_run(&thread_loop());
    }

    #[test]
    fn tokio_loop_drains_past_panicking_action() {
        let event_loop = TokioLoop::spawn(LoopConfig::named("sync-queue-panic")).unwrap();
        actions_behind_a_panic_still_run(&event_loop);
    }

    #[test]
    fn binding_to_stopped_loop_fails() {
        let event_loop = thread_loop();
        event_loop.shutdown().unwrap();
        let result = ActionSyncQueue::new(&event_loop);
        assert!(matches!(result, Err(LoopError::Stopped)));
    }
}
