//! `ipcq run` の 1 セッション
//!
//! producer が push し、ループが drain し、最後に全件が 1 回ずつループスレッドで実行されたか確かめます。

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use ipcq_core::queue::QueueStats;
use ipcq_core::{Action, ActionSyncQueue, EventLoop, QueueError, ThreadLoop, TokioLoop};
use rand::Rng;
use serde::Serialize;

use crate::config::{Backend, RunConfig};

#[derive(Debug, Serialize)]
pub struct RunReport {
    pub backend: Backend,
    pub producers: usize,
    pub actions_per_producer: usize,
    pub expected: usize,
    pub stats: QueueStats,
    /// Actions that never ran.
    pub lost: usize,
    /// Actions that ran more than once.
    pub duplicated: usize,
    /// Actions that ran somewhere other than the loop thread.
    pub off_loop_thread: usize,
    pub timed_out: bool,
    pub elapsed_ms: u128,
}

impl RunReport {
    pub fn ok(&self) -> bool {
        !self.timed_out && self.lost == 0 && self.duplicated == 0 && self.off_loop_thread == 0
    }
}

/// Per-action run counts, handed to every action as its argument.
struct Tally {
    hits: Vec<AtomicU32>,
    off_loop: AtomicUsize,
    loop_thread: ThreadId,
}

impl Tally {
    fn new(total: usize, loop_thread: ThreadId) -> Self {
        Self {
            hits: (0..total).map(|_| AtomicU32::new(0)).collect(),
            off_loop: AtomicUsize::new(0),
            loop_thread,
        }
    }

    fn record(&self, index: usize) {
        if thread::current().id() != self.loop_thread {
            self.off_loop.fetch_add(1, Ordering::Relaxed);
        }
        self.hits[index].fetch_add(1, Ordering::Relaxed);
    }

    fn lost(&self) -> usize {
        self.hits
            .iter()
            .filter(|h| h.load(Ordering::Relaxed) == 0)
            .count()
    }

    fn duplicated(&self) -> usize {
        self.hits
            .iter()
            .filter(|h| h.load(Ordering::Relaxed) > 1)
            .count()
    }
}

pub fn run(config: &RunConfig) -> Result<RunReport> {
    match config.backend {
        Backend::Thread => {
            let event_loop =
                ThreadLoop::spawn(config.event_loop.clone()).context("spawn thread loop")?;
            let report = drive(&event_loop, event_loop.thread_id(), config)?;
            event_loop.shutdown().context("stop thread loop")?;
            Ok(report)
        }
        Backend::Tokio => {
            let event_loop =
                TokioLoop::spawn(config.event_loop.clone()).context("spawn tokio loop")?;
            let report = drive(&event_loop, event_loop.thread_id(), config)?;
            event_loop.shutdown().context("stop tokio loop")?;
            Ok(report)
        }
    }
}

fn drive<L: EventLoop>(event_loop: &L, loop_thread: ThreadId, config: &RunConfig) -> Result<RunReport> {
    let queue = ActionSyncQueue::new(event_loop).context("bind queue to event loop")?;
    let tally = Arc::new(Tally::new(config.total_actions(), loop_thread));
    tracing::info!(
        backend = ?config.backend,
        producers = config.producers,
        actions = config.actions,
        "session started"
    );

    let started = Instant::now();
    thread::scope(|s| {
        for producer in 0..config.producers {
            let queue = &queue;
            let tally = &tally;
            s.spawn(move || produce(queue, tally, producer, config));
        }
    });

    let timed_out = match queue.wait_for_sync(Some(config.timeout())) {
        Ok(()) => false,
        Err(QueueError::WaitTimedOut(after)) => {
            tracing::warn!(?after, pending = queue.len(), "queue did not drain in time");
            true
        }
    };
    let elapsed = started.elapsed();
    // close waits out a drain still running on the loop thread
    queue.close();

    let report = RunReport {
        backend: config.backend,
        producers: config.producers,
        actions_per_producer: config.actions,
        expected: config.total_actions(),
        stats: queue.stats(),
        lost: tally.lost(),
        duplicated: tally.duplicated(),
        off_loop_thread: tally.off_loop.load(Ordering::Relaxed),
        timed_out,
        elapsed_ms: elapsed.as_millis(),
    };
    tracing::info!(ok = report.ok(), elapsed_ms = report.elapsed_ms, "session finished");
    Ok(report)
}

fn produce<S: ipcq_core::WakeSource>(
    queue: &ActionSyncQueue<S>,
    tally: &Arc<Tally>,
    producer: usize,
    config: &RunConfig,
) {
    let mut rng = rand::thread_rng();
    for seq in 0..config.actions {
        let index = producer * config.actions + seq;
        let argument: Arc<Tally> = Arc::clone(tally);
        queue.push(
            Action::new(move |action| {
                if let Some(tally) = action.argument_as::<Tally>() {
                    tally.record(index);
                }
            })
            .with_argument(argument)
            .with_payload(format!("p{producer}-{seq}")),
        );
        if config.jitter_us > 0 {
            thread::sleep(Duration::from_micros(rng.gen_range(0..=config.jitter_us)));
        }
    }
    tracing::debug!(producer, "producer done");
}
